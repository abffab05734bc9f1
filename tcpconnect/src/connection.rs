//! Drives a [`Machine`](crate::machine::Machine) with the event loop.
//!
//! Every callback registered on behalf of a request captures the request's
//! [`SessionSlot`]. Callbacks feed what they observed into the machine and
//! carry out the effects it returns. Settling empties the slot, so any
//! callback still queued for the same socket (a write completing after a
//! read error, a cancelled connect, a late timer) finds nothing and returns.

use crate::buffer::Buffer;
use crate::error::ConnectError;
use crate::machine::{Effect, Event, Target};
use crate::options::ConnectOptions;
use crate::promise::{self, Promise};
use crate::reactor::{EventLoop, HandleId, ReadResult};
use crate::session::{RequestPayload, Session, SessionSlot};

use std::cell::RefCell;
use std::net::SocketAddr;
use std::rc::Rc;

use tracing::{debug, trace};

/// Sends `message` to `host:port` and collects everything the peer sends
/// back until it closes the connection.
///
/// Returns immediately with an unsettled [`Promise`]; the request makes
/// progress while `event_loop` runs. The promise resolves with the whole
/// response decoded as text, or rejects with the first error encountered.
/// Partial responses are never delivered.
///
/// `host` must be an IPv4 or IPv6 address literal.
pub fn tcp_connect(
    event_loop: &mut EventLoop,
    host: &str,
    port: u16,
    message: impl AsRef<[u8]>,
) -> Promise {
    tcp_connect_with(event_loop, host, port, message, &ConnectOptions::default())
}

/// Like [`tcp_connect`], with explicit [`ConnectOptions`].
pub fn tcp_connect_with(
    event_loop: &mut EventLoop,
    host: &str,
    port: u16,
    message: impl AsRef<[u8]>,
    options: &ConnectOptions,
) -> Promise {
    let message = message.as_ref();
    let (deferred, promise) = promise::deferred();

    let session = Session::new(deferred, RequestPayload::new(message));
    let span = session.span.clone();
    let _enter = span.enter();
    debug!(host, port, bytes = message.len(), "request started");

    let slot: SessionSlot = Rc::new(RefCell::new(Some(session)));

    if let Some(timeout) = options.timeout {
        let timer_slot = slot.clone();
        let timer = event_loop.timer_start(timeout, move |ev| {
            feed(ev, &timer_slot, Event::TimedOut);
        });

        if let Some(session) = slot.borrow_mut().as_mut() {
            session.timer = Some(timer);
        }
    }

    feed(event_loop, &slot, Event::Start(Target::new(host, port)));

    promise
}

/// Applies `event` to the session in `slot` and carries out the effects.
fn feed(ev: &mut EventLoop, slot: &SessionSlot, event: Event) {
    let (effects, handle, span) = {
        let mut guard = slot.borrow_mut();
        let Some(session) = guard.as_mut() else {
            trace!(?event, "event for a settled request ignored");
            return;
        };

        let before = session.machine.phase();
        let effects = session.machine.on_event(event);
        let after = session.machine.phase();

        if before != after {
            let _enter = session.span.enter();
            debug!(from = ?before, to = ?after, "phase changed");
        }

        (effects, session.handle, session.span.clone())
    };

    let _enter = span.enter();

    for effect in effects {
        match effect {
            Effect::Connect(addr) => open_and_connect(ev, slot, addr),
            Effect::StartRead => start_read(ev, slot, handle),
            Effect::Write => write_payload(ev, slot, handle),
            Effect::Settle(outcome) => settle(ev, slot, outcome),
            Effect::Close => {
                if let Some(handle) = handle {
                    close_socket(ev, handle);
                }
            }
        }
    }
}

fn open_and_connect(ev: &mut EventLoop, slot: &SessionSlot, addr: SocketAddr) {
    let handle = match ev.tcp_open(&addr) {
        Ok(handle) => handle,
        Err(err) => return feed(ev, slot, Event::OpenFailed(err)),
    };

    let attached = match slot.borrow_mut().as_mut() {
        Some(session) => {
            session.handle = Some(handle);
            true
        }
        None => false,
    };

    if !attached {
        close_socket(ev, handle);
        return;
    }

    debug!(%addr, %handle, "connecting");

    let connect_slot = slot.clone();
    let submitted = ev.tcp_connect(handle, addr, move |ev, result| {
        feed(ev, &connect_slot, Event::Connected(result));
    });

    if let Err(err) = submitted {
        feed(ev, slot, Event::Connected(Err(err)));
    }
}

fn start_read(ev: &mut EventLoop, slot: &SessionSlot, handle: Option<HandleId>) {
    let Some(handle) = handle else {
        return;
    };

    debug!(%handle, "connected, reading");

    let read_slot = slot.clone();
    let started = ev.read_start(handle, move |ev, result| {
        let event = match result {
            ReadResult::Data(chunk) => Event::Chunk(chunk),
            ReadResult::Eof => Event::Eof,
            ReadResult::Error(err) => Event::ReadFailed(err),
        };
        feed(ev, &read_slot, event);
    });

    if let Err(err) = started {
        feed(ev, slot, Event::ReadFailed(err));
    }
}

fn write_payload(ev: &mut EventLoop, slot: &SessionSlot, handle: Option<HandleId>) {
    let Some(handle) = handle else {
        return;
    };

    let payload = match slot.borrow_mut().as_mut().and_then(|s| s.payload.take()) {
        Some(payload) => payload.into_bytes(),
        None => return,
    };

    debug!(%handle, bytes = payload.len(), "writing request");

    let write_slot = slot.clone();
    let submitted = ev.write(handle, payload, move |ev, result| {
        feed(ev, &write_slot, Event::Written(result));
    });

    if let Err(err) = submitted {
        feed(ev, slot, Event::Written(Err(err)));
    }
}

/// Tears the session down and settles its promise.
fn settle(ev: &mut EventLoop, slot: &SessionSlot, outcome: Result<Buffer, ConnectError>) {
    let Some(mut session) = slot.borrow_mut().take() else {
        return;
    };

    if let Some(timer) = session.timer.take() {
        ev.timer_stop(timer);
    }

    let Some(deferred) = session.deferred.take() else {
        return;
    };

    match outcome {
        Ok(bytes) => {
            debug!(bytes = bytes.len(), "request resolved");
            deferred.resolve(bytes);
        }
        Err(err) => {
            debug!(%err, "request rejected");
            deferred.reject(err);
        }
    }
}

fn close_socket(ev: &mut EventLoop, handle: HandleId) {
    let closed = ev.close(handle, move |_| trace!(%handle, "socket released"));

    if let Err(err) = closed {
        trace!(%handle, %err, "socket already closing");
    }
}
