use super::builder::EventLoopBuilder;
use super::event::Event;
use super::io::{
    CloseCallback, ConnectRequest, Pending, ReadResult, TcpHandle, TimerCallback, WriteRequest,
};
use super::poller::Poller;
use super::poller::platform::{
    already_in_progress, bad_handle, cancelled, sys_connect, sys_read, sys_socket,
    sys_take_socket_error, sys_write,
};
use super::timer::TimerEntry;
use super::{HandleId, TimerId};
use crate::utils::{Key, Slab};

use std::collections::{BinaryHeap, VecDeque};
use std::io;
use std::mem;
use std::net::SocketAddr;
use std::os::fd::AsRawFd;
use std::time::{Duration, Instant};

use tracing::{trace, warn};

/// A handle whose close has been requested but not yet completed.
struct Closing {
    key: Key,
    callback: CloseCallback,
}

/// A single-threaded, callback-driven event loop.
///
/// The loop owns every socket handle, pending request and timer. Work is
/// submitted through methods that register a callback and return
/// immediately; [`run`](Self::run) then blocks in the poller and invokes
/// callbacks as their operations complete. Callbacks receive `&mut
/// EventLoop` so they can issue follow-up operations.
///
/// Completion callbacks are never invoked from inside the call that
/// submitted them: even an operation that finishes synchronously completes
/// on the next loop iteration.
///
/// Each iteration:
/// 1. runs pending work (deferred completions and cancellations),
/// 2. completes closing handles and frees them,
/// 3. polls the OS for readiness (bounded by the next timer),
/// 4. resumes connects, writes and reads on ready handles,
/// 5. fires expired timers.
pub struct EventLoop {
    poller: Poller,
    events: Vec<Event>,

    handles: Slab<TcpHandle>,
    pending: VecDeque<Pending>,
    closing: VecDeque<Closing>,

    timers: BinaryHeap<TimerEntry>,
    timer_callbacks: Slab<TimerCallback>,

    /// Reusable read buffer. Each delivered chunk is copied out of it into
    /// an allocation sized to the bytes actually read.
    scratch: Vec<u8>,
}

impl EventLoop {
    /// Creates an event loop with the default configuration.
    pub fn new() -> io::Result<Self> {
        EventLoopBuilder::new().build()
    }

    /// Returns a builder for configuring an event loop.
    pub fn builder() -> EventLoopBuilder {
        EventLoopBuilder::new()
    }

    pub(crate) fn with_config(events_capacity: usize, read_chunk_size: usize) -> io::Result<Self> {
        Ok(Self {
            poller: Poller::new(events_capacity)?,
            events: Vec::with_capacity(events_capacity),
            handles: Slab::new(16),
            pending: VecDeque::new(),
            closing: VecDeque::new(),
            timers: BinaryHeap::new(),
            timer_callbacks: Slab::new(16),
            scratch: vec![0; read_chunk_size],
        })
    }

    /// Opens a non-blocking TCP socket for the address family of `addr`.
    ///
    /// The handle does nothing until an operation is started on it and must
    /// eventually be released with [`close`](Self::close).
    pub fn tcp_open(&mut self, addr: &SocketAddr) -> io::Result<HandleId> {
        let fd = sys_socket(addr)?;
        let key = self.handles.insert(TcpHandle::new(fd));

        trace!(handle = ?key, "tcp handle opened");
        Ok(HandleId(key))
    }

    /// Starts connecting `handle` to `addr`.
    ///
    /// `callback` runs exactly once: with `Ok(())` once connected, with the
    /// OS error if the connection fails, or with `ECANCELED` if the handle
    /// is closed first. If submission itself fails the error is returned and
    /// `callback` is dropped without running.
    pub fn tcp_connect(
        &mut self,
        handle: HandleId,
        addr: SocketAddr,
        callback: impl FnOnce(&mut EventLoop, io::Result<()>) + 'static,
    ) -> io::Result<()> {
        let key = handle.0;
        let tcp = self.live_handle(key)?;

        if tcp.connect.is_some() {
            return Err(already_in_progress());
        }

        let connected = sys_connect(tcp.fd.as_raw_fd(), &addr)?;

        tcp.peer = Some(addr);
        tcp.connect = Some(ConnectRequest {
            in_progress: !connected,
            callback: Box::new(callback),
        });

        if connected {
            trace!(handle = ?key, %addr, "connected immediately");
            self.pending
                .push_back(Box::new(move |ev: &mut EventLoop| ev.finish_connect(key, Ok(()))));
            Ok(())
        } else {
            trace!(handle = ?key, %addr, "connect in progress");
            self.update_interest(key)
        }
    }

    /// Starts delivering inbound data on `handle` to `callback`.
    ///
    /// The callback is invoked once per chunk, and a final time with
    /// [`ReadResult::Eof`] or [`ReadResult::Error`], after which reading
    /// stops by itself.
    pub fn read_start(
        &mut self,
        handle: HandleId,
        callback: impl FnMut(&mut EventLoop, ReadResult) + 'static,
    ) -> io::Result<()> {
        let key = handle.0;
        let tcp = self.live_handle(key)?;

        if tcp.reading {
            return Err(already_in_progress());
        }

        tcp.reading = true;
        tcp.reader = Some(Box::new(callback));

        self.update_interest(key)
    }

    /// Stops reading on `handle`. The read callback is dropped.
    pub fn read_stop(&mut self, handle: HandleId) -> io::Result<()> {
        let key = handle.0;
        let tcp = self.live_handle(key)?;

        tcp.reading = false;
        tcp.reader = None;

        self.update_interest(key)
    }

    /// Queues `payload` to be written in full on `handle`.
    ///
    /// The payload is owned by the write request until it completes.
    /// `callback` runs exactly once, after the last byte was handed to the
    /// kernel, on the first transport error, or with `ECANCELED` if the
    /// handle is closed first.
    pub fn write(
        &mut self,
        handle: HandleId,
        payload: Vec<u8>,
        callback: impl FnOnce(&mut EventLoop, io::Result<()>) + 'static,
    ) -> io::Result<()> {
        let key = handle.0;
        let tcp = self.live_handle(key)?;

        tcp.writes.push_back(WriteRequest {
            payload,
            written: 0,
            callback: Box::new(callback),
        });

        self.update_interest(key)
    }

    /// Closes `handle` asynchronously.
    ///
    /// Outstanding connect and write requests complete with `ECANCELED`,
    /// the read callback is dropped, and the descriptor is deregistered at
    /// once. The handle itself is freed on the next loop iteration, right
    /// before `callback` runs.
    pub fn close(
        &mut self,
        handle: HandleId,
        callback: impl FnOnce(&mut EventLoop) + 'static,
    ) -> io::Result<()> {
        let key = handle.0;
        let tcp = self.live_handle(key)?;

        tcp.closing = true;
        tcp.reading = false;
        tcp.reader = None;

        let connect = tcp.connect.take();
        let writes = mem::take(&mut tcp.writes);
        let registered = mem::replace(&mut tcp.registered, false);
        let fd = tcp.fd.as_raw_fd();

        if registered {
            if let Err(err) = self.poller.deregister(fd) {
                warn!(handle = ?key, %err, "failed to deregister closing handle");
            }
        }

        if let Some(request) = connect {
            self.pending.push_back(Box::new(move |ev: &mut EventLoop| {
                (request.callback)(ev, Err(cancelled()))
            }));
        }

        for request in writes {
            self.pending.push_back(Box::new(move |ev: &mut EventLoop| {
                let WriteRequest {
                    payload, callback, ..
                } = request;
                drop(payload);
                callback(ev, Err(cancelled()))
            }));
        }

        trace!(handle = ?key, "closing handle");
        self.closing.push_back(Closing {
            key,
            callback: Box::new(callback),
        });

        Ok(())
    }

    /// Schedules `callback` to run once after `delay`.
    pub fn timer_start(
        &mut self,
        delay: Duration,
        callback: impl FnOnce(&mut EventLoop) + 'static,
    ) -> TimerId {
        let key = self.timer_callbacks.insert(Box::new(callback));
        self.timers.push(TimerEntry {
            deadline: Instant::now() + delay,
            key,
        });

        TimerId(key)
    }

    /// Cancels a timer. Returns `false` if it already fired or was stopped.
    pub fn timer_stop(&mut self, timer: TimerId) -> bool {
        self.timer_callbacks.remove(timer.0).is_some()
    }

    /// Runs the loop until no handle, request, pending callback or timer
    /// remains.
    pub fn run(&mut self) -> io::Result<()> {
        while self.run_once()? {}
        Ok(())
    }

    /// Runs a single loop iteration.
    ///
    /// Blocks in the poller only if there is no pending work. Returns
    /// whether the loop is still alive afterwards.
    pub fn run_once(&mut self) -> io::Result<bool> {
        self.run_pending();
        self.run_closing();

        if !self.is_alive() {
            return Ok(false);
        }

        let timeout = if self.pending.is_empty() && self.closing.is_empty() {
            self.next_timeout()
        } else {
            Some(Duration::ZERO)
        };

        let mut events = mem::take(&mut self.events);
        let polled = self.poller.poll(&mut events, timeout);

        if polled.is_ok() {
            for event in &events {
                self.dispatch(event);
            }
        }

        self.events = events;
        polled?;

        self.run_timers();

        Ok(self.is_alive())
    }

    /// Whether the loop still has anything to wait for.
    pub fn is_alive(&self) -> bool {
        !self.pending.is_empty()
            || !self.closing.is_empty()
            || !self.timer_callbacks.is_empty()
            || self.handles.values().any(TcpHandle::is_active)
    }

    /// Number of handles owned by the loop, including ones still closing.
    pub fn handle_count(&self) -> usize {
        self.handles.len()
    }

    /// Number of armed timers.
    pub fn timer_count(&self) -> usize {
        self.timer_callbacks.len()
    }

    /// Returns the address `handle` was last asked to connect to.
    pub fn peer_addr(&self, handle: HandleId) -> Option<SocketAddr> {
        self.handles.get(handle.0).and_then(|tcp| tcp.peer)
    }

    fn live_handle(&mut self, key: Key) -> io::Result<&mut TcpHandle> {
        match self.handles.get_mut(key) {
            Some(tcp) if !tcp.closing => Ok(tcp),
            _ => Err(bad_handle()),
        }
    }

    fn run_pending(&mut self) {
        while let Some(work) = self.pending.pop_front() {
            work(self);
        }
    }

    fn run_closing(&mut self) {
        let batch: Vec<Closing> = self.closing.drain(..).collect();

        for closing in batch {
            // Dropping the handle closes the descriptor.
            drop(self.handles.remove(closing.key));
            trace!(handle = ?closing.key, "handle closed");
            (closing.callback)(self);
        }
    }

    fn next_timeout(&mut self) -> Option<Duration> {
        while let Some(timer) = self.timers.peek() {
            if self.timer_callbacks.contains(timer.key) {
                return Some(timer.deadline.saturating_duration_since(Instant::now()));
            }
            self.timers.pop();
        }

        None
    }

    fn run_timers(&mut self) {
        let now = Instant::now();

        while let Some(timer) = self.timers.peek() {
            if timer.deadline > now {
                break;
            }

            let Some(timer) = self.timers.pop() else {
                break;
            };

            if let Some(callback) = self.timer_callbacks.remove(timer.key) {
                trace!(timer = ?timer.key, "timer fired");
                callback(self);
            }
        }
    }

    /// Resumes whatever is pending on the handle an event refers to.
    fn dispatch(&mut self, event: &Event) {
        let key = Key::from_token(event.token);

        if event.writable {
            self.complete_connect(key);
            self.flush_writes(key);
        }

        if event.readable {
            self.drain_reads(key);
        }

        if let Err(err) = self.update_interest(key) {
            warn!(handle = ?key, %err, "failed to update poller interest");
        }
    }

    /// Completes an in-progress connect once the socket reports writability.
    fn complete_connect(&mut self, key: Key) {
        let (request, result) = match self.handles.get_mut(key) {
            Some(tcp) if !tcp.closing && tcp.connect.as_ref().is_some_and(|c| c.in_progress) => {
                let result = sys_take_socket_error(tcp.fd.as_raw_fd());
                match tcp.connect.take() {
                    Some(request) => (request, result),
                    None => return,
                }
            }
            _ => return,
        };

        trace!(handle = ?key, ok = result.is_ok(), "connect completed");
        (request.callback)(self, result);
    }

    /// Completes a connect that succeeded synchronously.
    fn finish_connect(&mut self, key: Key, result: io::Result<()>) {
        let request = match self.handles.get_mut(key) {
            Some(tcp) if !tcp.closing => tcp.connect.take(),
            _ => None,
        };

        // A close in between already cancelled the request.
        if let Some(request) = request {
            (request.callback)(self, result);
        }
    }

    /// Writes as much queued data as the socket accepts.
    fn flush_writes(&mut self, key: Key) {
        loop {
            let Some(tcp) = self.handles.get_mut(key) else {
                return;
            };
            if tcp.closing || tcp.connect.as_ref().is_some_and(|c| c.in_progress) {
                return;
            }

            let fd = tcp.fd.as_raw_fd();
            let Some(request) = tcp.writes.front_mut() else {
                return;
            };

            let outcome = match sys_write(fd, request.remaining()) {
                Ok(0) if !request.is_done() => Some(Err(io::Error::from(io::ErrorKind::WriteZero))),
                Ok(n) => {
                    request.written += n;
                    if request.is_done() { Some(Ok(())) } else { None }
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => return,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => None,
                Err(err) => Some(Err(err)),
            };

            if let Some(result) = outcome {
                if let Some(request) = tcp.writes.pop_front() {
                    let WriteRequest {
                        payload, callback, ..
                    } = request;
                    trace!(handle = ?key, bytes = payload.len(), ok = result.is_ok(), "write completed");
                    drop(payload);
                    callback(self, result);
                }
            }
        }
    }

    /// Reads until the socket would block, delivering each chunk.
    fn drain_reads(&mut self, key: Key) {
        loop {
            let Some(tcp) = self.handles.get_mut(key) else {
                return;
            };
            if tcp.closing || !tcp.reading {
                return;
            }

            let result = match sys_read(tcp.fd.as_raw_fd(), &mut self.scratch) {
                Ok(0) => ReadResult::Eof,
                Ok(n) => ReadResult::Data(self.scratch[..n].to_vec()),
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => return,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => ReadResult::Error(err),
            };

            let terminal = !matches!(result, ReadResult::Data(_));
            if terminal {
                tcp.reading = false;
            }

            let Some(mut reader) = tcp.reader.take() else {
                return;
            };

            trace!(handle = ?key, ?result, "read delivery");
            reader(self, result);

            // Put the callback back unless it stopped, restarted or closed
            // the handle while it ran.
            match self.handles.get_mut(key) {
                Some(tcp) if tcp.reading && !tcp.closing && tcp.reader.is_none() => {
                    tcp.reader = Some(reader);
                }
                _ => return,
            }
        }
    }

    /// Brings the poller registration of a handle in line with what the
    /// handle currently waits for.
    fn update_interest(&mut self, key: Key) -> io::Result<()> {
        let Some(tcp) = self.handles.get_mut(key) else {
            return Ok(());
        };
        if tcp.closing {
            return Ok(());
        }

        let wanted = tcp.wanted_interest();
        let fd = tcp.fd.as_raw_fd();

        match (tcp.registered, wanted.is_empty()) {
            (false, true) => {}
            (false, false) => {
                self.poller.register(fd, key.token(), wanted)?;
                tcp.registered = true;
            }
            (true, true) => {
                self.poller.deregister(fd)?;
                tcp.registered = false;
            }
            (true, false) => {
                if wanted != tcp.interest {
                    self.poller.reregister(fd, key.token(), wanted)?;
                }
            }
        }

        tcp.interest = wanted;
        Ok(())
    }
}
