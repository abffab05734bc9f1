//! The connection state machine.
//!
//! A request moves through
//! `Resolving → Connecting → Streaming → Closed`. The [`Machine`] holds the
//! current phase and the bytes received so far; it performs no I/O. Each
//! [`Event`] reported by the event loop yields the list of [`Effect`]s the
//! driver must carry out, which keeps every transition testable without a
//! socket.
//!
//! Once `Closed`, the machine ignores every further event. Exactly one
//! [`Effect::Settle`] is ever produced, and it is followed by
//! [`Effect::Close`] whenever a socket was opened.

use crate::buffer::Buffer;
use crate::error::ConnectError;

use std::io;
use std::mem;
use std::net::{IpAddr, SocketAddr};

use tracing::trace;

/// The peer a request is addressed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub host: String,
    pub port: u16,
}

impl Target {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Turns the host literal and port into a socket address.
    ///
    /// The host must be an IPv4 or IPv6 address literal; no name lookup is
    /// performed, so resolution never blocks the loop.
    pub fn resolve(&self) -> Result<SocketAddr, ConnectError> {
        self.host
            .parse::<IpAddr>()
            .map(|ip| SocketAddr::new(ip, self.port))
            .map_err(|err| ConnectError::Resolve {
                address: format!("{}:{}", self.host, self.port),
                reason: err.to_string(),
            })
    }
}

/// Where a request currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Waiting for the target to be turned into an address.
    Resolving,

    /// A socket is open and connecting.
    Connecting,

    /// Connected: reading, and possibly still writing the request.
    Streaming { write_pending: bool },

    /// Settled. Nothing further happens.
    Closed,
}

/// Something the event loop observed.
#[derive(Debug)]
pub enum Event {
    /// Begin the request.
    Start(Target),

    /// The socket could not be created.
    OpenFailed(io::Error),

    /// The connect completed, or could not be submitted.
    Connected(io::Result<()>),

    /// The request write completed.
    Written(io::Result<()>),

    /// A chunk of the response arrived.
    Chunk(Vec<u8>),

    /// The peer closed its side cleanly.
    Eof,

    /// Reading failed, or could not be started.
    ReadFailed(io::Error),

    /// The request's timer expired.
    TimedOut,
}

/// Something the driver must do in response to an event.
#[derive(Debug)]
pub enum Effect {
    /// Open a socket for the address and start connecting it.
    Connect(SocketAddr),

    /// Start the read loop on the connected socket.
    StartRead,

    /// Hand the request payload to a write on the connected socket.
    Write,

    /// Settle the caller's promise.
    Settle(Result<Buffer, ConnectError>),

    /// Close the socket.
    Close,
}

/// The pure state of one request.
#[derive(Debug)]
pub struct Machine {
    phase: Phase,
    received: Buffer,
}

impl Default for Machine {
    fn default() -> Self {
        Self::new()
    }
}

impl Machine {
    pub fn new() -> Self {
        Self {
            phase: Phase::Resolving,
            received: Buffer::new(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_closed(&self) -> bool {
        self.phase == Phase::Closed
    }

    /// Bytes accumulated so far.
    pub fn received(&self) -> &[u8] {
        self.received.as_slice()
    }

    /// Applies `event` and returns the effects to carry out, in order.
    pub fn on_event(&mut self, event: Event) -> Vec<Effect> {
        let phase = mem::replace(&mut self.phase, Phase::Closed);

        let (phase, effects) = match (phase, event) {
            (Phase::Closed, event) => {
                trace!(?event, "event after settlement ignored");
                (Phase::Closed, Vec::new())
            }

            (Phase::Resolving, Event::Start(target)) => match target.resolve() {
                Ok(addr) => (Phase::Connecting, vec![Effect::Connect(addr)]),
                Err(err) => self.fail(err, false),
            },

            (Phase::Connecting, Event::OpenFailed(err)) => self.fail(ConnectError::Open(err), false),
            (Phase::Connecting, Event::Connected(Ok(()))) => (
                Phase::Streaming {
                    write_pending: true,
                },
                vec![Effect::StartRead, Effect::Write],
            ),
            (Phase::Connecting, Event::Connected(Err(err))) => {
                self.fail(ConnectError::Connect(err), true)
            }

            (Phase::Streaming { .. }, Event::Written(Ok(()))) => (
                Phase::Streaming {
                    write_pending: false,
                },
                Vec::new(),
            ),
            (Phase::Streaming { .. }, Event::Written(Err(err))) => {
                self.fail(ConnectError::Write(err), true)
            }
            (phase @ Phase::Streaming { .. }, Event::Chunk(chunk)) => {
                match self.received.append(&chunk) {
                    Ok(()) => (phase, Vec::new()),
                    Err(err) => self.fail(err.into(), true),
                }
            }
            (Phase::Streaming { .. }, Event::Eof) => {
                let received = mem::take(&mut self.received);
                (
                    Phase::Closed,
                    vec![Effect::Settle(Ok(received)), Effect::Close],
                )
            }
            (Phase::Streaming { .. }, Event::ReadFailed(err)) => {
                self.fail(ConnectError::Read(err), true)
            }

            (Phase::Connecting | Phase::Streaming { .. }, Event::TimedOut) => {
                self.fail(ConnectError::TimedOut, true)
            }

            (phase, event) => {
                trace!(?phase, ?event, "event not expected in this phase");
                (phase, Vec::new())
            }
        };

        self.phase = phase;
        effects
    }

    /// Discards anything received and settles with `error`.
    fn fail(&mut self, error: ConnectError, close: bool) -> (Phase, Vec<Effect>) {
        mem::take(&mut self.received).release();

        let mut effects = vec![Effect::Settle(Err(error))];
        if close {
            effects.push(Effect::Close);
        }

        (Phase::Closed, effects)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    fn connected() -> Machine {
        let mut machine = Machine::new();
        machine.on_event(Event::Start(Target::new("127.0.0.1", 4242)));
        let effects = machine.on_event(Event::Connected(Ok(())));
        assert!(matches!(
            effects.as_slice(),
            [Effect::StartRead, Effect::Write]
        ));
        machine
    }

    fn reset() -> io::Error {
        io::Error::from(io::ErrorKind::ConnectionReset)
    }

    #[test]
    fn start_resolves_and_connects() {
        let mut machine = Machine::new();
        let effects = machine.on_event(Event::Start(Target::new("::1", 80)));

        assert_eq!(machine.phase(), Phase::Connecting);
        match effects.as_slice() {
            [Effect::Connect(addr)] => assert_eq!(*addr, "[::1]:80".parse::<SocketAddr>().unwrap()),
            other => panic!("unexpected effects {other:?}"),
        }
    }

    #[test]
    fn malformed_host_rejects_without_socket() {
        let mut machine = Machine::new();
        let effects = machine.on_event(Event::Start(Target::new("127.0.0.", 4242)));

        assert!(machine.is_closed());
        match effects.as_slice() {
            [Effect::Settle(Err(ConnectError::Resolve { address, .. }))] => {
                assert_eq!(address, "127.0.0.:4242")
            }
            other => panic!("unexpected effects {other:?}"),
        }
    }

    #[test]
    fn open_failure_has_nothing_to_close() {
        let mut machine = Machine::new();
        machine.on_event(Event::Start(Target::new("127.0.0.1", 1)));
        let effects = machine.on_event(Event::OpenFailed(io::Error::from_raw_os_error(
            libc::EMFILE,
        )));

        assert!(matches!(
            effects.as_slice(),
            [Effect::Settle(Err(ConnectError::Open(_)))]
        ));
    }

    #[test]
    fn connect_failure_closes_without_reading_or_writing() {
        let mut machine = Machine::new();
        machine.on_event(Event::Start(Target::new("127.0.0.1", 1)));
        let effects = machine.on_event(Event::Connected(Err(io::Error::from_raw_os_error(
            libc::ECONNREFUSED,
        ))));

        assert!(matches!(
            effects.as_slice(),
            [Effect::Settle(Err(ConnectError::Connect(_))), Effect::Close]
        ));
        assert!(machine.on_event(Event::Chunk(b"late".to_vec())).is_empty());
    }

    #[test]
    fn eof_resolves_with_every_chunk_in_order() {
        let mut machine = connected();

        for chunk in [&b"hel"[..], &b""[..], &b"lo"[..], &b" world"[..]] {
            assert!(machine.on_event(Event::Chunk(chunk.to_vec())).is_empty());
        }
        assert!(machine.on_event(Event::Written(Ok(()))).is_empty());

        match machine.on_event(Event::Eof).as_slice() {
            [Effect::Settle(Ok(bytes)), Effect::Close] => {
                assert_eq!(bytes.as_slice(), b"hello world")
            }
            other => panic!("unexpected effects {other:?}"),
        }
    }

    #[test]
    fn read_before_write_completion_is_accepted() {
        let mut machine = connected();

        machine.on_event(Event::Chunk(b"early".to_vec()));
        assert_eq!(
            machine.phase(),
            Phase::Streaming {
                write_pending: true
            }
        );

        let effects = machine.on_event(Event::Eof);
        assert!(matches!(effects.as_slice(), [Effect::Settle(Ok(_)), Effect::Close]));

        // The write completes after settlement; it must not settle again.
        assert!(machine.on_event(Event::Written(Ok(()))).is_empty());
    }

    #[test]
    fn read_error_discards_partial_data() {
        let mut machine = connected();
        machine.on_event(Event::Chunk(b"partial".to_vec()));

        let effects = machine.on_event(Event::ReadFailed(reset()));

        assert!(matches!(
            effects.as_slice(),
            [Effect::Settle(Err(ConnectError::Read(_))), Effect::Close]
        ));
        assert!(machine.received().is_empty());
    }

    #[test]
    fn write_failure_rejects_even_after_data() {
        let mut machine = connected();
        machine.on_event(Event::Chunk(b"data".to_vec()));

        let effects = machine.on_event(Event::Written(Err(io::Error::from_raw_os_error(
            libc::EPIPE,
        ))));

        assert!(matches!(
            effects.as_slice(),
            [Effect::Settle(Err(ConnectError::Write(_))), Effect::Close]
        ));
        assert!(machine.on_event(Event::ReadFailed(reset())).is_empty());
    }

    #[test]
    fn timeout_while_connecting_closes_the_socket() {
        let mut machine = Machine::new();
        machine.on_event(Event::Start(Target::new("10.255.255.1", 9)));

        let effects = machine.on_event(Event::TimedOut);

        assert!(matches!(
            effects.as_slice(),
            [Effect::Settle(Err(ConnectError::TimedOut)), Effect::Close]
        ));
    }

    /// A cloneable stand-in for [`Event`] after the connect succeeded.
    #[derive(Debug, Clone)]
    enum Step {
        Chunk(Vec<u8>),
        Eof,
        ReadFailed,
        Written,
        WriteFailed,
        TimedOut,
    }

    impl Step {
        fn is_terminal(&self) -> bool {
            !matches!(self, Step::Chunk(_) | Step::Written)
        }

        fn into_event(self) -> Event {
            match self {
                Step::Chunk(bytes) => Event::Chunk(bytes),
                Step::Eof => Event::Eof,
                Step::ReadFailed => Event::ReadFailed(reset()),
                Step::Written => Event::Written(Ok(())),
                Step::WriteFailed => Event::Written(Err(io::Error::from_raw_os_error(
                    libc::EPIPE,
                ))),
                Step::TimedOut => Event::TimedOut,
            }
        }
    }

    fn step() -> impl Strategy<Value = Step> {
        prop_oneof![
            4 => proptest::collection::vec(any::<u8>(), 0..16).prop_map(Step::Chunk),
            1 => Just(Step::Eof),
            1 => Just(Step::ReadFailed),
            1 => Just(Step::Written),
            1 => Just(Step::WriteFailed),
            1 => Just(Step::TimedOut),
        ]
    }

    proptest! {
        #[test]
        fn settles_once_under_any_ordering(steps in proptest::collection::vec(step(), 0..24)) {
            let mut machine = connected();
            let expect_settle = steps.iter().any(Step::is_terminal);

            let mut settles = 0;
            let mut closes = 0;
            for step in steps {
                for effect in machine.on_event(step.into_event()) {
                    match effect {
                        Effect::Settle(_) => settles += 1,
                        Effect::Close => closes += 1,
                        other => prop_assert!(false, "unexpected effect {:?}", other),
                    }
                }
            }

            prop_assert_eq!(settles, usize::from(expect_settle));
            prop_assert_eq!(closes, settles);
            prop_assert_eq!(machine.is_closed(), expect_settle);
        }

        #[test]
        fn resolves_with_exact_concatenation(
            chunks in proptest::collection::vec(proptest::collection::vec(any::<u8>(), 0..64), 0..16),
        ) {
            let mut machine = connected();
            let expected: Vec<u8> = chunks.concat();

            for chunk in chunks {
                prop_assert!(machine.on_event(Event::Chunk(chunk)).is_empty());
            }

            let effects = machine.on_event(Event::Eof);
            match effects.as_slice() {
                [Effect::Settle(Ok(bytes)), Effect::Close] => {
                    prop_assert_eq!(bytes.as_slice(), expected.as_slice())
                }
                other => prop_assert!(false, "unexpected effects {:?}", other),
            }
        }
    }
}
