use super::EventLoop;
use crate::reactor::poller::common::Interest;

use std::collections::VecDeque;
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::os::fd::OwnedFd;

pub(crate) type ConnectCallback = Box<dyn FnOnce(&mut EventLoop, io::Result<()>)>;
pub(crate) type WriteCallback = Box<dyn FnOnce(&mut EventLoop, io::Result<()>)>;
pub(crate) type ReadCallback = Box<dyn FnMut(&mut EventLoop, ReadResult)>;
pub(crate) type CloseCallback = Box<dyn FnOnce(&mut EventLoop)>;
pub(crate) type TimerCallback = Box<dyn FnOnce(&mut EventLoop)>;

/// A deferred piece of work run at the start of the next loop iteration.
pub(crate) type Pending = Box<dyn FnOnce(&mut EventLoop)>;

/// One delivery from a reading socket.
pub enum ReadResult {
    /// A non-empty chunk of bytes.
    ///
    /// The chunk is a fresh allocation owned by the callback; it is freed
    /// as soon as the callback drops it.
    Data(Vec<u8>),

    /// The peer closed its sending side cleanly. Reading has stopped.
    Eof,

    /// The transport failed. Reading has stopped.
    Error(io::Error),
}

impl fmt::Debug for ReadResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadResult::Data(chunk) => f.debug_tuple("Data").field(&chunk.len()).finish(),
            ReadResult::Eof => f.write_str("Eof"),
            ReadResult::Error(err) => f.debug_tuple("Error").field(err).finish(),
        }
    }
}

/// An outstanding connect on a handle.
pub(crate) struct ConnectRequest {
    /// `true` while the kernel is still establishing the connection and
    /// completion will be signalled by writability. `false` when the
    /// connect finished synchronously and completion is queued as pending
    /// work instead.
    pub(crate) in_progress: bool,

    pub(crate) callback: ConnectCallback,
}

/// An outstanding write on a handle.
///
/// The request owns its payload until it completes; dropping the request
/// releases the payload.
pub(crate) struct WriteRequest {
    pub(crate) payload: Vec<u8>,
    pub(crate) written: usize,
    pub(crate) callback: WriteCallback,
}

impl WriteRequest {
    pub(crate) fn remaining(&self) -> &[u8] {
        &self.payload[self.written..]
    }

    pub(crate) fn is_done(&self) -> bool {
        self.written >= self.payload.len()
    }
}

/// A TCP socket owned by the event loop.
///
/// The handle owns the descriptor; removing the handle from the loop's
/// slab closes it.
pub(crate) struct TcpHandle {
    pub(crate) fd: OwnedFd,

    /// Address passed to the last connect, kept for diagnostics.
    pub(crate) peer: Option<SocketAddr>,

    pub(crate) connect: Option<ConnectRequest>,

    /// Whether reading is active. The callback may be temporarily taken out
    /// of `reader` while it runs.
    pub(crate) reading: bool,
    pub(crate) reader: Option<ReadCallback>,

    pub(crate) writes: VecDeque<WriteRequest>,

    /// Set by `close`; a closing handle accepts no more operations.
    pub(crate) closing: bool,

    /// Whether the descriptor is currently registered with the poller,
    /// and with which interest.
    pub(crate) registered: bool,
    pub(crate) interest: Interest,
}

impl TcpHandle {
    pub(crate) fn new(fd: OwnedFd) -> Self {
        Self {
            fd,
            peer: None,
            connect: None,
            reading: false,
            reader: None,
            writes: VecDeque::new(),
            closing: false,
            registered: false,
            interest: Interest::NONE,
        }
    }

    /// Returns the readiness this handle currently needs to make progress.
    ///
    /// Writes queued before the connection is established wait for the
    /// connect to finish: both need writability, so the interest is the same.
    pub(crate) fn wanted_interest(&self) -> Interest {
        if self.closing {
            return Interest::NONE;
        }

        let connecting = self.connect.as_ref().is_some_and(|c| c.in_progress);

        Interest {
            read: self.reading && !connecting,
            write: connecting || !self.writes.is_empty(),
        }
    }

    /// A handle keeps the loop alive while it has outstanding work.
    pub(crate) fn is_active(&self) -> bool {
        self.closing || self.connect.is_some() || self.reading || !self.writes.is_empty()
    }
}
