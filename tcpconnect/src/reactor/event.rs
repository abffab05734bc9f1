/// A readiness event reported by the poller.
///
/// An `Event` carries readiness information for one registered socket.
/// It is produced by the poller and consumed by the event loop, which
/// resumes whichever connect, write or read operation is pending on the
/// socket.
#[derive(Debug)]
pub(crate) struct Event {
    /// Token of the socket handle inside the loop's handle slab.
    pub(crate) token: u64,

    /// The socket is readable, hung up, or in error.
    pub(crate) readable: bool,

    /// The socket is writable, hung up, or in error.
    pub(crate) writable: bool,
}
