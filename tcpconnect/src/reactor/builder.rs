use super::EventLoop;

use std::io;

/// Default number of readiness events collected per poll.
const DEFAULT_EVENTS_CAPACITY: usize = 64;

/// Default size of the scratch buffer each read is performed into.
const DEFAULT_READ_CHUNK_SIZE: usize = 64 * 1024;

/// Builder for configuring and creating an [`EventLoop`].
///
/// # Examples
///
/// ```rust,ignore
/// let event_loop = EventLoop::builder()
///     .read_chunk_size(16 * 1024)
///     .build()?;
/// ```
#[derive(Debug, Clone)]
pub struct EventLoopBuilder {
    /// Maximum number of events returned by one poll.
    events_capacity: usize,

    /// Upper bound on the size of a single delivered chunk.
    read_chunk_size: usize,
}

impl EventLoopBuilder {
    /// Creates a new `EventLoopBuilder` with default configuration.
    pub fn new() -> Self {
        Self {
            events_capacity: DEFAULT_EVENTS_CAPACITY,
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
        }
    }

    /// Sets how many readiness events one poll may report.
    ///
    /// # Panics
    ///
    /// Panics if `n == 0`.
    pub fn events_capacity(mut self, n: usize) -> Self {
        assert!(n > 0, "events_capacity must be > 0");

        self.events_capacity = n;
        self
    }

    /// Sets the size of the buffer each socket read is performed into.
    ///
    /// # Panics
    ///
    /// Panics if `n == 0`.
    pub fn read_chunk_size(mut self, n: usize) -> Self {
        assert!(n > 0, "read_chunk_size must be > 0");

        self.read_chunk_size = n;
        self
    }

    /// Builds the event loop with the configured options.
    ///
    /// Fails if the OS poller cannot be created.
    pub fn build(self) -> io::Result<EventLoop> {
        EventLoop::with_config(self.events_capacity, self.read_chunk_size)
    }
}

impl Default for EventLoopBuilder {
    fn default() -> Self {
        Self::new()
    }
}
