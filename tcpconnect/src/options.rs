use std::time::Duration;

/// Per-request configuration.
///
/// # Examples
///
/// ```rust,ignore
/// let options = ConnectOptions::new().timeout(Duration::from_secs(5));
/// let promise = tcp_connect_with(&mut event_loop, "127.0.0.1", 7, "ping", &options);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ConnectOptions {
    /// Upper bound on the whole request, from start to settlement.
    ///
    /// `None` (the default) waits as long as the peer keeps the connection
    /// open.
    pub(crate) timeout: Option<Duration>,
}

impl ConnectOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects the request with `TimedOut` if it has not settled after
    /// `duration`.
    pub fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(duration);
        self
    }
}
