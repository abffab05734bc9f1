//! The callback-driven event loop.
//!
//! This module implements the single-threaded loop every connection is
//! driven by. The loop is responsible for:
//! - owning TCP socket handles and their in-flight requests,
//! - polling the OS for readiness and resuming connects, writes and reads,
//! - running timers,
//! - releasing handles asynchronously once they are closed.
//!
//! All mutation happens on the thread that calls [`EventLoop::run`], so
//! nothing in here is `Send` and no locks are involved.

mod builder;
mod core;
mod event;
mod io;
mod poller;
mod timer;

pub use self::builder::EventLoopBuilder;
pub use self::core::EventLoop;
pub use self::io::ReadResult;

use crate::utils::Key;

use std::fmt;

/// Identifies a TCP handle owned by an [`EventLoop`].
///
/// Ids are cheap to copy and never dangle: once the handle is freed, the id
/// stops matching anything and operations on it fail with `EBADF`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HandleId(pub(crate) Key);

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tcp#{:x}", self.0.token())
    }
}

/// Identifies a timer armed with [`EventLoop::timer_start`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TimerId(pub(crate) Key);
