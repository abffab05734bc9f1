//! Platform-specific I/O poller abstraction.
//!
//! This module provides a unified interface over the OS readiness
//! mechanism and the raw socket calls the event loop is built on.
//!
//! The poller is used by the event loop to:
//! - register sockets with read/write interests,
//! - block until at least one socket is ready or a timer is due,
//! - report readiness as [`Event`](super::event::Event)s keyed by slab token.
//!
//! The concrete implementation is selected at compile time
//! depending on the target operating system.

pub(crate) mod common;

#[cfg(target_os = "linux")]
mod epoll;

#[cfg(target_os = "linux")]
pub(crate) type Poller = epoll::EpollPoller;

#[cfg(unix)]
pub(crate) mod unix;

#[cfg(unix)]
pub(crate) use unix as platform;
