//! # tcpconnect
//!
//! **tcpconnect** is a one-shot TCP request client built on a small,
//! single-threaded, callback-driven event loop.
//!
//! A request opens a connection to `host:port`, sends one message as raw
//! bytes, reads until the peer closes the connection and delivers the whole
//! response as text. Nothing is framed, retried or pooled. The caller gets a
//! [`Promise`] back immediately and the request makes progress while the
//! [`EventLoop`] runs.
//!
//! The crate offers:
//!
//! - An **event loop** over epoll with TCP handles, asynchronous close and
//!   one-shot timers ([`reactor`])
//! - A pure **connection state machine** deciding what happens on every
//!   completion ([`machine`])
//! - A settle-once **promise** pair bridging the loop to the caller
//! - A **host entry point** with dynamically typed arguments ([`binding`])
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tcpconnect::{EventLoop, tcp_connect};
//!
//! fn main() -> std::io::Result<()> {
//!     let mut event_loop = EventLoop::new()?;
//!     let promise = tcp_connect(&mut event_loop, "127.0.0.1", 7, "ping");
//!
//!     event_loop.run()?;
//!
//!     match promise.try_take() {
//!         Some(Ok(text)) => println!("{text}"),
//!         Some(Err(err)) => eprintln!("request failed: {err}"),
//!         None => unreachable!("the loop only stops once every request settled"),
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`reactor`]: Event loop, TCP handles and timers
//! - [`machine`]: The per-request state machine
//! - [`binding`]: The `tcpConnect(host, port, message)` entry point
//!
//! Everything here is `!Send`: an event loop, its requests and their
//! promises stay on the thread that created them.

mod buffer;
mod connection;
mod error;
mod options;
mod promise;
mod session;
mod utils;

pub mod binding;
pub mod machine;
pub mod reactor;

pub use buffer::Buffer;
pub use connection::{tcp_connect, tcp_connect_with};
pub use error::{AllocError, ArgumentError, ConnectError};
pub use options::ConnectOptions;
pub use promise::{Deferred, Promise, Settlement, deferred};
pub use reactor::{EventLoop, EventLoopBuilder, HandleId, ReadResult, TimerId};
