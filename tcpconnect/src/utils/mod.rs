//! Utilities for memory-efficient data structures.
//!
//! This module provides low-level utilities used internally by the event
//! loop. In particular, it exposes a generational [`Slab`] used to store
//! socket handles and timers under keys that late callbacks can safely
//! hold on to.

mod slab;

pub(crate) use slab::{Key, Slab};
