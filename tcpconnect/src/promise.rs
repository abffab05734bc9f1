//! The one-shot result bridge.
//!
//! A request's outcome travels through a [`Deferred`]/[`Promise`] pair:
//! the connection keeps the `Deferred` and settles it exactly once, the
//! caller holds the `Promise` and observes the outcome. Settling consumes
//! the `Deferred`, so a second resolution or rejection cannot be written.

use crate::buffer::Buffer;
use crate::error::ConnectError;

use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

use tracing::warn;

/// What a settled request produced.
pub type Settlement = Result<String, ConnectError>;

#[derive(Default)]
struct Shared {
    outcome: Option<Settlement>,
    settled: bool,
    taken: bool,
    waker: Option<Waker>,
}

/// Creates a connected, unsettled `Deferred`/`Promise` pair.
pub fn deferred() -> (Deferred, Promise) {
    let shared = Rc::new(RefCell::new(Shared::default()));

    (
        Deferred {
            shared: Some(shared.clone()),
        },
        Promise { shared },
    )
}

/// The settling side of a request's result.
///
/// Dropping a `Deferred` without settling it rejects the promise with
/// [`ConnectError::Abandoned`].
pub struct Deferred {
    shared: Option<Rc<RefCell<Shared>>>,
}

impl Deferred {
    /// Fulfils the promise with the accumulated bytes, decoded as text.
    pub fn resolve(mut self, bytes: Buffer) {
        self.settle(Ok(bytes.into_text()));
    }

    /// Rejects the promise with `error`.
    pub fn reject(mut self, error: ConnectError) {
        self.settle(Err(error));
    }

    fn settle(&mut self, outcome: Settlement) {
        let Some(shared) = self.shared.take() else {
            return;
        };

        let waker = {
            let mut shared = shared.borrow_mut();
            shared.outcome = Some(outcome);
            shared.settled = true;
            shared.waker.take()
        };

        if let Some(waker) = waker {
            waker.wake();
        }
    }
}

impl Drop for Deferred {
    fn drop(&mut self) {
        if self.shared.is_some() {
            warn!("deferred result dropped without settling");
            self.settle(Err(ConnectError::Abandoned));
        }
    }
}

/// The caller-visible side of a request's result.
///
/// A `Promise` is settled from an event-loop callback. It can be inspected
/// with [`is_settled`](Self::is_settled) and [`try_take`](Self::try_take)
/// after driving the loop, or awaited as a [`Future`] by a host adapter
/// that polls it from the loop's thread.
pub struct Promise {
    shared: Rc<RefCell<Shared>>,
}

impl Promise {
    /// Whether the request has resolved or rejected.
    pub fn is_settled(&self) -> bool {
        self.shared.borrow().settled
    }

    /// Takes the outcome if the promise has settled.
    ///
    /// The outcome is handed out once; later calls return `None`.
    pub fn try_take(&self) -> Option<Settlement> {
        let mut shared = self.shared.borrow_mut();
        let outcome = shared.outcome.take();
        if outcome.is_some() {
            shared.taken = true;
        }
        outcome
    }
}

impl Future for Promise {
    type Output = Settlement;

    /// Resolves once the request settles.
    ///
    /// The waker is only ever invoked from the event loop's thread.
    ///
    /// # Panics
    ///
    /// Panics if polled again after returning `Poll::Ready`, or after the
    /// outcome was taken with [`try_take`](Promise::try_take).
    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Settlement> {
        let mut shared = self.shared.borrow_mut();

        if let Some(outcome) = shared.outcome.take() {
            shared.taken = true;
            return Poll::Ready(outcome);
        }

        if shared.taken {
            panic!("`Promise` polled after its outcome was taken");
        }

        shared.waker = Some(cx.waker().clone());
        Poll::Pending
    }
}
