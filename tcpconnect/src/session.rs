use crate::machine::Machine;
use crate::promise::Deferred;
use crate::reactor::{HandleId, TimerId};

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::Span;

static NEXT_SESSION: AtomicU64 = AtomicU64::new(1);

/// The exact bytes a request sends.
///
/// Owned by the session until the write is issued, then by the write
/// request until it completes.
#[derive(Debug)]
pub(crate) struct RequestPayload(Vec<u8>);

impl RequestPayload {
    pub(crate) fn new(message: &[u8]) -> Self {
        Self(message.to_vec())
    }

    pub(crate) fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

/// Everything one request keeps alive between callbacks.
pub(crate) struct Session {
    pub(crate) span: Span,

    pub(crate) machine: Machine,

    /// Taken when the request settles.
    pub(crate) deferred: Option<Deferred>,

    /// Taken when the write is issued.
    pub(crate) payload: Option<RequestPayload>,

    /// The socket, once opened. Only an id: the event loop owns the handle.
    pub(crate) handle: Option<HandleId>,

    pub(crate) timer: Option<TimerId>,
}

impl Session {
    pub(crate) fn new(deferred: Deferred, payload: RequestPayload) -> Self {
        let id = NEXT_SESSION.fetch_add(1, Ordering::Relaxed);

        Self {
            span: tracing::debug_span!("session", id),
            machine: Machine::new(),
            deferred: Some(deferred),
            payload: Some(payload),
            handle: None,
            timer: None,
        }
    }
}

/// The shared slot every callback of a request holds.
///
/// The slot is emptied the moment the request settles. A callback that
/// finds it empty belongs to a request that is already torn down and must
/// return without touching anything.
pub(crate) type SessionSlot = Rc<RefCell<Option<Session>>>;
