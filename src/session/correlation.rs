//! Tracks requests this endpoint has sent and is still waiting on.

use crate::error::{Error, Result};
use crate::types::RequestId;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;

pub(crate) type ResponseSender = oneshot::Sender<Result<Value>>;

struct PendingEntry {
    method: String,
    parent: Option<RequestId>,
    responder: ResponseSender,
}

/// A snapshot of one outstanding outbound request.
#[derive(Debug, Clone, PartialEq)]
pub struct OutstandingRequest {
    pub id: RequestId,
    pub method: String,
    /// The inbound call this request was issued from, if it is a sub-request.
    pub parent: Option<RequestId>,
}

/// Maps outstanding request ids to the receivers awaiting them.
///
/// Once `cancel_all` has run, `register` refuses new entries, so nothing can be
/// inserted behind the drain.
#[derive(Clone, Default)]
pub struct CorrelationTable {
    entries: Arc<DashMap<RequestId, PendingEntry>>,
    closed: Arc<AtomicBool>,
}

impl CorrelationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an entry and returns a guard that removes it when dropped, together
    /// with the receiver the response will be delivered to.
    pub fn register(
        &self,
        id: RequestId,
        method: &str,
        parent: Option<RequestId>,
    ) -> Result<(PendingGuard, oneshot::Receiver<Result<Value>>)> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Cancelled);
        }
        let (tx, rx) = oneshot::channel();
        self.entries.insert(
            id.clone(),
            PendingEntry {
                method: method.to_string(),
                parent,
                responder: tx,
            },
        );
        // A concurrent cancel_all may have drained before our insert landed.
        if self.closed.load(Ordering::Acquire) {
            self.entries.remove(&id);
            return Err(Error::Cancelled);
        }
        let guard = PendingGuard {
            table: self.clone(),
            id,
        };
        Ok((guard, rx))
    }

    /// Delivers an outcome to the matching entry. Returns `false` for unknown ids.
    pub fn resolve(&self, id: &RequestId, outcome: Result<Value>) -> bool {
        match self.entries.remove(id) {
            Some((_, entry)) => {
                let _ = entry.responder.send(outcome);
                true
            }
            None => false,
        }
    }

    /// Fails every entry with `Cancelled` and refuses further registrations.
    /// Returns how many entries were drained.
    pub fn cancel_all(&self) -> usize {
        self.closed.store(true, Ordering::Release);
        let ids: Vec<RequestId> = self.entries.iter().map(|e| e.key().clone()).collect();
        let mut drained = 0;
        for id in ids {
            if self.resolve(&id, Err(Error::Cancelled)) {
                drained += 1;
            }
        }
        drained
    }

    pub fn contains(&self, id: &RequestId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn snapshot(&self) -> Vec<OutstandingRequest> {
        let mut out: Vec<OutstandingRequest> = self
            .entries
            .iter()
            .map(|e| OutstandingRequest {
                id: e.key().clone(),
                method: e.value().method.clone(),
                parent: e.value().parent.clone(),
            })
            .collect();
        out.sort_by_key(|r| r.id.to_string());
        out
    }
}

/// Removes its entry from the table when dropped, whether the awaiting future
/// completed, timed out, or was abandoned.
pub struct PendingGuard {
    table: CorrelationTable,
    id: RequestId,
}

impl PendingGuard {
    pub fn id(&self) -> &RequestId {
        &self.id
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.table.entries.remove(&self.id);
    }
}
