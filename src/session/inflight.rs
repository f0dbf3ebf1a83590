//! Bookkeeping for inbound requests currently executing on this endpoint.

use crate::types::RequestId;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::AbortHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Running,
    /// Suspended on at least one sub-request to the peer.
    AwaitingPeer,
}

struct InflightCall {
    method: String,
    state: CallState,
    sub_requests: HashSet<RequestId>,
    abort: Option<AbortHandle>,
}

/// Read-only view of an in-flight call.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingCall {
    pub id: RequestId,
    pub method: String,
    pub state: CallState,
    pub sub_requests: Vec<RequestId>,
}

#[derive(Clone, Default)]
pub(crate) struct InflightTable {
    calls: Arc<Mutex<HashMap<RequestId, InflightCall>>>,
}

impl InflightTable {
    fn lock(&self) -> MutexGuard<'_, HashMap<RequestId, InflightCall>> {
        // A poisoned map is still structurally valid.
        self.calls.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Records a new call. Returns `false` if the id is already executing.
    pub fn begin(&self, id: &RequestId, method: &str) -> bool {
        let mut calls = self.lock();
        if calls.contains_key(id) {
            return false;
        }
        calls.insert(
            id.clone(),
            InflightCall {
                method: method.to_string(),
                state: CallState::Running,
                sub_requests: HashSet::new(),
                abort: None,
            },
        );
        true
    }

    pub fn attach(&self, id: &RequestId, abort: AbortHandle) {
        match self.lock().get_mut(id) {
            Some(call) => call.abort = Some(abort),
            // Cancelled before the task handle was attached.
            None => abort.abort(),
        }
    }

    pub fn add_sub_request(&self, parent: &RequestId, child: &RequestId) {
        if let Some(call) = self.lock().get_mut(parent) {
            call.sub_requests.insert(child.clone());
            call.state = CallState::AwaitingPeer;
        }
    }

    pub fn remove_sub_request(&self, parent: &RequestId, child: &RequestId) {
        if let Some(call) = self.lock().get_mut(parent) {
            call.sub_requests.remove(child);
            if call.sub_requests.is_empty() && call.state == CallState::AwaitingPeer {
                call.state = CallState::Running;
            }
        }
    }

    /// Removes a call that produced its terminal outcome. Returns `false` if the call
    /// was cancelled in the meantime, in which case no response must be sent.
    pub fn finish(&self, id: &RequestId) -> bool {
        self.lock().remove(id).is_some()
    }

    /// Aborts and removes one call. Returns `false` if it was not executing.
    pub fn cancel(&self, id: &RequestId) -> bool {
        let removed = self.lock().remove(id);
        match removed {
            Some(call) => {
                if let Some(abort) = call.abort {
                    abort.abort();
                }
                true
            }
            None => false,
        }
    }

    pub fn abort_all(&self) -> usize {
        let drained: Vec<InflightCall> = self.lock().drain().map(|(_, call)| call).collect();
        let count = drained.len();
        for call in drained {
            if let Some(abort) = call.abort {
                abort.abort();
            }
        }
        count
    }

    pub fn snapshot(&self) -> Vec<PendingCall> {
        let mut out: Vec<PendingCall> = self
            .lock()
            .iter()
            .map(|(id, call)| {
                let mut sub_requests: Vec<RequestId> = call.sub_requests.iter().cloned().collect();
                sub_requests.sort_by_key(|r| r.to_string());
                PendingCall {
                    id: id.clone(),
                    method: call.method.clone(),
                    state: call.state,
                    sub_requests,
                }
            })
            .collect();
        out.sort_by_key(|c| c.id.to_string());
        out
    }
}
