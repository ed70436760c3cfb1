use serde::Serialize;
use serde_json::Value;

use crate::call::CallId;

/// Observer signals emitted by the balancer, fire-and-forget.
///
/// External observers subscribe through the facade; the balancer never blocks
/// on or reacts to delivery.
#[derive(Debug, Clone, Serialize)]
pub enum BalancerEvent {
    NodeAdded {
        node_id: String,
        is_offline: bool,
    },
    WorkerSpawned {
        node_id: String,
        worker_id: String,
    },
    WorkerProcessing {
        worker_id: String,
        call_id: CallId,
    },
    CallSucceeded {
        call_id: CallId,
        result: Value,
    },
    /// One worker-level failure; the call may still be retried elsewhere.
    CallTimeout {
        call_id: CallId,
        node_id: String,
        error: String,
    },
    /// Terminal failure after the retry ceiling.
    CallFailed {
        call_id: CallId,
        error: String,
    },
    NodeOffline {
        node_id: String,
    },
    NodeOnline {
        node_id: String,
    },
    NetworkSwitchRequested,
    NetworkSwitchSucceeded {
        network: String,
        node_count: usize,
    },
    /// Pending queued calls were discarded ahead of a network switch.
    BalancerFlush {
        discarded: usize,
    },
}
