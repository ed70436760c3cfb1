use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{broadcast, mpsc, Mutex, RwLock};
use tracing::debug;

use crate::call::{CallId, NodeCall};
use crate::config::{BalancerConfig, ConfigStore, OfflineFlag};
use crate::error::Result;
use crate::event::BalancerEvent;
use crate::registry::Registry;
use crate::worker::WorkerSignal;

/// Process-wide balancer state, shared by every task.
///
/// Ownership is partitioned rather than locked per field: the registry is
/// behind one `RwLock` mutated only by the escalation handler, the health
/// monitor, and the switch controller; the router and workers take read
/// guards. Cross-task communication happens through the channels held here.
pub(crate) struct BalancerState {
    pub(crate) config: BalancerConfig,
    pub(crate) store: Arc<dyn ConfigStore>,
    pub(crate) offline: OfflineFlag,
    pub(crate) registry: RwLock<Registry>,
    pub(crate) events: broadcast::Sender<BalancerEvent>,
    /// Inbound stream of calls awaiting dispatch, consumed by the router.
    pub(crate) router_tx: mpsc::UnboundedSender<NodeCall>,
    /// Worker outcome stream, consumed by the escalation handler.
    pub(crate) signal_tx: mpsc::UnboundedSender<WorkerSignal>,
    /// One oneshot sender per in-flight facade invocation, keyed by call id.
    pub(crate) waiters: Mutex<HashMap<CallId, tokio::sync::oneshot::Sender<Result<Value>>>>,
    next_call_id: AtomicU64,
}

impl BalancerState {
    pub(crate) fn new(
        config: BalancerConfig,
        store: Arc<dyn ConfigStore>,
        offline: OfflineFlag,
        events: broadcast::Sender<BalancerEvent>,
        router_tx: mpsc::UnboundedSender<NodeCall>,
        signal_tx: mpsc::UnboundedSender<WorkerSignal>,
    ) -> Self {
        Self {
            config,
            store,
            offline,
            registry: RwLock::new(Registry::new()),
            events,
            router_tx,
            signal_tx,
            waiters: Mutex::new(HashMap::new()),
            next_call_id: AtomicU64::new(0),
        }
    }

    /// Builds a fresh call with the next monotonically increasing id.
    pub(crate) fn new_call(&self, rpc_method: String, rpc_args: Vec<Value>) -> NodeCall {
        let call_id = self.next_call_id.fetch_add(1, Ordering::SeqCst) + 1;
        NodeCall::new(call_id, rpc_method, rpc_args)
    }

    /// Delivery is fire-and-forget; a send error only means nobody subscribed.
    pub(crate) fn emit(&self, event: BalancerEvent) {
        let _ = self.events.send(event);
    }

    /// Resolves the waiter for `call_id` with a terminal outcome. Returns
    /// false when no waiter is registered, which happens for a duplicate
    /// terminal signal or a caller that gave up.
    pub(crate) async fn resolve_waiter(&self, call_id: CallId, outcome: Result<Value>) -> bool {
        match self.waiters.lock().await.remove(&call_id) {
            Some(tx) => tx.send(outcome).is_ok(),
            None => {
                debug!(call_id, "no waiter registered for terminal signal");
                false
            }
        }
    }
}
