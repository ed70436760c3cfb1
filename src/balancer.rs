use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::{BalancerConfig, ConfigStore, OfflineFlag};
use crate::error::{BalancerError, Result};
use crate::escalation;
use crate::event::BalancerEvent;
use crate::node::NodeStats;
use crate::router;
use crate::state::BalancerState;
use crate::switch;

/// The balancer facade: the only entry point external callers use.
///
/// Owns the router and signal-consumer tasks and the shared state they run
/// against. Submitting a call returns a single future that resolves with the
/// RPC result or a permanent failure; all routing, retry, and health handling
/// stays internal.
///
/// Dropping the balancer aborts its tasks and workers; use
/// [`shutdown`](NodeBalancer::shutdown) when teardown must also flush the
/// waiter map deterministically.
pub struct NodeBalancer {
    state: Arc<BalancerState>,
    router: JoinHandle<()>,
    signals: JoinHandle<()>,
}

impl NodeBalancer {
    /// Provisions the selected network's node set and starts the balancer
    /// with default tunables.
    pub async fn start(store: Arc<dyn ConfigStore>, offline: OfflineFlag) -> Self {
        Self::start_with_config(store, offline, BalancerConfig::default()).await
    }

    /// Provisions the selected network's node set and starts the balancer.
    ///
    /// Nodes are probed and their worker pools spawned before this returns,
    /// so the first call finds a fully provisioned registry.
    pub async fn start_with_config(
        store: Arc<dyn ConfigStore>,
        offline: OfflineFlag,
        config: BalancerConfig,
    ) -> Self {
        let (router_tx, router_rx) = mpsc::unbounded_channel();
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(256);

        let state = Arc::new(BalancerState::new(
            config, store, offline, events, router_tx, signal_tx,
        ));

        switch::switch_network(&state).await;

        let router = router::spawn_router(state.clone(), router_rx);
        let signals = escalation::spawn_signal_consumer(state.clone(), signal_rx);
        info!("node balancer started");

        Self {
            state,
            router,
            signals,
        }
    }

    /// Executes `method(args)` on some healthy node.
    ///
    /// Suspends until a terminal signal for this call arrives: the result on
    /// success, [`BalancerError::CallFailed`] once the retry ceiling is
    /// exhausted. Concurrent invocations are independent, correlated only by
    /// their call ids.
    pub async fn call(&self, method: impl Into<String>, args: Vec<Value>) -> Result<Value> {
        let call = self.state.new_call(method.into(), args);
        let call_id = call.call_id;

        let (tx, rx) = oneshot::channel();
        self.state.waiters.lock().await.insert(call_id, tx);

        if self.state.router_tx.send(call).is_err() {
            self.state.waiters.lock().await.remove(&call_id);
            return Err(BalancerError::ChannelClosed);
        }

        rx.await.map_err(|_| BalancerError::ChannelClosed)?
    }

    /// Tears down the current node set and rebuilds it from the store's
    /// selected network. Queued, not-yet-started calls are discarded.
    pub async fn switch_network(&self) {
        switch::switch_network(&self.state).await;
    }

    /// Subscribes to the balancer's observer signals.
    pub fn subscribe(&self) -> broadcast::Receiver<BalancerEvent> {
        self.state.events.subscribe()
    }

    /// Whether the global offline flag is currently raised.
    pub fn is_offline(&self) -> bool {
        self.state.offline.get()
    }

    pub async fn node_ids(&self) -> Vec<String> {
        self.state.registry.read().await.node_ids()
    }

    pub async fn node_stats(&self, node_id: &str) -> Option<NodeStats> {
        self.state.registry.read().await.node_stats(node_id).cloned()
    }

    pub async fn worker_count(&self, node_id: &str) -> usize {
        self.state.registry.read().await.worker_count(node_id)
    }

    /// Narrows or restores a node's claimed support for one method, then
    /// re-evaluates global method coverage against the offline flag.
    /// Returns false if the node is unknown.
    pub async fn set_method_support(&self, node_id: &str, method: &str, supported: bool) -> bool {
        let updated = {
            let mut registry = self.state.registry.write().await;
            match registry.node_stats_mut(node_id) {
                Some(stats) => {
                    stats
                        .supported_methods
                        .insert(method.to_string(), supported);
                    true
                }
                None => false,
            }
        };
        if updated {
            let covered = self.state.registry.read().await.all_methods_available();
            if covered == self.state.offline.get() {
                self.state.offline.toggle();
            }
        }
        updated
    }

    /// Adjusts a node's per-call deadline at runtime. Workers re-read the
    /// threshold on every call, so this applies immediately.
    pub async fn set_timeout_threshold(&self, node_id: &str, threshold_ms: u64) -> bool {
        let mut registry = self.state.registry.write().await;
        match registry.node_stats_mut(node_id) {
            Some(stats) => {
                stats.timeout_threshold_ms = threshold_ms;
                true
            }
            None => false,
        }
    }

    /// Stops all tasks and aborts every worker. In-flight calls never
    /// resolve; their callers receive [`BalancerError::ChannelClosed`] once
    /// the waiter map is dropped.
    pub async fn shutdown(&self) {
        self.router.abort();
        self.signals.abort();
        self.state.registry.write().await.clear();
        self.state.waiters.lock().await.clear();
        info!("node balancer stopped");
    }
}

impl Drop for NodeBalancer {
    fn drop(&mut self) {
        self.router.abort();
        self.signals.abort();
        // with the tasks gone the lock is uncontended; workers must not be
        // left parked on their queues holding the shared state
        if let Ok(mut registry) = self.state.registry.try_write() {
            registry.clear();
        }
    }
}
