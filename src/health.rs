use std::sync::Arc;

use tracing::{debug, info};

use crate::event::BalancerEvent;
use crate::state::BalancerState;

/// Single non-polling liveness probe: races the node's `getCurrentBlock`
/// against the configured probe deadline. Any error or timeout is simply
/// `false`; a node missing from the configuration store is treated the same
/// way (it can no longer come online under this identity).
pub(crate) async fn probe_once(state: &BalancerState, node_id: &str) -> bool {
    let Some(node_config) = state.store.node_config(node_id) else {
        return false;
    };
    matches!(
        tokio::time::timeout(state.config.probe_timeout, node_config.client.get_current_block())
            .await,
        Ok(Ok(_))
    )
}

/// Polls `node_id` until a probe succeeds, sleeping the poll interval between
/// attempts and ignoring errors. Returns false only when the node disappears
/// from the configuration store, which happens when a network switch removed
/// it while this poller was still running.
pub(crate) async fn poll_until_online(state: &BalancerState, node_id: &str) -> bool {
    loop {
        if state.store.node_config(node_id).is_none() {
            debug!(node = %node_id, "node dropped from config, stopping poll");
            return false;
        }
        debug!(node = %node_id, "polling node liveness");
        if probe_once(state, node_id).await {
            info!(node = %node_id, "node back online");
            return true;
        }
        debug!(node = %node_id, "node still offline");
        tokio::time::sleep(state.config.poll_interval).await;
    }
}

/// Background watcher for a node just declared offline: waits for it to come
/// back, restores its stats, and clears the global offline flag once method
/// coverage is whole again.
pub(crate) async fn watch_offline_node(state: Arc<BalancerState>, node_id: String) {
    if !poll_until_online(&state, &node_id).await {
        return;
    }

    {
        let mut registry = state.registry.write().await;
        // the node may have been replaced by a switch while we polled
        let Some(stats) = registry.node_stats_mut(&node_id) else {
            return;
        };
        stats.is_offline = false;
        stats.request_failures = 0;
    }
    state.emit(BalancerEvent::NodeOnline {
        node_id: node_id.clone(),
    });

    let covered = state.registry.read().await.all_methods_available();
    if covered && state.offline.get() {
        state.offline.toggle();
        info!("method coverage restored, balancer back online");
    }
}
