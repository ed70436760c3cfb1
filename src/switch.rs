use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info};

use crate::config::NodeConfig;
use crate::event::BalancerEvent;
use crate::node::NodeStats;
use crate::registry::{NodeQueue, WorkerRecord};
use crate::state::BalancerState;
use crate::worker;

struct ProvisionedNode {
    node_id: String,
    stats: NodeStats,
    queue: NodeQueue,
    workers: Vec<(String, WorkerRecord)>,
}

/// Replaces the whole active node set with the currently selected network's
/// nodes. Also serves as the initial provisioning path.
///
/// The registry write lock is held across teardown and rebuild, making the
/// switch atomic with respect to dispatch: the router cannot observe a
/// half-built registry. Queued, not-yet-started calls are discarded by the
/// flush; their waiters never resolve. Nodes are provisioned concurrently so
/// total switch latency is bounded by the slowest probe, not the sum.
pub(crate) async fn switch_network(state: &Arc<BalancerState>) {
    state.emit(BalancerEvent::NetworkSwitchRequested);

    let mut registry = state.registry.write().await;
    let discarded = registry.clear();
    state.emit(BalancerEvent::BalancerFlush { discarded });

    let network = state.store.selected_network();
    let nodes = state.store.nodes_for_network(&network);
    info!(network = %network, nodes = nodes.len(), "switching network");

    let provisioned = futures::future::join_all(
        nodes
            .into_iter()
            .map(|(node_id, config)| provision_node(state.clone(), node_id, config)),
    )
    .await;

    let node_count = provisioned.len();
    for node in provisioned {
        state.emit(BalancerEvent::NodeAdded {
            node_id: node.node_id.clone(),
            is_offline: node.stats.is_offline,
        });
        for (worker_id, _) in &node.workers {
            state.emit(BalancerEvent::WorkerSpawned {
                node_id: node.node_id.clone(),
                worker_id: worker_id.clone(),
            });
        }
        registry.install_node(node.node_id, node.stats, node.queue, node.workers);
    }
    drop(registry);

    state.emit(BalancerEvent::NetworkSwitchSucceeded {
        network,
        node_count,
    });
}

/// Probes one node, seeds its stats from the observed outcome and latency,
/// and spawns its full worker pool on a fresh queue.
async fn provision_node(
    state: Arc<BalancerState>,
    node_id: String,
    config: NodeConfig,
) -> ProvisionedNode {
    let started = Instant::now();
    let online = matches!(
        tokio::time::timeout(state.config.probe_timeout, config.client.get_current_block()).await,
        Ok(Ok(_))
    );
    let avg_response_time_ms = started.elapsed().as_millis() as u64;

    let mut stats = NodeStats::initial(
        &state.config,
        config.is_custom,
        !online,
        avg_response_time_ms,
    );

    let (tx, rx) = mpsc::unbounded_channel();
    let depth = Arc::new(AtomicUsize::new(0));
    let queue_rx = Arc::new(Mutex::new(rx));

    let mut workers = Vec::with_capacity(stats.max_workers);
    for worker_number in 0..stats.max_workers {
        let worker_id = format!("{node_id}_worker_{worker_number}");
        let handle = worker::spawn_worker(
            state.clone(),
            worker_id.clone(),
            node_id.clone(),
            queue_rx.clone(),
            depth.clone(),
        );
        debug!(node = %node_id, worker = %worker_id, "worker spawned");
        stats.current_worker_ids.push(worker_id.clone());
        workers.push((
            worker_id,
            WorkerRecord {
                assigned_node: node_id.clone(),
                current_call: None,
                handle,
            },
        ));
    }

    ProvisionedNode {
        node_id,
        stats,
        queue: NodeQueue { tx, depth },
        workers,
    }
}
