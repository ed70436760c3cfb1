use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::call::NodeCall;
use crate::node::{NodeStats, SUPPORTED_METHODS};

/// Send side of a node's pending-call queue plus its depth counter.
///
/// The receive side lives with the node's workers behind a shared mutex; the
/// depth counter is incremented on enqueue and decremented when a worker takes
/// a call, and feeds least-loaded selection.
pub(crate) struct NodeQueue {
    pub(crate) tx: mpsc::UnboundedSender<NodeCall>,
    pub(crate) depth: Arc<AtomicUsize>,
}

/// Per-worker record. `current_call` is observability only; the task handle
/// is kept so a network switch can tear the worker down.
pub(crate) struct WorkerRecord {
    pub(crate) assigned_node: String,
    pub(crate) current_call: Option<NodeCall>,
    pub(crate) handle: JoinHandle<()>,
}

/// The active node set: stats, queues, and worker records for the currently
/// selected network. Replaced wholesale on a network switch.
#[derive(Default)]
pub(crate) struct Registry {
    nodes: HashMap<String, NodeStats>,
    queues: HashMap<String, NodeQueue>,
    workers: HashMap<String, WorkerRecord>,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Picks the node to serve `call`.
    ///
    /// Candidates are online nodes supporting the call's method. Nodes on the
    /// call's avoid list are skipped while an alternative exists; when every
    /// candidate is avoided the avoid list is ignored rather than stalling the
    /// call forever. Ties break on (queue depth, node id) for determinism.
    pub(crate) fn select_node(&self, call: &NodeCall) -> Option<String> {
        let eligible: Vec<&String> = self
            .nodes
            .iter()
            .filter(|(_, stats)| stats.eligible_for(&call.rpc_method))
            .map(|(id, _)| id)
            .collect();
        if eligible.is_empty() {
            return None;
        }

        let preferred: Vec<&String> = eligible
            .iter()
            .filter(|id| !call.avoid_nodes.contains(**id))
            .copied()
            .collect();
        let pool = if preferred.is_empty() {
            &eligible
        } else {
            &preferred
        };

        pool.iter()
            .min_by_key(|id| (self.queue_depth(id.as_str()), (**id).clone()))
            .map(|id| (**id).clone())
    }

    pub(crate) fn queue_depth(&self, node_id: &str) -> usize {
        self.queues
            .get(node_id)
            .map(|q| q.depth.load(Ordering::SeqCst))
            .unwrap_or(usize::MAX)
    }

    /// Places a call on the node's queue. Returns the call if the queue no
    /// longer exists (torn down mid-switch) so the router can re-select.
    pub(crate) fn enqueue(&self, node_id: &str, call: NodeCall) -> Result<(), NodeCall> {
        match self.queues.get(node_id) {
            Some(queue) => match queue.tx.send(call) {
                Ok(()) => {
                    queue.depth.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
                Err(err) => Err(err.0),
            },
            None => Err(call),
        }
    }

    /// Whether every method in the canonical set has at least one eligible
    /// node. This is the condition the global offline flag tracks.
    pub(crate) fn all_methods_available(&self) -> bool {
        SUPPORTED_METHODS
            .iter()
            .all(|method| self.nodes.values().any(|stats| stats.eligible_for(method)))
    }

    /// Installs a freshly provisioned node and its workers.
    pub(crate) fn install_node(
        &mut self,
        node_id: String,
        stats: NodeStats,
        queue: NodeQueue,
        workers: Vec<(String, WorkerRecord)>,
    ) {
        self.queues.insert(node_id.clone(), queue);
        for (worker_id, record) in workers {
            self.workers.insert(worker_id, record);
        }
        self.nodes.insert(node_id, stats);
    }

    /// Tears down every node: aborts all workers (dropping queue receivers and
    /// with them any queued calls) and clears the maps. Returns how many
    /// queued calls were discarded.
    pub(crate) fn clear(&mut self) -> usize {
        for record in self.workers.values() {
            record.handle.abort();
        }
        let discarded: usize = self
            .queues
            .values()
            .map(|q| q.depth.load(Ordering::SeqCst))
            .sum();
        debug!(discarded, "flushing node queues");
        self.nodes.clear();
        self.queues.clear();
        self.workers.clear();
        discarded
    }

    pub(crate) fn node_stats(&self, node_id: &str) -> Option<&NodeStats> {
        self.nodes.get(node_id)
    }

    pub(crate) fn node_stats_mut(&mut self, node_id: &str) -> Option<&mut NodeStats> {
        self.nodes.get_mut(node_id)
    }

    pub(crate) fn worker_mut(&mut self, worker_id: &str) -> Option<&mut WorkerRecord> {
        self.workers.get_mut(worker_id)
    }

    pub(crate) fn node_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.nodes.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub(crate) fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn worker_count(&self, node_id: &str) -> usize {
        self.workers
            .values()
            .filter(|w| w.assigned_node == node_id)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BalancerConfig;

    fn stats_online() -> NodeStats {
        NodeStats::initial(&BalancerConfig::default(), false, false, 0)
    }

    fn queue() -> (NodeQueue, mpsc::UnboundedReceiver<NodeCall>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            NodeQueue {
                tx,
                depth: Arc::new(AtomicUsize::new(0)),
            },
            rx,
        )
    }

    fn call(method: &str) -> NodeCall {
        NodeCall::new(1, method.to_string(), vec![])
    }

    #[tokio::test]
    async fn test_select_prefers_non_avoided_node() {
        let mut registry = Registry::new();
        let (q1, _rx1) = queue();
        let (q2, _rx2) = queue();
        registry.install_node("node1".to_string(), stats_online(), q1, vec![]);
        registry.install_node("node2".to_string(), stats_online(), q2, vec![]);

        let avoided = call("getBalance").retry_on("node1");
        assert_eq!(registry.select_node(&avoided), Some("node2".to_string()));
    }

    #[tokio::test]
    async fn test_select_falls_back_when_all_avoided() {
        let mut registry = Registry::new();
        let (q1, _rx1) = queue();
        registry.install_node("node1".to_string(), stats_online(), q1, vec![]);

        let avoided = call("getBalance").retry_on("node1");
        // only candidate is on the avoid list; still served
        assert_eq!(registry.select_node(&avoided), Some("node1".to_string()));
    }

    #[tokio::test]
    async fn test_select_skips_offline_nodes() {
        let mut registry = Registry::new();
        let (q1, _rx1) = queue();
        let (q2, _rx2) = queue();
        let mut offline = stats_online();
        offline.is_offline = true;
        registry.install_node("node1".to_string(), offline, q1, vec![]);
        registry.install_node("node2".to_string(), stats_online(), q2, vec![]);

        assert_eq!(
            registry.select_node(&call("ping")),
            Some("node2".to_string())
        );
    }

    #[tokio::test]
    async fn test_select_skips_unsupported_method() {
        let mut registry = Registry::new();
        let (q1, _rx1) = queue();
        let (q2, _rx2) = queue();
        let mut narrowed = stats_online();
        narrowed
            .supported_methods
            .insert("getBalance".to_string(), false);
        registry.install_node("node1".to_string(), narrowed, q1, vec![]);
        registry.install_node("node2".to_string(), stats_online(), q2, vec![]);

        assert_eq!(
            registry.select_node(&call("getBalance")),
            Some("node2".to_string())
        );
        // node1 still serves the methods it kept
        assert!(registry.select_node(&call("ping")).is_some());
    }

    #[tokio::test]
    async fn test_select_none_when_no_candidate() {
        let registry = Registry::new();
        assert_eq!(registry.select_node(&call("ping")), None);
    }

    #[tokio::test]
    async fn test_select_least_loaded_then_lexicographic() {
        let mut registry = Registry::new();
        let (q1, _rx1) = queue();
        let (q2, _rx2) = queue();
        registry.install_node("node-b".to_string(), stats_online(), q1, vec![]);
        registry.install_node("node-a".to_string(), stats_online(), q2, vec![]);

        // equal depth: lexicographic
        assert_eq!(
            registry.select_node(&call("ping")),
            Some("node-a".to_string())
        );

        registry
            .enqueue("node-a", call("ping"))
            .expect("enqueue should succeed");
        // node-a now deeper: node-b wins
        assert_eq!(
            registry.select_node(&call("ping")),
            Some("node-b".to_string())
        );
    }

    #[tokio::test]
    async fn test_enqueue_tracks_depth() {
        let mut registry = Registry::new();
        let (q1, _rx1) = queue();
        registry.install_node("node1".to_string(), stats_online(), q1, vec![]);

        assert_eq!(registry.queue_depth("node1"), 0);
        registry
            .enqueue("node1", call("ping"))
            .expect("enqueue should succeed");
        assert_eq!(registry.queue_depth("node1"), 1);
    }

    #[tokio::test]
    async fn test_enqueue_unknown_node_returns_call() {
        let registry = Registry::new();
        let rejected = registry.enqueue("ghost", call("ping"));
        assert!(rejected.is_err());
    }

    #[tokio::test]
    async fn test_all_methods_available() {
        let mut registry = Registry::new();
        assert!(!registry.all_methods_available());

        let (q1, _rx1) = queue();
        registry.install_node("node1".to_string(), stats_online(), q1, vec![]);
        assert!(registry.all_methods_available());

        registry
            .node_stats_mut("node1")
            .expect("node1 installed")
            .is_offline = true;
        assert!(!registry.all_methods_available());
    }

    #[tokio::test]
    async fn test_coverage_survives_one_node_down_with_backup() {
        let mut registry = Registry::new();
        let (q1, _rx1) = queue();
        let (q2, _rx2) = queue();
        registry.install_node("node1".to_string(), stats_online(), q1, vec![]);
        registry.install_node("node2".to_string(), stats_online(), q2, vec![]);

        registry
            .node_stats_mut("node1")
            .expect("node1 installed")
            .is_offline = true;
        assert!(registry.all_methods_available());
    }

    #[tokio::test]
    async fn test_clear_empties_registry_and_counts_pending() {
        let mut registry = Registry::new();
        let (q1, _rx1) = queue();
        let handle = tokio::spawn(async {});
        registry.install_node(
            "node1".to_string(),
            stats_online(),
            q1,
            vec![(
                "node1_worker_0".to_string(),
                WorkerRecord {
                    assigned_node: "node1".to_string(),
                    current_call: None,
                    handle,
                },
            )],
        );
        registry
            .enqueue("node1", call("ping"))
            .expect("enqueue should succeed");
        registry
            .enqueue("node1", call("ping"))
            .expect("enqueue should succeed");

        let discarded = registry.clear();
        assert_eq!(discarded, 2);
        assert_eq!(registry.node_count(), 0);
        assert_eq!(registry.worker_count("node1"), 0);
        assert!(registry.node_ids().is_empty());
    }
}
