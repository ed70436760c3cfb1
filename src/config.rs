use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::client::RpcClient;

/// Balancer tunables.
///
/// The per-node values (`timeout_threshold_ms`, `max_workers`,
/// `request_failure_threshold`) seed every node's stats at provisioning time;
/// thresholds can be adjusted per node afterwards through the registry.
#[derive(Debug, Clone)]
pub struct BalancerConfig {
    /// Per-call deadline seeded into each node's stats, in milliseconds.
    pub timeout_threshold_ms: u64,
    /// Workers spawned per node at provisioning. Fixed for the node's lifetime.
    pub max_workers: usize,
    /// Request failures before a node is declared offline.
    pub request_failure_threshold: u32,
    /// Timeouts a single call may accumulate before it fails permanently.
    pub max_call_timeouts: u32,
    /// Router backoff while the global offline flag is set or no node is
    /// eligible.
    pub offline_backoff: Duration,
    /// Interval between liveness probes when polling an offline node.
    pub poll_interval: Duration,
    /// Deadline for a single liveness probe.
    pub probe_timeout: Duration,
}

impl Default for BalancerConfig {
    fn default() -> Self {
        Self {
            timeout_threshold_ms: 2000,
            max_workers: 3,
            request_failure_threshold: 2,
            max_call_timeouts: 3,
            offline_backoff: Duration::from_secs(2),
            poll_interval: Duration::from_secs(5),
            probe_timeout: Duration::from_secs(5),
        }
    }
}

/// Static description of a node. Owned by the configuration store; the
/// balancer only reads it.
#[derive(Clone)]
pub struct NodeConfig {
    /// Network this node belongs to.
    pub network: String,
    /// Whether the node was added by the user rather than shipped statically.
    pub is_custom: bool,
    /// RPC client handle for this node.
    pub client: Arc<dyn RpcClient>,
}

/// External configuration store contract.
///
/// The balancer consults it at provisioning (full node set of the selected
/// network) and at worker startup / health polling (single node lookup).
pub trait ConfigStore: Send + Sync {
    fn node_config(&self, node_id: &str) -> Option<NodeConfig>;
    fn nodes_for_network(&self, network: &str) -> HashMap<String, NodeConfig>;
    fn selected_network(&self) -> String;
}

/// Shared handle to the process-wide offline flag store.
///
/// Set when no node serves at least one required method, cleared once
/// coverage is restored. The balancer mirrors the external store contract:
/// read and toggle, never plain assignment.
#[derive(Clone, Default)]
pub struct OfflineFlag(Arc<AtomicBool>);

impl OfflineFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Flips the flag, returning the new value.
    pub fn toggle(&self) -> bool {
        !self.0.fetch_xor(true, Ordering::SeqCst)
    }
}
