use std::collections::HashMap;

use serde::Serialize;

use crate::config::BalancerConfig;

/// RPC methods every freshly provisioned node is assumed to serve.
///
/// Coverage of this set is what the global offline flag tracks: the flag is
/// raised when some method here has no eligible node left.
pub const SUPPORTED_METHODS: [&str; 11] = [
    "client",
    "requests",
    "ping",
    "sendCallRequest",
    "getBalance",
    "estimateGas",
    "getTokenBalance",
    "getTokenBalances",
    "getTransactionCount",
    "getCurrentBlock",
    "sendRawTx",
];

/// Mutable health and capacity record, one per active node.
///
/// Written only by the escalation handler, the health monitor, and the switch
/// controller; the router and workers read it.
#[derive(Debug, Clone, Serialize)]
pub struct NodeStats {
    pub is_offline: bool,
    pub is_custom: bool,
    /// Latency of the provisioning probe, in milliseconds.
    pub avg_response_time_ms: u64,
    pub request_failures: u32,
    pub request_failure_threshold: u32,
    /// Per-call deadline, re-read by workers on every call.
    pub timeout_threshold_ms: u64,
    pub max_workers: usize,
    pub current_worker_ids: Vec<String>,
    /// Independently updatable capability map, seeded all-true.
    pub supported_methods: HashMap<String, bool>,
}

impl NodeStats {
    /// Initial record for a freshly probed node, before it is made visible to
    /// the router.
    pub fn initial(
        config: &BalancerConfig,
        is_custom: bool,
        is_offline: bool,
        avg_response_time_ms: u64,
    ) -> Self {
        Self {
            is_offline,
            is_custom,
            avg_response_time_ms,
            request_failures: 0,
            request_failure_threshold: config.request_failure_threshold,
            timeout_threshold_ms: config.timeout_threshold_ms,
            max_workers: config.max_workers,
            current_worker_ids: Vec::new(),
            supported_methods: SUPPORTED_METHODS
                .iter()
                .map(|m| (m.to_string(), true))
                .collect(),
        }
    }

    pub fn supports(&self, method: &str) -> bool {
        self.supported_methods.get(method).copied().unwrap_or(false)
    }

    /// A node serves method `m` iff it is online and claims support for `m`.
    pub fn eligible_for(&self, method: &str) -> bool {
        !self.is_offline && self.supports(method)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_stats_defaults() {
        let config = BalancerConfig::default();
        let stats = NodeStats::initial(&config, false, false, 12);
        assert!(!stats.is_offline);
        assert!(!stats.is_custom);
        assert_eq!(stats.avg_response_time_ms, 12);
        assert_eq!(stats.request_failures, 0);
        assert_eq!(stats.request_failure_threshold, 2);
        assert_eq!(stats.timeout_threshold_ms, 2000);
        assert_eq!(stats.max_workers, 3);
        assert!(stats.current_worker_ids.is_empty());
        assert_eq!(stats.supported_methods.len(), SUPPORTED_METHODS.len());
    }

    #[test]
    fn test_initial_stats_all_methods_supported() {
        let stats = NodeStats::initial(&BalancerConfig::default(), false, false, 0);
        for method in SUPPORTED_METHODS {
            assert!(stats.supports(method), "{method} should start supported");
        }
    }

    #[test]
    fn test_unknown_method_not_supported() {
        let stats = NodeStats::initial(&BalancerConfig::default(), false, false, 0);
        assert!(!stats.supports("eth_unknownMethod"));
    }

    #[test]
    fn test_offline_node_not_eligible() {
        let mut stats = NodeStats::initial(&BalancerConfig::default(), false, false, 0);
        assert!(stats.eligible_for("getBalance"));
        stats.is_offline = true;
        assert!(!stats.eligible_for("getBalance"));
    }

    #[test]
    fn test_narrowed_method_not_eligible() {
        let mut stats = NodeStats::initial(&BalancerConfig::default(), false, false, 0);
        stats
            .supported_methods
            .insert("getBalance".to_string(), false);
        assert!(!stats.eligible_for("getBalance"));
        assert!(stats.eligible_for("ping"));
    }

    #[test]
    fn test_initial_offline_seeded_from_probe() {
        let stats = NodeStats::initial(&BalancerConfig::default(), true, true, 5000);
        assert!(stats.is_offline);
        assert!(stats.is_custom);
        assert!(!stats.eligible_for("ping"));
    }
}
