//! Mock collaborators and state builders shared by the unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc};

use crate::call::NodeCall;
use crate::client::RpcClient;
use crate::config::{BalancerConfig, ConfigStore, NodeConfig, OfflineFlag};
use crate::error::{BalancerError, Result};
use crate::state::BalancerState;
use crate::worker::WorkerSignal;

#[derive(Clone)]
pub(crate) enum MockBehavior {
    /// Every call resolves with this value.
    Succeed(Value),
    /// Every call errors with this message.
    Fail(String),
    /// Calls never resolve; only a deadline ends them.
    Hang,
    /// First `failures` calls error, the rest resolve with `then`.
    FailThenSucceed { failures: u32, then: Value },
}

pub(crate) struct MockRpcClient {
    behavior: MockBehavior,
    calls: AtomicU32,
}

#[async_trait]
impl RpcClient for MockRpcClient {
    async fn call(&self, _method: &str, _args: &[Value]) -> Result<Value> {
        let attempt = self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            MockBehavior::Succeed(value) => Ok(value.clone()),
            MockBehavior::Fail(message) => Err(BalancerError::Network(message.clone())),
            MockBehavior::Hang => {
                // far beyond any test deadline
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(Value::Null)
            }
            MockBehavior::FailThenSucceed { failures, then } => {
                if attempt < *failures {
                    Err(BalancerError::Network("mock failure".to_string()))
                } else {
                    Ok(then.clone())
                }
            }
        }
    }
}

pub(crate) struct MockNode {
    pub(crate) id: String,
    pub(crate) behavior: MockBehavior,
}

impl MockNode {
    pub(crate) fn new(id: &str, behavior: MockBehavior) -> Self {
        Self {
            id: id.to_string(),
            behavior,
        }
    }
}

pub(crate) struct MockStore {
    network: String,
    nodes: HashMap<String, NodeConfig>,
}

impl MockStore {
    pub(crate) fn new(network: &str, mocks: &[MockNode]) -> Self {
        let nodes = mocks
            .iter()
            .map(|mock| {
                (
                    mock.id.clone(),
                    NodeConfig {
                        network: network.to_string(),
                        is_custom: false,
                        client: Arc::new(MockRpcClient {
                            behavior: mock.behavior.clone(),
                            calls: AtomicU32::new(0),
                        }) as Arc<dyn RpcClient>,
                    },
                )
            })
            .collect();
        Self {
            network: network.to_string(),
            nodes,
        }
    }
}

impl ConfigStore for MockStore {
    fn node_config(&self, node_id: &str) -> Option<NodeConfig> {
        self.nodes.get(node_id).cloned()
    }

    fn nodes_for_network(&self, network: &str) -> HashMap<String, NodeConfig> {
        if network == self.network {
            self.nodes.clone()
        } else {
            HashMap::new()
        }
    }

    fn selected_network(&self) -> String {
        self.network.clone()
    }
}

/// Installs a fmt subscriber honoring `RUST_LOG`, once per test binary.
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Fast test config: same thresholds as production, millisecond backoffs.
pub(crate) fn test_config() -> BalancerConfig {
    BalancerConfig {
        offline_backoff: Duration::from_millis(30),
        poll_interval: Duration::from_millis(20),
        probe_timeout: Duration::from_millis(200),
        ..BalancerConfig::default()
    }
}

/// State with mock collaborators and detached channel receivers. Good enough
/// for tests that never route or signal.
pub(crate) fn state_with_store(mocks: &[MockNode]) -> Arc<BalancerState> {
    let (state, _router_rx, _signal_rx) = state_full(mocks);
    state
}

/// State plus the worker-signal receiver, for worker-level tests.
pub(crate) fn state_with_signals(
    mocks: &[MockNode],
) -> (Arc<BalancerState>, mpsc::UnboundedReceiver<WorkerSignal>) {
    let (state, router_rx, signal_rx) = state_full(mocks);
    // keep the router side open so retry submissions do not error
    std::mem::forget(router_rx);
    (state, signal_rx)
}

/// State plus both channel receivers.
pub(crate) fn state_full(
    mocks: &[MockNode],
) -> (
    Arc<BalancerState>,
    mpsc::UnboundedReceiver<NodeCall>,
    mpsc::UnboundedReceiver<WorkerSignal>,
) {
    init_tracing();
    let (router_tx, router_rx) = mpsc::unbounded_channel();
    let (signal_tx, signal_rx) = mpsc::unbounded_channel();
    let (events, _) = broadcast::channel(256);
    let state = Arc::new(BalancerState::new(
        test_config(),
        Arc::new(MockStore::new("testnet", mocks)),
        OfflineFlag::new(),
        events,
        router_tx,
        signal_tx,
    ));
    (state, router_rx, signal_rx)
}
