use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::call::NodeCall;
use crate::error::BalancerError;
use crate::event::BalancerEvent;
use crate::state::BalancerState;

/// Outcome of one worker execution attempt, consumed by the escalation
/// handler.
#[derive(Debug)]
pub(crate) enum WorkerSignal {
    Succeeded {
        call: NodeCall,
        result: Value,
    },
    /// Timeout, RPC error, or empty response; `error` carries the cause.
    TimedOut {
        call: NodeCall,
        node_id: String,
        error: BalancerError,
    },
}

/// Spawns one worker for `node_id`.
///
/// Workers share the node's queue receiver behind a mutex; each takes one
/// call at a time, re-reads the node's timeout threshold so runtime changes
/// apply immediately, and races the RPC against that deadline. The losing RPC
/// future is dropped by the deadline race, releasing the slot deterministically
/// instead of leaving the call running in the background.
///
/// A missing node config at startup is an internal-consistency error fatal to
/// the worker; network errors never are, they turn into signals and the loop
/// continues.
pub(crate) fn spawn_worker(
    state: Arc<BalancerState>,
    worker_id: String,
    node_id: String,
    queue_rx: Arc<Mutex<mpsc::UnboundedReceiver<NodeCall>>>,
    depth: Arc<AtomicUsize>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let Some(node_config) = state.store.node_config(&node_id) else {
            error!(node = %node_id, worker = %worker_id, "node config missing at worker startup");
            return;
        };
        let client = node_config.client.clone();
        debug!(node = %node_id, worker = %worker_id, "worker started");

        loop {
            let call = {
                let mut rx = queue_rx.lock().await;
                match rx.recv().await {
                    Some(call) => call,
                    // queue torn down by a network switch
                    None => return,
                }
            };
            depth.fetch_sub(1, Ordering::SeqCst);

            {
                let mut registry = state.registry.write().await;
                if let Some(record) = registry.worker_mut(&worker_id) {
                    record.current_call = Some(call.clone());
                }
            }
            state.emit(BalancerEvent::WorkerProcessing {
                worker_id: worker_id.clone(),
                call_id: call.call_id,
            });

            // re-read on every call, never cached
            let threshold_ms = {
                let registry = state.registry.read().await;
                registry
                    .node_stats(&node_id)
                    .map(|stats| stats.timeout_threshold_ms)
            };
            let Some(threshold_ms) = threshold_ms else {
                // internal-consistency error: signal the taken call so it is
                // not lost, then stop
                error!(node = %node_id, worker = %worker_id, "node stats missing mid-run");
                let _ = state.signal_tx.send(WorkerSignal::TimedOut {
                    call,
                    node_id: node_id.clone(),
                    error: BalancerError::Internal(format!("no stats for node {node_id}")),
                });
                return;
            };

            let attempt = tokio::time::timeout(
                Duration::from_millis(threshold_ms),
                client.call(&call.rpc_method, &call.rpc_args),
            )
            .await;

            let signal = match attempt {
                Ok(Ok(result)) if !result.is_null() => WorkerSignal::Succeeded { call, result },
                Ok(Ok(_)) => WorkerSignal::TimedOut {
                    call,
                    node_id: node_id.clone(),
                    error: BalancerError::EmptyResponse,
                },
                Ok(Err(err)) => WorkerSignal::TimedOut {
                    call,
                    node_id: node_id.clone(),
                    error: BalancerError::Network(err.to_string()),
                },
                Err(_) => WorkerSignal::TimedOut {
                    call,
                    node_id: node_id.clone(),
                    error: BalancerError::Timeout(threshold_ms),
                },
            };

            {
                let mut registry = state.registry.write().await;
                if let Some(record) = registry.worker_mut(&worker_id) {
                    record.current_call = None;
                }
            }

            if state.signal_tx.send(signal).is_err() {
                return;
            }
        }
    })
}
