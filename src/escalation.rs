use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::call::NodeCall;
use crate::error::{BalancerError, Result};
use crate::event::BalancerEvent;
use crate::health;
use crate::state::BalancerState;
use crate::worker::WorkerSignal;

/// Spawns the worker-signal consumer: successes resolve the waiting caller,
/// failures run one escalation pass each.
///
/// An escalation pass failing on an internal-consistency error terminates
/// the affected call (its waiter sees the internal error) but never the
/// consumer, which keeps serving subsequent signals.
pub(crate) fn spawn_signal_consumer(
    state: Arc<BalancerState>,
    mut signals: mpsc::UnboundedReceiver<WorkerSignal>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(signal) = signals.recv().await {
            match signal {
                WorkerSignal::Succeeded { call, result } => {
                    state.emit(BalancerEvent::CallSucceeded {
                        call_id: call.call_id,
                        result: result.clone(),
                    });
                    state.resolve_waiter(call.call_id, Ok(result)).await;
                }
                WorkerSignal::TimedOut {
                    call,
                    node_id,
                    error,
                } => {
                    let call_id = call.call_id;
                    if let Err(err) = handle_failure(&state, call, &node_id, error).await {
                        error!(node = %node_id, %err, "escalation pass failed");
                        state.resolve_waiter(call_id, Err(err)).await;
                    }
                }
            }
        }
    })
}

/// One escalation pass for a single timeout/failure signal.
///
/// Order matters: the node's failure account is settled first (possibly
/// declaring it offline and degrading global coverage), then the call's fate
/// is decided: permanent failure past the retry ceiling, otherwise a derived
/// retry that avoids the failing node.
pub(crate) async fn handle_failure(
    state: &Arc<BalancerState>,
    call: NodeCall,
    node_id: &str,
    error: BalancerError,
) -> Result<()> {
    let went_offline = {
        let mut registry = state.registry.write().await;
        let stats = registry
            .node_stats_mut(node_id)
            .ok_or_else(|| BalancerError::Internal(format!("no stats for node {node_id}")))?;
        stats.request_failures += 1;
        if !stats.is_offline && stats.request_failures >= stats.request_failure_threshold {
            stats.is_offline = true;
            true
        } else {
            false
        }
    };

    if went_offline {
        warn!(node = %node_id, "node reached failure threshold, declared offline");
        state.emit(BalancerEvent::NodeOffline {
            node_id: node_id.to_string(),
        });
        tokio::spawn(health::watch_offline_node(
            state.clone(),
            node_id.to_string(),
        ));

        let covered = state.registry.read().await.all_methods_available();
        if !covered && !state.offline.get() {
            state.offline.toggle();
            warn!("method coverage lost, balancer globally offline");
        }
    }

    if call.num_of_timeouts >= state.config.max_call_timeouts {
        info!(call_id = call.call_id, %error, "retry ceiling reached, failing call");
        state.emit(BalancerEvent::CallFailed {
            call_id: call.call_id,
            error: error.to_string(),
        });
        state
            .resolve_waiter(call.call_id, Err(BalancerError::CallFailed(error.to_string())))
            .await;
    } else {
        state.emit(BalancerEvent::CallTimeout {
            call_id: call.call_id,
            node_id: node_id.to_string(),
            error: error.to_string(),
        });
        let retry = call.retry_on(node_id);
        // a closed router only happens during teardown; nothing left to do
        let _ = state.router_tx.send(retry);
    }

    Ok(())
}
