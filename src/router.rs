use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::call::NodeCall;
use crate::state::BalancerState;

enum Routed {
    Done,
    Requeue(NodeCall),
}

/// Spawns the dispatcher: a single task serializing every assignment of a
/// call to a node queue, so no two dispatch decisions ever race.
pub(crate) fn spawn_router(
    state: Arc<BalancerState>,
    mut inbound: mpsc::UnboundedReceiver<NodeCall>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(call) = inbound.recv().await {
            dispatch(&state, call).await;
        }
        debug!("router inbound channel closed, dispatcher stopping");
    })
}

/// Assigns one call to a node queue. Never drops the call: while the global
/// offline flag is set or no node is eligible, the attempt backs off and
/// re-evaluates; a queue torn down mid-switch sends the call back into
/// selection against the new registry.
async fn dispatch(state: &Arc<BalancerState>, call: NodeCall) {
    let mut call = call;
    loop {
        if state.offline.get() {
            trace!(call_id = call.call_id, "balancer offline, throttling dispatch");
            tokio::time::sleep(state.config.offline_backoff).await;
            continue;
        }

        let routed = {
            let registry = state.registry.read().await;
            match registry.select_node(&call) {
                Some(node_id) => {
                    trace!(call_id = call.call_id, node = %node_id, "dispatching call");
                    match registry.enqueue(&node_id, call) {
                        Ok(()) => Routed::Done,
                        Err(returned) => Routed::Requeue(returned),
                    }
                }
                None => Routed::Requeue(call),
            }
        };

        match routed {
            Routed::Done => return,
            Routed::Requeue(returned) => {
                call = returned;
                tokio::time::sleep(state.config.offline_backoff).await;
            }
        }
    }
}
