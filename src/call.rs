use serde_json::Value;

/// Monotonically increasing call correlation id, stable across retries.
pub type CallId = u64;

/// One logical RPC request with its retry history.
///
/// On failure the call is not mutated in place: a successor value is derived
/// via [`retry_on`](NodeCall::retry_on) and resubmitted, keeping the same
/// `call_id` so the waiting caller can still be correlated.
#[derive(Debug, Clone)]
pub struct NodeCall {
    pub call_id: CallId,
    pub rpc_method: String,
    pub rpc_args: Vec<Value>,
    /// Timeouts accumulated across retries.
    pub num_of_timeouts: u32,
    /// Nodes that already failed this call; the router prefers alternatives.
    pub avoid_nodes: Vec<String>,
}

impl NodeCall {
    pub fn new(call_id: CallId, rpc_method: String, rpc_args: Vec<Value>) -> Self {
        Self {
            call_id,
            rpc_method,
            rpc_args,
            num_of_timeouts: 0,
            avoid_nodes: Vec::new(),
        }
    }

    /// Derives the retry successor: same id, one more timeout, the failing
    /// node appended to the avoid list.
    pub fn retry_on(mut self, node_id: &str) -> Self {
        self.num_of_timeouts += 1;
        self.avoid_nodes.push(node_id.to_string());
        self
    }
}
