use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

/// Per-node RPC client collaborator.
///
/// The balancer never speaks the wire protocol itself; it hands a method name
/// and an ordered argument list to this handle and awaits the outcome. The
/// liveness method doubles as the health probe target.
#[async_trait]
pub trait RpcClient: Send + Sync {
    /// Invoke a named method with ordered arguments.
    async fn call(&self, method: &str, args: &[Value]) -> Result<Value>;

    /// Liveness probe. Defaults to the `getCurrentBlock` method, which every
    /// backend in the canonical method set serves.
    async fn get_current_block(&self) -> Result<Value> {
        self.call("getCurrentBlock", &[]).await
    }
}
