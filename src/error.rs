use thiserror::Error;

#[derive(Error, Debug)]
pub enum BalancerError {
    /// Missing stats or config for a node the registry claims to know.
    /// Indicates a provisioning bug, never retried.
    #[error("internal error: {0}")]
    Internal(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out after {0}ms")]
    Timeout(u64),

    #[error("node returned an empty response")]
    EmptyResponse,

    /// Retry ceiling exceeded; carries the last underlying failure message.
    #[error("call failed: {0}")]
    CallFailed(String),

    #[error("node unreachable: {0}")]
    Unreachable(String),

    #[error("balancer channel closed")]
    ChannelClosed,
}

impl BalancerError {
    /// Network-origin errors are recovered via retry and node avoidance;
    /// everything else surfaces immediately.
    pub fn is_network_origin(&self) -> bool {
        matches!(
            self,
            BalancerError::Network(_) | BalancerError::Timeout(_) | BalancerError::EmptyResponse
        )
    }
}

pub type Result<T> = std::result::Result<T, BalancerError>;
