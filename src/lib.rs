//! In-process RPC load balancer.
//!
//! Routes outbound RPC calls from an application to one of several backend
//! nodes serving the same API. Each node gets a fixed pool of workers pulling
//! from its own FIFO queue; a single serialized router assigns calls to the
//! least-loaded eligible node, avoiding nodes that already failed the call.
//! Failures escalate: per-node failure counters declare nodes offline and
//! start background liveness polling, per-call timeout counters bound retries
//! before the caller sees an error, and losing method coverage entirely
//! raises a process-wide offline flag that throttles dispatch. Switching the
//! target network flushes pending work and atomically rebuilds the whole node
//! set.
//!
//! The RPC wire protocol, node configuration, and the offline flag store are
//! collaborator contracts ([`RpcClient`], [`ConfigStore`], [`OfflineFlag`]);
//! the balancer is purely the control plane between them.
//!
//! # Example
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use node_balancer::{ConfigStore, NodeBalancer, OfflineFlag};
//! # use serde_json::json;
//! # async fn run(store: Arc<dyn ConfigStore>) -> node_balancer::Result<()> {
//! let balancer = NodeBalancer::start(store, OfflineFlag::new()).await;
//! let balance = balancer
//!     .call("getBalance", vec![json!("0xabc")])
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod balancer;
pub mod call;
pub mod client;
pub mod config;
pub mod error;
pub mod event;
pub mod node;

mod escalation;
mod health;
mod registry;
mod router;
mod state;
mod switch;
mod worker;

#[cfg(test)]
mod testutil;

pub use balancer::NodeBalancer;
pub use call::{CallId, NodeCall};
pub use client::RpcClient;
pub use config::{BalancerConfig, ConfigStore, NodeConfig, OfflineFlag};
pub use error::{BalancerError, Result};
pub use event::BalancerEvent;
pub use node::{NodeStats, SUPPORTED_METHODS};
