//! Agent runtime.
//!
//! Everything that executes inside a simulated host: the JSON-RPC
//! transport ([`rpc`]), the locked shared-state store ([`store`]), the
//! common lifecycle ([`lifecycle`]), registry queries ([`discovery`]),
//! and the role behaviors (miner, user, distributor, block controller,
//! monitor). The `monerosim-agent` binary dispatches a behavior kind
//! onto [`lifecycle::run_agent`].

pub mod block_controller;
pub mod discovery;
pub mod distributor;
pub mod lifecycle;
pub mod miner;
pub mod monitor;
pub mod rpc;
pub mod store;
pub mod user;

pub use discovery::Discovery;
pub use lifecycle::{run_agent, AgentConfig, AgentContext, Behavior};
pub use store::SharedStore;
