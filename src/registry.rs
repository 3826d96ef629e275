//! Registry generation and the shared-directory layout.
//!
//! The shared directory is the only inter-agent communication channel.
//! The orchestrator freezes `agent_registry.json` and `miners.json` there
//! before any agent runs; agents later publish per-agent facts
//! (`{id}_miner_info.json`, `{id}_user_info.json`), append to
//! `transactions.json`, and the distributor records
//! `initial_funding_status.json`. Every schema in that directory lives in
//! this module so writer and readers cannot drift apart.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default shared coordination directory.
pub const DEFAULT_SHARED_DIR: &str = "/tmp/monerosim_shared";

/// Registry of all agents, written at plan time.
pub const AGENT_REGISTRY_FILE: &str = "agent_registry.json";
/// Miner directory with hashrate shares, written at plan time.
pub const MINER_REGISTRY_FILE: &str = "miners.json";
/// Append-only transaction log.
pub const TRANSACTIONS_FILE: &str = "transactions.json";
/// Distributor bootstrap summary.
pub const FUNDING_STATUS_FILE: &str = "initial_funding_status.json";
/// Block controller checkpoint feed.
pub const DNS_CHECKPOINTS_FILE: &str = "dns_checkpoints.json";
/// Block controller state.
pub const BLOCK_CONTROLLER_FILE: &str = "block_controller.json";
/// Simulation monitor rolling status.
pub const SIMULATION_STATUS_FILE: &str = "simulation_status.json";

/// Self-description fact published by a mining agent.
pub fn miner_info_file(agent_id: &str) -> String {
    format!("{}_miner_info.json", agent_id)
}

/// Self-description fact published by a non-mining agent.
pub fn user_info_file(agent_id: &str) -> String {
    format!("{}_user_info.json", agent_id)
}

/// Standard RPC/P2P ports. Each host has its own address, so every host
/// uses the same ports.
pub const P2P_PORT: u16 = 28080;
pub const DAEMON_RPC_PORT: u16 = 28081;
pub const WALLET_RPC_PORT: u16 = 28082;

/// One agent's entry in the runtime-visible directory.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AgentEntry {
    pub id: String,
    /// miner / regular-user / distributor / block-controller / monitor / custom
    pub role: String,
    pub ip_addr: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub daemon_rpc_port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wallet_rpc_port: Option<u16>,
    /// Free-form attribute map from the cohort definition
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    /// Published by the agent itself once its wallet is open
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wallet_address: Option<String>,
}

impl AgentEntry {
    pub fn daemon_rpc_url(&self) -> Option<String> {
        self.daemon_rpc_port
            .map(|port| format!("http://{}:{}/json_rpc", self.ip_addr, port))
    }

    pub fn wallet_rpc_url(&self) -> Option<String> {
        self.wallet_rpc_port
            .map(|port| format!("http://{}:{}/json_rpc", self.ip_addr, port))
    }
}

/// The full agent directory.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct AgentRegistry {
    pub agents: Vec<AgentEntry>,
}

impl AgentRegistry {
    pub fn get(&self, agent_id: &str) -> Option<&AgentEntry> {
        self.agents.iter().find(|a| a.id == agent_id)
    }
}

/// One miner's entry in the miner directory.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct MinerEntry {
    pub agent_id: String,
    pub ip_addr: String,
    /// Percentage share of the network hashrate baseline
    pub hashrate: f64,
    /// Published by the miner after it opens its wallet
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wallet_address: Option<String>,
}

/// The miner directory.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct MinerRegistry {
    pub miners: Vec<MinerEntry>,
}

/// Per-agent self-description fact. The writer is the agent named in the
/// filename; everyone else only reads.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AgentFact {
    pub agent_id: String,
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wallet_address: Option<String>,
    pub registered_at: DateTime<Utc>,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

/// One row of the append-only transaction log.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TransactionRecord {
    pub tx_hash: String,
    pub sender: String,
    pub recipient: String,
    /// Atomic units
    pub amount: u64,
    pub timestamp: DateTime<Utc>,
    pub status: String,
}

/// Outcome of one funding attempt.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct FundingOutcome {
    pub recipient: String,
    pub amount: u64,
    pub funded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Distributor bootstrap summary.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct FundingStatus {
    pub source_miner: Option<String>,
    pub eligible: usize,
    pub funded: usize,
    pub outcomes: Vec<FundingOutcome>,
    pub completed_at: Option<DateTime<Utc>>,
}
