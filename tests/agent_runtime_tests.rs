//! Agent runtime tests that exercise the full lifecycle against a
//! seeded shared directory, without live daemon or wallet processes.

use monerosim::agent::distributor::MinerDistributor;
use monerosim::agent::lifecycle::{run_agent, AgentConfig};
use monerosim::agent::SharedStore;
use monerosim::registry::{
    miner_info_file, AgentEntry, AgentFact, AgentRegistry, FundingStatus, MinerEntry,
    MinerRegistry, AGENT_REGISTRY_FILE, DAEMON_RPC_PORT, FUNDING_STATUS_FILE,
    MINER_REGISTRY_FILE, WALLET_RPC_PORT,
};
use std::collections::BTreeMap;

fn seed_shared_dir(store: &SharedStore) {
    store
        .write(
            MINER_REGISTRY_FILE,
            &MinerRegistry {
                miners: vec![MinerEntry {
                    agent_id: "miners000".to_string(),
                    ip_addr: "192.168.0.10".to_string(),
                    hashrate: 100.0,
                    wallet_address: None,
                }],
            },
        )
        .unwrap();
    store
        .write(
            AGENT_REGISTRY_FILE,
            &AgentRegistry {
                agents: vec![AgentEntry {
                    id: "miners000".to_string(),
                    role: "miner".to_string(),
                    ip_addr: "192.168.0.10".to_string(),
                    daemon_rpc_port: Some(DAEMON_RPC_PORT),
                    wallet_rpc_port: Some(WALLET_RPC_PORT),
                    attributes: BTreeMap::new(),
                    wallet_address: None,
                }],
            },
        )
        .unwrap();
    // The miner has already published its wallet address.
    store
        .write(
            &miner_info_file("miners000"),
            &AgentFact {
                agent_id: "miners000".to_string(),
                role: "miner".to_string(),
                wallet_address: Some("4MinerAddr".to_string()),
                registered_at: chrono::Utc::now(),
                attributes: BTreeMap::new(),
            },
        )
        .unwrap();
}

#[test]
fn test_distributor_without_recipients_exits_cleanly() {
    let dir = tempfile::tempdir().unwrap();
    let store = SharedStore::new(dir.path()).unwrap();
    seed_shared_dir(&store);

    let config = AgentConfig {
        agent_id: "distributor000".to_string(),
        shared_dir: dir.path().to_path_buf(),
        rpc_host: None,
        daemon_rpc_port: None,
        wallet_rpc_port: None,
        attributes: BTreeMap::new(),
        global_seed: 42,
    };
    let mut behavior = MinerDistributor::from_attributes(&BTreeMap::new());

    // With a registered miner but zero eligible recipients, the pass
    // completes immediately and the agent retires itself.
    let code = run_agent(config, &mut behavior);
    assert_eq!(code, 0);

    let status: FundingStatus = store
        .read(FUNDING_STATUS_FILE)
        .unwrap()
        .expect("funding status must be recorded");
    assert_eq!(status.eligible, 0);
    assert_eq!(status.funded, 0);
    assert_eq!(status.source_miner.as_deref(), Some("miners000"));
    assert!(status.completed_at.is_some());
    assert!(status.outcomes.is_empty());
}

#[test]
fn test_distributor_publishes_own_fact() {
    let dir = tempfile::tempdir().unwrap();
    let store = SharedStore::new(dir.path()).unwrap();
    seed_shared_dir(&store);

    let config = AgentConfig {
        agent_id: "distributor000".to_string(),
        shared_dir: dir.path().to_path_buf(),
        rpc_host: None,
        daemon_rpc_port: None,
        wallet_rpc_port: None,
        attributes: BTreeMap::new(),
        global_seed: 42,
    };
    let mut behavior = MinerDistributor::from_attributes(&BTreeMap::new());
    run_agent(config, &mut behavior);

    let fact: AgentFact = store
        .read("distributor000_user_info.json")
        .unwrap()
        .expect("distributor must register itself");
    assert_eq!(fact.role, "distributor");
    assert_eq!(fact.wallet_address, None);
}
