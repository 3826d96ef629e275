//! End-to-end planning pipeline tests: scenario in, manifest and
//! registries out, with fake executables standing in for the Monero
//! binaries.

use monerosim::config::Config;
use monerosim::orchestrator::{generate_simulation, PlanError};
use monerosim::registry::{AgentRegistry, MinerRegistry};
use std::collections::BTreeSet;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

struct Sandbox {
    _root: tempfile::TempDir,
    bin_dir: PathBuf,
    shared_dir: PathBuf,
    output_dir: PathBuf,
    agent_binary: PathBuf,
}

impl Sandbox {
    fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        let bin_dir = root.path().join("bin");
        let shared_dir = root.path().join("shared");
        let output_dir = root.path().join("out");
        fs::create_dir_all(&bin_dir).unwrap();

        let agent_binary = fake_binary(&bin_dir, "monerosim-agent");
        fake_binary(&bin_dir, "monerod");
        fake_binary(&bin_dir, "monero-wallet-rpc");

        Sandbox {
            _root: root,
            bin_dir,
            shared_dir,
            output_dir,
            agent_binary,
        }
    }

    fn binary(&self, name: &str) -> String {
        self.bin_dir.join(name).display().to_string()
    }

    fn scenario(&self, body: &str) -> Config {
        let yaml = body
            .replace("@monerod@", &self.binary("monerod"))
            .replace("@wallet@", &self.binary("monero-wallet-rpc"))
            .replace("@shared@", &self.shared_dir.display().to_string());
        serde_yaml::from_str(&yaml).unwrap()
    }

    fn generate(&self, config: &Config) -> Result<String, PlanError> {
        let summary = generate_simulation(
            config,
            "test-scenario",
            &self.output_dir,
            &self.agent_binary.display().to_string(),
        )?;
        Ok(fs::read_to_string(summary.manifest_path).unwrap())
    }
}

fn fake_binary(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, b"#!/bin/sh\nexit 0\n").unwrap();
    let mut perms = fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&path, perms).unwrap();
    path
}

fn fairness_scenario(sandbox: &Sandbox) -> Config {
    sandbox.scenario(
        r#"
general:
  stop_time: "600s"
  simulation_seed: 42
  shared_dir: "@shared@"
agents:
  miners:
    count: 2
    daemon: "@monerod@"
    wallet: "@wallet@"
    mining_script: autonomous_miner
    attributes:
      is_miner: "true"
      hashrate: "60"
  users:
    count: 3
    daemon: "@monerod@"
    wallet: "@wallet@"
    user_script: regular_user
    attributes:
      can_receive_distributions: "true"
"#,
    )
}

#[test]
fn test_manifest_and_registries_generated() {
    let sandbox = Sandbox::new();
    let config = fairness_scenario(&sandbox);
    let manifest = sandbox.generate(&config).unwrap();

    assert!(manifest.contains("stop_time: 600"));
    assert!(manifest.contains("seed: 42"));
    assert!(manifest.contains("miners000"));
    assert!(manifest.contains("users002"));
    assert!(manifest.contains("--regtest"));

    let agent_registry: AgentRegistry = serde_json::from_str(
        &fs::read_to_string(sandbox.shared_dir.join("agent_registry.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(agent_registry.agents.len(), 5);

    let miner_registry: MinerRegistry = serde_json::from_str(
        &fs::read_to_string(sandbox.shared_dir.join("miners.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(miner_registry.miners.len(), 2);
    assert!(miner_registry.miners.iter().all(|m| m.hashrate == 60.0));
    // Wallet addresses are published by the agents at run time, never
    // fabricated at plan time.
    assert!(miner_registry.miners.iter().all(|m| m.wallet_address.is_none()));
}

#[test]
fn test_no_two_hosts_share_an_ip() {
    let sandbox = Sandbox::new();
    let config = fairness_scenario(&sandbox);
    sandbox.generate(&config).unwrap();

    let registry: AgentRegistry = serde_json::from_str(
        &fs::read_to_string(sandbox.shared_dir.join("agent_registry.json")).unwrap(),
    )
    .unwrap();
    let ips: BTreeSet<&str> = registry.agents.iter().map(|a| a.ip_addr.as_str()).collect();
    assert_eq!(ips.len(), registry.agents.len());
}

#[test]
fn test_repeated_runs_are_byte_identical() {
    let sandbox = Sandbox::new();
    let config = fairness_scenario(&sandbox);

    let first_manifest = sandbox.generate(&config).unwrap();
    let first_agents = fs::read_to_string(sandbox.shared_dir.join("agent_registry.json")).unwrap();
    let first_miners = fs::read_to_string(sandbox.shared_dir.join("miners.json")).unwrap();

    let second_manifest = sandbox.generate(&config).unwrap();
    let second_agents = fs::read_to_string(sandbox.shared_dir.join("agent_registry.json")).unwrap();
    let second_miners = fs::read_to_string(sandbox.shared_dir.join("miners.json")).unwrap();

    assert_eq!(first_manifest, second_manifest);
    assert_eq!(first_agents, second_agents);
    assert_eq!(first_miners, second_miners);
}

#[test]
fn test_phased_upgrade_plan() {
    let sandbox = Sandbox::new();
    fake_binary(&sandbox.bin_dir, "monerod-v18");
    fake_binary(&sandbox.bin_dir, "monerod-v19");
    let config = sandbox.scenario(&format!(
        r#"
general:
  stop_time: "3h"
  shared_dir: "@shared@"
agents:
  upgrader:
    count: 1
    daemon_0: "{v18}"
    daemon_0_stop: "1h"
    daemon_1: "{v19}"
    daemon_1_start: "1h 30s"
"#,
        v18 = sandbox.binary("monerod-v18"),
        v19 = sandbox.binary("monerod-v19"),
    ));

    let manifest = sandbox.generate(&config).unwrap();
    assert!(manifest.contains("monerod-v18"));
    assert!(manifest.contains("monerod-v19"));
    assert!(manifest.contains("shutdown_time: 3600s"));
    assert!(manifest.contains("signaled: SIGTERM"));
    assert!(manifest.contains("start_time: 3630s"));
}

#[test]
fn test_phase_overlap_is_config_error() {
    let sandbox = Sandbox::new();
    let config = sandbox.scenario(
        r#"
general:
  stop_time: "3h"
  shared_dir: "@shared@"
agents:
  upgrader:
    count: 1
    daemon_0: "@monerod@"
    daemon_0_stop: "1h"
    daemon_1: "@monerod@"
    daemon_1_start: "1h"
"#,
    );
    let err = sandbox.generate(&config).unwrap_err();
    assert!(matches!(err, PlanError::Config(_)));
    assert_eq!(err.exit_code(), 1);
}

#[test]
fn test_missing_self_loop_fails_with_node_id() {
    let sandbox = Sandbox::new();
    let gml_path = sandbox.shared_dir.join("broken.gml");
    fs::create_dir_all(&sandbox.shared_dir).unwrap();
    fs::write(
        &gml_path,
        r#"graph [
            node [ id 0 ip "10.0.0.1" ]
            node [ id 1 ip "10.0.0.2" ]
            edge [ source 0 target 1 ]
            edge [ source 0 target 0 ]
        ]"#,
    )
    .unwrap();

    let config = sandbox.scenario(&format!(
        r#"
general:
  stop_time: "600s"
  shared_dir: "@shared@"
network:
  topology: "{gml}"
agents:
  nodes:
    count: 2
    daemon: "@monerod@"
"#,
        gml = gml_path.display(),
    ));

    let err = sandbox.generate(&config).unwrap_err();
    assert_eq!(err.exit_code(), 1);
    assert!(err.to_string().contains("Node 1"), "got: {}", err);
}

#[test]
fn test_dynamic_peering_emits_no_exclusive_nodes() {
    let sandbox = Sandbox::new();
    let config = sandbox.scenario(
        r#"
general:
  stop_time: "600s"
  shared_dir: "@shared@"
network:
  type: "1_gbit_switch"
  peer_mode: dynamic
agents:
  nodes:
    count: 30
    daemon: "@monerod@"
"#,
    );
    let manifest = sandbox.generate(&config).unwrap();
    assert!(!manifest.contains("--add-exclusive-node"));
    assert!(!manifest.contains("--add-priority-node"));
    // Every daemon carries the same regression-mode flags.
    assert_eq!(manifest.matches("--regtest").count(), 30);
}

#[test]
fn test_mesh_peering_pins_the_shape() {
    let sandbox = Sandbox::new();
    let config = sandbox.scenario(
        r#"
general:
  stop_time: "600s"
  shared_dir: "@shared@"
network:
  type: "1_gbit_switch"
  peer_mode: mesh
agents:
  nodes:
    count: 4
    daemon: "@monerod@"
"#,
    );
    let manifest = sandbox.generate(&config).unwrap();
    assert!(manifest.contains("--add-exclusive-node"));
    assert!(manifest.contains("--add-priority-node"));
}

#[test]
fn test_missing_binary_is_exit_code_two() {
    let sandbox = Sandbox::new();
    let config = sandbox.scenario(
        r#"
general:
  stop_time: "600s"
  shared_dir: "@shared@"
agents:
  nodes:
    count: 1
    daemon: "/nonexistent/path/monerod"
"#,
    );
    let err = sandbox.generate(&config).unwrap_err();
    assert!(matches!(err, PlanError::Binary(_)));
    assert_eq!(err.exit_code(), 2);
}

#[test]
fn test_gml_topology_artifact_and_dummy_hosts() {
    let sandbox = Sandbox::new();
    fs::create_dir_all(&sandbox.shared_dir).unwrap();
    let gml_path = sandbox.shared_dir.join("net.gml");
    fs::write(
        &gml_path,
        r#"graph [
            node [ id 0 AS "65001" ip "172.20.5.1" ]
            node [ id 1 AS "65002" ip "172.20.6.1" ]
            node [ id 2 AS "65002" ip "172.20.6.2" ]
            edge [ source 0 target 1 latency "20ms" ]
            edge [ source 1 target 2 latency "5ms" ]
            edge [ source 0 target 0 ]
            edge [ source 1 target 1 ]
            edge [ source 2 target 2 ]
        ]"#,
    )
    .unwrap();

    let config = sandbox.scenario(&format!(
        r#"
general:
  stop_time: "600s"
  shared_dir: "@shared@"
network:
  topology: "{gml}"
  peer_mode: dag
agents:
  nodes:
    count: 2
    daemon: "@monerod@"
"#,
        gml = gml_path.display(),
    ));

    let manifest = sandbox.generate(&config).unwrap();
    assert!(sandbox.output_dir.join("network_topology.gml").exists());
    assert!(manifest.contains("type: gml"));
    // Two agents on three nodes leaves one node with a placeholder host.
    assert!(manifest.contains("gml-node-2"));
    // Agents inherit declared addresses from their assigned nodes.
    assert!(manifest.contains("172.20.5.1"));
}
