//! Configuration orchestrator.
//!
//! Runs the whole planning pipeline: validate the scenario, load and
//! validate the topology, place agents on nodes, allocate addresses, plan
//! every host's processes, freeze the registries, validate binaries, and
//! write the simulator manifest. Everything iterates in sorted order and
//! every identifier derives from the scenario, so two runs over the same
//! inputs emit byte-identical output.

use crate::config::{Attributes, BehaviorKind, Config, Network};
use crate::gml_parser::{self, GmlGraph};
use crate::ip::{allocate_agent_ip, AsSubnetManager, GlobalIpRegistry};
use crate::process::{plan_host, HostSpec, PlanContext};
use crate::registry::{
    AgentEntry, AgentRegistry, MinerEntry, MinerRegistry, AGENT_REGISTRY_FILE,
    DAEMON_RPC_PORT, DEFAULT_SHARED_DIR, MINER_REGISTRY_FILE, P2P_PORT, WALLET_RPC_PORT,
};
use crate::shadow::{
    ShadowConfig, ShadowExperimental, ShadowGeneral, ShadowGraph, ShadowHost, ShadowNetwork,
};
use crate::topology::{distribute_agents, peer_args};
use crate::utils::binary::validate_binary;
use crate::utils::duration::parse_duration_to_seconds;
use crate::utils::options::{merge_options, options_to_args};
use crate::utils::seed::SIMULATION_SEED_ENV;
use log::info;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Stable name of the normalized topology artifact in the output dir.
const TOPOLOGY_ARTIFACT: &str = "network_topology.gml";
/// Stable name of the simulator manifest in the output dir.
const MANIFEST_FILE: &str = "shadow.yaml";

/// Stagger slot where non-mining daemon hosts begin launching.
const NON_MINER_BASE_SLOT: u64 = 5;
/// Stagger slot where service-only hosts (no daemon) begin launching.
const SERVICE_BASE_SLOT: u64 = 10;

/// Plan-time failure, classified by CLI exit code.
#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("{0}")]
    Config(String),

    #[error("{0}")]
    Binary(String),

    #[error("{0}")]
    Filesystem(String),
}

impl PlanError {
    pub fn exit_code(&self) -> i32 {
        match self {
            PlanError::Config(_) => 1,
            PlanError::Binary(_) => 2,
            PlanError::Filesystem(_) => 3,
        }
    }
}

/// What the pipeline produced, for the CLI summary.
#[derive(Debug)]
pub struct PlanSummary {
    pub manifest_path: PathBuf,
    pub host_count: usize,
    pub agent_count: usize,
    pub miner_count: usize,
    pub ip_stats: BTreeMap<String, usize>,
}

struct PlannedAgent {
    agent_id: String,
    cohort_name: String,
    behavior: Option<BehaviorKind>,
    attributes: Attributes,
    has_daemon: bool,
    has_wallet: bool,
    node_id: u32,
    ip: String,
    base_start_secs: u64,
    start_offset_secs: u64,
}

/// Generate the simulator manifest and runtime registries.
///
/// `scenario_name` feeds plan-scoped identifiers; `agent_binary` is the
/// absolute path of the agent runtime wired into every host.
pub fn generate_simulation(
    config: &Config,
    scenario_name: &str,
    output_dir: &Path,
    agent_binary: &str,
) -> Result<PlanSummary, PlanError> {
    config
        .validate()
        .map_err(|e| PlanError::Config(e.to_string()))?;

    let stop_time_secs = parse_duration_to_seconds(&config.general.stop_time)
        .map_err(PlanError::Config)?;

    let shared_dir = config
        .general
        .shared_dir
        .clone()
        .unwrap_or_else(|| DEFAULT_SHARED_DIR.to_string());

    // Topology graph, when the scenario references one.
    let gml_graph = load_topology(config)?;
    let peer_mode = config
        .network
        .as_ref()
        .map(|n| n.peer_mode())
        .unwrap_or_default();

    let ctx = build_plan_context(config, &shared_dir, agent_binary);

    // Enumerate agents in sorted cohort order; ids are stable across runs.
    let mut agents = enumerate_agents(config)?;

    // Distribute agents onto topology nodes.
    if let Some(graph) = &gml_graph {
        let assignments = distribute_agents(graph, agents.len());
        for (agent, node_id) in agents.iter_mut().zip(assignments) {
            agent.node_id = node_id;
        }
    }

    // Allocate addresses, in sorted agent order.
    let subnet_manager = gml_graph
        .as_ref()
        .map(AsSubnetManager::from_graph)
        .unwrap_or_default();
    let mut ip_registry = GlobalIpRegistry::new();
    for agent in agents.iter_mut() {
        let node = gml_graph
            .as_ref()
            .and_then(|g| g.nodes.iter().find(|n| n.id == agent.node_id));
        agent.ip = allocate_agent_ip(&agent.agent_id, node, &subnet_manager, &mut ip_registry)
            .map_err(|e| PlanError::Config(e.to_string()))?;
    }

    // Freeze the registries before any agent can run.
    std::fs::create_dir_all(&shared_dir).map_err(|e| {
        PlanError::Filesystem(format!("cannot create shared directory {}: {}", shared_dir, e))
    })?;
    let agent_registry = build_agent_registry(&agents);
    let miner_registry = build_miner_registry(&agents);
    write_json(
        &Path::new(&shared_dir).join(AGENT_REGISTRY_FILE),
        &agent_registry,
    )?;
    write_json(
        &Path::new(&shared_dir).join(MINER_REGISTRY_FILE),
        &miner_registry,
    )?;

    if miner_registry.miners.is_empty() {
        log::warn!("No miners in the scenario; the chain will not advance");
    }

    // Plan every host.
    let daemon_endpoints: Vec<String> = agents
        .iter()
        .filter(|a| a.has_daemon)
        .map(|a| format!("{}:{}", a.ip, P2P_PORT))
        .collect();

    let mut hosts: BTreeMap<String, ShadowHost> = BTreeMap::new();
    let mut used_binaries: Vec<String> = Vec::new();
    let mut daemon_index = 0usize;
    for agent in &agents {
        let wiring = if agent.has_daemon {
            let args = peer_args(peer_mode, daemon_index, &daemon_endpoints);
            daemon_index += 1;
            args
        } else {
            Vec::new()
        };

        let cohort = &config.agents.cohorts[&agent.cohort_name];
        let spec = HostSpec {
            agent_id: &agent.agent_id,
            ip: &agent.ip,
            network_node_id: agent.node_id,
            cohort,
            behavior: agent.behavior.clone(),
            peer_args: wiring,
            base_start_secs: agent.base_start_secs,
            start_offset_secs: agent.start_offset_secs,
        };
        let host = plan_host(&spec, &ctx, &mut used_binaries).map_err(PlanError::Config)?;
        hosts.insert(agent.agent_id.clone(), host);
    }

    // Shadow wants a host per GML node even when no agent landed there.
    if let Some(graph) = &gml_graph {
        let occupied: std::collections::BTreeSet<u32> =
            agents.iter().map(|a| a.node_id).collect();
        for node in &graph.nodes {
            if !occupied.contains(&node.id) {
                hosts.insert(
                    format!("gml-node-{}", node.id),
                    ShadowHost {
                        network_node_id: node.id,
                        ip_addr: None,
                        processes: Vec::new(),
                        bandwidth_down: Some("1000000000".to_string()),
                        bandwidth_up: Some("1000000000".to_string()),
                    },
                );
            }
        }
    }

    // Validate binaries before anything is written to the output.
    used_binaries.push("/bin/bash".to_string());
    used_binaries.sort();
    used_binaries.dedup();
    for binary in &used_binaries {
        validate_binary(Path::new(binary)).map_err(|e| PlanError::Binary(e.to_string()))?;
    }

    // Emit artifacts.
    std::fs::create_dir_all(output_dir).map_err(|e| {
        PlanError::Filesystem(format!(
            "cannot create output directory {}: {}",
            output_dir.display(),
            e
        ))
    })?;

    let graph = match (&config.network, &gml_graph) {
        (Some(Network::Gml { .. }), Some(gml)) => {
            let artifact = output_dir.join(TOPOLOGY_ARTIFACT);
            std::fs::write(&artifact, gml.to_gml_string()).map_err(|e| {
                PlanError::Filesystem(format!("cannot write {}: {}", artifact.display(), e))
            })?;
            ShadowGraph::gml(artifact.display().to_string())
        }
        (Some(Network::Switch { network_type, .. }), _) => ShadowGraph::switch(network_type),
        _ => ShadowGraph::switch("1_gbit_switch"),
    };

    let shadow_config = ShadowConfig {
        general: ShadowGeneral {
            stop_time: stop_time_secs,
            seed: config.general.simulation_seed,
            parallelism: config.general.parallelism,
            model_unblocked_syscall_latency: true,
            log_level: config
                .general
                .log_level
                .clone()
                .unwrap_or_else(|| "info".to_string()),
            bootstrap_end_time: config.general.bootstrap_end_time.clone(),
            progress: config.general.progress.unwrap_or(true),
        },
        experimental: ShadowExperimental {
            runahead: None,
            use_dynamic_runahead: true,
        },
        network: ShadowNetwork { graph },
        hosts,
    };

    let manifest_path = output_dir.join(MANIFEST_FILE);
    let manifest_yaml = serde_yaml::to_string(&shadow_config)
        .map_err(|e| PlanError::Config(format!("manifest serialization failed: {}", e)))?;
    std::fs::write(&manifest_path, manifest_yaml).map_err(|e| {
        PlanError::Filesystem(format!("cannot write {}: {}", manifest_path.display(), e))
    })?;

    info!(
        "Generated manifest for scenario '{}' at {:?}",
        scenario_name, manifest_path
    );

    Ok(PlanSummary {
        manifest_path,
        host_count: shadow_config.hosts.len(),
        agent_count: agents.len(),
        miner_count: miner_registry.miners.len(),
        ip_stats: ip_registry.allocation_stats(),
    })
}

fn load_topology(config: &Config) -> Result<Option<GmlGraph>, PlanError> {
    let Some(path) = config.network.as_ref().and_then(|n| n.gml_path()) else {
        return Ok(None);
    };
    let graph = gml_parser::parse_gml_file(path)
        .map_err(|e| PlanError::Config(format!("topology '{}': {}", path, e)))?;
    gml_parser::validate_topology(&graph)
        .map_err(|e| PlanError::Config(format!("topology '{}': {}", path, e)))?;
    info!(
        "Loaded topology '{}' with {} nodes and {} edges",
        path,
        graph.nodes.len(),
        graph.edges.len()
    );
    Ok(Some(graph))
}

fn build_plan_context(config: &Config, shared_dir: &str, agent_binary: &str) -> PlanContext {
    // The deterministic-critical environment every child inherits.
    // PYTHONHASHSEED pins hash randomization for custom script agents.
    let mut base_env: BTreeMap<String, String> = [
        ("MALLOC_MMAP_THRESHOLD_", "131072"),
        ("MALLOC_TRIM_THRESHOLD_", "131072"),
        ("MALLOC_ARENA_MAX", "1"),
        ("GLIBC_TUNABLES", "glibc.malloc.arena_max=1"),
        ("PYTHONHASHSEED", "0"),
        ("PYTHONUNBUFFERED", "1"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    base_env.insert(
        SIMULATION_SEED_ENV.to_string(),
        config.general.simulation_seed.to_string(),
    );
    if let Some(level) = &config.general.log_level {
        base_env.insert("MONEROSIM_LOG_LEVEL".to_string(), level.to_uppercase());
    }
    base_env.insert(
        "DIFFICULTY_CACHE_TTL".to_string(),
        config.general.difficulty_cache_ttl.to_string(),
    );

    let mut monero_env = base_env.clone();
    monero_env.insert("MONERO_BLOCK_SYNC_SIZE".to_string(), "1".to_string());
    monero_env.insert("MONERO_MAX_CONNECTIONS_PER_IP".to_string(), "20".to_string());
    monero_env.insert("MONERO_DISABLE_DNS".to_string(), "1".to_string());

    PlanContext {
        shared_dir: shared_dir.to_string(),
        fresh_blockchain: config.general.fresh_blockchain.unwrap_or(true),
        agent_binary: agent_binary.to_string(),
        base_env,
        monero_env,
        daemon_option_args: options_to_args(&merge_options(
            config.general.daemon_defaults.as_ref(),
            None,
        )),
        wallet_option_args: options_to_args(&merge_options(
            config.general.wallet_defaults.as_ref(),
            None,
        )),
        agent_log_level: config
            .general
            .log_level
            .clone()
            .unwrap_or_else(|| "info".to_string()),
    }
}

fn enumerate_agents(config: &Config) -> Result<Vec<PlannedAgent>, PlanError> {
    let mut agents = Vec::new();

    for (cohort_name, cohort) in &config.agents.cohorts {
        let behavior = cohort
            .behavior()
            .map_err(|e| PlanError::Config(e.to_string()))?;
        let mut attributes = match &cohort.attributes {
            Some(map) => Attributes::from_map(map).map_err(|e| PlanError::Config(e.to_string()))?,
            None => Attributes::default(),
        };
        if matches!(behavior, Some(BehaviorKind::AutonomousMiner)) {
            attributes.is_miner = true;
        }
        let start_offset_secs = match &cohort.start_time_offset {
            Some(offset) => parse_duration_to_seconds(offset).map_err(|e| {
                PlanError::Config(format!(
                    "cohort '{}' start_time_offset: {}",
                    cohort_name, e
                ))
            })?,
            None => 0,
        };

        for i in 0..cohort.count {
            agents.push(PlannedAgent {
                agent_id: format!("{}{:03}", cohort_name, i),
                cohort_name: cohort_name.clone(),
                behavior: behavior.clone(),
                attributes: attributes.clone(),
                has_daemon: cohort.has_daemon(),
                has_wallet: cohort.has_wallet(),
                node_id: 0,
                ip: String::new(),
                base_start_secs: 0,
                start_offset_secs,
            });
        }
    }

    agents.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));

    // Miners take the earliest slots so the chain starts moving before
    // users come up; service-only hosts come last.
    let mut miner_slot = 0u64;
    let mut daemon_slot = 0u64;
    let mut service_slot = 0u64;
    for agent in agents.iter_mut() {
        agent.base_start_secs = if agent.attributes.is_miner {
            let slot = miner_slot;
            miner_slot += 1;
            slot
        } else if agent.has_daemon {
            let slot = NON_MINER_BASE_SLOT + daemon_slot;
            daemon_slot += 1;
            slot
        } else {
            let slot = SERVICE_BASE_SLOT + service_slot;
            service_slot += 1;
            slot
        };
    }

    Ok(agents)
}

fn build_agent_registry(agents: &[PlannedAgent]) -> AgentRegistry {
    let mut registry = AgentRegistry::default();
    for agent in agents {
        let cohort_attr_map = agent
            .attributes
            .extra
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()));
        let mut attributes: BTreeMap<String, String> = cohort_attr_map.collect();
        attributes.insert("is_miner".to_string(), agent.attributes.is_miner.to_string());
        attributes.insert(
            "can_receive_distributions".to_string(),
            agent.attributes.can_receive_distributions.to_string(),
        );
        if let Some(hashrate) = agent.attributes.hashrate {
            attributes.insert("hashrate".to_string(), hashrate.to_string());
        }
        if let Some(interval) = agent.attributes.transaction_interval {
            attributes.insert("transaction_interval".to_string(), interval.to_string());
        }
        if let Some(start) = agent.attributes.activity_start_time {
            attributes.insert("activity_start_time".to_string(), start.to_string());
        }

        let role = if agent.attributes.is_miner {
            "miner".to_string()
        } else {
            agent
                .behavior
                .as_ref()
                .map(|b| b.role().to_string())
                .unwrap_or_else(|| "custom".to_string())
        };

        registry.agents.push(AgentEntry {
            id: agent.agent_id.clone(),
            role,
            ip_addr: agent.ip.clone(),
            daemon_rpc_port: agent.has_daemon.then_some(DAEMON_RPC_PORT),
            wallet_rpc_port: agent.has_wallet.then_some(WALLET_RPC_PORT),
            attributes,
            wallet_address: None,
        });
    }
    registry
}

fn build_miner_registry(agents: &[PlannedAgent]) -> MinerRegistry {
    let mut registry = MinerRegistry::default();
    for agent in agents {
        if agent.attributes.is_miner {
            registry.miners.push(MinerEntry {
                agent_id: agent.agent_id.clone(),
                ip_addr: agent.ip.clone(),
                hashrate: agent.attributes.hashrate.unwrap_or(0.0),
                wallet_address: None,
            });
        }
    }
    registry
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<(), PlanError> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| PlanError::Config(format!("serialization failed: {}", e)))?;
    std::fs::write(path, json)
        .map_err(|e| PlanError::Filesystem(format!("cannot write {}: {}", path.display(), e)))
}
