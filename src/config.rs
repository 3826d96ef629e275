//! Scenario configuration model.
//!
//! A scenario is a YAML document with three sections: `general` (duration,
//! seed, logging), `network` (simple switch or GML topology reference with
//! a peer-wiring mode), and `agents` (named cohorts). Cohorts support a
//! single daemon/wallet binary or flat phase fields (`daemon_0`,
//! `daemon_0_args`, `daemon_0_start`, `daemon_0_stop`, `daemon_1`, ...)
//! for staged binary upgrades.

use crate::utils::duration::parse_duration_to_seconds;
use crate::utils::options::{parse_flexible_bool, OptionValue};
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// Peer wiring modes for generated P2P connections.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PeerWiring {
    /// All hosts list a single hub as their peer
    Star,
    /// Every host lists every other host (bounded by a cap)
    Mesh,
    /// Each host peers with its ring neighbors
    Ring,
    /// Each host peers with its predecessors
    Dag,
    /// No generated peer list; daemons discover peers themselves
    Dynamic,
}

impl Default for PeerWiring {
    fn default() -> Self {
        PeerWiring::Dynamic
    }
}

/// Behavior kinds an agent process can run. Replaces the free-form script
/// module paths of earlier versions; unknown names fail at plan time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BehaviorKind {
    AutonomousMiner,
    RegularUser,
    MinerDistributor,
    BlockController,
    SimulationMonitor,
    /// An operator-supplied executable, taken literally
    Custom(String),
}

impl BehaviorKind {
    pub fn parse(name: &str) -> Result<Self, ConfigError> {
        match name {
            "autonomous_miner" | "autonomous-miner" => Ok(BehaviorKind::AutonomousMiner),
            "regular_user" | "regular-user" => Ok(BehaviorKind::RegularUser),
            "miner_distributor" | "miner-distributor" => Ok(BehaviorKind::MinerDistributor),
            "block_controller" | "block-controller" => Ok(BehaviorKind::BlockController),
            "simulation_monitor" | "simulation-monitor" => Ok(BehaviorKind::SimulationMonitor),
            other if other.contains('/') => Ok(BehaviorKind::Custom(other.to_string())),
            other => Err(ConfigError::UnknownBehavior(other.to_string())),
        }
    }

    /// Role label recorded in the agent registry.
    pub fn role(&self) -> &str {
        match self {
            BehaviorKind::AutonomousMiner => "miner",
            BehaviorKind::RegularUser => "regular-user",
            BehaviorKind::MinerDistributor => "distributor",
            BehaviorKind::BlockController => "block-controller",
            BehaviorKind::SimulationMonitor => "monitor",
            BehaviorKind::Custom(_) => "custom",
        }
    }

    /// CLI value for the agent binary's `--behavior` flag.
    pub fn flag_value(&self) -> &str {
        match self {
            BehaviorKind::AutonomousMiner => "autonomous-miner",
            BehaviorKind::RegularUser => "regular-user",
            BehaviorKind::MinerDistributor => "miner-distributor",
            BehaviorKind::BlockController => "block-controller",
            BehaviorKind::SimulationMonitor => "simulation-monitor",
            BehaviorKind::Custom(path) => path,
        }
    }
}

/// Minimum recommended gap between a phase stop and the next phase start.
/// Smaller gaps risk the old binary still holding the data directory when
/// its successor starts; violations warn rather than fail.
pub const MIN_PHASE_GAP_SECONDS: u64 = 30;

/// Default network-wide hashrate baseline, in hashes per second.
pub const DEFAULT_TOTAL_NETWORK_HASHRATE: u64 = 1_000_000;

/// Configuration validation errors. All are fatal at plan time.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid general configuration: {0}")]
    InvalidGeneral(String),

    #[error("Invalid network configuration: {0}")]
    InvalidNetwork(String),

    #[error("Invalid cohort '{cohort}': {detail}")]
    InvalidCohort { cohort: String, detail: String },

    #[error("Invalid attribute '{key}' = '{value}': {detail}")]
    InvalidAttribute {
        key: String,
        value: String,
        detail: String,
    },

    #[error("Unknown behavior kind '{0}'")]
    UnknownBehavior(String),

    #[error(transparent)]
    Phase(#[from] PhaseError),
}

/// Errors from binary phase validation.
#[derive(Debug, thiserror::Error)]
pub enum PhaseError {
    #[error("Non-sequential {kind} phase numbering: expected {expected}, found {found}")]
    NonSequential {
        kind: &'static str,
        expected: u32,
        found: u32,
    },

    #[error("Missing path for {kind} phase {phase}")]
    MissingPath { kind: &'static str, phase: u32 },

    #[error("{kind} phase {phase}: {detail}")]
    MissingTiming {
        kind: &'static str,
        phase: u32,
        detail: String,
    },

    #[error("Cannot use both '{kind}' and '{kind}_N' fields")]
    MixedConfig { kind: &'static str },

    #[error(
        "Overlapping {kind} phases {phase} and {next}: stop '{stop}' must end strictly before start '{start}'"
    )]
    Overlapping {
        kind: &'static str,
        phase: u32,
        next: u32,
        stop: String,
        start: String,
    },

    #[error("Invalid duration in {kind} phase {phase}: {detail}")]
    InvalidDuration {
        kind: &'static str,
        phase: u32,
        detail: String,
    },
}

/// Top-level scenario configuration.
#[derive(Debug, Serialize, Deserialize)]
pub struct Config {
    pub general: GeneralConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network: Option<Network>,
    pub agents: AgentDefinitions,
}

/// Shared general configuration.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GeneralConfig {
    /// Total simulated duration (e.g. "2h", "600s")
    pub stop_time: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fresh_blockchain: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
    /// Root seed for every RNG in the simulation
    #[serde(default = "default_simulation_seed")]
    pub simulation_seed: u64,
    /// Simulator worker threads; 1 keeps runs deterministic
    #[serde(default = "default_parallelism")]
    pub parallelism: u32,
    /// Show simulation progress on stderr
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<bool>,
    /// High-bandwidth settling period before realistic constraints apply
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bootstrap_end_time: Option<String>,
    /// TTL in simulated seconds for the miners' difficulty cache
    #[serde(default = "default_difficulty_cache_ttl")]
    pub difficulty_cache_ttl: u32,
    /// Shared coordination directory; agents and registries live here
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shared_dir: Option<String>,
    /// Default daemon options applied to all cohorts (per-cohort args win)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub daemon_defaults: Option<BTreeMap<String, OptionValue>>,
    /// Default wallet options applied to all cohorts (per-cohort args win)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wallet_defaults: Option<BTreeMap<String, OptionValue>>,
}

fn default_simulation_seed() -> u64 {
    12345
}

fn default_parallelism() -> u32 {
    1
}

fn default_difficulty_cache_ttl() -> u32 {
    30
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            stop_time: "1h".to_string(),
            fresh_blockchain: Some(true),
            log_level: Some("info".to_string()),
            simulation_seed: default_simulation_seed(),
            parallelism: default_parallelism(),
            progress: Some(true),
            bootstrap_end_time: None,
            difficulty_cache_ttl: default_difficulty_cache_ttl(),
            shared_dir: None,
            daemon_defaults: None,
            wallet_defaults: None,
        }
    }
}

/// Network configuration: a simple shared switch or a GML topology file.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(untagged)]
pub enum Network {
    Gml {
        /// Path to the GML topology file
        topology: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        peer_mode: Option<PeerWiring>,
    },
    Switch {
        #[serde(rename = "type")]
        network_type: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        bandwidth: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        peer_mode: Option<PeerWiring>,
    },
}

impl Network {
    pub fn peer_mode(&self) -> PeerWiring {
        match self {
            Network::Gml { peer_mode, .. } | Network::Switch { peer_mode, .. } => {
                peer_mode.unwrap_or_default()
            }
        }
    }

    pub fn gml_path(&self) -> Option<&str> {
        match self {
            Network::Gml { topology, .. } => Some(topology),
            Network::Switch { .. } => None,
        }
    }
}

/// Named cohorts, in declaration-independent sorted order.
#[derive(Debug, Serialize, Deserialize)]
pub struct AgentDefinitions {
    #[serde(flatten)]
    pub cohorts: BTreeMap<String, CohortConfig>,
}

/// One execution interval for a daemon or wallet binary within a host.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct BinaryPhase {
    /// Binary path or shorthand name
    pub path: String,
    /// Additional CLI arguments for this phase
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<String>>,
    /// Environment variables for this phase
    #[serde(skip_serializing_if = "Option::is_none")]
    pub env: Option<BTreeMap<String, String>>,
    /// Absolute start time (phase 0 defaults to the cohort start)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,
    /// Stop time (SIGTERM); the final phase usually has none
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<String>,
}

/// A group of agents sharing one launch profile.
#[derive(Debug, Serialize)]
pub struct CohortConfig {
    /// Number of agents in the cohort
    pub count: usize,
    /// Daemon binary (single-binary shorthand for a phase-0-only plan)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub daemon: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub daemon_args: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub daemon_env: Option<BTreeMap<String, String>>,
    /// Wallet binary (single-binary shorthand)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wallet: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wallet_args: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wallet_env: Option<BTreeMap<String, String>>,
    /// Behavior kind for user-style agents
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_script: Option<String>,
    /// Behavior kind for mining agents (wins over user_script)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mining_script: Option<String>,
    /// Free-form attribute map; well-known keys are typed at plan time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attributes: Option<BTreeMap<String, String>>,
    /// Offset added to every computed start time of the cohort
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time_offset: Option<String>,
    /// Multi-phase daemon plan, collected from flat `daemon_N_*` keys
    #[serde(skip_serializing_if = "Option::is_none")]
    pub daemon_phases: Option<BTreeMap<u32, BinaryPhase>>,
    /// Multi-phase wallet plan, collected from flat `wallet_N_*` keys
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wallet_phases: Option<BTreeMap<u32, BinaryPhase>>,
}

/// Intermediate struct capturing flat phase fields during deserialization.
#[derive(Deserialize)]
struct CohortConfigRaw {
    #[serde(default = "default_count")]
    count: usize,
    #[serde(default)]
    daemon: Option<String>,
    #[serde(default)]
    daemon_args: Option<Vec<String>>,
    #[serde(default)]
    daemon_env: Option<BTreeMap<String, String>>,
    #[serde(default)]
    wallet: Option<String>,
    #[serde(default)]
    wallet_args: Option<Vec<String>>,
    #[serde(default)]
    wallet_env: Option<BTreeMap<String, String>>,
    #[serde(default)]
    user_script: Option<String>,
    #[serde(default)]
    mining_script: Option<String>,
    #[serde(default)]
    attributes: Option<BTreeMap<String, String>>,
    #[serde(default)]
    start_time_offset: Option<String>,
    #[serde(flatten)]
    extra: BTreeMap<String, serde_yaml::Value>,
}

fn default_count() -> usize {
    1
}

impl<'de> Deserialize<'de> for CohortConfig {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = CohortConfigRaw::deserialize(deserializer)?;
        let daemon_phases = parse_phase_fields("daemon", &raw.extra);
        let wallet_phases = parse_phase_fields("wallet", &raw.extra);

        Ok(CohortConfig {
            count: raw.count,
            daemon: raw.daemon,
            daemon_args: raw.daemon_args,
            daemon_env: raw.daemon_env,
            wallet: raw.wallet,
            wallet_args: raw.wallet_args,
            wallet_env: raw.wallet_env,
            user_script: raw.user_script,
            mining_script: raw.mining_script,
            attributes: raw.attributes,
            start_time_offset: raw.start_time_offset,
            daemon_phases,
            wallet_phases,
        })
    }
}

/// Collect flat phase fields (`daemon_0`, `daemon_0_args`, ...) into
/// structured phases for one binary kind.
fn parse_phase_fields(
    kind: &str,
    extra: &BTreeMap<String, serde_yaml::Value>,
) -> Option<BTreeMap<u32, BinaryPhase>> {
    let path_re = Regex::new(&format!(r"^{}_(\d+)$", kind)).unwrap();
    let args_re = Regex::new(&format!(r"^{}_(\d+)_args$", kind)).unwrap();
    let env_re = Regex::new(&format!(r"^{}_(\d+)_env$", kind)).unwrap();
    let start_re = Regex::new(&format!(r"^{}_(\d+)_start$", kind)).unwrap();
    let stop_re = Regex::new(&format!(r"^{}_(\d+)_stop$", kind)).unwrap();

    let mut phases: BTreeMap<u32, BinaryPhase> = BTreeMap::new();

    for (key, value) in extra {
        if let Some(caps) = path_re.captures(key) {
            let n: u32 = caps[1].parse().unwrap_or(0);
            phases.entry(n).or_default().path =
                value.as_str().unwrap_or("").to_string();
        } else if let Some(caps) = args_re.captures(key) {
            let n: u32 = caps[1].parse().unwrap_or(0);
            if let Some(seq) = value.as_sequence() {
                let args: Vec<String> = seq
                    .iter()
                    .filter_map(|v| v.as_str().map(|s| s.to_string()))
                    .collect();
                phases.entry(n).or_default().args = Some(args);
            }
        } else if let Some(caps) = env_re.captures(key) {
            let n: u32 = caps[1].parse().unwrap_or(0);
            if let Some(map) = value.as_mapping() {
                let env: BTreeMap<String, String> = map
                    .iter()
                    .filter_map(|(k, v)| Some((k.as_str()?.to_string(), v.as_str()?.to_string())))
                    .collect();
                phases.entry(n).or_default().env = Some(env);
            }
        } else if let Some(caps) = start_re.captures(key) {
            let n: u32 = caps[1].parse().unwrap_or(0);
            phases.entry(n).or_default().start =
                value.as_str().map(|s| s.to_string());
        } else if let Some(caps) = stop_re.captures(key) {
            let n: u32 = caps[1].parse().unwrap_or(0);
            phases.entry(n).or_default().stop =
                value.as_str().map(|s| s.to_string());
        }
    }

    if phases.is_empty() {
        None
    } else {
        Some(phases)
    }
}

impl CohortConfig {
    pub fn has_daemon(&self) -> bool {
        self.daemon.is_some() || self.has_daemon_phases()
    }

    pub fn has_wallet(&self) -> bool {
        self.wallet.is_some() || self.has_wallet_phases()
    }

    pub fn has_daemon_phases(&self) -> bool {
        self.daemon_phases.as_ref().is_some_and(|p| !p.is_empty())
    }

    pub fn has_wallet_phases(&self) -> bool {
        self.wallet_phases.as_ref().is_some_and(|p| !p.is_empty())
    }

    /// Daemon plan with the single-binary shorthand rewritten as a
    /// phase-0-only plan.
    pub fn effective_daemon_phases(&self) -> BTreeMap<u32, BinaryPhase> {
        effective_phases(&self.daemon, &self.daemon_args, &self.daemon_env, &self.daemon_phases)
    }

    /// Wallet plan, analogous to [`effective_daemon_phases`].
    pub fn effective_wallet_phases(&self) -> BTreeMap<u32, BinaryPhase> {
        effective_phases(&self.wallet, &self.wallet_args, &self.wallet_env, &self.wallet_phases)
    }

    /// Behavior kind for this cohort, if any. `mining_script` wins when
    /// both are present.
    pub fn behavior(&self) -> Result<Option<BehaviorKind>, ConfigError> {
        match self.mining_script.as_deref().or(self.user_script.as_deref()) {
            Some(name) => BehaviorKind::parse(name).map(Some),
            None => Ok(None),
        }
    }

    /// Whether the cohort mines, from the `is_miner` attribute or an
    /// autonomous-miner behavior.
    pub fn is_miner(&self) -> bool {
        if let Some(attrs) = &self.attributes {
            if let Some(value) = attrs.get("is_miner") {
                return parse_flexible_bool(value);
            }
        }
        matches!(self.behavior(), Ok(Some(BehaviorKind::AutonomousMiner)))
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.as_ref().and_then(|a| a.get(key)).map(|s| s.as_str())
    }

    /// Validate that simple and phase config are not mixed and the phase
    /// plan is well-formed.
    pub fn validate_phases(&self) -> Result<(), PhaseError> {
        if self.daemon.is_some() && self.has_daemon_phases() {
            return Err(PhaseError::MixedConfig { kind: "daemon" });
        }
        if self.wallet.is_some() && self.has_wallet_phases() {
            return Err(PhaseError::MixedConfig { kind: "wallet" });
        }
        if let Some(phases) = &self.daemon_phases {
            validate_phase_plan("daemon", phases)?;
        }
        if let Some(phases) = &self.wallet_phases {
            validate_phase_plan("wallet", phases)?;
        }
        Ok(())
    }
}

fn effective_phases(
    single: &Option<String>,
    args: &Option<Vec<String>>,
    env: &Option<BTreeMap<String, String>>,
    phases: &Option<BTreeMap<u32, BinaryPhase>>,
) -> BTreeMap<u32, BinaryPhase> {
    if let Some(phases) = phases {
        if !phases.is_empty() {
            return phases.clone();
        }
    }
    let mut out = BTreeMap::new();
    if let Some(path) = single {
        out.insert(
            0,
            BinaryPhase {
                path: path.clone(),
                args: args.clone(),
                env: env.clone(),
                start: None,
                stop: None,
            },
        );
    }
    out
}

/// Validate one binary-kind phase plan.
///
/// Rules: numbering is consecutive from 0; every phase names a path; every
/// non-final phase has a stop and every phase after 0 has a start; intervals
/// are strictly disjoint. Gaps below [`MIN_PHASE_GAP_SECONDS`] warn.
pub fn validate_phase_plan(
    kind: &'static str,
    phases: &BTreeMap<u32, BinaryPhase>,
) -> Result<(), PhaseError> {
    let numbers: Vec<u32> = phases.keys().copied().collect();
    for (i, &n) in numbers.iter().enumerate() {
        if n != i as u32 {
            return Err(PhaseError::NonSequential {
                kind,
                expected: i as u32,
                found: n,
            });
        }
    }

    for (&n, phase) in phases {
        if phase.path.is_empty() {
            return Err(PhaseError::MissingPath { kind, phase: n });
        }
    }

    for i in 0..numbers.len().saturating_sub(1) {
        let current = &phases[&numbers[i]];
        let next = &phases[&numbers[i + 1]];

        let stop = current.stop.as_deref().filter(|s| !s.is_empty()).ok_or(
            PhaseError::MissingTiming {
                kind,
                phase: numbers[i],
                detail: "stop time required when followed by another phase".to_string(),
            },
        )?;
        let start = next.start.as_deref().filter(|s| !s.is_empty()).ok_or(
            PhaseError::MissingTiming {
                kind,
                phase: numbers[i + 1],
                detail: "start time required for phases after phase 0".to_string(),
            },
        )?;

        let stop_secs =
            parse_duration_to_seconds(stop).map_err(|e| PhaseError::InvalidDuration {
                kind,
                phase: numbers[i],
                detail: format!("stop time '{}': {}", stop, e),
            })?;
        let start_secs =
            parse_duration_to_seconds(start).map_err(|e| PhaseError::InvalidDuration {
                kind,
                phase: numbers[i + 1],
                detail: format!("start time '{}': {}", start, e),
            })?;

        if start_secs <= stop_secs {
            return Err(PhaseError::Overlapping {
                kind,
                phase: numbers[i],
                next: numbers[i + 1],
                stop: stop.to_string(),
                start: start.to_string(),
            });
        }
        if start_secs - stop_secs < MIN_PHASE_GAP_SECONDS {
            log::warn!(
                "{} phases {} and {} are only {}s apart; at least {}s is recommended for a clean handover",
                kind,
                numbers[i],
                numbers[i + 1],
                start_secs - stop_secs,
                MIN_PHASE_GAP_SECONDS
            );
        }
    }

    Ok(())
}

/// Well-known cohort attributes, typed at plan time. Everything the
/// framework does not interpret stays in `extra` for the behaviors.
#[derive(Debug, Clone, PartialEq)]
pub struct Attributes {
    pub is_miner: bool,
    pub hashrate: Option<f64>,
    pub total_network_hashrate: u64,
    pub can_receive_distributions: bool,
    pub transaction_interval: Option<u64>,
    pub activity_start_time: Option<u64>,
    pub min_tx_amount: f64,
    pub max_tx_amount: f64,
    pub extra: BTreeMap<String, String>,
}

impl Default for Attributes {
    fn default() -> Self {
        Self {
            is_miner: false,
            hashrate: None,
            total_network_hashrate: DEFAULT_TOTAL_NETWORK_HASHRATE,
            can_receive_distributions: false,
            transaction_interval: None,
            activity_start_time: None,
            min_tx_amount: 0.1,
            max_tx_amount: 1.0,
            extra: BTreeMap::new(),
        }
    }
}

impl Attributes {
    /// Parse the free-form attribute map. Well-known keys must parse to
    /// their declared type; unknown keys pass through untouched.
    pub fn from_map(map: &BTreeMap<String, String>) -> Result<Self, ConfigError> {
        let mut attrs = Attributes::default();

        for (key, value) in map {
            match key.as_str() {
                "is_miner" => attrs.is_miner = parse_flexible_bool(value),
                "can_receive_distributions" => {
                    attrs.can_receive_distributions = parse_flexible_bool(value)
                }
                "hashrate" => {
                    let rate: f64 = value.parse().map_err(|_| invalid(key, value, "not a number"))?;
                    if rate <= 0.0 || rate > 100.0 {
                        return Err(invalid(key, value, "must be in (0, 100]"));
                    }
                    attrs.hashrate = Some(rate);
                }
                "total_network_hashrate" => {
                    let total: u64 = value.parse().map_err(|_| invalid(key, value, "not an integer"))?;
                    if total == 0 {
                        return Err(invalid(key, value, "must be positive"));
                    }
                    attrs.total_network_hashrate = total;
                }
                "transaction_interval" => {
                    attrs.transaction_interval = Some(parse_numeric_or_duration(key, value)?)
                }
                "activity_start_time" => {
                    attrs.activity_start_time = Some(parse_numeric_or_duration(key, value)?)
                }
                "min_tx_amount" => {
                    attrs.min_tx_amount =
                        value.parse().map_err(|_| invalid(key, value, "not a number"))?
                }
                "max_tx_amount" => {
                    attrs.max_tx_amount =
                        value.parse().map_err(|_| invalid(key, value, "not a number"))?
                }
                _ => {
                    attrs.extra.insert(key.clone(), value.clone());
                }
            }
        }

        if attrs.min_tx_amount <= 0.0 || attrs.max_tx_amount < attrs.min_tx_amount {
            return Err(ConfigError::InvalidAttribute {
                key: "min_tx_amount/max_tx_amount".to_string(),
                value: format!("{}/{}", attrs.min_tx_amount, attrs.max_tx_amount),
                detail: "amounts must be positive and min <= max".to_string(),
            });
        }

        Ok(attrs)
    }
}

/// Attribute durations come either as bare seconds ("120") or as duration
/// strings ("2m"); both forms are in the field.
fn parse_numeric_or_duration(key: &str, value: &str) -> Result<u64, ConfigError> {
    if let Ok(seconds) = value.parse::<u64>() {
        return Ok(seconds);
    }
    parse_duration_to_seconds(value).map_err(|e| invalid(key, value, &e))
}

fn invalid(key: &str, value: &str, detail: &str) -> ConfigError {
    ConfigError::InvalidAttribute {
        key: key.to_string(),
        value: value.to_string(),
        detail: detail.to_string(),
    }
}

impl Config {
    /// Validate the scenario before any planning begins.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let stop_secs = parse_duration_to_seconds(&self.general.stop_time).map_err(|e| {
            ConfigError::InvalidGeneral(format!("stop_time '{}': {}", self.general.stop_time, e))
        })?;

        if let Some(bootstrap) = &self.general.bootstrap_end_time {
            parse_duration_to_seconds(bootstrap).map_err(|e| {
                ConfigError::InvalidGeneral(format!("bootstrap_end_time '{}': {}", bootstrap, e))
            })?;
        }

        if let Some(Network::Gml { topology, .. }) = &self.network {
            if topology.is_empty() {
                return Err(ConfigError::InvalidNetwork(
                    "topology path cannot be empty".to_string(),
                ));
            }
        }
        if let Some(Network::Switch { network_type, .. }) = &self.network {
            if network_type.is_empty() {
                return Err(ConfigError::InvalidNetwork(
                    "network type cannot be empty".to_string(),
                ));
            }
        }

        if self.agents.cohorts.is_empty() {
            return Err(ConfigError::InvalidGeneral(
                "at least one cohort is required".to_string(),
            ));
        }

        for (name, cohort) in &self.agents.cohorts {
            if name.is_empty()
                || !name
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-')
            {
                return Err(ConfigError::InvalidCohort {
                    cohort: name.clone(),
                    detail: "cohort names must be alphanumeric (hostname-safe, no underscores)"
                        .to_string(),
                });
            }
            if cohort.count == 0 {
                return Err(ConfigError::InvalidCohort {
                    cohort: name.clone(),
                    detail: "count must be at least 1".to_string(),
                });
            }
            cohort.validate_phases().map_err(ConfigError::Phase)?;
            cohort.behavior()?;

            if let Some(attrs) = &cohort.attributes {
                let typed = Attributes::from_map(attrs)?;
                if cohort.is_miner() && typed.hashrate.is_none() {
                    return Err(ConfigError::InvalidCohort {
                        cohort: name.clone(),
                        detail: "mining cohorts must declare a hashrate attribute".to_string(),
                    });
                }
                if let Some(start) = typed.activity_start_time {
                    if start >= stop_secs {
                        return Err(ConfigError::InvalidCohort {
                            cohort: name.clone(),
                            detail: format!(
                                "activity_start_time {}s is at or after stop_time {}s",
                                start, stop_secs
                            ),
                        });
                    }
                }
            } else if cohort.is_miner() {
                return Err(ConfigError::InvalidCohort {
                    cohort: name.clone(),
                    detail: "mining cohorts must declare a hashrate attribute".to_string(),
                });
            }

            if cohort.is_miner() && !cohort.has_daemon() {
                return Err(ConfigError::InvalidCohort {
                    cohort: name.clone(),
                    detail: "mining cohorts need a local daemon".to_string(),
                });
            }
            if cohort.is_miner() && !cohort.has_wallet() {
                return Err(ConfigError::InvalidCohort {
                    cohort: name.clone(),
                    detail: "mining cohorts need a wallet for the reward address".to_string(),
                });
            }
        }

        self.validate_peer_mode()?;

        Ok(())
    }

    /// Total hosts that run a daemon, which is what peer wiring sees.
    pub fn daemon_host_count(&self) -> usize {
        self.agents
            .cohorts
            .values()
            .filter(|c| c.has_daemon())
            .map(|c| c.count)
            .sum()
    }

    fn validate_peer_mode(&self) -> Result<(), ConfigError> {
        let Some(network) = &self.network else {
            return Ok(());
        };
        let hosts = self.daemon_host_count();
        match network.peer_mode() {
            PeerWiring::Star if hosts < 2 => Err(ConfigError::InvalidNetwork(format!(
                "star wiring requires at least 2 daemon hosts, found {}",
                hosts
            ))),
            PeerWiring::Ring if hosts < 3 => Err(ConfigError::InvalidNetwork(format!(
                "ring wiring requires at least 3 daemon hosts, found {}",
                hosts
            ))),
            PeerWiring::Mesh if hosts > 50 => Err(ConfigError::InvalidNetwork(format!(
                "mesh wiring over 50 daemon hosts ({}) floods the connection table; use dag or dynamic",
                hosts
            ))),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_yaml() -> &'static str {
        r#"
general:
  stop_time: "600s"
  simulation_seed: 42
agents:
  miners:
    count: 2
    daemon: monerod
    wallet: monero-wallet-rpc
    mining_script: autonomous_miner
    attributes:
      is_miner: "true"
      hashrate: "50"
"#
    }

    #[test]
    fn test_parse_minimal_scenario() {
        let config: Config = serde_yaml::from_str(minimal_yaml()).unwrap();
        assert_eq!(config.general.simulation_seed, 42);
        let cohort = &config.agents.cohorts["miners"];
        assert_eq!(cohort.count, 2);
        assert!(cohort.is_miner());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_flat_phase_fields() {
        let yaml = r#"
count: 1
daemon_0: monerod-v18
daemon_0_args: ["--extra-flag"]
daemon_0_stop: "1h"
daemon_1: monerod-v19
daemon_1_start: "1h 30s"
daemon_1_env:
  UPGRADE: "1"
"#;
        let cohort: CohortConfig = serde_yaml::from_str(yaml).unwrap();
        let phases = cohort.daemon_phases.as_ref().unwrap();
        assert_eq!(phases.len(), 2);
        assert_eq!(phases[&0].path, "monerod-v18");
        assert_eq!(phases[&0].stop.as_deref(), Some("1h"));
        assert_eq!(phases[&1].path, "monerod-v19");
        assert_eq!(phases[&1].start.as_deref(), Some("1h 30s"));
        assert_eq!(
            phases[&1].env.as_ref().unwrap().get("UPGRADE").map(|s| s.as_str()),
            Some("1")
        );
        assert!(cohort.validate_phases().is_ok());
    }

    #[test]
    fn test_phase_overlap_rejected() {
        let yaml = r#"
count: 1
daemon_0: monerod-v18
daemon_0_stop: "1h"
daemon_1: monerod-v19
daemon_1_start: "1h"
"#;
        let cohort: CohortConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(matches!(
            cohort.validate_phases(),
            Err(PhaseError::Overlapping { .. })
        ));
    }

    #[test]
    fn test_phase_gap_in_wrong_order_rejected() {
        let yaml = r#"
count: 1
daemon_0: monerod-v18
daemon_0_stop: "2h"
daemon_1: monerod-v19
daemon_1_start: "1h"
"#;
        let cohort: CohortConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(cohort.validate_phases().is_err());
    }

    #[test]
    fn test_non_sequential_phases_rejected() {
        let yaml = r#"
count: 1
daemon_0: monerod-v18
daemon_0_stop: "1h"
daemon_2: monerod-v19
daemon_2_start: "2h"
"#;
        let cohort: CohortConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(matches!(
            cohort.validate_phases(),
            Err(PhaseError::NonSequential { expected: 1, found: 2, .. })
        ));
    }

    #[test]
    fn test_mixed_config_rejected() {
        let yaml = r#"
count: 1
daemon: monerod
daemon_0: monerod-v18
"#;
        let cohort: CohortConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(matches!(
            cohort.validate_phases(),
            Err(PhaseError::MixedConfig { kind: "daemon" })
        ));
    }

    #[test]
    fn test_single_binary_rewritten_as_phase_zero() {
        let yaml = r#"
count: 1
daemon: monerod
daemon_args: ["--fixed-difficulty=100"]
"#;
        let cohort: CohortConfig = serde_yaml::from_str(yaml).unwrap();
        let phases = cohort.effective_daemon_phases();
        assert_eq!(phases.len(), 1);
        assert_eq!(phases[&0].path, "monerod");
        assert_eq!(
            phases[&0].args.as_ref().unwrap(),
            &vec!["--fixed-difficulty=100".to_string()]
        );
    }

    #[test]
    fn test_attributes_typed_parsing() {
        let mut map = BTreeMap::new();
        map.insert("is_miner".to_string(), "yes".to_string());
        map.insert("hashrate".to_string(), "60".to_string());
        map.insert("transaction_interval".to_string(), "2m".to_string());
        map.insert("custom_key".to_string(), "opaque".to_string());

        let attrs = Attributes::from_map(&map).unwrap();
        assert!(attrs.is_miner);
        assert_eq!(attrs.hashrate, Some(60.0));
        assert_eq!(attrs.transaction_interval, Some(120));
        assert_eq!(attrs.extra.get("custom_key").map(|s| s.as_str()), Some("opaque"));
    }

    #[test]
    fn test_attributes_hashrate_bounds() {
        for bad in ["0", "-5", "101", "abc"] {
            let mut map = BTreeMap::new();
            map.insert("hashrate".to_string(), bad.to_string());
            assert!(Attributes::from_map(&map).is_err(), "hashrate {} accepted", bad);
        }
    }

    #[test]
    fn test_behavior_kind_parse() {
        assert_eq!(
            BehaviorKind::parse("autonomous_miner").unwrap(),
            BehaviorKind::AutonomousMiner
        );
        assert_eq!(
            BehaviorKind::parse("miner-distributor").unwrap(),
            BehaviorKind::MinerDistributor
        );
        assert!(matches!(
            BehaviorKind::parse("/opt/custom/agent").unwrap(),
            BehaviorKind::Custom(_)
        ));
        assert!(BehaviorKind::parse("agents.regular_user").is_err());
    }

    #[test]
    fn test_ring_needs_three_hosts() {
        let yaml = r#"
general:
  stop_time: "600s"
network:
  type: "1_gbit_switch"
  peer_mode: ring
agents:
  nodes:
    count: 2
    daemon: monerod
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidNetwork(_))
        ));
    }

    #[test]
    fn test_miner_without_hashrate_rejected() {
        let yaml = r#"
general:
  stop_time: "600s"
agents:
  miners:
    count: 1
    daemon: monerod
    wallet: monero-wallet-rpc
    attributes:
      is_miner: "true"
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_err());
    }
}
