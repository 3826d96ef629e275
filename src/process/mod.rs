//! Per-host process planning.
//!
//! [`plan_host`] turns one agent's cohort definition into the ordered
//! Shadow process list for its host: wallet-directory preparation, daemon
//! phase(s), wallet phase(s), then the agent runtime. Launch times inside
//! the host are fixed offsets from the host's staggered base slot, so the
//! whole plan is a pure function of the scenario.

pub mod agent;
pub mod daemon;
pub mod wallet;

use crate::config::{BehaviorKind, CohortConfig};
use crate::shadow::ShadowHost;
use crate::utils::binary::resolve_binary_path;
use std::collections::BTreeMap;

pub use agent::build_agent_process;
pub use daemon::build_daemon_processes;
pub use wallet::{build_prep_process, build_wallet_processes};

/// Seconds between the prep step and the daemon inside one host.
const DAEMON_DELAY_SECS: u64 = 2;
/// Seconds between daemon and wallet start.
const WALLET_DELAY_SECS: u64 = 2;
/// Seconds between the last service and the agent runtime.
const AGENT_DELAY_SECS: u64 = 3;

/// Plan-wide inputs shared by every host.
#[derive(Debug)]
pub struct PlanContext {
    pub shared_dir: String,
    /// Clear daemon data directories before phase 0
    pub fresh_blockchain: bool,
    /// Absolute path of the `monerosim-agent` binary
    pub agent_binary: String,
    /// Environment for non-daemon processes
    pub base_env: BTreeMap<String, String>,
    /// Environment for monerod processes
    pub monero_env: BTreeMap<String, String>,
    /// Rendered daemon option defaults (`--flag=value` form)
    pub daemon_option_args: Vec<String>,
    /// Rendered wallet option defaults
    pub wallet_option_args: Vec<String>,
    /// Log level handed to agent runtimes
    pub agent_log_level: String,
}

/// One host's planning input.
#[derive(Debug)]
pub struct HostSpec<'a> {
    pub agent_id: &'a str,
    pub ip: &'a str,
    pub network_node_id: u32,
    pub cohort: &'a CohortConfig,
    pub behavior: Option<BehaviorKind>,
    pub peer_args: Vec<String>,
    /// Staggered base launch slot for this host, in seconds
    pub base_start_secs: u64,
    /// Cohort-wide offset added to every computed time
    pub start_offset_secs: u64,
}

/// Build the complete host entry. Resolved binary paths are appended to
/// `used_binaries` so the orchestrator can validate them in one pass
/// before the manifest is written.
pub fn plan_host(
    spec: &HostSpec<'_>,
    ctx: &PlanContext,
    used_binaries: &mut Vec<String>,
) -> Result<ShadowHost, String> {
    let mut processes = Vec::new();

    let daemon_phases = spec.cohort.effective_daemon_phases();
    let wallet_phases = spec.cohort.effective_wallet_phases();

    let daemon_start = spec.base_start_secs + DAEMON_DELAY_SECS;
    let wallet_start = daemon_start + WALLET_DELAY_SECS;
    let agent_start = if !wallet_phases.is_empty() {
        wallet_start + AGENT_DELAY_SECS
    } else if !daemon_phases.is_empty() {
        daemon_start + AGENT_DELAY_SECS
    } else {
        spec.base_start_secs + AGENT_DELAY_SECS
    };

    let mut prep_dirs = Vec::new();
    if !wallet_phases.is_empty() {
        prep_dirs.push(format!("{}/{}_wallet", ctx.shared_dir, spec.agent_id));
    }
    if ctx.fresh_blockchain && !daemon_phases.is_empty() {
        prep_dirs.push(format!("{}/{}_data", ctx.shared_dir, spec.agent_id));
    }
    if !prep_dirs.is_empty() {
        processes.push(build_prep_process(
            &prep_dirs,
            &ctx.base_env,
            spec.base_start_secs + spec.start_offset_secs,
        ));
    }

    if !daemon_phases.is_empty() {
        let resolved = resolve_phase_paths("daemon", &daemon_phases, used_binaries)?;
        processes.extend(build_daemon_processes(
            spec.agent_id,
            spec.ip,
            &ctx.shared_dir,
            &daemon_phases,
            &resolved,
            &ctx.daemon_option_args,
            &spec.peer_args,
            &ctx.monero_env,
            daemon_start,
            spec.start_offset_secs,
        )?);
    }

    if !wallet_phases.is_empty() {
        let resolved = resolve_phase_paths("wallet", &wallet_phases, used_binaries)?;
        processes.extend(build_wallet_processes(
            spec.agent_id,
            spec.ip,
            &ctx.shared_dir,
            &wallet_phases,
            &resolved,
            &ctx.wallet_option_args,
            &ctx.base_env,
            wallet_start,
            spec.start_offset_secs,
        )?);
    }

    if let Some(behavior) = &spec.behavior {
        if let BehaviorKind::Custom(path) = behavior {
            used_binaries.push(path.clone());
        } else {
            used_binaries.push(ctx.agent_binary.clone());
        }
        processes.push(build_agent_process(
            spec.agent_id,
            spec.ip,
            &ctx.shared_dir,
            behavior,
            &ctx.agent_binary,
            spec.cohort.attributes.as_ref(),
            !daemon_phases.is_empty(),
            !wallet_phases.is_empty(),
            &ctx.base_env,
            &ctx.agent_log_level,
            agent_start + spec.start_offset_secs,
        ));
    }

    Ok(ShadowHost {
        network_node_id: spec.network_node_id,
        ip_addr: Some(spec.ip.to_string()),
        processes,
        bandwidth_down: Some("1000000000".to_string()),
        bandwidth_up: Some("1000000000".to_string()),
    })
}

fn resolve_phase_paths(
    kind: &str,
    phases: &BTreeMap<u32, crate::config::BinaryPhase>,
    used_binaries: &mut Vec<String>,
) -> Result<BTreeMap<u32, String>, String> {
    let mut resolved = BTreeMap::new();
    for (&number, phase) in phases {
        let path = resolve_binary_path(&phase.path)
            .map_err(|e| format!("{} phase {}: {}", kind, number, e))?
            .display()
            .to_string();
        used_binaries.push(path.clone());
        resolved.insert(number, path);
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> PlanContext {
        PlanContext {
            shared_dir: "/tmp/monerosim_shared".to_string(),
            fresh_blockchain: true,
            agent_binary: "/opt/monerosim/monerosim-agent".to_string(),
            base_env: BTreeMap::new(),
            monero_env: BTreeMap::new(),
            daemon_option_args: Vec::new(),
            wallet_option_args: Vec::new(),
            agent_log_level: "info".to_string(),
        }
    }

    fn full_cohort() -> CohortConfig {
        serde_yaml::from_str(
            r#"
count: 1
daemon: /opt/bin/monerod
wallet: /opt/bin/monero-wallet-rpc
mining_script: autonomous_miner
attributes:
  is_miner: "true"
  hashrate: "50"
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_full_host_process_order() {
        let cohort = full_cohort();
        let spec = HostSpec {
            agent_id: "miners000",
            ip: "192.168.0.10",
            network_node_id: 0,
            cohort: &cohort,
            behavior: Some(BehaviorKind::AutonomousMiner),
            peer_args: vec!["--add-priority-node=192.168.0.11:28080".to_string()],
            base_start_secs: 0,
            start_offset_secs: 0,
        };
        let mut binaries = Vec::new();
        let host = plan_host(&spec, &context(), &mut binaries).unwrap();

        // prep, daemon, wallet, agent
        assert_eq!(host.processes.len(), 4);
        assert!(host.processes[0].args.contains("rm -rf"));
        assert!(host.processes[1].args.contains("--rpc-bind-ip=192.168.0.10"));
        assert!(host.processes[1].args.contains("--add-priority-node=192.168.0.11:28080"));
        assert!(host.processes[2].args.contains("--wallet-dir"));
        assert!(host.processes[3].args.contains("--behavior autonomous-miner"));

        assert_eq!(host.processes[0].start_time, "0s");
        assert_eq!(host.processes[1].start_time, "2s");
        assert_eq!(host.processes[2].start_time, "4s");
        assert_eq!(host.processes[3].start_time, "7s");

        assert!(binaries.contains(&"/opt/bin/monerod".to_string()));
        assert!(binaries.contains(&"/opt/monerosim/monerosim-agent".to_string()));
    }

    #[test]
    fn test_daemon_only_host() {
        let cohort: CohortConfig = serde_yaml::from_str(
            r#"
count: 1
daemon: /opt/bin/monerod
"#,
        )
        .unwrap();
        let spec = HostSpec {
            agent_id: "relays000",
            ip: "192.168.0.20",
            network_node_id: 0,
            cohort: &cohort,
            behavior: None,
            peer_args: Vec::new(),
            base_start_secs: 5,
            start_offset_secs: 0,
        };
        let mut binaries = Vec::new();
        let host = plan_host(&spec, &context(), &mut binaries).unwrap();
        // fresh-blockchain prep, then the daemon
        assert_eq!(host.processes.len(), 2);
        assert!(host.processes[0].args.contains("relays000_data"));
        assert_eq!(host.processes[1].start_time, "7s");
    }

    #[test]
    fn test_start_offset_applies_to_whole_host() {
        let cohort = full_cohort();
        let spec = HostSpec {
            agent_id: "late000",
            ip: "192.168.0.30",
            network_node_id: 0,
            cohort: &cohort,
            behavior: Some(BehaviorKind::AutonomousMiner),
            peer_args: Vec::new(),
            base_start_secs: 0,
            start_offset_secs: 7200,
        };
        let mut binaries = Vec::new();
        let host = plan_host(&spec, &context(), &mut binaries).unwrap();
        assert_eq!(host.processes[0].start_time, "7200s");
        assert_eq!(host.processes[1].start_time, "7202s");
        assert_eq!(host.processes[3].start_time, "7207s");
    }
}
