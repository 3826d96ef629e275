//! Monero daemon process planning.
//!
//! Builds one Shadow process per daemon phase: regression-mode argv bound
//! to the host's address, the cohort's merged option flags, generated peer
//! flags, and phase timing. Non-final phases get a shutdown time and an
//! expected `signaled: SIGTERM` final state so the simulator treats the
//! staged upgrade as intentional.

use crate::config::BinaryPhase;
use crate::registry::{DAEMON_RPC_PORT, P2P_PORT};
use crate::shadow::{ExpectedFinalState, ShadowProcess};
use crate::utils::duration::{format_seconds, parse_duration_to_seconds};
use std::collections::BTreeMap;

/// Fixed regression-mode argv every simulated daemon shares. Single
/// threaded and rate-limited so Shadow's scheduler stays deterministic.
fn base_daemon_args(agent_id: &str, agent_ip: &str, shared_dir: &str) -> Vec<String> {
    vec![
        format!("--data-dir={}/{}_data", shared_dir, agent_id),
        "--log-file=/dev/stdout".to_string(),
        "--log-level=1".to_string(),
        "--regtest".to_string(),
        "--fixed-difficulty=0".to_string(),
        "--disable-dns-checkpoints".to_string(),
        "--non-interactive".to_string(),
        "--no-zmq".to_string(),
        "--max-concurrency=1".to_string(),
        "--prep-blocks-threads=1".to_string(),
        "--db-sync-mode=safe".to_string(),
        "--block-sync-size=1".to_string(),
        "--max-connections-per-ip=50".to_string(),
        "--allow-local-ip".to_string(),
        format!("--rpc-bind-ip={}", agent_ip),
        format!("--rpc-bind-port={}", DAEMON_RPC_PORT),
        "--confirm-external-bind".to_string(),
        "--disable-rpc-ban".to_string(),
        "--rpc-access-control-origins=*".to_string(),
        format!("--p2p-bind-ip={}", agent_ip),
        format!("--p2p-bind-port={}", P2P_PORT),
    ]
}

/// Build the daemon processes for one host.
///
/// `phases` is the effective (shorthand-rewritten) phase plan with paths
/// already resolved to absolute form. `default_start_secs` is the host's
/// staggered launch slot, used when phase 0 declares no start of its own.
#[allow(clippy::too_many_arguments)]
pub fn build_daemon_processes(
    agent_id: &str,
    agent_ip: &str,
    shared_dir: &str,
    phases: &BTreeMap<u32, BinaryPhase>,
    resolved_paths: &BTreeMap<u32, String>,
    option_args: &[String],
    peer_args: &[String],
    environment: &BTreeMap<String, String>,
    default_start_secs: u64,
    start_offset_secs: u64,
) -> Result<Vec<ShadowProcess>, String> {
    let mut processes = Vec::new();
    let last_phase = phases.keys().copied().max();

    for (&number, phase) in phases {
        let mut args = base_daemon_args(agent_id, agent_ip, shared_dir);
        args.extend(option_args.iter().cloned());
        if let Some(extra) = &phase.args {
            args.extend(extra.iter().cloned());
        }
        args.extend(peer_args.iter().cloned());

        let mut env = environment.clone();
        if let Some(phase_env) = &phase.env {
            for (k, v) in phase_env {
                env.insert(k.clone(), v.clone());
            }
        }

        let start_secs = match &phase.start {
            Some(start) => parse_duration_to_seconds(start)
                .map_err(|e| format!("daemon phase {} start: {}", number, e))?,
            None => default_start_secs,
        } + start_offset_secs;

        let stop_secs = match &phase.stop {
            Some(stop) => Some(
                parse_duration_to_seconds(stop)
                    .map_err(|e| format!("daemon phase {} stop: {}", number, e))?
                    + start_offset_secs,
            ),
            None => None,
        };

        let expected_final_state = if stop_secs.is_some() || Some(number) != last_phase {
            ExpectedFinalState::Signaled("SIGTERM".to_string())
        } else {
            ExpectedFinalState::Running
        };

        processes.push(ShadowProcess {
            path: resolved_paths
                .get(&number)
                .cloned()
                .ok_or_else(|| format!("no resolved path for daemon phase {}", number))?,
            args: args.join(" "),
            environment: env,
            start_time: format_seconds(start_secs),
            shutdown_time: stop_secs.map(format_seconds),
            expected_final_state: Some(expected_final_state),
        });
    }

    Ok(processes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn phase(path: &str, start: Option<&str>, stop: Option<&str>) -> BinaryPhase {
        BinaryPhase {
            path: path.to_string(),
            args: None,
            env: None,
            start: start.map(|s| s.to_string()),
            stop: stop.map(|s| s.to_string()),
        }
    }

    fn build(phases: BTreeMap<u32, BinaryPhase>) -> Vec<ShadowProcess> {
        let resolved: BTreeMap<u32, String> = phases
            .keys()
            .map(|n| (*n, format!("/opt/bin/monerod-{}", n)))
            .collect();
        build_daemon_processes(
            "miners000",
            "192.168.0.10",
            "/tmp/monerosim_shared",
            &phases,
            &resolved,
            &[],
            &[],
            &BTreeMap::new(),
            3,
            0,
        )
        .unwrap()
    }

    #[test]
    fn test_single_phase_runs_to_end() {
        let mut phases = BTreeMap::new();
        phases.insert(0, phase("monerod", None, None));
        let procs = build(phases);
        assert_eq!(procs.len(), 1);
        assert_eq!(procs[0].start_time, "3s");
        assert_eq!(procs[0].shutdown_time, None);
        assert_eq!(
            procs[0].expected_final_state,
            Some(ExpectedFinalState::Running)
        );
        assert!(procs[0].args.contains("--regtest"));
        assert!(procs[0].args.contains("--rpc-bind-ip=192.168.0.10"));
        assert!(procs[0]
            .args
            .contains("--data-dir=/tmp/monerosim_shared/miners000_data"));
    }

    #[test]
    fn test_phased_upgrade_timing() {
        let mut phases = BTreeMap::new();
        phases.insert(0, phase("monerod-v18", None, Some("1h")));
        phases.insert(1, phase("monerod-v19", Some("1h 30s"), None));
        let procs = build(phases);
        assert_eq!(procs.len(), 2);

        assert_eq!(procs[0].shutdown_time.as_deref(), Some("3600s"));
        assert_eq!(
            procs[0].expected_final_state,
            Some(ExpectedFinalState::Signaled("SIGTERM".to_string()))
        );

        assert_eq!(procs[1].start_time, "3630s");
        assert_eq!(procs[1].shutdown_time, None);
        assert_eq!(
            procs[1].expected_final_state,
            Some(ExpectedFinalState::Running)
        );
    }

    #[test]
    fn test_start_offset_shifts_all_times() {
        let mut phases = BTreeMap::new();
        phases.insert(0, phase("monerod", None, Some("600s")));
        let resolved: BTreeMap<u32, String> =
            [(0, "/opt/bin/monerod".to_string())].into_iter().collect();
        let procs = build_daemon_processes(
            "late000",
            "192.168.0.20",
            "/tmp/monerosim_shared",
            &phases,
            &resolved,
            &[],
            &[],
            &BTreeMap::new(),
            0,
            7200,
        )
        .unwrap();
        assert_eq!(procs[0].start_time, "7200s");
        assert_eq!(procs[0].shutdown_time.as_deref(), Some("7800s"));
    }

    #[test]
    fn test_phase_env_overlays_base() {
        let mut phases = BTreeMap::new();
        let mut p = phase("monerod", None, None);
        p.env = Some([("UPGRADE".to_string(), "1".to_string())].into_iter().collect());
        phases.insert(0, p);
        let resolved: BTreeMap<u32, String> =
            [(0, "/opt/bin/monerod".to_string())].into_iter().collect();
        let base: BTreeMap<String, String> =
            [("SIMULATION_SEED".to_string(), "42".to_string())].into_iter().collect();
        let procs = build_daemon_processes(
            "m0", "10.0.0.1", "/tmp/shared", &phases, &resolved, &[], &[], &base, 0, 0,
        )
        .unwrap();
        assert_eq!(procs[0].environment.get("UPGRADE").map(|s| s.as_str()), Some("1"));
        assert_eq!(
            procs[0].environment.get("SIMULATION_SEED").map(|s| s.as_str()),
            Some("42")
        );
    }
}
