//! Wallet RPC process planning.
//!
//! Each wallet host gets a data-directory preparation step followed by one
//! process per wallet phase, wired to the host's local daemon endpoint.
//! Only phase 0 is preceded by the prep step: a later phase is an upgraded
//! binary taking over the existing wallet files, not a fresh wallet.

use crate::config::BinaryPhase;
use crate::registry::{DAEMON_RPC_PORT, WALLET_RPC_PORT};
use crate::shadow::{ExpectedFinalState, ShadowProcess};
use crate::utils::duration::{format_seconds, parse_duration_to_seconds};
use std::collections::BTreeMap;

/// Build the data-directory preparation process: clear and recreate the
/// listed directories so state from a previous run never leaks into this
/// one. Runs as the host's first process.
pub fn build_prep_process(
    dirs: &[String],
    environment: &BTreeMap<String, String>,
    start_secs: u64,
) -> ShadowProcess {
    let joined = dirs.join(" ");
    ShadowProcess {
        path: "/bin/bash".to_string(),
        args: format!("-c 'rm -rf {} && mkdir -p {}'", joined, joined),
        environment: environment.clone(),
        start_time: format_seconds(start_secs),
        shutdown_time: None,
        expected_final_state: Some(ExpectedFinalState::Exited(0)),
    }
}

fn base_wallet_args(agent_id: &str, agent_ip: &str, shared_dir: &str) -> Vec<String> {
    vec![
        format!("--daemon-address=http://{}:{}", agent_ip, DAEMON_RPC_PORT),
        format!("--rpc-bind-ip={}", agent_ip),
        format!("--rpc-bind-port={}", WALLET_RPC_PORT),
        "--disable-rpc-login".to_string(),
        "--trusted-daemon".to_string(),
        "--log-level=1".to_string(),
        format!("--wallet-dir={}/{}_wallet", shared_dir, agent_id),
        "--non-interactive".to_string(),
        "--confirm-external-bind".to_string(),
        "--allow-mismatched-daemon-version".to_string(),
        "--daemon-ssl-allow-any-cert".to_string(),
        "--max-concurrency=1".to_string(),
    ]
}

/// Build the wallet RPC processes for one host.
#[allow(clippy::too_many_arguments)]
pub fn build_wallet_processes(
    agent_id: &str,
    agent_ip: &str,
    shared_dir: &str,
    phases: &BTreeMap<u32, BinaryPhase>,
    resolved_paths: &BTreeMap<u32, String>,
    option_args: &[String],
    environment: &BTreeMap<String, String>,
    default_start_secs: u64,
    start_offset_secs: u64,
) -> Result<Vec<ShadowProcess>, String> {
    let mut processes = Vec::new();
    let last_phase = phases.keys().copied().max();

    for (&number, phase) in phases {
        let mut args = base_wallet_args(agent_id, agent_ip, shared_dir);
        args.extend(option_args.iter().cloned());
        if let Some(extra) = &phase.args {
            args.extend(extra.iter().cloned());
        }

        let mut env = environment.clone();
        if let Some(phase_env) = &phase.env {
            for (k, v) in phase_env {
                env.insert(k.clone(), v.clone());
            }
        }

        let start_secs = match &phase.start {
            Some(start) => parse_duration_to_seconds(start)
                .map_err(|e| format!("wallet phase {} start: {}", number, e))?,
            None => default_start_secs,
        } + start_offset_secs;

        let stop_secs = match &phase.stop {
            Some(stop) => Some(
                parse_duration_to_seconds(stop)
                    .map_err(|e| format!("wallet phase {} stop: {}", number, e))?
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
                .ok_or_else(|| format!("no resolved path for wallet phase {}", number))?,
            args: args.join(" "),
            environment: env,
            start_time: format_seconds(start_secs),
            shutdown_time: stop_secs.map(format_seconds),
            expected_final_state: Some(expected_final_state),
        });
    }

    Ok(processes)
}
