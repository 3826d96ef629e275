//! Agent runtime process planning.
//!
//! The agent process is the `monerosim-agent` binary with a behavior kind
//! flag, started once the host's daemon and wallet are expected to be up.
//! Custom behaviors point at an operator-supplied executable instead and
//! receive the same argument surface.

use crate::config::BehaviorKind;
use crate::registry::{DAEMON_RPC_PORT, WALLET_RPC_PORT};
use crate::shadow::{ExpectedFinalState, ShadowProcess};
use crate::utils::duration::format_seconds;
use std::collections::BTreeMap;

/// Build the agent process for one host.
#[allow(clippy::too_many_arguments)]
pub fn build_agent_process(
    agent_id: &str,
    agent_ip: &str,
    shared_dir: &str,
    behavior: &BehaviorKind,
    agent_binary: &str,
    attributes: Option<&BTreeMap<String, String>>,
    has_daemon: bool,
    has_wallet: bool,
    environment: &BTreeMap<String, String>,
    log_level: &str,
    start_secs: u64,
) -> ShadowProcess {
    let mut args = vec![
        format!("--id {}", agent_id),
        format!("--shared-dir {}", shared_dir),
        format!("--log-level {}", log_level),
    ];

    if !matches!(behavior, BehaviorKind::Custom(_)) {
        args.insert(1, format!("--behavior {}", behavior.flag_value()));
    }

    if has_daemon {
        args.push(format!("--rpc-host {}", agent_ip));
        args.push(format!("--daemon-rpc-port {}", DAEMON_RPC_PORT));
    }
    if has_wallet {
        args.push(format!("--wallet-rpc-port {}", WALLET_RPC_PORT));
    }

    if let Some(attrs) = attributes {
        for (key, value) in attrs {
            args.push(format!("--attributes {} {}", key, value));
        }
    }

    let mut env = environment.clone();
    env.insert("AGENT_ID".to_string(), agent_id.to_string());
    env.insert("SHARED_DIR".to_string(), shared_dir.to_string());

    let path = match behavior {
        BehaviorKind::Custom(custom) => custom.clone(),
        _ => agent_binary.to_string(),
    };

    ShadowProcess {
        path,
        args: args.join(" "),
        environment: env,
        start_time: format_seconds(start_secs),
        shutdown_time: None,
        expected_final_state: Some(ExpectedFinalState::Running),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_miner_agent_process() {
        let mut attrs = BTreeMap::new();
        attrs.insert("hashrate".to_string(), "60".to_string());
        attrs.insert("is_miner".to_string(), "true".to_string());

        let process = build_agent_process(
            "miners000",
            "192.168.0.10",
            "/tmp/monerosim_shared",
            &BehaviorKind::AutonomousMiner,
            "/opt/monerosim/monerosim-agent",
            Some(&attrs),
            true,
            true,
            &BTreeMap::new(),
            "info",
            10,
        );

        assert_eq!(process.path, "/opt/monerosim/monerosim-agent");
        assert!(process.args.contains("--behavior autonomous-miner"));
        assert!(process.args.contains("--id miners000"));
        assert!(process.args.contains("--daemon-rpc-port 28081"));
        assert!(process.args.contains("--wallet-rpc-port 28082"));
        assert!(process.args.contains("--attributes hashrate 60"));
        assert_eq!(process.environment.get("AGENT_ID").map(|s| s.as_str()), Some("miners000"));
        assert_eq!(process.start_time, "10s");
    }

    #[test]
    fn test_custom_behavior_uses_own_path() {
        let process = build_agent_process(
            "script000",
            "192.168.0.30",
            "/tmp/monerosim_shared",
            &BehaviorKind::Custom("/opt/experiments/spy".to_string()),
            "/opt/monerosim/monerosim-agent",
            None,
            false,
            false,
            &BTreeMap::new(),
            "debug",
            15,
        );
        assert_eq!(process.path, "/opt/experiments/spy");
        assert!(!process.args.contains("--behavior"));
        assert!(!process.args.contains("--daemon-rpc-port"));
    }
}
