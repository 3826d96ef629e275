//! Simulation monitor behavior.
//!
//! Polls a daemon's view of the chain and the shared transaction log on a
//! fixed cadence and publishes a rolling `simulation_status.json` fact
//! for offline inspection.

use crate::agent::discovery::Discovery;
use crate::agent::lifecycle::{AgentContext, Behavior};
use crate::agent::rpc::DaemonClient;
use crate::registry::{TransactionRecord, SIMULATION_STATUS_FILE, TRANSACTIONS_FILE};
use color_eyre::eyre::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default poll interval, seconds.
const DEFAULT_POLL_INTERVAL: u64 = 60;

#[derive(Serialize, Deserialize, Debug)]
struct SimulationStatus {
    height: u64,
    difficulty: u64,
    transaction_count: usize,
    miners_online: usize,
    observed_via: String,
    updated_at: chrono::DateTime<chrono::Utc>,
}

pub struct SimulationMonitor {
    poll_interval: Duration,
    polls: u64,
}

impl SimulationMonitor {
    pub fn from_attributes(attributes: &std::collections::BTreeMap<String, String>) -> Self {
        let poll_interval = attributes
            .get("poll_interval")
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(DEFAULT_POLL_INTERVAL);
        Self {
            poll_interval: Duration::from_secs(poll_interval.max(1)),
            polls: 0,
        }
    }
}

impl Behavior for SimulationMonitor {
    fn role(&self) -> &'static str {
        "monitor"
    }

    fn needs_wallet(&self) -> bool {
        false
    }

    fn iterate(&mut self, ctx: &mut AgentContext) -> Result<Duration> {
        let discovery = Discovery::new(ctx.store.clone());

        // Watch through the local daemon when the monitor has one,
        // otherwise through any registered daemon host.
        let observed = match &ctx.daemon {
            Some(daemon) => Some(("local".to_string(), daemon.clone())),
            None => {
                let registry = discovery.agent_registry()?;
                registry
                    .agents
                    .iter()
                    .find_map(|a| a.daemon_rpc_url().map(|url| (a.id.clone(), url)))
                    .map(|(id, url)| (id, DaemonClient::from_url(url)))
            }
        };
        let Some((observed_via, daemon)) = observed else {
            log::debug!("monitor {}: no daemon to observe yet", ctx.agent_id);
            return Ok(self.poll_interval);
        };

        let info = match daemon.get_info() {
            Ok(info) => info,
            Err(e) => {
                log::debug!("monitor {}: daemon poll failed: {}", ctx.agent_id, e);
                return Ok(self.poll_interval);
            }
        };

        let transactions: Vec<TransactionRecord> = ctx.store.read_list(TRANSACTIONS_FILE)?;
        let miners_online = discovery.list_miners()?.len();

        self.polls += 1;
        let status = SimulationStatus {
            height: info.height,
            difficulty: info.difficulty,
            transaction_count: transactions.len(),
            miners_online,
            observed_via,
            updated_at: chrono::Utc::now(),
        };
        ctx.store.write(SIMULATION_STATUS_FILE, &status)?;

        log::info!(
            "monitor {}: height {}, difficulty {}, {} transactions, {} miners",
            ctx.agent_id,
            status.height,
            status.difficulty,
            status.transaction_count,
            status.miners_online
        );

        Ok(self.poll_interval)
    }

    fn finalize(&mut self, ctx: &mut AgentContext) {
        log::info!("monitor {}: exiting after {} polls", ctx.agent_id, self.polls);
    }
}
