//! Centralized block controller (legacy).
//!
//! Predecessor of the autonomous miner: one scheduler draws network-wide
//! block intervals and tells a weighted-random miner's daemon to mint.
//! Kept as an explicitly opt-in behavior for old scenarios; nothing
//! selects it by default.

use crate::agent::discovery::Discovery;
use crate::agent::lifecycle::{AgentContext, Behavior};
use crate::agent::rpc::DaemonClient;
use crate::config::DEFAULT_TOTAL_NETWORK_HASHRATE;
use crate::registry::{BLOCK_CONTROLLER_FILE, DNS_CHECKPOINTS_FILE};
use color_eyre::eyre::{eyre, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Pause while no miner has published a wallet yet.
const MINER_WAIT: Duration = Duration::from_secs(10);
/// Every Nth block lands in the checkpoint feed.
const CHECKPOINT_STRIDE: u64 = 10;

#[derive(Serialize, Deserialize, Debug, Default)]
struct ControllerState {
    blocks_scheduled: u64,
    last_miner: Option<String>,
    updated_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Serialize, Deserialize, Debug)]
struct Checkpoint {
    height: u64,
    block_hash: String,
    recorded_at: chrono::DateTime<chrono::Utc>,
}

pub struct BlockController {
    total_network_hashrate: u64,
    state: ControllerState,
}

impl BlockController {
    pub fn from_attributes(attributes: &std::collections::BTreeMap<String, String>) -> Self {
        let total_network_hashrate = attributes
            .get("total_network_hashrate")
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TOTAL_NETWORK_HASHRATE);
        Self {
            total_network_hashrate,
            state: ControllerState::default(),
        }
    }

    fn miner_daemon(&self, ctx: &AgentContext, agent_id: &str) -> Result<DaemonClient> {
        let discovery = Discovery::new(ctx.store.clone());
        let entry = discovery
            .resolve(agent_id)?
            .ok_or_else(|| eyre!("miner {} not in registry", agent_id))?;
        let url = entry
            .daemon_rpc_url()
            .ok_or_else(|| eyre!("miner {} has no daemon endpoint", agent_id))?;
        Ok(DaemonClient::from_url(url))
    }
}

impl Behavior for BlockController {
    fn role(&self) -> &'static str {
        "block-controller"
    }

    fn needs_wallet(&self) -> bool {
        false
    }

    fn iterate(&mut self, ctx: &mut AgentContext) -> Result<Duration> {
        let discovery = Discovery::new(ctx.store.clone());
        let miners = discovery.list_miners()?;
        if miners.is_empty() {
            return Ok(MINER_WAIT);
        }

        // Network-wide block pace from the first miner's difficulty view.
        let daemon = self.miner_daemon(ctx, &miners[0].agent_id)?;
        let difficulty = daemon.get_info().map(|i| i.difficulty.max(1)).unwrap_or(1);
        let lambda = self.total_network_hashrate as f64 / difficulty as f64;
        let u: f64 = ctx.rng.gen();
        let delay = Duration::from_secs_f64((-(1.0 - u).ln() / lambda).max(f64::MIN_POSITIVE));

        ctx.sleep(delay);
        if ctx.shutdown_requested() {
            return Ok(Duration::ZERO);
        }

        // Weighted pick by hashrate share.
        let total_weight: f64 = miners.iter().map(|m| m.hashrate).sum();
        let mut roll = ctx.rng.gen_range(0.0..total_weight.max(f64::MIN_POSITIVE));
        let mut winner = &miners[0];
        for miner in &miners {
            if roll < miner.hashrate {
                winner = miner;
                break;
            }
            roll -= miner.hashrate;
        }

        let address = winner
            .wallet_address
            .as_deref()
            .ok_or_else(|| eyre!("selected miner has no wallet address"))?;
        let daemon = self.miner_daemon(ctx, &winner.agent_id)?;
        match daemon.generate_blocks(address, 1) {
            Ok(generated) => {
                self.state.blocks_scheduled += 1;
                self.state.last_miner = Some(winner.agent_id.clone());
                self.state.updated_at = Some(chrono::Utc::now());
                ctx.store
                    .write(BLOCK_CONTROLLER_FILE, &self.state)
                    .unwrap_or_else(|e| log::warn!("controller: state write failed: {}", e));

                if generated.height % CHECKPOINT_STRIDE == 0 {
                    if let Some(hash) = generated.blocks.first() {
                        let checkpoint = Checkpoint {
                            height: generated.height,
                            block_hash: hash.clone(),
                            recorded_at: chrono::Utc::now(),
                        };
                        ctx.store
                            .append_list(DNS_CHECKPOINTS_FILE, &checkpoint)
                            .unwrap_or_else(|e| {
                                log::warn!("controller: checkpoint append failed: {}", e)
                            });
                    }
                }
            }
            Err(e) => {
                log::warn!(
                    "controller: block for {} failed: {}",
                    winner.agent_id,
                    e
                );
            }
        }

        Ok(Duration::ZERO)
    }

    fn finalize(&mut self, ctx: &mut AgentContext) {
        self.state.updated_at = Some(chrono::Utc::now());
        let _ = ctx.store.write(BLOCK_CONTROLLER_FILE, &self.state);
        log::info!(
            "controller: exiting with {} blocks scheduled",
            self.state.blocks_scheduled
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_default_baseline() {
        let controller = BlockController::from_attributes(&BTreeMap::new());
        assert_eq!(
            controller.total_network_hashrate,
            DEFAULT_TOTAL_NETWORK_HASHRATE
        );
    }

    #[test]
    fn test_baseline_attribute() {
        let mut attrs = BTreeMap::new();
        attrs.insert("total_network_hashrate".to_string(), "5000000".to_string());
        let controller = BlockController::from_attributes(&attrs);
        assert_eq!(controller.total_network_hashrate, 5_000_000);
    }
}
