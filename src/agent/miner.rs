//! Autonomous mining behavior.
//!
//! Each miner is its own Poisson process: per iteration it reads the live
//! network difficulty, draws an exponential inter-block delay from its
//! hashrate share, sleeps that long in simulated time, and mints exactly
//! one block to its own wallet address. There is no coordinator; the
//! blockchain is the only shared truth, and races between miners resolve
//! through the daemon's own acceptance rules.

use crate::agent::lifecycle::{AgentContext, Behavior};
use crate::agent::rpc::RpcErrorKind;
use crate::config::DEFAULT_TOTAL_NETWORK_HASHRATE;
use color_eyre::eyre::{eyre, Result};
use rand::Rng;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// Short pause after a recoverable mint failure.
const MINT_RETRY_DELAY: Duration = Duration::from_secs(5);
/// Fallback difficulty when the daemon cannot be asked.
const FALLBACK_DIFFICULTY: u64 = 1;
/// Default TTL for the cached difficulty, seconds.
const DEFAULT_DIFFICULTY_TTL: u64 = 30;

pub struct AutonomousMiner {
    /// Percentage share of the network baseline, in (0, 100]
    hashrate: f64,
    /// Network-wide baseline H, hashes per second
    total_network_hashrate: u64,
    difficulty_ttl: Duration,
    cached_difficulty: Option<(u64, Instant)>,
    blocks_mined: u64,
}

impl AutonomousMiner {
    /// Build from the agent's attribute map; refuses out-of-range values.
    pub fn from_attributes(attributes: &BTreeMap<String, String>) -> Result<Self> {
        let hashrate: f64 = attributes
            .get("hashrate")
            .ok_or_else(|| eyre!("miner requires a hashrate attribute"))?
            .parse()
            .map_err(|_| eyre!("hashrate attribute is not a number"))?;
        if hashrate <= 0.0 || hashrate > 100.0 {
            return Err(eyre!("hashrate {} outside (0, 100]", hashrate));
        }

        let total_network_hashrate: u64 = match attributes.get("total_network_hashrate") {
            Some(value) => value
                .parse()
                .map_err(|_| eyre!("total_network_hashrate is not an integer"))?,
            None => DEFAULT_TOTAL_NETWORK_HASHRATE,
        };
        if total_network_hashrate == 0 {
            return Err(eyre!("total_network_hashrate must be positive"));
        }

        let difficulty_ttl = std::env::var("DIFFICULTY_CACHE_TTL")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(DEFAULT_DIFFICULTY_TTL);

        Ok(Self {
            hashrate,
            total_network_hashrate,
            difficulty_ttl: Duration::from_secs(difficulty_ttl),
            cached_difficulty: None,
            blocks_mined: 0,
        })
    }

    /// Effective block-find rate λ in events per simulated second.
    fn lambda(&self, difficulty: u64) -> f64 {
        let share = self.hashrate / 100.0;
        share * self.total_network_hashrate as f64 / difficulty.max(1) as f64
    }

    /// Draw the next inter-block delay: T = -ln(1-U) / λ.
    fn sample_delay(&self, rng: &mut impl Rng, difficulty: u64) -> Duration {
        let u: f64 = rng.gen::<f64>();
        let t = -(1.0 - u).ln() / self.lambda(difficulty);
        Duration::from_secs_f64(t.max(f64::MIN_POSITIVE))
    }

    /// Current difficulty, cached for the configured TTL. Transient RPC
    /// failure degrades to difficulty 1 so mining never stalls.
    fn current_difficulty(&mut self, ctx: &AgentContext) -> u64 {
        if let Some((difficulty, fetched)) = self.cached_difficulty {
            if fetched.elapsed() < self.difficulty_ttl {
                return difficulty;
            }
        }
        match ctx.daemon().and_then(|d| d.get_info().map_err(Into::into)) {
            Ok(info) => {
                let difficulty = info.difficulty.max(1);
                self.cached_difficulty = Some((difficulty, Instant::now()));
                difficulty
            }
            Err(e) => {
                log::warn!(
                    "miner {}: difficulty query failed, assuming {}: {:#}",
                    ctx.agent_id,
                    FALLBACK_DIFFICULTY,
                    e
                );
                FALLBACK_DIFFICULTY
            }
        }
    }
}

impl Behavior for AutonomousMiner {
    fn role(&self) -> &'static str {
        "miner"
    }

    fn setup(&mut self, ctx: &mut AgentContext) -> Result<()> {
        ctx.wallet_address()?;
        ctx.daemon()?;
        log::info!(
            "miner {}: {}% of {} H/s baseline",
            ctx.agent_id,
            self.hashrate,
            self.total_network_hashrate
        );
        Ok(())
    }

    fn iterate(&mut self, ctx: &mut AgentContext) -> Result<Duration> {
        let difficulty = self.current_difficulty(ctx);
        let delay = self.sample_delay(&mut ctx.rng, difficulty);
        log::debug!(
            "miner {}: difficulty {}, next block in {:.1}s",
            ctx.agent_id,
            difficulty,
            delay.as_secs_f64()
        );

        ctx.sleep(delay);
        if ctx.shutdown_requested() {
            return Ok(Duration::ZERO);
        }

        let address = ctx.wallet_address()?.to_string();
        match ctx.daemon()?.generate_blocks(&address, 1) {
            Ok(generated) => {
                self.blocks_mined += 1;
                log::info!(
                    "miner {}: mined block at height {} ({} total)",
                    ctx.agent_id,
                    generated.height,
                    self.blocks_mined
                );
                Ok(Duration::ZERO)
            }
            Err(e) => match e.kind() {
                RpcErrorKind::NotEnoughMoney | RpcErrorKind::WalletNotReady => {
                    log::debug!("miner {}: mint deferred: {}", ctx.agent_id, e);
                    Ok(MINT_RETRY_DELAY)
                }
                _ => {
                    log::warn!("miner {}: mint failed: {}", ctx.agent_id, e);
                    Ok(Duration::ZERO)
                }
            },
        }
    }

    fn finalize(&mut self, ctx: &mut AgentContext) {
        log::info!(
            "miner {}: exiting with {} blocks mined",
            ctx.agent_id,
            self.blocks_mined
        );
    }
}
