//! Regular user behavior.
//!
//! Models a transaction-emitting participant: once its activity window
//! opens, each iteration picks a random funded peer, sends a random
//! amount, records the transfer in the shared log, and sleeps for the
//! configured interval with a little jitter.

use crate::agent::discovery::Discovery;
use crate::agent::lifecycle::{sim_elapsed_secs, AgentContext, Behavior};
use crate::agent::rpc::RpcErrorKind;
use crate::registry::{TransactionRecord, TRANSACTIONS_FILE};
use crate::utils::amount::xmr_to_atomic;
use color_eyre::eyre::Result;
use rand::Rng;
use std::collections::BTreeSet;
use std::time::Duration;

/// Default seconds between transactions.
const DEFAULT_TX_INTERVAL: u64 = 120;
/// Poll cadence while the activity window is still closed.
const WINDOW_POLL: Duration = Duration::from_secs(10);
/// Jitter applied to the interval, as a fraction.
const INTERVAL_JITTER: f64 = 0.1;

pub struct RegularUser {
    interval: Duration,
    activity_start: Option<u64>,
    min_amount: f64,
    max_amount: f64,
    /// Recipients that bounced with an invalid address
    rejected: BTreeSet<String>,
    transactions_sent: u64,
}

impl RegularUser {
    pub fn from_attributes(attributes: &std::collections::BTreeMap<String, String>) -> Self {
        let interval = attributes
            .get("transaction_interval")
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TX_INTERVAL);
        let activity_start = attributes
            .get("activity_start_time")
            .and_then(|v| v.parse::<u64>().ok());
        let min_amount = attributes
            .get("min_tx_amount")
            .and_then(|v| v.parse::<f64>().ok())
            .unwrap_or(0.1);
        let max_amount = attributes
            .get("max_tx_amount")
            .and_then(|v| v.parse::<f64>().ok())
            .unwrap_or(1.0);

        Self {
            interval: Duration::from_secs(interval.max(1)),
            activity_start,
            min_amount,
            max_amount: max_amount.max(min_amount),
            rejected: BTreeSet::new(),
            transactions_sent: 0,
        }
    }

    fn window_open(&self) -> bool {
        match self.activity_start {
            None => true,
            Some(start) => sim_elapsed_secs().map(|t| t >= start).unwrap_or(true),
        }
    }

    fn jittered_interval(&self, rng: &mut impl Rng) -> Duration {
        let jitter = 1.0 + rng.gen_range(-INTERVAL_JITTER..=INTERVAL_JITTER);
        Duration::from_secs_f64(self.interval.as_secs_f64() * jitter)
    }
}

impl Behavior for RegularUser {
    fn role(&self) -> &'static str {
        "regular-user"
    }

    fn setup(&mut self, ctx: &mut AgentContext) -> Result<()> {
        ctx.wallet_address()?;
        log::info!(
            "user {}: interval {}s, amounts [{}, {}]",
            ctx.agent_id,
            self.interval.as_secs(),
            self.min_amount,
            self.max_amount
        );
        Ok(())
    }

    fn iterate(&mut self, ctx: &mut AgentContext) -> Result<Duration> {
        if !self.window_open() {
            return Ok(WINDOW_POLL);
        }

        let amount_xmr = {
            let min = self.min_amount;
            let max = self.max_amount;
            if max > min {
                ctx.rng.gen_range(min..=max)
            } else {
                min
            }
        };
        let amount = xmr_to_atomic(amount_xmr)?;

        let balance = ctx.wallet()?.get_balance()?;
        if balance.unlocked_balance < amount {
            log::info!(
                "user {}: unlocked balance {} below planned amount {}, skipping",
                ctx.agent_id,
                balance.unlocked_balance,
                amount
            );
            return Ok(self.jittered_interval(&mut ctx.rng));
        }

        // Candidates: anyone with a published wallet, minus self and
        // recipients that already bounced.
        let discovery = Discovery::new(ctx.store.clone());
        let candidates: Vec<_> = discovery
            .list_wallet_holders()?
            .into_iter()
            .filter(|a| a.id != ctx.agent_id && !self.rejected.contains(&a.id))
            .collect();
        if candidates.is_empty() {
            log::debug!("user {}: no transfer candidates yet", ctx.agent_id);
            return Ok(self.jittered_interval(&mut ctx.rng));
        }

        let pick = ctx.rng.gen_range(0..candidates.len());
        let recipient = &candidates[pick];
        let Some(recipient_address) = recipient.wallet_address.as_deref() else {
            return Ok(self.jittered_interval(&mut ctx.rng));
        };

        match ctx.wallet()?.transfer(recipient_address, amount) {
            Ok(receipt) => {
                self.transactions_sent += 1;
                log::info!(
                    "user {}: sent {} to {} (tx {})",
                    ctx.agent_id,
                    amount,
                    recipient.id,
                    receipt.tx_hash
                );
                let record = TransactionRecord {
                    tx_hash: receipt.tx_hash,
                    sender: ctx.agent_id.clone(),
                    recipient: recipient.id.clone(),
                    amount,
                    timestamp: chrono::Utc::now(),
                    status: "submitted".to_string(),
                };
                if let Err(e) = ctx.store.append_list(TRANSACTIONS_FILE, &record) {
                    log::warn!("user {}: transaction log append failed: {}", ctx.agent_id, e);
                }
            }
            Err(e) => match e.kind() {
                RpcErrorKind::NotEnoughMoney => {
                    log::info!("user {}: not enough money for {}", ctx.agent_id, amount);
                }
                RpcErrorKind::InvalidAddress => {
                    log::warn!(
                        "user {}: recipient {} has an invalid address, excluding it",
                        ctx.agent_id,
                        recipient.id
                    );
                    self.rejected.insert(recipient.id.clone());
                }
                RpcErrorKind::Transport | RpcErrorKind::WalletNotReady => {
                    log::debug!("user {}: transfer deferred: {}", ctx.agent_id, e);
                }
                _ => {
                    log::warn!("user {}: transfer failed: {}", ctx.agent_id, e);
                }
            },
        }

        Ok(self.jittered_interval(&mut ctx.rng))
    }

    fn finalize(&mut self, ctx: &mut AgentContext) {
        log::info!(
            "user {}: exiting with {} transactions sent",
            ctx.agent_id,
            self.transactions_sent
        );
    }
}
