//! Miner distributor behavior.
//!
//! Bootstraps the simulated economy: waits until mined coinbase outputs
//! have matured, then funds every distribution-eligible agent from the
//! wallet of a registered miner. Transfers are issued through that
//! miner's wallet RPC; the distributor itself holds no wallet and never
//! invents addresses. A fallback pass with a halved amount covers the
//! early-simulation case where blocks are still scarce.

use crate::agent::discovery::Discovery;
use crate::agent::lifecycle::{sim_elapsed_secs, AgentContext, Behavior};
use crate::agent::rpc::{DaemonClient, RpcErrorKind, WalletClient};
use crate::registry::{
    FundingOutcome, FundingStatus, MinerEntry, TransactionRecord, FUNDING_STATUS_FILE,
    TRANSACTIONS_FILE,
};
use crate::utils::amount::xmr_to_atomic;
use color_eyre::eyre::{eyre, Result};
use std::time::Duration;

/// Coinbase outputs unlock after 30 confirmations; at the default block
/// pace that is about an hour. 65 simulated minutes guarantees
/// spendability in the default scenarios. A protocol constant of the
/// simulated currency, not a tunable.
const DISTRIBUTION_MATURITY_WAIT_SECS: u64 = 3900;

/// Attempts to find a miner with a published wallet before giving up.
const MINER_DISCOVERY_ATTEMPTS: u32 = 30;
/// Pause between miner discovery attempts.
const MINER_DISCOVERY_DELAY: Duration = Duration::from_secs(10);
/// Transfer attempts per recipient.
const TRANSFER_ATTEMPTS: u32 = 3;
/// Pause between transfer retries.
const TRANSFER_RETRY_DELAY: Duration = Duration::from_secs(30);
/// Extra blocks to wait for before the fallback pass.
const FALLBACK_EXTRA_BLOCKS: u64 = 10;
/// Poll cadence while waiting for fallback blocks.
const FALLBACK_POLL: Duration = Duration::from_secs(60);
/// Default per-recipient amount in coins.
const DEFAULT_FUND_AMOUNT: f64 = 1.0;

enum Phase {
    FindMiner { attempts: u32 },
    AwaitMaturity { miner: MinerEntry },
    Distribute { miner: MinerEntry, fallback: bool },
    AwaitFallbackBlocks { baseline_height: u64 },
    Done,
}

pub struct MinerDistributor {
    phase: Phase,
    fund_amount: f64,
    status: FundingStatus,
}

impl MinerDistributor {
    pub fn from_attributes(attributes: &std::collections::BTreeMap<String, String>) -> Self {
        let fund_amount = attributes
            .get("initial_fund_amount")
            .and_then(|v| v.parse::<f64>().ok())
            .unwrap_or(DEFAULT_FUND_AMOUNT);
        Self {
            phase: Phase::FindMiner { attempts: 0 },
            fund_amount,
            status: FundingStatus::default(),
        }
    }

    fn miner_wallet(&self, ctx: &AgentContext, miner: &MinerEntry) -> Result<WalletClient> {
        let discovery = Discovery::new(ctx.store.clone());
        let entry = discovery
            .resolve(&miner.agent_id)?
            .ok_or_else(|| eyre!("miner {} vanished from the registry", miner.agent_id))?;
        let url = entry
            .wallet_rpc_url()
            .ok_or_else(|| eyre!("miner {} has no wallet endpoint", miner.agent_id))?;
        Ok(WalletClient::from_url(url))
    }

    fn miner_daemon(&self, ctx: &AgentContext, agent_id: &str) -> Result<DaemonClient> {
        let discovery = Discovery::new(ctx.store.clone());
        let entry = discovery
            .resolve(agent_id)?
            .ok_or_else(|| eyre!("miner {} vanished from the registry", agent_id))?;
        let url = entry
            .daemon_rpc_url()
            .ok_or_else(|| eyre!("miner {} has no daemon endpoint", agent_id))?;
        Ok(DaemonClient::from_url(url))
    }

    fn write_status(&mut self, ctx: &AgentContext) {
        self.status.completed_at = Some(chrono::Utc::now());
        if let Err(e) = ctx.store.write(FUNDING_STATUS_FILE, &self.status) {
            log::error!("distributor: cannot record funding status: {}", e);
        }
    }

    /// One funding pass over the eligible recipients. Returns how many
    /// recipients were newly funded.
    fn run_distribution_pass(
        &mut self,
        ctx: &mut AgentContext,
        miner: &MinerEntry,
        amount_xmr: f64,
    ) -> Result<usize> {
        if miner.wallet_address.is_none() {
            return Err(eyre!("source miner has no published wallet address"));
        }
        let wallet = self.miner_wallet(ctx, miner)?;
        let amount = xmr_to_atomic(amount_xmr)?;

        let discovery = Discovery::new(ctx.store.clone());
        let mut recipients = discovery.list_distribution_recipients()?;
        recipients.sort_by(|a, b| a.id.cmp(&b.id));
        // A miner never funds itself, and the distributor never funds
        // anything without a real address.
        recipients.retain(|r| r.id != miner.agent_id && r.id != ctx.agent_id);

        self.status.source_miner = Some(miner.agent_id.clone());
        self.status.eligible = recipients.len();

        let already_funded: std::collections::BTreeSet<String> = self
            .status
            .outcomes
            .iter()
            .filter(|o| o.funded)
            .map(|o| o.recipient.clone())
            .collect();

        if !recipients.is_empty() {
            // Pull the source wallet up to date before the balance checks.
            if let Err(e) = wallet.refresh() {
                log::debug!("distributor: source wallet refresh failed: {}", e);
            }
        }

        let mut newly_funded = 0;
        for recipient in &recipients {
            if already_funded.contains(&recipient.id) {
                continue;
            }
            let Some(recipient_address) = recipient.wallet_address.as_deref() else {
                log::info!(
                    "distributor: {} has not published a wallet address yet, skipping",
                    recipient.id
                );
                self.status.outcomes.push(FundingOutcome {
                    recipient: recipient.id.clone(),
                    amount,
                    funded: false,
                    tx_hash: None,
                    error: Some("no published wallet address".to_string()),
                });
                continue;
            };

            match self.fund_one(ctx, &wallet, recipient_address, amount) {
                Ok(tx_hash) => {
                    newly_funded += 1;
                    log::info!(
                        "distributor: funded {} with {} (tx {})",
                        recipient.id,
                        amount,
                        tx_hash
                    );
                    let record = TransactionRecord {
                        tx_hash: tx_hash.clone(),
                        sender: miner.agent_id.clone(),
                        recipient: recipient.id.clone(),
                        amount,
                        timestamp: chrono::Utc::now(),
                        status: "submitted".to_string(),
                    };
                    if let Err(e) = ctx.store.append_list(TRANSACTIONS_FILE, &record) {
                        log::warn!("distributor: transaction log append failed: {}", e);
                    }
                    self.status.outcomes.push(FundingOutcome {
                        recipient: recipient.id.clone(),
                        amount,
                        funded: true,
                        tx_hash: Some(tx_hash),
                        error: None,
                    });
                }
                Err(e) => {
                    log::warn!("distributor: could not fund {}: {:#}", recipient.id, e);
                    self.status.outcomes.push(FundingOutcome {
                        recipient: recipient.id.clone(),
                        amount,
                        funded: false,
                        tx_hash: None,
                        error: Some(format!("{:#}", e)),
                    });
                }
            }
        }

        self.status.funded += newly_funded;
        Ok(newly_funded)
    }

    /// Fund one recipient with bounded retry on recoverable failures.
    fn fund_one(
        &self,
        ctx: &AgentContext,
        wallet: &WalletClient,
        recipient_address: &str,
        amount: u64,
    ) -> Result<String> {
        let mut last_error: Option<color_eyre::Report> = None;
        for attempt in 0..TRANSFER_ATTEMPTS {
            if ctx.shutdown_requested() {
                return Err(eyre!("shutdown during funding"));
            }

            let balance = match wallet.get_balance() {
                Ok(balance) => balance,
                Err(e) if e.is_transient() => {
                    last_error = Some(e.into());
                    ctx.sleep(TRANSFER_RETRY_DELAY);
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            if balance.unlocked_balance < amount {
                last_error = Some(eyre!(
                    "unlocked balance {} below transfer amount {}",
                    balance.unlocked_balance,
                    amount
                ));
                ctx.sleep(TRANSFER_RETRY_DELAY);
                continue;
            }

            match wallet.transfer(recipient_address, amount) {
                Ok(receipt) => return Ok(receipt.tx_hash),
                Err(e) => match e.kind() {
                    RpcErrorKind::NotEnoughMoney
                    | RpcErrorKind::WalletNotReady
                    | RpcErrorKind::Transport => {
                        log::debug!(
                            "distributor: transfer attempt {} failed, retrying: {}",
                            attempt + 1,
                            e
                        );
                        last_error = Some(e.into());
                        ctx.sleep(TRANSFER_RETRY_DELAY);
                    }
                    _ => return Err(e.into()),
                },
            }
        }
        Err(last_error.unwrap_or_else(|| eyre!("transfer attempts exhausted")))
    }
}

impl Behavior for MinerDistributor {
    fn role(&self) -> &'static str {
        "distributor"
    }

    fn needs_wallet(&self) -> bool {
        false
    }

    fn iterate(&mut self, ctx: &mut AgentContext) -> Result<Duration> {
        match std::mem::replace(&mut self.phase, Phase::Done) {
            Phase::FindMiner { attempts } => {
                let discovery = Discovery::new(ctx.store.clone());
                let miners = match discovery.list_miners() {
                    Ok(miners) => miners,
                    Err(e) => {
                        self.phase = Phase::FindMiner { attempts };
                        return Err(e.into());
                    }
                };
                match miners.into_iter().next() {
                    Some(miner) => {
                        log::info!(
                            "distributor: selected source miner {} ({}% hashrate)",
                            miner.agent_id,
                            miner.hashrate
                        );
                        self.phase = Phase::AwaitMaturity { miner };
                        Ok(Duration::ZERO)
                    }
                    None if attempts + 1 >= MINER_DISCOVERY_ATTEMPTS => {
                        log::error!(
                            "distributor: no miner published a wallet after {} attempts",
                            MINER_DISCOVERY_ATTEMPTS
                        );
                        self.write_status(ctx);
                        ctx.request_shutdown();
                        Ok(Duration::ZERO)
                    }
                    None => {
                        self.phase = Phase::FindMiner {
                            attempts: attempts + 1,
                        };
                        Ok(MINER_DISCOVERY_DELAY)
                    }
                }
            }

            Phase::AwaitMaturity { miner } => {
                let elapsed = sim_elapsed_secs().unwrap_or(DISTRIBUTION_MATURITY_WAIT_SECS);
                if elapsed < DISTRIBUTION_MATURITY_WAIT_SECS {
                    let remaining = DISTRIBUTION_MATURITY_WAIT_SECS - elapsed;
                    log::info!(
                        "distributor: waiting {}s more for coinbase maturity",
                        remaining
                    );
                    self.phase = Phase::AwaitMaturity { miner };
                    return Ok(Duration::from_secs(remaining));
                }
                self.phase = Phase::Distribute {
                    miner,
                    fallback: false,
                };
                Ok(Duration::ZERO)
            }

            Phase::Distribute { miner, fallback } => {
                let amount = if fallback {
                    self.fund_amount / 2.0
                } else {
                    self.fund_amount
                };
                let funded = match self.run_distribution_pass(ctx, &miner, amount) {
                    Ok(funded) => funded,
                    Err(e) => {
                        // The lifecycle swallows this error; keep the
                        // phase so the next iteration retries the pass.
                        self.phase = Phase::Distribute { miner, fallback };
                        return Err(e);
                    }
                };
                log::info!(
                    "distributor: pass complete, {} newly funded ({} eligible)",
                    funded,
                    self.status.eligible
                );

                if self.status.eligible == 0 || self.status.funded > 0 || fallback {
                    self.write_status(ctx);
                    ctx.request_shutdown();
                    return Ok(Duration::ZERO);
                }

                // Nothing funded on the first pass: block scarcity is the
                // usual cause, so wait for more blocks and try again.
                let baseline_height = self
                    .miner_daemon(ctx, &miner.agent_id)
                    .and_then(|d| d.get_height().map_err(Into::into))
                    .unwrap_or(0);
                self.phase = Phase::AwaitFallbackBlocks { baseline_height };
                Ok(FALLBACK_POLL)
            }

            Phase::AwaitFallbackBlocks { baseline_height } => {
                let discovery = Discovery::new(ctx.store.clone());
                let miners = match discovery.list_miners() {
                    Ok(miners) => miners,
                    Err(e) => {
                        self.phase = Phase::AwaitFallbackBlocks { baseline_height };
                        return Err(e.into());
                    }
                };
                let Some(miner) = miners.into_iter().next() else {
                    self.phase = Phase::AwaitFallbackBlocks { baseline_height };
                    return Ok(FALLBACK_POLL);
                };
                let height = self
                    .miner_daemon(ctx, &miner.agent_id)
                    .and_then(|d| d.get_height().map_err(Into::into))
                    .unwrap_or(baseline_height);
                if height >= baseline_height + FALLBACK_EXTRA_BLOCKS {
                    log::info!(
                        "distributor: {} new blocks observed, retrying with reduced amount",
                        height - baseline_height
                    );
                    self.phase = Phase::Distribute {
                        miner,
                        fallback: true,
                    };
                    Ok(Duration::ZERO)
                } else {
                    self.phase = Phase::AwaitFallbackBlocks { baseline_height };
                    Ok(FALLBACK_POLL)
                }
            }

            Phase::Done => {
                ctx.request_shutdown();
                Ok(Duration::ZERO)
            }
        }
    }

    fn finalize(&mut self, ctx: &mut AgentContext) {
        if self.status.completed_at.is_none() {
            self.write_status(ctx);
        }
        log::info!(
            "distributor: exiting, {}/{} recipients funded",
            self.status.funded,
            self.status.eligible
        );
    }
}
