//! Base agent lifecycle.
//!
//! Every participant runs the same skeleton: seed the per-agent RNG, wait
//! for its daemon and wallet to answer RPC, open-or-create the wallet,
//! publish a self-description fact, then hand control to the behavior's
//! iteration loop until the shutdown signal arrives. Behaviors only
//! encode what happens inside one iteration.

use crate::agent::rpc::{DaemonClient, WalletClient};
use crate::agent::store::SharedStore;
use crate::registry::{miner_info_file, user_info_file, AgentFact};
use crate::utils::seed::{agent_rng, agent_seed};
use color_eyre::eyre::{eyre, Result, WrapErr};
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Bounded wait for the local daemon to answer RPC.
pub const DAEMON_READY_WAIT: Duration = Duration::from_secs(300);
/// Bounded wait for the wallet RPC endpoint.
pub const WALLET_READY_WAIT: Duration = Duration::from_secs(120);
/// Backoff after a failed iteration.
#[cfg(not(test))]
const ITERATION_BACKOFF: Duration = Duration::from_secs(10);
#[cfg(test)]
const ITERATION_BACKOFF: Duration = Duration::from_millis(10);
/// Registration write attempts before giving up.
const REGISTRATION_ATTEMPTS: u32 = 3;
/// Sleep slice; the shutdown flag is re-checked between slices.
const SLEEP_CHUNK: Duration = Duration::from_secs(30);

/// Parsed agent invocation, shared by every behavior.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub agent_id: String,
    pub shared_dir: PathBuf,
    pub rpc_host: Option<String>,
    pub daemon_rpc_port: Option<u16>,
    pub wallet_rpc_port: Option<u16>,
    pub attributes: BTreeMap<String, String>,
    pub global_seed: u64,
}

/// Everything a behavior can touch during an iteration.
pub struct AgentContext {
    pub agent_id: String,
    pub store: SharedStore,
    pub daemon: Option<DaemonClient>,
    pub wallet: Option<WalletClient>,
    /// Primary address read from the wallet; never synthesized
    pub wallet_address: Option<String>,
    pub attributes: BTreeMap<String, String>,
    pub rng: ChaCha8Rng,
    pub global_seed: u64,
    shutdown: Arc<AtomicBool>,
}

/// Simulated seconds since the simulation began. The simulator's clock
/// starts at 2000-01-01T00:00:00Z; outside it (unit tests, manual runs)
/// this returns `None` and callers treat time gates as already passed.
pub fn sim_elapsed_secs() -> Option<u64> {
    const SIMULATION_EPOCH_SECS: u64 = 946_684_800;
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .ok()?
        .as_secs();
    now.checked_sub(SIMULATION_EPOCH_SECS)
}

impl AgentContext {
    pub fn shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    /// Let a behavior end the agent from inside an iteration; the loop
    /// finalizes and exits zero.
    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    /// Sleep in simulated time, returning early when shutdown arrives.
    pub fn sleep(&self, duration: Duration) {
        let mut remaining = duration;
        while remaining > Duration::ZERO && !self.shutdown_requested() {
            let slice = remaining.min(SLEEP_CHUNK);
            std::thread::sleep(slice);
            remaining = remaining.saturating_sub(slice);
        }
    }

    pub fn daemon(&self) -> Result<&DaemonClient> {
        self.daemon
            .as_ref()
            .ok_or_else(|| eyre!("agent {} has no daemon endpoint", self.agent_id))
    }

    pub fn wallet(&self) -> Result<&WalletClient> {
        self.wallet
            .as_ref()
            .ok_or_else(|| eyre!("agent {} has no wallet endpoint", self.agent_id))
    }

    pub fn wallet_address(&self) -> Result<&str> {
        self.wallet_address
            .as_deref()
            .ok_or_else(|| eyre!("agent {} has no wallet address", self.agent_id))
    }
}

/// Role-specific behavior plugged into the lifecycle.
pub trait Behavior {
    /// Role label recorded in this agent's published fact.
    fn role(&self) -> &'static str;

    /// Whether the lifecycle should open a wallet before setup.
    fn needs_wallet(&self) -> bool {
        true
    }

    /// One-time initialization after readiness and registration.
    fn setup(&mut self, _ctx: &mut AgentContext) -> Result<()> {
        Ok(())
    }

    /// One iteration; returns the suggested simulated-time sleep before
    /// the next one.
    fn iterate(&mut self, ctx: &mut AgentContext) -> Result<Duration>;

    /// Cleanup on shutdown. Failures are logged, not propagated.
    fn finalize(&mut self, _ctx: &mut AgentContext) {}
}

/// Run the full lifecycle. Returns the process exit code: zero on normal
/// completion, nonzero only when startup fails beyond recovery.
pub fn run_agent(config: AgentConfig, behavior: &mut dyn Behavior) -> i32 {
    match run_agent_inner(config, behavior) {
        Ok(()) => 0,
        Err(report) => {
            log::error!("agent failed: {:#}", report);
            1
        }
    }
}

fn run_agent_inner(config: AgentConfig, behavior: &mut dyn Behavior) -> Result<()> {
    let shutdown = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGTERM, Arc::clone(&shutdown))
        .wrap_err("cannot install SIGTERM handler")?;
    signal_hook::flag::register(signal_hook::consts::SIGINT, Arc::clone(&shutdown))
        .wrap_err("cannot install SIGINT handler")?;

    let seed = agent_seed(config.global_seed, &config.agent_id);
    log::info!(
        "agent {} starting (role {}, seed {})",
        config.agent_id,
        behavior.role(),
        seed
    );

    let store = SharedStore::new(&config.shared_dir)
        .wrap_err("shared directory is not usable")?;

    // Readiness: a daemon that never comes up makes the agent useless, so
    // exceeding the budget is fatal.
    let daemon = match (&config.rpc_host, config.daemon_rpc_port) {
        (Some(host), Some(port)) => {
            let client = DaemonClient::new(host, port);
            client
                .wait_until_ready(DAEMON_READY_WAIT)
                .wrap_err_with(|| format!("daemon at {}:{} never became ready", host, port))?;
            log::info!("agent {}: daemon ready", config.agent_id);
            Some(client)
        }
        _ => None,
    };

    let (wallet, wallet_address) = if behavior.needs_wallet() {
        match (&config.rpc_host, config.wallet_rpc_port) {
            (Some(host), Some(port)) => {
                let client = WalletClient::new(host, port);
                client
                    .wait_until_ready(WALLET_READY_WAIT)
                    .wrap_err_with(|| format!("wallet RPC at {}:{} never became ready", host, port))?;

                let wallet_name = format!("{}_wallet", config.agent_id);
                client
                    .open_or_create(&wallet_name)
                    .wrap_err_with(|| format!("cannot open or create wallet '{}'", wallet_name))?;
                let address = client
                    .get_address()
                    .wrap_err("wallet opened but refuses to report its address")?;
                log::info!("agent {}: wallet open, address {}", config.agent_id, address);
                (Some(client), Some(address))
            }
            _ => (None, None),
        }
    } else {
        (None, None)
    };

    let mut ctx = AgentContext {
        agent_id: config.agent_id.clone(),
        store,
        daemon,
        wallet,
        wallet_address,
        attributes: config.attributes,
        rng: agent_rng(config.global_seed, &config.agent_id),
        global_seed: config.global_seed,
        shutdown,
    };

    register_identity(&ctx, behavior.role())?;

    behavior
        .setup(&mut ctx)
        .wrap_err("behavior setup failed")?;

    // Iteration loop: runtime failures are logged and swallowed, progress
    // matters more than any single iteration.
    while !ctx.shutdown_requested() {
        match behavior.iterate(&mut ctx) {
            Ok(pause) => ctx.sleep(pause),
            Err(report) => {
                log::warn!(
                    "agent {}: iteration failed, continuing: {:#}",
                    ctx.agent_id,
                    report
                );
                ctx.sleep(ITERATION_BACKOFF);
            }
        }
    }

    log::info!("agent {}: shutdown requested, finalizing", ctx.agent_id);
    behavior.finalize(&mut ctx);
    Ok(())
}

/// Publish this agent's self-description fact, with bounded retry.
fn register_identity(ctx: &AgentContext, role: &str) -> Result<()> {
    let fact = AgentFact {
        agent_id: ctx.agent_id.clone(),
        role: role.to_string(),
        wallet_address: ctx.wallet_address.clone(),
        registered_at: chrono::Utc::now(),
        attributes: ctx.attributes.clone(),
    };
    let filename = if role == "miner" {
        miner_info_file(&ctx.agent_id)
    } else {
        user_info_file(&ctx.agent_id)
    };

    let mut last_error = None;
    for attempt in 0..REGISTRATION_ATTEMPTS {
        match ctx.store.write(&filename, &fact) {
            Ok(()) => {
                log::info!("agent {}: registered as {}", ctx.agent_id, role);
                return Ok(());
            }
            Err(e) => {
                log::warn!(
                    "agent {}: registration attempt {} failed: {}",
                    ctx.agent_id,
                    attempt + 1,
                    e
                );
                last_error = Some(e);
                std::thread::sleep(Duration::from_secs(2));
            }
        }
    }
    Err(eyre!(
        "cannot register identity after {} attempts: {}",
        REGISTRATION_ATTEMPTS,
        last_error.expect("at least one attempt was made")
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::AgentFact;

    struct CountingBehavior {
        iterations: u32,
        limit: u32,
        finalized: bool,
    }

    impl Behavior for CountingBehavior {
        fn role(&self) -> &'static str {
            "regular-user"
        }

        fn needs_wallet(&self) -> bool {
            false
        }

        fn iterate(&mut self, ctx: &mut AgentContext) -> Result<Duration> {
            self.iterations += 1;
            if self.iterations >= self.limit {
                ctx.shutdown.store(true, Ordering::Relaxed);
            }
            Ok(Duration::from_millis(1))
        }

        fn finalize(&mut self, _ctx: &mut AgentContext) {
            self.finalized = true;
        }
    }

    fn config(dir: &std::path::Path) -> AgentConfig {
        AgentConfig {
            agent_id: "users000".to_string(),
            shared_dir: dir.to_path_buf(),
            rpc_host: None,
            daemon_rpc_port: None,
            wallet_rpc_port: None,
            attributes: BTreeMap::new(),
            global_seed: 42,
        }
    }

    #[test]
    fn test_loop_runs_until_stop_and_finalizes() {
        let dir = tempfile::tempdir().unwrap();
        let mut behavior = CountingBehavior {
            iterations: 0,
            limit: 3,
            finalized: false,
        };
        let code = run_agent(config(dir.path()), &mut behavior);
        assert_eq!(code, 0);
        assert_eq!(behavior.iterations, 3);
        assert!(behavior.finalized);
    }

    #[test]
    fn test_registration_fact_is_published() {
        let dir = tempfile::tempdir().unwrap();
        let mut behavior = CountingBehavior {
            iterations: 0,
            limit: 1,
            finalized: false,
        };
        run_agent(config(dir.path()), &mut behavior);

        let store = SharedStore::new(dir.path()).unwrap();
        let fact: AgentFact = store
            .read(&user_info_file("users000"))
            .unwrap()
            .expect("fact should be published");
        assert_eq!(fact.agent_id, "users000");
        assert_eq!(fact.role, "regular-user");
        assert_eq!(fact.wallet_address, None);
    }

    struct FailingSetup;

    impl Behavior for FailingSetup {
        fn role(&self) -> &'static str {
            "regular-user"
        }
        fn needs_wallet(&self) -> bool {
            false
        }
        fn setup(&mut self, _ctx: &mut AgentContext) -> Result<()> {
            Err(eyre!("no usable configuration"))
        }
        fn iterate(&mut self, _ctx: &mut AgentContext) -> Result<Duration> {
            unreachable!("setup failed")
        }
    }

    #[test]
    fn test_setup_failure_is_fatal_nonzero() {
        let dir = tempfile::tempdir().unwrap();
        let code = run_agent(config(dir.path()), &mut FailingSetup);
        assert_eq!(code, 1);
    }

    #[test]
    fn test_iteration_errors_are_swallowed() {
        struct FlakyBehavior {
            calls: u32,
        }
        impl Behavior for FlakyBehavior {
            fn role(&self) -> &'static str {
                "regular-user"
            }
            fn needs_wallet(&self) -> bool {
                false
            }
            fn iterate(&mut self, ctx: &mut AgentContext) -> Result<Duration> {
                self.calls += 1;
                if self.calls == 1 {
                    // First iteration fails; the loop must survive it.
                    return Err(eyre!("transient daemon hiccup"));
                }
                ctx.shutdown.store(true, Ordering::Relaxed);
                Ok(Duration::ZERO)
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let mut behavior = FlakyBehavior { calls: 0 };
        let code = run_agent(config(dir.path()), &mut behavior);
        assert_eq!(code, 0);
        assert_eq!(behavior.calls, 2);
    }
}
