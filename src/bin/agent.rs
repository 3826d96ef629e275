//! Agent runtime entrypoint.
//!
//! One process per simulated participant. The behavior kind is selected
//! on the command line; everything else (readiness, wallet handling,
//! registration, the iteration loop) is the shared lifecycle.

use clap::{Parser, ValueEnum};
use env_logger::Env;
use std::collections::BTreeMap;
use std::path::PathBuf;

use monerosim::agent::block_controller::BlockController;
use monerosim::agent::distributor::MinerDistributor;
use monerosim::agent::lifecycle::{run_agent, AgentConfig, Behavior};
use monerosim::agent::miner::AutonomousMiner;
use monerosim::agent::monitor::SimulationMonitor;
use monerosim::agent::user::RegularUser;
use monerosim::utils::seed::SIMULATION_SEED_ENV;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum BehaviorArg {
    AutonomousMiner,
    RegularUser,
    MinerDistributor,
    BlockController,
    SimulationMonitor,
}

/// Simulated network participant
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Stable agent identifier (also the wallet name prefix)
    #[arg(long)]
    id: String,

    /// Behavior this agent runs
    #[arg(long, value_enum)]
    behavior: BehaviorArg,

    /// Shared coordination directory
    #[arg(long)]
    shared_dir: PathBuf,

    /// Host address the local daemon/wallet RPC endpoints bind to
    #[arg(long)]
    rpc_host: Option<String>,

    /// Local daemon RPC port
    #[arg(long)]
    daemon_rpc_port: Option<u16>,

    /// Local wallet RPC port
    #[arg(long)]
    wallet_rpc_port: Option<u16>,

    /// Free-form KEY VALUE attribute pairs
    #[arg(long, num_args = 2, value_names = ["KEY", "VALUE"], action = clap::ArgAction::Append)]
    attributes: Vec<String>,

    /// Log filter (error/warn/info/debug/trace)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Root simulation seed; defaults to $SIMULATION_SEED
    #[arg(long)]
    seed: Option<u64>,
}

fn main() {
    let args = Args::parse();

    env_logger::Builder::from_env(Env::default().default_filter_or(args.log_level.clone())).init();

    let global_seed = args.seed.or_else(read_seed_env).unwrap_or_else(|| {
        log::warn!("no seed given and {} unset, using 0", SIMULATION_SEED_ENV);
        0
    });

    let mut attributes = BTreeMap::new();
    for pair in args.attributes.chunks(2) {
        if let [key, value] = pair {
            attributes.insert(key.clone(), value.clone());
        }
    }

    let config = AgentConfig {
        agent_id: args.id,
        shared_dir: args.shared_dir,
        rpc_host: args.rpc_host,
        daemon_rpc_port: args.daemon_rpc_port,
        wallet_rpc_port: args.wallet_rpc_port,
        attributes: attributes.clone(),
        global_seed,
    };

    let mut behavior: Box<dyn Behavior> = match args.behavior {
        BehaviorArg::AutonomousMiner => match AutonomousMiner::from_attributes(&attributes) {
            Ok(miner) => Box::new(miner),
            Err(report) => {
                log::error!("invalid miner configuration: {:#}", report);
                std::process::exit(1);
            }
        },
        BehaviorArg::RegularUser => Box::new(RegularUser::from_attributes(&attributes)),
        BehaviorArg::MinerDistributor => Box::new(MinerDistributor::from_attributes(&attributes)),
        BehaviorArg::BlockController => Box::new(BlockController::from_attributes(&attributes)),
        BehaviorArg::SimulationMonitor => Box::new(SimulationMonitor::from_attributes(&attributes)),
    };

    let code = run_agent(config, behavior.as_mut());
    std::process::exit(code);
}

fn read_seed_env() -> Option<u64> {
    std::env::var(SIMULATION_SEED_ENV).ok()?.parse().ok()
}
