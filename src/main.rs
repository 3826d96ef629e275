use clap::Parser;
use env_logger::Env;
use log::{error, info};
use std::path::PathBuf;

use monerosim::config_loader;
use monerosim::orchestrator;

/// Deterministic Monero network simulations in Shadow
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the scenario configuration YAML file
    #[arg(short, long)]
    config: PathBuf,

    /// Output directory for the simulator manifest
    #[arg(short, long)]
    output: PathBuf,
}

fn main() {
    let args = Args::parse();

    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    info!("Starting MoneroSim scenario compiler");
    info!("Configuration file: {:?}", args.config);
    info!("Output directory: {:?}", args.output);

    let config = match config_loader::load_config(&args.config) {
        Ok(config) => config,
        Err(report) => {
            error!("{:#}", report);
            std::process::exit(1);
        }
    };

    let scenario_name = args
        .config
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "scenario".to_string());

    let agent_binary = match locate_agent_binary() {
        Ok(path) => path,
        Err(message) => {
            error!("{}", message);
            std::process::exit(2);
        }
    };

    match orchestrator::generate_simulation(&config, &scenario_name, &args.output, &agent_binary) {
        Ok(summary) => {
            info!("Generated Shadow configuration at {:?}", summary.manifest_path);
            info!("  - Simulation time: {}", config.general.stop_time);
            info!("  - Total hosts: {}", summary.host_count);
            info!("  - Agents: {} ({} miners)", summary.agent_count, summary.miner_count);
            info!("  - IP allocation summary:");
            for (subnet, count) in &summary.ip_stats {
                info!("    - {}.0/24: {} addresses", subnet, count);
            }
            info!(
                "Ready to run: shadow --config {}",
                summary.manifest_path.display()
            );
        }
        Err(err) => {
            error!("{}", err);
            std::process::exit(err.exit_code());
        }
    }
}

/// The agent runtime ships beside the orchestrator binary.
fn locate_agent_binary() -> Result<String, String> {
    let current = std::env::current_exe()
        .map_err(|e| format!("cannot locate own executable: {}", e))?;
    let agent = current
        .parent()
        .ok_or_else(|| "executable has no parent directory".to_string())?
        .join("monerosim-agent");
    if !agent.exists() {
        return Err(format!(
            "agent runtime not found at {} (build with `cargo build --bins`)",
            agent.display()
        ));
    }
    Ok(agent.display().to_string())
}
