//! # Monerosim - Deterministic Monero network simulations in Shadow
//!
//! Monerosim compiles a high-level scenario description into a Shadow
//! network-simulator manifest, and ships the agent runtime that the
//! manifest launches inside every simulated host.
//!
//! ## Overview
//!
//! A scenario declares cohorts of participants (miners, users, service
//! agents), a network shape, and a single root seed. The orchestrator
//! expands that into a per-host launch plan with stable identities,
//! deterministic IP allocation, generated peer wiring, staggered start
//! times, and frozen agent/miner registries. The agents then drive real
//! `monerod` / `monero-wallet-rpc` processes over JSON-RPC: autonomous
//! miners model block discovery as per-agent Poisson processes, regular
//! users emit transactions, and a distributor bootstraps spendable funds
//! once coinbase outputs mature.
//!
//! Re-running the same scenario with the same seed reproduces the same
//! manifest bytes, block times, and transaction ordering.
//!
//! ## Architecture
//!
//! - `config` / `config_loader`: scenario model and YAML parsing
//! - `gml_parser`: GML topology graphs and validation
//! - `topology`: agent placement and peer wiring
//! - `ip`: deterministic IP allocation, AS-aware when a graph is present
//! - `process`: per-host process planning (daemon/wallet phases, agents)
//! - `registry`: shared-directory layout and registry schemas
//! - `shadow`: manifest types and serialization
//! - `orchestrator`: the end-to-end planning pipeline
//! - `agent`: the runtime behaviors executed inside simulated hosts
//! - `utils`: durations, amounts, seeding, binary resolution
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use monerosim::{config_loader, orchestrator};
//! use std::path::Path;
//!
//! let config = config_loader::load_config(Path::new("scenario.yaml"))?;
//! let summary = orchestrator::generate_simulation(
//!     &config,
//!     "scenario",
//!     Path::new("shadow_output"),
//!     "/usr/local/bin/monerosim-agent",
//! )?;
//! println!("manifest at {:?}", summary.manifest_path);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! Generated configurations are executed with the Shadow simulator:
//!
//! ```bash
//! shadow shadow_output/shadow.yaml
//! ```

pub mod agent;
pub mod config;
pub mod config_loader;
pub mod gml_parser;
pub mod ip;
pub mod orchestrator;
pub mod process;
pub mod registry;
pub mod shadow;
pub mod topology;
pub mod utils;
