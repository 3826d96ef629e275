//! Determinism plumbing: stable hashing and per-agent seed derivation.
//!
//! Everything nondeterministic in a simulation is seeded from the
//! scenario's single `simulation_seed`. Agent streams are derived from it
//! with a fixed (non-randomized) hash of the agent id, so the same scenario
//! always yields the same block times and transaction ordering.

use rand_chacha::rand_core::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Environment variable carrying the global seed into every child process.
pub const SIMULATION_SEED_ENV: &str = "SIMULATION_SEED";

/// FNV-1a 64-bit. Unlike `std::hash`, this never changes between runs,
/// platforms, or compiler versions.
pub fn stable_hash(input: &str) -> u64 {
    const FNV_OFFSET: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x100000001b3;

    let mut hash = FNV_OFFSET;
    for byte in input.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Derive the per-agent seed: `global_seed + stable_hash(agent_id)`.
pub fn agent_seed(global_seed: u64, agent_id: &str) -> u64 {
    global_seed.wrapping_add(stable_hash(agent_id))
}

/// Build the agent's RNG. ChaCha8 keeps the stream identical across `rand`
/// releases, which `StdRng` does not guarantee.
pub fn agent_rng(global_seed: u64, agent_id: &str) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(agent_seed(global_seed, agent_id))
}

/// A short identifier for plan-scoped artifacts (generated topology files
/// and the like). Derived from scenario name and seed rather than the OS
/// process id so re-runs emit byte-identical manifests.
pub fn plan_artifact_id(scenario_name: &str, global_seed: u64) -> String {
    format!("{:016x}", stable_hash(scenario_name).wrapping_add(global_seed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn test_stable_hash_is_fixed() {
        // Pinned values: if these move, every replay in the field breaks.
        assert_eq!(stable_hash(""), 0xcbf29ce484222325);
        assert_eq!(stable_hash("miner000"), stable_hash("miner000"));
        assert_ne!(stable_hash("miner000"), stable_hash("miner001"));
    }

    #[test]
    fn test_agent_seed_varies_by_id() {
        let a = agent_seed(42, "miner000");
        let b = agent_seed(42, "user000");
        assert_ne!(a, b);
        assert_eq!(a, agent_seed(42, "miner000"));
    }

    #[test]
    fn test_rng_stream_is_reproducible() {
        let mut rng1 = agent_rng(42, "miner000");
        let mut rng2 = agent_rng(42, "miner000");
        let draws1: Vec<f64> = (0..16).map(|_| rng1.gen::<f64>()).collect();
        let draws2: Vec<f64> = (0..16).map(|_| rng2.gen::<f64>()).collect();
        assert_eq!(draws1, draws2);
    }

    #[test]
    fn test_plan_artifact_id_deterministic() {
        assert_eq!(plan_artifact_id("fairness", 42), plan_artifact_id("fairness", 42));
        assert_ne!(plan_artifact_id("fairness", 42), plan_artifact_id("fairness", 43));
    }
}
