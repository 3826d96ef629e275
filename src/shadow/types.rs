//! Shadow manifest type definitions.
//!
//! The root [`ShadowConfig`] serializes to the YAML document the Shadow
//! network simulator consumes: general settings, a network graph, and a
//! map of hosts each owning an ordered process list.

use serde::Serialize;
use std::collections::BTreeMap;

/// Main Shadow simulator configuration.
#[derive(Serialize, Debug)]
pub struct ShadowConfig {
    pub general: ShadowGeneral,
    pub network: ShadowNetwork,
    pub experimental: ShadowExperimental,
    /// Hostname -> host, ordered so emission is bit-stable
    pub hosts: BTreeMap<String, ShadowHost>,
}

/// General Shadow simulation settings.
#[derive(Serialize, Debug)]
pub struct ShadowGeneral {
    /// Simulation stop time in seconds
    pub stop_time: u64,
    /// Seed for Shadow's own random number generators
    pub seed: u64,
    /// Worker threads; 1 keeps event ordering deterministic
    pub parallelism: u32,
    pub model_unblocked_syscall_latency: bool,
    pub log_level: String,
    /// High bandwidth / lossless period while the network settles
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bootstrap_end_time: Option<String>,
    /// Show simulation progress on stderr
    pub progress: bool,
}

/// Experimental Shadow features.
#[derive(Serialize, Debug)]
pub struct ShadowExperimental {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runahead: Option<String>,
    pub use_dynamic_runahead: bool,
}

#[derive(Serialize, Debug)]
pub struct ShadowNetwork {
    pub graph: ShadowGraph,
}

/// Network graph: a named simple topology or a GML file reference.
#[derive(Serialize, Debug)]
pub struct ShadowGraph {
    #[serde(rename = "type")]
    pub graph_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<ShadowFileSource>,
}

impl ShadowGraph {
    pub fn switch(network_type: &str) -> Self {
        Self {
            graph_type: network_type.to_string(),
            file: None,
        }
    }

    pub fn gml(path: String) -> Self {
        Self {
            graph_type: "gml".to_string(),
            file: Some(ShadowFileSource { path }),
        }
    }
}

/// Reference to an external GML topology file.
#[derive(Serialize, Debug)]
pub struct ShadowFileSource {
    pub path: String,
}

/// A simulated host: one network attachment point plus its processes.
#[derive(Serialize, Debug)]
pub struct ShadowHost {
    /// ID of the network node this host is attached to
    pub network_node_id: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_addr: Option<String>,
    /// Processes in launch order
    pub processes: Vec<ShadowProcess>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bandwidth_down: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bandwidth_up: Option<String>,
}

/// Expected final state for a Shadow process.
///
/// Declared so Shadow does not report intentionally-terminated phases
/// (binary upgrades) as failures. Serializes as:
/// ```yaml
/// expected_final_state:
///   signaled: SIGTERM
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum ExpectedFinalState {
    Exited(i32),
    Signaled(String),
    Running,
}

impl serde::Serialize for ExpectedFinalState {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeMap;
        match self {
            ExpectedFinalState::Exited(code) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("exited", code)?;
                map.end()
            }
            ExpectedFinalState::Signaled(signal) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("signaled", signal)?;
                map.end()
            }
            ExpectedFinalState::Running => serializer.serialize_str("running"),
        }
    }
}

/// A single process within a host.
#[derive(Serialize, Debug)]
pub struct ShadowProcess {
    /// Absolute path to the executable
    pub path: String,
    /// Command-line arguments as a single string
    pub args: String,
    pub environment: BTreeMap<String, String>,
    /// Start time (e.g. "0s", "65s")
    pub start_time: String,
    /// When to deliver the shutdown signal, for phased binaries
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shutdown_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_final_state: Option<ExpectedFinalState>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expected_final_state_serialization() {
        let signaled = serde_yaml::to_string(&ExpectedFinalState::Signaled("SIGTERM".to_string()))
            .unwrap();
        assert_eq!(signaled.trim(), "signaled: SIGTERM");

        let exited = serde_yaml::to_string(&ExpectedFinalState::Exited(0)).unwrap();
        assert_eq!(exited.trim(), "exited: 0");

        let running = serde_yaml::to_string(&ExpectedFinalState::Running).unwrap();
        assert_eq!(running.trim(), "running");
    }

    #[test]
    fn test_process_optional_fields_omitted() {
        let process = ShadowProcess {
            path: "/usr/local/bin/monerod".to_string(),
            args: "--regtest".to_string(),
            environment: BTreeMap::new(),
            start_time: "0s".to_string(),
            shutdown_time: None,
            expected_final_state: None,
        };
        let yaml = serde_yaml::to_string(&process).unwrap();
        assert!(!yaml.contains("shutdown_time"));
        assert!(!yaml.contains("expected_final_state"));
    }
}
