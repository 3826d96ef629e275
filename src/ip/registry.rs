//! Global IP address registry.
//!
//! One registry instance lives for the whole plan. Every address handed to
//! a host passes through it, which is what enforces the no-duplicate
//! invariant across cohorts and agent kinds. Allocation state is ordered
//! maps and monotonic counters only, so the mapping is a pure function of
//! the allocation sequence and re-runs reproduce it exactly.

use std::collections::BTreeMap;

/// Errors from IP allocation.
#[derive(Debug, thiserror::Error)]
pub enum IpError {
    #[error("IP {ip} already assigned to agent {owner}, requested by {requester}")]
    Conflict {
        ip: String,
        owner: String,
        requester: String,
    },

    #[error("Subnet {subnet}.0/24 exhausted while allocating for agent {agent}")]
    SubnetExhausted { subnet: String, agent: String },

    #[error("Flat address pool exhausted while allocating for agent {agent}")]
    PoolExhausted { agent: String },
}

/// First host octet handed out inside any /24; low addresses are left for
/// infrastructure conventions.
const FIRST_HOST_OCTET: u32 = 10;
const LAST_HOST_OCTET: u32 = 254;

/// Flat-mode base: hosts land in 192.168.S.H with S advancing as each /24
/// fills.
const FLAT_PREFIX: &str = "192.168";

#[derive(Debug, Default)]
pub struct GlobalIpRegistry {
    /// IP -> owning agent id
    assigned: BTreeMap<String, String>,
    /// Next host octet per /24 prefix ("a.b.c")
    subnet_counters: BTreeMap<String, u32>,
    /// Next /24 index for flat allocation
    flat_subnet: u32,
}

impl GlobalIpRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a pre-declared address (from the topology graph) for an
    /// agent. Re-registering the same pair is a no-op; anything else is a
    /// conflict.
    pub fn register_declared(&mut self, ip: &str, agent_id: &str) -> Result<(), IpError> {
        match self.assigned.get(ip) {
            Some(owner) if owner == agent_id => Ok(()),
            Some(owner) => Err(IpError::Conflict {
                ip: ip.to_string(),
                owner: owner.clone(),
                requester: agent_id.to_string(),
            }),
            None => {
                self.assigned.insert(ip.to_string(), agent_id.to_string());
                Ok(())
            }
        }
    }

    /// Allocate the next free host address inside a /24 prefix ("a.b.c").
    pub fn allocate_in_subnet(&mut self, prefix: &str, agent_id: &str) -> Result<String, IpError> {
        let counter = self
            .subnet_counters
            .entry(prefix.to_string())
            .or_insert(FIRST_HOST_OCTET);

        while *counter <= LAST_HOST_OCTET {
            let candidate = format!("{}.{}", prefix, counter);
            *counter += 1;
            if !self.assigned.contains_key(&candidate) {
                self.assigned
                    .insert(candidate.clone(), agent_id.to_string());
                return Ok(candidate);
            }
        }

        Err(IpError::SubnetExhausted {
            subnet: prefix.to_string(),
            agent: agent_id.to_string(),
        })
    }

    /// Allocate from the flat pool, advancing to the next /24 when one
    /// fills up.
    pub fn allocate_flat(&mut self, agent_id: &str) -> Result<String, IpError> {
        while self.flat_subnet < 256 {
            let prefix = format!("{}.{}", FLAT_PREFIX, self.flat_subnet);
            match self.allocate_in_subnet(&prefix, agent_id) {
                Ok(ip) => return Ok(ip),
                Err(IpError::SubnetExhausted { .. }) => {
                    self.flat_subnet += 1;
                }
                Err(other) => return Err(other),
            }
        }
        Err(IpError::PoolExhausted {
            agent: agent_id.to_string(),
        })
    }

    pub fn owner_of(&self, ip: &str) -> Option<&str> {
        self.assigned.get(ip).map(|s| s.as_str())
    }

    pub fn assigned_count(&self) -> usize {
        self.assigned.len()
    }

    /// Allocation counts per /24, for the plan summary.
    pub fn allocation_stats(&self) -> BTreeMap<String, usize> {
        let mut stats: BTreeMap<String, usize> = BTreeMap::new();
        for ip in self.assigned.keys() {
            if let Some(prefix) = ip.rsplitn(2, '.').nth(1) {
                *stats.entry(prefix.to_string()).or_default() += 1;
            }
        }
        stats
    }
}
