//! Host address allocation.
//!
//! Priority order per agent:
//! 1) the assigned topology node's pre-declared address (first agent on
//!    the node only),
//! 2) an address from the node's AS subnet,
//! 3) the flat sequential pool.
//!
//! Callers iterate agents in sorted id order, so for a given scenario and
//! seed the resulting mapping is identical on every run.

use super::as_manager::AsSubnetManager;
use super::registry::{GlobalIpRegistry, IpError};
use crate::gml_parser::GmlNode;

/// Allocate the address for one agent.
///
/// `node` is the topology node the agent was distributed onto, when a GML
/// topology is in use.
pub fn allocate_agent_ip(
    agent_id: &str,
    node: Option<&GmlNode>,
    subnet_manager: &AsSubnetManager,
    registry: &mut GlobalIpRegistry,
) -> Result<String, IpError> {
    if let Some(node) = node {
        // The node's declared address is authoritative for the first agent
        // placed there.
        if let Some(declared) = node.get_ip() {
            if registry.owner_of(declared).is_none() {
                registry.register_declared(declared, agent_id)?;
                log::debug!(
                    "Assigned declared IP {} to agent {} (node {})",
                    declared,
                    agent_id,
                    node.id
                );
                return Ok(declared.to_string());
            }
        }

        // Subsequent agents on the node inherit its AS subnet.
        if let Some(as_number) = node.as_number() {
            if let Some(prefix) = subnet_manager.subnet_prefix(as_number) {
                let ip = registry.allocate_in_subnet(prefix, agent_id)?;
                log::debug!(
                    "Assigned AS-aware IP {} to agent {} (AS {}, node {})",
                    ip,
                    agent_id,
                    as_number,
                    node.id
                );
                return Ok(ip);
            }
        }
    }

    let ip = registry.allocate_flat(agent_id)?;
    log::debug!("Assigned flat IP {} to agent {}", ip, agent_id);
    Ok(ip)
}
