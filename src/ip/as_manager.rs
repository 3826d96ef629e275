//! Autonomous-system subnet derivation.
//!
//! GML topologies group nodes into autonomous systems. Agents placed on a
//! node must receive addresses from that node's AS subnet so Shadow routes
//! their traffic through the right links. When the graph pre-declares node
//! addresses, the AS subnet is derived from them; otherwise each AS gets a
//! /24 from a reserved block, assigned in sorted AS order.

use crate::gml_parser::GmlGraph;
use std::collections::BTreeMap;

/// Reserved block for ASes without declared addresses: 192.168.100.0/24,
/// 192.168.101.0/24, ...
const DERIVED_BASE_OCTET: u32 = 100;

#[derive(Debug, Default)]
pub struct AsSubnetManager {
    /// AS identifier -> "a.b.c" /24 prefix
    prefixes: BTreeMap<String, String>,
}

impl AsSubnetManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Derive subnet prefixes for every AS in the graph. Declared node
    /// addresses are authoritative (validation already ensured they agree
    /// within an AS); undeclared ASes take sequential /24s from the
    /// reserved block.
    pub fn from_graph(graph: &GmlGraph) -> Self {
        let mut prefixes = BTreeMap::new();
        let mut undeclared: Vec<String> = Vec::new();

        let mut as_ids: Vec<String> = graph
            .nodes
            .iter()
            .filter_map(|n| n.as_number().map(|a| a.to_string()))
            .collect();
        as_ids.sort();
        as_ids.dedup();

        for as_id in as_ids {
            let declared = graph
                .nodes
                .iter()
                .filter(|n| n.as_number() == Some(as_id.as_str()))
                .find_map(|n| n.get_ip());
            match declared {
                Some(ip) => {
                    if let Some(prefix) = ip.rsplitn(2, '.').nth(1) {
                        prefixes.insert(as_id, prefix.to_string());
                    }
                }
                None => undeclared.push(as_id),
            }
        }

        for (i, as_id) in undeclared.into_iter().enumerate() {
            prefixes.insert(
                as_id,
                format!("192.168.{}", DERIVED_BASE_OCTET + i as u32),
            );
        }

        Self { prefixes }
    }

    /// The /24 prefix ("a.b.c") for an AS, if known.
    pub fn subnet_prefix(&self, as_number: &str) -> Option<&str> {
        self.prefixes.get(as_number).map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.prefixes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prefixes.is_empty()
    }
}
