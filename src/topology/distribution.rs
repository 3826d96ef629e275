//! Agent distribution across topology nodes.
//!
//! With a GML topology, each agent must sit on some graph node. Nodes that
//! declare a `weight` attribute receive agents proportionally (largest
//! remainder); otherwise agents round-robin across nodes in id order.
//! Either way the assignment depends only on the graph and the agent
//! count, never on map iteration order.

use crate::gml_parser::GmlGraph;
use log::info;

/// Assign a topology node id to each of `agent_count` agents.
///
/// Returns one node id per agent, in agent order. Panics never; an empty
/// graph yields an empty assignment.
pub fn distribute_agents(graph: &GmlGraph, agent_count: usize) -> Vec<u32> {
    let mut node_ids: Vec<u32> = graph.nodes.iter().map(|n| n.id).collect();
    node_ids.sort_unstable();
    if node_ids.is_empty() || agent_count == 0 {
        return Vec::new();
    }

    let weights: Vec<f64> = node_ids
        .iter()
        .map(|id| {
            graph
                .nodes
                .iter()
                .find(|n| n.id == *id)
                .and_then(|n| n.attributes.get("weight"))
                .and_then(|w| w.parse::<f64>().ok())
                .unwrap_or(0.0)
        })
        .collect();

    let total_weight: f64 = weights.iter().sum();
    if total_weight <= 0.0 {
        info!(
            "Distributing {} agents round-robin across {} topology nodes",
            agent_count,
            node_ids.len()
        );
        return (0..agent_count)
            .map(|i| node_ids[i % node_ids.len()])
            .collect();
    }

    info!(
        "Distributing {} agents across {} topology nodes by declared weight",
        agent_count,
        node_ids.len()
    );

    // Largest-remainder apportionment: floors first, then one extra agent
    // per node in descending remainder order (node id breaks ties).
    let exact: Vec<f64> = weights
        .iter()
        .map(|w| w / total_weight * agent_count as f64)
        .collect();
    let mut counts: Vec<usize> = exact.iter().map(|e| e.floor() as usize).collect();
    let assigned: usize = counts.iter().sum();

    let mut remainders: Vec<(usize, f64)> = exact
        .iter()
        .enumerate()
        .map(|(i, e)| (i, e - e.floor()))
        .collect();
    remainders.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.0.cmp(&b.0))
    });
    for (i, _) in remainders.iter().take(agent_count - assigned) {
        counts[*i] += 1;
    }

    let mut assignments = Vec::with_capacity(agent_count);
    for (idx, count) in counts.iter().enumerate() {
        for _ in 0..*count {
            assignments.push(node_ids[idx]);
        }
    }
    assignments
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gml_parser::parse_gml_str;

    #[test]
    fn test_round_robin_without_weights() {
        let graph = parse_gml_str(
            r#"graph [
                node [ id 2 ]
                node [ id 0 ]
                node [ id 1 ]
            ]"#,
        )
        .unwrap();
        let assignments = distribute_agents(&graph, 5);
        assert_eq!(assignments, vec![0, 1, 2, 0, 1]);
    }

    #[test]
    fn test_weighted_distribution() {
        let graph = parse_gml_str(
            r#"graph [
                node [ id 0 weight "3" ]
                node [ id 1 weight "1" ]
            ]"#,
        )
        .unwrap();
        let assignments = distribute_agents(&graph, 4);
        assert_eq!(assignments.iter().filter(|&&n| n == 0).count(), 3);
        assert_eq!(assignments.iter().filter(|&&n| n == 1).count(), 1);
    }

    #[test]
    fn test_weighted_distribution_is_exhaustive() {
        let graph = parse_gml_str(
            r#"graph [
                node [ id 0 weight "1" ]
                node [ id 1 weight "1" ]
                node [ id 2 weight "1" ]
            ]"#,
        )
        .unwrap();
        // 7 does not divide evenly; largest remainder must still place all.
        let assignments = distribute_agents(&graph, 7);
        assert_eq!(assignments.len(), 7);
    }

    #[test]
    fn test_deterministic() {
        let graph = parse_gml_str(
            r#"graph [
                node [ id 0 weight "2" ]
                node [ id 1 weight "5" ]
                node [ id 2 ]
            ]"#,
        )
        .unwrap();
        assert_eq!(distribute_agents(&graph, 10), distribute_agents(&graph, 10));
    }

    #[test]
    fn test_empty_graph() {
        let graph = parse_gml_str("graph [ ]").unwrap();
        assert!(distribute_agents(&graph, 3).is_empty());
    }
}
