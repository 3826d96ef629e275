//! Peer wiring generation.
//!
//! For the small-network wiring modes, each daemon's peer list is fixed at
//! plan time with `--add-exclusive-node` / `--add-priority-node` flags so
//! the P2P graph inside the simulator keeps the requested shape instead of
//! drifting with the daemon's own peer scoring. Dynamic mode emits nothing
//! and leaves discovery to the daemons.

use crate::config::PeerWiring;

/// Default cap on generated mesh peers per host. Above this the connection
/// table fills with redundant links and block relay slows down.
pub const MESH_PEER_CAP: usize = 8;

/// Ring neighbors per side.
const RING_NEIGHBORS: usize = 1;

/// DAG predecessor depth.
const DAG_DEPTH: usize = 3;

/// Generate the peer flags for one host.
///
/// `endpoints` is the canonical ordering of all daemon endpoints
/// ("ip:port"), and `index` this host's position in it.
pub fn peer_args(mode: PeerWiring, index: usize, endpoints: &[String]) -> Vec<String> {
    match mode {
        PeerWiring::Dynamic => Vec::new(),
        PeerWiring::Star => {
            // First endpoint in canonical order is the hub.
            if index == 0 || endpoints.is_empty() {
                return Vec::new();
            }
            vec![format!("--add-exclusive-node={}", endpoints[0])]
        }
        PeerWiring::Mesh => {
            let mut args = Vec::new();
            for (j, endpoint) in endpoints.iter().enumerate() {
                if j == index {
                    continue;
                }
                if args.len() / 2 >= MESH_PEER_CAP {
                    break;
                }
                // Priority keeps the connection alive, exclusive stops the
                // daemon from replacing it with discovered peers.
                args.push(format!("--add-priority-node={}", endpoint));
                args.push(format!("--add-exclusive-node={}", endpoint));
            }
            args
        }
        PeerWiring::Ring => {
            let n = endpoints.len();
            if n < 2 {
                return Vec::new();
            }
            let mut args = Vec::new();
            for k in 1..=RING_NEIGHBORS {
                let prev = (index + n - k) % n;
                let next = (index + k) % n;
                for j in [prev, next] {
                    if j != index {
                        args.push(format!("--add-priority-node={}", endpoints[j]));
                    }
                }
            }
            args.sort();
            args.dedup();
            args
        }
        PeerWiring::Dag => endpoints
            .iter()
            .enumerate()
            .filter(|(j, _)| *j < index && index - j <= DAG_DEPTH)
            .map(|(_, endpoint)| format!("--add-priority-node={}", endpoint))
            .collect(),
    }
}
