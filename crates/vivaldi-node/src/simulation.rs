//! Swarm simulation over synthetic latencies.
//!
//! Nodes are scattered in a hidden plane; the one-way latency between two
//! nodes is their distance there. Every node starts at the origin of its own
//! coordinate space and learns a position purely from gossip RTT samples. The
//! report compares the coordinate distance each node predicts for every peer
//! it knows with the true latency.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing::{debug, info};
use vivaldi_core::{CoordinateCore, CoreGate, Guid, NormedVectorSpace};
use vivaldi_gossip::{BlindCounterGossiper, GossipEndpoint, LocalNetwork, PeerMap, SharedChannel};

use crate::config::SwarmConfig;
use crate::error::Result;

/// Floor for synthetic latencies, so co-located nodes still have a sample.
const MIN_LATENCY_MS: f64 = 1.0;

/// Per-node part of the report.
#[derive(Debug, Clone, Serialize)]
pub struct NodeReport {
    pub guid: Guid,
    pub coordinates: Vec<f64>,
    pub error_estimate: f64,
    pub known_peers: usize,
    pub mean_relative_error: Option<f64>,
}

/// Convergence summary of a run.
#[derive(Debug, Clone, Serialize)]
pub struct SwarmReport {
    pub nodes: usize,
    pub dimension: usize,
    pub rounds: usize,
    /// Node pairs with a prediction.
    pub samples: usize,
    /// `samples` over all ordered pairs.
    pub coverage: f64,
    pub mean_relative_error: Option<f64>,
    pub median_relative_error: Option<f64>,
    pub per_node: Vec<NodeReport>,
}

struct SwarmNode {
    core: Arc<CoordinateCore<f64>>,
    gossiper: BlindCounterGossiper<f64>,
}

/// A fully connected swarm on one [`LocalNetwork`].
pub struct Swarm {
    config: SwarmConfig,
    layout: Arc<HashMap<Guid, [f64; 2]>>,
    network: LocalNetwork<f64>,
    nodes: Vec<SwarmNode>,
}

impl Swarm {
    /// Place the nodes and wire every node to every other.
    pub fn build(config: SwarmConfig) -> Result<Self> {
        config.validate()?;
        let mut rng = StdRng::seed_from_u64(config.seed);

        let session = Guid::from_bytes(rng.gen());
        let guids: Vec<Guid> = (0..config.nodes).map(|_| Guid::from_bytes(rng.gen())).collect();

        // Corners of the square are max_latency_ms apart
        let side = config.max_latency_ms / std::f64::consts::SQRT_2;
        let layout: Arc<HashMap<Guid, [f64; 2]>> = Arc::new(
            guids
                .iter()
                .map(|guid| (*guid, [rng.gen_range(0.0..=side), rng.gen_range(0.0..=side)]))
                .collect(),
        );

        let latencies = Arc::clone(&layout);
        let network = LocalNetwork::with_latency(move |a, b| {
            Duration::from_secs_f64(latency_ms(&latencies, a, b) / 1_000.0)
        });

        let space = NormedVectorSpace::euclidean(config.dimension)?;
        let mut cores = Vec::with_capacity(guids.len());
        for guid in &guids {
            let core = CoordinateCore::at_origin(*guid, Arc::clone(&space), config.tuning)?.with_session(session);
            let core = Arc::new(core);
            network.attach(*guid, Arc::new(GossipEndpoint::for_core(Arc::clone(&core))));
            cores.push(core);
        }

        let mut nodes = Vec::with_capacity(cores.len());
        for core in &cores {
            let peers = Arc::new(PeerMap::new());
            for other in guids.iter().filter(|g| **g != core.guid()) {
                let channel = network.connect(core.guid(), *other)?;
                peers.add_peer(Arc::new(channel) as SharedChannel<f64>);
            }

            let gate = Arc::clone(core) as Arc<dyn CoreGate<f64>>;
            let gossiper = BlindCounterGossiper::new(gate, peers, config.gossip.clone())?;
            gossiper.observe(&**core);
            nodes.push(SwarmNode {
                core: Arc::clone(core),
                gossiper,
            });
        }

        info!(
            nodes = nodes.len(),
            dimension = config.dimension,
            session = %session,
            "swarm built"
        );
        Ok(Self {
            config,
            layout,
            network,
            nodes,
        })
    }

    pub fn network(&self) -> &LocalNetwork<f64> {
        &self.network
    }

    pub fn guids(&self) -> Vec<Guid> {
        self.nodes.iter().map(|n| n.core.guid()).collect()
    }

    /// True one-way latency between two nodes, in milliseconds.
    pub fn true_latency_ms(&self, a: Guid, b: Guid) -> f64 {
        latency_ms(&self.layout, a, b)
    }

    /// Run the configured number of rounds and report.
    pub async fn run(&self) -> SwarmReport {
        for node in &self.nodes {
            node.gossiper.start_gossiping();
        }

        for round in 0..self.config.rounds {
            for node in &self.nodes {
                node.gossiper.insert_gossip();
            }
            tokio::time::sleep(self.config.round_interval).await;

            let snapshot = self.report();
            debug!(
                round,
                samples = snapshot.samples,
                mean_error = ?snapshot.mean_relative_error,
                "round complete"
            );
        }

        for node in &self.nodes {
            node.gossiper.stop_gossiping().await;
        }

        let report = self.report();
        info!(
            samples = report.samples,
            coverage = report.coverage,
            mean_error = ?report.mean_relative_error,
            "swarm finished"
        );
        report
    }

    /// Compare every node's predictions with the true latencies.
    pub fn report(&self) -> SwarmReport {
        let mut all_errors = Vec::new();
        let mut per_node = Vec::with_capacity(self.nodes.len());

        for node in &self.nodes {
            let me = node.core.guid();
            let errors: Vec<f64> = self
                .nodes
                .iter()
                .map(|other| other.core.guid())
                .filter(|other| *other != me)
                .filter_map(|other| {
                    let predicted = node.core.estimate_rtt(&other).ok()?;
                    let actual = self.true_latency_ms(me, other);
                    Some((predicted - actual).abs() / actual)
                })
                .collect();

            per_node.push(NodeReport {
                guid: me,
                coordinates: node.core.coordinates(),
                error_estimate: node.core.error_estimate(),
                known_peers: node.core.known_peers(),
                mean_relative_error: mean(&errors),
            });
            all_errors.extend(errors);
        }

        let n = self.nodes.len();
        let pairs = n * (n - 1);
        SwarmReport {
            nodes: n,
            dimension: self.config.dimension,
            rounds: self.config.rounds,
            samples: all_errors.len(),
            coverage: all_errors.len() as f64 / pairs as f64,
            mean_relative_error: mean(&all_errors),
            median_relative_error: median(all_errors),
            per_node,
        }
    }
}

fn latency_ms(layout: &HashMap<Guid, [f64; 2]>, a: Guid, b: Guid) -> f64 {
    match (layout.get(&a), layout.get(&b)) {
        (Some(pa), Some(pb)) => {
            let (dx, dy) = (pa[0] - pb[0], pa[1] - pb[1]);
            (dx * dx + dy * dy).sqrt().max(MIN_LATENCY_MS)
        }
        _ => MIN_LATENCY_MS,
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
}

fn median(mut values: Vec<f64>) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    Some(if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use vivaldi_gossip::GossipConfig;

    fn small(seed: u64) -> SwarmConfig {
        SwarmConfig {
            nodes: 4,
            rounds: 3,
            round_interval: Duration::from_millis(30),
            seed,
            max_latency_ms: 4.0,
            gossip: GossipConfig::default().with_fanout(2).with_patience(2),
            ..SwarmConfig::default()
        }
    }

    #[test]
    fn layout_is_seeded() {
        let a = Swarm::build(small(7)).unwrap();
        let b = Swarm::build(small(7)).unwrap();
        assert_eq!(a.guids(), b.guids());

        let g = a.guids();
        assert_eq!(a.true_latency_ms(g[0], g[1]), b.true_latency_ms(g[0], g[1]));
        assert_eq!(a.true_latency_ms(g[0], g[1]), a.true_latency_ms(g[1], g[0]));
        assert!(a.true_latency_ms(g[0], g[1]) >= MIN_LATENCY_MS);
        assert!(a.true_latency_ms(g[0], g[1]) <= 4.0 + 1e-9);
    }

    #[tokio::test]
    async fn short_run_produces_predictions() {
        let swarm = Swarm::build(small(1)).unwrap();
        assert_eq!(swarm.report().samples, 0);

        let report = swarm.run().await;
        assert_eq!(report.nodes, 4);
        assert_eq!(report.per_node.len(), 4);
        assert!(report.samples > 0);
        assert!(report.coverage > 0.0 && report.coverage <= 1.0);
        assert!(report.mean_relative_error.is_some());

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["nodes"], 4);
    }

    #[test]
    fn statistics() {
        assert_eq!(mean(&[]), None);
        assert_eq!(mean(&[1.0, 3.0]), Some(2.0));
        assert_eq!(median(vec![3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(vec![4.0, 1.0, 3.0, 2.0]), Some(2.5));
        assert_eq!(median(Vec::new()), None);
    }
}
