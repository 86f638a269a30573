//! Swarm configuration.

use std::str::FromStr;
use std::time::Duration;

use vivaldi_core::VivaldiTuning;
use vivaldi_gossip::GossipConfig;

use crate::error::{Result, SwarmError};

/// Configuration for a simulated swarm.
#[derive(Debug, Clone)]
pub struct SwarmConfig {
    /// Number of nodes
    pub nodes: usize,

    /// Dimension of the coordinate space
    pub dimension: usize,

    /// Gossip rounds to run; every node originates once per round
    pub rounds: usize,

    /// Pause between rounds
    pub round_interval: Duration,

    /// Seed for node placement and identifiers
    pub seed: u64,

    /// Largest one-way latency between two nodes, in milliseconds
    pub max_latency_ms: f64,

    /// Vivaldi constants for every node
    pub tuning: VivaldiTuning,

    /// Gossip parameters for every node
    pub gossip: GossipConfig,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            nodes: 16,
            dimension: 2,
            rounds: 30,
            round_interval: Duration::from_millis(100),
            seed: 42,
            max_latency_ms: 80.0,
            tuning: VivaldiTuning::default(),
            gossip: GossipConfig::default(),
        }
    }
}

impl SwarmConfig {
    /// Read `SWARM_*` overrides, plus the gossip engine's `VIVALDI_*` ones.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env) with an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self {
            gossip: GossipConfig::from_lookup(&lookup)?,
            ..Self::default()
        };

        if let Some(nodes) = parse_var(&lookup, "SWARM_NODES")? {
            config.nodes = nodes;
        }
        if let Some(dimension) = parse_var(&lookup, "SWARM_DIMENSION")? {
            config.dimension = dimension;
        }
        if let Some(rounds) = parse_var(&lookup, "SWARM_ROUNDS")? {
            config.rounds = rounds;
        }
        if let Some(ms) = parse_var(&lookup, "SWARM_ROUND_MS")? {
            config.round_interval = Duration::from_millis(ms);
        }
        if let Some(seed) = parse_var(&lookup, "SWARM_SEED")? {
            config.seed = seed;
        }
        if let Some(max) = parse_var(&lookup, "SWARM_MAX_LATENCY_MS")? {
            config.max_latency_ms = max;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.nodes < 2 {
            return Err(SwarmError::Config("a swarm needs at least 2 nodes".into()));
        }
        if self.dimension == 0 {
            return Err(SwarmError::Config("dimension must be positive".into()));
        }
        if !(self.max_latency_ms.is_finite() && self.max_latency_ms > 0.0) {
            return Err(SwarmError::Config("max latency must be positive".into()));
        }
        self.tuning.validate()?;
        self.gossip.validate()?;
        Ok(())
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|e| SwarmError::Config(format!("{key}={raw:?}: {e}")))
        })
        .transpose()
}
