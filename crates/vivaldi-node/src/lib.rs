//! Vivaldi Swarm
//!
//! Runs a swarm of coordinate cores gossiping over an in-process network with
//! synthetic latencies, and reports how well the learned coordinates predict
//! the true latencies. The `lat-swarm` binary wraps this with environment
//! configuration and a JSON report on stdout.

mod config;
mod error;
mod simulation;

pub use crate::config::SwarmConfig;
pub use crate::error::{Result, SwarmError};
pub use crate::simulation::{NodeReport, Swarm, SwarmReport};
