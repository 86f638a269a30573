//! Vivaldi Gossip
//!
//! Epidemic dissemination of coordinate deltas between
//! [`CoordinateCore`](vivaldi_core::CoordinateCore)s using blind-counter rumor
//! mongering.
//!
//! # Overview
//!
//! - [`BlindCounterGossiper`] drives outbound pushes and relays for one core.
//! - [`GossipEndpoint`] handles inbound push, pull and exchange requests and
//!   feeds relay candidates back to the gossiper through the core's bus.
//! - [`PeerChannel`] is the transport seam; [`LocalNetwork`] implements it in
//!   memory for tests and simulations.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use vivaldi_core::{CoordinateCore, CoreGate, Guid, NormedVectorSpace, VivaldiTuning};
//! use vivaldi_gossip::{BlindCounterGossiper, GossipConfig, GossipEndpoint, LocalNetwork, PeerMap};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let network = LocalNetwork::<f64>::new();
//! let space = NormedVectorSpace::<f64>::euclidean(2)?;
//!
//! let core = Arc::new(CoordinateCore::at_origin(Guid::generate(), space, VivaldiTuning::default())?);
//! network.attach(core.guid(), Arc::new(GossipEndpoint::for_core(Arc::clone(&core))));
//!
//! let peers = Arc::new(PeerMap::new());
//! let gossiper = BlindCounterGossiper::new(core.clone() as Arc<dyn CoreGate<f64>>, peers, GossipConfig::default())?;
//! gossiper.observe(&*core);
//! gossiper.start_gossiping();
//! gossiper.insert_gossip();
//! gossiper.stop_gossiping().await;
//! # Ok(())
//! # }
//! ```

mod channel;
mod config;
mod endpoint;
mod error;
mod gossiper;
mod local;
mod peers;
mod registry;
pub mod wire;

pub use crate::channel::PeerChannel;
pub use crate::config::GossipConfig;
pub use crate::endpoint::{GossipEndpoint, SessionMap};
pub use crate::error::{GossipError, Result};
pub use crate::gossiper::BlindCounterGossiper;
pub use crate::local::{LatencyFn, LocalChannel, LocalNetwork};
pub use crate::peers::{PeerMap, SharedChannel};
pub use crate::registry::ConnectionRegistry;
pub use crate::wire::WireScalar;
