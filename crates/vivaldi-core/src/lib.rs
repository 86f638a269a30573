//! Vivaldi Coordinate Core
//!
//! Per-node state of the network-coordinate system: this node's position, a
//! cache of peer positions with dirty flags for delta export, the adaptive
//! error estimate, and the Vivaldi update step that moves the node after every
//! RTT sample.
//!
//! # Update Step
//!
//! ```text
//! w      = ei / (ei + ej)                   (1e-5 when both are zero)
//! e      = rtt - |x_i - x_j|
//! es     = |e| / rtt
//! ei'    = es·ce·w + ei·(1 - ce·w)          additive EWMA
//! x_i'   = x_i + cc·w·e · u(x_i - x_j)
//! ```
//!
//! A positive `e` (measured RTT longer than modelled) pushes the node away
//! from the communicator, a negative one pulls it closer.
//!
//! # Synchronisation Contract
//!
//! [`CoreGate`] is everything the dissemination layer may do to a core:
//! read the session, export dirty deltas, snapshot itself, merge an inbound
//! update and flag unreachable peers. Inbound pushes are also published on
//! the core's [`ChannelBus`] so that a gossiper can decide whether to relay.

mod clock;
mod config;
mod coordinate;
mod error;
mod guid;
mod message;
pub mod observer;

pub use crate::clock::{rtt_millis, Clock, ManualClock, SystemClock};
pub use crate::config::VivaldiTuning;
pub use crate::coordinate::{CoordinateCore, CoreGate, ZERO_ERROR_WEIGHT};
pub use crate::error::{CoreError, Result};
pub use crate::guid::Guid;
pub use crate::message::{
    Envelope, ForwardCandidate, GossipMessage, PeerDelta, PeerState, StateUpdates, WireEntry,
};
pub use crate::observer::{ChannelBus, ChannelId, ChannelSubject, Subscription};

pub use vivaldi_space::{Complex64, NormedVectorSpace, Point, SpaceError, Support};
