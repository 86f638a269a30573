//! Vivaldi Normed Vector Spaces
//!
//! The algebraic substrate of network coordinates: a [`NormedVectorSpace`] is a
//! fixed dimension plus a pluggable set of five operations (distance, rescale,
//! external multiplication, random element, zero), and a [`Point`] is a
//! coordinate vector bound to exactly one space instance.
//!
//! # Space Identity
//!
//! Spaces are shared through `Arc`. Two points interoperate only when they
//! reference the *same* allocation, not merely an equal configuration:
//!
//! ```text
//! let a = NormedVectorSpace::<f64>::euclidean(2)?;
//! let b = NormedVectorSpace::<f64>::euclidean(2)?;
//! a.distance(&pa, &pb_from_b)  →  Err(SpaceMismatch)
//! ```
//!
//! # Scalar Support
//!
//! Coordinates are generic over [`Support`], implemented for `f64` and
//! [`Complex64`]. The Euclidean operation set is written once against the
//! trait, so real and complex spaces share every line of space/point logic.

mod error;
mod euclidean;
mod point;
mod space;
mod support;

pub use error::{Result, SpaceError};
pub use euclidean::euclidean_ops;
pub use point::Point;
pub use space::{NormedVectorSpace, SpaceOps};
pub use support::{Complex64, Support};

/// A real-valued coordinate space.
pub type RealSpace = NormedVectorSpace<f64>;

/// A complex-valued coordinate space.
pub type ComplexSpace = NormedVectorSpace<Complex64>;
