//! The Euclidean operation set, shared by real and complex supports.

use crate::space::SpaceOps;
use crate::support::Support;

/// Euclidean distance, elementwise rescale and multiplication, exponential
/// random components and the zero vector.
pub fn euclidean_ops<S: Support>() -> SpaceOps<S> {
    SpaceOps::new()
        .with_distance(distance::<S>)
        .with_rescale(|v: &[S], norm| v.iter().map(|x| x.unscale(norm)).collect())
        .with_external_mul(|v: &[S], k| v.iter().map(|x| x.scale(k)).collect())
        .with_random_element(|| S::sample_exp(&mut rand::thread_rng()))
        .with_zero(|dim| vec![S::zero(); dim])
}

fn distance<S: Support>(first: &[S], second: &[S]) -> f64 {
    first
        .iter()
        .zip(second)
        .map(|(a, b)| (*a - *b).norm_sqr())
        .sum::<f64>()
        .sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_matches_pythagoras() {
        assert_eq!(distance(&[0.0, 0.0], &[3.0, 4.0]), 5.0);
        assert_eq!(distance(&[1.0, 1.0, 1.0], &[1.0, 1.0, 1.0]), 0.0);
    }
}
