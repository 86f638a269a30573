//! Scalar support for coordinate vectors.

use std::fmt::Debug;
use std::ops::{Add, Sub};

use rand::Rng;

/// Complex number type used for complex coordinates.
pub type Complex64 = num_complex::Complex<f64>;

/// Scalar algebra a coordinate component must provide.
///
/// Everything a space needs is expressed here: addition and subtraction,
/// scaling by a real factor, the squared modulus, and an exponential sample
/// used to pick random directions.
pub trait Support:
    Copy + Debug + PartialEq + Send + Sync + 'static + Add<Output = Self> + Sub<Output = Self>
{
    /// Additive identity.
    fn zero() -> Self;

    /// Multiply by a real factor.
    fn scale(self, factor: f64) -> Self;

    /// Divide by a real factor.
    fn unscale(self, divisor: f64) -> Self;

    /// Squared modulus (`x²` for reals, `|z|²` for complex).
    fn norm_sqr(self) -> f64;

    /// Neither NaN nor infinite in any real component.
    fn is_finite(self) -> bool;

    /// Draw from an exponential distribution (rate 1) per real component.
    fn sample_exp<R: Rng + ?Sized>(rng: &mut R) -> Self;
}

fn exp_sample<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    // gen() is in [0, 1), so 1 - u is in (0, 1] and ln never sees zero
    -(1.0 - rng.gen::<f64>()).ln()
}

impl Support for f64 {
    fn zero() -> Self {
        0.0
    }

    fn scale(self, factor: f64) -> Self {
        self * factor
    }

    fn unscale(self, divisor: f64) -> Self {
        self / divisor
    }

    fn norm_sqr(self) -> f64 {
        self * self
    }

    fn is_finite(self) -> bool {
        f64::is_finite(self)
    }

    fn sample_exp<R: Rng + ?Sized>(rng: &mut R) -> Self {
        exp_sample(rng)
    }
}

impl Support for Complex64 {
    fn zero() -> Self {
        Complex64::new(0.0, 0.0)
    }

    fn scale(self, factor: f64) -> Self {
        self * factor
    }

    fn unscale(self, divisor: f64) -> Self {
        self / divisor
    }

    fn norm_sqr(self) -> f64 {
        num_complex::Complex::norm_sqr(&self)
    }

    fn is_finite(self) -> bool {
        self.re.is_finite() && self.im.is_finite()
    }

    fn sample_exp<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Complex64::new(exp_sample(rng), exp_sample(rng))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn real_algebra() {
        assert_eq!(<f64 as Support>::zero(), 0.0);
        assert_eq!(3.0_f64.scale(2.0), 6.0);
        assert_eq!(3.0_f64.unscale(2.0), 1.5);
        assert_eq!((-3.0_f64).norm_sqr(), 9.0);
        assert!(Support::is_finite(1.0_f64));
        assert!(!Support::is_finite(f64::NAN));
    }

    #[test]
    fn complex_algebra() {
        let z = Complex64::new(3.0, 4.0);
        assert_eq!(Support::norm_sqr(z), 25.0);
        assert_eq!(z.scale(2.0), Complex64::new(6.0, 8.0));
        assert_eq!(z.unscale(2.0), Complex64::new(1.5, 2.0));
        assert!(Support::is_finite(z));
        assert!(!Support::is_finite(Complex64::new(0.0, f64::INFINITY)));
    }

    #[test]
    fn exponential_samples_are_non_negative() {
        let mut rng = rand::thread_rng();
        for _ in 0..1000 {
            let x = f64::sample_exp(&mut rng);
            assert!(x >= 0.0 && x.is_finite());
        }
    }
}
