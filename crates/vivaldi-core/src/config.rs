//! Tuning constants for the coordinate update.

use crate::error::{CoreError, Result};

/// Vivaldi tuning constants.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VivaldiTuning {
    /// Error-estimate adaptation speed, in (0, 1].
    pub ce: f64,

    /// Coordinate movement scale, in (0, 1].
    pub cc: f64,

    /// Error estimate of a freshly created core.
    pub initial_error: f64,
}

impl Default for VivaldiTuning {
    fn default() -> Self {
        Self {
            ce: 0.25,
            cc: 0.25,
            initial_error: 10.0,
        }
    }
}

impl VivaldiTuning {
    /// Set `ce`.
    #[must_use]
    pub fn with_ce(mut self, ce: f64) -> Self {
        self.ce = ce;
        self
    }

    /// Set `cc`.
    #[must_use]
    pub fn with_cc(mut self, cc: f64) -> Self {
        self.cc = cc;
        self
    }

    /// Set the starting error estimate.
    #[must_use]
    pub fn with_initial_error(mut self, initial_error: f64) -> Self {
        self.initial_error = initial_error;
        self
    }

    /// Reject constants outside their domains.
    pub fn validate(&self) -> Result<()> {
        let in_unit = |x: f64| x > 0.0 && x <= 1.0;
        if !in_unit(self.ce) {
            return Err(CoreError::Configuration(format!("ce must be in (0, 1], got {}", self.ce)));
        }
        if !in_unit(self.cc) {
            return Err(CoreError::Configuration(format!("cc must be in (0, 1], got {}", self.cc)));
        }
        if !self.initial_error.is_finite() || self.initial_error < 0.0 {
            return Err(CoreError::Configuration(format!(
                "initial error must be finite and non-negative, got {}",
                self.initial_error
            )));
        }
        Ok(())
    }
}
