//! Learning rate decay schedules.

use crate::error::{ensure_hyper, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum DecayMethod {
    /// `lr_t = max(min, lr_0 / (1 + rate · t))`
    Hyperbolic { rate: f64, min: f64 },
    /// `lr_t = max(min, lr_0 · exp(-rate · t))`
    Exponential { rate: f64, min: f64 },
}

impl DecayMethod {
    pub fn validate(&self) -> Result<()> {
        let (rate, min) = match *self {
            DecayMethod::Hyperbolic { rate, min } | DecayMethod::Exponential { rate, min } => (rate, min),
        };
        ensure_hyper(rate.is_finite() && rate >= 0.0, "decay.rate", format!("must be >= 0, got {}", rate))?;
        ensure_hyper(min.is_finite() && min >= 0.0, "decay.min", format!("must be >= 0, got {}", min))
    }

    /// Learning rate after `t` epochs, starting from `initial`.
    pub fn decay(&self, initial: f64, t: usize) -> f64 {
        let t = t as f64;
        match *self {
            DecayMethod::Hyperbolic { rate, min } => (initial / (1.0 + rate * t)).max(min),
            DecayMethod::Exponential { rate, min } => (initial * (-rate * t).exp()).max(min),
        }
    }
}
