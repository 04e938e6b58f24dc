//! AdaGrad: per-entry learning rates scaled by the accumulated squared gradients.
//!
//! `ss += g²`, `Δ = lr · g / sqrt(ss + eps)`

use super::{map_sparse, SupportStructure, UpdateMethod, UpdateSettings};
use crate::arrays::{DenseArray, Shape, SparseArray};
use crate::error::{ensure_hyper, Result};

#[derive(Debug, Clone)]
pub struct AdaGradMethod {
    learning_rate: f64,
    epsilon: f64,
    settings: UpdateSettings,
}

impl AdaGradMethod {
    pub fn new(learning_rate: f64, epsilon: f64) -> Result<Self> {
        ensure_hyper(learning_rate > 0.0, "learning_rate", format!("must be > 0, got {}", learning_rate))?;
        ensure_hyper(epsilon > 0.0, "epsilon", format!("must be > 0, got {}", epsilon))?;
        Ok(Self {
            learning_rate,
            epsilon,
            settings: UpdateSettings::default(),
        })
    }

    pub fn with_settings(mut self, settings: UpdateSettings) -> Result<Self> {
        settings.validate()?;
        self.settings = settings;
        Ok(self)
    }
}

impl Default for AdaGradMethod {
    fn default() -> Self {
        Self {
            learning_rate: 0.01,
            epsilon: 1e-8,
            settings: UpdateSettings::default(),
        }
    }
}

impl UpdateMethod for AdaGradMethod {
    fn name(&self) -> &'static str {
        "AdaGrad"
    }

    fn settings(&self) -> &UpdateSettings {
        &self.settings
    }

    fn new_support_structure(&self, shape: Shape) -> SupportStructure {
        SupportStructure::AdaGrad {
            sum_squares: DenseArray::zeros(shape),
        }
    }

    fn optimize_dense(&self, support: &mut SupportStructure, errors: &DenseArray) -> Result<DenseArray> {
        match support {
            SupportStructure::AdaGrad { sum_squares } => {
                sum_squares.zip_mut_with(errors, |ss, &g| *ss += g * g);
                let mut delta = errors.clone();
                delta.zip_mut_with(sum_squares, |d, &ss| {
                    *d = self.learning_rate * *d / (ss + self.epsilon).sqrt()
                });
                Ok(delta)
            }
            other => Err(other.mismatch("AdaGrad")),
        }
    }

    fn optimize_sparse(&self, support: &mut SupportStructure, errors: &SparseArray) -> Result<SparseArray> {
        match support {
            SupportStructure::AdaGrad { sum_squares } => map_sparse(errors, |r, c, g| {
                sum_squares[[r, c]] += g * g;
                self.learning_rate * g / (sum_squares[[r, c]] + self.epsilon).sqrt()
            }),
            other => Err(other.mismatch("AdaGrad")),
        }
    }
}
