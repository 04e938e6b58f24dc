//! Classical and Nesterov momentum.

use super::{map_sparse, SupportStructure, UpdateMethod, UpdateSettings};
use crate::arrays::{DenseArray, Shape, SparseArray};
use crate::error::{ensure_hyper, Result};

fn validate(learning_rate: f64, momentum: f64) -> Result<()> {
    ensure_hyper(learning_rate > 0.0, "learning_rate", format!("must be > 0, got {}", learning_rate))?;
    ensure_hyper((0.0..1.0).contains(&momentum), "momentum", format!("must be in [0, 1), got {}", momentum))
}

/// `v = μ·v + lr·g`, `Δ = v`
#[derive(Debug, Clone)]
pub struct MomentumMethod {
    learning_rate: f64,
    momentum: f64,
    settings: UpdateSettings,
}

impl MomentumMethod {
    pub fn new(learning_rate: f64, momentum: f64) -> Result<Self> {
        validate(learning_rate, momentum)?;
        Ok(Self {
            learning_rate,
            momentum,
            settings: UpdateSettings::default(),
        })
    }

    pub fn with_settings(mut self, settings: UpdateSettings) -> Result<Self> {
        settings.validate()?;
        self.settings = settings;
        Ok(self)
    }
}

impl Default for MomentumMethod {
    fn default() -> Self {
        Self {
            learning_rate: 0.01,
            momentum: 0.9,
            settings: UpdateSettings::default(),
        }
    }
}

impl UpdateMethod for MomentumMethod {
    fn name(&self) -> &'static str {
        "Momentum"
    }

    fn settings(&self) -> &UpdateSettings {
        &self.settings
    }

    fn new_support_structure(&self, shape: Shape) -> SupportStructure {
        SupportStructure::Momentum {
            v: DenseArray::zeros(shape),
        }
    }

    fn optimize_dense(&self, support: &mut SupportStructure, errors: &DenseArray) -> Result<DenseArray> {
        match support {
            SupportStructure::Momentum { v } => {
                v.zip_mut_with(errors, |v, &g| *v = self.momentum * *v + self.learning_rate * g);
                Ok(v.clone())
            }
            other => Err(other.mismatch("Momentum")),
        }
    }

    fn optimize_sparse(&self, support: &mut SupportStructure, errors: &SparseArray) -> Result<SparseArray> {
        match support {
            SupportStructure::Momentum { v } => map_sparse(errors, |r, c, g| {
                let v = &mut v[[r, c]];
                *v = self.momentum * *v + self.learning_rate * g;
                *v
            }),
            other => Err(other.mismatch("Momentum")),
        }
    }
}

/// `v_prev = v`, `v = μ·v + lr·g`, `Δ = (1 + μ)·v - μ·v_prev`
#[derive(Debug, Clone)]
pub struct NesterovMomentumMethod {
    learning_rate: f64,
    momentum: f64,
    settings: UpdateSettings,
}

impl NesterovMomentumMethod {
    pub fn new(learning_rate: f64, momentum: f64) -> Result<Self> {
        validate(learning_rate, momentum)?;
        Ok(Self {
            learning_rate,
            momentum,
            settings: UpdateSettings::default(),
        })
    }

    pub fn with_settings(mut self, settings: UpdateSettings) -> Result<Self> {
        settings.validate()?;
        self.settings = settings;
        Ok(self)
    }

    fn step(&self, v: &mut f64, v_prev: &mut f64, g: f64) -> f64 {
        *v_prev = *v;
        *v = self.momentum * *v + self.learning_rate * g;
        (1.0 + self.momentum) * *v - self.momentum * *v_prev
    }
}

impl Default for NesterovMomentumMethod {
    fn default() -> Self {
        Self {
            learning_rate: 0.01,
            momentum: 0.9,
            settings: UpdateSettings::default(),
        }
    }
}

impl UpdateMethod for NesterovMomentumMethod {
    fn name(&self) -> &'static str {
        "NesterovMomentum"
    }

    fn settings(&self) -> &UpdateSettings {
        &self.settings
    }

    fn new_support_structure(&self, shape: Shape) -> SupportStructure {
        SupportStructure::Nesterov {
            v: DenseArray::zeros(shape),
            v_prev: DenseArray::zeros(shape),
        }
    }

    fn optimize_dense(&self, support: &mut SupportStructure, errors: &DenseArray) -> Result<DenseArray> {
        match support {
            SupportStructure::Nesterov { v, v_prev } => {
                let mut delta = DenseArray::zeros(errors.raw_dim());
                ndarray::Zip::from(&mut delta)
                    .and(v)
                    .and(v_prev)
                    .and(errors)
                    .for_each(|d, v, v_prev, &g| *d = self.step(v, v_prev, g));
                Ok(delta)
            }
            other => Err(other.mismatch("Nesterov")),
        }
    }

    fn optimize_sparse(&self, support: &mut SupportStructure, errors: &SparseArray) -> Result<SparseArray> {
        match support {
            SupportStructure::Nesterov { v, v_prev } => {
                map_sparse(errors, |r, c, g| self.step(&mut v[[r, c]], &mut v_prev[[r, c]], g))
            }
            other => Err(other.mismatch("Nesterov")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arrays::{Gradient, ParamsArray};
    use ndarray::array;

    #[test]
    fn test_momentum_accumulates_velocity() {
        let method = MomentumMethod::new(0.5, 0.5).unwrap();
        let mut params = ParamsArray::from_values(array![[0.0]]);
        let g = Gradient::Dense(array![[1.0]]);
        method.update(&mut params, &g).unwrap();
        assert_eq!(params.values[[0, 0]], -0.5);
        method.update(&mut params, &g).unwrap();
        // v = 0.5·0.5 + 0.5
        assert_eq!(params.values[[0, 0]], -1.25);
    }

    #[test]
    fn test_nesterov_looks_ahead() {
        let method = NesterovMomentumMethod::new(0.5, 0.5).unwrap();
        let mut params = ParamsArray::from_values(array![[0.0]]);
        method.update(&mut params, &Gradient::Dense(array![[1.0]])).unwrap();
        // v = 0.5, Δ = 1.5·0.5 - 0.5·0
        assert_eq!(params.values[[0, 0]], -0.75);
    }

    #[test]
    fn test_momentum_rejects_out_of_range() {
        assert!(MomentumMethod::new(0.1, 1.0).is_err());
        assert!(NesterovMomentumMethod::new(-0.1, 0.5).is_err());
    }
}
