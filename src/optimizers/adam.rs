//! ADAM and its rectified variant RAdam.
//!
//! Both keep the first and second moment estimates of the gradient in a
//! [`SupportStructure::Adam`]. The timestep is owned by the method and advances
//! on [`UpdateMethod::new_batch`], so every parameter updated within the same
//! batch sees the same bias correction.

use super::{map_sparse, SupportStructure, UpdateMethod, UpdateSettings};
use crate::arrays::{DenseArray, Shape, SparseArray};
use crate::error::{ensure_hyper, DnnError, Result};

fn validate(learning_rate: f64, beta1: f64, beta2: f64, epsilon: f64) -> Result<()> {
    ensure_hyper(learning_rate > 0.0, "learning_rate", format!("must be > 0, got {}", learning_rate))?;
    ensure_hyper((0.0..1.0).contains(&beta1), "beta1", format!("must be in [0, 1), got {}", beta1))?;
    ensure_hyper((0.0..1.0).contains(&beta2), "beta2", format!("must be in [0, 1), got {}", beta2))?;
    ensure_hyper(epsilon > 0.0, "epsilon", format!("must be > 0, got {}", epsilon))
}

/// The timestep of the current batch, `t >= 1`.
fn current_timestep(method: &'static str, timestep: usize) -> Result<i32> {
    if timestep == 0 {
        return Err(DnnError::InvalidConfiguration(format!(
            "{}: new_batch must be called before the first update",
            method
        )));
    }
    Ok(timestep as i32)
}

fn adam_support(shape: Shape) -> SupportStructure {
    SupportStructure::Adam {
        m: DenseArray::zeros(shape),
        v: DenseArray::zeros(shape),
    }
}

#[derive(Debug, Clone)]
pub struct AdamMethod {
    learning_rate: f64,
    beta1: f64,
    beta2: f64,
    epsilon: f64,
    timestep: usize,
    settings: UpdateSettings,
}

impl AdamMethod {
    pub fn new(learning_rate: f64, beta1: f64, beta2: f64, epsilon: f64) -> Result<Self> {
        validate(learning_rate, beta1, beta2, epsilon)?;
        Ok(Self {
            learning_rate,
            beta1,
            beta2,
            epsilon,
            timestep: 0,
            settings: UpdateSettings::default(),
        })
    }

    pub fn with_settings(mut self, settings: UpdateSettings) -> Result<Self> {
        settings.validate()?;
        self.settings = settings;
        Ok(self)
    }

    pub fn timestep(&self) -> usize {
        self.timestep
    }

    /// Bias corrected step size `lr · sqrt(1 - β2^t) / (1 - β1^t)`.
    fn alpha(&self) -> Result<f64> {
        let t = current_timestep("Adam", self.timestep)?;
        Ok(self.learning_rate * (1.0 - self.beta2.powi(t)).sqrt() / (1.0 - self.beta1.powi(t)))
    }

    fn step(&self, m: &mut f64, v: &mut f64, g: f64, alpha: f64) -> f64 {
        *m = self.beta1 * *m + (1.0 - self.beta1) * g;
        *v = self.beta2 * *v + (1.0 - self.beta2) * g * g;
        alpha * *m / (v.sqrt() + self.epsilon)
    }
}

impl Default for AdamMethod {
    fn default() -> Self {
        Self {
            learning_rate: 0.001,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
            timestep: 0,
            settings: UpdateSettings::default(),
        }
    }
}

impl UpdateMethod for AdamMethod {
    fn name(&self) -> &'static str {
        "Adam"
    }

    fn settings(&self) -> &UpdateSettings {
        &self.settings
    }

    fn new_support_structure(&self, shape: Shape) -> SupportStructure {
        adam_support(shape)
    }

    fn optimize_dense(&self, support: &mut SupportStructure, errors: &DenseArray) -> Result<DenseArray> {
        match support {
            SupportStructure::Adam { m, v } => {
                let alpha = self.alpha()?;
                let mut delta = DenseArray::zeros(errors.raw_dim());
                ndarray::Zip::from(&mut delta)
                    .and(m)
                    .and(v)
                    .and(errors)
                    .for_each(|d, m, v, &g| *d = self.step(m, v, g, alpha));
                Ok(delta)
            }
            other => Err(other.mismatch("Adam")),
        }
    }

    fn optimize_sparse(&self, support: &mut SupportStructure, errors: &SparseArray) -> Result<SparseArray> {
        match support {
            SupportStructure::Adam { m, v } => {
                let alpha = self.alpha()?;
                map_sparse(errors, |r, c, g| self.step(&mut m[[r, c]], &mut v[[r, c]], g, alpha))
            }
            other => Err(other.mismatch("Adam")),
        }
    }

    fn new_batch(&mut self) {
        self.timestep += 1;
    }
}

/// Rectified ADAM: falls back to a momentum step while the variance of the
/// adaptive learning rate is intractable (`ρ_t ≤ 4`).
#[derive(Debug, Clone)]
pub struct RAdamMethod {
    learning_rate: f64,
    beta1: f64,
    beta2: f64,
    epsilon: f64,
    timestep: usize,
    settings: UpdateSettings,
}

enum RAdamStep {
    Rectified { r: f64, bias1: f64, bias2: f64 },
    Momentum { bias1: f64 },
}

impl RAdamMethod {
    pub fn new(learning_rate: f64, beta1: f64, beta2: f64, epsilon: f64) -> Result<Self> {
        validate(learning_rate, beta1, beta2, epsilon)?;
        Ok(Self {
            learning_rate,
            beta1,
            beta2,
            epsilon,
            timestep: 0,
            settings: UpdateSettings::default(),
        })
    }

    pub fn with_settings(mut self, settings: UpdateSettings) -> Result<Self> {
        settings.validate()?;
        self.settings = settings;
        Ok(self)
    }

    fn step_kind(&self) -> Result<RAdamStep> {
        let t = current_timestep("RAdam", self.timestep)?;
        let beta2_t = self.beta2.powi(t);
        let bias1 = 1.0 - self.beta1.powi(t);
        let bias2 = 1.0 - beta2_t;

        let rho_inf = 2.0 / (1.0 - self.beta2) - 1.0;
        let rho_t = rho_inf - 2.0 * t as f64 * beta2_t / bias2;

        if rho_t > 4.0 {
            let r = ((rho_t - 4.0) * (rho_t - 2.0) * rho_inf
                / ((rho_inf - 4.0) * (rho_inf - 2.0) * rho_t))
                .sqrt();
            Ok(RAdamStep::Rectified { r, bias1, bias2 })
        } else {
            Ok(RAdamStep::Momentum { bias1 })
        }
    }

    fn step(&self, kind: &RAdamStep, m: &mut f64, v: &mut f64, g: f64) -> f64 {
        *m = self.beta1 * *m + (1.0 - self.beta1) * g;
        *v = self.beta2 * *v + (1.0 - self.beta2) * g * g;
        match *kind {
            RAdamStep::Rectified { r, bias1, bias2 } => {
                let m_hat = *m / bias1;
                let v_hat = *v / bias2;
                r * self.learning_rate * m_hat / (v_hat.sqrt() + self.epsilon)
            }
            RAdamStep::Momentum { bias1 } => self.learning_rate * *m / bias1,
        }
    }
}

impl Default for RAdamMethod {
    fn default() -> Self {
        Self {
            learning_rate: 0.001,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
            timestep: 0,
            settings: UpdateSettings::default(),
        }
    }
}

impl UpdateMethod for RAdamMethod {
    fn name(&self) -> &'static str {
        "RAdam"
    }

    fn settings(&self) -> &UpdateSettings {
        &self.settings
    }

    fn new_support_structure(&self, shape: Shape) -> SupportStructure {
        adam_support(shape)
    }

    fn optimize_dense(&self, support: &mut SupportStructure, errors: &DenseArray) -> Result<DenseArray> {
        match support {
            SupportStructure::Adam { m, v } => {
                let kind = self.step_kind()?;
                let mut delta = DenseArray::zeros(errors.raw_dim());
                ndarray::Zip::from(&mut delta)
                    .and(m)
                    .and(v)
                    .and(errors)
                    .for_each(|d, m, v, &g| *d = self.step(&kind, m, v, g));
                Ok(delta)
            }
            other => Err(other.mismatch("Adam")),
        }
    }

    fn optimize_sparse(&self, support: &mut SupportStructure, errors: &SparseArray) -> Result<SparseArray> {
        match support {
            SupportStructure::Adam { m, v } => {
                let kind = self.step_kind()?;
                map_sparse(errors, |r, c, g| self.step(&kind, &mut m[[r, c]], &mut v[[r, c]], g))
            }
            other => Err(other.mismatch("Adam")),
        }
    }

    fn new_batch(&mut self) {
        self.timestep += 1;
    }
}
