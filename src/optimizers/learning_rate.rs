//! Plain gradient descent: `Δ = lr · g`, with an optional decay of the learning
//! rate at each epoch.

use super::{map_sparse, DecayMethod, SupportStructure, UpdateMethod, UpdateSettings};
use crate::arrays::{DenseArray, Shape, SparseArray};
use crate::error::{ensure_hyper, Result};

#[derive(Debug, Clone)]
pub struct LearningRateMethod {
    initial_learning_rate: f64,
    learning_rate: f64,
    decay: Option<DecayMethod>,
    epoch_count: usize,
    settings: UpdateSettings,
}

impl LearningRateMethod {
    pub fn new(learning_rate: f64) -> Result<Self> {
        ensure_hyper(learning_rate > 0.0, "learning_rate", format!("must be > 0, got {}", learning_rate))?;
        Ok(Self {
            initial_learning_rate: learning_rate,
            learning_rate,
            decay: None,
            epoch_count: 0,
            settings: UpdateSettings::default(),
        })
    }

    pub fn with_decay(mut self, decay: DecayMethod) -> Result<Self> {
        decay.validate()?;
        self.decay = Some(decay);
        Ok(self)
    }

    pub fn with_settings(mut self, settings: UpdateSettings) -> Result<Self> {
        settings.validate()?;
        self.settings = settings;
        Ok(self)
    }

    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }
}

impl UpdateMethod for LearningRateMethod {
    fn name(&self) -> &'static str {
        "LearningRate"
    }

    fn settings(&self) -> &UpdateSettings {
        &self.settings
    }

    fn new_support_structure(&self, _shape: Shape) -> SupportStructure {
        SupportStructure::Empty
    }

    fn optimize_dense(&self, support: &mut SupportStructure, errors: &DenseArray) -> Result<DenseArray> {
        match support {
            SupportStructure::Empty => Ok(errors * self.learning_rate),
            other => Err(other.mismatch("Empty")),
        }
    }

    fn optimize_sparse(&self, support: &mut SupportStructure, errors: &SparseArray) -> Result<SparseArray> {
        match support {
            SupportStructure::Empty => map_sparse(errors, |_, _, g| g * self.learning_rate),
            other => Err(other.mismatch("Empty")),
        }
    }

    fn new_epoch(&mut self) {
        self.epoch_count += 1;
        if let Some(decay) = self.decay {
            self.learning_rate = decay.decay(self.initial_learning_rate, self.epoch_count);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arrays::{Gradient, ParamsArray};
    use ndarray::array;

    #[test]
    fn test_sgd_step() {
        let method = LearningRateMethod::new(0.5).unwrap();
        let mut params = ParamsArray::from_values(array![[1.0, 2.0]]);
        method.update(&mut params, &Gradient::Dense(array![[2.0, -2.0]])).unwrap();
        assert_eq!(params.values, array![[0.0, 3.0]]);
    }

    #[test]
    fn test_decay_on_new_epoch() {
        let mut method = LearningRateMethod::new(1.0)
            .unwrap()
            .with_decay(DecayMethod::Hyperbolic { rate: 1.0, min: 0.0 })
            .unwrap();
        method.new_epoch();
        assert_eq!(method.learning_rate(), 0.5);
    }

    #[test]
    fn test_invalid_learning_rate() {
        assert!(LearningRateMethod::new(0.0).is_err());
    }

    #[test]
    fn test_invalid_decay() {
        let method = LearningRateMethod::new(1.0).unwrap();
        assert!(method
            .clone()
            .with_decay(DecayMethod::Exponential { rate: -0.1, min: 0.0 })
            .is_err());
        assert!(method.with_decay(DecayMethod::Hyperbolic { rate: 1.0, min: f64::NAN }).is_err());
    }
}
