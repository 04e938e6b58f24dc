//! Update methods: transform accumulated gradients into parameter updates.
//!
//! An update method is a stateless configuration (learning rate and other
//! hyperparameters) plus a per-parameter *support structure* (e.g. the ADAM
//! moments) that is stored on the [`ParamsArray`] itself and created the first
//! time the parameter is updated.
//!
//! Updating a parameter goes through the same steps for every method:
//!
//! 1. clip the gradient, if a [`GradientClipping`] is set;
//! 2. regularize the parameter values, if a [`ParamsRegularization`] is set
//!    (for a sparse gradient, only the entries it touches);
//! 3. optimize the dense or sparse gradient into a delta, updating the support
//!    structure;
//! 4. subtract the delta from the values.
//!
//! Sparse gradients only touch their active entries, both in the support
//! structure and in the values.

pub mod adagrad;
pub mod adam;
pub mod config;
pub mod decay;
pub mod learning_rate;
pub mod momentum;
pub mod params_optimizer;
pub mod regularization;

pub use adagrad::AdaGradMethod;
pub use adam::{AdamMethod, RAdamMethod};
pub use config::{UpdateMethodConfig, UpdateMethodKind};
pub use decay::DecayMethod;
pub use learning_rate::LearningRateMethod;
pub use momentum::{MomentumMethod, NesterovMomentumMethod};
pub use params_optimizer::{ParamsErrorsAccumulator, ParamsOptimizer};
pub use regularization::{GradientClipping, ParamsRegularization};

use crate::arrays::{check_shape, DenseArray, Gradient, ParamsArray, Shape, SparseArray};
use crate::error::{DnnError, Result};
use std::borrow::Cow;

/// Optimizer state attached to a single `ParamsArray`.
#[derive(Debug, Clone, PartialEq)]
pub enum SupportStructure {
    /// Plain learning rate methods keep no state.
    Empty,
    AdaGrad { sum_squares: DenseArray },
    /// First (`m`) and second (`v`) moment estimates, shared by ADAM and RAdam.
    Adam { m: DenseArray, v: DenseArray },
    Momentum { v: DenseArray },
    Nesterov { v: DenseArray, v_prev: DenseArray },
}

impl SupportStructure {
    pub fn kind(&self) -> &'static str {
        match self {
            SupportStructure::Empty => "Empty",
            SupportStructure::AdaGrad { .. } => "AdaGrad",
            SupportStructure::Adam { .. } => "Adam",
            SupportStructure::Momentum { .. } => "Momentum",
            SupportStructure::Nesterov { .. } => "Nesterov",
        }
    }

    pub(crate) fn mismatch(&self, expected: &'static str) -> DnnError {
        DnnError::SupportStructureMismatch {
            expected,
            found: self.kind(),
        }
    }
}

/// Regularization and clipping shared by every update method.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct UpdateSettings {
    pub regularization: Option<ParamsRegularization>,
    pub gradient_clipping: Option<GradientClipping>,
}

impl UpdateSettings {
    pub fn validate(&self) -> Result<()> {
        if let Some(regularization) = &self.regularization {
            regularization.validate()?;
        }
        if let Some(clipping) = &self.gradient_clipping {
            clipping.validate()?;
        }
        Ok(())
    }
}

pub trait UpdateMethod {
    fn name(&self) -> &'static str;

    fn settings(&self) -> &UpdateSettings;

    /// Builds the support structure for a parameter of the given shape.
    fn new_support_structure(&self, shape: Shape) -> SupportStructure;

    /// Returns the delta to subtract from the values for a dense gradient.
    fn optimize_dense(&self, support: &mut SupportStructure, errors: &DenseArray) -> Result<DenseArray>;

    /// Returns the delta to subtract from the values for a sparse gradient.
    fn optimize_sparse(&self, support: &mut SupportStructure, errors: &SparseArray) -> Result<SparseArray>;

    /// Called before each example.
    fn new_example(&mut self) {}

    /// Called before each batch.
    fn new_batch(&mut self) {}

    /// Called before each epoch.
    fn new_epoch(&mut self) {}

    /// Updates `params` with the given gradient.
    fn update(&self, params: &mut ParamsArray, errors: &Gradient) -> Result<()> {
        check_shape("UpdateMethod::update", params.shape(), errors.shape())?;

        let settings = *self.settings();
        let errors: Cow<Gradient> = match settings.gradient_clipping {
            Some(clipping) => Cow::Owned(clipping.clip(errors)),
            None => Cow::Borrowed(errors),
        };

        if let Some(regularization) = settings.regularization {
            match errors.as_ref() {
                Gradient::Dense(_) => regularization.apply(&mut params.values),
                Gradient::Sparse(e) => regularization.apply_sparse(&mut params.values, e),
            }
        }

        let support = params.support_or_insert_with(|shape| self.new_support_structure(shape));
        match errors.as_ref() {
            Gradient::Dense(e) => {
                let delta = self.optimize_dense(support, e)?;
                params.values -= &delta;
            }
            Gradient::Sparse(e) => {
                let delta = self.optimize_sparse(support, e)?;
                delta.sub_from_dense(&mut params.values)?;
            }
        }
        Ok(())
    }
}

/// Applies `f(support_entries, gradient) -> delta` to each active entry of a
/// sparse gradient.
pub(crate) fn map_sparse<F>(errors: &SparseArray, mut f: F) -> Result<SparseArray>
where
    F: FnMut(usize, usize, f64) -> f64,
{
    SparseArray::from_entries(
        errors.shape(),
        errors.iter().map(|((r, c), g)| ((r, c), f(r, c, g))).collect::<Vec<_>>(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_update_creates_support_lazily() {
        let method = AdaGradMethod::new(0.1, 1e-8).unwrap();
        let mut params = ParamsArray::from_values(array![[1.0, 1.0]]);
        assert!(params.support().is_none());
        method
            .update(&mut params, &Gradient::Dense(array![[1.0, 0.0]]))
            .unwrap();
        assert_eq!(params.support().map(|s| s.kind()), Some("AdaGrad"));
    }

    #[test]
    fn test_mismatched_support_is_an_error() {
        let adagrad = AdaGradMethod::new(0.1, 1e-8).unwrap();
        let momentum = MomentumMethod::new(0.1, 0.9).unwrap();
        let mut params = ParamsArray::from_values(array![[1.0]]);
        let g = Gradient::Dense(array![[1.0]]);
        adagrad.update(&mut params, &g).unwrap();
        assert!(matches!(
            momentum.update(&mut params, &g),
            Err(DnnError::SupportStructureMismatch { expected: "Momentum", found: "AdaGrad" })
        ));
    }

    #[test]
    fn test_update_rejects_wrong_gradient_shape() {
        let method = LearningRateMethod::new(0.1).unwrap();
        let mut params = ParamsArray::zeros((2, 2));
        assert!(method
            .update(&mut params, &Gradient::Dense(DenseArray::zeros((2, 1))))
            .is_err());
    }
}
