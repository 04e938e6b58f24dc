//! `AugmentedArray`: the values of a layer output together with what the
//! backward pass needs to differentiate through them.

use super::{check_shape, DenseArray};
use crate::error::{DnnError, Result};
use crate::functions::ActivationFunction;

/// Values paired with an optional activation, the values before activation and
/// the errors (gradients) with respect to the values.
///
/// Lifecycle: created per layer invocation, values assigned during forward,
/// errors assigned before backward.
#[derive(Debug, Clone)]
pub struct AugmentedArray {
    values: DenseArray,
    not_activated: Option<DenseArray>,
    activation: Option<ActivationFunction>,
    errors: Option<DenseArray>,
    errors_pre_activation: bool,
}

impl AugmentedArray {
    /// Zero-valued array of the given size (column vector).
    pub fn new(size: usize) -> Self {
        Self::from_values(DenseArray::zeros((size, 1)))
    }

    pub fn from_values(values: DenseArray) -> Self {
        Self {
            values,
            not_activated: None,
            activation: None,
            errors: None,
            errors_pre_activation: false,
        }
    }

    pub fn with_activation(mut self, activation: Option<ActivationFunction>) -> Self {
        self.activation = activation;
        self
    }

    pub fn activation(&self) -> Option<ActivationFunction> {
        self.activation
    }

    pub fn values(&self) -> &DenseArray {
        &self.values
    }

    pub fn shape(&self) -> (usize, usize) {
        self.values.dim()
    }

    /// Values before the activation. Equal to `values` when there is no activation.
    pub fn not_activated(&self) -> &DenseArray {
        self.not_activated.as_ref().unwrap_or(&self.values)
    }

    /// Assigns the values directly, clearing any previous pre-activation state.
    pub fn assign_values(&mut self, values: DenseArray) -> Result<()> {
        check_shape("AugmentedArray::assign_values", self.values.dim(), values.dim())?;
        self.values = values;
        self.not_activated = None;
        Ok(())
    }

    /// Assigns the pre-activation values `z` and sets `values = f(z)`.
    pub fn assign_and_activate(&mut self, z: DenseArray) -> Result<()> {
        check_shape("AugmentedArray::assign_and_activate", self.values.dim(), z.dim())?;
        match self.activation {
            Some(f) => {
                self.values = f.f(&z);
                self.not_activated = Some(z);
            }
            None => {
                self.values = z;
                self.not_activated = None;
            }
        }
        Ok(())
    }

    pub fn assign_errors(&mut self, errors: DenseArray) -> Result<()> {
        check_shape("AugmentedArray::assign_errors", self.values.dim(), errors.dim())?;
        self.errors = Some(errors);
        self.errors_pre_activation = false;
        Ok(())
    }

    /// Assigns errors that are already taken with respect to the values before
    /// the activation (e.g. the `y - g` errors of a softmax cross-entropy).
    pub fn assign_pre_activation_errors(&mut self, errors: DenseArray) -> Result<()> {
        self.assign_errors(errors)?;
        self.errors_pre_activation = true;
        Ok(())
    }

    pub fn errors(&self) -> Result<&DenseArray> {
        self.errors.as_ref().ok_or(DnnError::MissingErrors("AugmentedArray"))
    }

    pub fn has_errors(&self) -> bool {
        self.errors.is_some()
    }

    /// Derivative of the activation evaluated at the stored values.
    ///
    /// Returns ones when there is no activation.
    pub fn calculate_activation_deriv(&self) -> Result<DenseArray> {
        match self.activation {
            Some(f) => f.df_from_output(self.not_activated(), &self.values),
            None => Ok(DenseArray::ones(self.values.dim())),
        }
    }

    /// Errors with respect to the pre-activation values.
    pub fn errors_not_activated(&self) -> Result<DenseArray> {
        let gy = self.errors()?;
        match self.activation {
            Some(f) if !self.errors_pre_activation => f.backward(self.not_activated(), &self.values, gy),
            _ => Ok(gy.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arrays::column;

    #[test]
    fn test_activate_and_errors() {
        let mut a = AugmentedArray::new(2).with_activation(Some(ActivationFunction::Tanh));
        a.assign_and_activate(column(&[0.5, -0.5])).unwrap();
        assert!((a.values()[[0, 0]] - 0.5f64.tanh()).abs() < 1e-12);
        assert_eq!(a.not_activated(), &column(&[0.5, -0.5]));

        assert!(matches!(a.errors(), Err(DnnError::MissingErrors(_))));
        a.assign_errors(column(&[1.0, 2.0])).unwrap();
        let gz = a.errors_not_activated().unwrap();
        let expected = 1.0 - 0.5f64.tanh().powi(2);
        assert!((gz[[0, 0]] - expected).abs() < 1e-12);
        assert!((gz[[1, 0]] - 2.0 * expected).abs() < 1e-12);
    }

    #[test]
    fn test_pre_activation_errors_skip_the_activation() {
        let mut a = AugmentedArray::new(2).with_activation(Some(ActivationFunction::Softmax));
        a.assign_and_activate(column(&[1.0, 2.0])).unwrap();
        a.assign_pre_activation_errors(column(&[0.3, -0.3])).unwrap();
        assert_eq!(a.errors_not_activated().unwrap(), column(&[0.3, -0.3]));
    }

    #[test]
    fn test_wrong_shape_is_rejected() {
        let mut a = AugmentedArray::new(3);
        assert!(a.assign_values(column(&[1.0])).is_err());
        assert!(a.assign_errors(DenseArray::zeros((3, 2))).is_err());
    }

    #[test]
    fn test_no_activation_derivative_is_one() {
        let mut a = AugmentedArray::new(2);
        a.assign_and_activate(column(&[3.0, 4.0])).unwrap();
        assert_eq!(a.calculate_activation_deriv().unwrap(), DenseArray::ones((2, 1)));
    }
}
