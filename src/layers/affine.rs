//! Affine layer over several inputs: `y = f(Σ_i W_i x_i + b)`.

use super::LayerErrors;
use crate::arrays::{check_shape, outer, AugmentedArray, DenseArray, ParamsArray, ParamsErrors};
use crate::error::{DnnError, Result};
use crate::functions::ActivationFunction;
use crate::initializers::Initializer;

#[derive(Debug, Clone)]
pub struct AffineParameters {
    /// One `output x input_i` matrix per input.
    pub w: Vec<ParamsArray>,
    pub b: ParamsArray,
}

impl AffineParameters {
    pub fn new(
        input_sizes: &[usize],
        output_size: usize,
        weights_init: Option<&dyn Initializer>,
        bias_init: Option<&dyn Initializer>,
    ) -> Self {
        Self {
            w: input_sizes
                .iter()
                .map(|&size| ParamsArray::initialized((output_size, size), weights_init))
                .collect(),
            b: ParamsArray::initialized((output_size, 1), bias_init),
        }
    }

    pub fn output_size(&self) -> usize {
        self.b.shape().0
    }

    pub fn params(&self) -> Vec<&ParamsArray> {
        self.w.iter().chain(std::iter::once(&self.b)).collect()
    }

    pub fn params_mut(&mut self) -> Vec<&mut ParamsArray> {
        self.w.iter_mut().chain(std::iter::once(&mut self.b)).collect()
    }
}

#[derive(Debug, Clone)]
pub struct AffineLayer {
    inputs: Vec<DenseArray>,
    output: AugmentedArray,
}

impl AffineLayer {
    pub fn new(output_size: usize, activation: Option<ActivationFunction>) -> Self {
        Self {
            inputs: Vec::new(),
            output: AugmentedArray::new(output_size).with_activation(activation),
        }
    }

    pub fn output(&self) -> &AugmentedArray {
        &self.output
    }

    pub fn output_mut(&mut self) -> &mut AugmentedArray {
        &mut self.output
    }

    pub fn forward(&mut self, params: &AffineParameters, inputs: Vec<DenseArray>) -> Result<&DenseArray> {
        if inputs.len() != params.w.len() {
            return Err(DnnError::InvalidConfiguration(format!(
                "affine layer expects {} inputs, got {}",
                params.w.len(),
                inputs.len()
            )));
        }
        let mut z = params.b.values.clone();
        for (w, x) in params.w.iter().zip(&inputs) {
            check_shape("Affine input", (w.shape().1, 1), x.dim())?;
            z += &w.values.dot(x);
        }
        self.output.assign_and_activate(z)?;
        self.inputs = inputs;
        Ok(self.output.values())
    }

    pub fn backward(&mut self, params: &AffineParameters, propagate_to_input: bool) -> Result<LayerErrors> {
        if self.inputs.is_empty() {
            return Err(DnnError::MissingValues("AffineLayer inputs"));
        }
        let gz = self.output.errors_not_activated()?;

        let mut params_errors = ParamsErrors::new();
        for (w, x) in params.w.iter().zip(&self.inputs) {
            params_errors.push_dense(w, outer(&gz, x));
        }
        params_errors.push_dense(&params.b, gz.clone());

        let inputs = if propagate_to_input {
            params.w.iter().map(|w| w.values.t().dot(&gz)).collect()
        } else {
            Vec::new()
        };
        Ok(LayerErrors {
            inputs,
            params: params_errors,
        })
    }
}
