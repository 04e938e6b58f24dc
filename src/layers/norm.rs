//! Layer normalization over the elements of a column vector.
//!
//! `y = f(g ∘ (x - μ) / sqrt(σ² + ε) + b)`

use super::LayerErrors;
use crate::arrays::{check_shape, AugmentedArray, DenseArray, ParamsArray, ParamsErrors};
use crate::error::{DnnError, Result};
use crate::functions::ActivationFunction;

pub const NORM_EPSILON: f64 = 1e-5;

#[derive(Debug, Clone)]
pub struct NormParameters {
    /// Gain, initialized to ones.
    pub g: ParamsArray,
    /// Bias, initialized to zeros.
    pub b: ParamsArray,
}

impl NormParameters {
    pub fn new(size: usize) -> Self {
        Self {
            g: ParamsArray::from_values(DenseArray::ones((size, 1))),
            b: ParamsArray::zeros((size, 1)),
        }
    }

    pub fn size(&self) -> usize {
        self.g.shape().0
    }

    pub fn params(&self) -> Vec<&ParamsArray> {
        vec![&self.g, &self.b]
    }

    pub fn params_mut(&mut self) -> Vec<&mut ParamsArray> {
        vec![&mut self.g, &mut self.b]
    }
}

#[derive(Debug, Clone)]
pub struct NormLayer {
    /// Normalized input `x̂`.
    normalized: Option<DenseArray>,
    std_dev: f64,
    output: AugmentedArray,
}

impl NormLayer {
    pub fn new(size: usize, activation: Option<ActivationFunction>) -> Self {
        Self {
            normalized: None,
            std_dev: 1.0,
            output: AugmentedArray::new(size).with_activation(activation),
        }
    }

    pub fn output(&self) -> &AugmentedArray {
        &self.output
    }

    pub fn output_mut(&mut self) -> &mut AugmentedArray {
        &mut self.output
    }

    pub fn forward(&mut self, params: &NormParameters, x: DenseArray) -> Result<&DenseArray> {
        check_shape("Norm input", (params.size(), 1), x.dim())?;
        let n = x.len() as f64;
        let mean = x.sum() / n;
        let variance = x.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        self.std_dev = (variance + NORM_EPSILON).sqrt();

        let normalized = x.mapv(|v| (v - mean) / self.std_dev);
        self.output
            .assign_and_activate(&params.g.values * &normalized + &params.b.values)?;
        self.normalized = Some(normalized);
        Ok(self.output.values())
    }

    pub fn backward(&mut self, params: &NormParameters, propagate_to_input: bool) -> Result<LayerErrors> {
        let x_hat = self
            .normalized
            .as_ref()
            .ok_or(DnnError::MissingValues("NormLayer input"))?;
        let gz = self.output.errors_not_activated()?;

        let mut params_errors = ParamsErrors::new();
        params_errors.push_dense(&params.g, &gz * x_hat);
        params_errors.push_dense(&params.b, gz.clone());

        let inputs = if propagate_to_input {
            let n = x_hat.len() as f64;
            let g_hat = &gz * &params.g.values;
            let sum_g = g_hat.sum();
            let sum_gx = (&g_hat * x_hat).sum();
            let k = 1.0 / (n * self.std_dev);
            let gx = (g_hat * n - sum_g - x_hat * sum_gx) * k;
            vec![gx]
        } else {
            Vec::new()
        };
        Ok(LayerErrors {
            inputs,
            params: params_errors,
        })
    }
}
