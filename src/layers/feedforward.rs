//! Fully connected layer: `y = f(W x + b)`.

use super::relevance::epsilon_rule;
use super::{LayerErrors, LayerInput};
use crate::arrays::{check_shape, outer, AugmentedArray, DenseArray, Gradient, ParamsArray, ParamsErrors};
use crate::error::{DnnError, Result};
use crate::functions::ActivationFunction;
use crate::initializers::Initializer;

#[derive(Debug, Clone)]
pub struct FeedforwardParameters {
    /// `output x input`
    pub w: ParamsArray,
    /// `output x 1`
    pub b: ParamsArray,
}

impl FeedforwardParameters {
    pub fn new(
        input_size: usize,
        output_size: usize,
        weights_init: Option<&dyn Initializer>,
        bias_init: Option<&dyn Initializer>,
    ) -> Self {
        Self {
            w: ParamsArray::initialized((output_size, input_size), weights_init),
            b: ParamsArray::initialized((output_size, 1), bias_init),
        }
    }

    pub fn input_size(&self) -> usize {
        self.w.shape().1
    }

    pub fn output_size(&self) -> usize {
        self.w.shape().0
    }

    pub fn params(&self) -> Vec<&ParamsArray> {
        vec![&self.w, &self.b]
    }

    pub fn params_mut(&mut self) -> Vec<&mut ParamsArray> {
        vec![&mut self.w, &mut self.b]
    }

    /// `W x + b` for a dense or sparse binary column vector.
    pub(crate) fn affine(&self, x: &LayerInput) -> Result<DenseArray> {
        check_shape("Feedforward input", (self.input_size(), 1), x.shape())?;
        let wx = match x {
            LayerInput::Dense(x) => self.w.values.dot(x),
            LayerInput::SparseBinary(x) => x.dot_left(&self.w.values)?,
        };
        Ok(wx + &self.b.values)
    }

    /// Parameter errors of `W x + b` given the errors `gz` of the result. A sparse
    /// binary input gives a sparse weights gradient.
    pub(crate) fn affine_params_errors(&self, x: &LayerInput, gz: &DenseArray) -> Result<ParamsErrors> {
        let gw = match x {
            LayerInput::Dense(x) => Gradient::Dense(outer(gz, x)),
            LayerInput::SparseBinary(x) => Gradient::Sparse(x.outer_left(gz)?),
        };
        let mut errors = ParamsErrors::new();
        errors.push(&self.w, gw);
        errors.push_dense(&self.b, gz.clone());
        Ok(errors)
    }
}

#[derive(Debug, Clone)]
pub struct FeedforwardLayer {
    input: Option<LayerInput>,
    output: AugmentedArray,
}

impl FeedforwardLayer {
    pub fn new(output_size: usize, activation: Option<ActivationFunction>) -> Self {
        Self {
            input: None,
            output: AugmentedArray::new(output_size).with_activation(activation),
        }
    }

    pub fn output(&self) -> &AugmentedArray {
        &self.output
    }

    pub fn output_mut(&mut self) -> &mut AugmentedArray {
        &mut self.output
    }

    pub fn forward(&mut self, params: &FeedforwardParameters, input: LayerInput) -> Result<&DenseArray> {
        let z = params.affine(&input)?;
        self.output.assign_and_activate(z)?;
        self.input = Some(input);
        Ok(self.output.values())
    }

    /// Requires the output errors to be assigned.
    pub fn backward(&mut self, params: &FeedforwardParameters, propagate_to_input: bool) -> Result<LayerErrors> {
        let x = self.input.as_ref().ok_or(DnnError::MissingValues("FeedforwardLayer input"))?;
        let gz = self.output.errors_not_activated()?;
        let params_errors = params.affine_params_errors(x, &gz)?;

        let inputs = if propagate_to_input {
            vec![params.w.values.t().dot(&gz)]
        } else {
            Vec::new()
        };
        Ok(LayerErrors {
            inputs,
            params: params_errors,
        })
    }

    /// Distributes `relevance` (one value per output unit) over the input units
    /// with the epsilon rule.
    pub fn propagate_relevance(
        &self,
        params: &FeedforwardParameters,
        relevance: &DenseArray,
        epsilon: f64,
    ) -> Result<DenseArray> {
        let x = self.input.as_ref().ok_or(DnnError::MissingValues("FeedforwardLayer input"))?;
        epsilon_rule(&x.to_dense(), &params.w.values, self.output.not_activated(), relevance, epsilon)
    }
}
