//! Highway layer.
//!
//! ```text
//! c = f(W_c x + b_c)
//! t = σ(W_t x + b_t)
//! y = t ∘ c + (1 - t) ∘ x
//! ```
//!
//! The activation of the layer applies to the candidate `c`. The output size
//! equals the input size.

use super::LayerErrors;
use crate::arrays::{check_shape, outer, AugmentedArray, DenseArray, ParamsArray, ParamsErrors};
use crate::error::{DnnError, Result};
use crate::functions::ActivationFunction;
use crate::initializers::Initializer;

#[derive(Debug, Clone)]
pub struct HighwayParameters {
    pub w_c: ParamsArray,
    pub b_c: ParamsArray,
    pub w_t: ParamsArray,
    pub b_t: ParamsArray,
}

impl HighwayParameters {
    pub fn new(size: usize, weights_init: Option<&dyn Initializer>, bias_init: Option<&dyn Initializer>) -> Self {
        Self {
            w_c: ParamsArray::initialized((size, size), weights_init),
            b_c: ParamsArray::initialized((size, 1), bias_init),
            w_t: ParamsArray::initialized((size, size), weights_init),
            b_t: ParamsArray::initialized((size, 1), bias_init),
        }
    }

    pub fn size(&self) -> usize {
        self.w_c.shape().0
    }

    pub fn params(&self) -> Vec<&ParamsArray> {
        vec![&self.w_c, &self.b_c, &self.w_t, &self.b_t]
    }

    pub fn params_mut(&mut self) -> Vec<&mut ParamsArray> {
        vec![&mut self.w_c, &mut self.b_c, &mut self.w_t, &mut self.b_t]
    }
}

#[derive(Debug, Clone)]
pub struct HighwayLayer {
    input: Option<DenseArray>,
    candidate: AugmentedArray,
    transform_gate: AugmentedArray,
    output: AugmentedArray,
}

impl HighwayLayer {
    pub fn new(size: usize, activation: Option<ActivationFunction>) -> Self {
        Self {
            input: None,
            candidate: AugmentedArray::new(size).with_activation(activation),
            transform_gate: AugmentedArray::new(size).with_activation(Some(ActivationFunction::Sigmoid)),
            output: AugmentedArray::new(size),
        }
    }

    pub fn output(&self) -> &AugmentedArray {
        &self.output
    }

    pub fn output_mut(&mut self) -> &mut AugmentedArray {
        &mut self.output
    }

    pub fn forward(&mut self, params: &HighwayParameters, x: DenseArray) -> Result<&DenseArray> {
        check_shape("Highway input", (params.size(), 1), x.dim())?;

        self.candidate
            .assign_and_activate(params.w_c.values.dot(&x) + &params.b_c.values)?;
        self.transform_gate
            .assign_and_activate(params.w_t.values.dot(&x) + &params.b_t.values)?;

        let t = self.transform_gate.values();
        let y = t * self.candidate.values() + &((1.0 - t) * &x);
        self.output.assign_values(y)?;
        self.input = Some(x);
        Ok(self.output.values())
    }

    pub fn backward(&mut self, params: &HighwayParameters, propagate_to_input: bool) -> Result<LayerErrors> {
        let x = self.input.as_ref().ok_or(DnnError::MissingValues("HighwayLayer input"))?;
        let gy = self.output.errors()?.clone();
        let t = self.transform_gate.values().clone();

        self.candidate.assign_errors(&gy * &t)?;
        self.transform_gate
            .assign_errors(&gy * &(self.candidate.values() - x))?;
        let gzc = self.candidate.errors_not_activated()?;
        let gzt = self.transform_gate.errors_not_activated()?;

        let mut params_errors = ParamsErrors::new();
        params_errors.push_dense(&params.w_c, outer(&gzc, x));
        params_errors.push_dense(&params.b_c, gzc.clone());
        params_errors.push_dense(&params.w_t, outer(&gzt, x));
        params_errors.push_dense(&params.b_t, gzt.clone());

        let inputs = if propagate_to_input {
            let gx = &gy * &(1.0 - &t) + params.w_c.values.t().dot(&gzc) + params.w_t.values.t().dot(&gzt);
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
