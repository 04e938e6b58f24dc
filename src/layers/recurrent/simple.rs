//! Simple (Elman) recurrent layer: `h_t = f(W x_t + W_r h_{t-1} + b)`.

use super::{check_sequence_errors, GateGradients, GateParameters};
use crate::arrays::{AugmentedArray, DenseArray, ParamsArray, ParamsErrors};
use crate::error::Result;
use crate::functions::ActivationFunction;
use crate::initializers::Initializer;
use crate::layers::LayerErrors;

#[derive(Debug, Clone)]
pub struct SimpleRecurrentParameters {
    pub gate: GateParameters,
}

impl SimpleRecurrentParameters {
    pub fn new(
        input_size: usize,
        output_size: usize,
        weights_init: Option<&dyn Initializer>,
        bias_init: Option<&dyn Initializer>,
    ) -> Self {
        Self {
            gate: GateParameters::new(input_size, output_size, output_size, weights_init, bias_init),
        }
    }

    pub fn output_size(&self) -> usize {
        self.gate.output_size()
    }

    pub fn params(&self) -> Vec<&ParamsArray> {
        self.gate.params()
    }

    pub fn params_mut(&mut self) -> Vec<&mut ParamsArray> {
        self.gate.params_mut()
    }
}

#[derive(Debug, Clone)]
struct Step {
    x: DenseArray,
    h_prev: DenseArray,
    output: AugmentedArray,
}

#[derive(Debug, Clone)]
pub struct SimpleRecurrentLayer {
    size: usize,
    activation: Option<ActivationFunction>,
    steps: Vec<Step>,
}

impl SimpleRecurrentLayer {
    pub fn new(size: usize, activation: Option<ActivationFunction>) -> Self {
        Self {
            size,
            activation,
            steps: Vec::new(),
        }
    }

    pub fn forward_sequence(&mut self, params: &SimpleRecurrentParameters, xs: Vec<DenseArray>) -> Result<Vec<DenseArray>> {
        self.steps.clear();
        let mut h_prev = DenseArray::zeros((self.size, 1));
        for x in xs {
            let mut output = AugmentedArray::new(self.size).with_activation(self.activation);
            output.assign_and_activate(params.gate.z(&x, &h_prev)?)?;
            let h = output.values().clone();
            self.steps.push(Step { x, h_prev, output });
            h_prev = h;
        }
        Ok(self.steps.iter().map(|s| s.output.values().clone()).collect())
    }

    pub fn backward_sequence(
        &mut self,
        params: &SimpleRecurrentParameters,
        output_errors: &[DenseArray],
        propagate_to_input: bool,
    ) -> Result<LayerErrors> {
        check_sequence_errors("SimpleRecurrentLayer", self.steps.len(), output_errors)?;
        let gate = &params.gate;
        let mut grads = GateGradients::zeros(gate);
        let mut input_errors = Vec::with_capacity(self.steps.len());
        let mut gh_next = DenseArray::zeros((self.size, 1));

        for (step, gy) in self.steps.iter_mut().zip(output_errors).rev() {
            step.output.assign_errors(gy + &gh_next)?;
            let gz = step.output.errors_not_activated()?;
            grads.add(&gz, &step.x, &step.h_prev);
            if propagate_to_input {
                input_errors.push(gate.w.values.t().dot(&gz));
            }
            gh_next = gate.u.values.t().dot(&gz);
        }
        input_errors.reverse();

        let mut params_errors = ParamsErrors::new();
        grads.push_to(gate, &mut params_errors);
        Ok(LayerErrors {
            inputs: input_errors,
            params: params_errors,
        })
    }
}
