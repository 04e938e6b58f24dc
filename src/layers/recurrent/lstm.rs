//! Long Short-Term Memory layer.
//!
//! ```text
//! i = σ(W_i x + U_i h_prev + b_i)
//! o = σ(W_o x + U_o h_prev + b_o)
//! f = σ(W_f x + U_f h_prev + b_f)
//! g = act(W_g x + U_g h_prev + b_g)
//! c = i ∘ g + f ∘ c_prev
//! h = o ∘ act(c)
//! ```
//!
//! `act` is the activation of the layer (identity when none is given).

use super::{check_sequence_errors, GateGradients, GateParameters};
use crate::arrays::{AugmentedArray, DenseArray, ParamsArray, ParamsErrors};
use crate::error::Result;
use crate::functions::ActivationFunction;
use crate::initializers::Initializer;
use crate::layers::LayerErrors;

#[derive(Debug, Clone)]
pub struct LstmParameters {
    pub input_gate: GateParameters,
    pub output_gate: GateParameters,
    pub forget_gate: GateParameters,
    pub candidate: GateParameters,
}

impl LstmParameters {
    pub fn new(
        input_size: usize,
        output_size: usize,
        weights_init: Option<&dyn Initializer>,
        bias_init: Option<&dyn Initializer>,
    ) -> Self {
        let gate = || GateParameters::new(input_size, output_size, output_size, weights_init, bias_init);
        Self {
            input_gate: gate(),
            output_gate: gate(),
            forget_gate: gate(),
            candidate: gate(),
        }
    }

    pub fn output_size(&self) -> usize {
        self.candidate.output_size()
    }

    fn gates(&self) -> [&GateParameters; 4] {
        [&self.input_gate, &self.output_gate, &self.forget_gate, &self.candidate]
    }

    pub fn params(&self) -> Vec<&ParamsArray> {
        self.gates().into_iter().flat_map(|g| g.params()).collect()
    }

    pub fn params_mut(&mut self) -> Vec<&mut ParamsArray> {
        let mut params = self.input_gate.params_mut();
        params.extend(self.output_gate.params_mut());
        params.extend(self.forget_gate.params_mut());
        params.extend(self.candidate.params_mut());
        params
    }
}

#[derive(Debug, Clone)]
struct Step {
    x: DenseArray,
    h_prev: DenseArray,
    c_prev: DenseArray,
    input_gate: AugmentedArray,
    output_gate: AugmentedArray,
    forget_gate: AugmentedArray,
    candidate: AugmentedArray,
    /// Cell state `c` as the pre-activation of `act(c)`.
    cell: AugmentedArray,
    h: DenseArray,
}

#[derive(Debug, Clone)]
pub struct LstmLayer {
    size: usize,
    activation: Option<ActivationFunction>,
    steps: Vec<Step>,
}

impl LstmLayer {
    pub fn new(size: usize, activation: Option<ActivationFunction>) -> Self {
        Self {
            size,
            activation,
            steps: Vec::new(),
        }
    }

    /// Cell states of the last forward pass.
    pub fn cells(&self) -> Vec<DenseArray> {
        self.steps.iter().map(|s| s.cell.not_activated().clone()).collect()
    }

    fn gate(&self, activation: ActivationFunction) -> AugmentedArray {
        AugmentedArray::new(self.size).with_activation(Some(activation))
    }

    pub fn forward_sequence(&mut self, params: &LstmParameters, xs: Vec<DenseArray>) -> Result<Vec<DenseArray>> {
        self.steps.clear();
        let mut h_prev = DenseArray::zeros((self.size, 1));
        let mut c_prev = DenseArray::zeros((self.size, 1));

        for x in xs {
            let mut input_gate = self.gate(ActivationFunction::Sigmoid);
            let mut output_gate = self.gate(ActivationFunction::Sigmoid);
            let mut forget_gate = self.gate(ActivationFunction::Sigmoid);
            let mut candidate = AugmentedArray::new(self.size).with_activation(self.activation);
            input_gate.assign_and_activate(params.input_gate.z(&x, &h_prev)?)?;
            output_gate.assign_and_activate(params.output_gate.z(&x, &h_prev)?)?;
            forget_gate.assign_and_activate(params.forget_gate.z(&x, &h_prev)?)?;
            candidate.assign_and_activate(params.candidate.z(&x, &h_prev)?)?;

            let c = input_gate.values() * candidate.values() + forget_gate.values() * &c_prev;
            let mut cell = AugmentedArray::new(self.size).with_activation(self.activation);
            cell.assign_and_activate(c.clone())?;
            let h = output_gate.values() * cell.values();

            self.steps.push(Step {
                x,
                h_prev,
                c_prev,
                input_gate,
                output_gate,
                forget_gate,
                candidate,
                cell,
                h: h.clone(),
            });
            h_prev = h;
            c_prev = c;
        }
        Ok(self.steps.iter().map(|s| s.h.clone()).collect())
    }

    pub fn backward_sequence(
        &mut self,
        params: &LstmParameters,
        output_errors: &[DenseArray],
        propagate_to_input: bool,
    ) -> Result<LayerErrors> {
        check_sequence_errors("LstmLayer", self.steps.len(), output_errors)?;
        let mut grads_i = GateGradients::zeros(&params.input_gate);
        let mut grads_o = GateGradients::zeros(&params.output_gate);
        let mut grads_f = GateGradients::zeros(&params.forget_gate);
        let mut grads_g = GateGradients::zeros(&params.candidate);

        let mut input_errors = Vec::with_capacity(self.steps.len());
        let mut gh_next = DenseArray::zeros((self.size, 1));
        let mut gc_next = DenseArray::zeros((self.size, 1));

        for (step, gy) in self.steps.iter_mut().zip(output_errors).rev() {
            let gh = gy + &gh_next;

            step.output_gate.assign_errors(&gh * step.cell.values())?;
            step.cell.assign_errors(&gh * step.output_gate.values())?;
            let gc = step.cell.errors_not_activated()? + &gc_next;

            step.input_gate.assign_errors(&gc * step.candidate.values())?;
            step.candidate.assign_errors(&gc * step.input_gate.values())?;
            step.forget_gate.assign_errors(&gc * &step.c_prev)?;
            gc_next = &gc * step.forget_gate.values();

            let gz_i = step.input_gate.errors_not_activated()?;
            let gz_o = step.output_gate.errors_not_activated()?;
            let gz_f = step.forget_gate.errors_not_activated()?;
            let gz_g = step.candidate.errors_not_activated()?;

            grads_i.add(&gz_i, &step.x, &step.h_prev);
            grads_o.add(&gz_o, &step.x, &step.h_prev);
            grads_f.add(&gz_f, &step.x, &step.h_prev);
            grads_g.add(&gz_g, &step.x, &step.h_prev);

            let pairs = [
                (&params.input_gate, &gz_i),
                (&params.output_gate, &gz_o),
                (&params.forget_gate, &gz_f),
                (&params.candidate, &gz_g),
            ];
            if propagate_to_input {
                let mut gx = DenseArray::zeros(step.x.dim());
                for (gate, gz) in pairs {
                    gx += &gate.w.values.t().dot(gz);
                }
                input_errors.push(gx);
            }
            let mut gh_prev = DenseArray::zeros((self.size, 1));
            for (gate, gz) in pairs {
                gh_prev += &gate.u.values.t().dot(gz);
            }
            gh_next = gh_prev;
        }
        input_errors.reverse();

        let mut params_errors = ParamsErrors::new();
        grads_i.push_to(&params.input_gate, &mut params_errors);
        grads_o.push_to(&params.output_gate, &mut params_errors);
        grads_f.push_to(&params.forget_gate, &mut params_errors);
        grads_g.push_to(&params.candidate, &mut params_errors);
        Ok(LayerErrors {
            inputs: input_errors,
            params: params_errors,
        })
    }
}
