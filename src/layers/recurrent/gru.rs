//! Gated Recurrent Unit layer.
//!
//! ```text
//! p = σ(W_p x + U_p h_prev + b_p)
//! r = σ(W_r x + U_r h_prev + b_r)
//! c = f(W_c x + U_c (r ∘ h_prev) + b_c)
//! h = p ∘ c + (1 - p) ∘ h_prev
//! ```

use super::{check_sequence_errors, GateGradients, GateParameters};
use crate::arrays::{AugmentedArray, DenseArray, ParamsArray, ParamsErrors};
use crate::error::Result;
use crate::functions::ActivationFunction;
use crate::initializers::Initializer;
use crate::layers::LayerErrors;

#[derive(Debug, Clone)]
pub struct GruParameters {
    /// Update gate `p`.
    pub part_gate: GateParameters,
    pub reset_gate: GateParameters,
    pub candidate: GateParameters,
}

impl GruParameters {
    pub fn new(
        input_size: usize,
        output_size: usize,
        weights_init: Option<&dyn Initializer>,
        bias_init: Option<&dyn Initializer>,
    ) -> Self {
        let gate = || GateParameters::new(input_size, output_size, output_size, weights_init, bias_init);
        Self {
            part_gate: gate(),
            reset_gate: gate(),
            candidate: gate(),
        }
    }

    pub fn output_size(&self) -> usize {
        self.candidate.output_size()
    }

    pub fn params(&self) -> Vec<&ParamsArray> {
        let mut params = self.part_gate.params();
        params.extend(self.reset_gate.params());
        params.extend(self.candidate.params());
        params
    }

    pub fn params_mut(&mut self) -> Vec<&mut ParamsArray> {
        let mut params = self.part_gate.params_mut();
        params.extend(self.reset_gate.params_mut());
        params.extend(self.candidate.params_mut());
        params
    }
}

#[derive(Debug, Clone)]
struct Step {
    x: DenseArray,
    h_prev: DenseArray,
    part_gate: AugmentedArray,
    reset_gate: AugmentedArray,
    candidate: AugmentedArray,
    h: DenseArray,
}

#[derive(Debug, Clone)]
pub struct GruLayer {
    size: usize,
    activation: Option<ActivationFunction>,
    steps: Vec<Step>,
}

impl GruLayer {
    pub fn new(size: usize, activation: Option<ActivationFunction>) -> Self {
        Self {
            size,
            activation,
            steps: Vec::new(),
        }
    }

    pub fn forward_sequence(&mut self, params: &GruParameters, xs: Vec<DenseArray>) -> Result<Vec<DenseArray>> {
        self.steps.clear();
        let mut h_prev = DenseArray::zeros((self.size, 1));

        for x in xs {
            let mut part_gate = AugmentedArray::new(self.size).with_activation(Some(ActivationFunction::Sigmoid));
            let mut reset_gate = AugmentedArray::new(self.size).with_activation(Some(ActivationFunction::Sigmoid));
            let mut candidate = AugmentedArray::new(self.size).with_activation(self.activation);
            part_gate.assign_and_activate(params.part_gate.z(&x, &h_prev)?)?;
            reset_gate.assign_and_activate(params.reset_gate.z(&x, &h_prev)?)?;
            let rh = reset_gate.values() * &h_prev;
            candidate.assign_and_activate(params.candidate.z(&x, &rh)?)?;

            let p = part_gate.values();
            let h = p * candidate.values() + (1.0 - p) * &h_prev;

            self.steps.push(Step {
                x,
                h_prev,
                part_gate,
                reset_gate,
                candidate,
                h: h.clone(),
            });
            h_prev = h;
        }
        Ok(self.steps.iter().map(|s| s.h.clone()).collect())
    }

    pub fn backward_sequence(
        &mut self,
        params: &GruParameters,
        output_errors: &[DenseArray],
        propagate_to_input: bool,
    ) -> Result<LayerErrors> {
        check_sequence_errors("GruLayer", self.steps.len(), output_errors)?;
        let mut grads_p = GateGradients::zeros(&params.part_gate);
        let mut grads_r = GateGradients::zeros(&params.reset_gate);
        let mut grads_c = GateGradients::zeros(&params.candidate);

        let mut input_errors = Vec::with_capacity(self.steps.len());
        let mut gh_next = DenseArray::zeros((self.size, 1));

        for (step, gy) in self.steps.iter_mut().zip(output_errors).rev() {
            let gh = gy + &gh_next;
            let p = step.part_gate.values().clone();
            let r = step.reset_gate.values().clone();

            step.part_gate
                .assign_errors(&gh * &(step.candidate.values() - &step.h_prev))?;
            step.candidate.assign_errors(&gh * &p)?;
            let gz_c = step.candidate.errors_not_activated()?;

            // errors of r ∘ h_prev
            let g_rh = params.candidate.u.values.t().dot(&gz_c);
            step.reset_gate.assign_errors(&g_rh * &step.h_prev)?;

            let gz_p = step.part_gate.errors_not_activated()?;
            let gz_r = step.reset_gate.errors_not_activated()?;

            grads_p.add(&gz_p, &step.x, &step.h_prev);
            grads_r.add(&gz_r, &step.x, &step.h_prev);
            grads_c.add(&gz_c, &step.x, &(&r * &step.h_prev));

            if propagate_to_input {
                let gx = params.part_gate.w.values.t().dot(&gz_p)
                    + params.reset_gate.w.values.t().dot(&gz_r)
                    + params.candidate.w.values.t().dot(&gz_c);
                input_errors.push(gx);
            }
            gh_next = &gh * &(1.0 - &p)
                + &g_rh * &r
                + params.part_gate.u.values.t().dot(&gz_p)
                + params.reset_gate.u.values.t().dot(&gz_r);
        }
        input_errors.reverse();

        let mut params_errors = ParamsErrors::new();
        grads_p.push_to(&params.part_gate, &mut params_errors);
        grads_r.push_to(&params.reset_gate, &mut params_errors);
        grads_c.push_to(&params.candidate, &mut params_errors);
        Ok(LayerErrors {
            inputs: input_errors,
            params: params_errors,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arrays::column;
    use crate::initializers::ConstantInitializer;

    #[test]
    fn test_closed_update_gate_keeps_the_state() {
        let mut p = GruParameters::new(1, 1, Some(&ConstantInitializer(0.5)), None);
        let mut layer = GruLayer::new(1, Some(ActivationFunction::Tanh));
        let first = layer.forward_sequence(&p, vec![column(&[1.0])]).unwrap();

        p.part_gate.b.values.fill(-50.0);
        let h = layer
            .forward_sequence(&p, vec![column(&[1.0]), column(&[-4.0])])
            .unwrap();
        // p ≈ 0: h stays at the initial zero state
        assert!(h.iter().all(|h| h[[0, 0]].abs() < 1e-9));
        assert!(first[0][[0, 0]] > 0.0);
    }
}
