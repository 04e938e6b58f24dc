//! Tensor Product Representation layer.
//!
//! At each step the layer attends over a set of symbol embeddings and a set of
//! role embeddings, and binds the two results with an outer product:
//!
//! ```text
//! aS = σ(W_S x + U_S y_prev + b_S)     symbol attention (n_symbols)
//! aR = σ(W_R x + U_R y_prev + b_R)     role attention (n_roles)
//! s  = S aS                            (d_symbols)
//! r  = R aR                            (d_roles)
//! y  = vec(s rᵀ)                       row-major, d_symbols · d_roles
//! ```
//!
//! The output has no activation.

use super::{check_sequence_errors, GateGradients, GateParameters};
use crate::arrays::{outer, unvectorize, vectorize, AugmentedArray, DenseArray, ParamsArray, ParamsErrors};
use crate::error::Result;
use crate::functions::ActivationFunction;
use crate::initializers::Initializer;
use crate::layers::{LayerErrors, TprDimensions};

#[derive(Debug, Clone)]
pub struct TprParameters {
    pub dims: TprDimensions,
    pub symbol_attention: GateParameters,
    pub role_attention: GateParameters,
    /// Symbol embeddings, `d_symbols x n_symbols`.
    pub s: ParamsArray,
    /// Role embeddings, `d_roles x n_roles`.
    pub r: ParamsArray,
}

impl TprParameters {
    pub fn new(
        input_size: usize,
        dims: TprDimensions,
        weights_init: Option<&dyn Initializer>,
        bias_init: Option<&dyn Initializer>,
    ) -> Self {
        let output_size = dims.d_symbols * dims.d_roles;
        Self {
            dims,
            symbol_attention: GateParameters::new(input_size, output_size, dims.n_symbols, weights_init, bias_init),
            role_attention: GateParameters::new(input_size, output_size, dims.n_roles, weights_init, bias_init),
            s: ParamsArray::initialized((dims.d_symbols, dims.n_symbols), weights_init),
            r: ParamsArray::initialized((dims.d_roles, dims.n_roles), weights_init),
        }
    }

    pub fn output_size(&self) -> usize {
        self.dims.d_symbols * self.dims.d_roles
    }

    pub fn params(&self) -> Vec<&ParamsArray> {
        let mut params = self.symbol_attention.params();
        params.extend(self.role_attention.params());
        params.push(&self.s);
        params.push(&self.r);
        params
    }

    pub fn params_mut(&mut self) -> Vec<&mut ParamsArray> {
        let mut params = self.symbol_attention.params_mut();
        params.extend(self.role_attention.params_mut());
        params.push(&mut self.s);
        params.push(&mut self.r);
        params
    }
}

#[derive(Debug, Clone)]
struct Step {
    x: DenseArray,
    y_prev: DenseArray,
    symbol_attention: AugmentedArray,
    role_attention: AugmentedArray,
    s: DenseArray,
    r: DenseArray,
    y: DenseArray,
}

#[derive(Debug, Clone)]
pub struct TprLayer {
    size: usize,
    steps: Vec<Step>,
}

impl TprLayer {
    pub fn new(size: usize) -> Self {
        Self {
            size,
            steps: Vec::new(),
        }
    }

    /// Symbol and role attention of each step of the last forward pass.
    pub fn attentions(&self) -> Vec<(DenseArray, DenseArray)> {
        self.steps
            .iter()
            .map(|s| (s.symbol_attention.values().clone(), s.role_attention.values().clone()))
            .collect()
    }

    pub fn forward_sequence(&mut self, params: &TprParameters, xs: Vec<DenseArray>) -> Result<Vec<DenseArray>> {
        self.steps.clear();
        let dims = params.dims;
        let mut y_prev = DenseArray::zeros((self.size, 1));

        for x in xs {
            let mut symbol_attention =
                AugmentedArray::new(dims.n_symbols).with_activation(Some(ActivationFunction::Sigmoid));
            let mut role_attention =
                AugmentedArray::new(dims.n_roles).with_activation(Some(ActivationFunction::Sigmoid));
            symbol_attention.assign_and_activate(params.symbol_attention.z(&x, &y_prev)?)?;
            role_attention.assign_and_activate(params.role_attention.z(&x, &y_prev)?)?;

            let s = params.s.values.dot(symbol_attention.values());
            let r = params.r.values.dot(role_attention.values());
            let y = vectorize(&outer(&s, &r));

            self.steps.push(Step {
                x,
                y_prev,
                symbol_attention,
                role_attention,
                s,
                r,
                y: y.clone(),
            });
            y_prev = y;
        }
        Ok(self.steps.iter().map(|s| s.y.clone()).collect())
    }

    pub fn backward_sequence(
        &mut self,
        params: &TprParameters,
        output_errors: &[DenseArray],
        propagate_to_input: bool,
    ) -> Result<LayerErrors> {
        check_sequence_errors("TprLayer", self.steps.len(), output_errors)?;
        let dims = params.dims;
        let mut grads_s_att = GateGradients::zeros(&params.symbol_attention);
        let mut grads_r_att = GateGradients::zeros(&params.role_attention);
        let mut grad_s = DenseArray::zeros(params.s.shape());
        let mut grad_r = DenseArray::zeros(params.r.shape());

        let mut input_errors = Vec::with_capacity(self.steps.len());
        let mut gy_next = DenseArray::zeros((self.size, 1));

        for (step, gy) in self.steps.iter_mut().zip(output_errors).rev() {
            let gb = unvectorize(&(gy + &gy_next), dims.d_symbols, dims.d_roles)?;
            let gs = gb.dot(&step.r);
            let gr = gb.t().dot(&step.s);

            grad_s += &outer(&gs, step.symbol_attention.values());
            grad_r += &outer(&gr, step.role_attention.values());

            step.symbol_attention.assign_errors(params.s.values.t().dot(&gs))?;
            step.role_attention.assign_errors(params.r.values.t().dot(&gr))?;
            let gz_s = step.symbol_attention.errors_not_activated()?;
            let gz_r = step.role_attention.errors_not_activated()?;

            grads_s_att.add(&gz_s, &step.x, &step.y_prev);
            grads_r_att.add(&gz_r, &step.x, &step.y_prev);

            if propagate_to_input {
                input_errors.push(
                    params.symbol_attention.w.values.t().dot(&gz_s)
                        + params.role_attention.w.values.t().dot(&gz_r),
                );
            }
            gy_next = params.symbol_attention.u.values.t().dot(&gz_s)
                + params.role_attention.u.values.t().dot(&gz_r);
        }
        input_errors.reverse();

        let mut params_errors = ParamsErrors::new();
        grads_s_att.push_to(&params.symbol_attention, &mut params_errors);
        grads_r_att.push_to(&params.role_attention, &mut params_errors);
        params_errors.push_dense(&params.s, grad_s);
        params_errors.push_dense(&params.r, grad_r);
        Ok(LayerErrors {
            inputs: input_errors,
            params: params_errors,
        })
    }
}
