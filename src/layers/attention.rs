//! Attention over a sequence of column vectors.
//!
//! `AttentionLayer` pools a sequence into one vector weighted by learned
//! scores; `ScaledDotAttentionLayer` is self-attention, one output per step.

use super::LayerErrors;
use crate::arrays::{check_shape, outer, AugmentedArray, DenseArray, ParamsArray, ParamsErrors};
use crate::error::{DnnError, Result};
use crate::functions::ActivationFunction;
use crate::initializers::Initializer;
use ndarray::{concatenate, ArrayView2, Axis};

#[derive(Debug, Clone)]
pub struct AttentionParameters {
    /// `attention x input`
    pub w: ParamsArray,
    /// `attention x 1`
    pub b: ParamsArray,
    /// Context vector, `attention x 1`.
    pub u: ParamsArray,
}

impl AttentionParameters {
    pub fn new(
        input_size: usize,
        attention_size: usize,
        weights_init: Option<&dyn Initializer>,
        bias_init: Option<&dyn Initializer>,
    ) -> Self {
        Self {
            w: ParamsArray::initialized((attention_size, input_size), weights_init),
            b: ParamsArray::initialized((attention_size, 1), bias_init),
            u: ParamsArray::initialized((attention_size, 1), weights_init),
        }
    }

    pub fn input_size(&self) -> usize {
        self.w.shape().1
    }

    pub fn params(&self) -> Vec<&ParamsArray> {
        vec![&self.w, &self.b, &self.u]
    }

    pub fn params_mut(&mut self) -> Vec<&mut ParamsArray> {
        vec![&mut self.w, &mut self.b, &mut self.u]
    }
}

/// `a_i = tanh(W x_i + b)`, `s_i = uᵀ a_i`, `α = softmax(s)`, `y = Σ α_i x_i`.
#[derive(Debug, Clone)]
pub struct AttentionLayer {
    xs: Vec<DenseArray>,
    /// `a_i` of each step.
    attention: Vec<DenseArray>,
    /// `α`, one row per step.
    scores: DenseArray,
    output: AugmentedArray,
}

impl AttentionLayer {
    pub fn new(input_size: usize) -> Self {
        Self {
            xs: Vec::new(),
            attention: Vec::new(),
            scores: DenseArray::zeros((0, 1)),
            output: AugmentedArray::new(input_size),
        }
    }

    pub fn output(&self) -> &AugmentedArray {
        &self.output
    }

    pub fn output_mut(&mut self) -> &mut AugmentedArray {
        &mut self.output
    }

    /// The attention weights `α` of the last forward pass.
    pub fn scores(&self) -> &DenseArray {
        &self.scores
    }

    pub fn forward(&mut self, params: &AttentionParameters, xs: Vec<DenseArray>) -> Result<&DenseArray> {
        if xs.is_empty() {
            return Err(DnnError::EmptySequence("AttentionLayer"));
        }
        let size = params.input_size();
        let mut attention = Vec::with_capacity(xs.len());
        let mut s = DenseArray::zeros((xs.len(), 1));
        for (i, x) in xs.iter().enumerate() {
            check_shape("Attention input", (size, 1), x.dim())?;
            let a = (params.w.values.dot(x) + &params.b.values).mapv(f64::tanh);
            s[[i, 0]] = params.u.values.t().dot(&a)[[0, 0]];
            attention.push(a);
        }
        let alpha = ActivationFunction::Softmax.f(&s);
        let y = xs
            .iter()
            .zip(alpha.iter())
            .fold(DenseArray::zeros((size, 1)), |acc, (x, &a)| acc + x * a);

        self.output.assign_values(y)?;
        self.xs = xs;
        self.attention = attention;
        self.scores = alpha;
        Ok(self.output.values())
    }

    /// Returns the errors of every step of the input sequence.
    pub fn backward(&mut self, params: &AttentionParameters, propagate_to_input: bool) -> Result<LayerErrors> {
        if self.xs.is_empty() {
            return Err(DnnError::MissingValues("AttentionLayer inputs"));
        }
        let gy = self.output.errors()?;
        let alpha = &self.scores;

        let mut g_alpha = DenseArray::zeros(alpha.dim());
        for (i, x) in self.xs.iter().enumerate() {
            g_alpha[[i, 0]] = (x * gy).sum();
        }
        let gs = ActivationFunction::Softmax.backward(alpha, alpha, &g_alpha)?;

        let mut gw = DenseArray::zeros(params.w.shape());
        let mut gb = DenseArray::zeros(params.b.shape());
        let mut gu = DenseArray::zeros(params.u.shape());
        let mut inputs = Vec::with_capacity(self.xs.len());
        for (i, (x, a)) in self.xs.iter().zip(&self.attention).enumerate() {
            let g = gs[[i, 0]];
            gu += &(a * g);
            let gz = &params.u.values * g * a.mapv(|v| 1.0 - v * v);
            gw += &outer(&gz, x);
            gb += &gz;
            if propagate_to_input {
                inputs.push(gy * alpha[[i, 0]] + params.w.values.t().dot(&gz));
            }
        }

        let mut params_errors = ParamsErrors::new();
        params_errors.push_dense(&params.w, gw);
        params_errors.push_dense(&params.b, gb);
        params_errors.push_dense(&params.u, gu);
        Ok(LayerErrors {
            inputs,
            params: params_errors,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ScaledDotAttentionParameters {
    pub w_q: ParamsArray,
    pub b_q: ParamsArray,
    pub w_k: ParamsArray,
    pub b_k: ParamsArray,
    pub w_v: ParamsArray,
    pub b_v: ParamsArray,
}

impl ScaledDotAttentionParameters {
    /// Queries and keys have `key_size` rows, values `value_size`.
    pub fn new(
        input_size: usize,
        key_size: usize,
        value_size: usize,
        weights_init: Option<&dyn Initializer>,
        bias_init: Option<&dyn Initializer>,
    ) -> Self {
        Self {
            w_q: ParamsArray::initialized((key_size, input_size), weights_init),
            b_q: ParamsArray::initialized((key_size, 1), bias_init),
            w_k: ParamsArray::initialized((key_size, input_size), weights_init),
            b_k: ParamsArray::initialized((key_size, 1), bias_init),
            w_v: ParamsArray::initialized((value_size, input_size), weights_init),
            b_v: ParamsArray::initialized((value_size, 1), bias_init),
        }
    }

    pub fn input_size(&self) -> usize {
        self.w_q.shape().1
    }

    pub fn key_size(&self) -> usize {
        self.w_q.shape().0
    }

    pub fn value_size(&self) -> usize {
        self.w_v.shape().0
    }

    pub fn params(&self) -> Vec<&ParamsArray> {
        vec![&self.w_q, &self.b_q, &self.w_k, &self.b_k, &self.w_v, &self.b_v]
    }

    pub fn params_mut(&mut self) -> Vec<&mut ParamsArray> {
        vec![
            &mut self.w_q,
            &mut self.b_q,
            &mut self.w_k,
            &mut self.b_k,
            &mut self.w_v,
            &mut self.b_v,
        ]
    }
}

/// Self-attention: `A = softmax_row(Q Kᵀ / sqrt(d))`, `y_i = Σ_j A_ij v_j`.
///
/// Steps are stored as the columns of `key_size x n` (and `value_size x n`)
/// matrices.
#[derive(Debug, Clone, Default)]
pub struct ScaledDotAttentionLayer {
    x: Option<DenseArray>,
    q: DenseArray,
    k: DenseArray,
    v: DenseArray,
    attention: DenseArray,
    outputs: Vec<AugmentedArray>,
}

impl ScaledDotAttentionLayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn outputs(&self) -> &[AugmentedArray] {
        &self.outputs
    }

    /// Assigns the errors of the output of `step`.
    pub fn assign_errors(&mut self, step: usize, errors: DenseArray) -> Result<()> {
        let steps = self.outputs.len();
        self.outputs
            .get_mut(step)
            .ok_or(DnnError::IndexOutOfBounds(step, 0, (steps, 1)))?
            .assign_errors(errors)
    }

    /// `n x n` attention matrix of the last forward pass: row `i` weighs the
    /// values used by output `i`.
    pub fn attention(&self) -> &DenseArray {
        &self.attention
    }

    pub fn forward(&mut self, params: &ScaledDotAttentionParameters, xs: Vec<DenseArray>) -> Result<Vec<DenseArray>> {
        if xs.is_empty() {
            return Err(DnnError::EmptySequence("ScaledDotAttentionLayer"));
        }
        for x in &xs {
            check_shape("ScaledDotAttention input", (params.input_size(), 1), x.dim())?;
        }
        let x = columns(&xs)?;
        let q = affine_columns(&params.w_q, &params.b_q, &x);
        let k = affine_columns(&params.w_k, &params.b_k, &x);
        let v = affine_columns(&params.w_v, &params.b_v, &x);

        let scale = (params.key_size() as f64).sqrt();
        let s = q.t().dot(&k) / scale;
        // softmax of each row
        let attention = ActivationFunction::Softmax.f(&s.t().to_owned()).reversed_axes();
        let y = v.dot(&attention.t());

        self.outputs = y
            .columns()
            .into_iter()
            .map(|c| AugmentedArray::from_values(c.to_owned().insert_axis(Axis(1))))
            .collect();
        self.x = Some(x);
        self.q = q;
        self.k = k;
        self.v = v;
        self.attention = attention;
        Ok(self.outputs.iter().map(|o| o.values().clone()).collect())
    }

    /// The errors of every output must be assigned with `assign_errors` first.
    pub fn backward(&mut self, params: &ScaledDotAttentionParameters, propagate_to_input: bool) -> Result<LayerErrors> {
        let x = self.x.as_ref().ok_or(DnnError::MissingValues("ScaledDotAttentionLayer inputs"))?;
        let gys = self.outputs.iter().map(|o| o.errors()).collect::<Result<Vec<_>>>()?;
        let gy = columns_ref(&gys)?;

        let a = &self.attention;
        let g_a = gy.t().dot(&self.v);
        let gv = gy.dot(a);
        let a_t = a.t().to_owned();
        let gs = ActivationFunction::Softmax
            .backward(&a_t, &a_t, &g_a.t().to_owned())?
            .reversed_axes();

        let scale = (params.key_size() as f64).sqrt();
        let gq = self.k.dot(&gs.t()) / scale;
        let gk = self.q.dot(&gs) / scale;

        let mut params_errors = ParamsErrors::new();
        for (w, b, g) in [
            (&params.w_q, &params.b_q, &gq),
            (&params.w_k, &params.b_k, &gk),
            (&params.w_v, &params.b_v, &gv),
        ] {
            params_errors.push_dense(w, g.dot(&x.t()));
            params_errors.push_dense(b, g.sum_axis(Axis(1)).insert_axis(Axis(1)));
        }

        let inputs = if propagate_to_input {
            let gx = params.w_q.values.t().dot(&gq) + params.w_k.values.t().dot(&gk) + params.w_v.values.t().dot(&gv);
            gx.columns()
                .into_iter()
                .map(|c| c.to_owned().insert_axis(Axis(1)))
                .collect()
        } else {
            Vec::new()
        };
        Ok(LayerErrors {
            inputs,
            params: params_errors,
        })
    }
}

/// `W X + b`, adding `b` to every column.
fn affine_columns(w: &ParamsArray, b: &ParamsArray, x: &DenseArray) -> DenseArray {
    let mut z = w.values.dot(x);
    for mut col in z.columns_mut() {
        col += &b.values.column(0);
    }
    z
}

fn columns(xs: &[DenseArray]) -> Result<DenseArray> {
    columns_ref(&xs.iter().collect::<Vec<_>>())
}

/// Joins column vectors side by side.
fn columns_ref(xs: &[&DenseArray]) -> Result<DenseArray> {
    let views: Vec<ArrayView2<f64>> = xs.iter().map(|x| x.view()).collect();
    concatenate(Axis(1), &views).map_err(|_| DnnError::ShapeMismatch {
        op: "attention columns",
        expected: (xs.first().map(|x| x.nrows()).unwrap_or(0), xs.len()),
        actual: (0, 0),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arrays::column;
    use ndarray::array;

    #[test]
    fn test_uniform_scores_average_the_inputs() {
        // u = 0 gives equal scores
        let params = AttentionParameters::new(2, 3, None, None);
        let mut layer = AttentionLayer::new(2);
        let y = layer
            .forward(&params, vec![column(&[1.0, 0.0]), column(&[0.0, 1.0]), column(&[2.0, 2.0])])
            .unwrap()
            .clone();
        assert!((y[[0, 0]] - 1.0).abs() < 1e-12);
        assert!((y[[1, 0]] - 1.0).abs() < 1e-12);
        assert!(layer.scores().iter().all(|&a| (a - 1.0 / 3.0).abs() < 1e-12));
    }

    #[test]
    fn test_scores_follow_the_context_vector() {
        let mut params = AttentionParameters::new(1, 1, None, None);
        params.w.values = array![[1.0]];
        params.u.values = array![[5.0]];
        let mut layer = AttentionLayer::new(1);
        layer.forward(&params, vec![column(&[-1.0]), column(&[1.0])]).unwrap();
        assert!(layer.scores()[[1, 0]] > 0.99);
    }

    #[test]
    fn test_empty_sequence() {
        let params = AttentionParameters::new(2, 2, None, None);
        assert!(matches!(
            AttentionLayer::new(2).forward(&params, Vec::new()),
            Err(DnnError::EmptySequence(_))
        ));
        let params = ScaledDotAttentionParameters::new(2, 2, 2, None, None);
        assert!(matches!(
            ScaledDotAttentionLayer::new().forward(&params, Vec::new()),
            Err(DnnError::EmptySequence(_))
        ));
    }

    #[test]
    fn test_self_attention_rows_sum_to_one() {
        let mut params = ScaledDotAttentionParameters::new(2, 2, 2, None, None);
        params.w_q.values = array![[1.0, 0.0], [0.0, 1.0]];
        params.w_k.values = array![[1.0, 0.0], [0.0, 1.0]];
        params.w_v.values = array![[1.0, 0.0], [0.0, 1.0]];
        let mut layer = ScaledDotAttentionLayer::new();
        let ys = layer
            .forward(&params, vec![column(&[1.0, 0.0]), column(&[0.0, 1.0]), column(&[1.0, 1.0])])
            .unwrap();
        assert_eq!(ys.len(), 3);
        for row in layer.attention().rows() {
            assert!((row.sum() - 1.0).abs() < 1e-12);
        }
        // each output is a convex combination of the values
        for y in &ys {
            assert!(y.iter().all(|&v| (0.0..=1.0).contains(&v)));
        }
    }

    #[test]
    fn test_backward_requires_output_errors() {
        let params = ScaledDotAttentionParameters::new(2, 2, 2, None, None);
        let mut layer = ScaledDotAttentionLayer::new();
        layer.forward(&params, vec![column(&[1.0, 0.0])]).unwrap();
        assert!(matches!(layer.backward(&params, true), Err(DnnError::MissingErrors(_))));
    }
}
