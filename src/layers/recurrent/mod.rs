//! Recurrent layers.
//!
//! A recurrent layer processes a whole sequence: `forward_sequence` runs the
//! steps left to right keeping the per-step state, `backward_sequence` runs
//! backpropagation through time, sending the recurrent errors of each step
//! into the previous one. The parameter errors are summed over the steps.
//!
//! The state before the first step is a zero vector.

pub mod gru;
pub mod lstm;
pub mod simple;
pub mod tpr;

pub use gru::{GruLayer, GruParameters};
pub use lstm::{LstmLayer, LstmParameters};
pub use simple::{SimpleRecurrentLayer, SimpleRecurrentParameters};
pub use tpr::{TprLayer, TprParameters};

use super::{LayerErrors, LayerParameters};
use crate::arrays::{check_shape, outer, DenseArray, ParamsArray, ParamsErrors};
use crate::error::{DnnError, Result};
use crate::functions::ActivationFunction;
use crate::initializers::Initializer;

/// `W x + U h + b`, the pre-activation shared by every recurrent gate.
#[derive(Debug, Clone)]
pub struct GateParameters {
    /// `output x input`
    pub w: ParamsArray,
    /// `output x recurrent`
    pub u: ParamsArray,
    pub b: ParamsArray,
}

impl GateParameters {
    pub fn new(
        input_size: usize,
        recurrent_size: usize,
        output_size: usize,
        weights_init: Option<&dyn Initializer>,
        bias_init: Option<&dyn Initializer>,
    ) -> Self {
        Self {
            w: ParamsArray::initialized((output_size, input_size), weights_init),
            u: ParamsArray::initialized((output_size, recurrent_size), weights_init),
            b: ParamsArray::initialized((output_size, 1), bias_init),
        }
    }

    pub fn input_size(&self) -> usize {
        self.w.shape().1
    }

    pub fn recurrent_size(&self) -> usize {
        self.u.shape().1
    }

    pub fn output_size(&self) -> usize {
        self.w.shape().0
    }

    pub fn z(&self, x: &DenseArray, h: &DenseArray) -> Result<DenseArray> {
        check_shape("gate input", (self.input_size(), 1), x.dim())?;
        check_shape("gate recurrent input", (self.recurrent_size(), 1), h.dim())?;
        Ok(self.w.values.dot(x) + self.u.values.dot(h) + &self.b.values)
    }

    pub fn params(&self) -> Vec<&ParamsArray> {
        vec![&self.w, &self.u, &self.b]
    }

    pub fn params_mut(&mut self) -> Vec<&mut ParamsArray> {
        vec![&mut self.w, &mut self.u, &mut self.b]
    }
}

/// Gate gradients summed over the steps of a sequence.
#[derive(Debug, Clone)]
pub(crate) struct GateGradients {
    w: DenseArray,
    u: DenseArray,
    b: DenseArray,
}

impl GateGradients {
    pub(crate) fn zeros(gate: &GateParameters) -> Self {
        Self {
            w: DenseArray::zeros(gate.w.shape()),
            u: DenseArray::zeros(gate.u.shape()),
            b: DenseArray::zeros(gate.b.shape()),
        }
    }

    pub(crate) fn add(&mut self, gz: &DenseArray, x: &DenseArray, h: &DenseArray) {
        self.w += &outer(gz, x);
        self.u += &outer(gz, h);
        self.b += gz;
    }

    pub(crate) fn push_to(self, gate: &GateParameters, errors: &mut ParamsErrors) {
        errors.push_dense(&gate.w, self.w);
        errors.push_dense(&gate.u, self.u);
        errors.push_dense(&gate.b, self.b);
    }
}

/// Dispatches over the recurrent layer kinds.
#[derive(Debug, Clone)]
pub enum RecurrentLayer {
    Simple(SimpleRecurrentLayer),
    Lstm(LstmLayer),
    Gru(GruLayer),
    Tpr(TprLayer),
}

impl RecurrentLayer {
    /// Builds the layer that runs the given parameters.
    pub fn new(params: &LayerParameters, activation: Option<ActivationFunction>) -> Result<Self> {
        match params {
            LayerParameters::SimpleRecurrent(p) => {
                Ok(Self::Simple(SimpleRecurrentLayer::new(p.output_size(), activation)))
            }
            LayerParameters::Lstm(p) => Ok(Self::Lstm(LstmLayer::new(p.output_size(), activation))),
            LayerParameters::Gru(p) => Ok(Self::Gru(GruLayer::new(p.output_size(), activation))),
            LayerParameters::Tpr(p) => Ok(Self::Tpr(TprLayer::new(p.output_size()))),
            other => Err(DnnError::InvalidConfiguration(format!(
                "{:?} is not a recurrent layer",
                other.layer_type()
            ))),
        }
    }

    pub fn forward_sequence(&mut self, params: &LayerParameters, xs: Vec<DenseArray>) -> Result<Vec<DenseArray>> {
        if xs.is_empty() {
            return Err(DnnError::EmptySequence("recurrent layer"));
        }
        match (self, params) {
            (Self::Simple(layer), LayerParameters::SimpleRecurrent(p)) => layer.forward_sequence(p, xs),
            (Self::Lstm(layer), LayerParameters::Lstm(p)) => layer.forward_sequence(p, xs),
            (Self::Gru(layer), LayerParameters::Gru(p)) => layer.forward_sequence(p, xs),
            (Self::Tpr(layer), LayerParameters::Tpr(p)) => layer.forward_sequence(p, xs),
            (_, other) => Err(mismatch(other)),
        }
    }

    /// `output_errors` holds the errors of each step's output.
    pub fn backward_sequence(
        &mut self,
        params: &LayerParameters,
        output_errors: &[DenseArray],
        propagate_to_input: bool,
    ) -> Result<LayerErrors> {
        match (self, params) {
            (Self::Simple(layer), LayerParameters::SimpleRecurrent(p)) => {
                layer.backward_sequence(p, output_errors, propagate_to_input)
            }
            (Self::Lstm(layer), LayerParameters::Lstm(p)) => {
                layer.backward_sequence(p, output_errors, propagate_to_input)
            }
            (Self::Gru(layer), LayerParameters::Gru(p)) => {
                layer.backward_sequence(p, output_errors, propagate_to_input)
            }
            (Self::Tpr(layer), LayerParameters::Tpr(p)) => {
                layer.backward_sequence(p, output_errors, propagate_to_input)
            }
            (_, other) => Err(mismatch(other)),
        }
    }
}

fn mismatch(params: &LayerParameters) -> DnnError {
    DnnError::InvalidConfiguration(format!(
        "recurrent layer run with {:?} parameters",
        params.layer_type()
    ))
}

/// Checks that there is one output error per step.
pub(crate) fn check_sequence_errors(op: &'static str, steps: usize, errors: &[DenseArray]) -> Result<()> {
    if steps == 0 {
        return Err(DnnError::MissingValues(op));
    }
    if errors.len() != steps {
        return Err(DnnError::ShapeMismatch {
            op,
            expected: (steps, 1),
            actual: (errors.len(), 1),
        });
    }
    Ok(())
}
