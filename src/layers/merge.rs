//! Parameter-free layers that merge several input vectors into one, followed
//! by an optional activation.

use super::{LayerErrors, LayerType};
use crate::arrays::{check_shape, concat_v, sign, split_v, AugmentedArray, DenseArray, ParamsErrors};
use crate::error::{DnnError, Result};
use crate::functions::ActivationFunction;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeKind {
    Concat,
    Sum,
    Avg,
    Product,
    /// `exp(-‖x1 - x2‖₁)`
    Distance,
    /// Cosine similarity of two vectors, 0 when either is a zero vector.
    Cosine,
}

impl MergeKind {
    pub fn from_layer_type(layer_type: LayerType) -> Option<Self> {
        match layer_type {
            LayerType::Concat => Some(Self::Concat),
            LayerType::Sum => Some(Self::Sum),
            LayerType::Avg => Some(Self::Avg),
            LayerType::Product => Some(Self::Product),
            LayerType::Distance => Some(Self::Distance),
            LayerType::Cosine => Some(Self::Cosine),
            _ => None,
        }
    }

    pub fn layer_type(&self) -> LayerType {
        match self {
            Self::Concat => LayerType::Concat,
            Self::Sum => LayerType::Sum,
            Self::Avg => LayerType::Avg,
            Self::Product => LayerType::Product,
            Self::Distance => LayerType::Distance,
            Self::Cosine => LayerType::Cosine,
        }
    }
}

/// Shape description of a merge layer. It has no trainable parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeParameters {
    pub kind: MergeKind,
    pub input_sizes: Vec<usize>,
}

impl MergeParameters {
    pub fn new(kind: MergeKind, input_sizes: Vec<usize>) -> Result<Self> {
        if input_sizes.is_empty() {
            return Err(DnnError::InvalidConfiguration("merge layer without inputs".into()));
        }
        let same_size = input_sizes.iter().all(|&s| s == input_sizes[0]);
        match kind {
            MergeKind::Concat => {}
            MergeKind::Sum | MergeKind::Avg | MergeKind::Product if !same_size => {
                return Err(DnnError::InvalidConfiguration(format!(
                    "{:?} requires inputs of the same size, got {:?}",
                    kind, input_sizes
                )));
            }
            MergeKind::Distance | MergeKind::Cosine if input_sizes.len() != 2 || !same_size => {
                return Err(DnnError::InvalidConfiguration(format!(
                    "{:?} requires two inputs of the same size, got {:?}",
                    kind, input_sizes
                )));
            }
            _ => {}
        }
        Ok(Self { kind, input_sizes })
    }

    pub fn output_size(&self) -> usize {
        match self.kind {
            MergeKind::Concat => self.input_sizes.iter().sum(),
            MergeKind::Distance | MergeKind::Cosine => 1,
            _ => self.input_sizes[0],
        }
    }
}

#[derive(Debug, Clone)]
pub struct MergeLayer {
    inputs: Vec<DenseArray>,
    output: AugmentedArray,
}

impl MergeLayer {
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

    pub fn forward(&mut self, params: &MergeParameters, inputs: Vec<DenseArray>) -> Result<&DenseArray> {
        if inputs.len() != params.input_sizes.len() {
            return Err(DnnError::InvalidConfiguration(format!(
                "merge layer expects {} inputs, got {}",
                params.input_sizes.len(),
                inputs.len()
            )));
        }
        for (x, &size) in inputs.iter().zip(&params.input_sizes) {
            check_shape("Merge input", (size, 1), x.dim())?;
        }

        let z = match params.kind {
            MergeKind::Concat => concat_v(&inputs.iter().collect::<Vec<_>>())?,
            MergeKind::Sum => sum(&inputs),
            MergeKind::Avg => sum(&inputs) / inputs.len() as f64,
            MergeKind::Product => inputs[1..].iter().fold(inputs[0].clone(), |acc, x| acc * x),
            MergeKind::Distance => {
                let d = (&inputs[0] - &inputs[1]).mapv(f64::abs).sum();
                DenseArray::from_elem((1, 1), (-d).exp())
            }
            MergeKind::Cosine => {
                let (n1, n2) = (l2(&inputs[0]), l2(&inputs[1]));
                let similarity = if n1 > 0.0 && n2 > 0.0 {
                    dot(&inputs[0], &inputs[1]) / (n1 * n2)
                } else {
                    0.0
                };
                DenseArray::from_elem((1, 1), similarity)
            }
        };
        self.output.assign_and_activate(z)?;
        self.inputs = inputs;
        Ok(self.output.values())
    }

    /// Merge layers have no parameters: the returned `ParamsErrors` is empty.
    pub fn backward(&mut self, params: &MergeParameters, propagate_to_input: bool) -> Result<LayerErrors> {
        if self.inputs.is_empty() {
            return Err(DnnError::MissingValues("MergeLayer inputs"));
        }
        let gz = self.output.errors_not_activated()?;
        if !propagate_to_input {
            return Ok(LayerErrors::default());
        }

        let xs = &self.inputs;
        let inputs = match params.kind {
            MergeKind::Concat => split_v(&gz, &params.input_sizes)?,
            MergeKind::Sum => vec![gz; xs.len()],
            MergeKind::Avg => vec![gz / xs.len() as f64; xs.len()],
            MergeKind::Product => (0..xs.len())
                .map(|i| {
                    xs.iter()
                        .enumerate()
                        .filter(|&(j, _)| j != i)
                        .fold(gz.clone(), |acc, (_, x)| acc * x)
                })
                .collect(),
            MergeKind::Distance => {
                let y = self.output.not_activated()[[0, 0]];
                let g = gz[[0, 0]];
                let gx1 = sign(&(&xs[0] - &xs[1])) * (-g * y);
                let gx2 = gx1.mapv(|v| -v);
                vec![gx1, gx2]
            }
            MergeKind::Cosine => {
                let y = self.output.not_activated()[[0, 0]];
                let g = gz[[0, 0]];
                let (n1, n2) = (l2(&xs[0]), l2(&xs[1]));
                // нулевой вектор: сходство постоянно, градиента нет
                if n1 == 0.0 || n2 == 0.0 {
                    return Ok(LayerErrors {
                        inputs: vec![DenseArray::zeros(xs[0].dim()), DenseArray::zeros(xs[1].dim())],
                        params: ParamsErrors::new(),
                    });
                }
                let gx1 = (&xs[1] / (n1 * n2) - &xs[0] * (y / (n1 * n1))) * g;
                let gx2 = (&xs[0] / (n1 * n2) - &xs[1] * (y / (n2 * n2))) * g;
                vec![gx1, gx2]
            }
        };
        Ok(LayerErrors {
            inputs,
            params: ParamsErrors::new(),
        })
    }
}

fn sum(xs: &[DenseArray]) -> DenseArray {
    xs[1..].iter().fold(xs[0].clone(), |acc, x| acc + x)
}

fn dot(a: &DenseArray, b: &DenseArray) -> f64 {
    (a * b).sum()
}

fn l2(a: &DenseArray) -> f64 {
    dot(a, a).sqrt()
}
