//! Bidirectional encoder: one recurrent model reads the sequence left to right,
//! another right to left, and their outputs are merged step by step.

use super::{NeuralProcessor, RecurrentNeuralProcessor};
use crate::arrays::{concat_v, split_v, DenseArray, ParamsArray, ParamsErrors};
use crate::error::{DnnError, Result};
use crate::layers::StackedLayersParameters;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BiRnnMergeMode {
    Concat,
    Sum,
    Avg,
}

#[derive(Debug, Clone)]
pub struct BiRnnModel {
    pub left_to_right: StackedLayersParameters,
    pub right_to_left: StackedLayersParameters,
    pub merge: BiRnnMergeMode,
}

impl BiRnnModel {
    pub fn new(
        left_to_right: StackedLayersParameters,
        right_to_left: StackedLayersParameters,
        merge: BiRnnMergeMode,
    ) -> Result<Self> {
        let (l2r_in, r2l_in) = (left_to_right.input_interface().size(), right_to_left.input_interface().size());
        if l2r_in != r2l_in {
            return Err(DnnError::InvalidConfiguration(format!(
                "BiRNN directions read inputs of different sizes: {} and {}",
                l2r_in, r2l_in
            )));
        }
        let (l2r_out, r2l_out) = (left_to_right.output_size(), right_to_left.output_size());
        if merge != BiRnnMergeMode::Concat && l2r_out != r2l_out {
            return Err(DnnError::InvalidConfiguration(format!(
                "{:?} merge requires outputs of the same size, got {} and {}",
                merge, l2r_out, r2l_out
            )));
        }
        Ok(Self {
            left_to_right,
            right_to_left,
            merge,
        })
    }

    pub fn output_size(&self) -> usize {
        match self.merge {
            BiRnnMergeMode::Concat => self.left_to_right.output_size() + self.right_to_left.output_size(),
            BiRnnMergeMode::Sum | BiRnnMergeMode::Avg => self.left_to_right.output_size(),
        }
    }

    pub fn params_mut(&mut self) -> Vec<&mut ParamsArray> {
        let mut params = self.left_to_right.params_mut();
        params.extend(self.right_to_left.params_mut());
        params
    }
}

#[derive(Debug, Clone)]
pub struct BiRnnEncoder {
    left_to_right: RecurrentNeuralProcessor,
    right_to_left: RecurrentNeuralProcessor,
    propagate_to_input: bool,
    input_errors: Option<Vec<DenseArray>>,
    params_errors: Option<ParamsErrors>,
}

impl BiRnnEncoder {
    pub fn new(model: &BiRnnModel, propagate_to_input: bool) -> Result<Self> {
        Ok(Self {
            left_to_right: RecurrentNeuralProcessor::new(&model.left_to_right, propagate_to_input)?,
            right_to_left: RecurrentNeuralProcessor::new(&model.right_to_left, propagate_to_input)?,
            propagate_to_input,
            input_errors: None,
            params_errors: None,
        })
    }

    /// Returns the merged encoding of each step.
    pub fn forward(&mut self, model: &BiRnnModel, xs: Vec<DenseArray>) -> Result<Vec<DenseArray>> {
        self.input_errors = None;
        self.params_errors = None;
        let reversed: Vec<DenseArray> = xs.iter().rev().cloned().collect();
        let forward = self.left_to_right.forward(&model.left_to_right, xs)?;
        let mut backward = self.right_to_left.forward(&model.right_to_left, reversed)?;
        backward.reverse();

        debug!(steps = forward.len(), merge = ?model.merge, "birnn forward");
        forward
            .iter()
            .zip(&backward)
            .map(|(f, b)| match model.merge {
                BiRnnMergeMode::Concat => concat_v(&[f, b]),
                BiRnnMergeMode::Sum => Ok(f + b),
                BiRnnMergeMode::Avg => Ok((f + b) * 0.5),
            })
            .collect()
    }

    pub fn backward(&mut self, model: &BiRnnModel, output_errors: Vec<DenseArray>) -> Result<()> {
        let sizes = [model.left_to_right.output_size(), model.right_to_left.output_size()];
        let mut l2r_errors = Vec::with_capacity(output_errors.len());
        let mut r2l_errors = Vec::with_capacity(output_errors.len());
        for gy in output_errors {
            let (gf, gb) = match model.merge {
                BiRnnMergeMode::Concat => {
                    let mut parts = split_v(&gy, &sizes)?.into_iter();
                    match (parts.next(), parts.next()) {
                        (Some(gf), Some(gb)) => (gf, gb),
                        _ => return Err(DnnError::MissingErrors("BiRnnEncoder")),
                    }
                }
                BiRnnMergeMode::Sum => (gy.clone(), gy),
                BiRnnMergeMode::Avg => {
                    let half = gy * 0.5;
                    (half.clone(), half)
                }
            };
            l2r_errors.push(gf);
            r2l_errors.push(gb);
        }
        r2l_errors.reverse();

        self.left_to_right.backward(&model.left_to_right, l2r_errors)?;
        self.right_to_left.backward(&model.right_to_left, r2l_errors)?;

        let mut params_errors = self.left_to_right.params_errors()?.clone();
        params_errors.extend(self.right_to_left.params_errors()?.clone());
        self.params_errors = Some(params_errors);

        if self.propagate_to_input {
            let l2r = self.left_to_right.input_errors()?;
            let r2l = self.right_to_left.input_errors()?;
            self.input_errors = Some(l2r.iter().zip(r2l.iter().rev()).map(|(a, b)| a + b).collect());
        }
        Ok(())
    }

    pub fn input_errors(&self) -> Result<&Vec<DenseArray>> {
        if !self.propagate_to_input {
            return Err(DnnError::InvalidConfiguration(
                "input errors are not propagated by this processor".into(),
            ));
        }
        self.input_errors.as_ref().ok_or(DnnError::MissingErrors("BiRnnEncoder input"))
    }

    pub fn params_errors(&self) -> Result<&ParamsErrors> {
        self.params_errors.as_ref().ok_or(DnnError::MissingErrors("BiRnnEncoder params"))
    }
}

impl NeuralProcessor for BiRnnEncoder {
    type Model = BiRnnModel;
    type Input = Vec<DenseArray>;
    type Output = Vec<DenseArray>;
    type OutputErrors = Vec<DenseArray>;
    type InputErrors = Vec<DenseArray>;

    fn forward(&mut self, model: &Self::Model, input: Self::Input) -> Result<Self::Output> {
        BiRnnEncoder::forward(self, model, input)
    }

    fn backward(&mut self, model: &Self::Model, output_errors: Self::OutputErrors) -> Result<()> {
        BiRnnEncoder::backward(self, model, output_errors)
    }

    fn input_errors(&self) -> Result<&Self::InputErrors> {
        BiRnnEncoder::input_errors(self)
    }

    fn params_errors(&self) -> Result<&ParamsErrors> {
        BiRnnEncoder::params_errors(self)
    }
}
