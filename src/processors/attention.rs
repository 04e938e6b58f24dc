//! Processor running a single attention layer over a sequence.

use super::NeuralProcessor;
use crate::arrays::{DenseArray, ParamsArray, ParamsErrors};
use crate::error::{DnnError, Result};
use crate::layers::{AttentionLayer, AttentionParameters, ScaledDotAttentionLayer, ScaledDotAttentionParameters};
use tracing::debug;

#[derive(Debug, Clone)]
pub enum AttentionModel {
    /// Pools the sequence into one vector.
    Pooling(AttentionParameters),
    /// One output per step.
    SelfAttention(ScaledDotAttentionParameters),
}

impl AttentionModel {
    pub fn params(&self) -> Vec<&ParamsArray> {
        match self {
            Self::Pooling(p) => p.params(),
            Self::SelfAttention(p) => p.params(),
        }
    }

    pub fn params_mut(&mut self) -> Vec<&mut ParamsArray> {
        match self {
            Self::Pooling(p) => p.params_mut(),
            Self::SelfAttention(p) => p.params_mut(),
        }
    }
}

#[derive(Debug, Clone)]
enum AttentionKind {
    Pooling(AttentionLayer),
    SelfAttention(ScaledDotAttentionLayer),
}

#[derive(Debug, Clone)]
pub struct AttentionProcessor {
    layer: AttentionKind,
    propagate_to_input: bool,
    input_errors: Option<Vec<DenseArray>>,
    params_errors: Option<ParamsErrors>,
}

impl AttentionProcessor {
    pub fn new(model: &AttentionModel, propagate_to_input: bool) -> Self {
        let layer = match model {
            AttentionModel::Pooling(p) => AttentionKind::Pooling(AttentionLayer::new(p.input_size())),
            AttentionModel::SelfAttention(_) => AttentionKind::SelfAttention(ScaledDotAttentionLayer::new()),
        };
        Self {
            layer,
            propagate_to_input,
            input_errors: None,
            params_errors: None,
        }
    }

    /// Pooling attention returns a single vector, self-attention one per step.
    pub fn forward(&mut self, model: &AttentionModel, xs: Vec<DenseArray>) -> Result<Vec<DenseArray>> {
        self.input_errors = None;
        self.params_errors = None;
        let steps = xs.len();
        let ys = match (&mut self.layer, model) {
            (AttentionKind::Pooling(l), AttentionModel::Pooling(p)) => vec![l.forward(p, xs)?.clone()],
            (AttentionKind::SelfAttention(l), AttentionModel::SelfAttention(p)) => l.forward(p, xs)?,
            _ => return Err(mismatch()),
        };
        debug!(steps, "attention forward");
        Ok(ys)
    }

    /// Attention weights of the last forward pass: an `n x 1` column for
    /// pooling, the `n x n` matrix for self-attention.
    pub fn scores(&self) -> &DenseArray {
        match &self.layer {
            AttentionKind::Pooling(l) => l.scores(),
            AttentionKind::SelfAttention(l) => l.attention(),
        }
    }

    pub fn backward(&mut self, model: &AttentionModel, output_errors: Vec<DenseArray>) -> Result<()> {
        let errors = match (&mut self.layer, model) {
            (AttentionKind::Pooling(l), AttentionModel::Pooling(p)) => {
                let mut output_errors = output_errors.into_iter();
                let gy = match (output_errors.next(), output_errors.next()) {
                    (Some(gy), None) => gy,
                    _ => {
                        return Err(DnnError::InvalidConfiguration(
                            "pooling attention takes the errors of its single output".into(),
                        ))
                    }
                };
                l.output_mut().assign_errors(gy)?;
                l.backward(p, self.propagate_to_input)?
            }
            (AttentionKind::SelfAttention(l), AttentionModel::SelfAttention(p)) => {
                let outputs = l.outputs().len();
                if output_errors.len() != outputs {
                    return Err(DnnError::ShapeMismatch {
                        op: "AttentionProcessor::backward",
                        expected: (outputs, 1),
                        actual: (output_errors.len(), 1),
                    });
                }
                for (i, gy) in output_errors.into_iter().enumerate() {
                    l.assign_errors(i, gy)?;
                }
                l.backward(p, self.propagate_to_input)?
            }
            _ => return Err(mismatch()),
        };
        self.params_errors = Some(errors.params);
        self.input_errors = self.propagate_to_input.then_some(errors.inputs);
        Ok(())
    }

    pub fn input_errors(&self) -> Result<&Vec<DenseArray>> {
        if !self.propagate_to_input {
            return Err(DnnError::InvalidConfiguration(
                "input errors are not propagated by this processor".into(),
            ));
        }
        self.input_errors.as_ref().ok_or(DnnError::MissingErrors("AttentionProcessor input"))
    }

    pub fn params_errors(&self) -> Result<&ParamsErrors> {
        self.params_errors.as_ref().ok_or(DnnError::MissingErrors("AttentionProcessor params"))
    }
}

fn mismatch() -> DnnError {
    DnnError::InvalidConfiguration("attention processor run with a model of another kind".into())
}

impl NeuralProcessor for AttentionProcessor {
    type Model = AttentionModel;
    type Input = Vec<DenseArray>;
    type Output = Vec<DenseArray>;
    type OutputErrors = Vec<DenseArray>;
    type InputErrors = Vec<DenseArray>;

    fn forward(&mut self, model: &Self::Model, input: Self::Input) -> Result<Self::Output> {
        AttentionProcessor::forward(self, model, input)
    }

    fn backward(&mut self, model: &Self::Model, output_errors: Self::OutputErrors) -> Result<()> {
        AttentionProcessor::backward(self, model, output_errors)
    }

    fn input_errors(&self) -> Result<&Self::InputErrors> {
        AttentionProcessor::input_errors(self)
    }

    fn params_errors(&self) -> Result<&ParamsErrors> {
        AttentionProcessor::params_errors(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arrays::column;
    use crate::initializers::RandomInitializer;

    fn xs() -> Vec<DenseArray> {
        vec![column(&[1.0, 0.0]), column(&[0.0, 1.0]), column(&[0.5, -0.5])]
    }

    #[test]
    fn test_pooling() {
        let init = RandomInitializer::new(0.5, 3);
        let model = AttentionModel::Pooling(AttentionParameters::new(2, 4, Some(&init), None));
        let mut processor = AttentionProcessor::new(&model, true);
        let ys = processor.forward(&model, xs()).unwrap();
        assert_eq!(ys.len(), 1);
        assert_eq!(processor.scores().dim(), (3, 1));

        assert!(processor.backward(&model, vec![column(&[1.0, 0.0]); 2]).is_err());
        processor.backward(&model, vec![column(&[1.0, 0.0])]).unwrap();
        assert_eq!(processor.input_errors().unwrap().len(), 3);
        assert_eq!(processor.params_errors().unwrap().len(), 3);
    }

    #[test]
    fn test_self_attention() {
        let init = RandomInitializer::new(0.5, 4);
        let model = AttentionModel::SelfAttention(ScaledDotAttentionParameters::new(2, 3, 2, Some(&init), None));
        let mut processor = AttentionProcessor::new(&model, false);
        let ys = processor.forward(&model, xs()).unwrap();
        assert_eq!(ys.len(), 3);
        assert_eq!(processor.scores().dim(), (3, 3));

        processor.backward(&model, vec![column(&[1.0, 1.0]); 3]).unwrap();
        assert_eq!(processor.params_errors().unwrap().len(), 6);
        assert!(processor.input_errors().is_err());
    }
}
