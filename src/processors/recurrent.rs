//! Процессор последовательностей: рекуррентные слои обрабатывают всю
//! последовательность сразу (BPTT), остальные слои применяются к каждому шагу.

use super::NeuralProcessor;
use crate::arrays::{DenseArray, ParamsErrors};
use crate::error::{DnnError, Result};
use crate::layers::{Layer, LayerInterface, LayerParameters, RecurrentLayer, StackedLayersParameters};
use tracing::debug;

#[derive(Debug, Clone)]
enum SequenceLayer {
    Recurrent(RecurrentLayer),
    /// Один экземпляр слоя на каждый шаг, с общими параметрами.
    PerStep(Vec<Layer>),
}

#[derive(Debug, Clone)]
pub struct RecurrentNeuralProcessor {
    layers: Vec<SequenceLayer>,
    propagate_to_input: bool,
    outputs: Vec<DenseArray>,
    input_errors: Option<Vec<DenseArray>>,
    params_errors: Option<ParamsErrors>,
}

impl RecurrentNeuralProcessor {
    pub fn new(model: &StackedLayersParameters, propagate_to_input: bool) -> Result<Self> {
        let layers = model
            .layers()
            .iter()
            .enumerate()
            .map(|(i, params)| {
                let interface = model.output_interface(i);
                if params.layer_type().is_recurrent() {
                    RecurrentLayer::new(params, interface.activation).map(SequenceLayer::Recurrent)
                } else {
                    // the per-step layers are built on the first forward pass
                    Layer::new(params, interface).map(|_| SequenceLayer::PerStep(Vec::new()))
                }
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            layers,
            propagate_to_input,
            outputs: Vec::new(),
            input_errors: None,
            params_errors: None,
        })
    }

    /// Runs the whole sequence through every layer and returns the output of
    /// each step.
    pub fn forward(&mut self, model: &StackedLayersParameters, xs: Vec<DenseArray>) -> Result<Vec<DenseArray>> {
        if xs.is_empty() {
            return Err(DnnError::EmptySequence("RecurrentNeuralProcessor"));
        }
        self.check_model(model)?;
        self.input_errors = None;
        self.params_errors = None;
        let steps = xs.len();

        let mut sequence = xs;
        for (i, (layer, params)) in self.layers.iter_mut().zip(model.layers()).enumerate() {
            sequence = match layer {
                SequenceLayer::Recurrent(l) => l.forward_sequence(params, sequence)?,
                SequenceLayer::PerStep(step_layers) => {
                    *step_layers = new_step_layers(params, model.output_interface(i), steps)?;
                    step_layers
                        .iter_mut()
                        .zip(sequence)
                        .map(|(l, x)| l.forward(params, vec![x.into()], None))
                        .collect::<Result<Vec<_>>>()?
                }
            };
        }
        debug!(steps, layers = self.layers.len(), "recurrent forward");
        self.outputs = sequence.clone();
        Ok(sequence)
    }

    /// Output of the last step, after `forward`.
    pub fn last_output(&self) -> Option<&DenseArray> {
        self.outputs.last()
    }

    /// `output_errors` holds the errors of every step's output. Steps whose
    /// output is not used take zero errors.
    pub fn backward(&mut self, model: &StackedLayersParameters, output_errors: Vec<DenseArray>) -> Result<()> {
        self.check_model(model)?;
        if self.outputs.is_empty() {
            return Err(DnnError::MissingValues("RecurrentNeuralProcessor outputs"));
        }
        if output_errors.len() != self.outputs.len() {
            return Err(DnnError::ShapeMismatch {
                op: "RecurrentNeuralProcessor::backward",
                expected: (self.outputs.len(), 1),
                actual: (output_errors.len(), 1),
            });
        }

        let mut params_errors = ParamsErrors::new();
        let mut errors = output_errors;
        let num_layers = self.layers.len();
        for (i, (layer, params)) in self.layers.iter_mut().zip(model.layers()).enumerate().rev() {
            let propagate = i > 0 || self.propagate_to_input;
            errors = match layer {
                SequenceLayer::Recurrent(l) => {
                    let e = l.backward_sequence(params, &errors, propagate)?;
                    params_errors.extend(e.params);
                    e.inputs
                }
                SequenceLayer::PerStep(step_layers) => {
                    let mut inputs = Vec::with_capacity(step_layers.len());
                    for (l, gy) in step_layers.iter_mut().zip(errors) {
                        l.output_mut().assign_errors(gy)?;
                        let e = l.backward(params, propagate)?;
                        params_errors.extend(e.params);
                        inputs.extend(e.inputs.into_iter().next());
                    }
                    inputs
                }
            };
        }
        // параметры общие для всех шагов: суммируем их ошибки
        let params_errors = params_errors.merge_duplicates()?;
        debug!(steps = self.outputs.len(), layers = num_layers, params = params_errors.len(), "recurrent backward");

        self.params_errors = Some(params_errors);
        self.input_errors = self.propagate_to_input.then_some(errors);
        Ok(())
    }

    /// Errors of each input step.
    pub fn input_errors(&self) -> Result<&Vec<DenseArray>> {
        if !self.propagate_to_input {
            return Err(DnnError::InvalidConfiguration(
                "input errors are not propagated by this processor".into(),
            ));
        }
        self.input_errors
            .as_ref()
            .ok_or(DnnError::MissingErrors("RecurrentNeuralProcessor input"))
    }

    /// Summed over the steps of the sequence.
    pub fn params_errors(&self) -> Result<&ParamsErrors> {
        self.params_errors
            .as_ref()
            .ok_or(DnnError::MissingErrors("RecurrentNeuralProcessor params"))
    }

    fn check_model(&self, model: &StackedLayersParameters) -> Result<()> {
        if model.num_layers() != self.layers.len() {
            return Err(DnnError::InvalidConfiguration(format!(
                "processor built for {} layers, model has {}",
                self.layers.len(),
                model.num_layers()
            )));
        }
        Ok(())
    }
}

fn new_step_layers(params: &LayerParameters, interface: &LayerInterface, steps: usize) -> Result<Vec<Layer>> {
    (0..steps).map(|_| Layer::new(params, interface)).collect()
}

impl NeuralProcessor for RecurrentNeuralProcessor {
    type Model = StackedLayersParameters;
    type Input = Vec<DenseArray>;
    type Output = Vec<DenseArray>;
    type OutputErrors = Vec<DenseArray>;
    type InputErrors = Vec<DenseArray>;

    fn forward(&mut self, model: &Self::Model, input: Self::Input) -> Result<Self::Output> {
        RecurrentNeuralProcessor::forward(self, model, input)
    }

    fn backward(&mut self, model: &Self::Model, output_errors: Self::OutputErrors) -> Result<()> {
        RecurrentNeuralProcessor::backward(self, model, output_errors)
    }

    fn input_errors(&self) -> Result<&Self::InputErrors> {
        RecurrentNeuralProcessor::input_errors(self)
    }

    fn params_errors(&self) -> Result<&ParamsErrors> {
        RecurrentNeuralProcessor::params_errors(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arrays::column;
    use crate::functions::ActivationFunction;
    use crate::initializers::RandomInitializer;
    use crate::layers::LayerType;

    fn model() -> StackedLayersParameters {
        let init = RandomInitializer::new(0.5, 1);
        StackedLayersParameters::new(
            vec![
                LayerInterface::new(3),
                LayerInterface::new(4)
                    .with_connection(LayerType::GRU)
                    .with_activation(ActivationFunction::Tanh),
                LayerInterface::new(2).with_activation(ActivationFunction::Sigmoid),
            ],
            Some(&init),
            None,
        )
        .unwrap()
    }

    fn sequence() -> Vec<DenseArray> {
        vec![column(&[1.0, 0.0, -1.0]), column(&[0.5, 0.5, 0.5]), column(&[-0.2, 0.1, 0.0])]
    }

    #[test]
    fn test_outputs_one_vector_per_step() {
        let model = model();
        let mut processor = RecurrentNeuralProcessor::new(&model, true).unwrap();
        let ys = processor.forward(&model, sequence()).unwrap();
        assert_eq!(ys.len(), 3);
        assert!(ys.iter().all(|y| y.dim() == (2, 1)));
        assert_eq!(processor.last_output(), ys.last());
    }

    #[test]
    fn test_backward_sums_errors_over_steps() {
        let model = model();
        let mut processor = RecurrentNeuralProcessor::new(&model, true).unwrap();
        processor.forward(&model, sequence()).unwrap();
        let zeros = DenseArray::zeros((2, 1));
        processor
            .backward(&model, vec![zeros.clone(), zeros, column(&[1.0, -1.0])])
            .unwrap();

        // GRU: три гейта по три массива, плюс W и b выходного слоя
        assert_eq!(processor.params_errors().unwrap().len(), 9 + 2);
        let gx = processor.input_errors().unwrap();
        assert_eq!(gx.len(), 3);
        // ошибки последнего шага доходят до первого входа
        assert!(gx[0].iter().any(|v| v.abs() > 0.0));
    }

    #[test]
    fn test_empty_sequence() {
        let model = model();
        let mut processor = RecurrentNeuralProcessor::new(&model, false).unwrap();
        assert!(matches!(processor.forward(&model, Vec::new()), Err(DnnError::EmptySequence(_))));
    }
}
