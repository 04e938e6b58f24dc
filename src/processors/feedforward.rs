//! Процессор для сетей без рекуррентных слоёв.

use super::NeuralProcessor;
use crate::arrays::{DenseArray, ParamsErrors};
use crate::error::{DnnError, Result};
use crate::layers::{Layer, LayerInput, StackedLayersParameters};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::debug;

/// Runs a `StackedLayersParameters` of feedforward, highway, norm, affine,
/// biaffine and merge layers on a single example.
#[derive(Debug, Clone)]
pub struct FeedforwardNeuralProcessor {
    layers: Vec<Layer>,
    use_dropout: bool,
    propagate_to_input: bool,
    rng: StdRng,
    input_errors: Option<Vec<DenseArray>>,
    params_errors: Option<ParamsErrors>,
}

impl FeedforwardNeuralProcessor {
    pub fn new(model: &StackedLayersParameters, use_dropout: bool, propagate_to_input: bool) -> Result<Self> {
        if model.has_recurrent_layers() {
            return Err(DnnError::InvalidConfiguration(
                "FeedforwardNeuralProcessor cannot run recurrent layers".into(),
            ));
        }
        let layers = model
            .layers()
            .iter()
            .enumerate()
            .map(|(i, params)| Layer::new(params, model.output_interface(i)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            layers,
            use_dropout,
            propagate_to_input,
            rng: StdRng::from_entropy(),
            input_errors: None,
            params_errors: None,
        })
    }

    /// Фиксирует seed генератора масок dropout.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// Прямой проход для сети с единственным входом.
    pub fn forward(&mut self, model: &StackedLayersParameters, input: LayerInput) -> Result<DenseArray> {
        self.forward_multi(model, vec![input])
    }

    /// Прямой проход, когда первый слой принимает несколько входов
    /// (merge, affine, biaffine).
    pub fn forward_multi(&mut self, model: &StackedLayersParameters, inputs: Vec<LayerInput>) -> Result<DenseArray> {
        self.check_model(model)?;
        self.input_errors = None;
        self.params_errors = None;

        let mut inputs = inputs;
        let mut y = DenseArray::zeros((0, 1));
        for (layer, params) in self.layers.iter_mut().zip(model.layers()) {
            let rng = if self.use_dropout { Some(&mut self.rng) } else { None };
            y = layer.forward(params, inputs, rng)?;
            inputs = vec![LayerInput::Dense(y.clone())];
        }
        debug!(layers = self.layers.len(), dropout = self.use_dropout, "feedforward forward");
        Ok(y)
    }

    /// Output of the last forward pass.
    pub fn output(&self) -> Result<&DenseArray> {
        self.layers
            .last()
            .map(|l| l.output().values())
            .ok_or(DnnError::MissingValues("FeedforwardNeuralProcessor output"))
    }

    pub fn backward(&mut self, model: &StackedLayersParameters, output_errors: DenseArray) -> Result<()> {
        self.last_layer_mut()?.output_mut().assign_errors(output_errors)?;
        self.backward_layers(model)
    }

    /// Backward pass from errors already taken with respect to the output
    /// before its activation, e.g. `y - gold` for softmax with cross-entropy.
    pub fn backward_from_logits(&mut self, model: &StackedLayersParameters, output_errors: DenseArray) -> Result<()> {
        self.last_layer_mut()?
            .output_mut()
            .assign_pre_activation_errors(output_errors)?;
        self.backward_layers(model)
    }

    pub fn input_errors(&self) -> Result<&Vec<DenseArray>> {
        if !self.propagate_to_input {
            return Err(DnnError::InvalidConfiguration(
                "input errors are not propagated by this processor".into(),
            ));
        }
        self.input_errors
            .as_ref()
            .ok_or(DnnError::MissingErrors("FeedforwardNeuralProcessor input"))
    }

    pub fn params_errors(&self) -> Result<&ParamsErrors> {
        self.params_errors
            .as_ref()
            .ok_or(DnnError::MissingErrors("FeedforwardNeuralProcessor params"))
    }

    /// Distributes `relevance` over the units of the input with the epsilon
    /// rule, layer by layer. Every layer must be a feedforward layer.
    pub fn propagate_relevance(
        &self,
        model: &StackedLayersParameters,
        relevance: &DenseArray,
        epsilon: f64,
    ) -> Result<DenseArray> {
        self.check_model(model)?;
        self.layers
            .iter()
            .zip(model.layers())
            .rev()
            .try_fold(relevance.clone(), |r, (layer, params)| {
                layer.propagate_relevance(params, &r, epsilon)
            })
    }

    fn last_layer_mut(&mut self) -> Result<&mut Layer> {
        self.layers
            .last_mut()
            .ok_or(DnnError::MissingValues("FeedforwardNeuralProcessor layers"))
    }

    fn backward_layers(&mut self, model: &StackedLayersParameters) -> Result<()> {
        self.check_model(model)?;
        let mut params_errors = ParamsErrors::new();
        let mut input_errors = None;

        for i in (0..self.layers.len()).rev() {
            let propagate = i > 0 || self.propagate_to_input;
            let errors = self.layers[i].backward(&model.layers()[i], propagate)?;
            params_errors.extend(errors.params);
            if i > 0 {
                // только первый слой может иметь несколько входов
                let gx = errors
                    .inputs
                    .into_iter()
                    .next()
                    .ok_or(DnnError::MissingErrors("FeedforwardNeuralProcessor hidden layer"))?;
                self.layers[i - 1].output_mut().assign_errors(gx)?;
            } else if propagate {
                input_errors = Some(errors.inputs);
            }
        }
        debug!(params = params_errors.len(), "feedforward backward");

        self.params_errors = Some(params_errors);
        self.input_errors = input_errors;
        Ok(())
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

impl NeuralProcessor for FeedforwardNeuralProcessor {
    type Model = StackedLayersParameters;
    type Input = LayerInput;
    type Output = DenseArray;
    type OutputErrors = DenseArray;
    type InputErrors = Vec<DenseArray>;

    fn forward(&mut self, model: &Self::Model, input: Self::Input) -> Result<Self::Output> {
        FeedforwardNeuralProcessor::forward(self, model, input)
    }

    fn backward(&mut self, model: &Self::Model, output_errors: Self::OutputErrors) -> Result<()> {
        FeedforwardNeuralProcessor::backward(self, model, output_errors)
    }

    fn input_errors(&self) -> Result<&Self::InputErrors> {
        FeedforwardNeuralProcessor::input_errors(self)
    }

    fn params_errors(&self) -> Result<&ParamsErrors> {
        FeedforwardNeuralProcessor::params_errors(self)
    }
}
