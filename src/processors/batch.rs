//! The same feedforward model applied to every example of a batch.

use super::{FeedforwardNeuralProcessor, NeuralProcessor};
use crate::arrays::{DenseArray, ParamsErrors};
use crate::error::{DnnError, Result};
use crate::layers::{LayerInput, StackedLayersParameters};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

/// Runs one `FeedforwardNeuralProcessor` per example, sequentially. The params
/// errors of the batch are the average of the examples' errors.
#[derive(Debug, Clone)]
pub struct BatchFeedforwardProcessor {
    use_dropout: bool,
    propagate_to_input: bool,
    rng: StdRng,
    processors: Vec<FeedforwardNeuralProcessor>,
    input_errors: Option<Vec<DenseArray>>,
    params_errors: Option<ParamsErrors>,
}

impl BatchFeedforwardProcessor {
    pub fn new(use_dropout: bool, propagate_to_input: bool) -> Self {
        Self {
            use_dropout,
            propagate_to_input,
            rng: StdRng::from_entropy(),
            processors: Vec::new(),
            input_errors: None,
            params_errors: None,
        }
    }

    /// Seeds the dropout masks of every example.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn processors(&self) -> &[FeedforwardNeuralProcessor] {
        &self.processors
    }

    pub fn forward(&mut self, model: &StackedLayersParameters, inputs: Vec<LayerInput>) -> Result<Vec<DenseArray>> {
        if inputs.is_empty() {
            return Err(DnnError::EmptySequence("BatchFeedforwardProcessor"));
        }
        self.input_errors = None;
        self.params_errors = None;
        self.processors.clear();

        let mut outputs = Vec::with_capacity(inputs.len());
        for input in inputs {
            let mut processor = FeedforwardNeuralProcessor::new(model, self.use_dropout, self.propagate_to_input)?
                .with_seed(self.rng.gen());
            outputs.push(processor.forward(model, input)?);
            self.processors.push(processor);
        }
        debug!(batch_size = outputs.len(), "batch forward");
        Ok(outputs)
    }

    /// `output_errors` holds the errors of each example's output, in the order
    /// of the inputs.
    pub fn backward(&mut self, model: &StackedLayersParameters, output_errors: Vec<DenseArray>) -> Result<()> {
        if output_errors.len() != self.processors.len() {
            return Err(DnnError::ShapeMismatch {
                op: "BatchFeedforwardProcessor::backward",
                expected: (self.processors.len(), 1),
                actual: (output_errors.len(), 1),
            });
        }
        let mut params_errors = ParamsErrors::new();
        let mut input_errors = Vec::new();
        for (processor, gy) in self.processors.iter_mut().zip(output_errors) {
            processor.backward(model, gy)?;
            params_errors.extend(processor.params_errors()?.clone());
            if self.propagate_to_input {
                input_errors.extend(processor.input_errors()?.iter().cloned());
            }
        }

        let mut params_errors = params_errors.merge_duplicates()?;
        params_errors.scale(1.0 / self.processors.len() as f64);
        self.params_errors = Some(params_errors);
        self.input_errors = self.propagate_to_input.then_some(input_errors);
        Ok(())
    }

    /// Errors of each example's input, in order (examples with several inputs
    /// contribute one array per input).
    pub fn input_errors(&self) -> Result<&Vec<DenseArray>> {
        self.input_errors
            .as_ref()
            .ok_or(DnnError::MissingErrors("BatchFeedforwardProcessor input"))
    }

    pub fn params_errors(&self) -> Result<&ParamsErrors> {
        self.params_errors
            .as_ref()
            .ok_or(DnnError::MissingErrors("BatchFeedforwardProcessor params"))
    }
}

impl NeuralProcessor for BatchFeedforwardProcessor {
    type Model = StackedLayersParameters;
    type Input = Vec<LayerInput>;
    type Output = Vec<DenseArray>;
    type OutputErrors = Vec<DenseArray>;
    type InputErrors = Vec<DenseArray>;

    fn forward(&mut self, model: &Self::Model, input: Self::Input) -> Result<Self::Output> {
        BatchFeedforwardProcessor::forward(self, model, input)
    }

    fn backward(&mut self, model: &Self::Model, output_errors: Self::OutputErrors) -> Result<()> {
        BatchFeedforwardProcessor::backward(self, model, output_errors)
    }

    fn input_errors(&self) -> Result<&Self::InputErrors> {
        BatchFeedforwardProcessor::input_errors(self)
    }

    fn params_errors(&self) -> Result<&ParamsErrors> {
        BatchFeedforwardProcessor::params_errors(self)
    }
}
