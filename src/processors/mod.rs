//! Processors: run a model's layers forward and backward for one input.
//!
//! A processor owns the per-invocation layer state; the model (the parameters)
//! is borrowed on every call, so one model can be shared by several processors
//! and updated by a [`ParamsOptimizer`](crate::optimizers::ParamsOptimizer)
//! between calls.

pub mod attention;
pub mod batch;
pub mod birnn;
pub mod feedforward;
pub mod recurrent;

pub use attention::{AttentionModel, AttentionProcessor};
pub use batch::BatchFeedforwardProcessor;
pub use birnn::{BiRnnEncoder, BiRnnMergeMode, BiRnnModel};
pub use feedforward::FeedforwardNeuralProcessor;
pub use recurrent::RecurrentNeuralProcessor;

use crate::arrays::ParamsErrors;
use crate::error::Result;

pub trait NeuralProcessor {
    type Model;
    type Input;
    type Output;
    type OutputErrors;
    type InputErrors;

    fn forward(&mut self, model: &Self::Model, input: Self::Input) -> Result<Self::Output>;

    /// Propagates the errors of the last output back through the layers.
    fn backward(&mut self, model: &Self::Model, output_errors: Self::OutputErrors) -> Result<()>;

    /// Available after `backward` when the processor propagates to the input.
    fn input_errors(&self) -> Result<&Self::InputErrors>;

    /// Available after `backward`.
    fn params_errors(&self) -> Result<&ParamsErrors>;
}
