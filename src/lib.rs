//! # rustydnn: hand-differentiated deep learning primitives
//!
//! Every layer computes its own forward pass and its own analytic backward
//! pass on `ndarray` column vectors: there is no graph and no autodiff.
//! Parameters live in models (`StackedLayersParameters`, `BiRnnModel`,
//! `AttentionModel`), processors run the layers, and a `ParamsOptimizer`
//! turns the accumulated errors into updates.
//!
//! ## Usage Example
//!
//! ```no_run
//! use rustydnn::arrays::column;
//! use rustydnn::functions::ActivationFunction;
//! use rustydnn::initializers::GlorotInitializer;
//! use rustydnn::layers::{LayerInterface, StackedLayersParameters};
//! use rustydnn::losses::{LossCalculator, MseCalculator};
//! use rustydnn::optimizers::{AdamMethod, ParamsOptimizer};
//! use rustydnn::processors::FeedforwardNeuralProcessor;
//!
//! # fn main() -> rustydnn::error::Result<()> {
//! // 1. Describe the network and initialize its parameters
//! let init = GlorotInitializer::new(42);
//! let mut model = StackedLayersParameters::new(
//!     vec![
//!         LayerInterface::new(2),
//!         LayerInterface::new(4).with_activation(ActivationFunction::Tanh),
//!         LayerInterface::new(1).with_activation(ActivationFunction::Sigmoid),
//!     ],
//!     Some(&init),
//!     None,
//! )?;
//!
//! // 2. Forward, loss, backward
//! let mut processor = FeedforwardNeuralProcessor::new(&model, false, false)?;
//! let y = processor.forward(&model, column(&[1.0, 0.0]).into())?;
//! let gold = column(&[1.0]);
//! processor.backward(&model, MseCalculator.errors(&y, &gold)?)?;
//!
//! // 3. Update
//! let mut optimizer = ParamsOptimizer::new(Box::new(AdamMethod::default()));
//! optimizer.new_batch();
//! optimizer.accumulate(processor.params_errors()?.clone())?;
//! optimizer.update(model.params_mut())?;
//! # Ok(())
//! # }
//! ```

pub mod arrays;
pub mod error;
pub mod functions;
pub mod initializers;
pub mod layers;
pub mod losses;
pub mod optimizers;
pub mod processors;
