//! Stateless math transforms.

pub mod activations;

pub use activations::ActivationFunction;
