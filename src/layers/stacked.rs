//! Parameters of a stack of layers.

use super::{LayerInterface, LayerParameters};
use crate::arrays::ParamsArray;
use crate::error::{DnnError, Result};
use crate::initializers::Initializer;

/// The parameters of a network described by a list of `LayerInterface`s: layer
/// `i` connects `interfaces[i]` to `interfaces[i + 1]`.
///
/// Only the input interface may declare more than one size.
#[derive(Debug, Clone)]
pub struct StackedLayersParameters {
    interfaces: Vec<LayerInterface>,
    layers: Vec<LayerParameters>,
}

impl StackedLayersParameters {
    pub fn new(
        interfaces: Vec<LayerInterface>,
        weights_init: Option<&dyn Initializer>,
        bias_init: Option<&dyn Initializer>,
    ) -> Result<Self> {
        if interfaces.len() < 2 {
            return Err(DnnError::InvalidConfiguration(format!(
                "a network needs at least an input and an output interface, got {}",
                interfaces.len()
            )));
        }
        let layers = interfaces
            .windows(2)
            .map(|pair| LayerParameters::new(&pair[0], &pair[1], weights_init, bias_init))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { interfaces, layers })
    }

    /// Parses the interfaces from JSON and builds the parameters.
    pub fn from_json(
        json: &str,
        weights_init: Option<&dyn Initializer>,
        bias_init: Option<&dyn Initializer>,
    ) -> Result<Self> {
        Self::new(LayerInterface::list_from_json(json)?, weights_init, bias_init)
    }

    pub fn interfaces(&self) -> &[LayerInterface] {
        &self.interfaces
    }

    pub fn input_interface(&self) -> &LayerInterface {
        &self.interfaces[0]
    }

    /// The interface produced by layer `index`.
    pub fn output_interface(&self, index: usize) -> &LayerInterface {
        &self.interfaces[index + 1]
    }

    pub fn output_size(&self) -> usize {
        self.layers.last().map(|l| l.output_size()).unwrap_or(0)
    }

    pub fn layers(&self) -> &[LayerParameters] {
        &self.layers
    }

    pub fn layers_mut(&mut self) -> &mut [LayerParameters] {
        &mut self.layers
    }

    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    pub fn has_recurrent_layers(&self) -> bool {
        self.layers.iter().any(|l| l.layer_type().is_recurrent())
    }

    pub fn params(&self) -> Vec<&ParamsArray> {
        self.layers.iter().flat_map(|l| l.params()).collect()
    }

    /// Every trainable array, to be passed to `ParamsOptimizer::update`.
    pub fn params_mut(&mut self) -> Vec<&mut ParamsArray> {
        self.layers.iter_mut().flat_map(|l| l.params_mut()).collect()
    }
}
