//! Declarative description of a network: one `LayerInterface` per layer of
//! units, from the input to the output.

use crate::error::{DnnError, Result};
use crate::functions::ActivationFunction;
use serde::{Deserialize, Serialize};

/// How a layer is connected to the previous one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LayerType {
    Feedforward,
    Highway,
    Norm,
    Affine,
    Biaffine,
    Concat,
    Sum,
    Avg,
    Product,
    Distance,
    Cosine,
    SimpleRecurrent,
    LSTM,
    GRU,
    TPR,
}

impl LayerType {
    pub fn is_recurrent(&self) -> bool {
        matches!(self, Self::SimpleRecurrent | Self::LSTM | Self::GRU | Self::TPR)
    }

    pub fn is_merge(&self) -> bool {
        matches!(
            self,
            Self::Concat | Self::Sum | Self::Avg | Self::Product | Self::Distance | Self::Cosine
        )
    }

    /// Whether the layer takes more than one input vector.
    pub fn is_multi_input(&self) -> bool {
        self.is_merge() || matches!(self, Self::Affine | Self::Biaffine)
    }
}

/// Sizes of a Tensor Product Representation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TprDimensions {
    /// Number of symbols.
    pub n_symbols: usize,
    /// Size of each symbol embedding.
    pub d_symbols: usize,
    /// Number of roles.
    pub n_roles: usize,
    /// Size of each role embedding.
    pub d_roles: usize,
}

/// A layer of units.
///
/// The `connection`, `activation` and `dropout` of an interface describe the
/// layer that *produces* it, i.e. how it is connected to the previous interface.
/// They are ignored on the input interface.
///
/// ```json
/// [
///   { "sizes": [4], "sparse_input": true },
///   { "sizes": [8], "connection": "LSTM", "activation": "Tanh", "dropout": 0.25 },
///   { "sizes": [3], "connection": "Feedforward", "activation": "Softmax" }
/// ]
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerInterface {
    /// One size per input vector. Only multi-input layers read more than one.
    pub sizes: Vec<usize>,
    #[serde(default)]
    pub activation: Option<ActivationFunction>,
    #[serde(default)]
    pub connection: Option<LayerType>,
    #[serde(default)]
    pub dropout: f64,
    /// The input vectors are `SparseBinaryArray`s.
    #[serde(default)]
    pub sparse_input: bool,
    #[serde(default)]
    pub tpr: Option<TprDimensions>,
}

impl LayerInterface {
    pub fn new(size: usize) -> Self {
        Self::multi(vec![size])
    }

    pub fn multi(sizes: Vec<usize>) -> Self {
        Self {
            sizes,
            activation: None,
            connection: None,
            dropout: 0.0,
            sparse_input: false,
            tpr: None,
        }
    }

    pub fn with_activation(mut self, activation: ActivationFunction) -> Self {
        self.activation = Some(activation);
        self
    }

    pub fn with_connection(mut self, connection: LayerType) -> Self {
        self.connection = Some(connection);
        self
    }

    pub fn with_dropout(mut self, dropout: f64) -> Self {
        self.dropout = dropout;
        self
    }

    pub fn with_sparse_input(mut self) -> Self {
        self.sparse_input = true;
        self
    }

    pub fn with_tpr(mut self, dims: TprDimensions) -> Self {
        self.tpr = Some(dims);
        self
    }

    /// Size of the first (usually the only) vector.
    pub fn size(&self) -> usize {
        self.sizes.first().copied().unwrap_or(0)
    }

    pub fn validate(&self) -> Result<()> {
        if self.sizes.is_empty() || self.sizes.contains(&0) {
            return Err(DnnError::InvalidConfiguration(format!(
                "layer sizes must be non-empty and positive, got {:?}",
                self.sizes
            )));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(DnnError::InvalidHyperParameter {
                name: "dropout",
                reason: format!("must be in [0, 1), got {}", self.dropout),
            });
        }
        if let Some(activation) = &self.activation {
            activation.validate()?;
        }
        if let Some(dims) = &self.tpr {
            if [dims.n_symbols, dims.d_symbols, dims.n_roles, dims.d_roles].contains(&0) {
                return Err(DnnError::InvalidConfiguration(format!(
                    "TPR dimensions must be positive, got {:?}",
                    dims
                )));
            }
        }
        // выход TPR не активируется
        if self.connection == Some(LayerType::TPR) && self.activation.is_some() {
            return Err(DnnError::InvalidConfiguration(
                "TPR layers take no activation".to_string(),
            ));
        }
        Ok(())
    }

    /// Parses a JSON list of interfaces.
    pub fn list_from_json(json: &str) -> Result<Vec<LayerInterface>> {
        let list: Vec<LayerInterface> = serde_json::from_str(json)?;
        for interface in &list {
            interface.validate()?;
        }
        Ok(list)
    }
}
