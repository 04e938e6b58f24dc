//! Layers: stateful forward/backward units.
//!
//! Layers never own their parameters. A layer struct keeps what one invocation
//! needs (inputs, an `AugmentedArray` output, intermediate values) and borrows
//! its typed parameters on every `forward` and `backward` call, so the same
//! parameters can be shared by many layer instances (e.g. one per element of a
//! batch) and updated between calls.
//!
//! The output errors are assigned to the output array before `backward`, which
//! returns the errors of the inputs and of the parameters.

pub mod affine;
pub mod attention;
pub mod biaffine;
pub mod dropout;
pub mod feedforward;
pub mod highway;
pub mod interface;
pub mod layer;
pub mod merge;
pub mod norm;
pub mod parameters;
pub mod recurrent;
pub mod relevance;
pub mod stacked;

pub use affine::{AffineLayer, AffineParameters};
pub use attention::{AttentionLayer, AttentionParameters, ScaledDotAttentionLayer, ScaledDotAttentionParameters};
pub use biaffine::{BiaffineLayer, BiaffineParameters};
pub use dropout::Dropout;
pub use feedforward::{FeedforwardLayer, FeedforwardParameters};
pub use highway::{HighwayLayer, HighwayParameters};
pub use interface::{LayerInterface, LayerType, TprDimensions};
pub use layer::Layer;
pub use merge::{MergeKind, MergeLayer, MergeParameters};
pub use norm::{NormLayer, NormParameters};
pub use parameters::LayerParameters;
pub use recurrent::{
    GateParameters, GruLayer, GruParameters, LstmLayer, LstmParameters, RecurrentLayer, SimpleRecurrentLayer,
    SimpleRecurrentParameters, TprLayer, TprParameters,
};
pub use stacked::StackedLayersParameters;

use crate::arrays::{DenseArray, ParamsErrors, Shape, SparseBinaryArray};
use crate::error::{DnnError, Result};

/// Input vector of a layer.
#[derive(Debug, Clone, PartialEq)]
pub enum LayerInput {
    Dense(DenseArray),
    /// Only feedforward layers accept sparse binary inputs.
    SparseBinary(SparseBinaryArray),
}

impl LayerInput {
    pub fn shape(&self) -> Shape {
        match self {
            Self::Dense(x) => x.dim(),
            Self::SparseBinary(x) => x.shape(),
        }
    }

    pub fn to_dense(&self) -> DenseArray {
        match self {
            Self::Dense(x) => x.clone(),
            Self::SparseBinary(x) => x.to_dense(),
        }
    }

    /// The dense array, or an error naming `layer` for sparse inputs.
    pub fn into_dense(self, layer: &str) -> Result<DenseArray> {
        match self {
            Self::Dense(x) => Ok(x),
            Self::SparseBinary(_) => Err(DnnError::InvalidConfiguration(format!(
                "{} layer does not accept sparse binary input",
                layer
            ))),
        }
    }
}

impl From<DenseArray> for LayerInput {
    fn from(x: DenseArray) -> Self {
        Self::Dense(x)
    }
}

impl From<SparseBinaryArray> for LayerInput {
    fn from(x: SparseBinaryArray) -> Self {
        Self::SparseBinary(x)
    }
}

/// Result of a backward pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LayerErrors {
    /// Errors of each input (or of each step, for sequence layers). Empty when
    /// the errors are not propagated to the input.
    pub inputs: Vec<DenseArray>,
    pub params: ParamsErrors,
}
