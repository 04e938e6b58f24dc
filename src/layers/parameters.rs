//! Typed parameters of each layer kind.

use super::{
    AffineParameters, BiaffineParameters, FeedforwardParameters, GruParameters, HighwayParameters,
    LayerInterface, LayerType, LstmParameters, MergeKind, MergeParameters, NormParameters,
    SimpleRecurrentParameters, TprParameters,
};
use crate::arrays::ParamsArray;
use crate::error::{DnnError, Result};
use crate::initializers::Initializer;

#[derive(Debug, Clone)]
pub enum LayerParameters {
    Feedforward(FeedforwardParameters),
    Highway(HighwayParameters),
    Norm(NormParameters),
    Affine(AffineParameters),
    Biaffine(BiaffineParameters),
    Merge(MergeParameters),
    SimpleRecurrent(SimpleRecurrentParameters),
    Lstm(LstmParameters),
    Gru(GruParameters),
    Tpr(TprParameters),
}

impl LayerParameters {
    /// Builds the parameters of the layer connecting `input` to `output`, with
    /// the connection type declared on `output` (feedforward by default).
    pub fn new(
        input: &LayerInterface,
        output: &LayerInterface,
        weights_init: Option<&dyn Initializer>,
        bias_init: Option<&dyn Initializer>,
    ) -> Result<Self> {
        input.validate()?;
        output.validate()?;
        let connection = output.connection.unwrap_or(LayerType::Feedforward);
        let (in_size, out_size) = (input.size(), output.size());

        if output.sizes.len() != 1 {
            return Err(invalid(format!("{:?} layer must have a single output size", connection)));
        }
        if input.sizes.len() > 1 && !connection.is_multi_input() {
            return Err(invalid(format!("{:?} layer takes a single input, got sizes {:?}", connection, input.sizes)));
        }
        if input.sparse_input && connection != LayerType::Feedforward {
            return Err(invalid(format!("{:?} layer does not support sparse input", connection)));
        }

        let params = match connection {
            LayerType::Feedforward => {
                Self::Feedforward(FeedforwardParameters::new(in_size, out_size, weights_init, bias_init))
            }
            LayerType::Highway => {
                ensure_same_size(connection, in_size, out_size)?;
                Self::Highway(HighwayParameters::new(out_size, weights_init, bias_init))
            }
            LayerType::Norm => {
                ensure_same_size(connection, in_size, out_size)?;
                Self::Norm(NormParameters::new(out_size))
            }
            LayerType::Affine => {
                Self::Affine(AffineParameters::new(&input.sizes, out_size, weights_init, bias_init))
            }
            LayerType::Biaffine => {
                if input.sizes.len() != 2 {
                    return Err(invalid(format!("Biaffine layer takes two inputs, got sizes {:?}", input.sizes)));
                }
                Self::Biaffine(BiaffineParameters::new(
                    input.sizes[0],
                    input.sizes[1],
                    out_size,
                    weights_init,
                    bias_init,
                ))
            }
            LayerType::SimpleRecurrent => Self::SimpleRecurrent(SimpleRecurrentParameters::new(
                in_size,
                out_size,
                weights_init,
                bias_init,
            )),
            LayerType::LSTM => Self::Lstm(LstmParameters::new(in_size, out_size, weights_init, bias_init)),
            LayerType::GRU => Self::Gru(GruParameters::new(in_size, out_size, weights_init, bias_init)),
            LayerType::TPR => {
                let dims = output
                    .tpr
                    .ok_or_else(|| invalid("TPR layer requires the `tpr` dimensions".to_string()))?;
                if dims.d_symbols * dims.d_roles != out_size {
                    return Err(invalid(format!(
                        "TPR output size must be d_symbols · d_roles = {}, got {}",
                        dims.d_symbols * dims.d_roles,
                        out_size
                    )));
                }
                Self::Tpr(TprParameters::new(in_size, dims, weights_init, bias_init))
            }
            merge => {
                let kind = MergeKind::from_layer_type(merge)
                    .ok_or_else(|| invalid(format!("unsupported connection {:?}", merge)))?;
                let params = MergeParameters::new(kind, input.sizes.clone())?;
                if params.output_size() != out_size {
                    return Err(invalid(format!(
                        "{:?} layer output size must be {}, got {}",
                        merge,
                        params.output_size(),
                        out_size
                    )));
                }
                Self::Merge(params)
            }
        };
        Ok(params)
    }

    pub fn layer_type(&self) -> LayerType {
        match self {
            Self::Feedforward(_) => LayerType::Feedforward,
            Self::Highway(_) => LayerType::Highway,
            Self::Norm(_) => LayerType::Norm,
            Self::Affine(_) => LayerType::Affine,
            Self::Biaffine(_) => LayerType::Biaffine,
            Self::Merge(p) => p.kind.layer_type(),
            Self::SimpleRecurrent(_) => LayerType::SimpleRecurrent,
            Self::Lstm(_) => LayerType::LSTM,
            Self::Gru(_) => LayerType::GRU,
            Self::Tpr(_) => LayerType::TPR,
        }
    }

    pub fn output_size(&self) -> usize {
        match self {
            Self::Feedforward(p) => p.output_size(),
            Self::Highway(p) => p.size(),
            Self::Norm(p) => p.size(),
            Self::Affine(p) => p.output_size(),
            Self::Biaffine(p) => p.output_size(),
            Self::Merge(p) => p.output_size(),
            Self::SimpleRecurrent(p) => p.output_size(),
            Self::Lstm(p) => p.output_size(),
            Self::Gru(p) => p.output_size(),
            Self::Tpr(p) => p.output_size(),
        }
    }

    pub fn params(&self) -> Vec<&ParamsArray> {
        match self {
            Self::Feedforward(p) => p.params(),
            Self::Highway(p) => p.params(),
            Self::Norm(p) => p.params(),
            Self::Affine(p) => p.params(),
            Self::Biaffine(p) => p.params(),
            Self::Merge(_) => Vec::new(),
            Self::SimpleRecurrent(p) => p.params(),
            Self::Lstm(p) => p.params(),
            Self::Gru(p) => p.params(),
            Self::Tpr(p) => p.params(),
        }
    }

    pub fn params_mut(&mut self) -> Vec<&mut ParamsArray> {
        match self {
            Self::Feedforward(p) => p.params_mut(),
            Self::Highway(p) => p.params_mut(),
            Self::Norm(p) => p.params_mut(),
            Self::Affine(p) => p.params_mut(),
            Self::Biaffine(p) => p.params_mut(),
            Self::Merge(_) => Vec::new(),
            Self::SimpleRecurrent(p) => p.params_mut(),
            Self::Lstm(p) => p.params_mut(),
            Self::Gru(p) => p.params_mut(),
            Self::Tpr(p) => p.params_mut(),
        }
    }
}

fn invalid(message: String) -> DnnError {
    DnnError::InvalidConfiguration(message)
}

fn ensure_same_size(connection: LayerType, in_size: usize, out_size: usize) -> Result<()> {
    if in_size == out_size {
        Ok(())
    } else {
        Err(invalid(format!(
            "{:?} layer requires equal input and output sizes, got {} and {}",
            connection, in_size, out_size
        )))
    }
}
