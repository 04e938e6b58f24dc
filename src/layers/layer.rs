//! A non-recurrent layer of any kind, with dropout on its inputs.

use super::{
    AffineLayer, BiaffineLayer, Dropout, FeedforwardLayer, HighwayLayer, LayerErrors, LayerInput, LayerInterface,
    LayerParameters, MergeLayer, NormLayer,
};
use crate::arrays::{AugmentedArray, DenseArray};
use crate::error::{DnnError, Result};
use rand::rngs::StdRng;

#[derive(Debug, Clone)]
enum Kind {
    Feedforward(FeedforwardLayer),
    Highway(HighwayLayer),
    Norm(NormLayer),
    Affine(AffineLayer),
    Biaffine(BiaffineLayer),
    Merge(MergeLayer),
}

#[derive(Debug, Clone)]
pub struct Layer {
    kind: Kind,
    dropout: f64,
    /// One per input of the last forward pass, empty when dropout was off.
    dropouts: Vec<Dropout>,
}

impl Layer {
    /// Builds the layer running `params`, with the activation and dropout of the
    /// interface it produces.
    pub fn new(params: &LayerParameters, interface: &LayerInterface) -> Result<Self> {
        let size = params.output_size();
        let activation = interface.activation;
        let kind = match params {
            LayerParameters::Feedforward(_) => Kind::Feedforward(FeedforwardLayer::new(size, activation)),
            LayerParameters::Highway(_) => Kind::Highway(HighwayLayer::new(size, activation)),
            LayerParameters::Norm(_) => Kind::Norm(NormLayer::new(size, activation)),
            LayerParameters::Affine(_) => Kind::Affine(AffineLayer::new(size, activation)),
            LayerParameters::Biaffine(_) => Kind::Biaffine(BiaffineLayer::new(size, activation)),
            LayerParameters::Merge(_) => Kind::Merge(MergeLayer::new(size, activation)),
            other => {
                return Err(DnnError::InvalidConfiguration(format!(
                    "{:?} is a recurrent layer",
                    other.layer_type()
                )))
            }
        };
        // validated here so that `forward` can build the dropouts infallibly
        Dropout::new(interface.dropout)?;
        Ok(Self {
            kind,
            dropout: interface.dropout,
            dropouts: Vec::new(),
        })
    }

    pub fn output(&self) -> &AugmentedArray {
        match &self.kind {
            Kind::Feedforward(l) => l.output(),
            Kind::Highway(l) => l.output(),
            Kind::Norm(l) => l.output(),
            Kind::Affine(l) => l.output(),
            Kind::Biaffine(l) => l.output(),
            Kind::Merge(l) => l.output(),
        }
    }

    pub fn output_mut(&mut self) -> &mut AugmentedArray {
        match &mut self.kind {
            Kind::Feedforward(l) => l.output_mut(),
            Kind::Highway(l) => l.output_mut(),
            Kind::Norm(l) => l.output_mut(),
            Kind::Affine(l) => l.output_mut(),
            Kind::Biaffine(l) => l.output_mut(),
            Kind::Merge(l) => l.output_mut(),
        }
    }

    /// Runs the layer. Dropout is applied to the dense inputs when `rng` is given.
    pub fn forward(
        &mut self,
        params: &LayerParameters,
        inputs: Vec<LayerInput>,
        rng: Option<&mut StdRng>,
    ) -> Result<DenseArray> {
        let inputs = self.apply_dropout(inputs, rng)?;
        let y = match (&mut self.kind, params) {
            (Kind::Feedforward(l), LayerParameters::Feedforward(p)) => l.forward(p, single(inputs)?)?,
            (Kind::Highway(l), LayerParameters::Highway(p)) => {
                l.forward(p, single(inputs)?.into_dense("Highway")?)?
            }
            (Kind::Norm(l), LayerParameters::Norm(p)) => l.forward(p, single(inputs)?.into_dense("Norm")?)?,
            (Kind::Affine(l), LayerParameters::Affine(p)) => l.forward(p, all_dense(inputs, "Affine")?)?,
            (Kind::Biaffine(l), LayerParameters::Biaffine(p)) => {
                let mut xs = all_dense(inputs, "Biaffine")?.into_iter();
                match (xs.next(), xs.next(), xs.next()) {
                    (Some(x1), Some(x2), None) => l.forward(p, x1, x2)?,
                    _ => return Err(DnnError::InvalidConfiguration("Biaffine layer takes two inputs".into())),
                }
            }
            (Kind::Merge(l), LayerParameters::Merge(p)) => l.forward(p, all_dense(inputs, "Merge")?)?,
            (_, other) => return Err(mismatch(other)),
        };
        Ok(y.clone())
    }

    /// Backward pass. The output errors must be assigned to `output_mut()`.
    pub fn backward(&mut self, params: &LayerParameters, propagate_to_input: bool) -> Result<LayerErrors> {
        let mut errors = match (&mut self.kind, params) {
            (Kind::Feedforward(l), LayerParameters::Feedforward(p)) => l.backward(p, propagate_to_input)?,
            (Kind::Highway(l), LayerParameters::Highway(p)) => l.backward(p, propagate_to_input)?,
            (Kind::Norm(l), LayerParameters::Norm(p)) => l.backward(p, propagate_to_input)?,
            (Kind::Affine(l), LayerParameters::Affine(p)) => l.backward(p, propagate_to_input)?,
            (Kind::Biaffine(l), LayerParameters::Biaffine(p)) => l.backward(p, propagate_to_input)?,
            (Kind::Merge(l), LayerParameters::Merge(p)) => l.backward(p, propagate_to_input)?,
            (_, other) => return Err(mismatch(other)),
        };
        for (gx, dropout) in errors.inputs.iter_mut().zip(&self.dropouts) {
            *gx = dropout.backward(gx);
        }
        Ok(errors)
    }

    /// Epsilon-rule relevance of the inputs. Only defined for feedforward layers.
    pub fn propagate_relevance(
        &self,
        params: &LayerParameters,
        relevance: &DenseArray,
        epsilon: f64,
    ) -> Result<DenseArray> {
        match (&self.kind, params) {
            (Kind::Feedforward(l), LayerParameters::Feedforward(p)) => l.propagate_relevance(p, relevance, epsilon),
            (_, other) => Err(DnnError::InvalidConfiguration(format!(
                "relevance propagation is not defined for {:?} layers",
                other.layer_type()
            ))),
        }
    }

    fn apply_dropout(&mut self, inputs: Vec<LayerInput>, rng: Option<&mut StdRng>) -> Result<Vec<LayerInput>> {
        self.dropouts.clear();
        let rng = match rng {
            Some(rng) if self.dropout > 0.0 => rng,
            _ => return Ok(inputs),
        };
        let mut dropped = Vec::with_capacity(inputs.len());
        for input in inputs {
            let mut dropout = Dropout::new(self.dropout)?;
            // sparse binary inputs are never dropped: their mask stays empty
            let input = match input {
                LayerInput::Dense(x) => LayerInput::Dense(dropout.apply(&x, rng)),
                sparse => sparse,
            };
            self.dropouts.push(dropout);
            dropped.push(input);
        }
        Ok(dropped)
    }
}

fn single(inputs: Vec<LayerInput>) -> Result<LayerInput> {
    let count = inputs.len();
    let mut it = inputs.into_iter();
    match (it.next(), it.next()) {
        (Some(x), None) => Ok(x),
        _ => Err(DnnError::InvalidConfiguration(format!(
            "single-input layer given {} inputs",
            count
        ))),
    }
}

fn all_dense(inputs: Vec<LayerInput>, layer: &str) -> Result<Vec<DenseArray>> {
    inputs.into_iter().map(|x| x.into_dense(layer)).collect()
}

fn mismatch(params: &LayerParameters) -> DnnError {
    DnnError::InvalidConfiguration(format!(
        "layer run with {:?} parameters of another kind",
        params.layer_type()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arrays::column;
    use crate::layers::LayerType;
    use rand::SeedableRng;

    #[test]
    fn test_dropout_masks_inputs_and_their_errors() {
        let input = LayerInterface::new(50);
        let output = LayerInterface::new(1).with_dropout(0.5);
        let mut params = LayerParameters::new(&input, &output, None, None).unwrap();
        if let LayerParameters::Feedforward(p) = &mut params {
            p.w.values.fill(1.0);
        }
        let mut layer = Layer::new(&params, &output).unwrap();
        let mut rng = StdRng::seed_from_u64(3);

        let y = layer
            .forward(&params, vec![DenseArray::ones((50, 1)).into()], Some(&mut rng))
            .unwrap();
        // each kept unit contributes 2
        let kept = y[[0, 0]] / 2.0;
        assert_eq!(kept.fract(), 0.0);
        assert!(kept > 0.0 && kept < 50.0);

        layer.output_mut().assign_errors(column(&[1.0])).unwrap();
        let errors = layer.backward(&params, true).unwrap();
        assert_eq!(errors.inputs[0].sum(), y[[0, 0]]);
    }

    #[test]
    fn test_recurrent_parameters_are_rejected() {
        let output = LayerInterface::new(2).with_connection(LayerType::GRU);
        let params = LayerParameters::new(&LayerInterface::new(2), &output, None, None).unwrap();
        assert!(Layer::new(&params, &output).is_err());
    }
}
