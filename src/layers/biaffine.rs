//! Biaffine layer over two inputs.
//!
//! `y_k = f(x1ᵀ A_k x2 + (W1 x1 + W2 x2 + b)_k)`

use super::LayerErrors;
use crate::arrays::{check_shape, outer, AugmentedArray, DenseArray, ParamsArray, ParamsErrors};
use crate::error::{DnnError, Result};
use crate::functions::ActivationFunction;
use crate::initializers::Initializer;

#[derive(Debug, Clone)]
pub struct BiaffineParameters {
    /// `output x input1`
    pub w1: ParamsArray,
    /// `output x input2`
    pub w2: ParamsArray,
    pub b: ParamsArray,
    /// One `input1 x input2` matrix per output unit.
    pub a: Vec<ParamsArray>,
}

impl BiaffineParameters {
    pub fn new(
        input1_size: usize,
        input2_size: usize,
        output_size: usize,
        weights_init: Option<&dyn Initializer>,
        bias_init: Option<&dyn Initializer>,
    ) -> Self {
        Self {
            w1: ParamsArray::initialized((output_size, input1_size), weights_init),
            w2: ParamsArray::initialized((output_size, input2_size), weights_init),
            b: ParamsArray::initialized((output_size, 1), bias_init),
            a: (0..output_size)
                .map(|_| ParamsArray::initialized((input1_size, input2_size), weights_init))
                .collect(),
        }
    }

    pub fn output_size(&self) -> usize {
        self.b.shape().0
    }

    pub fn params(&self) -> Vec<&ParamsArray> {
        let mut params = vec![&self.w1, &self.w2, &self.b];
        params.extend(self.a.iter());
        params
    }

    pub fn params_mut(&mut self) -> Vec<&mut ParamsArray> {
        let mut params = vec![&mut self.w1, &mut self.w2, &mut self.b];
        params.extend(self.a.iter_mut());
        params
    }
}

#[derive(Debug, Clone)]
pub struct BiaffineLayer {
    x1: Option<DenseArray>,
    x2: Option<DenseArray>,
    output: AugmentedArray,
}

impl BiaffineLayer {
    pub fn new(output_size: usize, activation: Option<ActivationFunction>) -> Self {
        Self {
            x1: None,
            x2: None,
            output: AugmentedArray::new(output_size).with_activation(activation),
        }
    }

    pub fn output(&self) -> &AugmentedArray {
        &self.output
    }

    pub fn output_mut(&mut self) -> &mut AugmentedArray {
        &mut self.output
    }

    pub fn forward(&mut self, params: &BiaffineParameters, x1: DenseArray, x2: DenseArray) -> Result<&DenseArray> {
        check_shape("Biaffine input 1", (params.w1.shape().1, 1), x1.dim())?;
        check_shape("Biaffine input 2", (params.w2.shape().1, 1), x2.dim())?;

        let mut z = params.w1.values.dot(&x1) + params.w2.values.dot(&x2) + &params.b.values;
        for (k, a) in params.a.iter().enumerate() {
            z[[k, 0]] += x1.t().dot(&a.values.dot(&x2))[[0, 0]];
        }
        self.output.assign_and_activate(z)?;
        self.x1 = Some(x1);
        self.x2 = Some(x2);
        Ok(self.output.values())
    }

    pub fn backward(&mut self, params: &BiaffineParameters, propagate_to_input: bool) -> Result<LayerErrors> {
        let (x1, x2) = match (&self.x1, &self.x2) {
            (Some(x1), Some(x2)) => (x1, x2),
            _ => return Err(DnnError::MissingValues("BiaffineLayer inputs")),
        };
        let gz = self.output.errors_not_activated()?;

        let mut params_errors = ParamsErrors::new();
        params_errors.push_dense(&params.w1, outer(&gz, x1));
        params_errors.push_dense(&params.w2, outer(&gz, x2));
        params_errors.push_dense(&params.b, gz.clone());
        let x1_x2 = outer(x1, x2);
        for (k, a) in params.a.iter().enumerate() {
            params_errors.push_dense(a, &x1_x2 * gz[[k, 0]]);
        }

        let inputs = if propagate_to_input {
            let mut gx1 = params.w1.values.t().dot(&gz);
            let mut gx2 = params.w2.values.t().dot(&gz);
            for (k, a) in params.a.iter().enumerate() {
                let g = gz[[k, 0]];
                gx1.scaled_add(g, &a.values.dot(x2));
                gx2.scaled_add(g, &a.values.t().dot(x1));
            }
            vec![gx1, gx2]
        } else {
            Vec::new()
        };
        Ok(LayerErrors {
            inputs,
            params: params_errors,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arrays::column;
    use ndarray::array;

    #[test]
    fn test_bilinear_term() {
        let mut p = BiaffineParameters::new(2, 2, 1, None, None);
        p.a[0].values = array![[1.0, 0.0], [0.0, 2.0]];
        let mut layer = BiaffineLayer::new(1, None);
        let y = layer
            .forward(&p, column(&[1.0, 3.0]), column(&[2.0, 1.0]))
            .unwrap();
        // 1·1·2 + 3·2·1
        assert_eq!(y, &array![[8.0]]);
    }
}
