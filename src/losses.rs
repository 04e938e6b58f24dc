//! Loss functions.
//!
//! A loss calculator compares an output with its gold standard and returns both
//! the elementwise loss and the errors (gradients of the loss with respect to
//! the output) that start the backward pass.
//!
//! # Available Loss Functions
//!
//! - **MSE**: [`MseCalculator`]
//! - **Softmax Cross-Entropy**: [`SoftmaxCrossEntropyCalculator`], for softmax
//!   outputs, with the softmax Jacobian already folded into the errors
//! - **Cross-Entropy**: [`CrossEntropyCalculator`], for probability outputs
//! - **Hinge**: [`HingeLossCalculator`], for ±1 labels

use crate::arrays::{check_shape, DenseArray};
use crate::error::{DnnError, Result};

/// Smallest probability passed to `ln`.
const MIN_PROB: f64 = 1e-12;

pub trait LossCalculator {
    /// Elementwise loss.
    fn loss(&self, output: &DenseArray, gold: &DenseArray) -> Result<DenseArray>;

    /// Gradients of the loss with respect to `output`.
    fn errors(&self, output: &DenseArray, gold: &DenseArray) -> Result<DenseArray>;

    /// Sum of the elementwise loss.
    fn total_loss(&self, output: &DenseArray, gold: &DenseArray) -> Result<f64> {
        Ok(self.loss(output, gold)?.sum())
    }

    fn loss_sequence(&self, outputs: &[DenseArray], golds: &[DenseArray]) -> Result<Vec<DenseArray>> {
        check_lengths(outputs, golds)?;
        outputs.iter().zip(golds).map(|(o, g)| self.loss(o, g)).collect()
    }

    fn errors_sequence(&self, outputs: &[DenseArray], golds: &[DenseArray]) -> Result<Vec<DenseArray>> {
        check_lengths(outputs, golds)?;
        outputs.iter().zip(golds).map(|(o, g)| self.errors(o, g)).collect()
    }
}

fn check_lengths(outputs: &[DenseArray], golds: &[DenseArray]) -> Result<()> {
    if outputs.len() != golds.len() {
        return Err(DnnError::ShapeMismatch {
            op: "loss sequence length",
            expected: (outputs.len(), 1),
            actual: (golds.len(), 1),
        });
    }
    Ok(())
}

/// Mean squared error: `loss = 0.5 * (y - g)²`, `errors = y - g`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MseCalculator;

impl LossCalculator for MseCalculator {
    fn loss(&self, output: &DenseArray, gold: &DenseArray) -> Result<DenseArray> {
        check_shape("MseCalculator::loss", output.dim(), gold.dim())?;
        Ok((output - gold).mapv(|d| 0.5 * d * d))
    }

    fn errors(&self, output: &DenseArray, gold: &DenseArray) -> Result<DenseArray> {
        check_shape("MseCalculator::errors", output.dim(), gold.dim())?;
        Ok(output - gold)
    }
}

/// Cross-entropy on a softmax output.
///
/// The errors `y - g` are the gradients with respect to the values *before*
/// the softmax, so the output layer must not differentiate its softmax again:
/// see `FeedforwardNeuralProcessor::backward_from_logits`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SoftmaxCrossEntropyCalculator;

impl LossCalculator for SoftmaxCrossEntropyCalculator {
    fn loss(&self, output: &DenseArray, gold: &DenseArray) -> Result<DenseArray> {
        check_shape("SoftmaxCrossEntropyCalculator::loss", output.dim(), gold.dim())?;
        Ok(cross_entropy(output, gold))
    }

    fn errors(&self, output: &DenseArray, gold: &DenseArray) -> Result<DenseArray> {
        check_shape("SoftmaxCrossEntropyCalculator::errors", output.dim(), gold.dim())?;
        Ok(output - gold)
    }
}

/// Cross-entropy on a probability output: `loss = -g ln y`, `errors = -g / y`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CrossEntropyCalculator;

impl LossCalculator for CrossEntropyCalculator {
    fn loss(&self, output: &DenseArray, gold: &DenseArray) -> Result<DenseArray> {
        check_shape("CrossEntropyCalculator::loss", output.dim(), gold.dim())?;
        Ok(cross_entropy(output, gold))
    }

    fn errors(&self, output: &DenseArray, gold: &DenseArray) -> Result<DenseArray> {
        check_shape("CrossEntropyCalculator::errors", output.dim(), gold.dim())?;
        let mut errors = gold.clone();
        ndarray::Zip::from(&mut errors)
            .and(output)
            .for_each(|e, &y| *e = -*e / y.max(MIN_PROB));
        Ok(errors)
    }
}

/// Hinge loss for labels in `{-1, 1}`: `loss = max(0, 1 - g y)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct HingeLossCalculator;

impl LossCalculator for HingeLossCalculator {
    fn loss(&self, output: &DenseArray, gold: &DenseArray) -> Result<DenseArray> {
        check_shape("HingeLossCalculator::loss", output.dim(), gold.dim())?;
        let mut loss = output * gold;
        loss.mapv_inplace(|m| (1.0 - m).max(0.0));
        Ok(loss)
    }

    fn errors(&self, output: &DenseArray, gold: &DenseArray) -> Result<DenseArray> {
        check_shape("HingeLossCalculator::errors", output.dim(), gold.dim())?;
        let mut errors = gold.clone();
        ndarray::Zip::from(&mut errors)
            .and(output)
            .for_each(|e, &y| *e = if *e * y < 1.0 { -*e } else { 0.0 });
        Ok(errors)
    }
}

fn cross_entropy(output: &DenseArray, gold: &DenseArray) -> DenseArray {
    let mut loss = gold.clone();
    ndarray::Zip::from(&mut loss)
        .and(output)
        .for_each(|l, &y| *l = -*l * y.max(MIN_PROB).ln());
    loss
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arrays::column;

    #[test]
    fn test_mse() {
        let y = column(&[1.0, 2.0]);
        let g = column(&[0.0, 2.0]);
        assert_eq!(MseCalculator.loss(&y, &g).unwrap(), column(&[0.5, 0.0]));
        assert_eq!(MseCalculator.errors(&y, &g).unwrap(), column(&[1.0, 0.0]));
    }

    #[test]
    fn test_cross_entropy_errors_match_finite_differences() {
        let y = column(&[0.2, 0.5, 0.3]);
        let g = column(&[0.0, 1.0, 0.0]);
        let errors = CrossEntropyCalculator.errors(&y, &g).unwrap();
        let eps = 1e-7;
        for i in 0..3 {
            let mut yp = y.clone();
            yp[[i, 0]] += eps;
            let mut ym = y.clone();
            ym[[i, 0]] -= eps;
            let numeric = (CrossEntropyCalculator.total_loss(&yp, &g).unwrap()
                - CrossEntropyCalculator.total_loss(&ym, &g).unwrap())
                / (2.0 * eps);
            assert!((numeric - errors[[i, 0]]).abs() < 1e-5);
        }
    }

    #[test]
    fn test_softmax_cross_entropy() {
        let y = column(&[0.25, 0.75]);
        let g = column(&[0.0, 1.0]);
        let loss = SoftmaxCrossEntropyCalculator.total_loss(&y, &g).unwrap();
        assert!((loss + 0.75f64.ln()).abs() < 1e-12);
        assert_eq!(SoftmaxCrossEntropyCalculator.errors(&y, &g).unwrap(), column(&[0.25, -0.25]));
    }

    #[test]
    fn test_hinge() {
        let y = column(&[0.5, 2.0]);
        let g = column(&[1.0, 1.0]);
        assert_eq!(HingeLossCalculator.loss(&y, &g).unwrap(), column(&[0.5, 0.0]));
        assert_eq!(HingeLossCalculator.errors(&y, &g).unwrap(), column(&[-1.0, 0.0]));
    }

    #[test]
    fn test_sequence_length_mismatch() {
        let y = vec![column(&[1.0])];
        assert!(MseCalculator.errors_sequence(&y, &[]).is_err());
        assert!(MseCalculator.loss(&column(&[1.0]), &column(&[1.0, 2.0])).is_err());
    }
}
