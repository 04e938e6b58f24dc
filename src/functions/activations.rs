//! Activation functions and their derivatives.
//!
//! Scalar functions are applied elementwise. Their derivative can be computed in
//! two ways:
//!
//! - [`ActivationFunction::df`] evaluates the closed-form derivative from the input `x`;
//! - [`ActivationFunction::df_from_output`] reuses the already computed output
//!   `f(x)` where a closed form in terms of the output exists (sigmoid, tanh,
//!   softsign, ELU, ...), which is what layers call during backward.
//!
//! `Softmax` and `LogSoftmax` are not scalar: they act on each column as a whole
//! and their derivative is a Jacobian matrix.

use crate::arrays::DenseArray;
use crate::error::{ensure_hyper, DnnError, Result};
use serde::{Deserialize, Serialize};

const SELU_SCALE: f64 = 1.050_700_987_355_480_5;
const SELU_ALPHA: f64 = 1.673_263_242_354_377_3;
const GELU_K: f64 = 0.797_884_560_802_865_4; // sqrt(2/π)
const GELU_C: f64 = 0.044_715;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ActivationFunction {
    Sigmoid,
    Tanh,
    ReLU,
    LeakyReLU { slope: f64 },
    ELU { alpha: f64 },
    SELU,
    Softsign,
    Softplus { beta: f64, threshold: f64 },
    HardSigmoid,
    HardTanh,
    /// Tanh approximation of the Gaussian error linear unit.
    GeLU,
    CELU { alpha: f64 },
    Sine,
    Softmax,
    LogSoftmax,
}

impl ActivationFunction {
    /// Checks the parameters of the parameterized variants.
    pub fn validate(&self) -> Result<()> {
        match *self {
            Self::LeakyReLU { slope } => {
                ensure_hyper(slope.is_finite(), "LeakyReLU.slope", format!("must be finite, got {}", slope))
            }
            Self::ELU { alpha } => ensure_hyper(
                alpha.is_finite() && alpha >= 0.0,
                "ELU.alpha",
                format!("must be >= 0, got {}", alpha),
            ),
            Self::Softplus { beta, threshold } => {
                ensure_hyper(beta.is_finite() && beta > 0.0, "Softplus.beta", format!("must be > 0, got {}", beta))?;
                ensure_hyper(
                    threshold.is_finite(),
                    "Softplus.threshold",
                    format!("must be finite, got {}", threshold),
                )
            }
            // α стоит в знаменателе
            Self::CELU { alpha } => ensure_hyper(
                alpha.is_finite() && alpha > 0.0,
                "CELU.alpha",
                format!("must be > 0, got {}", alpha),
            ),
            _ => Ok(()),
        }
    }

    /// Whether the function is applied elementwise.
    pub fn is_scalar(&self) -> bool {
        !matches!(self, Self::Softmax | Self::LogSoftmax)
    }

    /// Applies the function.
    pub fn f(&self, x: &DenseArray) -> DenseArray {
        match self {
            Self::Softmax => softmax_columns(x),
            Self::LogSoftmax => log_softmax_columns(x),
            _ => x.mapv(|v| self.f_scalar(v)),
        }
    }

    /// Closed-form derivative from the input.
    ///
    /// Elementwise for scalar functions; for `Softmax` and `LogSoftmax` the input
    /// must be a column vector and the result is the Jacobian `J[i][j] = ∂y_i/∂x_j`.
    pub fn df(&self, x: &DenseArray) -> Result<DenseArray> {
        if self.is_scalar() {
            Ok(x.mapv(|v| self.df_scalar(v)))
        } else {
            self.jacobian(&self.f(x))
        }
    }

    /// Derivative computed from the output `fx = f(x)` where possible.
    pub fn df_from_output(&self, x: &DenseArray, fx: &DenseArray) -> Result<DenseArray> {
        if !self.is_scalar() {
            return self.jacobian(fx);
        }
        if x.dim() != fx.dim() {
            return Err(DnnError::ShapeMismatch {
                op: "ActivationFunction::df_from_output",
                expected: x.dim(),
                actual: fx.dim(),
            });
        }
        let mut out = fx.clone();
        ndarray::Zip::from(&mut out)
            .and(x)
            .and(fx)
            .for_each(|o, &xv, &yv| *o = self.df_scalar_from_output(xv, yv));
        Ok(out)
    }

    /// Propagates the output errors `gy` back through the function.
    pub fn backward(&self, x: &DenseArray, fx: &DenseArray, gy: &DenseArray) -> Result<DenseArray> {
        if gy.dim() != fx.dim() {
            return Err(DnnError::ShapeMismatch {
                op: "ActivationFunction::backward",
                expected: fx.dim(),
                actual: gy.dim(),
            });
        }
        match self {
            Self::Softmax => {
                let mut gx = gy.clone();
                for ((mut g, y), e) in gx.columns_mut().into_iter().zip(fx.columns()).zip(gy.columns()) {
                    let dot = y.dot(&e);
                    g.zip_mut_with(&y, |gv, &yv| *gv = yv * (*gv - dot));
                }
                Ok(gx)
            }
            Self::LogSoftmax => {
                let mut gx = gy.clone();
                for ((mut g, y), e) in gx.columns_mut().into_iter().zip(fx.columns()).zip(gy.columns()) {
                    let sum = e.sum();
                    g.zip_mut_with(&y, |gv, &yv| *gv -= yv.exp() * sum);
                }
                Ok(gx)
            }
            _ => Ok(self.df_from_output(x, fx)? * gy),
        }
    }

    fn jacobian(&self, fx: &DenseArray) -> Result<DenseArray> {
        if fx.ncols() != 1 {
            return Err(DnnError::ShapeMismatch {
                op: "ActivationFunction::jacobian",
                expected: (fx.nrows(), 1),
                actual: fx.dim(),
            });
        }
        let n = fx.nrows();
        let y = fx.column(0);
        let mut j = DenseArray::zeros((n, n));
        match self {
            Self::Softmax => {
                for r in 0..n {
                    for c in 0..n {
                        let delta = if r == c { y[r] } else { 0.0 };
                        j[[r, c]] = delta - y[r] * y[c];
                    }
                }
            }
            // y = log softmax(x): ∂y_i/∂x_j = δij - softmax_j
            _ => {
                for r in 0..n {
                    for c in 0..n {
                        let delta = if r == c { 1.0 } else { 0.0 };
                        j[[r, c]] = delta - y[c].exp();
                    }
                }
            }
        }
        Ok(j)
    }

    fn f_scalar(&self, x: f64) -> f64 {
        match *self {
            Self::Sigmoid => sigmoid(x),
            Self::Tanh => x.tanh(),
            Self::ReLU => x.max(0.0),
            Self::LeakyReLU { slope } => {
                if x > 0.0 {
                    x
                } else {
                    slope * x
                }
            }
            Self::ELU { alpha } => {
                if x > 0.0 {
                    x
                } else {
                    alpha * (x.exp() - 1.0)
                }
            }
            Self::SELU => {
                if x > 0.0 {
                    SELU_SCALE * x
                } else {
                    SELU_SCALE * SELU_ALPHA * (x.exp() - 1.0)
                }
            }
            Self::Softsign => x / (1.0 + x.abs()),
            Self::Softplus { beta, threshold } => {
                let bx = beta * x;
                if bx > threshold {
                    x
                } else {
                    bx.exp().ln_1p() / beta
                }
            }
            Self::HardSigmoid => (0.2 * x + 0.5).clamp(0.0, 1.0),
            Self::HardTanh => x.clamp(-1.0, 1.0),
            Self::GeLU => 0.5 * x * (1.0 + (GELU_K * (x + GELU_C * x.powi(3))).tanh()),
            Self::CELU { alpha } => x.max(0.0) + (alpha * ((x / alpha).exp() - 1.0)).min(0.0),
            Self::Sine => x.sin(),
            Self::Softmax | Self::LogSoftmax => x,
        }
    }

    fn df_scalar(&self, x: f64) -> f64 {
        match *self {
            Self::Sigmoid => {
                let s = sigmoid(x);
                s * (1.0 - s)
            }
            Self::Tanh => 1.0 - x.tanh().powi(2),
            Self::ReLU => step(x),
            Self::LeakyReLU { slope } => {
                if x > 0.0 {
                    1.0
                } else {
                    slope
                }
            }
            Self::ELU { alpha } => {
                if x > 0.0 {
                    1.0
                } else {
                    alpha * x.exp()
                }
            }
            Self::SELU => {
                if x > 0.0 {
                    SELU_SCALE
                } else {
                    SELU_SCALE * SELU_ALPHA * x.exp()
                }
            }
            Self::Softsign => 1.0 / (1.0 + x.abs()).powi(2),
            Self::Softplus { beta, threshold } => {
                if beta * x > threshold {
                    1.0
                } else {
                    sigmoid(beta * x)
                }
            }
            Self::HardSigmoid => {
                if x.abs() < 2.5 {
                    0.2
                } else {
                    0.0
                }
            }
            Self::HardTanh => {
                if x.abs() < 1.0 {
                    1.0
                } else {
                    0.0
                }
            }
            Self::GeLU => {
                let inner = GELU_K * (x + GELU_C * x.powi(3));
                let t = inner.tanh();
                0.5 * (1.0 + t) + 0.5 * x * (1.0 - t * t) * GELU_K * (1.0 + 3.0 * GELU_C * x * x)
            }
            Self::CELU { alpha } => {
                if x > 0.0 {
                    1.0
                } else {
                    (x / alpha).exp()
                }
            }
            Self::Sine => x.cos(),
            Self::Softmax | Self::LogSoftmax => 1.0,
        }
    }

    fn df_scalar_from_output(&self, x: f64, y: f64) -> f64 {
        match *self {
            Self::Sigmoid => y * (1.0 - y),
            Self::Tanh => 1.0 - y * y,
            Self::ReLU => step(y),
            Self::ELU { alpha } => {
                if x > 0.0 {
                    1.0
                } else {
                    y + alpha
                }
            }
            Self::SELU => {
                if x > 0.0 {
                    SELU_SCALE
                } else {
                    y + SELU_SCALE * SELU_ALPHA
                }
            }
            Self::Softsign => (1.0 - y.abs()).powi(2),
            Self::Softplus { beta, threshold } => {
                if beta * x > threshold {
                    1.0
                } else {
                    1.0 - (-beta * y).exp()
                }
            }
            Self::HardSigmoid => {
                if y > 0.0 && y < 1.0 {
                    0.2
                } else {
                    0.0
                }
            }
            Self::HardTanh => {
                if y.abs() < 1.0 {
                    1.0
                } else {
                    0.0
                }
            }
            Self::CELU { alpha } => {
                if x > 0.0 {
                    1.0
                } else {
                    y / alpha + 1.0
                }
            }
            // no closed form in terms of the output
            _ => self.df_scalar(x),
        }
    }
}

pub(crate) fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

fn step(x: f64) -> f64 {
    if x > 0.0 {
        1.0
    } else {
        0.0
    }
}

fn softmax_columns(x: &DenseArray) -> DenseArray {
    let mut out = x.clone();
    for mut col in out.columns_mut() {
        let max = col.iter().fold(f64::NEG_INFINITY, |m, &v| m.max(v));
        col.mapv_inplace(|v| (v - max).exp());
        let sum = col.sum();
        col.mapv_inplace(|v| v / sum);
    }
    out
}

fn log_softmax_columns(x: &DenseArray) -> DenseArray {
    let mut out = x.clone();
    for mut col in out.columns_mut() {
        let max = col.iter().fold(f64::NEG_INFINITY, |m, &v| m.max(v));
        let log_sum = col.iter().map(|&v| (v - max).exp()).sum::<f64>().ln() + max;
        col.mapv_inplace(|v| v - log_sum);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arrays::column;

    const SCALARS: [ActivationFunction; 13] = [
        ActivationFunction::Sigmoid,
        ActivationFunction::Tanh,
        ActivationFunction::ReLU,
        ActivationFunction::LeakyReLU { slope: 0.1 },
        ActivationFunction::ELU { alpha: 1.2 },
        ActivationFunction::SELU,
        ActivationFunction::Softsign,
        ActivationFunction::Softplus { beta: 1.5, threshold: 20.0 },
        ActivationFunction::HardSigmoid,
        ActivationFunction::HardTanh,
        ActivationFunction::GeLU,
        ActivationFunction::CELU { alpha: 0.8 },
        ActivationFunction::Sine,
    ];

    // points away from the kinks of the piecewise functions
    fn sample() -> DenseArray {
        column(&[-3.1, -1.7, -0.6, -0.2, 0.3, 0.7, 1.4, 2.9])
    }

    #[test]
    fn test_optimized_derivative_matches_closed_form() {
        let x = sample();
        for f in SCALARS {
            let fx = f.f(&x);
            let closed = f.df(&x).unwrap();
            let optimized = f.df_from_output(&x, &fx).unwrap();
            for (a, b) in closed.iter().zip(optimized.iter()) {
                assert!((a - b).abs() < 1e-9, "{:?}: {} vs {}", f, a, b);
            }
        }
    }

    #[test]
    fn test_derivative_matches_finite_differences() {
        let x = sample();
        let eps = 1e-6;
        for f in SCALARS {
            let d = f.df(&x).unwrap();
            for (i, &xv) in x.iter().enumerate() {
                let plus = f.f(&column(&[xv + eps]))[[0, 0]];
                let minus = f.f(&column(&[xv - eps]))[[0, 0]];
                let numeric = (plus - minus) / (2.0 * eps);
                assert!((numeric - d[[i, 0]]).abs() < 1e-5, "{:?} at {}", f, xv);
            }
        }
    }

    #[test]
    fn test_softmax_sums_to_one_and_jacobian() {
        let x = column(&[0.5, -1.0, 2.0]);
        let f = ActivationFunction::Softmax;
        let y = f.f(&x);
        assert!((y.sum() - 1.0).abs() < 1e-12);

        let j = f.df(&x).unwrap();
        let eps = 1e-6;
        for c in 0..3 {
            let mut xp = x.clone();
            xp[[c, 0]] += eps;
            let mut xm = x.clone();
            xm[[c, 0]] -= eps;
            let diff = (f.f(&xp) - f.f(&xm)) / (2.0 * eps);
            for r in 0..3 {
                assert!((diff[[r, 0]] - j[[r, c]]).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn test_non_scalar_backward_matches_jacobian() {
        let x = column(&[0.1, 0.4, -0.3, 1.1]);
        let gy = column(&[0.2, -0.5, 0.7, 0.1]);
        for f in [ActivationFunction::Softmax, ActivationFunction::LogSoftmax] {
            let y = f.f(&x);
            let j = f.df(&x).unwrap();
            let expected = j.t().dot(&gy);
            let gx = f.backward(&x, &y, &gy).unwrap();
            for (a, b) in gx.iter().zip(expected.iter()) {
                assert!((a - b).abs() < 1e-12, "{:?}", f);
            }
        }
    }

    #[test]
    fn test_jacobian_requires_column_vector() {
        let x = DenseArray::zeros((2, 2));
        assert!(ActivationFunction::Softmax.df(&x).is_err());
    }

    #[test]
    fn test_validate_parameters() {
        for f in SCALARS {
            assert!(f.validate().is_ok(), "{:?}", f);
        }
        for f in [
            ActivationFunction::Softplus { beta: 0.0, threshold: 20.0 },
            ActivationFunction::Softplus { beta: 1.0, threshold: f64::NAN },
            ActivationFunction::CELU { alpha: 0.0 },
            ActivationFunction::ELU { alpha: -1.0 },
            ActivationFunction::LeakyReLU { slope: f64::INFINITY },
        ] {
            assert!(
                matches!(f.validate(), Err(DnnError::InvalidHyperParameter { .. })),
                "{:?}",
                f
            );
        }
    }

    #[test]
    fn test_serde_round_trip_of_parameterized_variant() {
        let f = ActivationFunction::ELU { alpha: 0.5 };
        let json = serde_json::to_string(&f).unwrap();
        let back: ActivationFunction = serde_json::from_str(&json).unwrap();
        assert_eq!(f, back);
    }
}
