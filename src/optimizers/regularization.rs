//! Parameter regularization and gradient clipping.

use crate::arrays::{column, norm, sign, DenseArray, Gradient, NormType, SparseArray};
use crate::error::{ensure_hyper, Result};
use serde::{Deserialize, Serialize};

/// Regularization applied to the parameter values before each update.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ParamsRegularization {
    /// `w -= λ · sign(w)`
    L1 { lambda: f64 },
    /// `w -= λ · w`
    L2 { lambda: f64 },
    /// Rescales `w` so that its L2 norm is at most `max_norm`.
    MaxNorm { max_norm: f64 },
}

impl ParamsRegularization {
    pub fn validate(&self) -> Result<()> {
        match *self {
            ParamsRegularization::L1 { lambda } | ParamsRegularization::L2 { lambda } => ensure_hyper(
                lambda.is_finite() && lambda >= 0.0,
                "lambda",
                format!("must be >= 0, got {}", lambda),
            ),
            ParamsRegularization::MaxNorm { max_norm } => ensure_hyper(
                max_norm.is_finite() && max_norm > 0.0,
                "max_norm",
                format!("must be > 0, got {}", max_norm),
            ),
        }
    }

    /// Regularizes only the entries touched by a sparse gradient. `MaxNorm`
    /// rescales each column that has an active entry.
    pub fn apply_sparse(&self, values: &mut DenseArray, active: &SparseArray) {
        match *self {
            ParamsRegularization::L1 { lambda } => {
                for (r, c) in active.active_indices() {
                    let w = values[[r, c]];
                    let s = if w > 0.0 {
                        1.0
                    } else if w < 0.0 {
                        -1.0
                    } else {
                        0.0
                    };
                    values[[r, c]] = w - lambda * s;
                }
            }
            ParamsRegularization::L2 { lambda } => {
                for (r, c) in active.active_indices() {
                    values[[r, c]] -= lambda * values[[r, c]];
                }
            }
            ParamsRegularization::MaxNorm { max_norm } => {
                let mut columns: Vec<usize> = active.active_indices().map(|(_, c)| c).collect();
                columns.sort_unstable();
                columns.dedup();
                for c in columns {
                    let mut column = values.column_mut(c);
                    let n = column.dot(&column).sqrt();
                    if n > max_norm {
                        column *= max_norm / n;
                    }
                }
            }
        }
    }

    pub fn apply(&self, values: &mut DenseArray) {
        match *self {
            ParamsRegularization::L1 { lambda } => {
                let s = sign(values);
                values.scaled_add(-lambda, &s);
            }
            ParamsRegularization::L2 { lambda } => {
                values.mapv_inplace(|w| w - lambda * w);
            }
            ParamsRegularization::MaxNorm { max_norm } => {
                let n = norm(values, NormType::L2);
                if n > max_norm {
                    let k = max_norm / n;
                    values.mapv_inplace(|w| w * k);
                }
            }
        }
    }
}

/// Clipping applied to the gradient before it is optimized.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum GradientClipping {
    /// Clamps each entry in `[-clip, clip]`.
    Value { clip: f64 },
    /// Rescales the gradient when its norm exceeds `max_norm`.
    Norm { max_norm: f64, norm_type: NormType },
}

impl GradientClipping {
    pub fn validate(&self) -> Result<()> {
        match *self {
            GradientClipping::Value { clip } => {
                ensure_hyper(clip.is_finite() && clip > 0.0, "clip", format!("must be > 0, got {}", clip))
            }
            GradientClipping::Norm { max_norm, .. } => ensure_hyper(
                max_norm.is_finite() && max_norm > 0.0,
                "max_norm",
                format!("must be > 0, got {}", max_norm),
            ),
        }
    }

    pub fn clip(&self, gradient: &Gradient) -> Gradient {
        match *self {
            GradientClipping::Value { clip } => match gradient {
                Gradient::Dense(d) => Gradient::Dense(d.mapv(|g| g.clamp(-clip, clip))),
                Gradient::Sparse(s) => Gradient::Sparse(s.map_values(|g| g.clamp(-clip, clip))),
            },
            GradientClipping::Norm { max_norm, norm_type } => {
                let n = match gradient {
                    Gradient::Dense(d) => norm(d, norm_type),
                    // the norm of a sparse array only depends on its active entries
                    Gradient::Sparse(s) => {
                        let active: Vec<f64> = s.iter().map(|(_, v)| v).collect();
                        norm(&column(&active), norm_type)
                    }
                };
                let mut clipped = gradient.clone();
                if n > max_norm {
                    clipped.assign_prod(max_norm / n);
                }
                clipped
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arrays::SparseArray;
    use ndarray::array;

    #[test]
    fn test_regularizations() {
        let mut w = array![[2.0, -1.0, 0.0]];
        ParamsRegularization::L1 { lambda: 0.5 }.apply(&mut w);
        assert_eq!(w, array![[1.5, -0.5, 0.0]]);

        let mut w = array![[2.0, -1.0]];
        ParamsRegularization::L2 { lambda: 0.1 }.apply(&mut w);
        assert_eq!(w, array![[1.8, -0.9]]);

        let mut w = array![[3.0, 4.0]];
        ParamsRegularization::MaxNorm { max_norm: 1.0 }.apply(&mut w);
        assert!((norm(&w, NormType::L2) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_clip_value_and_norm() {
        let g = Gradient::Dense(array![[3.0, -4.0]]);
        let clipped = GradientClipping::Value { clip: 1.0 }.clip(&g);
        assert_eq!(clipped.to_dense(), array![[1.0, -1.0]]);

        let clipped = GradientClipping::Norm { max_norm: 1.0, norm_type: NormType::L2 }.clip(&g);
        let d = clipped.to_dense();
        assert!((d[[0, 0]] - 0.6).abs() < 1e-12 && (d[[0, 1]] + 0.8).abs() < 1e-12);

        let unchanged = GradientClipping::Norm { max_norm: 10.0, norm_type: NormType::L2 }.clip(&g);
        assert_eq!(unchanged, g);
    }

    #[test]
    fn test_sparse_regularization_touches_active_entries() {
        let active = SparseArray::from_entries((2, 2), vec![((0, 0), 1.0)]).unwrap();

        let mut w = array![[1.0, 1.0], [1.0, 1.0]];
        ParamsRegularization::L2 { lambda: 0.5 }.apply_sparse(&mut w, &active);
        assert_eq!(w, array![[0.5, 1.0], [1.0, 1.0]]);

        let mut w = array![[-2.0, 1.0], [0.0, 1.0]];
        ParamsRegularization::L1 { lambda: 0.5 }.apply_sparse(&mut w, &active);
        assert_eq!(w, array![[-1.5, 1.0], [0.0, 1.0]]);

        // only column 0 is rescaled
        let mut w = array![[3.0, 3.0], [4.0, 4.0]];
        ParamsRegularization::MaxNorm { max_norm: 1.0 }.apply_sparse(&mut w, &active);
        assert!((w[[0, 0]] - 0.6).abs() < 1e-12 && (w[[1, 0]] - 0.8).abs() < 1e-12);
        assert_eq!(w.column(1).to_vec(), vec![3.0, 4.0]);
    }

    #[test]
    fn test_invalid_settings() {
        assert!(GradientClipping::Value { clip: -1.0 }.validate().is_err());
        assert!(GradientClipping::Value { clip: f64::NAN }.validate().is_err());
        assert!(GradientClipping::Norm { max_norm: 0.0, norm_type: NormType::L2 }.validate().is_err());
        assert!(ParamsRegularization::L2 { lambda: -0.1 }.validate().is_err());
        assert!(ParamsRegularization::MaxNorm { max_norm: 0.0 }.validate().is_err());
        assert!(ParamsRegularization::L1 { lambda: 0.0 }.validate().is_ok());
    }

    #[test]
    fn test_clip_sparse_keeps_sparsity() {
        let s = SparseArray::from_entries((3, 3), vec![((0, 0), 3.0), ((2, 1), 4.0)]).unwrap();
        let clipped = GradientClipping::Norm { max_norm: 1.0, norm_type: NormType::L2 }
            .clip(&Gradient::Sparse(s));
        assert!(clipped.is_sparse());
        assert!((clipped.to_dense()[[2, 1]] - 0.8).abs() < 1e-12);
    }
}
