//! Layer-wise relevance propagation (epsilon rule).
//!
//! Relevance is not a gradient: it redistributes an output score over the
//! inputs in proportion to their contributions `x_j · W_kj` to each
//! pre-activation `z_k`.

use crate::arrays::{check_shape, DenseArray};
use crate::error::Result;

/// Default stabilizer of the epsilon rule.
pub const DEFAULT_EPSILON: f64 = 0.01;

/// `R_j = Σ_k x_j W_kj / (z_k + ε·sign(z_k)) · R_k`
///
/// `z_k = 0` is stabilized as if it were positive.
pub fn epsilon_rule(
    x: &DenseArray,
    w: &DenseArray,
    z: &DenseArray,
    relevance: &DenseArray,
    epsilon: f64,
) -> Result<DenseArray> {
    let (out_size, in_size) = w.dim();
    check_shape("relevance input", (in_size, 1), x.dim())?;
    check_shape("relevance pre-activation", (out_size, 1), z.dim())?;
    check_shape("relevance output", (out_size, 1), relevance.dim())?;

    let mut ratio = relevance.clone();
    ratio.zip_mut_with(z, |r, &z| {
        let stabilizer = if z >= 0.0 { epsilon } else { -epsilon };
        *r /= z + stabilizer;
    });
    Ok(x * &w.t().dot(&ratio))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arrays::column;
    use ndarray::array;

    #[test]
    fn test_relevance_is_conserved_without_bias() {
        let x = column(&[1.0, 2.0, 1.0]);
        let w = array![[0.5, 0.3, 0.1], [-0.2, 0.4, 0.6]];
        let z = w.dot(&x);
        let r_out = column(&[1.0, 2.0]);

        let r_in = epsilon_rule(&x, &w, &z, &r_out, 1e-9).unwrap();
        assert!((r_in.sum() - r_out.sum()).abs() < 1e-6);
    }

    #[test]
    fn test_epsilon_absorbs_relevance() {
        let x = column(&[1.0]);
        let w = array![[1.0]];
        let z = column(&[1.0]);
        let r = epsilon_rule(&x, &w, &z, &column(&[1.0]), 1.0).unwrap();
        assert!((r[[0, 0]] - 0.5).abs() < 1e-12);
    }
}
