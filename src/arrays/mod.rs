//! Numeric arrays used by layers and update methods.
//!
//! Dense arrays are plain `ndarray::Array2<f64>` matrices: vectors are column
//! arrays with shape `n x 1`. This module adds the handful of helpers the layers
//! need on top of `ndarray` (outer products, vertical concatenation, norms,
//! masks), while the submodules define the sparse representations and the
//! arrays that carry layer state and trainable parameters.

pub mod augmented;
pub mod params;
pub mod sparse;

pub use augmented::AugmentedArray;
pub use params::{Gradient, ParamsArray, ParamsError, ParamsErrors, ParamsId};
pub use sparse::{SparseArray, SparseBinaryArray};

use crate::error::{DnnError, Result};
use ndarray::{concatenate, s, Array1, Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

/// Dense `rows x columns` matrix.
pub type DenseArray = Array2<f64>;

/// `(rows, columns)` pair.
pub type Shape = (usize, usize);

/// Fails with `ShapeMismatch` when `actual != expected`.
pub fn check_shape(op: &'static str, expected: Shape, actual: Shape) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(DnnError::ShapeMismatch {
            op,
            expected,
            actual,
        })
    }
}

/// Column vector with the given values.
pub fn column(values: &[f64]) -> DenseArray {
    Array1::from_vec(values.to_vec()).insert_axis(Axis(1))
}

/// Outer product `a · bᵀ` of two column vectors.
pub fn outer(a: &DenseArray, b: &DenseArray) -> DenseArray {
    a.dot(&b.t())
}

/// Stacks column vectors (or matrices with the same number of columns) vertically.
pub fn concat_v(arrays: &[&DenseArray]) -> Result<DenseArray> {
    let cols = arrays.first().map(|a| a.ncols()).unwrap_or(1);
    for a in arrays {
        check_shape("concat_v", (a.nrows(), cols), a.dim())?;
    }
    let views: Vec<ArrayView2<f64>> = arrays.iter().map(|a| a.view()).collect();
    concatenate(Axis(0), &views).map_err(|_| DnnError::ShapeMismatch {
        op: "concat_v",
        expected: (0, cols),
        actual: (0, 0),
    })
}

/// Splits `a` into consecutive vertical blocks of the given row counts.
pub fn split_v(a: &DenseArray, sizes: &[usize]) -> Result<Vec<DenseArray>> {
    let total: usize = sizes.iter().sum();
    check_shape("split_v", (total, a.ncols()), a.dim())?;

    let mut offset = 0;
    let mut parts = Vec::with_capacity(sizes.len());
    for &size in sizes {
        parts.push(a.slice(s![offset..offset + size, ..]).to_owned());
        offset += size;
    }
    Ok(parts)
}

/// Elementwise sign: `-1`, `0` or `1`.
pub fn sign(a: &DenseArray) -> DenseArray {
    a.mapv(|x| {
        if x > 0.0 {
            1.0
        } else if x < 0.0 {
            -1.0
        } else {
            0.0
        }
    })
}

/// Norms used by gradient clipping and max-norm regularization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NormType {
    L1,
    L2,
    Infinity,
}

pub fn norm(a: &DenseArray, norm_type: NormType) -> f64 {
    match norm_type {
        NormType::L1 => a.iter().map(|x| x.abs()).sum(),
        NormType::L2 => a.iter().map(|x| x * x).sum::<f64>().sqrt(),
        NormType::Infinity => a.iter().fold(0.0, |m, x| m.max(x.abs())),
    }
}

/// Multiplies `a` by a mask of the same shape.
pub fn mask(a: &DenseArray, mask: &DenseArray) -> Result<DenseArray> {
    check_shape("mask", a.dim(), mask.dim())?;
    Ok(a * mask)
}

/// Flattens a matrix row by row into a column vector.
pub fn vectorize(a: &DenseArray) -> DenseArray {
    let values: Vec<f64> = a.iter().copied().collect();
    column(&values)
}

/// Inverse of [`vectorize`]: rebuilds a `rows x cols` matrix from a column vector.
pub fn unvectorize(v: &DenseArray, rows: usize, cols: usize) -> Result<DenseArray> {
    check_shape("unvectorize", (rows * cols, 1), v.dim())?;
    let values: Vec<f64> = v.iter().copied().collect();
    Array2::from_shape_vec((rows, cols), values).map_err(|_| DnnError::ShapeMismatch {
        op: "unvectorize",
        expected: (rows * cols, 1),
        actual: v.dim(),
    })
}

/// Sum of all the elements of a slice of arrays with the same shape.
pub fn sum_all(arrays: &[DenseArray]) -> Result<DenseArray> {
    let first = arrays.first().ok_or(DnnError::EmptySequence("sum_all"))?;
    let mut acc = first.clone();
    for a in &arrays[1..] {
        check_shape("sum_all", acc.dim(), a.dim())?;
        acc += a;
    }
    Ok(acc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_outer_and_split() {
        let a = column(&[1.0, 2.0]);
        let b = column(&[3.0, 4.0, 5.0]);
        let o = outer(&a, &b);
        assert_eq!(o, array![[3.0, 4.0, 5.0], [6.0, 8.0, 10.0]]);

        let c = concat_v(&[&a, &b]).unwrap();
        assert_eq!(c.dim(), (5, 1));
        let parts = split_v(&c, &[2, 3]).unwrap();
        assert_eq!(parts[0], a);
        assert_eq!(parts[1], b);
    }

    #[test]
    fn test_split_wrong_sizes() {
        let a = column(&[1.0, 2.0, 3.0]);
        assert!(matches!(
            split_v(&a, &[1, 1]),
            Err(DnnError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_norms() {
        let a = array![[3.0, -4.0]];
        assert!((norm(&a, NormType::L1) - 7.0).abs() < 1e-12);
        assert!((norm(&a, NormType::L2) - 5.0).abs() < 1e-12);
        assert!((norm(&a, NormType::Infinity) - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_vectorize_is_row_major() {
        let m = array![[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]];
        let v = vectorize(&m);
        assert_eq!(v.column(0).to_vec(), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(unvectorize(&v, 3, 2).unwrap(), m);
    }
}
