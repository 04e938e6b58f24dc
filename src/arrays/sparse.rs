//! Sparse array representations.
//!
//! `SparseArray` is the gradient of a parameter whose input was sparse: only a
//! few entries are active and the update methods touch only those.
//! `SparseBinaryArray` is a 0/1 input (e.g. one-hot features) where only the
//! positions of the ones are stored.

use super::{check_shape, DenseArray, Shape};
use crate::error::{DnnError, Result};
use std::collections::{BTreeMap, BTreeSet};

/// Sparse matrix in coordinate format.
///
/// Entries are kept in a `BTreeMap`, so active indices are always unique and
/// sorted in row-major order.
#[derive(Debug, Clone, PartialEq)]
pub struct SparseArray {
    shape: Shape,
    entries: BTreeMap<(usize, usize), f64>,
}

impl SparseArray {
    pub fn zeros(shape: Shape) -> Self {
        Self {
            shape,
            entries: BTreeMap::new(),
        }
    }

    /// Builds a sparse array from `((row, col), value)` pairs. Duplicates are summed.
    pub fn from_entries<I>(shape: Shape, entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = ((usize, usize), f64)>,
    {
        let mut array = Self::zeros(shape);
        for ((r, c), v) in entries {
            array.add_at(r, c, v)?;
        }
        Ok(array)
    }

    pub fn shape(&self) -> Shape {
        self.shape
    }

    /// Number of active entries.
    pub fn nnz(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.entries.get(&(row, col)).copied().unwrap_or(0.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = ((usize, usize), f64)> + '_ {
        self.entries.iter().map(|(&idx, &v)| (idx, v))
    }

    pub fn active_indices(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.entries.keys().copied()
    }

    /// Adds `value` to the entry at `(row, col)`, activating it if needed.
    pub fn add_at(&mut self, row: usize, col: usize, value: f64) -> Result<()> {
        if row >= self.shape.0 || col >= self.shape.1 {
            return Err(DnnError::IndexOutOfBounds(row, col, self.shape));
        }
        *self.entries.entry((row, col)).or_insert(0.0) += value;
        Ok(())
    }

    /// In-place sum with another sparse array of the same shape.
    pub fn assign_sum(&mut self, other: &SparseArray) -> Result<()> {
        check_shape("SparseArray::assign_sum", self.shape, other.shape)?;
        for (&idx, &v) in &other.entries {
            *self.entries.entry(idx).or_insert(0.0) += v;
        }
        Ok(())
    }

    pub fn prod(&self, k: f64) -> SparseArray {
        let mut out = self.clone();
        out.assign_prod(k);
        out
    }

    pub fn assign_prod(&mut self, k: f64) {
        self.entries.values_mut().for_each(|v| *v *= k);
    }

    /// Applies `f` to every active value.
    pub fn map_values<F: Fn(f64) -> f64>(&self, f: F) -> SparseArray {
        Self {
            shape: self.shape,
            entries: self.entries.iter().map(|(&idx, &v)| (idx, f(v))).collect(),
        }
    }

    pub fn to_dense(&self) -> DenseArray {
        let mut dense = DenseArray::zeros(self.shape);
        for (&(r, c), &v) in &self.entries {
            dense[[r, c]] = v;
        }
        dense
    }

    /// Adds this array into `dense` (same shape).
    pub fn add_to_dense(&self, dense: &mut DenseArray) -> Result<()> {
        check_shape("SparseArray::add_to_dense", self.shape, dense.dim())?;
        for (&(r, c), &v) in &self.entries {
            dense[[r, c]] += v;
        }
        Ok(())
    }

    /// Subtracts this array from `dense` (same shape).
    pub fn sub_from_dense(&self, dense: &mut DenseArray) -> Result<()> {
        check_shape("SparseArray::sub_from_dense", self.shape, dense.dim())?;
        for (&(r, c), &v) in &self.entries {
            dense[[r, c]] -= v;
        }
        Ok(())
    }

    /// Matrix product `self · other`.
    pub fn dot_dense(&self, other: &DenseArray) -> Result<DenseArray> {
        if self.shape.1 != other.nrows() {
            return Err(DnnError::ShapeMismatch {
                op: "SparseArray::dot_dense",
                expected: (self.shape.1, other.ncols()),
                actual: other.dim(),
            });
        }
        let mut out = DenseArray::zeros((self.shape.0, other.ncols()));
        for (&(r, c), &v) in &self.entries {
            let src = other.row(c);
            out.row_mut(r).scaled_add(v, &src);
        }
        Ok(out)
    }
}

/// Sparse matrix whose active entries are all equal to one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SparseBinaryArray {
    shape: Shape,
    active: BTreeSet<(usize, usize)>,
}

impl SparseBinaryArray {
    pub fn new<I>(shape: Shape, active: I) -> Result<Self>
    where
        I: IntoIterator<Item = (usize, usize)>,
    {
        let mut set = BTreeSet::new();
        for (r, c) in active {
            if r >= shape.0 || c >= shape.1 {
                return Err(DnnError::IndexOutOfBounds(r, c, shape));
            }
            set.insert((r, c));
        }
        Ok(Self { shape, active: set })
    }

    /// Column vector of length `size` with ones at `active_rows`.
    pub fn column(size: usize, active_rows: &[usize]) -> Result<Self> {
        Self::new((size, 1), active_rows.iter().map(|&r| (r, 0)))
    }

    pub fn shape(&self) -> Shape {
        self.shape
    }

    pub fn active_indices(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.active.iter().copied()
    }

    pub fn to_dense(&self) -> DenseArray {
        let mut dense = DenseArray::zeros(self.shape);
        for &(r, c) in &self.active {
            dense[[r, c]] = 1.0;
        }
        dense
    }

    /// Matrix product `w · self`: each output column is the sum of the columns of
    /// `w` selected by the active rows.
    pub fn dot_left(&self, w: &DenseArray) -> Result<DenseArray> {
        if w.ncols() != self.shape.0 {
            return Err(DnnError::ShapeMismatch {
                op: "SparseBinaryArray::dot_left",
                expected: (w.nrows(), self.shape.0),
                actual: w.dim(),
            });
        }
        let mut out = DenseArray::zeros((w.nrows(), self.shape.1));
        for &(r, c) in &self.active {
            let src = w.column(r);
            out.column_mut(c).scaled_add(1.0, &src);
        }
        Ok(out)
    }

    /// Outer product `gy · selfᵀ` as a sparse array: only the columns matching
    /// the active rows are non-zero.
    pub fn outer_left(&self, gy: &DenseArray) -> Result<SparseArray> {
        if gy.ncols() != self.shape.1 {
            return Err(DnnError::ShapeMismatch {
                op: "SparseBinaryArray::outer_left",
                expected: (gy.nrows(), self.shape.1),
                actual: gy.dim(),
            });
        }
        let mut out = SparseArray::zeros((gy.nrows(), self.shape.0));
        for &(r, c) in &self.active {
            for i in 0..gy.nrows() {
                out.add_at(i, r, gy[[i, c]])?;
            }
        }
        Ok(out)
    }
}
