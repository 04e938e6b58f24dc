//! Trainable parameters and their gradients.

use super::{check_shape, DenseArray, Shape, SparseArray};
use crate::error::Result;
use crate::initializers::Initializer;
use crate::optimizers::SupportStructure;
use std::sync::atomic::{AtomicUsize, Ordering};

static NEXT_PARAMS_ID: AtomicUsize = AtomicUsize::new(0);

/// Unique identifier of a `ParamsArray`, used to match gradients to parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParamsId(usize);

impl ParamsId {
    fn next() -> Self {
        ParamsId(NEXT_PARAMS_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Persistent weights or biases.
///
/// The support structure of the update method (e.g. ADAM moments) is created
/// lazily by the first update and lives as long as the parameter.
///
/// A clone is a new parameter: it copies the values and the support structure
/// but draws a fresh id, so its gradients never merge with the original's.
#[derive(Debug)]
pub struct ParamsArray {
    id: ParamsId,
    pub values: DenseArray,
    support: Option<SupportStructure>,
}

impl ParamsArray {
    pub fn zeros(shape: Shape) -> Self {
        Self::from_values(DenseArray::zeros(shape))
    }

    pub fn from_values(values: DenseArray) -> Self {
        Self {
            id: ParamsId::next(),
            values,
            support: None,
        }
    }

    /// Zero-initialized array filled by `initializer`, if any.
    pub fn initialized(shape: Shape, initializer: Option<&dyn Initializer>) -> Self {
        let mut params = Self::zeros(shape);
        if let Some(init) = initializer {
            init.initialize(&mut params.values);
        }
        params
    }

    pub fn id(&self) -> ParamsId {
        self.id
    }

    pub fn shape(&self) -> Shape {
        self.values.dim()
    }

    pub fn support(&self) -> Option<&SupportStructure> {
        self.support.as_ref()
    }

    /// Returns the support structure, building it with `init` the first time.
    pub fn support_or_insert_with<F>(&mut self, init: F) -> &mut SupportStructure
    where
        F: FnOnce(Shape) -> SupportStructure,
    {
        let shape = self.values.dim();
        self.support.get_or_insert_with(|| init(shape))
    }

    pub fn clear_support(&mut self) {
        self.support = None;
    }

    /// Zero-valued dense gradient with the shape of this array.
    pub fn zeros_gradient(&self) -> Gradient {
        Gradient::Dense(DenseArray::zeros(self.shape()))
    }
}

impl Clone for ParamsArray {
    fn clone(&self) -> Self {
        Self {
            id: ParamsId::next(),
            values: self.values.clone(),
            support: self.support.clone(),
        }
    }
}

/// Gradient of a parameter, dense or sparse.
#[derive(Debug, Clone, PartialEq)]
pub enum Gradient {
    Dense(DenseArray),
    Sparse(SparseArray),
}

impl Gradient {
    pub fn shape(&self) -> Shape {
        match self {
            Gradient::Dense(d) => d.dim(),
            Gradient::Sparse(s) => s.shape(),
        }
    }

    pub fn is_sparse(&self) -> bool {
        matches!(self, Gradient::Sparse(_))
    }

    pub fn to_dense(&self) -> DenseArray {
        match self {
            Gradient::Dense(d) => d.clone(),
            Gradient::Sparse(s) => s.to_dense(),
        }
    }

    /// In-place sum. Dense + sparse gives dense, sparse + sparse stays sparse.
    pub fn assign_sum(&mut self, other: &Gradient) -> Result<()> {
        check_shape("Gradient::assign_sum", self.shape(), other.shape())?;
        match (&mut *self, other) {
            (Gradient::Dense(a), Gradient::Dense(b)) => *a += b,
            (Gradient::Dense(a), Gradient::Sparse(b)) => b.add_to_dense(a)?,
            (Gradient::Sparse(a), Gradient::Sparse(b)) => a.assign_sum(b)?,
            (Gradient::Sparse(a), Gradient::Dense(b)) => {
                let mut dense = b.clone();
                a.add_to_dense(&mut dense)?;
                *self = Gradient::Dense(dense);
            }
        }
        Ok(())
    }

    pub fn assign_prod(&mut self, k: f64) {
        match self {
            Gradient::Dense(d) => d.mapv_inplace(|v| v * k),
            Gradient::Sparse(s) => s.assign_prod(k),
        }
    }
}

/// Gradient of one parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamsError {
    pub id: ParamsId,
    pub gradient: Gradient,
}

/// Gradients of a set of parameters, as produced by a backward pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamsErrors(Vec<ParamsError>);

impl ParamsErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, params: &ParamsArray, gradient: Gradient) {
        self.0.push(ParamsError {
            id: params.id(),
            gradient,
        });
    }

    pub fn push_dense(&mut self, params: &ParamsArray, gradient: DenseArray) {
        self.push(params, Gradient::Dense(gradient));
    }

    pub fn extend(&mut self, other: ParamsErrors) {
        self.0.extend(other.0);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ParamsError> {
        self.0.iter()
    }

    /// The gradient of the given parameter, if present.
    pub fn get(&self, params: &ParamsArray) -> Option<&Gradient> {
        self.0.iter().find(|e| e.id == params.id()).map(|e| &e.gradient)
    }

    /// Sums the gradients of parameters that appear more than once, keeping
    /// the order in which each parameter first appears.
    pub fn merge_duplicates(self) -> Result<Self> {
        let mut merged: Vec<ParamsError> = Vec::with_capacity(self.0.len());
        for e in self.0 {
            match merged.iter_mut().find(|m| m.id == e.id) {
                Some(m) => m.gradient.assign_sum(&e.gradient)?,
                None => merged.push(e),
            }
        }
        Ok(Self(merged))
    }

    pub fn scale(&mut self, k: f64) {
        for e in &mut self.0 {
            e.gradient.assign_prod(k);
        }
    }
}

impl IntoIterator for ParamsErrors {
    type Item = ParamsError;
    type IntoIter = std::vec::IntoIter<ParamsError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}
