//! Accumulation of parameter errors across examples and batch updates.

use super::UpdateMethod;
use crate::arrays::{Gradient, ParamsArray, ParamsErrors, ParamsId};
use crate::error::Result;
use std::collections::HashMap;
use tracing::debug;

/// Sums the gradients of each parameter over several backward passes.
#[derive(Debug, Clone, Default)]
pub struct ParamsErrorsAccumulator {
    errors: HashMap<ParamsId, Gradient>,
    count: usize,
}

impl ParamsErrorsAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the errors of one backward pass and increments the count.
    pub fn accumulate(&mut self, errors: ParamsErrors) -> Result<()> {
        for e in errors {
            match self.errors.get_mut(&e.id) {
                Some(acc) => acc.assign_sum(&e.gradient)?,
                None => {
                    self.errors.insert(e.id, e.gradient);
                }
            }
        }
        self.count += 1;
        Ok(())
    }

    /// Number of `accumulate` calls since the last `clear`.
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn get(&self, params: &ParamsArray) -> Option<&Gradient> {
        self.errors.get(&params.id())
    }

    /// Divides every accumulated gradient by the number of accumulations.
    pub fn average(&mut self) {
        if self.count > 1 {
            let k = 1.0 / self.count as f64;
            for g in self.errors.values_mut() {
                g.assign_prod(k);
            }
            self.count = 1;
        }
    }

    pub fn clear(&mut self) {
        self.errors.clear();
        self.count = 0;
    }
}

/// An update method paired with an errors accumulator.
///
/// ```text
/// for batch in batches {
///     optimizer.new_batch();
///     for example in batch {
///         optimizer.new_example();
///         ... forward / backward ...
///         optimizer.accumulate(processor.params_errors()?)?;
///     }
///     optimizer.update(model.params_mut())?;
/// }
/// ```
pub struct ParamsOptimizer {
    method: Box<dyn UpdateMethod>,
    accumulator: ParamsErrorsAccumulator,
}

impl ParamsOptimizer {
    pub fn new(method: Box<dyn UpdateMethod>) -> Self {
        Self {
            method,
            accumulator: ParamsErrorsAccumulator::new(),
        }
    }

    pub fn method(&self) -> &dyn UpdateMethod {
        self.method.as_ref()
    }

    pub fn accumulator(&self) -> &ParamsErrorsAccumulator {
        &self.accumulator
    }

    pub fn accumulate(&mut self, errors: ParamsErrors) -> Result<()> {
        self.accumulator.accumulate(errors)
    }

    /// Averages the accumulated errors, updates every parameter that has
    /// errors and clears the accumulator. Parameters without errors are left
    /// untouched.
    pub fn update<'a, I>(&mut self, params: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a mut ParamsArray>,
    {
        if self.accumulator.is_empty() {
            return Ok(());
        }
        self.accumulator.average();

        let mut updated = 0;
        for p in params {
            if let Some(errors) = self.accumulator.get(p) {
                self.method.update(p, errors)?;
                updated += 1;
            }
        }
        debug!(method = self.method.name(), updated, "params updated");

        self.accumulator.clear();
        Ok(())
    }

    pub fn new_example(&mut self) {
        self.method.new_example();
    }

    pub fn new_batch(&mut self) {
        self.method.new_batch();
    }

    pub fn new_epoch(&mut self) {
        self.method.new_epoch();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arrays::SparseArray;
    use crate::optimizers::LearningRateMethod;
    use ndarray::array;

    #[test]
    fn test_accumulator_sums_and_averages() {
        let w = ParamsArray::zeros((1, 2));
        let mut acc = ParamsErrorsAccumulator::new();
        for g in [array![[1.0, 2.0]], array![[3.0, 4.0]]] {
            let mut e = ParamsErrors::new();
            e.push_dense(&w, g);
            acc.accumulate(e).unwrap();
        }
        assert_eq!(acc.count(), 2);
        acc.average();
        assert_eq!(acc.get(&w).map(|g| g.to_dense()), Some(array![[2.0, 3.0]]));
    }

    #[test]
    fn test_accumulator_keeps_sparse_sums_sparse() {
        let w = ParamsArray::zeros((2, 2));
        let mut acc = ParamsErrorsAccumulator::new();
        for (idx, v) in [((0, 1), 1.0), ((1, 0), 2.0)] {
            let mut e = ParamsErrors::new();
            e.push(&w, Gradient::Sparse(SparseArray::from_entries((2, 2), vec![(idx, v)]).unwrap()));
            acc.accumulate(e).unwrap();
        }
        assert!(acc.get(&w).map(|g| g.is_sparse()).unwrap_or(false));
    }

    #[test]
    fn test_optimizer_updates_only_params_with_errors() {
        let mut w = ParamsArray::from_values(array![[1.0]]);
        let mut b = ParamsArray::from_values(array![[1.0]]);
        let mut optimizer = ParamsOptimizer::new(Box::new(LearningRateMethod::new(1.0).unwrap()));

        let mut e = ParamsErrors::new();
        e.push_dense(&w, array![[0.5]]);
        optimizer.accumulate(e).unwrap();
        optimizer.update([&mut w, &mut b]).unwrap();

        assert_eq!(w.values, array![[0.5]]);
        assert_eq!(b.values, array![[1.0]]);
        assert!(optimizer.accumulator().is_empty());
    }
}
