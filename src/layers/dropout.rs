//! Dropout на входах слоя.
//!
//! Во время обучения каждый элемент входа обнуляется с вероятностью `p`,
//! остальные масштабируются на `1/(1-p)`, чтобы сохранить математическое
//! ожидание. Та же маска применяется к ошибкам входа на обратном проходе.

use crate::arrays::DenseArray;
use crate::error::{ensure_hyper, Result};
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use rand::Rng;

#[derive(Debug, Clone)]
pub struct Dropout {
    /// Вероятность обнуления, в диапазоне [0, 1).
    p: f64,
    /// Маска последнего прямого прохода (`None`, если dropout не применялся).
    mask: Option<DenseArray>,
}

impl Dropout {
    pub fn new(p: f64) -> Result<Self> {
        ensure_hyper((0.0..1.0).contains(&p), "dropout", format!("must be in [0, 1), got {}", p))?;
        Ok(Self { p, mask: None })
    }

    pub fn probability(&self) -> f64 {
        self.p
    }

    pub fn mask(&self) -> Option<&DenseArray> {
        self.mask.as_ref()
    }

    /// Сэмплирует новую маску и применяет её к `x`.
    ///
    /// При `p == 0` маска не создаётся и вход возвращается как есть.
    pub fn apply<R: Rng + ?Sized>(&mut self, x: &DenseArray, rng: &mut R) -> DenseArray {
        if self.p == 0.0 {
            self.mask = None;
            return x.clone();
        }
        let keep = 1.0 - self.p;
        let p = self.p;
        let mask = DenseArray::random_using(x.dim(), Uniform::new(0.0, 1.0), rng)
            .mapv(|u| if u >= p { 1.0 / keep } else { 0.0 });
        let out = x * &mask;
        self.mask = Some(mask);
        out
    }

    /// Сбрасывает маску (режим inference).
    pub fn clear(&mut self) {
        self.mask = None;
    }

    /// Применяет маску к ошибкам входа.
    pub fn backward(&self, gx: &DenseArray) -> DenseArray {
        match &self.mask {
            Some(mask) => gx * mask,
            None => gx.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arrays::column;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_mask_is_scaled_and_reused_backward() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut dropout = Dropout::new(0.5).unwrap();
        let x = DenseArray::ones((200, 1));
        let y = dropout.apply(&x, &mut rng);

        // каждый элемент либо обнулён, либо умножен на 2
        assert!(y.iter().all(|&v| v == 0.0 || v == 2.0));
        let kept = y.iter().filter(|&&v| v > 0.0).count();
        assert!(kept > 60 && kept < 140);

        let gx = dropout.backward(&x);
        assert_eq!(gx, y);
    }

    #[test]
    fn test_zero_probability_is_identity() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut dropout = Dropout::new(0.0).unwrap();
        let x = column(&[1.0, 2.0]);
        assert_eq!(dropout.apply(&x, &mut rng), x);
        assert!(dropout.mask().is_none());
    }

    #[test]
    fn test_invalid_probability() {
        assert!(Dropout::new(1.0).is_err());
        assert!(Dropout::new(-0.1).is_err());
    }
}
