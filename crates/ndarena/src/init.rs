// init: strategies that allocate and fill arrays
//
// Every strategy maps (manager, shape, dtype) to a fresh array owned by that
// manager:
//
//   Zeros                      all elements = 0
//   Ones                       all elements = 1
//   Constant(v)                all elements = v (must fit the dtype)
//   Uniform { low, high }      U(low, high), float dtypes only
//   Normal { mean, std }       N(mean, std), float dtypes only
//
// Any `Fn(&NDManager, &Shape, DType) -> Result<NDArray>` is an initializer
// too, so ad-hoc strategies do not need a type.
//
// Random strategies own their generator. Build them with a seed (or hand in
// an `StdRng`) to get the same values on every run; successive calls on the
// same initializer continue the stream.

use std::sync::{Mutex, MutexGuard, PoisonError};

use log::trace;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::Distribution;

use ndarena_core::{DType, Error, NDArray, NDManager, Result, Shape};

/// A strategy that allocates and initializes an array.
pub trait Initializer {
    /// Allocate an array of `shape` and `dtype` under `manager` and fill it.
    fn initialize(&self, manager: &NDManager, shape: &Shape, dtype: DType) -> Result<NDArray>;
}

impl<F> Initializer for F
where
    F: Fn(&NDManager, &Shape, DType) -> Result<NDArray>,
{
    fn initialize(&self, manager: &NDManager, shape: &Shape, dtype: DType) -> Result<NDArray> {
        self(manager, shape, dtype)
    }
}

/// Fills with zeros.
#[derive(Debug, Clone, Copy, Default)]
pub struct Zeros;

impl Initializer for Zeros {
    fn initialize(&self, manager: &NDManager, shape: &Shape, dtype: DType) -> Result<NDArray> {
        manager.zeros(shape, dtype)
    }
}

/// Fills with ones.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ones;

impl Initializer for Ones {
    fn initialize(&self, manager: &NDManager, shape: &Shape, dtype: DType) -> Result<NDArray> {
        manager.ones(shape, dtype)
    }
}

/// Fills with a single value.
#[derive(Debug, Clone, Copy)]
pub struct Constant(pub f64);

impl Initializer for Constant {
    fn initialize(&self, manager: &NDManager, shape: &Shape, dtype: DType) -> Result<NDArray> {
        manager.full(shape, self.0, dtype)
    }
}

/// Samples from U(low, high).
#[derive(Debug)]
pub struct Uniform {
    pub low: f64,
    pub high: f64,
    rng: Mutex<StdRng>,
}

impl Uniform {
    /// Seeded from OS entropy.
    pub fn new(low: f64, high: f64) -> Self {
        Self::with_rng(low, high, StdRng::from_entropy())
    }

    pub fn with_seed(low: f64, high: f64, seed: u64) -> Self {
        Self::with_rng(low, high, StdRng::seed_from_u64(seed))
    }

    pub fn with_rng(low: f64, high: f64, rng: StdRng) -> Self {
        Uniform {
            low,
            high,
            rng: Mutex::new(rng),
        }
    }
}

impl Initializer for Uniform {
    fn initialize(&self, manager: &NDManager, shape: &Shape, dtype: DType) -> Result<NDArray> {
        require_float("uniform", dtype)?;
        if !(self.low.is_finite() && self.high.is_finite() && self.low < self.high) {
            return Err(Error::InvalidArgument(format!(
                "uniform bounds must be finite with low < high, got [{}, {})",
                self.low, self.high
            )));
        }
        let dist = rand_distr::Uniform::new(self.low, self.high);
        sample_into(manager, shape, dtype, &self.rng, dist)
    }
}

/// Samples from N(mean, std).
#[derive(Debug)]
pub struct Normal {
    pub mean: f64,
    pub std: f64,
    rng: Mutex<StdRng>,
}

impl Normal {
    /// Seeded from OS entropy.
    pub fn new(mean: f64, std: f64) -> Self {
        Self::with_rng(mean, std, StdRng::from_entropy())
    }

    pub fn with_seed(mean: f64, std: f64, seed: u64) -> Self {
        Self::with_rng(mean, std, StdRng::seed_from_u64(seed))
    }

    pub fn with_rng(mean: f64, std: f64, rng: StdRng) -> Self {
        Normal {
            mean,
            std,
            rng: Mutex::new(rng),
        }
    }
}

impl Initializer for Normal {
    fn initialize(&self, manager: &NDManager, shape: &Shape, dtype: DType) -> Result<NDArray> {
        require_float("normal", dtype)?;
        if !(self.mean.is_finite() && self.std.is_finite() && self.std >= 0.0) {
            return Err(Error::InvalidArgument(format!(
                "normal needs a finite mean and a finite std >= 0, got ({}, {})",
                self.mean, self.std
            )));
        }
        let dist = rand_distr::Normal::new(self.mean, self.std)
            .map_err(|e| Error::InvalidArgument(format!("normal({}, {}): {e}", self.mean, self.std)))?;
        sample_into(manager, shape, dtype, &self.rng, dist)
    }
}

fn require_float(name: &str, dtype: DType) -> Result<()> {
    if dtype.is_float() {
        Ok(())
    } else {
        Err(Error::InvalidArgument(format!(
            "{name} initializer needs a float dtype, got {dtype}"
        )))
    }
}

fn lock_rng(rng: &Mutex<StdRng>) -> MutexGuard<'_, StdRng> {
    rng.lock().unwrap_or_else(PoisonError::into_inner)
}

fn sample_into(
    manager: &NDManager,
    shape: &Shape,
    dtype: DType,
    rng: &Mutex<StdRng>,
    dist: impl Distribution<f64>,
) -> Result<NDArray> {
    if shape.checked_size_in_bytes(dtype).is_none() {
        return Err(Error::InvalidArgument(format!(
            "shape {shape} of {dtype} overflows the address space"
        )));
    }
    let values: Vec<f64> = {
        let mut rng = lock_rng(rng);
        dist.sample_iter(&mut *rng).take(shape.elem_count()).collect()
    };
    trace!("sampled {} values for {shape} {dtype}", values.len());
    manager.create_from_f64(&values, shape, dtype)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use ndarena_core::Context;
    use ndarena_host::HostBackend;

    fn manager() -> NDManager {
        NDManager::new_root(Arc::new(HostBackend::new()), Context::cpu()).unwrap()
    }

    #[test]
    fn test_zeros_ones_constant() {
        let m = manager();
        let shape = Shape::from((2, 3));

        let z = Zeros.initialize(&m, &shape, DType::I32).unwrap();
        assert_eq!(z.to_vec::<i32>().unwrap(), vec![0; 6]);

        let o = Ones.initialize(&m, &shape, DType::U8).unwrap();
        assert_eq!(o.to_vec::<u8>().unwrap(), vec![1; 6]);

        let c = Constant(2.5).initialize(&m, &shape, DType::F32).unwrap();
        assert_eq!(c.to_vec::<f32>().unwrap(), vec![2.5; 6]);
        assert_eq!(m.array_count(), 3);
    }

    #[test]
    fn test_constant_must_fit_dtype() {
        let m = manager();
        let shape = Shape::from(4);
        for (value, dtype) in [
            (0.5, DType::I32),
            (300.0, DType::U8),
            (-1.0, DType::U8),
            (70000.0, DType::F16),
            (1e300, DType::F32),
        ] {
            let err = Constant(value).initialize(&m, &shape, dtype).unwrap_err();
            assert!(err.is_invalid_argument(), "{value} as {dtype}: {err}");
        }
        assert_eq!(m.array_count(), 0);
    }

    #[test]
    fn test_uniform_range_and_seed() {
        let m = manager();
        let shape = Shape::from((4, 8));
        let a = Uniform::with_seed(-0.5, 0.5, 42)
            .initialize(&m, &shape, DType::F64)
            .unwrap()
            .to_vec::<f64>()
            .unwrap();
        let b = Uniform::with_seed(-0.5, 0.5, 42)
            .initialize(&m, &shape, DType::F64)
            .unwrap()
            .to_vec::<f64>()
            .unwrap();
        assert_eq!(a, b);
        assert!(a.iter().all(|v| (-0.5..0.5).contains(v)));
    }

    #[test]
    fn test_stream_continues_between_calls() {
        let m = manager();
        let init = Uniform::with_seed(0.0, 1.0, 7);
        let first = init.initialize(&m, &Shape::from(16), DType::F64).unwrap();
        let second = init.initialize(&m, &Shape::from(16), DType::F64).unwrap();
        assert_ne!(first.to_vec::<f64>().unwrap(), second.to_vec::<f64>().unwrap());
    }

    #[test]
    fn test_normal_statistics() {
        let m = manager();
        let values = Normal::with_seed(3.0, 0.5, 1)
            .initialize(&m, &Shape::from(4096), DType::F32)
            .unwrap()
            .to_f64_vec()
            .unwrap();
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
        assert!((mean - 3.0).abs() < 0.05, "mean {mean}");
        assert!((var.sqrt() - 0.5).abs() < 0.05, "std {}", var.sqrt());
    }

    #[test]
    fn test_random_needs_float_dtype() {
        let m = manager();
        let shape = Shape::from(3);
        assert!(Uniform::with_seed(0.0, 1.0, 0)
            .initialize(&m, &shape, DType::I32)
            .unwrap_err()
            .is_invalid_argument());
        assert!(Normal::with_seed(0.0, 1.0, 0)
            .initialize(&m, &shape, DType::U8)
            .unwrap_err()
            .is_invalid_argument());
    }

    #[test]
    fn test_bad_parameters() {
        let m = manager();
        let shape = Shape::from(3);
        let bad: Vec<Box<dyn Initializer>> = vec![
            Box::new(Uniform::with_seed(1.0, 1.0, 0)),
            Box::new(Uniform::with_seed(0.0, f64::INFINITY, 0)),
            Box::new(Normal::with_seed(0.0, -1.0, 0)),
            Box::new(Normal::with_seed(f64::NAN, 1.0, 0)),
            Box::new(Normal::with_seed(0.0, f64::INFINITY, 0)),
        ];
        for init in &bad {
            let err = init.initialize(&m, &shape, DType::F32).unwrap_err();
            assert!(err.is_invalid_argument(), "{err}");
        }
        assert_eq!(m.array_count(), 0);

        let flat = Normal::with_seed(2.0, 0.0, 0)
            .initialize(&m, &shape, DType::F64)
            .unwrap();
        assert_eq!(flat.to_vec::<f64>().unwrap(), vec![2.0; 3]);
    }

    #[test]
    fn test_random_rejects_oversized_shape() {
        let m = manager();
        let shape = Shape::from((usize::MAX / 2, 4));
        let err = Uniform::with_seed(0.0, 1.0, 0)
            .initialize(&m, &shape, DType::F32)
            .unwrap_err();
        assert!(err.is_invalid_argument(), "{err}");
    }

    #[test]
    fn test_closure_initializer() {
        let m = manager();
        let arange = |m: &NDManager, shape: &Shape, dtype: DType| {
            let values: Vec<f64> = (0..shape.elem_count()).map(|i| i as f64).collect();
            m.create_from_f64(&values, shape, dtype)
        };
        let a = arange.initialize(&m, &Shape::from((2, 2)), DType::I64).unwrap();
        assert_eq!(a.to_vec::<i64>().unwrap(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_trait_objects() {
        let m = manager();
        let inits: Vec<Box<dyn Initializer>> = vec![
            Box::new(Zeros),
            Box::new(Constant(4.0)),
            Box::new(Normal::with_seed(0.0, 1.0, 3)),
        ];
        for init in &inits {
            let a = init.initialize(&m, &Shape::from(2), DType::F16).unwrap();
            assert_eq!(a.dtype().unwrap(), DType::F16);
        }
        assert_eq!(m.array_count(), 3);
    }
}
