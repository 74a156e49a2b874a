use std::marker::PhantomData;

use anyhow::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::tensor::{numel, Tensor};

/// Seeded tensor generator for reproducible inputs.
///
/// ```no_run
/// # use openrt::Random;
/// # fn main() -> anyhow::Result<()> {
/// let x = Random::<f32>::generate_with_shape(7, (-1.0, 1.0), vec![1, 3, 8])?;
/// # Ok(()) }
/// ```
pub struct Random<T> {
    rng: StdRng,
    _marker: PhantomData<T>,
}

impl<T> Random<T>
where
    T: RandomValue,
{
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            _marker: PhantomData,
        }
    }

    pub fn generate(range: (T, T), len: usize) -> Result<Tensor<T>> {
        Self::generate_with_seed(0, range, len)
    }

    pub fn generate_with_seed(seed: u64, range: (T, T), len: usize) -> Result<Tensor<T>> {
        Self::with_seed(seed).next(range, len)
    }

    pub fn generate_with_shape(seed: u64, range: (T, T), shape: Vec<usize>) -> Result<Tensor<T>> {
        Self::with_seed(seed).next_with_shape(range, shape)
    }

    pub fn next(&mut self, range: (T, T), len: usize) -> Result<Tensor<T>> {
        self.next_with_shape(range, vec![len])
    }

    pub fn next_with_shape(&mut self, range: (T, T), shape: Vec<usize>) -> Result<Tensor<T>> {
        let len = numel(&shape);
        let data = (0..len).map(|_| T::sample(&mut self.rng, range)).collect();
        Tensor::from_vec_with_shape(data, shape)
    }
}

pub trait RandomValue: Sized + Copy {
    fn sample(rng: &mut StdRng, range: (Self, Self)) -> Self;
}

macro_rules! impl_random_value {
    ($($t:ty),* $(,)?) => {
        $(
            impl RandomValue for $t {
                fn sample(rng: &mut StdRng, range: (Self, Self)) -> Self {
                    rng.gen_range(range.0..=range.1)
                }
            }
        )*
    };
}

impl_random_value!(f32, f64, i32, i64, u8);
