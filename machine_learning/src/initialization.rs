use rand::Rng;
use rand_distr::{Distribution, Normal, Uniform};

use crate::{Result, arch::Sequential};

/// A parameter generator that follows a certain probabilistic distribution.
#[derive(Clone, Copy, Debug)]
pub struct RandWeightGen<D: Distribution<f32>> {
    distribution: D,
}

impl<D: Distribution<f32>> RandWeightGen<D> {
    /// Creates a new `RandWeightGen` parameter generator.
    ///
    /// # Arguments
    /// * `distribution` - The distribution to sample the random numbers from.
    pub fn new(distribution: D) -> Self {
        Self { distribution }
    }

    /// Draws `n` values from the distribution.
    pub fn sample<R: Rng>(&self, rng: &mut R, n: usize) -> Vec<f32> {
        (0..n).map(|_| self.distribution.sample(rng)).collect()
    }
}

impl RandWeightGen<Uniform<f32>> {
    /// Creates a new `RandWeightGen` with a uniform distribution.
    ///
    /// # Arguments
    /// * `low` - The inclusive lower limit.
    /// * `high` - The exclusive upper limit.
    ///
    /// # Returns
    /// An error if the range is invalid (low >= high).
    pub fn uniform(low: f32, high: f32) -> Result<Self> {
        Ok(Self::new(Uniform::new(low, high)?))
    }

    /// Creates a new `RandWeightGen` using Xavier uniform initialization.
    ///
    /// # Arguments
    /// * `fan_in` - The number of input units in the weight tensor.
    /// * `fan_out` - The number of output units in the weight tensor.
    pub fn xavier_uniform(fan_in: usize, fan_out: usize) -> Result<Self> {
        let range = (6. / (fan_in + fan_out).max(1) as f32).sqrt();
        Self::uniform(-range, range)
    }
}

impl RandWeightGen<Normal<f32>> {
    /// Creates a new `RandWeightGen` with a normal distribution.
    ///
    /// # Arguments
    /// * `mean` - The mean of the distribution.
    /// * `std_dev` - The standard deviation of the distribution.
    ///
    /// # Returns
    /// An error if `std_dev` is not finite (Nan or infinite).
    pub fn normal(mean: f32, std_dev: f32) -> Result<Self> {
        Ok(Self::new(Normal::new(mean, std_dev)?))
    }
}

/// Initializes every layer of `model` with Xavier uniform weights and zero biases.
///
/// # Returns
/// The flat parameter vector for `model`.
pub fn xavier_params<R: Rng>(model: &Sequential, rng: &mut R) -> Result<Vec<f32>> {
    let mut params = Vec::new();

    for layer in model.layers() {
        let (fan_in, fan_out) = layer.dim();
        let weight_gen = RandWeightGen::xavier_uniform(fan_in, fan_out)?;
        params.extend(weight_gen.sample(rng, fan_in * fan_out));
        params.extend(std::iter::repeat_n(0., fan_out));
    }

    Ok(params)
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;
    use crate::arch::{Model, activations::ActFn, layers::Dense};

    fn seeded_rng() -> StdRng {
        StdRng::seed_from_u64(42)
    }

    #[test]
    fn uniform_stays_in_range() {
        let weight_gen = RandWeightGen::uniform(-0.5, 0.5).unwrap();
        let sample = weight_gen.sample(&mut seeded_rng(), 100);

        assert_eq!(sample.len(), 100);
        assert!(sample.iter().all(|w| (-0.5..0.5).contains(w)));
    }

    #[test]
    fn normal_rejects_invalid_std_dev() {
        assert!(RandWeightGen::normal(0., f32::NAN).is_err());
    }

    #[test]
    fn xavier_params_fit_model() {
        let model = Sequential::new([
            Dense::new((3, 4), ActFn::relu()),
            Dense::new((4, 1), ActFn::sigmoid(1.)),
        ]);
        let params = xavier_params(&model, &mut seeded_rng()).unwrap();

        assert_eq!(params.len(), model.size());
        // biases of the last layer
        assert_eq!(params[params.len() - 1], 0.);
    }
}
