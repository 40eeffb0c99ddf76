use rand::Rng;
use rand_distr::StandardNormal;

use crate::oracle::{LabeledData, LikelihoodOracle, OracleErr};

/// A candidate parameter vector and the log ratio `log q(w | w') - log q(w' | w)` of the kernel
/// that drew it, zero for symmetric kernels.
#[derive(Debug, Clone, PartialEq)]
pub struct Proposal {
    pub params: Vec<f32>,
    pub log_correction: f64,
}

/// A symmetric Gaussian random walk.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RandomWalk {
    step_size: f64,
}

impl RandomWalk {
    pub fn new(step_size: f64) -> Self {
        Self { step_size }
    }

    /// Draws `from + N(0, step_size²)` componentwise.
    pub fn perturb<R: Rng>(&self, from: &[f32], rng: &mut R) -> Vec<f32> {
        let step = self.step_size as f32;
        from.iter()
            .map(|&w| w + step * rng.sample::<f32, _>(StandardNormal))
            .collect()
    }

    pub fn propose<R: Rng>(&self, from: &[f32], rng: &mut R) -> Proposal {
        Proposal {
            params: self.perturb(from, rng),
            log_correction: 0.0,
        }
    }

    /// Perturbs a gradient descent step of `from` instead of `from` itself.
    ///
    /// The kernel is not symmetric, so the returned proposal carries the correction computed from
    /// a second gradient step taken at the proposed point.
    pub fn propose_langevin<O, R>(
        &self,
        from: &[f32],
        oracle: &mut O,
        data: &LabeledData,
        depth: usize,
        rng: &mut R,
    ) -> Result<Proposal, OracleErr>
    where
        O: LikelihoodOracle + ?Sized,
        R: Rng,
    {
        let forward = oracle.gradient_step(from, data, depth)?;
        let params = self.perturb(&forward, rng);
        let backward = oracle.gradient_step(&params, data, depth)?;

        let variance = self.step_size * self.step_size;
        let log_q = |to: &[f32], mean: &[f32]| -> f64 {
            let squares: f64 = to
                .iter()
                .zip(mean)
                .map(|(&t, &m)| f64::from(t - m).powi(2))
                .sum();
            -0.5 * squares / variance
        };

        let log_correction = log_q(from, &backward) - log_q(&params, &forward);
        Ok(Proposal {
            params,
            log_correction,
        })
    }
}
