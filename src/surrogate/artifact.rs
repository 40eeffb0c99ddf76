use std::sync::Arc;

use machine_learning::{
    MlErr,
    arch::{Model, Sequential, activations::ActFn, layers::Dense},
};
use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};

use super::{Result, SurrogateErr};

/// The range raw log-likelihoods are mapped from onto `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizationBounds {
    pub min: f64,
    pub max: f64,
}

impl NormalizationBounds {
    /// Derives the bounds from the first targets ever trained on: twice the lowest raw
    /// log-likelihood below, and `ceiling` above.
    ///
    /// # Errors
    /// If there are no targets or the resulting range is empty.
    pub fn from_targets<I>(targets: I, ceiling: f64) -> Result<Self>
    where
        I: IntoIterator<Item = f64>,
    {
        let lowest = targets.into_iter().fold(f64::INFINITY, f64::min);
        if lowest == f64::INFINITY {
            return Err(SurrogateErr::EmptyBatch);
        }

        Self::new(2.0 * lowest, ceiling)
    }

    /// # Errors
    /// If `min` is not strictly below `max`.
    pub fn new(min: f64, max: f64) -> Result<Self> {
        if !(min < max && min.is_finite() && max.is_finite()) {
            return Err(SurrogateErr::DegenerateBounds { min, max });
        }

        Ok(Self { min, max })
    }

    /// Maps a raw log-likelihood onto `[0, 1]`, clamping values outside of the bounds.
    pub fn normalize(&self, raw: f64) -> f64 {
        ((raw - self.min) / (self.max - self.min)).clamp(0.0, 1.0)
    }

    pub fn denormalize(&self, normalized: f64) -> f64 {
        normalized * (self.max - self.min) + self.min
    }
}

/// The trainable part of an artifact, persisted as the model file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressorSnapshot {
    pub inputs: usize,
    pub hidden: Vec<usize>,
    pub params: Vec<f32>,
}

impl RegressorSnapshot {
    /// Builds the regressor architecture: ReLU hidden layers and a sigmoid output unit.
    pub fn architecture(inputs: usize, hidden: &[usize]) -> Sequential {
        let mut layers = Vec::with_capacity(hidden.len() + 1);
        let mut fan_in = inputs;

        for &width in hidden {
            layers.push(Dense::new((fan_in, width), ActFn::relu()));
            fan_in = width;
        }
        layers.push(Dense::new((fan_in, 1), ActFn::sigmoid(1.)));

        Sequential::new(layers)
    }

    pub fn model(&self) -> Sequential {
        Self::architecture(self.inputs, &self.hidden)
    }
}

/// A surrogate estimate of a raw log-likelihood.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Estimate {
    pub raw: f64,
    pub normalized: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Prediction {
    /// No artifact has been published yet.
    Uninitialized,
    Estimate(Estimate),
}

/// A published surrogate version. Never mutated once published.
#[derive(Debug, Clone, PartialEq)]
pub struct SurrogateArtifact {
    pub version: u64,
    pub bounds: NormalizationBounds,
    pub regressor: RegressorSnapshot,
}

impl SurrogateArtifact {
    /// Estimates the raw log-likelihood of `point`.
    ///
    /// # Returns
    /// The estimate, always within `self.bounds`.
    ///
    /// # Errors
    /// If `point` does not have the length the regressor was trained on.
    pub fn predict(&self, point: &[f32]) -> Result<Estimate> {
        self.estimate(&mut self.regressor.model(), point)
    }

    /// Like `predict`, with `model` already built from `self.regressor`.
    fn estimate(&self, model: &mut Sequential, point: &[f32]) -> Result<Estimate> {
        let x = ArrayView2::from_shape((1, point.len()), point).map_err(MlErr::from)?;
        let out = model.forward(&self.regressor.params, x)?;

        let normalized = out
            .first()
            .map(|&y| f64::from(y).clamp(0.0, 1.0))
            .unwrap_or_default();

        Ok(Estimate {
            raw: self
                .bounds
                .denormalize(normalized)
                .clamp(self.bounds.min, self.bounds.max),
            normalized,
        })
    }
}

/// A published version together with its built regressor, for repeated predictions.
#[derive(Debug, Clone)]
pub struct Predictor {
    artifact: Arc<SurrogateArtifact>,
    model: Sequential,
}

impl Predictor {
    pub fn new(artifact: Arc<SurrogateArtifact>) -> Self {
        let model = artifact.regressor.model();
        Self { artifact, model }
    }

    pub fn version(&self) -> u64 {
        self.artifact.version
    }

    pub fn predict(&mut self, point: &[f32]) -> Result<Estimate> {
        self.artifact.estimate(&mut self.model, point)
    }
}

#[cfg(test)]
mod tests {
    use machine_learning::initialization::xavier_params;
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    #[test]
    fn bounds_double_the_lowest_target() {
        let bounds = NormalizationBounds::from_targets([-10.0, -4.0, -7.0], -1.0).unwrap();
        assert_eq!(bounds, NormalizationBounds { min: -20.0, max: -1.0 });

        assert_eq!(bounds.normalize(-20.0), 0.0);
        assert_eq!(bounds.normalize(-1.0), 1.0);
        assert_eq!(bounds.normalize(5.0), 1.0);
        assert!((bounds.denormalize(bounds.normalize(-7.0)) + 7.0).abs() < 1e-12);
    }

    #[test]
    fn bounds_reject_empty_ranges() {
        assert!(matches!(
            NormalizationBounds::from_targets([-0.2], -1.0),
            Err(SurrogateErr::DegenerateBounds { .. })
        ));
        assert!(matches!(
            NormalizationBounds::from_targets([], -1.0),
            Err(SurrogateErr::EmptyBatch)
        ));
    }

    #[test]
    fn prediction_stays_within_bounds() {
        let inputs = 3;
        let hidden = vec![4, 2];
        let model = RegressorSnapshot::architecture(inputs, &hidden);
        let params = xavier_params(&model, &mut StdRng::seed_from_u64(42)).unwrap();

        let artifact = SurrogateArtifact {
            version: 1,
            bounds: NormalizationBounds::new(-50.0, -1.0).unwrap(),
            regressor: RegressorSnapshot {
                inputs,
                hidden,
                params,
            },
        };

        for point in [[0.0, 0.0, 0.0], [100.0, -100.0, 3.0], [-1e6, 1e6, 0.0]] {
            let estimate = artifact.predict(&point).unwrap();
            assert!((-50.0..=-1.0).contains(&estimate.raw), "{estimate:?}");
            assert!((0.0..=1.0).contains(&estimate.normalized));
        }

        assert!(artifact.predict(&[0.0]).is_err());
    }

    #[test]
    fn predictor_reuses_its_model() {
        let model = RegressorSnapshot::architecture(2, &[3]);
        let params = xavier_params(&model, &mut StdRng::seed_from_u64(7)).unwrap();
        let artifact = Arc::new(SurrogateArtifact {
            version: 4,
            bounds: NormalizationBounds::new(-30.0, -1.0).unwrap(),
            regressor: RegressorSnapshot {
                inputs: 2,
                hidden: vec![3],
                params,
            },
        });

        let mut predictor = Predictor::new(Arc::clone(&artifact));
        assert_eq!(predictor.version(), 4);

        for point in [[0.5, -0.5], [2.0, 1.0], [0.5, -0.5]] {
            assert_eq!(
                predictor.predict(&point).unwrap(),
                artifact.predict(&point).unwrap()
            );
        }
        assert!(predictor.predict(&[1.0]).is_err());
    }
}
