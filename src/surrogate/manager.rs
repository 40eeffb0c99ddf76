use std::sync::Arc;

use log::{info, warn};
use machine_learning::{
    arch::{Model, loss::Mse},
    dataset::Dataset,
    initialization::xavier_params,
    optimization::Adam,
    training::{FitConfig, ModelTrainer},
};
use rand::rngs::StdRng;

use super::{
    ArtifactStore, NormalizationBounds, Prediction, RegressorSnapshot, Result, SurrogateArtifact,
    SurrogateBatch, SurrogateErr,
};
use crate::config::SurrogateConfig;

/// The single writer of the surrogate. Trains new versions from true-path observations and
/// publishes them to its `ArtifactStore`.
pub struct SurrogateManager {
    config: SurrogateConfig,
    store: ArtifactStore,
    params: usize,
    bounds: Option<NormalizationBounds>,
    current: Option<Arc<SurrogateArtifact>>,
    rng: StdRng,
}

impl SurrogateManager {
    /// Creates a new `SurrogateManager`.
    ///
    /// # Arguments
    /// * `config` - The regressor's architecture and training schedule.
    /// * `store` - Where versions are published.
    /// * `params` - The length of the parameter vectors the surrogate is fed.
    /// * `rng` - The source of initial weights and batch shuffling.
    pub fn new(config: SurrogateConfig, store: ArtifactStore, params: usize, rng: StdRng) -> Self {
        Self {
            config,
            store,
            params,
            bounds: None,
            current: None,
            rng,
        }
    }

    /// Returns the latest published version, or 0 if there is none.
    pub fn version(&self) -> u64 {
        self.current.as_ref().map_or(0, |artifact| artifact.version)
    }

    pub fn current(&self) -> Option<Arc<SurrogateArtifact>> {
        self.current.clone()
    }

    pub fn bounds(&self) -> Option<NormalizationBounds> {
        self.bounds
    }

    /// Trains and publishes a new version from `batch`.
    ///
    /// The normalization bounds are fixed by the first call and reused afterwards so every
    /// version regresses onto the same scale. Each version starts from the weights of the
    /// previous one.
    ///
    /// # Returns
    /// The new version, strictly greater than every previous one.
    ///
    /// # Errors
    /// If the batch is malformed or has no finite rows, or the new version cannot be persisted.
    /// The current version is kept in every case.
    pub fn train(&mut self, batch: &SurrogateBatch) -> Result<u64> {
        batch.check(self.params)?;

        let rows: Vec<_> = batch.finite_rows().collect();
        if rows.is_empty() {
            return Err(SurrogateErr::EmptyBatch);
        }

        let bounds = match self.bounds {
            Some(bounds) => bounds,
            None => NormalizationBounds::from_targets(
                rows.iter().map(|&(_, target)| target),
                self.config.likelihood_ceiling,
            )?,
        };

        let mut data = Vec::with_capacity(rows.len() * (self.params + 1));
        for (params, target) in &rows {
            data.extend(params.iter().map(|&w| w as f32));
            data.push(bounds.normalize(*target) as f32);
        }
        let dataset = Dataset::new(data, self.params, 1)?;

        let model = RegressorSnapshot::architecture(self.params, &self.config.hidden);
        let mut weights = match &self.current {
            Some(previous) => previous.regressor.params.clone(),
            None => xavier_params(&model, &mut self.rng)?,
        };

        let optimizer = Adam::with_learning_rate(model.size(), self.config.learning_rate);
        let fit = FitConfig {
            epochs: self.config.epochs,
            batch_size: self.config.batch_size,
            patience: self.config.patience,
            validation_split: self.config.validation_split,
        };
        let mut trainer = ModelTrainer::new(model, optimizer, Mse, fit);
        let report = trainer.fit(&mut weights, dataset, &mut self.rng)?;
        let metric = report.final_loss().unwrap_or(f32::NAN);

        let version = self.version() + 1;
        let artifact = SurrogateArtifact {
            version,
            bounds,
            regressor: RegressorSnapshot {
                inputs: self.params,
                hidden: self.config.hidden.clone(),
                params: weights,
            },
        };

        self.store.publish(&artifact)?;
        if let Err(e) = self.store.append_metric(version, metric) {
            warn!("failed to log surrogate metric: {e}");
        }
        if self.config.save_training_data {
            if let Err(e) = self.store.append_training_data(version, &rows, &bounds) {
                warn!(version = version; "failed to save surrogate training data: {e}");
            }
        }

        info!(
            version = version,
            rows = rows.len(),
            epochs = report.epochs(),
            metric = metric;
            "trained surrogate"
        );

        self.bounds = Some(bounds);
        self.current = Some(Arc::new(artifact));
        Ok(version)
    }

    /// Estimates the raw log-likelihood of `point` with the current version.
    pub fn predict(&self, point: &[f32]) -> Result<Prediction> {
        match &self.current {
            Some(artifact) => artifact.predict(point).map(Prediction::Estimate),
            None => Ok(Prediction::Uninitialized),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroUsize;

    use rand::{Rng, SeedableRng};

    use super::*;

    const PARAMS: usize = 3;

    fn config() -> SurrogateConfig {
        SurrogateConfig {
            hidden: vec![8],
            epochs: 5,
            batch_size: NonZeroUsize::new(8).unwrap(),
            ..SurrogateConfig::default()
        }
    }

    fn manager(dir: &std::path::Path) -> SurrogateManager {
        SurrogateManager::new(
            config(),
            ArtifactStore::new(dir),
            PARAMS,
            StdRng::seed_from_u64(42),
        )
    }

    fn batch(rows: usize, seed: u64) -> SurrogateBatch {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut batch = SurrogateBatch::new(PARAMS);

        for _ in 0..rows {
            let w: Vec<f32> = (0..PARAMS).map(|_| rng.random_range(-1.0..1.0)).collect();
            let ll = -10.0 - w.iter().map(|w| (w * w) as f64).sum::<f64>();
            batch.push(&w, ll);
        }

        batch
    }

    #[test]
    fn uninitialized_before_first_train() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path());

        assert_eq!(manager.version(), 0);
        assert_eq!(manager.predict(&[0.0; PARAMS]).unwrap(), Prediction::Uninitialized);
    }

    #[test]
    fn versions_strictly_increase() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = manager(dir.path());

        let mut last = manager.version();
        for seed in 0..3 {
            let version = manager.train(&batch(40, seed)).unwrap();
            assert!(version > last);
            last = version;
        }

        let stored = ArtifactStore::new(dir.path()).load_latest().unwrap().unwrap();
        assert_eq!(stored.version, last);
        assert_eq!(stored, *manager.current().unwrap());
    }

    #[test]
    fn bounds_are_fixed_by_first_train() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = manager(dir.path());

        manager.train(&batch(40, 1)).unwrap();
        let first = manager.bounds().unwrap();

        let mut lower = batch(10, 2);
        lower.push(&[0.0; PARAMS], -1000.0);
        manager.train(&lower).unwrap();

        assert_eq!(manager.bounds().unwrap(), first);
        assert!(first.max == -1.0 && first.min < -20.0);
    }

    #[test]
    fn predictions_fall_within_bounds() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = manager(dir.path());
        manager.train(&batch(40, 3)).unwrap();
        let bounds = manager.bounds().unwrap();

        let Prediction::Estimate(estimate) = manager.predict(&[0.3, -0.2, 0.9]).unwrap() else {
            panic!("expected an estimate");
        };
        assert!(bounds.min <= estimate.raw && estimate.raw <= bounds.max);
    }

    #[test]
    fn training_data_is_kept_on_request() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());

        let mut discarding = manager(dir.path());
        discarding.train(&batch(20, 5)).unwrap();
        assert!(!store.training_inputs_path().exists());

        let config = SurrogateConfig {
            save_training_data: true,
            ..config()
        };
        let mut keeping =
            SurrogateManager::new(config, store.clone(), PARAMS, StdRng::seed_from_u64(1));

        let mut rows = batch(20, 6);
        rows.push(&[0.0; PARAMS], f64::NAN);
        keeping.train(&rows).unwrap();
        keeping.train(&batch(10, 7)).unwrap();

        let read = |path| std::fs::read_to_string(path).unwrap();
        assert_eq!(read(store.training_inputs_path()).lines().count(), 30);

        let targets = read(store.training_targets_path());
        let versions: Vec<&str> = targets
            .lines()
            .filter_map(|line| line.split_whitespace().next())
            .collect();
        assert_eq!(versions.iter().filter(|&&v| v == "1").count(), 20);
        assert_eq!(versions.iter().filter(|&&v| v == "2").count(), 10);
    }

    #[test]
    fn rejected_batches_keep_current_version() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = manager(dir.path());
        manager.train(&batch(40, 4)).unwrap();

        let mut non_finite = SurrogateBatch::new(PARAMS);
        non_finite.push(&[0.0; PARAMS], f64::NEG_INFINITY);
        assert!(matches!(manager.train(&non_finite), Err(SurrogateErr::EmptyBatch)));

        let malformed = SurrogateBatch::from_raw(PARAMS, vec![0.0; 6]);
        assert!(matches!(
            manager.train(&malformed),
            Err(SurrogateErr::MalformedBatch { .. })
        ));

        assert_eq!(manager.version(), 1);
    }
}
