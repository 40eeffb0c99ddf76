use std::sync::Arc;

use log::{debug, warn};

use super::{ArtifactStore, Prediction, Predictor, SurrogateArtifact};

/// A replica's read-only handle on the surrogate.
///
/// The handle is refreshed with the version released at each checkpoint. Until one has been
/// received, the client falls back to the latest version committed to the store, probing it at
/// most once per segment. The regressor of a version is built once, when the version is
/// adopted.
#[derive(Debug)]
pub struct SurrogateClient {
    store: ArtifactStore,
    predictor: Option<Predictor>,
    probed: bool,
}

impl SurrogateClient {
    pub fn new(store: ArtifactStore) -> Self {
        Self {
            store,
            predictor: None,
            probed: false,
        }
    }

    /// Returns the version in use, if any.
    pub fn version(&self) -> Option<u64> {
        self.predictor.as_ref().map(Predictor::version)
    }

    /// Switches to the version released by the coordinator.
    pub fn adopt(&mut self, artifact: Option<Arc<SurrogateArtifact>>) {
        if let Some(artifact) = artifact {
            if self.version() != Some(artifact.version) {
                self.predictor = Some(Predictor::new(artifact));
            }
        }
        self.probed = false;
    }

    /// Estimates the raw log-likelihood of `point`.
    ///
    /// # Returns
    /// `Prediction::Uninitialized` if no version is available or it cannot serve `point`, in which
    /// case the caller evaluates the true likelihood instead.
    pub fn predict(&mut self, point: &[f32]) -> Prediction {
        if self.predictor.is_none() && !self.probed {
            self.probed = true;

            match self.store.load_latest() {
                Ok(Some(artifact)) => {
                    debug!(version = artifact.version; "loaded surrogate from store");
                    self.predictor = Some(Predictor::new(Arc::new(artifact)));
                }
                Ok(None) => {}
                Err(e) => warn!("failed to load surrogate: {e}"),
            }
        }

        let Some(predictor) = &mut self.predictor else {
            return Prediction::Uninitialized;
        };

        match predictor.predict(point) {
            Ok(estimate) => Prediction::Estimate(estimate),
            Err(e) => {
                warn!(version = predictor.version(); "surrogate prediction failed: {e}");
                Prediction::Uninitialized
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surrogate::{NormalizationBounds, RegressorSnapshot};

    fn artifact(version: u64) -> SurrogateArtifact {
        SurrogateArtifact {
            version,
            bounds: NormalizationBounds::new(-30.0, -1.0).unwrap(),
            regressor: RegressorSnapshot {
                inputs: 1,
                hidden: vec![],
                params: vec![0.0, 0.0],
            },
        }
    }

    #[test]
    fn uninitialized_without_any_version() {
        let dir = tempfile::tempdir().unwrap();
        let mut client = SurrogateClient::new(ArtifactStore::new(dir.path()));

        assert_eq!(client.predict(&[0.5]), Prediction::Uninitialized);
        assert_eq!(client.version(), None);
    }

    #[test]
    fn falls_back_to_committed_version() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        store.publish(&artifact(3)).unwrap();

        let mut client = SurrogateClient::new(store);
        let Prediction::Estimate(estimate) = client.predict(&[0.5]) else {
            panic!("expected an estimate");
        };

        // a zeroed sigmoid unit sits halfway
        assert!((estimate.normalized - 0.5).abs() < 1e-6);
        assert!((estimate.raw + 15.5).abs() < 1e-4);
        assert_eq!(client.version(), Some(3));
    }

    #[test]
    fn released_version_replaces_previous() {
        let dir = tempfile::tempdir().unwrap();
        let mut client = SurrogateClient::new(ArtifactStore::new(dir.path()));

        client.adopt(Some(Arc::new(artifact(1))));
        client.adopt(None);
        assert_eq!(client.version(), Some(1));

        client.adopt(Some(Arc::new(artifact(2))));
        assert_eq!(client.version(), Some(2));
    }

    #[test]
    fn adopted_version_serves_repeated_predictions() {
        let dir = tempfile::tempdir().unwrap();
        let mut client = SurrogateClient::new(ArtifactStore::new(dir.path()));
        let artifact = Arc::new(artifact(5));
        client.adopt(Some(Arc::clone(&artifact)));
        client.adopt(Some(Arc::clone(&artifact)));

        for point in [[0.5], [-3.0], [0.5]] {
            assert_eq!(
                client.predict(&point),
                Prediction::Estimate(artifact.predict(&point).unwrap())
            );
        }
        // nothing was published, the store was never needed
        assert!(!dir.path().join("model_signature.txt").exists());
    }
}
