//! The learned approximation of the likelihood, shared read-only by the replicas.

mod artifact;
mod batch;
mod client;
mod error;
mod manager;
mod store;

pub use artifact::{
    Estimate, NormalizationBounds, Prediction, Predictor, RegressorSnapshot, SurrogateArtifact,
};
pub use batch::SurrogateBatch;
pub use client::SurrogateClient;
pub use error::{Result, SurrogateErr};
pub use manager::SurrogateManager;
pub use store::ArtifactStore;
