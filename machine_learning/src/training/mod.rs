mod model_trainer;

pub use model_trainer::{FitConfig, FitReport, ModelTrainer};
