//! The likelihood oracle: the expensive, exact evaluator of a parameter vector against data.

mod data;
mod feedforward;

use std::fmt;

use machine_learning::MlErr;
use ndarray::Array2;

pub use data::LabeledData;
pub use feedforward::FeedForward;

/// The outputs of a model for every row of a dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    /// The predicted class of each row.
    pub predictions: Vec<usize>,
    /// One row of class probabilities per data row.
    pub probabilities: Array2<f64>,
}

/// A log-likelihood both as is and divided by the temperature it was sampled at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogLikelihood {
    pub raw: f64,
    pub tempered: f64,
}

impl LogLikelihood {
    pub fn new(raw: f64, temperature: f64) -> Self {
        Self {
            raw,
            tempered: raw / temperature,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.raw.is_finite() && self.tempered.is_finite()
    }
}

/// A tempered log-likelihood plus the diagnostics of the same forward pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Score {
    pub log_likelihood: LogLikelihood,
    /// Percentage of rows whose predicted class matches the label.
    pub accuracy: f64,
    /// Root mean squared difference between the predicted class index and the label.
    pub rmse: f64,
}

#[derive(Debug)]
pub enum OracleErr {
    Ml(MlErr),
    /// A label that does not name one of the model's classes.
    LabelOutOfRange { label: usize, classes: usize },
    /// A label column value that is not a class index.
    InvalidLabel(f32),
}

impl fmt::Display for OracleErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ml(e) => write!(f, "model error: {e}"),
            Self::LabelOutOfRange { label, classes } => {
                write!(f, "label {label} is not one of the {classes} classes")
            }
            Self::InvalidLabel(value) => write!(f, "{value} is not a class label"),
        }
    }
}

impl std::error::Error for OracleErr {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Ml(e) => Some(e),
            _ => None,
        }
    }
}

impl From<MlErr> for OracleErr {
    fn from(e: MlErr) -> Self {
        Self::Ml(e)
    }
}

/// An evaluator of parameter vectors. Every call is independent of the previous ones, the
/// receiver is mutable only so implementations can reuse buffers.
pub trait LikelihoodOracle {
    /// Returns the length of the parameter vectors this oracle evaluates.
    fn param_count(&self) -> usize;

    /// Runs the model parameterized by `params` over `data`.
    fn evaluate(&mut self, params: &[f32], data: &LabeledData) -> Result<Evaluation, OracleErr>;

    /// Computes the log-likelihood of `labels` under `evaluation`, tempered by `temperature`.
    fn log_likelihood(
        &self,
        evaluation: &Evaluation,
        labels: &[usize],
        temperature: f64,
    ) -> LogLikelihood;

    /// Moves `params` `depth` gradient descent sweeps towards a better fit of `data`.
    fn gradient_step(
        &mut self,
        params: &[f32],
        data: &LabeledData,
        depth: usize,
    ) -> Result<Vec<f32>, OracleErr>;

    /// Evaluates `params` and derives its tempered log-likelihood and diagnostics.
    fn score(
        &mut self,
        params: &[f32],
        data: &LabeledData,
        temperature: f64,
    ) -> Result<Score, OracleErr> {
        let evaluation = self.evaluate(params, data)?;
        let log_likelihood = self.log_likelihood(&evaluation, data.labels(), temperature);

        let n = data.labels().len().max(1) as f64;
        let (hits, squares) = evaluation
            .predictions
            .iter()
            .zip(data.labels())
            .fold((0usize, 0.0), |(hits, squares), (&p, &y)| {
                let diff = p as f64 - y as f64;
                (hits + (p == y) as usize, squares + diff * diff)
            });

        Ok(Score {
            log_likelihood,
            accuracy: 100.0 * hits as f64 / n,
            rmse: (squares / n).sqrt(),
        })
    }
}
