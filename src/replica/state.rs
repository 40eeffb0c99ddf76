use std::collections::VecDeque;

use super::acceptance::log_prior;
use crate::{
    exchange::SwapMessage,
    oracle::{LogLikelihood, Score},
    surrogate::SurrogateBatch,
};

/// The amount of recent likelihoods blended with a surrogate estimate.
pub const WINDOW: usize = 3;

/// The most recent tempered likelihoods of the true path.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrailingWindow {
    values: VecDeque<f64>,
}

impl TrailingWindow {
    pub fn push(&mut self, value: f64) {
        if self.values.len() == WINDOW {
            self.values.pop_front();
        }
        self.values.push_back(value);
    }

    pub fn is_full(&self) -> bool {
        self.values.len() == WINDOW
    }

    /// Returns the mean of the window, or `None` until it is full.
    pub fn mean(&self) -> Option<f64> {
        self.is_full()
            .then(|| self.values.iter().sum::<f64>() / WINDOW as f64)
    }

    /// Mixes a tempered surrogate estimate evenly with the mean of the window, leaving the
    /// window as is. `None` until the window is full.
    pub fn blend(&self, estimate: f64) -> Option<f64> {
        self.mean().map(|mean| 0.5 * estimate + 0.5 * mean)
    }
}

/// Forward pass diagnostics of the held state on both datasets.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Metrics {
    pub accuracy_train: f64,
    pub accuracy_test: f64,
    pub rmse_train: f64,
    pub rmse_test: f64,
}

impl Metrics {
    pub fn new(train: &Score, test: &Score) -> Self {
        Self {
            accuracy_train: train.accuracy,
            accuracy_test: test.accuracy,
            rmse_train: train.rmse,
            rmse_test: test.rmse,
        }
    }
}

/// Where the likelihood of the held state came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    True,
    Surrogate,
    /// Adopted from a neighbour at a checkpoint.
    Exchanged,
}

/// The state of one chain, owned by its replica alone.
#[derive(Debug, Clone)]
pub struct ChainState {
    pub params: Vec<f32>,
    pub log_prior: f64,
    pub likelihood: LogLikelihood,
    pub temperature: f64,
    pub source: Source,
    /// Unknown when the likelihood did not come from a forward pass.
    pub metrics: Option<Metrics>,
    pub accepted: usize,
    pub buffer: SurrogateBatch,
    pub window: TrailingWindow,
}

impl ChainState {
    pub fn new(params: Vec<f32>, temperature: f64, prior_variance: f64) -> Self {
        Self {
            log_prior: log_prior(&params, prior_variance),
            buffer: SurrogateBatch::new(params.len()),
            params,
            likelihood: LogLikelihood::new(f64::NEG_INFINITY, temperature),
            temperature,
            source: Source::True,
            metrics: None,
            accepted: 0,
            window: TrailingWindow::default(),
        }
    }

    /// Holds a new true-path likelihood and its diagnostics. A non-finite likelihood is held as
    /// negative infinity so any finite proposal replaces it.
    pub fn hold_evaluation(&mut self, likelihood: LogLikelihood, metrics: Metrics) {
        self.likelihood = if likelihood.is_finite() {
            likelihood
        } else {
            LogLikelihood::new(f64::NEG_INFINITY, self.temperature)
        };
        self.metrics = Some(metrics);
        self.source = Source::True;
    }

    /// Returns the accepted proposals as a percentage of `proposals`.
    pub fn accept_ratio(&self, proposals: usize) -> f64 {
        if proposals == 0 {
            return 0.0;
        }
        100.0 * self.accepted as f64 / proposals as f64
    }

    /// Seals the state into the message handed over at a checkpoint.
    pub fn snapshot(&self, iteration: usize) -> SwapMessage {
        SwapMessage {
            params: self.params.clone(),
            auxiliary: self.log_prior,
            scaled_log_likelihood: self.likelihood.raw,
            temperature: self.temperature,
            iteration,
        }
    }

    /// Continues from a neighbour's state, rescaling its likelihood to this replica's temperature.
    pub fn adopt(&mut self, message: SwapMessage) {
        self.params = message.params;
        self.log_prior = message.auxiliary;
        self.likelihood = LogLikelihood::new(message.scaled_log_likelihood, self.temperature);
        self.metrics = None;
        self.source = Source::Exchanged;
    }

    /// Moves the buffered observations out.
    ///
    /// # Returns
    /// `None` if nothing was observed since the last handoff.
    pub fn take_buffer(&mut self) -> Option<SurrogateBatch> {
        if self.buffer.is_empty() {
            return None;
        }
        Some(self.buffer.take())
    }
}
