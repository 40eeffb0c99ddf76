//! The replica worker: one Metropolis-Hastings chain at one temperature.

pub mod acceptance;
mod gate;
mod proposal;
mod state;
mod trace;
mod worker;

use std::{fmt, io};

pub use gate::SurrogateGate;
pub use proposal::{Proposal, RandomWalk};
pub use state::{ChainState, Metrics, Source, TrailingWindow};
pub use trace::{TraceRow, TraceWriter, UNKNOWN};
pub use worker::ReplicaWorker;

use crate::{
    config::{LangevinConfig, RunConfig},
    oracle::OracleErr,
};

#[derive(Debug)]
pub enum ReplicaErr {
    Io(io::Error),
    /// The initial state could not be evaluated, so the chain has nowhere to start from.
    Oracle(OracleErr),
}

impl fmt::Display for ReplicaErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "trace i/o error: {e}"),
            Self::Oracle(e) => write!(f, "failed to evaluate the initial state: {e}"),
        }
    }
}

impl std::error::Error for ReplicaErr {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Oracle(e) => Some(e),
        }
    }
}

impl From<io::Error> for ReplicaErr {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<OracleErr> for ReplicaErr {
    fn from(e: OracleErr) -> Self {
        Self::Oracle(e)
    }
}

/// The part of the run configuration every replica shares.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReplicaSettings {
    /// Rows recorded per chain, the initial state included.
    pub samples: usize,
    pub swap_interval: usize,
    pub pivot: usize,
    pub step_size: f64,
    pub prior_variance: f64,
    pub gate: SurrogateGate,
    pub compare_surrogate: bool,
    pub langevin: Option<LangevinConfig>,
    /// Whether true-path observations are buffered for the surrogate.
    pub collect_batches: bool,
}

impl ReplicaSettings {
    pub fn from_config(config: &RunConfig) -> Self {
        Self {
            samples: config.samples_per_chain(),
            swap_interval: config.swap_interval.get(),
            pivot: config.pivot(),
            step_size: config.step_size,
            prior_variance: config.prior_variance,
            gate: SurrogateGate::new(config.warmup(), config.surrogate_probability),
            compare_surrogate: config.compare_surrogate,
            langevin: config.langevin,
            collect_batches: config.surrogate_enabled(),
        }
    }
}

/// The final diagnostics of a replica that ran its whole budget.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplicaReport {
    pub index: usize,
    pub accepted: usize,
    pub proposals: usize,
    /// Percentage of accepted proposals.
    pub accept_ratio: f64,
    /// Checkpoints at which the replica continued from a neighbour's state.
    pub swaps_adopted: usize,
}
