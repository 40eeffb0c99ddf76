use std::{fmt, io};

use crate::{replica::ReplicaErr, surrogate::SurrogateErr};

/// The result type of a whole run.
pub type Result<T> = std::result::Result<T, RunErr>;

/// A configuration conflict, always detected before any replica starts.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigErr {
    /// Fewer samples than replicas, so some chain would get none.
    NotEnoughSamples { total: usize, replicas: usize },
    /// A probability or fraction outside of its allowed range.
    OutOfRange { name: &'static str, value: f64 },
    /// A quantity that must be strictly positive and finite.
    NotPositive { name: &'static str, value: f64 },
    /// A temperature ladder whose length differs from the amount of replicas.
    LadderLength { ladder: usize, replicas: usize },
    /// A temperature ladder that is not strictly increasing from 1.
    InvalidLadder(String),
    /// A network with a zero sized layer.
    Topology(String),
}

impl fmt::Display for ConfigErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotEnoughSamples { total, replicas } => {
                write!(f, "{total} samples cannot feed {replicas} replicas")
            }
            Self::OutOfRange { name, value } => write!(f, "{name} is out of range: {value}"),
            Self::NotPositive { name, value } => write!(f, "{name} must be positive, got {value}"),
            Self::LadderLength { ladder, replicas } => write!(
                f,
                "temperature ladder has {ladder} entries but there are {replicas} replicas"
            ),
            Self::InvalidLadder(msg) => write!(f, "invalid temperature ladder: {msg}"),
            Self::Topology(msg) => write!(f, "invalid topology: {msg}"),
        }
    }
}

impl std::error::Error for ConfigErr {}

/// All errors that can abort a run.
#[derive(Debug)]
pub enum RunErr {
    /// Invalid configuration, caught before spawning any replica.
    Config(ConfigErr),
    /// A replica could not be set up.
    Replica(ReplicaErr),
    /// The surrogate could not be set up.
    Surrogate(SurrogateErr),
    /// Failed to write the run summary.
    Json(serde_json::Error),
    /// An underlying I/O error not covered by the above variants.
    Io(io::Error),
}

impl fmt::Display for RunErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => write!(f, "invalid config: {e}"),
            Self::Replica(e) => write!(f, "replica error: {e}"),
            Self::Surrogate(e) => write!(f, "surrogate error: {e}"),
            Self::Json(e) => write!(f, "json error: {e}"),
            Self::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl std::error::Error for RunErr {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Config(e) => Some(e),
            Self::Replica(e) => Some(e),
            Self::Surrogate(e) => Some(e),
            Self::Json(e) => Some(e),
            Self::Io(e) => Some(e),
        }
    }
}

impl From<ConfigErr> for RunErr {
    fn from(e: ConfigErr) -> Self {
        Self::Config(e)
    }
}

impl From<ReplicaErr> for RunErr {
    fn from(e: ReplicaErr) -> Self {
        Self::Replica(e)
    }
}

impl From<SurrogateErr> for RunErr {
    fn from(e: SurrogateErr) -> Self {
        Self::Surrogate(e)
    }
}

impl From<serde_json::Error> for RunErr {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e)
    }
}

impl From<io::Error> for RunErr {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}
