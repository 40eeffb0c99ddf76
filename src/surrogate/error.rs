use std::{
    error::Error,
    fmt::{self, Display},
    io,
};

use machine_learning::MlErr;

pub type Result<T> = std::result::Result<T, SurrogateErr>;

#[derive(Debug)]
pub enum SurrogateErr {
    Io(io::Error),
    Json(serde_json::Error),
    Ml(MlErr),
    /// A batch whose rows are not a parameter vector followed by its log-likelihood.
    MalformedBatch { columns: usize, expected: usize },
    /// No finite row survived filtering.
    EmptyBatch,
    /// Normalization bounds that do not describe a range.
    DegenerateBounds { min: f64, max: f64 },
    /// A persisted file whose contents could not be parsed.
    Corrupt { file: String },
}

impl Display for SurrogateErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "io error: {e}"),
            Self::Json(e) => write!(f, "serialization error: {e}"),
            Self::Ml(e) => write!(f, "training error: {e}"),
            Self::MalformedBatch { columns, expected } => {
                write!(f, "batch has {columns} columns, expected {expected}")
            }
            Self::EmptyBatch => write!(f, "batch has no finite rows"),
            Self::DegenerateBounds { min, max } => {
                write!(f, "normalization bounds [{min}, {max}] are empty")
            }
            Self::Corrupt { file } => write!(f, "{file} is corrupt"),
        }
    }
}

impl Error for SurrogateErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Json(e) => Some(e),
            Self::Ml(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for SurrogateErr {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<serde_json::Error> for SurrogateErr {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e)
    }
}

impl From<MlErr> for SurrogateErr {
    fn from(e: MlErr) -> Self {
        Self::Ml(e)
    }
}
