use std::{
    fs, io,
    path::{Path, PathBuf},
};

/// A per-chain table appended to while the chain runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trace {
    /// The parameter vector held after each iteration.
    Params,
    /// The raw log-likelihood of the proposal and of the state held after each iteration.
    Likelihood,
    /// The true and surrogate tempered log-likelihoods of each proposal, and the trailing mean.
    SurrogateComparison,
    /// The running amount of accepted proposals.
    Accepted,
    AccuracyTrain,
    AccuracyTest,
    RmseTrain,
    RmseTest,
}

impl Trace {
    pub const ALL: [Self; 8] = [
        Self::Params,
        Self::Likelihood,
        Self::SurrogateComparison,
        Self::Accepted,
        Self::AccuracyTrain,
        Self::AccuracyTest,
        Self::RmseTrain,
        Self::RmseTest,
    ];

    fn relative(&self, chain: usize) -> PathBuf {
        let posterior = |dir: &str| Path::new("posterior").join(dir).join(format!("chain_{chain}.txt"));
        let predictions =
            |metric: &str| Path::new("predictions").join(format!("{metric}_chain_{chain}.txt"));

        match self {
            Self::Params => posterior("pos_w"),
            Self::Likelihood => posterior("pos_likelihood"),
            Self::SurrogateComparison => posterior("surg_likelihood"),
            Self::Accepted => posterior("accept_list"),
            Self::AccuracyTrain => predictions("acc_train"),
            Self::AccuracyTest => predictions("acc_test"),
            Self::RmseTrain => predictions("rmse_train"),
            Self::RmseTest => predictions("rmse_test"),
        }
    }
}

/// The directory tree of a run.
#[derive(Debug, Clone)]
pub struct RunLayout {
    root: PathBuf,
}

impl RunLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Creates every directory of the tree.
    pub fn create(&self) -> io::Result<()> {
        for dir in ["pos_w", "pos_likelihood", "surg_likelihood", "accept_list"] {
            fs::create_dir_all(self.root.join("posterior").join(dir))?;
        }
        fs::create_dir_all(self.root.join("predictions"))?;
        fs::create_dir_all(self.surrogate_dir())
    }

    pub fn trace(&self, trace: Trace, chain: usize) -> PathBuf {
        self.root.join(trace.relative(chain))
    }

    pub fn accept_ratio(&self, chain: usize) -> PathBuf {
        self.root
            .join("posterior")
            .join("accept_list")
            .join(format!("chain_{chain}_accept.txt"))
    }

    pub fn surrogate_dir(&self) -> PathBuf {
        self.root.join("surrogate")
    }

    pub fn summary(&self) -> PathBuf {
        self.root.join("summary.json")
    }
}
