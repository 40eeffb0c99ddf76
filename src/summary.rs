//! Population level diagnostics, aggregated from the traces the chains persisted.

use std::{
    fs::{self, File},
    io::{self, BufWriter},
    path::Path,
};

use log::info;
use serde::Serialize;

use crate::{
    RunErr,
    layout::{RunLayout, Trace},
};

/// The tally of swap proposals over a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SwapStats {
    pub proposals: usize,
    pub accepted: usize,
}

impl SwapStats {
    /// Returns the percentage of accepted proposals, if any was made.
    pub fn ratio(&self) -> Option<f64> {
        (self.proposals > 0).then(|| 100.0 * self.accepted as f64 / self.proposals as f64)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Moments {
    pub mean: f64,
    pub std: f64,
    pub max: f64,
}

impl Moments {
    /// Computes the moments of the finite values of `values`, `None` if there are none.
    pub fn of(values: impl IntoIterator<Item = f64>) -> Option<Self> {
        let values: Vec<f64> = values.into_iter().filter(|v| v.is_finite()).collect();
        if values.is_empty() {
            return None;
        }

        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        Some(Self {
            mean,
            std: variance.sqrt(),
            max,
        })
    }
}

/// The diagnostics of one chain after burn-in.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChainSummary {
    pub index: usize,
    /// Rows recorded, burn-in included.
    pub samples: usize,
    pub accept_ratio: Option<f64>,
    pub accuracy_train: Option<f64>,
    pub accuracy_test: Option<f64>,
    pub rmse_train: Option<f64>,
    pub rmse_test: Option<f64>,
}

/// The health and quality metrics of a whole run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub chains: Vec<ChainSummary>,
    /// Replicas that terminated before running their whole budget.
    pub dead: Vec<usize>,
    /// Mean of the acceptance ratios of the surviving chains.
    pub accept_ratio: Option<f64>,
    pub swap_proposals: usize,
    pub swap_accepted: usize,
    pub swap_ratio: Option<f64>,
    pub accuracy_train: Option<Moments>,
    pub accuracy_test: Option<Moments>,
    pub rmse_train: Option<f64>,
    pub rmse_test: Option<f64>,
    pub surrogate_versions: u64,
    /// Root mean squared difference between surrogate and true tempered likelihoods, over the
    /// iterations where both were computed.
    pub surrogate_rmse: Option<f64>,
}

/// Post burn-in columns of one chain.
#[derive(Default)]
struct Columns {
    accuracy_train: Vec<f64>,
    accuracy_test: Vec<f64>,
    rmse_train: Vec<f64>,
    rmse_test: Vec<f64>,
    surrogate_errors: Vec<f64>,
}

impl RunSummary {
    /// Reads back the traces of every surviving chain and aggregates them.
    ///
    /// # Arguments
    /// * `layout` - The run directory.
    /// * `replicas` - The size of the population.
    /// * `burn_in` - The fraction of leading rows of each chain left out.
    /// * `dead` - The replicas whose traces are incomplete.
    /// * `swaps` - The swap proposals made by the coordinator.
    /// * `surrogate_versions` - The latest surrogate version published.
    ///
    /// # Errors
    /// If a trace of a surviving chain is missing or is not numeric.
    pub fn aggregate(
        layout: &RunLayout,
        replicas: usize,
        burn_in: f64,
        dead: &[usize],
        swaps: SwapStats,
        surrogate_versions: u64,
    ) -> io::Result<Self> {
        let mut chains = Vec::new();
        let mut population = Columns::default();

        for index in (0..replicas).filter(|i| !dead.contains(i)) {
            let (chain, columns) = summarize_chain(layout, index, burn_in)?;
            chains.push(chain);

            population.accuracy_train.extend(columns.accuracy_train);
            population.accuracy_test.extend(columns.accuracy_test);
            population.rmse_train.extend(columns.rmse_train);
            population.rmse_test.extend(columns.rmse_test);
            population.surrogate_errors.extend(columns.surrogate_errors);
        }

        let accept_ratio = mean(chains.iter().filter_map(|chain| chain.accept_ratio));
        let surrogate_rmse = mean(population.surrogate_errors).map(f64::sqrt);

        Ok(Self {
            chains,
            dead: dead.to_vec(),
            accept_ratio,
            swap_proposals: swaps.proposals,
            swap_accepted: swaps.accepted,
            swap_ratio: swaps.ratio(),
            accuracy_train: Moments::of(population.accuracy_train),
            accuracy_test: Moments::of(population.accuracy_test),
            rmse_train: mean(population.rmse_train),
            rmse_test: mean(population.rmse_test),
            surrogate_versions,
            surrogate_rmse,
        })
    }

    pub fn write(&self, path: &Path) -> Result<(), RunErr> {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, self)?;

        info!(
            accept_ratio = self.accept_ratio.unwrap_or(f64::NAN),
            swap_ratio = self.swap_ratio.unwrap_or(f64::NAN),
            dead = self.dead.len();
            "wrote run summary"
        );
        Ok(())
    }
}

fn summarize_chain(
    layout: &RunLayout,
    index: usize,
    burn_in: f64,
) -> io::Result<(ChainSummary, Columns)> {
    let likelihoods = read_table(&layout.trace(Trace::Likelihood, index))?;
    let samples = likelihoods.len();
    let skip = (burn_in * samples as f64) as usize;

    let column = |trace: Trace| -> io::Result<Vec<f64>> {
        Ok(read_table(&layout.trace(trace, index))?
            .into_iter()
            .skip(skip)
            .filter_map(|row| row.first().copied())
            .filter(|v| v.is_finite())
            .collect())
    };

    let surrogate_errors = read_table(&layout.trace(Trace::SurrogateComparison, index))?
        .into_iter()
        .skip(skip)
        .filter_map(|row| match row[..] {
            [truth, surrogate, ..] if truth.is_finite() && surrogate.is_finite() => {
                Some((truth - surrogate).powi(2))
            }
            _ => None,
        })
        .collect();

    let columns = Columns {
        accuracy_train: column(Trace::AccuracyTrain)?,
        accuracy_test: column(Trace::AccuracyTest)?,
        rmse_train: column(Trace::RmseTrain)?,
        rmse_test: column(Trace::RmseTest)?,
        surrogate_errors,
    };

    let accept_ratio = read_table(&layout.accept_ratio(index))?
        .first()
        .and_then(|row| row.first().copied());

    let chain = ChainSummary {
        index,
        samples,
        accept_ratio,
        accuracy_train: mean(columns.accuracy_train.iter().copied()),
        accuracy_test: mean(columns.accuracy_test.iter().copied()),
        rmse_train: mean(columns.rmse_train.iter().copied()),
        rmse_test: mean(columns.rmse_test.iter().copied()),
    };

    Ok((chain, columns))
}

/// Parses a whitespace separated numeric table, `inf` included.
pub fn read_table(path: &Path) -> io::Result<Vec<Vec<f64>>> {
    fs::read_to_string(path)?
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            line.split_whitespace()
                .map(|value| {
                    value.parse::<f64>().map_err(|e| {
                        io::Error::new(
                            io::ErrorKind::InvalidData,
                            format!("{}: `{value}`: {e}", path.display()),
                        )
                    })
                })
                .collect()
        })
        .collect()
}

fn mean(values: impl IntoIterator<Item = f64>) -> Option<f64> {
    let (sum, n) = values
        .into_iter()
        .filter(|v| v.is_finite())
        .fold((0.0, 0usize), |(sum, n), v| (sum + v, n + 1));

    (n > 0).then(|| sum / n as f64)
}
