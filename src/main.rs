use std::{env, fs, path::PathBuf};

use anyhow::{Context, bail};
use log::info;
use serde::Deserialize;
use surrogate_tempering::{
    RunConfig, RunData,
    oracle::{FeedForward, LabeledData},
    run,
};

/// Learning rate of the gradient steps of the oracle when Langevin proposals are off.
const DEFAULT_LEARNING_RATE: f32 = 0.01;

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum DatasetConfig {
    /// Rows of features followed by the class label, flattened.
    Inline { train: Vec<f32>, test: Vec<f32> },
    /// Whitespace or comma separated text files, one row per line, label last.
    Local { train: PathBuf, test: PathBuf },
}

#[derive(Debug, Deserialize)]
struct LaunchConfig {
    #[serde(flatten)]
    run: RunConfig,
    dataset: DatasetConfig,
}

fn read_rows(path: &PathBuf) -> anyhow::Result<Vec<f32>> {
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;

    text.split(|c: char| c.is_whitespace() || c == ',')
        .filter(|value| !value.is_empty())
        .map(|value| {
            value
                .parse()
                .with_context(|| format!("{}: `{value}` is not a number", path.display()))
        })
        .collect()
}

fn load(dataset: DatasetConfig, inputs: usize) -> anyhow::Result<RunData> {
    let (train, test) = match dataset {
        DatasetConfig::Inline { train, test } => (train, test),
        DatasetConfig::Local { train, test } => (read_rows(&train)?, read_rows(&test)?),
    };

    let train = LabeledData::from_rows(&train, inputs).context("invalid training set")?;
    let test = LabeledData::from_rows(&test, inputs).context("invalid test set")?;
    if train.is_empty() || test.is_empty() {
        bail!("both the training and the test set need at least one row");
    }

    Ok(RunData { train, test })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let path = env::var("CONFIG").context("CONFIG must point to the run configuration")?;
    let text = fs::read_to_string(&path).with_context(|| format!("reading {path}"))?;
    let LaunchConfig { run: config, dataset } = serde_json::from_str(&text)?;

    let data = load(dataset, config.topology.inputs)?;
    info!(
        train = data.train.len(),
        test = data.test.len();
        "loaded dataset"
    );

    let topology = config.topology;
    let learning_rate = config
        .langevin
        .map_or(DEFAULT_LEARNING_RATE, |langevin| langevin.learning_rate);

    let summary = run(config, data, |_| FeedForward::new(topology, learning_rate)).await?;
    println!("{}", serde_json::to_string_pretty(&summary)?);

    Ok(())
}
