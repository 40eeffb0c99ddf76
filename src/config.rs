use std::{num::NonZeroUsize, path::PathBuf};

use serde::{Deserialize, Deserializer, de::Error as _};

use crate::{error::ConfigErr, exchange::ladder};

/// The widths of the classifier evaluated by the likelihood oracle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Topology {
    pub inputs: usize,
    pub hidden: usize,
    pub outputs: usize,
}

impl Topology {
    /// Returns the amount of weights and biases of a network with this topology.
    pub fn param_count(&self) -> usize {
        (self.inputs + 1) * self.hidden + (self.hidden + 1) * self.outputs
    }
}

/// Settings of the gradient informed proposal.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct LangevinConfig {
    /// Probability of proposing from a gradient step instead of a plain random walk.
    pub probability: f64,
    pub learning_rate: f32,
    /// Gradient descent sweeps per proposal.
    pub depth: usize,
}

/// Settings of the surrogate regressor and its training routine.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SurrogateConfig {
    pub hidden: Vec<usize>,
    pub epochs: usize,
    pub batch_size: NonZeroUsize,
    pub learning_rate: f32,
    pub patience: usize,
    pub validation_split: f32,
    /// Upper normalization bound of the raw log-likelihood targets.
    pub likelihood_ceiling: f64,
    /// Keep the rows every version was trained on under `surrogate/training_data`.
    pub save_training_data: bool,
}

impl Default for SurrogateConfig {
    fn default() -> Self {
        Self {
            hidden: vec![64, 16],
            epochs: 20,
            batch_size: NonZeroUsize::new(50).unwrap_or(NonZeroUsize::MIN),
            learning_rate: 0.001,
            patience: 5,
            validation_split: 0.1,
            likelihood_ceiling: -1.0,
            save_training_data: false,
        }
    }
}

/// The typed configuration of a run.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RunConfig {
    pub replicas: NonZeroUsize,
    pub total_samples: usize,
    #[serde(default = "default_swap_interval")]
    pub swap_interval: NonZeroUsize,
    /// Retraining cadence, as a fraction of the samples of each chain.
    #[serde(default = "default_surrogate_interval_ratio")]
    pub surrogate_interval_ratio: f64,
    #[serde(default = "default_surrogate_probability")]
    pub surrogate_probability: f64,
    #[serde(
        default = "default_max_temperature",
        deserialize_with = "deserialize_temperature"
    )]
    pub max_temperature: f64,
    #[serde(default = "default_step_size")]
    pub step_size: f64,
    #[serde(default = "default_prior_variance")]
    pub prior_variance: f64,
    #[serde(default = "default_burn_in")]
    pub burn_in: f64,
    /// Fraction of the samples of each chain after which every replica samples at temperature 1.
    #[serde(default = "default_canonical_fraction")]
    pub canonical_fraction: f64,
    /// Iterations before a replica may use the surrogate, defaults to `swap_interval`.
    #[serde(default)]
    pub warmup: Option<usize>,
    #[serde(default = "default_compare_surrogate")]
    pub compare_surrogate: bool,
    #[serde(default)]
    pub langevin: Option<LangevinConfig>,
    pub topology: Topology,
    #[serde(default)]
    pub surrogate: SurrogateConfig,
    /// An explicit ladder, replacing the geometric one.
    #[serde(default)]
    pub temperatures: Option<Vec<f64>>,
    #[serde(default)]
    pub seed: Option<u64>,
    pub output_dir: PathBuf,
}

fn default_swap_interval() -> NonZeroUsize {
    NonZeroUsize::new(50).unwrap_or(NonZeroUsize::MIN)
}

fn default_surrogate_interval_ratio() -> f64 {
    0.05
}

fn default_surrogate_probability() -> f64 {
    0.5
}

fn default_max_temperature() -> f64 {
    4.0
}

fn default_step_size() -> f64 {
    0.025
}

fn default_prior_variance() -> f64 {
    25.0
}

fn default_burn_in() -> f64 {
    0.2
}

fn default_canonical_fraction() -> f64 {
    1.0
}

fn default_compare_surrogate() -> bool {
    true
}

/// Accepts either a number or the string `"inf"`, JSON having no literal for infinity.
fn deserialize_temperature<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(t) => Ok(t),
        Raw::Text(s) if matches!(s.to_ascii_lowercase().as_str(), "inf" | "infinity") => {
            Ok(f64::INFINITY)
        }
        Raw::Text(s) => Err(D::Error::custom(format!("invalid temperature `{s}`"))),
    }
}

impl RunConfig {
    /// Creates a configuration with every optional setting at its default.
    ///
    /// # Arguments
    /// * `replicas` - The amount of chains.
    /// * `total_samples` - The sample budget, split evenly among the chains.
    /// * `topology` - The classifier whose weights are sampled.
    /// * `output_dir` - Where the run is persisted.
    pub fn new(
        replicas: NonZeroUsize,
        total_samples: usize,
        topology: Topology,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            replicas,
            total_samples,
            swap_interval: default_swap_interval(),
            surrogate_interval_ratio: default_surrogate_interval_ratio(),
            surrogate_probability: default_surrogate_probability(),
            max_temperature: default_max_temperature(),
            step_size: default_step_size(),
            prior_variance: default_prior_variance(),
            burn_in: default_burn_in(),
            canonical_fraction: default_canonical_fraction(),
            warmup: None,
            compare_surrogate: default_compare_surrogate(),
            langevin: None,
            topology,
            surrogate: SurrogateConfig::default(),
            temperatures: None,
            seed: None,
            output_dir: output_dir.into(),
        }
    }

    pub fn samples_per_chain(&self) -> usize {
        self.total_samples / self.replicas.get()
    }

    /// Returns the amount of exchange cycles the coordinator drives, one per checkpoint.
    ///
    /// Row 0 of every chain is its initial state and each following row is one iteration, so a
    /// chain checkpoints at every multiple of `swap_interval` strictly between the first and the
    /// last iteration.
    pub fn checkpoints(&self) -> usize {
        self.samples_per_chain().saturating_sub(2) / self.swap_interval.get()
    }

    /// Returns the retraining cadence in iterations.
    pub fn surrogate_interval(&self) -> usize {
        ((self.surrogate_interval_ratio * self.samples_per_chain() as f64) as usize).max(1)
    }

    /// Returns the iteration after which every replica samples at temperature 1.
    pub fn pivot(&self) -> usize {
        (self.canonical_fraction * self.samples_per_chain() as f64) as usize
    }

    pub fn warmup(&self) -> usize {
        self.warmup.unwrap_or(self.swap_interval.get())
    }

    pub fn surrogate_enabled(&self) -> bool {
        self.surrogate_probability > 0.0
    }

    /// Checks every setting and resolves the temperature ladder.
    ///
    /// # Returns
    /// One temperature per replica, in ascending order.
    ///
    /// # Errors
    /// The first conflict found in the configuration.
    pub fn validate(&self) -> Result<Vec<f64>, ConfigErr> {
        let replicas = self.replicas.get();

        if self.samples_per_chain() == 0 {
            return Err(ConfigErr::NotEnoughSamples {
                total: self.total_samples,
                replicas,
            });
        }

        let fractions = [
            ("surrogate_probability", self.surrogate_probability),
            ("surrogate_interval_ratio", self.surrogate_interval_ratio),
            ("canonical_fraction", self.canonical_fraction),
        ];
        for (name, value) in fractions {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigErr::OutOfRange { name, value });
            }
        }

        if !(0.0..1.0).contains(&self.burn_in) {
            return Err(ConfigErr::OutOfRange {
                name: "burn_in",
                value: self.burn_in,
            });
        }

        for (name, value) in [
            ("step_size", self.step_size),
            ("prior_variance", self.prior_variance),
        ] {
            if !(value > 0.0 && value.is_finite()) {
                return Err(ConfigErr::NotPositive { name, value });
            }
        }

        if let Some(langevin) = &self.langevin {
            if !(0.0..=1.0).contains(&langevin.probability) {
                return Err(ConfigErr::OutOfRange {
                    name: "langevin.probability",
                    value: langevin.probability,
                });
            }
        }

        let validation_split = self.surrogate.validation_split as f64;
        if !(0.0..1.0).contains(&validation_split) {
            return Err(ConfigErr::OutOfRange {
                name: "surrogate.validation_split",
                value: validation_split,
            });
        }

        let Topology {
            inputs,
            hidden,
            outputs,
        } = self.topology;
        if inputs == 0 || hidden == 0 || outputs == 0 {
            return Err(ConfigErr::Topology(format!(
                "every layer needs at least one unit, got [{inputs}, {hidden}, {outputs}]"
            )));
        }
        if self.surrogate.hidden.contains(&0) {
            return Err(ConfigErr::Topology(
                "surrogate hidden layers need at least one unit".into(),
            ));
        }

        let temperatures = match &self.temperatures {
            Some(explicit) => {
                ladder::check(explicit)?;
                explicit.clone()
            }
            None => ladder::geometric(replicas, self.max_temperature)?,
        };

        if temperatures.len() != replicas {
            return Err(ConfigErr::LadderLength {
                ladder: temperatures.len(),
                replicas,
            });
        }

        Ok(temperatures)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topology() -> Topology {
        Topology {
            inputs: 4,
            hidden: 5,
            outputs: 3,
        }
    }

    fn config() -> RunConfig {
        RunConfig::new(NonZeroUsize::new(4).unwrap(), 2000, topology(), "out")
    }

    #[test]
    fn derived_quantities() {
        let config = config();

        assert_eq!(config.samples_per_chain(), 500);
        assert_eq!(config.checkpoints(), 9);
        assert_eq!(config.surrogate_interval(), 25);
        assert_eq!(config.pivot(), 500);
        assert_eq!(config.warmup(), 50);
        assert_eq!(topology().param_count(), 5 * 5 + 6 * 3);
    }

    #[test]
    fn default_ladder_has_one_entry_per_replica() {
        let ladder = config().validate().unwrap();
        assert_eq!(ladder.len(), 4);
        assert_eq!(ladder[0], 1.0);
        assert!((ladder[3] - 4.0).abs() < 1e-12);
    }

    #[test]
    fn explicit_ladder_must_match_replicas() {
        let mut config = config();
        config.temperatures = Some(vec![1.0, 2.0, 3.0]);

        assert_eq!(
            config.validate(),
            Err(ConfigErr::LadderLength {
                ladder: 3,
                replicas: 4
            })
        );
    }

    #[test]
    fn rejects_out_of_range_probability() {
        let mut config = config();
        config.surrogate_probability = 1.5;

        assert!(matches!(
            config.validate(),
            Err(ConfigErr::OutOfRange {
                name: "surrogate_probability",
                ..
            })
        ));
    }

    #[test]
    fn rejects_starved_replicas() {
        let mut config = config();
        config.total_samples = 3;

        assert!(matches!(
            config.validate(),
            Err(ConfigErr::NotEnoughSamples { .. })
        ));
    }

    #[test]
    fn parses_json_with_defaults() {
        let json = r#"{
            "replicas": 2,
            "total_samples": 100,
            "max_temperature": "inf",
            "topology": { "inputs": 2, "hidden": 3, "outputs": 2 },
            "output_dir": "/tmp/run"
        }"#;

        let config: RunConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.max_temperature, f64::INFINITY);
        assert_eq!(config.swap_interval.get(), 50);
        assert_eq!(config.surrogate, SurrogateConfig::default());
        assert_eq!(config.validate().unwrap(), vec![1.0, f64::INFINITY]);
    }
}
