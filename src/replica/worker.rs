use std::{fs, path::PathBuf, sync::Arc};

use log::{debug, info, trace, warn};
use rand::{Rng, rngs::StdRng};

use super::{
    ReplicaErr, ReplicaReport, ReplicaSettings,
    acceptance::{acceptance_probability, log_prior},
    proposal::{Proposal, RandomWalk},
    state::{ChainState, Metrics, Source},
    trace::{TraceRow, TraceWriter, UNKNOWN},
};
use crate::{
    exchange::{ReplicaLink, RunData},
    layout::RunLayout,
    oracle::{LikelihoodOracle, LogLikelihood, OracleErr},
    surrogate::{ArtifactStore, Estimate, Prediction, SurrogateClient},
};

/// How a proposal was evaluated.
enum Evaluated {
    True {
        likelihood: LogLikelihood,
        metrics: Metrics,
    },
    Surrogate {
        likelihood: LogLikelihood,
        /// The true tempered likelihood, computed for diagnostics only.
        comparison: Option<f64>,
    },
    /// The oracle failed or returned a non-finite likelihood.
    Invalid,
}

/// Runs one chain of the population on a blocking thread.
pub struct ReplicaWorker<O: LikelihoodOracle> {
    index: usize,
    settings: ReplicaSettings,
    oracle: O,
    data: Arc<RunData>,
    link: Option<ReplicaLink>,
    client: SurrogateClient,
    traces: TraceWriter,
    accept_ratio_path: PathBuf,
    walk: RandomWalk,
    rng: StdRng,
    state: ChainState,
    swaps_adopted: usize,
}

impl<O: LikelihoodOracle> ReplicaWorker<O> {
    /// Creates a new `ReplicaWorker`, truncating the trace files of its chain.
    ///
    /// # Arguments
    /// * `index` - The position of the replica in the temperature ladder.
    /// * `temperature` - The temperature the chain samples at until the pivot.
    /// * `initial` - The parameter vector every chain starts from.
    /// * `settings` - The settings shared by the whole population.
    /// * `oracle` - This replica's own likelihood evaluator.
    /// * `data` - The training and test sets.
    /// * `link` - The channels to the coordinator.
    /// * `layout` - Where traces and the surrogate live.
    /// * `rng` - The replica's random stream.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        index: usize,
        temperature: f64,
        initial: Vec<f32>,
        settings: ReplicaSettings,
        oracle: O,
        data: Arc<RunData>,
        link: ReplicaLink,
        layout: &RunLayout,
        rng: StdRng,
    ) -> Result<Self, ReplicaErr> {
        Ok(Self {
            index,
            traces: TraceWriter::create(layout, index)?,
            accept_ratio_path: layout.accept_ratio(index),
            client: SurrogateClient::new(ArtifactStore::new(layout.surrogate_dir())),
            walk: RandomWalk::new(settings.step_size),
            state: ChainState::new(initial, temperature, settings.prior_variance),
            settings,
            oracle,
            data,
            link: Some(link),
            rng,
            swaps_adopted: 0,
        })
    }

    /// Runs the whole sample budget, pausing at every checkpoint.
    ///
    /// # Errors
    /// If the initial state cannot be evaluated or a trace file cannot be written. Every other
    /// fault is recovered from inside the loop.
    pub fn run(mut self) -> Result<ReplicaReport, ReplicaErr> {
        info!(replica = self.index, temperature = self.state.temperature; "replica started");

        self.evaluate_initial()?;

        let proposals = self.settings.samples.saturating_sub(1);
        for step in 0..proposals {
            if step != 0 && step % self.settings.swap_interval == 0 {
                self.checkpoint(step)?;
            }

            if step >= self.settings.pivot && self.state.temperature != 1.0 {
                self.pivot(step);
            }

            self.iterate(step + 1)?;
        }

        self.traces.flush()?;

        let accept_ratio = self.state.accept_ratio(proposals);
        fs::write(&self.accept_ratio_path, format!("{accept_ratio}\n"))?;

        info!(
            replica = self.index,
            accept_ratio = accept_ratio,
            swaps = self.swaps_adopted;
            "replica finished"
        );

        Ok(ReplicaReport {
            index: self.index,
            accepted: self.state.accepted,
            proposals,
            accept_ratio,
            swaps_adopted: self.swaps_adopted,
        })
    }

    fn evaluate_initial(&mut self) -> Result<(), ReplicaErr> {
        let params = self.state.params.clone();
        let (likelihood, metrics) = self.evaluate_true(&params)?;
        self.state.hold_evaluation(likelihood, metrics);

        if self.state.likelihood.is_finite() {
            self.observe(&params, self.state.likelihood);
        } else {
            warn!(replica = self.index; "initial state has a non-finite likelihood");
        }

        let likelihood = self.state.likelihood;
        self.traces.record(&TraceRow {
            params: &self.state.params,
            proposal_likelihood: likelihood.raw,
            state_likelihood: likelihood.raw,
            true_tempered: Some(likelihood.tempered),
            surrogate_tempered: None,
            window_mean: self.state.window.mean(),
            accepted: 0,
            metrics: self.state.metrics,
        })?;

        Ok(())
    }

    /// Runs one proposal through evaluation and acceptance and records the held state.
    fn iterate(&mut self, iteration: usize) -> Result<(), ReplicaErr> {
        let proposal = self.propose();

        let use_surrogate =
            self.settings
                .gate
                .use_surrogate(iteration, self.state.window.is_full(), &mut self.rng);

        let evaluated = if use_surrogate {
            match self.client.predict(&proposal.params) {
                Prediction::Estimate(estimate) => self.surrogate_path(&proposal.params, estimate),
                Prediction::Uninitialized => {
                    debug!(replica = self.index, iteration = iteration; "surrogate uninitialized");
                    self.true_path(&proposal.params)
                }
            }
        } else {
            self.true_path(&proposal.params)
        };

        let (proposal_likelihood, true_tempered, surrogate_tempered) = match &evaluated {
            Evaluated::True { likelihood, .. } => {
                (likelihood.raw, Some(likelihood.tempered), None)
            }
            Evaluated::Surrogate {
                likelihood,
                comparison,
            } => (likelihood.raw, *comparison, Some(likelihood.tempered)),
            Evaluated::Invalid => (UNKNOWN, None, None),
        };

        let accepted = self.accept(proposal, evaluated);
        trace!(
            replica = self.index,
            iteration = iteration,
            accepted = accepted;
            "iteration done"
        );

        self.traces.record(&TraceRow {
            params: &self.state.params,
            proposal_likelihood,
            state_likelihood: self.state.likelihood.raw,
            true_tempered,
            surrogate_tempered,
            window_mean: self.state.window.mean(),
            accepted: self.state.accepted,
            metrics: self.state.metrics,
        })?;

        Ok(())
    }

    fn propose(&mut self) -> Proposal {
        let langevin = self
            .settings
            .langevin
            .filter(|langevin| langevin.probability > 0.0);

        if let Some(langevin) = langevin {
            if self.rng.random::<f64>() < langevin.probability {
                match self.walk.propose_langevin(
                    &self.state.params,
                    &mut self.oracle,
                    &self.data.train,
                    langevin.depth,
                    &mut self.rng,
                ) {
                    Ok(proposal) => return proposal,
                    Err(e) => warn!(replica = self.index; "gradient proposal failed: {e}"),
                }
            }
        }

        self.walk.propose(&self.state.params, &mut self.rng)
    }

    fn evaluate_true(&mut self, params: &[f32]) -> Result<(LogLikelihood, Metrics), OracleErr> {
        let temperature = self.state.temperature;
        let train = self.oracle.score(params, &self.data.train, temperature)?;
        let test = self.oracle.score(params, &self.data.test, temperature)?;

        Ok((train.log_likelihood, Metrics::new(&train, &test)))
    }

    fn true_path(&mut self, params: &[f32]) -> Evaluated {
        match self.evaluate_true(params) {
            Ok((likelihood, metrics)) if likelihood.is_finite() => {
                self.observe(params, likelihood);
                Evaluated::True {
                    likelihood,
                    metrics,
                }
            }
            Ok((likelihood, _)) => {
                warn!(replica = self.index, raw = likelihood.raw; "non-finite likelihood, rejecting");
                Evaluated::Invalid
            }
            Err(e) => {
                warn!(replica = self.index; "oracle failed, rejecting: {e}");
                Evaluated::Invalid
            }
        }
    }

    /// Blends the surrogate estimate evenly with the trailing window of true-path likelihoods.
    fn surrogate_path(&mut self, params: &[f32], estimate: Estimate) -> Evaluated {
        let temperature = self.state.temperature;
        let Some(tempered) = self.state.window.blend(estimate.raw / temperature) else {
            return self.true_path(params);
        };

        let raw = if temperature.is_finite() {
            tempered * temperature
        } else {
            estimate.raw
        };

        let comparison = if self.settings.compare_surrogate {
            self.oracle
                .score(params, &self.data.train, temperature)
                .ok()
                .map(|score| score.log_likelihood.tempered)
                .filter(|tempered| tempered.is_finite())
        } else {
            None
        };

        Evaluated::Surrogate {
            likelihood: LogLikelihood { raw, tempered },
            comparison,
        }
    }

    /// Feeds a true-path observation to the window and, while attached, to the training buffer.
    fn observe(&mut self, params: &[f32], likelihood: LogLikelihood) {
        self.state.window.push(likelihood.tempered);

        if self.settings.collect_batches && self.link.is_some() {
            self.state.buffer.push(params, likelihood.raw);
        }
    }

    fn accept(&mut self, proposal: Proposal, evaluated: Evaluated) -> bool {
        let (likelihood, metrics, source) = match evaluated {
            Evaluated::True {
                likelihood,
                metrics,
            } => (likelihood, Some(metrics), Source::True),
            Evaluated::Surrogate { likelihood, .. } => (likelihood, None, Source::Surrogate),
            Evaluated::Invalid => return false,
        };

        let prior = log_prior(&proposal.params, self.settings.prior_variance);
        let log_ratio = (likelihood.tempered - self.state.likelihood.tempered)
            + (prior - self.state.log_prior)
            + proposal.log_correction;

        let u: f64 = self.rng.random();
        if u >= acceptance_probability(log_ratio) {
            return false;
        }

        self.state.params = proposal.params;
        self.state.log_prior = prior;
        self.state.likelihood = likelihood;
        self.state.metrics = metrics;
        self.state.source = source;
        self.state.accepted += 1;
        true
    }

    /// Snaps the chain to temperature 1, re-evaluating the held state on the true path.
    fn pivot(&mut self, step: usize) {
        self.state.temperature = 1.0;
        self.state.window = Default::default();

        let params = self.state.params.clone();
        match self.evaluate_true(&params) {
            Ok((likelihood, metrics)) => self.state.hold_evaluation(likelihood, metrics),
            Err(e) => {
                warn!(replica = self.index; "failed to re-evaluate at pivot: {e}");
                self.state.likelihood = LogLikelihood::new(self.state.likelihood.raw, 1.0);
            }
        }

        info!(replica = self.index, step = step; "pivoted to temperature 1");
    }

    /// Hands the held state to the coordinator and continues from whatever it sends back.
    fn checkpoint(&mut self, step: usize) -> Result<(), ReplicaErr> {
        self.traces.flush()?;

        let Some(link) = self.link.as_mut() else {
            return Ok(());
        };

        let batch = self.state.take_buffer();
        let message = self.state.snapshot(step);

        match link.checkpoint(message, batch) {
            Some(resume) => {
                if resume.exchanged {
                    self.state.adopt(resume.message);
                    self.swaps_adopted += 1;
                }
                self.client.adopt(resume.artifact);

                debug!(
                    replica = self.index,
                    step = step,
                    exchanged = resume.exchanged,
                    surrogate = self.client.version().unwrap_or(0);
                    "resumed"
                );
            }
            None => {
                warn!(replica = self.index, step = step; "coordinator is gone, continuing alone");
                self.link = None;
            }
        }

        Ok(())
    }
}
