use std::sync::Arc;

use log::{debug, error, info, warn};
use rand::{Rng, SeedableRng, rngs::StdRng};
use rand_distr::StandardNormal;
use tokio::task::{self, JoinSet};

use super::{
    protocol::{CoordinatorLink, Resume, SwapMessage, link},
    swap::exchange_adjacent,
};
use crate::{
    RunConfig,
    error::Result,
    layout::RunLayout,
    oracle::{LabeledData, LikelihoodOracle},
    replica::{ReplicaErr, ReplicaReport, ReplicaSettings, ReplicaWorker},
    summary::{RunSummary, SwapStats},
    surrogate::{ArtifactStore, SurrogateArtifact, SurrogateBatch, SurrogateManager},
};

/// The datasets every replica evaluates against.
#[derive(Debug, Clone)]
pub struct RunData {
    pub train: LabeledData,
    pub test: LabeledData,
}

/// Every random stream of a run, derived from one base seed in a fixed order.
#[derive(Debug, Clone)]
pub struct Seeds {
    pub initial: StdRng,
    pub replicas: Vec<StdRng>,
    pub swaps: StdRng,
    pub surrogate: StdRng,
}

impl Seeds {
    pub fn new(base: u64, replicas: usize) -> Self {
        let mut seeder = StdRng::seed_from_u64(base);
        let mut next = || StdRng::seed_from_u64(seeder.random());

        Self {
            initial: next(),
            replicas: (0..replicas).map(|_| next()).collect(),
            swaps: next(),
            surrogate: next(),
        }
    }
}

/// Runs a whole population to completion and aggregates its diagnostics.
///
/// # Arguments
/// * `config` - The run configuration.
/// * `data` - The training and test sets.
/// * `factory` - Builds the likelihood oracle of the replica at the given index.
///
/// # Errors
/// If the configuration is invalid, the run directory cannot be created or the summary cannot be
/// written. Replicas that fail are reported in the summary instead.
pub async fn run<O, F>(config: RunConfig, data: RunData, mut factory: F) -> Result<RunSummary>
where
    O: LikelihoodOracle + Send + 'static,
    F: FnMut(usize) -> O,
{
    let temperatures = config.validate()?;
    let layout = RunLayout::new(&config.output_dir);
    layout.create()?;

    let replicas = temperatures.len();
    let base = config.seed.unwrap_or_else(|| rand::rng().random());
    let Seeds {
        mut initial,
        replicas: replica_rngs,
        swaps,
        surrogate,
    } = Seeds::new(base, replicas);

    let oracles: Vec<O> = (0..replicas).map(&mut factory).collect();
    let params = oracles.first().map_or(0, |oracle| oracle.param_count());
    let start: Vec<f32> = (0..params)
        .map(|_| initial.sample::<f32, _>(StandardNormal))
        .collect();

    info!(
        replicas = replicas,
        samples = config.samples_per_chain(),
        params = params,
        seed = base;
        "starting run with temperatures {temperatures:?}"
    );

    let store = ArtifactStore::new(layout.surrogate_dir());
    let manager = config
        .surrogate_enabled()
        .then(|| SurrogateManager::new(config.surrogate.clone(), store, params, surrogate));

    let settings = ReplicaSettings::from_config(&config);
    let data = Arc::new(data);
    let mut tasks = JoinSet::new();
    let mut links = Vec::with_capacity(replicas);

    for (index, ((oracle, rng), &temperature)) in oracles
        .into_iter()
        .zip(replica_rngs)
        .zip(&temperatures)
        .enumerate()
    {
        let (replica_link, coordinator_link) = link();
        let worker = ReplicaWorker::new(
            index,
            temperature,
            start.clone(),
            settings,
            oracle,
            Arc::clone(&data),
            replica_link,
            &layout,
            rng,
        )?;

        tasks.spawn_blocking(move || worker.run());
        links.push(Some(coordinator_link));
    }

    let mut coordinator = ExchangeCoordinator {
        links,
        manager,
        artifact: None,
        rng: swaps,
        swaps: SwapStats::default(),
        pending: SurrogateBatch::new(params),
        params,
        retrain_every: config.surrogate_interval(),
        since_retrain: 0,
        swap_interval: config.swap_interval.get(),
    };
    coordinator.drive(config.checkpoints()).await;

    let ExchangeCoordinator {
        links,
        swaps,
        artifact,
        ..
    } = coordinator;
    drop(links);

    let reports = join_replicas(tasks).await;
    let dead: Vec<usize> = (0..replicas)
        .filter(|&i| !reports.iter().any(|report| report.index == i))
        .collect();

    let versions = artifact.map_or(0, |artifact| artifact.version);
    let summary =
        RunSummary::aggregate(&layout, replicas, config.burn_in, &dead, swaps, versions)?;
    summary.write(&layout.summary())?;

    Ok(summary)
}

async fn join_replicas(
    mut tasks: JoinSet<std::result::Result<ReplicaReport, ReplicaErr>>,
) -> Vec<ReplicaReport> {
    let mut reports = Vec::new();

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(report)) => reports.push(report),
            Ok(Err(e)) => error!("replica failed: {e}"),
            Err(e) => error!("replica panicked: {e}"),
        }
    }

    reports
}

/// Drives the checkpoint cycles of a population.
struct ExchangeCoordinator {
    /// One per replica, `None` once the replica terminated.
    links: Vec<Option<CoordinatorLink>>,
    manager: Option<SurrogateManager>,
    artifact: Option<Arc<SurrogateArtifact>>,
    rng: StdRng,
    swaps: SwapStats,
    pending: SurrogateBatch,
    params: usize,
    retrain_every: usize,
    since_retrain: usize,
    swap_interval: usize,
}

impl ExchangeCoordinator {
    async fn drive(&mut self, cycles: usize) {
        for cycle in 1..=cycles {
            let mut slots = self.await_all_ready(cycle).await;
            if slots.iter().all(Option::is_none) {
                warn!(cycle = cycle; "no replica reached the checkpoint, ending the run early");
                return;
            }

            let round = exchange_adjacent(&mut slots, &mut self.rng);
            self.swaps.proposals += round.proposals;
            self.swaps.accepted += round.accepted;
            debug!(
                cycle = cycle,
                proposals = round.proposals,
                accepted = round.accepted;
                "swap phase done"
            );

            self.collect_batches();
            self.maybe_retrain(cycle).await;

            for (i, slot) in slots.into_iter().enumerate() {
                let Some(message) = slot else {
                    continue;
                };
                let resume = Resume {
                    message,
                    exchanged: round.origins[i] != i,
                    artifact: self.artifact.clone(),
                };

                let released = match &self.links[i] {
                    Some(link) => link.release(resume).await,
                    None => false,
                };
                if !released {
                    warn!(replica = i, cycle = cycle; "replica terminated before resuming");
                    self.links[i] = None;
                }
            }

            info!(cycle = cycle, surrogate = self.version(); "cycle done");
        }
    }

    /// Waits for one posting per live replica. A replica that terminated yields an empty slot.
    async fn await_all_ready(&mut self, cycle: usize) -> Vec<Option<SwapMessage>> {
        let mut slots = Vec::with_capacity(self.links.len());

        for (i, entry) in self.links.iter_mut().enumerate() {
            let Some(link) = entry else {
                slots.push(None);
                continue;
            };

            match link.await_ready().await {
                Some(message) => {
                    debug!(replica = i, iteration = message.iteration; "replica ready");
                    slots.push(Some(message));
                }
                None => {
                    warn!(replica = i, cycle = cycle; "replica terminated, treating it as ready");
                    let leftover = link.drain_batches();
                    merge(&mut self.pending, leftover, self.params);
                    *entry = None;
                    slots.push(None);
                }
            }
        }

        slots
    }

    fn collect_batches(&mut self) {
        for link in self.links.iter_mut().flatten() {
            merge(&mut self.pending, link.drain_batches(), self.params);
        }
    }

    /// Retrains the surrogate with the pending observations once enough iterations have passed
    /// since the last version, while every replica is parked.
    async fn maybe_retrain(&mut self, cycle: usize) {
        self.since_retrain += self.swap_interval;
        if self.since_retrain < self.retrain_every || self.pending.is_empty() {
            return;
        }

        let Some(mut manager) = self.manager.take() else {
            self.pending.take();
            return;
        };

        let batch = self.pending.take();
        let rows = batch.len();
        let trained = task::spawn_blocking(move || {
            let result = manager.train(&batch);
            (manager, result)
        })
        .await;

        match trained {
            Ok((manager, result)) => {
                match result {
                    Ok(version) => {
                        debug!(cycle = cycle, version = version, rows = rows; "surrogate retrained");
                        self.artifact = manager.current();
                        self.since_retrain = 0;
                    }
                    Err(e) => warn!(cycle = cycle; "skipping surrogate retrain: {e}"),
                }
                self.manager = Some(manager);
            }
            Err(e) => error!("surrogate training panicked, disabling it: {e}"),
        }
    }

    fn version(&self) -> u64 {
        self.artifact.as_ref().map_or(0, |artifact| artifact.version)
    }
}

/// Appends `batches` to `pending`, dropping those whose rows do not fit the parameter vector.
fn merge(pending: &mut SurrogateBatch, batches: Vec<SurrogateBatch>, params: usize) {
    for batch in batches {
        if let Err(e) = batch.check(params).and_then(|()| pending.extend(batch)) {
            warn!("dropping surrogate batch: {e}");
        }
    }
}
