use std::num::NonZeroUsize;

use log::debug;
use rand::Rng;

use crate::{
    MlErr, Result,
    arch::{Model, loss::LossFn},
    dataset::Dataset,
    optimization::Optimizer,
};

/// The schedule of a `ModelTrainer::fit` call.
#[derive(Clone, Copy, Debug)]
pub struct FitConfig {
    pub epochs: usize,
    pub batch_size: NonZeroUsize,
    /// Epochs without improvement of the validation loss before stopping.
    pub patience: usize,
    /// Fraction of the rows held out for validation.
    pub validation_split: f32,
}

/// The outcome of a `ModelTrainer::fit` call.
#[derive(Clone, Debug, PartialEq)]
pub struct FitReport {
    pub train_losses: Vec<f32>,
    pub validation_losses: Vec<f32>,
}

impl FitReport {
    /// Returns the amount of epochs that ran before finishing or stopping early.
    pub fn epochs(&self) -> usize {
        self.train_losses.len()
    }

    /// The last validation loss if a validation split was held out, else the last training loss.
    pub fn final_loss(&self) -> Option<f32> {
        self.validation_losses
            .last()
            .or(self.train_losses.last())
            .copied()
    }
}

/// A model `Trainer`. Contains the relevant components needed for training a model,
/// including the model itself.
pub struct ModelTrainer<M, O, L>
where
    M: Model,
    O: Optimizer,
    L: LossFn,
{
    model: M,
    optimizer: O,
    loss_fn: L,
    config: FitConfig,
    grad: Vec<f32>,
}

impl<M, O, L> ModelTrainer<M, O, L>
where
    M: Model,
    O: Optimizer,
    L: LossFn,
{
    /// Returns a new `ModelTrainer`.
    ///
    /// # Arguments
    /// * `model` - The model that will be trained.
    /// * `optimizer` - The optimizer used on every batch.
    /// * `loss_fn` - The loss function used to measure the difference between a model's output and the expected one.
    /// * `config` - The epochs, batch size and early stopping settings.
    pub fn new(model: M, optimizer: O, loss_fn: L, config: FitConfig) -> Self {
        Self {
            grad: vec![0.; model.size()],
            model,
            optimizer,
            loss_fn,
            config,
        }
    }

    /// Fits `params` to `dataset`, holding out the configured fraction of shuffled rows for
    /// validation and stopping early once the validation loss stops improving.
    ///
    /// # Arguments
    /// * `params` - The model's parameters, updated in place.
    /// * `dataset` - The data to fit.
    /// * `rng` - A random number generator used for shuffling.
    ///
    /// # Errors
    /// If the dataset is empty or does not match the model's dimensions.
    pub fn fit<R: Rng>(
        &mut self,
        params: &mut [f32],
        mut dataset: Dataset,
        rng: &mut R,
    ) -> Result<FitReport> {
        if dataset.is_empty() {
            return Err(MlErr::EmptyDataset);
        }

        dataset.shuffle(rng);
        let holdout = (dataset.len() as f32 * self.config.validation_split) as usize;
        let (mut train, validation) = if holdout == 0 || holdout >= dataset.len() {
            let x_size = dataset.x_size();
            let y_size = dataset.y_size();
            (dataset, Dataset::new(Vec::new(), x_size, y_size)?)
        } else {
            dataset.split_tail(holdout)
        };

        let mut report = FitReport {
            train_losses: Vec::with_capacity(self.config.epochs),
            validation_losses: Vec::new(),
        };
        let mut best = f32::INFINITY;
        let mut stale = 0;

        for epoch in 0..self.config.epochs {
            train.shuffle(rng);
            let batches = train.batches(self.config.batch_size);
            let loss = self.model.backprop(
                params,
                &mut self.grad,
                &self.loss_fn,
                &mut self.optimizer,
                batches,
            )?;
            report.train_losses.push(loss);

            if validation.is_empty() {
                debug!(epoch = epoch, loss = loss; "epoch finished");
                continue;
            }

            let validation_loss = self.evaluate(params, &validation)?;
            report.validation_losses.push(validation_loss);
            debug!(epoch = epoch, loss = loss, validation_loss = validation_loss; "epoch finished");

            if validation_loss < best {
                best = validation_loss;
                stale = 0;
            } else {
                stale += 1;
                if stale >= self.config.patience {
                    debug!(epoch = epoch; "stopping early");
                    break;
                }
            }
        }

        Ok(report)
    }

    /// Computes the loss of `params` over the whole `dataset`.
    pub fn evaluate(&mut self, params: &[f32], dataset: &Dataset) -> Result<f32> {
        if dataset.is_empty() {
            return Err(MlErr::EmptyDataset);
        }

        let (x, y) = dataset.views()?;
        let y_pred = self.model.forward(params, x)?;
        Ok(self.loss_fn.loss(y_pred.view(), y))
    }

    pub fn model_mut(&mut self) -> &mut M {
        &mut self.model
    }
}
