use ndarray::{Array2, ArrayView2};

use super::{Model, layers::Dense, loss::LossFn};
use crate::{MlErr, Result, optimization::Optimizer};

/// A sequential model: information flows forward when computing an output and backward when
/// computing the *deltas* of its layers.
#[derive(Clone, Debug)]
pub struct Sequential {
    layers: Vec<Dense>,
}

impl Sequential {
    /// Creates a new `Sequential`.
    ///
    /// # Arguments
    /// * `layers` - The layers the sequential is composed of.
    ///
    /// # Returns
    /// A new `Sequential` instance.
    pub fn new<I>(layers: I) -> Self
    where
        I: IntoIterator<Item = Dense>,
    {
        Self {
            layers: layers.into_iter().collect(),
        }
    }

    pub fn layers(&self) -> &[Dense] {
        &self.layers
    }

    fn check_size(&self, what: &'static str, got: usize) -> Result<()> {
        let expected = self.size();

        if got != expected {
            return Err(MlErr::SizeMismatch {
                what,
                got,
                expected,
            });
        }

        Ok(())
    }
}

impl Model for Sequential {
    fn size(&self) -> usize {
        self.layers.iter().map(Dense::size).sum()
    }

    fn forward(&mut self, params: &[f32], x: ArrayView2<f32>) -> Result<Array2<f32>> {
        self.check_size("model parameters", params.len())?;

        let mut out = x.to_owned();
        let mut start = 0;

        for layer in self.layers.iter_mut() {
            let end = start + layer.size();
            out = layer.forward(&params[start..end], out.view())?;
            start = end;
        }

        Ok(out)
    }

    // NOTE: the epoch loss is approximated by averaging the loss of each batch, as measured
    // before the optimizer step of that batch.
    fn backprop<'a, L, O, I>(
        &mut self,
        params: &mut [f32],
        grad: &mut [f32],
        loss_fn: &L,
        optimizer: &mut O,
        batches: I,
    ) -> Result<f32>
    where
        L: LossFn,
        O: Optimizer,
        I: Iterator<Item = (ArrayView2<'a, f32>, ArrayView2<'a, f32>)>,
    {
        self.check_size("model gradient", grad.len())?;

        let mut total_loss = 0.0;
        let mut num_batches = 0;

        for (x, y) in batches {
            grad.fill(0.);

            let y_pred = self.forward(params, x)?;
            total_loss += loss_fn.loss(y_pred.view(), y);
            num_batches += 1;

            let mut d = loss_fn.loss_prime(y_pred.view(), y);
            let mut end = params.len();

            for layer in self.layers.iter_mut().rev() {
                let start = end - layer.size();
                d = layer.backward(&params[start..end], &mut grad[start..end], d)?;
                end = start;
            }

            optimizer.update_params(params, grad)?;
        }

        if num_batches == 0 {
            return Err(MlErr::EmptyDataset);
        }

        Ok(total_loss / num_batches as f32)
    }
}
