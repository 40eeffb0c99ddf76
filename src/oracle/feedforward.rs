use std::iter;

use machine_learning::{
    arch::{Model, Sequential, activations::ActFn, layers::Dense, loss::Mse},
    optimization::GradientDescent,
};
use ndarray::{Array2, Axis};

use super::{Evaluation, LabeledData, LikelihoodOracle, LogLikelihood, OracleErr};
use crate::config::Topology;

/// A `[inputs, hidden, outputs]` sigmoid network read as a classifier: the class probabilities
/// are the softmax of its outputs.
#[derive(Debug, Clone)]
pub struct FeedForward {
    topology: Topology,
    model: Sequential,
    learning_rate: f32,
}

impl FeedForward {
    /// Creates a new `FeedForward` oracle.
    ///
    /// # Arguments
    /// * `topology` - The widths of the network.
    /// * `learning_rate` - The step of `gradient_step`.
    pub fn new(topology: Topology, learning_rate: f32) -> Self {
        let Topology {
            inputs,
            hidden,
            outputs,
        } = topology;

        let model = Sequential::new([
            Dense::new((inputs, hidden), ActFn::sigmoid(1.)),
            Dense::new((hidden, outputs), ActFn::sigmoid(1.)),
        ]);

        Self {
            topology,
            model,
            learning_rate,
        }
    }

    fn one_hot(&self, labels: &[usize]) -> Result<Array2<f32>, OracleErr> {
        let classes = self.topology.outputs;
        let mut targets = Array2::zeros((labels.len(), classes));

        for (mut row, &label) in targets.rows_mut().into_iter().zip(labels) {
            if label >= classes {
                return Err(OracleErr::LabelOutOfRange { label, classes });
            }
            row[label] = 1.;
        }

        Ok(targets)
    }
}

impl LikelihoodOracle for FeedForward {
    fn param_count(&self) -> usize {
        self.model.size()
    }

    fn evaluate(&mut self, params: &[f32], data: &LabeledData) -> Result<Evaluation, OracleErr> {
        let (x, _) = data.features().views()?;
        let out = self.model.forward(params, x)?;

        let mut probabilities = out.mapv(f64::from);
        for mut row in probabilities.rows_mut() {
            let max = row.fold(f64::NEG_INFINITY, |m, &v| m.max(v));
            row.mapv_inplace(|v| (v - max).exp());
            let sum = row.sum();
            row.mapv_inplace(|v| v / sum);
        }

        let predictions = out
            .axis_iter(Axis(0))
            .map(|row| {
                row.iter()
                    .enumerate()
                    .fold((0, f32::NEG_INFINITY), |best, (i, &v)| {
                        if v > best.1 { (i, v) } else { best }
                    })
                    .0
            })
            .collect();

        Ok(Evaluation {
            predictions,
            probabilities,
        })
    }

    fn log_likelihood(
        &self,
        evaluation: &Evaluation,
        labels: &[usize],
        temperature: f64,
    ) -> LogLikelihood {
        let probabilities = &evaluation.probabilities;

        let raw = labels
            .iter()
            .enumerate()
            .map(|(row, &label)| match probabilities.get((row, label)) {
                Some(p) => p.ln(),
                None => f64::NEG_INFINITY,
            })
            .sum();

        LogLikelihood::new(raw, temperature)
    }

    fn gradient_step(
        &mut self,
        params: &[f32],
        data: &LabeledData,
        depth: usize,
    ) -> Result<Vec<f32>, OracleErr> {
        let (x, _) = data.features().views()?;
        let y = self.one_hot(data.labels())?;

        let mut stepped = params.to_vec();
        let mut grad = vec![0.; stepped.len()];
        let mut optimizer = GradientDescent::new(self.learning_rate);

        for _ in 0..depth {
            self.model.backprop(
                &mut stepped,
                &mut grad,
                &Mse,
                &mut optimizer,
                iter::once((x, y.view())),
            )?;
        }

        Ok(stepped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topology() -> Topology {
        Topology {
            inputs: 2,
            hidden: 3,
            outputs: 2,
        }
    }

    fn data() -> LabeledData {
        LabeledData::from_rows(&[0., 0., 0., 0., 1., 1., 1., 0., 1., 1., 1., 0.], 2).unwrap()
    }

    #[test]
    fn probabilities_are_normalized() {
        let mut oracle = FeedForward::new(topology(), 0.1);
        let params: Vec<f32> = (0..oracle.param_count()).map(|i| i as f32 * 0.1 - 0.5).collect();

        let evaluation = oracle.evaluate(&params, &data()).unwrap();

        assert_eq!(evaluation.predictions.len(), 4);
        for row in evaluation.probabilities.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn zero_params_give_uniform_likelihood() {
        let mut oracle = FeedForward::new(topology(), 0.1);
        let params = vec![0.; oracle.param_count()];

        let score = oracle.score(&params, &data(), 2.0).unwrap();
        let expected = 4.0 * 0.5f64.ln();

        assert!((score.log_likelihood.raw - expected).abs() < 1e-9);
        assert!((score.log_likelihood.tempered - expected / 2.0).abs() < 1e-9);
    }

    #[test]
    fn gradient_step_improves_fit() {
        let mut oracle = FeedForward::new(topology(), 0.5);
        let params: Vec<f32> = (0..oracle.param_count()).map(|i| (i as f32).cos() * 0.3).collect();

        // the label is the first feature
        let data = LabeledData::from_rows(&[0., 0., 0., 0., 1., 0., 1., 0., 1., 1., 1., 1.], 2).unwrap();

        let before = oracle.score(&params, &data, 1.0).unwrap();
        let stepped = oracle.gradient_step(&params, &data, 50).unwrap();
        let after = oracle.score(&stepped, &data, 1.0).unwrap();

        assert_eq!(stepped.len(), params.len());
        assert!(after.log_likelihood.raw > before.log_likelihood.raw);
    }

    #[test]
    fn out_of_range_labels_are_rejected() {
        let mut oracle = FeedForward::new(topology(), 0.1);
        let params = vec![0.; oracle.param_count()];
        let data = LabeledData::from_rows(&[0., 0., 5.], 2).unwrap();

        assert!(matches!(
            oracle.gradient_step(&params, &data, 1),
            Err(OracleErr::LabelOutOfRange { label: 5, .. })
        ));
        let score = oracle.score(&params, &data, 1.0).unwrap();
        assert_eq!(score.log_likelihood.raw, f64::NEG_INFINITY);
    }
}
