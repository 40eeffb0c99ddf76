use std::{
    fs::File,
    io::{self, BufWriter, Write},
};

use super::state::Metrics;
use crate::layout::{RunLayout, Trace};

/// The value written wherever a quantity is unknown.
pub const UNKNOWN: f64 = f64::INFINITY;

/// One iteration of a chain, as persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceRow<'a> {
    pub params: &'a [f32],
    /// The raw log-likelihood of the proposal, `UNKNOWN` if it could not be evaluated.
    pub proposal_likelihood: f64,
    /// The raw log-likelihood of the state held after the iteration.
    pub state_likelihood: f64,
    pub true_tempered: Option<f64>,
    pub surrogate_tempered: Option<f64>,
    pub window_mean: Option<f64>,
    pub accepted: usize,
    pub metrics: Option<Metrics>,
}

/// Appends the rows of one chain to its trace files.
pub struct TraceWriter {
    writers: Vec<(Trace, BufWriter<File>)>,
}

impl TraceWriter {
    /// Creates every trace file of `chain`, truncating any left by a previous run.
    pub fn create(layout: &RunLayout, chain: usize) -> io::Result<Self> {
        let writers = Trace::ALL
            .into_iter()
            .map(|trace| {
                let file = File::create(layout.trace(trace, chain))?;
                Ok((trace, BufWriter::new(file)))
            })
            .collect::<io::Result<_>>()?;

        Ok(Self { writers })
    }

    pub fn record(&mut self, row: &TraceRow<'_>) -> io::Result<()> {
        let known = |value: Option<f64>| value.unwrap_or(UNKNOWN);
        let metric = |f: fn(&Metrics) -> f64| row.metrics.as_ref().map_or(UNKNOWN, f);

        for (trace, writer) in &mut self.writers {
            match trace {
                Trace::Params => write_row(writer, row.params.iter())?,
                Trace::Likelihood => {
                    write_row(writer, [row.proposal_likelihood, row.state_likelihood].iter())?
                }
                Trace::SurrogateComparison => write_row(
                    writer,
                    [
                        known(row.true_tempered),
                        known(row.surrogate_tempered),
                        known(row.window_mean),
                    ]
                    .iter(),
                )?,
                Trace::Accepted => writeln!(writer, "{}", row.accepted)?,
                Trace::AccuracyTrain => writeln!(writer, "{}", metric(|m| m.accuracy_train))?,
                Trace::AccuracyTest => writeln!(writer, "{}", metric(|m| m.accuracy_test))?,
                Trace::RmseTrain => writeln!(writer, "{}", metric(|m| m.rmse_train))?,
                Trace::RmseTest => writeln!(writer, "{}", metric(|m| m.rmse_test))?,
            }
        }

        Ok(())
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.writers
            .iter_mut()
            .try_for_each(|(_, writer)| writer.flush())
    }
}

fn write_row<W, I, T>(writer: &mut W, values: I) -> io::Result<()>
where
    W: Write,
    I: Iterator<Item = T>,
    T: std::fmt::Display,
{
    let mut first = true;
    for value in values {
        if !first {
            write!(writer, " ")?;
        }
        write!(writer, "{value}")?;
        first = false;
    }
    writeln!(writer)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn unknown_values_use_the_sentinel() {
        let dir = tempfile::tempdir().unwrap();
        let layout = RunLayout::new(dir.path());
        layout.create().unwrap();

        let mut writer = TraceWriter::create(&layout, 0).unwrap();
        let row = TraceRow {
            params: &[0.5, -1.0],
            proposal_likelihood: UNKNOWN,
            state_likelihood: -12.5,
            true_tempered: None,
            surrogate_tempered: Some(-6.0),
            window_mean: Some(-6.5),
            accepted: 3,
            metrics: None,
        };
        writer.record(&row).unwrap();
        writer.record(&row).unwrap();
        writer.flush().unwrap();

        let read = |trace| fs::read_to_string(layout.trace(trace, 0)).unwrap();
        assert_eq!(read(Trace::Params), "0.5 -1\n0.5 -1\n");
        assert_eq!(read(Trace::Likelihood).lines().next(), Some("inf -12.5"));
        assert_eq!(
            read(Trace::SurrogateComparison).lines().next(),
            Some("inf -6 -6.5")
        );
        assert_eq!(read(Trace::Accepted), "3\n3\n");
        assert_eq!(read(Trace::RmseTest), "inf\ninf\n");
    }
}
