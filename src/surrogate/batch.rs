use super::{Result, SurrogateErr};

/// Rows of `(parameter vector, raw log-likelihood)` observed on the true path.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SurrogateBatch {
    columns: usize,
    values: Vec<f64>,
}

impl SurrogateBatch {
    /// Creates an empty batch for parameter vectors of length `params`.
    pub fn new(params: usize) -> Self {
        Self {
            columns: params + 1,
            values: Vec::new(),
        }
    }

    /// Creates a batch from raw flattened rows, as received from elsewhere.
    pub fn from_raw(columns: usize, values: Vec<f64>) -> Self {
        Self { columns, values }
    }

    pub fn push(&mut self, params: &[f32], raw_log_likelihood: f64) {
        debug_assert_eq!(params.len() + 1, self.columns);
        self.values.extend(params.iter().map(|&w| f64::from(w)));
        self.values.push(raw_log_likelihood);
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    pub fn len(&self) -> usize {
        if self.columns == 0 {
            return 0;
        }
        self.values.len() / self.columns
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Checks that every row is a parameter vector of length `params` followed by its target.
    pub fn check(&self, params: usize) -> Result<()> {
        let expected = params + 1;

        if self.columns != expected || self.values.len() % expected != 0 {
            return Err(SurrogateErr::MalformedBatch {
                columns: self.columns,
                expected,
            });
        }

        Ok(())
    }

    /// Appends the rows of `other`.
    ///
    /// # Errors
    /// If the rows of both batches differ in width.
    pub fn extend(&mut self, other: SurrogateBatch) -> Result<()> {
        if other.is_empty() {
            return Ok(());
        }

        if self.is_empty() && self.columns == 0 {
            *self = other;
            return Ok(());
        }

        if other.columns != self.columns {
            return Err(SurrogateErr::MalformedBatch {
                columns: other.columns,
                expected: self.columns,
            });
        }

        self.values.extend(other.values);
        Ok(())
    }

    /// Iterates over the rows whose values are all finite, split into parameters and target.
    pub fn finite_rows(&self) -> impl Iterator<Item = (&[f64], f64)> {
        self.values
            .chunks_exact(self.columns.max(1))
            .filter(|row| row.iter().all(|v| v.is_finite()))
            .filter_map(|row| row.split_last().map(|(&target, params)| (params, target)))
    }

    /// Moves the rows out, leaving an empty batch of the same width.
    pub fn take(&mut self) -> Self {
        Self {
            columns: self.columns,
            values: std::mem::take(&mut self.values),
        }
    }
}
