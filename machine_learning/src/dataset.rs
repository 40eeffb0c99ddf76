use std::num::NonZeroUsize;

use ndarray::{ArrayView2, Axis, s};
use rand::{Rng, seq::SliceRandom};

use crate::{MlErr, Result};

/// A row major in-memory dataset. Each row holds `x_size` input values followed by `y_size`
/// target values.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    x_size: usize,
    y_size: usize,
    data: Vec<f32>,
}

impl Dataset {
    /// Creates a new `Dataset`.
    ///
    /// # Arguments
    /// * `data` - The flattened rows.
    /// * `x_size` - The amount of input columns of each row.
    /// * `y_size` - The amount of target columns of each row.
    ///
    /// # Errors
    /// If the rows are zero sized or `data` does not hold a whole amount of rows.
    pub fn new(data: Vec<f32>, x_size: usize, y_size: usize) -> Result<Self> {
        let width = x_size + y_size;

        if width == 0 || data.len() % width != 0 {
            return Err(MlErr::SizeMismatch {
                what: "dataset rows",
                got: data.len(),
                expected: width,
            });
        }

        Ok(Self {
            x_size,
            y_size,
            data,
        })
    }

    pub fn x_size(&self) -> usize {
        self.x_size
    }

    pub fn y_size(&self) -> usize {
        self.y_size
    }

    /// Returns the amount of rows in the dataset.
    pub fn len(&self) -> usize {
        self.data.len() / self.width()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Gives a view of every row's inputs and targets.
    ///
    /// # Returns
    /// A `(x, y)` tuple of `(len, x_size)` and `(len, y_size)` views.
    pub fn views(&self) -> Result<(ArrayView2<'_, f32>, ArrayView2<'_, f32>)> {
        let full = ArrayView2::from_shape((self.len(), self.width()), &self.data)?;
        let x_size = self.x_size;
        Ok((
            full.slice_move(s![.., ..x_size]),
            full.slice_move(s![.., x_size..]),
        ))
    }

    /// Shuffles the rows of the dataset in place.
    pub fn shuffle<R: Rng>(&mut self, rng: &mut R) {
        let width = self.width();
        let mut order: Vec<usize> = (0..self.len()).collect();
        order.shuffle(rng);

        let mut shuffled = Vec::with_capacity(self.data.len());
        for row in order {
            shuffled.extend_from_slice(&self.data[row * width..(row + 1) * width]);
        }

        self.data = shuffled;
    }

    /// Iterates over the dataset in batches of at most `batch_size` rows.
    pub fn batches(
        &self,
        batch_size: NonZeroUsize,
    ) -> impl Iterator<Item = (ArrayView2<'_, f32>, ArrayView2<'_, f32>)> {
        let width = self.width();
        let x_size = self.x_size;

        self.data
            .chunks(batch_size.get() * width)
            .filter_map(move |chunk| {
                let batch = ArrayView2::from_shape((chunk.len() / width, width), chunk).ok()?;
                Some(batch.split_at(Axis(1), x_size))
            })
    }

    /// Splits off the last `rows` rows into a second dataset.
    ///
    /// # Returns
    /// The remaining dataset and the split off one, in that order.
    pub fn split_tail(mut self, rows: usize) -> (Self, Self) {
        let rows = rows.min(self.len());
        let at = (self.len() - rows) * self.width();
        let tail = self.data.split_off(at);

        let tail = Self {
            x_size: self.x_size,
            y_size: self.y_size,
            data: tail,
        };

        (self, tail)
    }

    fn width(&self) -> usize {
        self.x_size + self.y_size
    }
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    fn dataset() -> Dataset {
        // rows: [i, 10 * i, 100 * i]
        let data = (0..5)
            .flat_map(|i| [i as f32, 10. * i as f32, 100. * i as f32])
            .collect();
        Dataset::new(data, 2, 1).unwrap()
    }

    #[test]
    fn rejects_partial_rows() {
        assert!(Dataset::new(vec![0.; 7], 2, 1).is_err());
        assert!(Dataset::new(vec![], 0, 0).is_err());
    }

    #[test]
    fn views_split_columns() {
        let dataset = dataset();
        let (x, y) = dataset.views().unwrap();

        assert_eq!(x.dim(), (5, 2));
        assert_eq!(y.dim(), (5, 1));
        assert_eq!(y[[3, 0]], 300.);
    }

    #[test]
    fn batches_cover_every_row_once() {
        let dataset = dataset();
        let sizes: Vec<_> = dataset
            .batches(NonZeroUsize::new(2).unwrap())
            .map(|(x, y)| (x.nrows(), y.nrows()))
            .collect();

        assert_eq!(sizes, [(2, 2), (2, 2), (1, 1)]);
    }

    #[test]
    fn shuffle_keeps_rows_intact() {
        let mut dataset = dataset();
        dataset.shuffle(&mut StdRng::seed_from_u64(42));

        let (x, y) = dataset.views().unwrap();
        for (x, y) in x.rows().into_iter().zip(y.rows()) {
            assert_eq!(x[1], 10. * x[0]);
            assert_eq!(y[0], 100. * x[0]);
        }

        let mut firsts: Vec<_> = x.column(0).to_vec();
        firsts.sort_by(f32::total_cmp);
        assert_eq!(firsts, [0., 1., 2., 3., 4.]);
    }

    #[test]
    fn split_tail_moves_last_rows() {
        let (head, tail) = dataset().split_tail(2);

        assert_eq!(head.len(), 3);
        assert_eq!(tail.len(), 2);
        assert_eq!(tail.views().unwrap().0[[0, 0]], 3.);
    }
}
