use machine_learning::dataset::Dataset;

use super::OracleErr;

/// Classification data: feature rows and one class label per row.
#[derive(Debug, Clone)]
pub struct LabeledData {
    features: Dataset,
    labels: Vec<usize>,
}

impl LabeledData {
    /// Creates a new `LabeledData` from flattened rows of `inputs` features followed by the label.
    ///
    /// # Errors
    /// If `rows` does not hold a whole amount of rows or a label is not a non negative integer.
    pub fn from_rows(rows: &[f32], inputs: usize) -> Result<Self, OracleErr> {
        let width = inputs + 1;
        let mut features = Vec::with_capacity(rows.len() / width * inputs);
        let mut labels = Vec::with_capacity(rows.len() / width);

        for row in rows.chunks(width) {
            let Some((&label, x)) = row.split_last() else {
                continue;
            };

            if x.len() != inputs || !(label >= 0.0 && label.fract() == 0.0) {
                return Err(OracleErr::InvalidLabel(label));
            }

            features.extend_from_slice(x);
            labels.push(label as usize);
        }

        Ok(Self {
            features: Dataset::new(features, inputs, 0)?,
            labels,
        })
    }

    pub fn features(&self) -> &Dataset {
        &self.features
    }

    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_label_column() {
        let data = LabeledData::from_rows(&[0.1, 0.2, 1., 0.3, 0.4, 0.], 2).unwrap();

        assert_eq!(data.labels(), [1, 0]);
        assert_eq!(data.features().len(), 2);
        assert_eq!(data.features().views().unwrap().0[[1, 0]], 0.3);
    }

    #[test]
    fn rejects_fractional_labels() {
        assert!(matches!(
            LabeledData::from_rows(&[0.1, 0.5], 1),
            Err(OracleErr::InvalidLabel(_))
        ));
    }

    #[test]
    fn rejects_partial_rows() {
        assert!(LabeledData::from_rows(&[0.1, 0.2, 1., 0.3], 2).is_err());
    }
}
