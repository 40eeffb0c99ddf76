use std::{
    fs::{self, File, OpenOptions},
    io::{self, BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

use log::debug;

use super::{NormalizationBounds, RegressorSnapshot, Result, SurrogateArtifact, SurrogateErr};

const SIGNATURE_FILE: &str = "model_signature.txt";
const BOUNDS_FILE: &str = "minmax.txt";
const METRICS_FILE: &str = "train_metrics.txt";
const TRAINING_DATA_DIR: &str = "training_data";

/// The on-disk home of the published surrogate versions.
///
/// A version is made of its model file, the bounds file and the signature file. The first two are
/// written under temporary names and renamed into place, then the signature file is replaced in the
/// same way. Since a rename is atomic, a reader that goes through the signature always finds a
/// complete version.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn model_path(&self, version: u64) -> PathBuf {
        self.dir.join(format!("model_{version}.json"))
    }

    pub fn signature_path(&self) -> PathBuf {
        self.dir.join(SIGNATURE_FILE)
    }

    pub fn bounds_path(&self) -> PathBuf {
        self.dir.join(BOUNDS_FILE)
    }

    pub fn metrics_path(&self) -> PathBuf {
        self.dir.join(METRICS_FILE)
    }

    /// The parameter vectors every version was trained on, one row each.
    pub fn training_inputs_path(&self) -> PathBuf {
        self.dir.join(TRAINING_DATA_DIR).join("X.txt")
    }

    /// The targets every version was trained on: version, raw and normalized log-likelihood.
    pub fn training_targets_path(&self) -> PathBuf {
        self.dir.join(TRAINING_DATA_DIR).join("Y.txt")
    }

    /// Makes `artifact` the latest version, committing it by writing the signature file last.
    pub fn publish(&self, artifact: &SurrogateArtifact) -> Result<()> {
        fs::create_dir_all(&self.dir)?;

        let model = serde_json::to_vec(&artifact.regressor)?;
        write_atomically(&self.model_path(artifact.version), &model)?;

        let NormalizationBounds { min, max } = artifact.bounds;
        write_atomically(&self.bounds_path(), format!("{min} {max}\n").as_bytes())?;

        write_atomically(
            &self.signature_path(),
            format!("{}\n", artifact.version).as_bytes(),
        )?;

        debug!(version = artifact.version; "published surrogate");
        Ok(())
    }

    /// Reads the latest committed version.
    ///
    /// # Returns
    /// `None` if no version has ever been published.
    pub fn load_latest(&self) -> Result<Option<SurrogateArtifact>> {
        let signature = match fs::read_to_string(self.signature_path()) {
            Ok(signature) => signature,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let version = signature
            .trim()
            .parse()
            .map_err(|_| SurrogateErr::Corrupt {
                file: SIGNATURE_FILE.into(),
            })?;

        let model = File::open(self.model_path(version))?;
        let regressor: RegressorSnapshot = serde_json::from_reader(BufReader::new(model))?;
        let bounds = self.load_bounds()?;

        Ok(Some(SurrogateArtifact {
            version,
            bounds,
            regressor,
        }))
    }

    fn load_bounds(&self) -> Result<NormalizationBounds> {
        let raw = fs::read_to_string(self.bounds_path())?;
        let corrupt = || SurrogateErr::Corrupt {
            file: BOUNDS_FILE.into(),
        };

        let mut values = raw.split_whitespace().map(str::parse::<f64>);
        match (values.next(), values.next()) {
            (Some(Ok(min)), Some(Ok(max))) => NormalizationBounds::new(min, max),
            _ => Err(corrupt()),
        }
    }

    /// Appends the validation metric of a training to the running log.
    pub fn append_metric(&self, version: u64, metric: f32) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.metrics_path())?;
        writeln!(file, "{version} {metric}")?;
        Ok(())
    }

    /// Appends the rows a version was trained on to the training data files.
    pub fn append_training_data(
        &self,
        version: u64,
        rows: &[(&[f64], f64)],
        bounds: &NormalizationBounds,
    ) -> Result<()> {
        fs::create_dir_all(self.dir.join(TRAINING_DATA_DIR))?;
        let open = |path: PathBuf| OpenOptions::new().create(true).append(true).open(path);
        let mut inputs = BufWriter::new(open(self.training_inputs_path())?);
        let mut targets = BufWriter::new(open(self.training_targets_path())?);

        for (params, target) in rows {
            let line: Vec<String> = params.iter().map(f64::to_string).collect();
            writeln!(inputs, "{}", line.join(" "))?;
            writeln!(targets, "{version} {target} {}", bounds.normalize(*target))?;
        }

        inputs.flush()?;
        targets.flush()?;
        Ok(())
    }
}

fn write_atomically(path: &Path, contents: &[u8]) -> io::Result<()> {
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp = PathBuf::from(tmp_name);

    let mut file = File::create(&tmp)?;
    file.write_all(contents)?;
    file.sync_all()?;
    fs::rename(&tmp, path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artifact(version: u64) -> SurrogateArtifact {
        SurrogateArtifact {
            version,
            bounds: NormalizationBounds::new(-40.0, -1.0).unwrap(),
            regressor: RegressorSnapshot {
                inputs: 2,
                hidden: vec![2],
                params: vec![0.25; 9],
            },
        }
    }

    #[test]
    fn empty_store_has_no_version() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path().join("surrogate"));

        assert!(store.load_latest().unwrap().is_none());
    }

    #[test]
    fn latest_follows_signature() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());

        store.publish(&artifact(1)).unwrap();
        store.publish(&artifact(2)).unwrap();

        let latest = store.load_latest().unwrap().unwrap();
        assert_eq!(latest, artifact(2));
        assert!(store.model_path(1).exists());
        assert!(!dir.path().join("model_signature.txt.tmp").exists());
    }

    #[test]
    fn model_without_signature_is_invisible() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());

        store.publish(&artifact(1)).unwrap();
        // a writer that died before committing version 2
        fs::write(store.model_path(2), b"{").unwrap();

        assert_eq!(store.load_latest().unwrap().unwrap().version, 1);
    }

    #[test]
    fn corrupt_signature_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        fs::write(store.signature_path(), b"latest").unwrap();

        assert!(matches!(
            store.load_latest(),
            Err(SurrogateErr::Corrupt { .. })
        ));
    }

    #[test]
    fn metrics_are_appended() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());

        store.append_metric(1, 0.5).unwrap();
        store.append_metric(2, 0.25).unwrap();

        let log = fs::read_to_string(store.metrics_path()).unwrap();
        assert_eq!(log, "1 0.5\n2 0.25\n");
    }

    #[test]
    fn training_data_accumulates_across_versions() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let bounds = NormalizationBounds::new(-40.0, -1.0).unwrap();

        let (a, b, c): (&[f64], &[f64], &[f64]) = (&[0.5, -1.0], &[0.0, 2.0], &[1.5, 0.25]);

        store
            .append_training_data(1, &[(a, -40.0), (b, -1.0)], &bounds)
            .unwrap();
        store.append_training_data(2, &[(c, -1.0)], &bounds).unwrap();

        let inputs = fs::read_to_string(store.training_inputs_path()).unwrap();
        assert_eq!(inputs, "0.5 -1\n0 2\n1.5 0.25\n");

        let targets = fs::read_to_string(store.training_targets_path()).unwrap();
        assert_eq!(targets, "1 -40 0\n1 -1 1\n2 -1 1\n");
    }
}
