// src/classifier.rs - Pose and trajectory classifier interfaces
use crate::gesture::ClassId;
use csv::ReaderBuilder;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

pub const DEFAULT_POSE_LABELS: [&str; 7] = [
    "Open",
    "Close",
    "Pointer",
    "OK",
    "Thumbs Up",
    "Thumbs Down",
    "Peace",
];
pub const DEFAULT_TRAJECTORY_LABELS: [&str; 4] = ["Stop", "Clockwise", "Counter Clockwise", "Move"];

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("{path} line {line}: {reason}")]
    Parse {
        path: PathBuf,
        line: u64,
        reason: String,
    },
    #[error("{0} has no usable samples")]
    EmptyDataset(PathBuf),
}

/// Maps a normalized feature vector to a class id.
pub trait Classifier: Send {
    fn classify(&self, features: &[f64]) -> ClassId;
}

/// Ordered class names; the class id is the position in the list.
#[derive(Debug, Clone)]
pub struct LabelSet {
    labels: Vec<String>,
}

impl LabelSet {
    pub fn new(labels: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            labels: labels.into_iter().map(Into::into).collect(),
        }
    }

    /// First column of every row.
    pub fn from_csv(path: impl AsRef<Path>) -> Result<Self, ModelError> {
        let path = path.as_ref();
        let read_err = |source| ModelError::Read {
            path: path.to_path_buf(),
            source,
        };
        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(path)
            .map_err(read_err)?;

        let mut labels = Vec::new();
        for record in reader.records() {
            let record = record.map_err(read_err)?;
            if let Some(first) = record.get(0) {
                labels.push(first.trim_start_matches('\u{feff}').trim().to_string());
            }
        }
        Ok(Self { labels })
    }

    pub fn label(&self, id: ClassId) -> &str {
        self.labels.get(id).map(String::as_str).unwrap_or("Unknown")
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Nearest-centroid classifier over the rows written by the dataset logger
/// (`label, feature0, feature1, ...`).
#[derive(Debug, Clone)]
pub struct CentroidClassifier {
    centroids: Vec<(ClassId, Vec<f64>)>,
    feature_len: usize,
}

impl CentroidClassifier {
    pub fn from_samples<I>(samples: I, feature_len: usize) -> Option<Self>
    where
        I: IntoIterator<Item = (ClassId, Vec<f64>)>,
    {
        let mut sums: BTreeMap<ClassId, (Vec<f64>, usize)> = BTreeMap::new();
        for (label, features) in samples {
            if features.len() != feature_len {
                continue;
            }
            let (sum, count) = sums
                .entry(label)
                .or_insert_with(|| (vec![0.0; feature_len], 0));
            for (acc, v) in sum.iter_mut().zip(&features) {
                *acc += v;
            }
            *count += 1;
        }

        if sums.is_empty() {
            return None;
        }

        let centroids = sums
            .into_iter()
            .map(|(label, (sum, count))| {
                let n = count as f64;
                (label, sum.into_iter().map(|v| v / n).collect())
            })
            .collect();
        Some(Self {
            centroids,
            feature_len,
        })
    }

    pub fn from_csv(path: impl AsRef<Path>, feature_len: usize) -> Result<Self, ModelError> {
        let path = path.as_ref();
        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(path)
            .map_err(|source| ModelError::Read {
                path: path.to_path_buf(),
                source,
            })?;

        let mut samples = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|source| ModelError::Read {
                path: path.to_path_buf(),
                source,
            })?;
            let line = record.position().map(|p| p.line()).unwrap_or(0);
            let parse_err = |reason: String| ModelError::Parse {
                path: path.to_path_buf(),
                line,
                reason,
            };

            let mut fields = record.iter();
            let label: ClassId = fields
                .next()
                .ok_or_else(|| parse_err("empty row".into()))?
                .trim()
                .parse()
                .map_err(|e| parse_err(format!("bad label: {e}")))?;
            let features = fields
                .map(|f| f.trim().parse::<f64>())
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| parse_err(format!("bad feature: {e}")))?;

            if features.len() != feature_len {
                warn!(
                    path = %path.display(),
                    line,
                    expected = feature_len,
                    actual = features.len(),
                    "skipping sample with wrong feature count"
                );
                continue;
            }
            samples.push((label, features));
        }

        Self::from_samples(samples, feature_len).ok_or_else(|| ModelError::EmptyDataset(path.to_path_buf()))
    }

    pub fn classes(&self) -> impl Iterator<Item = ClassId> + '_ {
        self.centroids.iter().map(|(label, _)| *label)
    }
}

impl Classifier for CentroidClassifier {
    fn classify(&self, features: &[f64]) -> ClassId {
        if features.len() != self.feature_len {
            debug!(
                expected = self.feature_len,
                actual = features.len(),
                "feature length mismatch, defaulting to class 0"
            );
            return 0;
        }

        self.centroids
            .iter()
            .map(|(label, centroid)| {
                let dist: f64 = centroid
                    .iter()
                    .zip(features)
                    .map(|(c, f)| (c - f) * (c - f))
                    .sum();
                (*label, dist)
            })
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(label, _)| label)
            .unwrap_or(0)
    }
}

/// Always answers the same class. Stands in when no model is available,
/// e.g. while collecting the first dataset.
#[derive(Debug, Clone, Copy)]
pub struct FixedClassifier(pub ClassId);

impl Classifier for FixedClassifier {
    fn classify(&self, _features: &[f64]) -> ClassId {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_dir(tag: &str) -> PathBuf {
        let suffix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos();
        let dir = std::env::temp_dir().join(format!("gesture_menu_{tag}_{suffix}"));
        fs::create_dir_all(&dir).expect("create temp dir");
        dir
    }

    #[test]
    fn labels_resolve_by_position() {
        let labels = LabelSet::new(DEFAULT_TRAJECTORY_LABELS);
        assert_eq!(labels.label(1), "Clockwise");
        assert_eq!(labels.label(9), "Unknown");
        assert_eq!(labels.len(), 4);
    }

    #[test]
    fn labels_load_first_column_and_strip_bom() {
        let dir = temp_dir("labels");
        let path = dir.join("labels.csv");
        fs::write(&path, "\u{feff}Open\nClose,extra\nPointer\n").expect("write");

        let labels = LabelSet::from_csv(&path).expect("labels");
        assert_eq!(labels.label(0), "Open");
        assert_eq!(labels.label(1), "Close");
        assert_eq!(labels.label(2), "Pointer");

        fs::remove_dir_all(dir).expect("cleanup");
    }

    #[test]
    fn centroid_picks_nearest_class() {
        let classifier = CentroidClassifier::from_samples(
            vec![
                (0, vec![0.0, 0.0]),
                (0, vec![0.2, 0.0]),
                (1, vec![1.0, 1.0]),
                (2, vec![-1.0, 1.0]),
                (2, vec![9.0]),
            ],
            2,
        )
        .expect("classifier");

        assert_eq!(classifier.classes().collect::<Vec<_>>(), vec![0, 1, 2]);
        assert_eq!(classifier.classify(&[0.1, 0.1]), 0);
        assert_eq!(classifier.classify(&[0.9, 0.8]), 1);
        assert_eq!(classifier.classify(&[-0.7, 0.9]), 2);
        assert_eq!(classifier.classify(&[1.0]), 0);
        assert_eq!(FixedClassifier(3).classify(&[0.5, 0.5]), 3);
    }

    #[test]
    fn centroid_loads_dataset_rows() {
        let dir = temp_dir("dataset");
        let path = dir.join("keypoint.csv");
        fs::write(&path, "3,0.5,0.5\n4,-0.5,-0.5\n4,-0.4,-0.6\n1,0.1\n").expect("write");

        let classifier = CentroidClassifier::from_csv(&path, 2).expect("classifier");
        assert_eq!(classifier.classify(&[0.4, 0.6]), 3);
        assert_eq!(classifier.classify(&[-0.5, -0.4]), 4);

        fs::remove_dir_all(dir).expect("cleanup");
    }

    #[test]
    fn centroid_rejects_empty_or_malformed_dataset() {
        let dir = temp_dir("bad_dataset");
        let empty = dir.join("empty.csv");
        fs::write(&empty, "").expect("write");
        assert!(matches!(
            CentroidClassifier::from_csv(&empty, 2),
            Err(ModelError::EmptyDataset(_))
        ));

        let malformed = dir.join("malformed.csv");
        fs::write(&malformed, "x,0.1,0.2\n").expect("write");
        assert!(matches!(
            CentroidClassifier::from_csv(&malformed, 2),
            Err(ModelError::Parse { .. })
        ));

        assert!(matches!(
            CentroidClassifier::from_csv(dir.join("missing.csv"), 2),
            Err(ModelError::Read { .. })
        ));

        fs::remove_dir_all(dir).expect("cleanup");
    }
}
