// src/data.rs
use anyhow::{Context, Result};
use csv::WriterBuilder;
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::debug;

/// What the dataset logger records for the current frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LoggingMode {
    Normal,
    KeyPoint,
    PointHistory,
}

impl LoggingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "Normal",
            Self::KeyPoint => "Logging Key Point",
            Self::PointHistory => "Logging Point History",
        }
    }
}

/// Applies one key press: digits pick the label number for this frame,
/// `n`/`k`/`h` switch the logging mode.
pub fn select_mode(key: Option<char>, mode: LoggingMode) -> (Option<u8>, LoggingMode) {
    let Some(key) = key else {
        return (None, mode);
    };
    let number = key.to_digit(10).map(|d| d as u8);
    let mode = match key {
        'n' => LoggingMode::Normal,
        'k' => LoggingMode::KeyPoint,
        'h' => LoggingMode::PointHistory,
        _ => mode,
    };
    (number, mode)
}

/// Appends labelled feature rows for classifier training.
pub struct DatasetLogger {
    keypoint_path: PathBuf,
    point_history_path: PathBuf,
}

impl DatasetLogger {
    pub fn new(keypoint_path: impl AsRef<Path>, point_history_path: impl AsRef<Path>) -> Self {
        Self {
            keypoint_path: keypoint_path.as_ref().to_path_buf(),
            point_history_path: point_history_path.as_ref().to_path_buf(),
        }
    }

    fn path_for(&self, mode: LoggingMode) -> Option<&Path> {
        match mode {
            LoggingMode::Normal => None,
            LoggingMode::KeyPoint => Some(self.keypoint_path.as_path()),
            LoggingMode::PointHistory => Some(self.point_history_path.as_path()),
        }
    }

    /// Writes `[label, vector...]` to the file for `mode`. Returns whether a
    /// row was written; Normal mode and a missing label are no-ops.
    pub fn log_record(&self, label: Option<u8>, mode: LoggingMode, vector: &[f64]) -> Result<bool> {
        let (Some(label), Some(path)) = (label.filter(|n| *n <= 9), self.path_for(mode)) else {
            return Ok(false);
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("opening dataset {}", path.display()))?;
        let mut writer = WriterBuilder::new().has_headers(false).from_writer(file);

        let row = std::iter::once(label.to_string()).chain(vector.iter().map(|v| v.to_string()));
        writer.write_record(row)?;
        writer.flush()?;

        debug!(path = %path.display(), label, features = vector.len(), "dataset row written");
        Ok(true)
    }
}
