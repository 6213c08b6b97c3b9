// src/config.rs - Runtime settings: defaults, JSON file, environment overrides
use crate::devices::Device;
use crate::tracking::HISTORY_LENGTH;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

const ENV_PREFIX: &str = "GESTURE_MENU__";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub frame_width: f64,
    pub frame_height: f64,
    pub history_length: usize,
    pub dispatch_timeout_ms: u64,
    /// Log device commands instead of sending them.
    pub dry_run: bool,
    pub devices: Vec<Device>,
    /// Holds the classifier datasets and label files. Empty means the
    /// user's documents folder.
    pub model_dir: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            frame_width: 960.0,
            frame_height: 540.0,
            history_length: HISTORY_LENGTH,
            dispatch_timeout_ms: 2000,
            dry_run: true,
            devices: vec![
                Device::switch("Switch1", "192.168.12.151"),
                Device::switch("Switch2", "192.168.12.152"),
                Device::light("Led", "192.168.12.153"),
                Device::switch("Siren", "192.168.12.154"),
                Device::light("Bulb", "192.168.12.154"),
            ],
            model_dir: PathBuf::from("model"),
        }
    }
}

impl Settings {
    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_millis(self.dispatch_timeout_ms)
    }

    pub fn model_dir(&self) -> PathBuf {
        if !self.model_dir.as_os_str().is_empty() {
            return self.model_dir.clone();
        }
        directories::UserDirs::new()
            .and_then(|dirs| dirs.document_dir().map(|p| p.join("GestureMenu")))
            .unwrap_or_else(|| PathBuf::from("./model"))
    }

    pub fn keypoint_dataset(&self) -> PathBuf {
        self.model_dir().join("keypoint_classifier").join("keypoint.csv")
    }

    pub fn keypoint_labels(&self) -> PathBuf {
        self.model_dir()
            .join("keypoint_classifier")
            .join("keypoint_classifier_label.csv")
    }

    pub fn point_history_dataset(&self) -> PathBuf {
        self.model_dir()
            .join("point_history_classifier")
            .join("point_history.csv")
    }

    pub fn point_history_labels(&self) -> PathBuf {
        self.model_dir()
            .join("point_history_classifier")
            .join("point_history_classifier_label.csv")
    }

    /// Applies `GESTURE_MENU__*` values. Unparseable values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

        if let Some(v) = get("FRAME_WIDTH") {
            parse_into(&mut self.frame_width, "FRAME_WIDTH", &v);
        }
        if let Some(v) = get("FRAME_HEIGHT") {
            parse_into(&mut self.frame_height, "FRAME_HEIGHT", &v);
        }
        if let Some(v) = get("DRY_RUN") {
            parse_into(&mut self.dry_run, "DRY_RUN", &v);
        }
        if let Some(v) = get("DISPATCH_TIMEOUT_MS") {
            parse_into(&mut self.dispatch_timeout_ms, "DISPATCH_TIMEOUT_MS", &v);
        }
        if let Some(v) = get("MODEL_DIR") {
            self.model_dir = PathBuf::from(v);
        }
    }
}

fn parse_into<T: std::str::FromStr>(slot: &mut T, name: &str, raw: &str) {
    match raw.trim().parse() {
        Ok(value) => *slot = value,
        Err(_) => warn!(setting = name, value = raw, "ignoring unparseable override"),
    }
}

pub fn load_settings(path: Option<&Path>) -> Result<Settings> {
    let mut settings = match path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading settings {}", path.display()))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("parsing settings {}", path.display()))?
        }
        None => Settings::default(),
    };
    settings.apply_overrides(|key| std::env::var(key).ok());
    Ok(settings)
}
