use anyhow::{bail, Context, Result};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::posture::{MonitorConfig, PostureThresholds};

#[derive(Parser, Debug, Default)]
#[command(name = "shpd-relay", about = "Posture monitoring frame relay")]
pub struct Args {
    /// JSON settings file; defaults are used for anything it leaves out
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Listen address, e.g. 0.0.0.0:8765
    #[arg(long)]
    pub bind: Option<String>,

    /// SQLite database file
    #[arg(long, value_name = "PATH")]
    pub db_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostureSettings {
    pub offset_threshold: f64,
    pub neck_threshold_degrees: f64,
    pub torso_threshold_degrees: f64,
    pub fps: f64,
    pub default_alert_threshold_secs: u64,
    pub metrics_history_cap: usize,
}

impl Default for PostureSettings {
    fn default() -> Self {
        let monitor = MonitorConfig::default();
        Self {
            offset_threshold: monitor.thresholds.offset,
            neck_threshold_degrees: monitor.thresholds.neck_degrees,
            torso_threshold_degrees: monitor.thresholds.torso_degrees,
            fps: monitor.fps,
            default_alert_threshold_secs: monitor.default_alert_threshold_secs,
            metrics_history_cap: monitor.metrics_history_cap,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisSettings {
    pub buffer_length: usize,
    pub min_consistency: f64,
    pub timeline_cap: usize,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            buffer_length: 2,
            min_consistency: 0.2,
            timeline_cap: 200,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelaySettings {
    pub output_queue_capacity: usize,
    pub jpeg_quality: u8,
    pub compute_threads: usize,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            output_queue_capacity: 1,
            jpeg_quality: 50,
            compute_threads: 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    pub landmark_model: PathBuf,
    pub landmark_min_confidence: f32,
    pub posture_model: PathBuf,
    pub posture_labels: PathBuf,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            landmark_model: PathBuf::from("model/movenet_lightning.onnx"),
            landmark_min_confidence: 0.3,
            posture_model: PathBuf::from("model/keypoint_classifier.onnx"),
            posture_labels: PathBuf::from("model/keypoint_classifier_label.csv"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub bind: String,
    pub db_path: PathBuf,
    pub posture: PostureSettings,
    pub analysis: AnalysisSettings,
    pub relay: RelaySettings,
    pub models: ModelSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8765".into(),
            db_path: PathBuf::from("shpd.sqlite3"),
            posture: PostureSettings::default(),
            analysis: AnalysisSettings::default(),
            relay: RelaySettings::default(),
            models: ModelSettings::default(),
        }
    }
}

impl Settings {
    /// Reads `path` if it exists; a missing file means defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings from {}", path.display()))?;
        let settings: Self = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse settings in {}", path.display()))?;
        settings
            .validate()
            .with_context(|| format!("Invalid settings in {}", path.display()))?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        let fps = self.posture.fps;
        if !(fps.is_finite() && fps > 0.0) {
            bail!("posture.fps must be a positive number, got {fps}");
        }
        Ok(())
    }

    pub fn from_args(args: &Args) -> Result<Self> {
        let mut settings = match &args.config {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        if let Some(bind) = &args.bind {
            settings.bind = bind.clone();
        }
        if let Some(db_path) = &args.db_path {
            settings.db_path = db_path.clone();
        }
        Ok(settings)
    }

    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            thresholds: PostureThresholds {
                offset: self.posture.offset_threshold,
                neck_degrees: self.posture.neck_threshold_degrees,
                torso_degrees: self.posture.torso_threshold_degrees,
            },
            fps: self.posture.fps,
            default_alert_threshold_secs: self.posture.default_alert_threshold_secs,
            metrics_history_cap: self.posture.metrics_history_cap,
        }
    }
}

/// `SHPD_DEBUG=1` (or `true`) turns on debug logging when `RUST_LOG` is unset.
pub fn debug_mode() -> bool {
    std::env::var("SHPD_DEBUG")
        .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}
