pub mod alert;
pub mod geometry;
pub mod landmarks;
pub mod metrics;
pub mod monitor;
pub mod overlay;

pub use alert::{AlertLatch, AlertState};
pub use landmarks::{BodyPart, Landmark, PoseLandmarks};
pub use metrics::PostureMetrics;
pub use monitor::{FrameOutcome, FrameVerdict, MonitorConfig, PostureMonitor, PostureThresholds};

use thiserror::Error;

/// Why a single frame produced no classification. None of these end the stream.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("failed to decode frame: {0}")]
    Decode(#[source] image::ImageError),

    #[error("failed to encode frame: {0}")]
    Encode(#[source] image::ImageError),

    #[error("landmark extraction failed: {0:#}")]
    Extraction(anyhow::Error),

    #[error("degenerate {0} geometry")]
    DegenerateGeometry(&'static str),

    #[error("compute pool failure: {0:#}")]
    Compute(anyhow::Error),
}
