//! Seams to the two inference engines the pipeline treats as black boxes.

#[cfg(feature = "onnx")]
mod onnx;

#[cfg(feature = "onnx")]
pub use onnx::{OnnxLandmarkExtractor, OnnxPostureModel};

use anyhow::Result;
use image::RgbImage;

use crate::posture::PoseLandmarks;

/// Pose-landmark extraction engine.
pub trait LandmarkExtractor: Send + Sync {
    /// `Ok(None)` when no person is visible in the frame.
    fn extract(&self, frame: &RgbImage) -> Result<Option<PoseLandmarks>>;
}

/// Quantized posture classifier over a normalized landmark vector.
pub trait PostureModel: Send + Sync {
    /// Index into [`PostureModel::labels`] of the highest scoring class.
    fn classify(&self, features: &[f32]) -> Result<usize>;

    /// Ordered class labels, fixed for the lifetime of the model.
    fn labels(&self) -> &[String];
}

/// Reads a label file with one class name per line, taking the first CSV
/// column and skipping a UTF-8 BOM and blank lines.
pub fn parse_labels(contents: &str) -> Vec<String> {
    contents
        .trim_start_matches('\u{feff}')
        .lines()
        .filter_map(|line| {
            let name = line.split(',').next().unwrap_or("").trim();
            (!name.is_empty()).then(|| name.to_string())
        })
        .collect()
}
