use std::{fs, path::Path, sync::Mutex};

use anyhow::{anyhow, bail, Context, Result};
use image::{imageops::FilterType, RgbImage};
use log::info;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Tensor;

use super::{parse_labels, LandmarkExtractor, PostureModel};
use crate::posture::{BodyPart, Landmark, PoseLandmarks};

/// MoveNet single-pose input edge.
const MOVENET_INPUT_SIZE: u32 = 192;

/// MoveNet keypoint order, mapped onto the 33-point topology.
const MOVENET_PARTS: [BodyPart; 17] = [
    BodyPart::Nose,
    BodyPart::LeftEye,
    BodyPart::RightEye,
    BodyPart::LeftEar,
    BodyPart::RightEar,
    BodyPart::LeftShoulder,
    BodyPart::RightShoulder,
    BodyPart::LeftElbow,
    BodyPart::RightElbow,
    BodyPart::LeftWrist,
    BodyPart::RightWrist,
    BodyPart::LeftHip,
    BodyPart::RightHip,
    BodyPart::LeftKnee,
    BodyPart::RightKnee,
    BodyPart::LeftAnkle,
    BodyPart::RightAnkle,
];

/// Parts that must be visible for the frame to count as posed.
const REQUIRED_PARTS: [BodyPart; 3] = [BodyPart::RightShoulder, BodyPart::RightEar, BodyPart::RightHip];

fn open_session(model_path: &Path) -> Result<(Session, String, String)> {
    let session = Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .commit_from_file(model_path)
        .with_context(|| format!("failed to load ONNX model {}", model_path.display()))?;

    let input_name = session
        .inputs
        .first()
        .map(|input| input.name.clone())
        .ok_or_else(|| anyhow!("model {} has no inputs", model_path.display()))?;
    let output_name = session
        .outputs
        .first()
        .map(|output| output.name.clone())
        .ok_or_else(|| anyhow!("model {} has no outputs", model_path.display()))?;

    Ok((session, input_name, output_name))
}

pub struct OnnxLandmarkExtractor {
    session: Mutex<Session>,
    input_name: String,
    output_name: String,
    min_confidence: f32,
}

impl OnnxLandmarkExtractor {
    pub fn new(model_path: &Path, min_confidence: f32) -> Result<Self> {
        let (session, input_name, output_name) = open_session(model_path)?;
        info!(
            "Landmark model loaded from {} (input={}, output={})",
            model_path.display(),
            input_name,
            output_name
        );
        Ok(Self {
            session: Mutex::new(session),
            input_name,
            output_name,
            min_confidence,
        })
    }

    // [1, 192, 192, 3] f32 in 0.0-255.0
    fn preprocess(frame: &RgbImage) -> Vec<f32> {
        let resized = image::imageops::resize(
            frame,
            MOVENET_INPUT_SIZE,
            MOVENET_INPUT_SIZE,
            FilterType::Triangle,
        );
        resized.into_raw().into_iter().map(f32::from).collect()
    }
}

impl LandmarkExtractor for OnnxLandmarkExtractor {
    fn extract(&self, frame: &RgbImage) -> Result<Option<PoseLandmarks>> {
        let size = MOVENET_INPUT_SIZE as usize;
        let input = Tensor::from_array((vec![1_usize, size, size, 3], Self::preprocess(frame)))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| anyhow!("landmark session lock poisoned"))?;
        let outputs = session.run(ort::inputs![self.input_name.as_str() => input])?;

        // [1, 1, 17, 3] as (y, x, score)
        let (_, data) = outputs[self.output_name.as_str()].try_extract_tensor::<f32>()?;
        if data.len() < MOVENET_PARTS.len() * 3 {
            bail!("unexpected landmark output length {}", data.len());
        }

        let parts: Vec<(BodyPart, Landmark)> = MOVENET_PARTS
            .iter()
            .enumerate()
            .map(|(i, part)| {
                let y = data[i * 3];
                let x = data[i * 3 + 1];
                let score = data[i * 3 + 2];
                (*part, Landmark::new(x, y, 0.0, score))
            })
            .collect();
        let pose = PoseLandmarks::from_parts(&parts);

        let visible = REQUIRED_PARTS
            .iter()
            .all(|part| pose.get(*part).visibility >= self.min_confidence);
        Ok(visible.then_some(pose))
    }
}

pub struct OnnxPostureModel {
    session: Mutex<Session>,
    input_name: String,
    output_name: String,
    labels: Vec<String>,
}

impl OnnxPostureModel {
    pub fn new(model_path: &Path, labels_path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(labels_path)
            .with_context(|| format!("failed to read labels from {}", labels_path.display()))?;
        let labels = parse_labels(&contents);
        if labels.is_empty() {
            bail!("label file {} is empty", labels_path.display());
        }

        let (session, input_name, output_name) = open_session(model_path)?;
        info!(
            "Posture model loaded from {} with {} labels",
            model_path.display(),
            labels.len()
        );

        Ok(Self {
            session: Mutex::new(session),
            input_name,
            output_name,
            labels,
        })
    }
}

impl PostureModel for OnnxPostureModel {
    fn classify(&self, features: &[f32]) -> Result<usize> {
        let input = Tensor::from_array((vec![1_usize, features.len()], features.to_vec()))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| anyhow!("posture session lock poisoned"))?;
        let outputs = session.run(ort::inputs![self.input_name.as_str() => input])?;
        let (_, scores) = outputs[self.output_name.as_str()].try_extract_tensor::<f32>()?;

        scores
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.total_cmp(b))
            .map(|(index, _)| index)
            .ok_or_else(|| anyhow!("posture model returned no scores"))
    }

    fn labels(&self) -> &[String] {
        &self.labels
    }
}
