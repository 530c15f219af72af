use crate::posture::{BodyPart, PoseLandmarks};

/// Torso and limb points fed to the posture model, in model input order.
pub const FEATURE_POINTS: [BodyPart; 12] = [
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

pub const FEATURE_LEN: usize = FEATURE_POINTS.len() * 3;

/// Builds the model input vector: pixel x/y (clamped to the frame) and raw z,
/// relative to the first point, flattened and scaled by the largest magnitude.
pub fn landmark_features(pose: &PoseLandmarks, width: u32, height: u32) -> Vec<f32> {
    let max_x = i64::from(width) - 1;
    let max_y = i64::from(height) - 1;

    let points: Vec<[f32; 3]> = FEATURE_POINTS
        .iter()
        .map(|part| {
            let landmark = pose.get(*part);
            let x = ((landmark.x * width as f32) as i64).min(max_x);
            let y = ((landmark.y * height as f32) as i64).min(max_y);
            [x as f32, y as f32, landmark.z]
        })
        .collect();

    let base = points[0];
    let relative: Vec<f32> = points
        .iter()
        .flat_map(|point| {
            [
                point[0] - base[0],
                point[1] - base[1],
                point[2] - base[2],
            ]
        })
        .collect();

    let max_abs = relative.iter().fold(0.0_f32, |acc, value| acc.max(value.abs()));
    if max_abs == 0.0 {
        return vec![0.0; FEATURE_LEN];
    }

    relative.into_iter().map(|value| value / max_abs).collect()
}
