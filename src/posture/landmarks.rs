//! Body landmarks in the 33-point BlazePose topology.

/// Number of landmark slots per pose.
pub const LANDMARK_COUNT: usize = 33;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum BodyPart {
    Nose = 0,
    LeftEye = 2,
    RightEye = 5,
    LeftEar = 7,
    RightEar = 8,
    LeftShoulder = 11,
    RightShoulder = 12,
    LeftElbow = 13,
    RightElbow = 14,
    LeftWrist = 15,
    RightWrist = 16,
    LeftHip = 23,
    RightHip = 24,
    LeftKnee = 25,
    RightKnee = 26,
    LeftAnkle = 27,
    RightAnkle = 28,
}

impl BodyPart {
    pub fn index(self) -> usize {
        self as usize
    }
}

/// One landmark. `x` and `y` are normalized to the frame (0.0-1.0), `z` is
/// the engine's relative depth.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub visibility: f32,
}

impl Landmark {
    pub fn new(x: f32, y: f32, z: f32, visibility: f32) -> Self {
        Self { x, y, z, visibility }
    }

    /// Pixel coordinates, truncated toward zero.
    pub fn to_pixel(&self, width: u32, height: u32) -> (i32, i32) {
        let px = (self.x * width as f32) as i32;
        let py = (self.y * height as f32) as i32;
        (px, py)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PoseLandmarks {
    points: [Landmark; LANDMARK_COUNT],
}

impl PoseLandmarks {
    pub fn new(points: [Landmark; LANDMARK_COUNT]) -> Self {
        Self { points }
    }

    /// Builds a pose from the named parts an engine reports; unnamed slots stay zeroed.
    pub fn from_parts(parts: &[(BodyPart, Landmark)]) -> Self {
        let mut points = [Landmark::default(); LANDMARK_COUNT];
        for (part, landmark) in parts {
            points[part.index()] = *landmark;
        }
        Self { points }
    }

    pub fn get(&self, part: BodyPart) -> &Landmark {
        &self.points[part.index()]
    }

    pub fn point(&self, index: usize) -> Option<&Landmark> {
        self.points.get(index)
    }

    pub fn points(&self) -> &[Landmark] {
        &self.points
    }
}
