use std::{fmt, time::Instant};

use serde::{Deserialize, Serialize};

use crate::score;

pub const HAND_LANDMARK_COUNT: usize = 21;
pub const BODY_LANDMARK_COUNT: usize = 33;

#[derive(Clone, Debug)]
pub struct Frame {
    pub rgba: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub timestamp: Instant,
}

impl Frame {
    /// Opaque black frame, used when landmarks arrive without a camera image.
    pub fn blank(width: u32, height: u32) -> Self {
        let mut rgba = vec![0u8; (width as usize) * (height as usize) * 4];
        for px in rgba.chunks_exact_mut(4) {
            px[3] = 255;
        }
        Self {
            rgba,
            width,
            height,
            timestamp: Instant::now(),
        }
    }
}

/// Normalized image-space coordinate, origin top-left, y growing downward.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Point2D {
    pub x: f32,
    pub y: f32,
}

impl Point2D {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn to_pixels(self, width: u32, height: u32) -> (f32, f32) {
        (self.x * width as f32, self.y * height as f32)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BodyPart {
    Nose = 0,
    LeftEyeInner = 1,
    LeftEye = 2,
    LeftEyeOuter = 3,
    RightEyeInner = 4,
    RightEye = 5,
    RightEyeOuter = 6,
    LeftEar = 7,
    RightEar = 8,
    MouthLeft = 9,
    MouthRight = 10,
    LeftShoulder = 11,
    RightShoulder = 12,
    LeftElbow = 13,
    RightElbow = 14,
    LeftWrist = 15,
    RightWrist = 16,
    LeftPinky = 17,
    RightPinky = 18,
    LeftIndex = 19,
    RightIndex = 20,
    LeftThumb = 21,
    RightThumb = 22,
    LeftHip = 23,
    RightHip = 24,
    LeftKnee = 25,
    RightKnee = 26,
    LeftAnkle = 27,
    RightAnkle = 28,
    LeftHeel = 29,
    RightHeel = 30,
    LeftFootIndex = 31,
    RightFootIndex = 32,
}

impl BodyPart {
    pub const fn index(self) -> usize {
        self as usize
    }
}

/// Body landmarks in detector order. Providers may send fewer than
/// [`BODY_LANDMARK_COUNT`] points; lookups past the end yield `None`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BodyLandmarks {
    points: Vec<Point2D>,
}

impl BodyLandmarks {
    pub fn new(points: Vec<Point2D>) -> Self {
        Self { points }
    }

    pub fn get(&self, part: BodyPart) -> Option<Point2D> {
        self.points.get(part.index()).copied()
    }

    pub fn points(&self) -> &[Point2D] {
        &self.points
    }
}

/// One detected hand. Well-formed sets hold [`HAND_LANDMARK_COUNT`] points;
/// the classifier rejects anything else.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HandLandmarks {
    points: Vec<Point2D>,
}

impl HandLandmarks {
    pub fn new(points: Vec<Point2D>) -> Self {
        Self { points }
    }

    pub fn points(&self) -> &[Point2D] {
        &self.points
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum PoseLabel {
    #[default]
    Unknown,
    StandingUpright,
    ArmsExtended,
    TPose,
}

impl PoseLabel {
    pub const ALL: [PoseLabel; 4] = [
        PoseLabel::Unknown,
        PoseLabel::StandingUpright,
        PoseLabel::ArmsExtended,
        PoseLabel::TPose,
    ];

    pub fn display_name(&self) -> &'static str {
        match self {
            PoseLabel::Unknown => "Unknown",
            PoseLabel::StandingUpright => "Standing Upright",
            PoseLabel::ArmsExtended => "Arms Extended",
            PoseLabel::TPose => "T-pose",
        }
    }

    /// Poses the referee uses to halt the match.
    pub fn is_stop_signal(&self) -> bool {
        matches!(self, PoseLabel::ArmsExtended | PoseLabel::TPose)
    }
}

impl fmt::Display for PoseLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PointSignal {
    Two = 2,
    Three = 3,
    Four = 4,
}

impl PointSignal {
    pub fn from_count(count: usize) -> Option<Self> {
        match count {
            2 => Some(PointSignal::Two),
            3 => Some(PointSignal::Three),
            4 => Some(PointSignal::Four),
            _ => None,
        }
    }

    pub const fn value(self) -> u32 {
        self as u32
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum GestureLabel {
    #[default]
    Unknown,
    ThumbUp,
    Victory,
    AllFingersExtended,
    Points(PointSignal),
}

impl GestureLabel {
    pub fn display_name(&self) -> String {
        match self {
            GestureLabel::Unknown => "Unknown".to_string(),
            GestureLabel::ThumbUp => "Thumb Up".to_string(),
            GestureLabel::Victory => "Victory".to_string(),
            GestureLabel::AllFingersExtended => "All Fingers Extended".to_string(),
            GestureLabel::Points(signal) => format!("{} Points", signal.value()),
        }
    }

    pub fn points(&self) -> Option<u32> {
        match self {
            GestureLabel::Points(signal) => Some(signal.value()),
            _ => None,
        }
    }
}

impl fmt::Display for GestureLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_name())
    }
}

/// Classification result for one frame. Only built through [`FrameState::new`],
/// so the score always matches the gestures it was derived from.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FrameState {
    pose: PoseLabel,
    gestures: Vec<GestureLabel>,
    signalled_points: u32,
    alert: bool,
}

impl FrameState {
    pub fn new(pose: PoseLabel, gestures: Vec<GestureLabel>) -> Self {
        let score = score::aggregate(&gestures, pose);
        Self {
            pose,
            gestures,
            signalled_points: score.signalled_points,
            alert: score.alert,
        }
    }

    pub fn pose(&self) -> PoseLabel {
        self.pose
    }

    pub fn gestures(&self) -> &[GestureLabel] {
        &self.gestures
    }

    pub fn signalled_points(&self) -> u32 {
        self.signalled_points
    }

    pub fn alert(&self) -> bool {
        self.alert
    }

    /// Text lines for an on-screen overlay, top to bottom.
    pub fn overlay_lines(&self) -> Vec<String> {
        let mut lines = Vec::with_capacity(self.gestures.len() + 3);
        lines.push(format!("Pose: {}", self.pose));
        for (idx, gesture) in self.gestures.iter().enumerate() {
            lines.push(format!("Hand {}: {}", idx + 1, gesture));
        }
        lines.push(format!("Score Signalled: {}", self.signalled_points));
        if self.alert {
            lines.push("STOP FIGHT".to_string());
        }
        lines
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CameraSource {
    Device(u32),
    Network(String),
}

impl Default for CameraSource {
    fn default() -> Self {
        CameraSource::Device(0)
    }
}

impl fmt::Display for CameraSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CameraSource::Device(index) => write!(f, "device camera #{index}"),
            CameraSource::Network(url) => write!(f, "IP camera {url}"),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SessionState {
    #[default]
    Stopped,
    Running,
}
