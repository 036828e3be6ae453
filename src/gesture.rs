use crate::{
    error::ClassifyError,
    types::{GestureLabel, HAND_LANDMARK_COUNT, HandLandmarks, Point2D, PointSignal},
};

/// Tip indices in the 21-point hand convention: thumb, index, middle, ring, pinky.
const FINGER_TIPS: [usize; 5] = [4, 8, 12, 16, 20];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FingerState {
    Extended,
    Folded,
}

impl FingerState {
    pub fn label(&self) -> &'static str {
        match self {
            FingerState::Extended => "extended",
            FingerState::Folded => "folded",
        }
    }

    fn bit(self) -> u8 {
        match self {
            FingerState::Extended => 1,
            FingerState::Folded => 0,
        }
    }
}

/// Named shapes checked only when the finger count does not signal points.
const SHAPE_TABLE: &[([u8; 5], GestureLabel)] = &[
    ([1, 0, 0, 0, 0], GestureLabel::ThumbUp),
    ([1, 1, 1, 1, 1], GestureLabel::AllFingersExtended),
    ([0, 1, 1, 0, 0], GestureLabel::Victory),
];

pub fn classify_hand_gesture(points: &[Point2D]) -> Result<GestureLabel, ClassifyError> {
    let states = finger_states(points)?;

    let raised = states[1..]
        .iter()
        .filter(|state| **state == FingerState::Extended)
        .count();
    if let Some(signal) = PointSignal::from_count(raised) {
        return Ok(GestureLabel::Points(signal));
    }

    let bits = states.map(FingerState::bit);
    let label = SHAPE_TABLE
        .iter()
        .find(|(pattern, _)| *pattern == bits)
        .map(|(_, label)| *label)
        .unwrap_or(GestureLabel::Unknown);

    Ok(label)
}

/// Same as [`classify_hand_gesture`] but a malformed hand becomes `Unknown`,
/// so one bad detection never takes down the capture loop.
pub fn classify_hand_gesture_or_unknown(hand: &HandLandmarks) -> GestureLabel {
    classify_hand_gesture(hand.points()).unwrap_or_else(|err| {
        log::debug!("hand gesture classification skipped: {err}");
        GestureLabel::Unknown
    })
}

/// Per-finger state, thumb first.
pub fn finger_states(points: &[Point2D]) -> Result<[FingerState; 5], ClassifyError> {
    if points.len() != HAND_LANDMARK_COUNT {
        return Err(ClassifyError::InvalidInput(format!(
            "hand landmark set has {} points, expected {HAND_LANDMARK_COUNT}",
            points.len()
        )));
    }

    Ok(FINGER_TIPS.map(|tip| classify_finger(points, tip)))
}

// Tip above the joint two steps down the same finger means extended.
fn classify_finger(points: &[Point2D], tip: usize) -> FingerState {
    if points[tip].y < points[tip - 2].y {
        FingerState::Extended
    } else {
        FingerState::Folded
    }
}
