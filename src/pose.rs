use crate::{
    error::ClassifyError,
    types::{BodyLandmarks, BodyPart, PoseLabel},
};

/// Maximum vertical offset, in normalized units, for two landmarks to count as level.
pub const LEVEL_TOLERANCE: f32 = 0.1;

/// Classifies a single frame's body landmarks. Missing or malformed input
/// degrades to [`PoseLabel::Unknown`].
pub fn classify_pose(body: Option<&BodyLandmarks>) -> PoseLabel {
    let Some(body) = body else {
        return PoseLabel::Unknown;
    };

    match try_classify_pose(body) {
        Ok(label) => label,
        Err(err) => {
            log::debug!("pose classification skipped: {err}");
            PoseLabel::Unknown
        }
    }
}

pub fn try_classify_pose(body: &BodyLandmarks) -> Result<PoseLabel, ClassifyError> {
    let point = |part: BodyPart| {
        body.get(part).ok_or_else(|| {
            ClassifyError::InvalidInput(format!(
                "body landmark {part:?} missing ({} points supplied)",
                body.points().len()
            ))
        })
    };

    let left_shoulder = point(BodyPart::LeftShoulder)?;
    let right_shoulder = point(BodyPart::RightShoulder)?;
    let left_wrist = point(BodyPart::LeftWrist)?;
    let right_wrist = point(BodyPart::RightWrist)?;

    // Arm geometry is meaningless once the torso is tilted.
    if (left_shoulder.y - right_shoulder.y).abs() >= LEVEL_TOLERANCE {
        return Ok(PoseLabel::Unknown);
    }

    let left_arm_level = (left_wrist.y - left_shoulder.y).abs() < LEVEL_TOLERANCE;
    let right_arm_level = (right_wrist.y - right_shoulder.y).abs() < LEVEL_TOLERANCE;
    if left_arm_level && right_arm_level {
        return Ok(PoseLabel::TPose);
    }

    if left_wrist.x < left_shoulder.x && right_wrist.x > right_shoulder.x {
        return Ok(PoseLabel::ArmsExtended);
    }

    Ok(PoseLabel::StandingUpright)
}
