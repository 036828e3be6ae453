//! Landmark builders and polling helpers shared by the integration tests

#![allow(dead_code)]

use std::{
    thread,
    time::{Duration, Instant},
};

use bjj_vision::{BodyLandmarks, BodyPart, HandLandmarks, Point2D, types::BODY_LANDMARK_COUNT};

/// Hand whose fingers (thumb first) are extended where `bits` is 1.
pub fn hand_with_fingers(bits: [u8; 5]) -> HandLandmarks {
    HandLandmarks::new(hand_points(bits))
}

pub fn hand_points(bits: [u8; 5]) -> Vec<Point2D> {
    let mut points = vec![Point2D::new(0.5, 0.5); 21];
    for (tip, bit) in [4usize, 8, 12, 16, 20].into_iter().zip(bits) {
        points[tip - 2] = Point2D::new(0.5, 0.5);
        points[tip] = if bit == 1 {
            Point2D::new(0.5, 0.3)
        } else {
            Point2D::new(0.5, 0.7)
        };
    }
    points
}

/// Full body set with the four landmarks the pose classifier reads.
pub fn body(
    left_shoulder: (f32, f32),
    right_shoulder: (f32, f32),
    left_wrist: (f32, f32),
    right_wrist: (f32, f32),
) -> BodyLandmarks {
    let mut points = vec![Point2D::new(0.5, 0.5); BODY_LANDMARK_COUNT];
    let mut set = |part: BodyPart, (x, y): (f32, f32)| points[part.index()] = Point2D::new(x, y);
    set(BodyPart::LeftShoulder, left_shoulder);
    set(BodyPart::RightShoulder, right_shoulder);
    set(BodyPart::LeftWrist, left_wrist);
    set(BodyPart::RightWrist, right_wrist);
    BodyLandmarks::new(points)
}

pub fn t_pose_body() -> BodyLandmarks {
    body((0.6, 0.375), (0.4, 0.375), (0.9, 0.375), (0.1, 0.375))
}

pub fn standing_body() -> BodyLandmarks {
    body((0.6, 0.375), (0.4, 0.375), (0.65, 0.75), (0.35, 0.75))
}

pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}
