//! Real-time BJJ referee signals from body and hand landmarks.
//!
//! Each frame's landmarks are classified into a pose and per-hand gestures,
//! reduced to a signalled score and a stop alert, and published for readers
//! while a background [`pipeline::CaptureSession`] keeps pulling frames.

pub mod config;
pub mod error;
pub mod gesture;
pub mod pipeline;
pub mod pose;
pub mod score;
pub mod state;
pub mod types;

pub use config::{CaptureConfig, parse_network_source, reset_to_device};
pub use error::{ClassifyError, SessionError, ValidationError};
pub use gesture::{classify_hand_gesture, classify_hand_gesture_or_unknown};
pub use pose::classify_pose;
pub use score::{Score, aggregate};
pub use state::SharedStateStore;
pub use types::{
    BodyLandmarks, BodyPart, CameraSource, FrameState, GestureLabel, HandLandmarks, Point2D,
    PointSignal, PoseLabel, SessionState,
};
