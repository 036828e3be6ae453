use crate::types::{GestureLabel, PoseLabel};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Score {
    pub signalled_points: u32,
    pub alert: bool,
}

/// Reduces one frame's labels. Stateless: nothing carries over between frames.
pub fn aggregate(gestures: &[GestureLabel], pose: PoseLabel) -> Score {
    let signalled_points = gestures.iter().filter_map(GestureLabel::points).sum();

    Score {
        signalled_points,
        alert: pose.is_stop_signal(),
    }
}
