use anyhow::anyhow;
use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};

use super::{landmarks::LandmarkFrame, session::Renderer, skeleton::Canvas};
use crate::types::{Frame, FrameState};

const ALERT_BORDER_FRACTION: f32 = 0.03;

#[derive(Clone, Debug)]
pub struct CompositedFrame {
    pub frame: Frame,
    pub state: FrameState,
}

/// Draws landmarks and score overlays onto a copy of each frame and hands the
/// result to a display thread. Frames are dropped while the consumer is busy.
pub struct OverlayRenderer {
    tx: Sender<CompositedFrame>,
    dropped: u64,
}

impl OverlayRenderer {
    pub fn new(tx: Sender<CompositedFrame>) -> Self {
        Self { tx, dropped: 0 }
    }

    pub fn dropped_frames(&self) -> u64 {
        self.dropped
    }
}

pub fn overlay_channel(capacity: usize) -> (OverlayRenderer, Receiver<CompositedFrame>) {
    let (tx, rx) = bounded(capacity);
    (OverlayRenderer::new(tx), rx)
}

pub fn compose(frame: &LandmarkFrame, state: &FrameState) -> Frame {
    let mut composed = frame.image.clone();
    let (width, height) = (composed.width, composed.height);
    let mut canvas = Canvas::new(&mut composed.rgba, width, height);

    if let Some(body) = &frame.body {
        canvas.draw_body(body);
    }
    for hand in &frame.hands {
        canvas.draw_hand(hand);
    }
    canvas.draw_score_pips(state.signalled_points());
    if state.alert() {
        let thickness = (width.min(height) as f32 * ALERT_BORDER_FRACTION).max(2.0) as i32;
        canvas.draw_alert_border(thickness);
    }

    composed
}

impl Renderer for OverlayRenderer {
    fn render(&mut self, frame: &LandmarkFrame, state: &FrameState) -> anyhow::Result<()> {
        let composited = CompositedFrame {
            frame: compose(frame, state),
            state: state.clone(),
        };

        match self.tx.try_send(composited) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                self.dropped += 1;
                Ok(())
            }
            Err(TrySendError::Disconnected(_)) => Err(anyhow!("overlay consumer disconnected")),
        }
    }
}
