use std::sync::Arc;

use parking_lot::RwLock;

use crate::types::FrameState;

#[derive(Default)]
struct Slot {
    current: Arc<FrameState>,
    published: u64,
}

/// Latest published [`FrameState`], shared between the capture loop and readers.
///
/// The writer swaps in a whole snapshot under the lock, so a reader sees either the
/// previous frame or the new one, never a mix. The lock is held only for the swap.
#[derive(Clone, Default)]
pub struct SharedStateStore {
    slot: Arc<RwLock<Slot>>,
}

impl SharedStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, frame: FrameState) -> Arc<FrameState> {
        let frame = Arc::new(frame);
        let mut slot = self.slot.write();
        slot.current = frame.clone();
        slot.published += 1;
        frame
    }

    pub fn current(&self) -> Arc<FrameState> {
        self.slot.read().current.clone()
    }

    /// Snapshot together with the number of frames published so far.
    pub fn current_with_count(&self) -> (Arc<FrameState>, u64) {
        let slot = self.slot.read();
        (slot.current.clone(), slot.published)
    }

    pub fn published_frames(&self) -> u64 {
        self.slot.read().published
    }

    pub fn reset(&self) {
        *self.slot.write() = Slot::default();
    }
}
