pub mod camera;
pub mod compositor;
pub mod landmarks;
pub mod mjpeg;
pub mod session;
pub mod skeleton;

// Re-exports for convenience
pub use camera::{FrameGrabber, NetworkGrabber, open_frame_grabber};
pub use compositor::{CompositedFrame, OverlayRenderer, compose, overlay_channel};
pub use landmarks::{
    CameraLandmarkSource, CameraOpener, Detection, LandmarkDetector, LandmarkFrame,
    LandmarkRecordReader, LandmarkSource, NoDetector, RecordedDetector, ReplayOpener,
    ReplaySource, SourceOpener, interval_for_fps,
};
pub use session::{CaptureSession, NullRenderer, Renderer, process_frame};
