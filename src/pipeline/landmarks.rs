//! Landmark provider seam. The detection model itself lives outside this crate;
//! anything that can turn a camera frame into body/hand landmarks plugs in here.

use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::{Path, PathBuf},
    thread,
    time::Duration,
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use super::camera::{FrameGrabber, open_frame_grabber};
use crate::{
    config::CaptureConfig,
    types::{BodyLandmarks, CameraSource, Frame, HandLandmarks},
};

/// Landmarks found in one frame. Also the line format of recorded landmark files.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    #[serde(default)]
    pub body: Option<BodyLandmarks>,
    #[serde(default)]
    pub hands: Vec<HandLandmarks>,
}

#[derive(Clone, Debug)]
pub struct LandmarkFrame {
    pub image: Frame,
    pub body: Option<BodyLandmarks>,
    /// In detection order.
    pub hands: Vec<HandLandmarks>,
}

impl LandmarkFrame {
    pub fn new(image: Frame, detection: Detection) -> Self {
        Self {
            image,
            body: detection.body,
            hands: detection.hands,
        }
    }
}

pub trait LandmarkSource {
    /// `None` means the source is exhausted or disconnected.
    fn next_frame(&mut self) -> Option<LandmarkFrame>;
}

/// Opens a fresh [`LandmarkSource`] for a camera source. Called on the capture
/// thread each time a session starts, so sources themselves need not be `Send`.
pub trait SourceOpener: Send + Sync + 'static {
    fn open(&self, source: &CameraSource) -> Result<Box<dyn LandmarkSource>>;
}

impl<F> SourceOpener for F
where
    F: Fn(&CameraSource) -> Result<Box<dyn LandmarkSource>> + Send + Sync + 'static,
{
    fn open(&self, source: &CameraSource) -> Result<Box<dyn LandmarkSource>> {
        self(source)
    }
}

pub trait LandmarkDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Detection>;
}

/// Detector for when no model is wired in: every frame is empty.
pub struct NoDetector;

impl LandmarkDetector for NoDetector {
    fn detect(&mut self, _frame: &Frame) -> Result<Detection> {
        Ok(Detection::default())
    }
}

/// Reads newline-delimited JSON [`Detection`] records, one per frame.
pub struct LandmarkRecordReader<R> {
    reader: R,
    line: String,
    line_no: usize,
}

impl LandmarkRecordReader<BufReader<File>> {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("failed to open landmark file {}", path.display()))?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: BufRead> LandmarkRecordReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: String::new(),
            line_no: 0,
        }
    }

    /// Next record, skipping blank lines. `Ok(None)` at end of input.
    pub fn next_record(&mut self) -> Result<Option<Detection>> {
        loop {
            self.line.clear();
            let read = self
                .reader
                .read_line(&mut self.line)
                .context("failed to read landmark record")?;
            if read == 0 {
                return Ok(None);
            }
            self.line_no += 1;

            let trimmed = self.line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let record = serde_json::from_str(trimmed)
                .with_context(|| format!("malformed landmark record on line {}", self.line_no))?;
            return Ok(Some(record));
        }
    }
}

/// Pairs each camera frame with the next recorded detection; frames past the
/// end of the recording come back empty.
pub struct RecordedDetector<R> {
    records: LandmarkRecordReader<R>,
    exhausted: bool,
}

impl RecordedDetector<BufReader<File>> {
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self::new(LandmarkRecordReader::open(path)?))
    }
}

impl<R: BufRead> RecordedDetector<R> {
    pub fn new(records: LandmarkRecordReader<R>) -> Self {
        Self {
            records,
            exhausted: false,
        }
    }
}

impl<R: BufRead> LandmarkDetector for RecordedDetector<R> {
    fn detect(&mut self, _frame: &Frame) -> Result<Detection> {
        if self.exhausted {
            return Ok(Detection::default());
        }
        match self.records.next_record()? {
            Some(record) => Ok(record),
            None => {
                log::info!("landmark recording exhausted, continuing without detections");
                self.exhausted = true;
                Ok(Detection::default())
            }
        }
    }
}

/// Camera frames run through a detector.
pub struct CameraLandmarkSource {
    grabber: Box<dyn FrameGrabber>,
    detector: Box<dyn LandmarkDetector>,
}

impl CameraLandmarkSource {
    pub fn new(grabber: Box<dyn FrameGrabber>, detector: Box<dyn LandmarkDetector>) -> Self {
        Self { grabber, detector }
    }
}

impl LandmarkSource for CameraLandmarkSource {
    fn next_frame(&mut self) -> Option<LandmarkFrame> {
        let image = match self.grabber.grab() {
            Ok(image) => image,
            Err(err) => {
                log::error!("camera frame read failed: {err:?}");
                return None;
            }
        };

        // A failed detection costs one frame, not the session.
        let detection = self.detector.detect(&image).unwrap_or_else(|err| {
            log::warn!("landmark detection failed: {err:?}");
            Detection::default()
        });

        Some(LandmarkFrame::new(image, detection))
    }
}

type DetectorFactory = dyn Fn() -> Result<Box<dyn LandmarkDetector>> + Send + Sync;

/// Opens real cameras and builds a new detector for each run.
pub struct CameraOpener {
    config: CaptureConfig,
    make_detector: Box<DetectorFactory>,
}

impl CameraOpener {
    pub fn new<F>(config: CaptureConfig, make_detector: F) -> Self
    where
        F: Fn() -> Result<Box<dyn LandmarkDetector>> + Send + Sync + 'static,
    {
        Self {
            config,
            make_detector: Box::new(make_detector),
        }
    }

    pub fn without_detector(config: CaptureConfig) -> Self {
        Self::new(config, || Ok(Box::new(NoDetector)))
    }

    pub fn with_recording(config: CaptureConfig, path: PathBuf) -> Self {
        Self::new(config, move || Ok(Box::new(RecordedDetector::open(&path)?)))
    }
}

impl SourceOpener for CameraOpener {
    fn open(&self, source: &CameraSource) -> Result<Box<dyn LandmarkSource>> {
        let grabber = open_frame_grabber(source, &self.config)
            .with_context(|| format!("failed to open {source}"))?;
        let detector = (self.make_detector)()?;
        Ok(Box::new(CameraLandmarkSource::new(grabber, detector)))
    }
}

/// Replays a landmark recording without a camera, on blank frames.
pub struct ReplaySource<R> {
    records: LandmarkRecordReader<R>,
    width: u32,
    height: u32,
    frame_interval: Option<Duration>,
}

impl<R: BufRead> ReplaySource<R> {
    pub fn new(records: LandmarkRecordReader<R>, width: u32, height: u32) -> Self {
        Self {
            records,
            width,
            height,
            frame_interval: None,
        }
    }

    pub fn with_frame_interval(mut self, interval: Duration) -> Self {
        self.frame_interval = Some(interval);
        self
    }
}

impl<R: BufRead> LandmarkSource for ReplaySource<R> {
    fn next_frame(&mut self) -> Option<LandmarkFrame> {
        let detection = match self.records.next_record() {
            Ok(Some(detection)) => detection,
            Ok(None) => {
                log::info!("landmark replay reached end of recording");
                return None;
            }
            Err(err) => {
                log::error!("landmark replay failed: {err:?}");
                return None;
            }
        };

        if let Some(interval) = self.frame_interval {
            thread::sleep(interval);
        }

        Some(LandmarkFrame::new(
            Frame::blank(self.width, self.height),
            detection,
        ))
    }
}

pub struct ReplayOpener {
    path: PathBuf,
    width: u32,
    height: u32,
    frame_interval: Option<Duration>,
}

impl ReplayOpener {
    /// `fps` throttles the replay; values with no representable frame interval
    /// (zero, negative, non-finite or vanishingly small) replay unthrottled.
    pub fn new(path: PathBuf, config: &CaptureConfig, fps: Option<f32>) -> Self {
        let frame_interval = fps.and_then(interval_for_fps);
        Self {
            path,
            width: config.width,
            height: config.height,
            frame_interval,
        }
    }
}

impl SourceOpener for ReplayOpener {
    fn open(&self, source: &CameraSource) -> Result<Box<dyn LandmarkSource>> {
        log::info!("replaying {} in place of {source}", self.path.display());
        let records = LandmarkRecordReader::open(&self.path)?;
        let mut replay = ReplaySource::new(records, self.width, self.height);
        if let Some(interval) = self.frame_interval {
            replay = replay.with_frame_interval(interval);
        }
        Ok(Box::new(replay))
    }
}

/// Time between replayed frames at `fps`, if it is representable.
pub fn interval_for_fps(fps: f32) -> Option<Duration> {
    if fps.is_nan() || fps <= 0.0 {
        return None;
    }
    Duration::try_from_secs_f32(1.0 / fps).ok()
}
