use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
};

use crossbeam_channel::{Sender, bounded};
use parking_lot::{Condvar, Mutex};

use super::landmarks::{LandmarkFrame, LandmarkSource, SourceOpener};
use crate::{
    error::SessionError,
    gesture::classify_hand_gesture_or_unknown,
    pose::classify_pose,
    state::SharedStateStore,
    types::{CameraSource, FrameState, SessionState},
};

/// Receives every frame right after its state is published. Errors are logged
/// by the session and never stop the loop.
pub trait Renderer: Send {
    fn render(&mut self, frame: &LandmarkFrame, state: &FrameState) -> anyhow::Result<()>;
}

pub struct NullRenderer;

impl Renderer for NullRenderer {
    fn render(&mut self, _frame: &LandmarkFrame, _state: &FrameState) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Runs classification for one frame. Hands keep detection order.
pub fn process_frame(frame: &LandmarkFrame) -> FrameState {
    let pose = classify_pose(frame.body.as_ref());
    let gestures = frame
        .hands
        .iter()
        .map(classify_hand_gesture_or_unknown)
        .collect();
    FrameState::new(pose, gestures)
}

fn join_capture_thread(handle: thread::JoinHandle<()>) {
    if handle.join().is_err() {
        log::error!("capture thread panicked");
    }
}

#[derive(Default)]
struct Lifecycle {
    state: SessionState,
    source: CameraSource,
    // Set while `start` waits for the loop thread to open its source.
    starting: bool,
    // Bumped on every start so a finished thread only ever touches its own run.
    generation: u64,
    stop: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
    last_error: Option<SessionError>,
}

#[derive(Default)]
struct Shared {
    lifecycle: Mutex<Lifecycle>,
    stopped: Condvar,
    // Serializes start and stop. `lifecycle` is never held across a source open.
    control: Mutex<()>,
}

impl Shared {
    fn finish_run(&self, generation: u64, error: Option<SessionError>) {
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.generation != generation {
            return;
        }
        lifecycle.state = SessionState::Stopped;
        if let Some(err) = error {
            log::error!("capture loop terminated: {err}");
            lifecycle.last_error = Some(err);
        } else {
            log::info!("capture loop stopped");
        }
        self.stopped.notify_all();
    }
}

/// Owns the background capture loop.
///
/// `start` and `stop` are idempotent and serialized, so at most one loop runs
/// at any time. Cancellation is cooperative: the loop checks its stop flag once
/// per frame, so `stop` waits out the frame in flight, including a blocked
/// frame pull. Network sources bound that wait with their read timeout.
pub struct CaptureSession {
    opener: Arc<dyn SourceOpener>,
    renderer: Arc<Mutex<Box<dyn Renderer>>>,
    store: SharedStateStore,
    shared: Arc<Shared>,
}

impl CaptureSession {
    pub fn new<O, R>(opener: O, renderer: R, source: CameraSource) -> Self
    where
        O: SourceOpener,
        R: Renderer + 'static,
    {
        let renderer: Box<dyn Renderer> = Box::new(renderer);
        let lifecycle = Lifecycle {
            source,
            ..Lifecycle::default()
        };
        Self {
            opener: Arc::new(opener),
            renderer: Arc::new(Mutex::new(renderer)),
            store: SharedStateStore::new(),
            shared: Arc::new(Shared {
                lifecycle: Mutex::new(lifecycle),
                ..Shared::default()
            }),
        }
    }

    pub fn store(&self) -> &SharedStateStore {
        &self.store
    }

    pub fn current(&self) -> Arc<FrameState> {
        self.store.current()
    }

    pub fn state(&self) -> SessionState {
        self.shared.lifecycle.lock().state
    }

    pub fn is_running(&self) -> bool {
        self.state() == SessionState::Running
    }

    /// Most recent source failure, cleared by the next successful start.
    pub fn last_error(&self) -> Option<SessionError> {
        self.shared.lifecycle.lock().last_error.clone()
    }

    pub fn source(&self) -> CameraSource {
        self.shared.lifecycle.lock().source.clone()
    }

    /// Replaces the configured source. A running or starting loop keeps the
    /// source it opened; the new one is used from the next `start`. Returns
    /// `true` when the change is deferred like that.
    pub fn set_source(&self, source: CameraSource) -> bool {
        let mut lifecycle = self.shared.lifecycle.lock();
        let deferred = lifecycle.state == SessionState::Running || lifecycle.starting;
        if deferred {
            log::info!("camera source set to {source}; takes effect after restart");
        } else {
            log::info!("camera source set to {source}");
        }
        lifecycle.source = source;
        deferred
    }

    pub fn start(&self) -> Result<(), SessionError> {
        let _control = self.shared.control.lock();

        let (source, generation, stop, previous) = {
            let mut lifecycle = self.shared.lifecycle.lock();
            if lifecycle.state == SessionState::Running {
                log::debug!("capture session already running");
                return Ok(());
            }
            lifecycle.generation += 1;
            lifecycle.starting = true;
            lifecycle.stop = Arc::new(AtomicBool::new(false));
            (
                lifecycle.source.clone(),
                lifecycle.generation,
                lifecycle.stop.clone(),
                lifecycle.handle.take(),
            )
        };

        // A loop that ended on its own leaves its handle behind.
        if let Some(previous) = previous {
            join_capture_thread(previous);
        }

        let (ready_tx, ready_rx) = bounded(1);
        let context = LoopContext {
            opener: self.opener.clone(),
            renderer: self.renderer.clone(),
            store: self.store.clone(),
            shared: self.shared.clone(),
            stop,
            source: source.clone(),
            generation,
        };
        let spawned = thread::Builder::new()
            .name("capture".to_string())
            .spawn(move || context.run(ready_tx));

        // Fail fast: the thread reports whether the source opened before looping.
        let opened = match spawned {
            Ok(handle) => {
                let opened = ready_rx.recv().unwrap_or_else(|_| {
                    Err(SessionError::SourceUnavailable(
                        "capture thread exited before opening the source".to_string(),
                    ))
                });
                if opened.is_ok() {
                    self.shared.lifecycle.lock().handle = Some(handle);
                } else {
                    join_capture_thread(handle);
                }
                opened
            }
            Err(err) => Err(SessionError::SourceUnavailable(format!(
                "failed to spawn capture thread: {err}"
            ))),
        };

        let mut lifecycle = self.shared.lifecycle.lock();
        lifecycle.starting = false;
        match opened {
            Ok(()) => {
                log::info!("capture session started on {source}");
                Ok(())
            }
            Err(err) => {
                log::error!("failed to start capture session: {err}");
                lifecycle.last_error = Some(err.clone());
                Err(err)
            }
        }
    }

    /// Signals the current run and waits until it has exited. No-op when stopped.
    pub fn stop(&self) {
        let _control = self.shared.control.lock();

        let handle = {
            let mut lifecycle = self.shared.lifecycle.lock();
            if lifecycle.state == SessionState::Stopped {
                return;
            }

            log::info!("stopping capture session");
            let generation = lifecycle.generation;
            lifecycle.stop.store(true, Ordering::SeqCst);
            while lifecycle.state == SessionState::Running && lifecycle.generation == generation {
                self.shared.stopped.wait(&mut lifecycle);
            }
            lifecycle.handle.take()
        };

        if let Some(handle) = handle {
            join_capture_thread(handle);
        }
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.stop();
        let handle = self.shared.lifecycle.lock().handle.take();
        if let Some(handle) = handle {
            join_capture_thread(handle);
        }
    }
}

/// Returns the session to Stopped when the loop thread exits, including by
/// unwinding out of a panicking source or renderer.
struct RunGuard {
    shared: Arc<Shared>,
    generation: u64,
    source: CameraSource,
    armed: bool,
    error: Option<SessionError>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let error = if thread::panicking() {
            Some(SessionError::LoopPanicked(self.source.to_string()))
        } else {
            self.error.take()
        };
        self.shared.finish_run(self.generation, error);
    }
}

struct LoopContext {
    opener: Arc<dyn SourceOpener>,
    renderer: Arc<Mutex<Box<dyn Renderer>>>,
    store: SharedStateStore,
    shared: Arc<Shared>,
    stop: Arc<AtomicBool>,
    source: CameraSource,
    generation: u64,
}

impl LoopContext {
    fn run(self, ready_tx: Sender<Result<(), SessionError>>) {
        // Declared before the source so the source is dropped first.
        let mut guard = RunGuard {
            shared: self.shared.clone(),
            generation: self.generation,
            source: self.source.clone(),
            armed: false,
            error: None,
        };

        let mut source = match self.opener.open(&self.source) {
            Ok(source) => source,
            Err(err) => {
                let _ = ready_tx.send(Err(SessionError::SourceUnavailable(format!("{err:#}"))));
                return;
            }
        };

        self.store.reset();
        {
            let mut lifecycle = self.shared.lifecycle.lock();
            lifecycle.state = SessionState::Running;
            lifecycle.last_error = None;
        }
        guard.armed = true;
        if ready_tx.send(Ok(())).is_err() {
            return;
        }

        guard.error = self.capture_loop(source.as_mut());
    }

    fn capture_loop(&self, source: &mut dyn LandmarkSource) -> Option<SessionError> {
        while !self.stop.load(Ordering::Relaxed) {
            let Some(frame) = source.next_frame() else {
                return Some(SessionError::SourceUnavailable(format!(
                    "{} stopped delivering frames",
                    self.source
                )));
            };

            let state = self.store.publish(process_frame(&frame));
            if let Err(err) = self.renderer.lock().render(&frame, &state) {
                log::warn!("overlay rendering failed: {err:?}");
            }
        }
        None
    }
}
