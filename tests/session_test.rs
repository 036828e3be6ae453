//! Capture session lifecycle: start/stop idempotence, source failures,
//! deferred reconfiguration and per-frame publication

mod test_helpers;

use std::{
    collections::VecDeque,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    thread,
    time::Duration,
};

use anyhow::anyhow;
use bjj_vision::{
    CameraSource, FrameState, GestureLabel, PointSignal, PoseLabel, SessionError, SessionState,
    parse_network_source,
    pipeline::{
        CaptureSession, Detection, LandmarkFrame, LandmarkSource, NullRenderer, Renderer,
        overlay_channel, process_frame,
    },
    types::{Frame, HandLandmarks, Point2D},
};
use parking_lot::Mutex;
use test_helpers::{hand_with_fingers, standing_body, t_pose_body, wait_until};

const TIMEOUT: Duration = Duration::from_secs(5);

fn landmark_frame(detection: Detection) -> LandmarkFrame {
    LandmarkFrame::new(Frame::blank(8, 6), detection)
}

/// Yields the scripted frames, then reports end of stream.
struct ScriptedSource {
    frames: VecDeque<LandmarkFrame>,
}

impl LandmarkSource for ScriptedSource {
    fn next_frame(&mut self) -> Option<LandmarkFrame> {
        self.frames.pop_front()
    }
}

/// Never ends; counts live instances so tests can see how many loops run.
struct EndlessSource {
    live: Arc<AtomicUsize>,
    dropped: Arc<AtomicBool>,
}

impl LandmarkSource for EndlessSource {
    fn next_frame(&mut self) -> Option<LandmarkFrame> {
        thread::sleep(Duration::from_millis(1));
        Some(landmark_frame(Detection {
            body: Some(standing_body()),
            hands: vec![hand_with_fingers([0, 1, 1, 0, 0])],
        }))
    }
}

impl Drop for EndlessSource {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
        self.dropped.store(true, Ordering::SeqCst);
    }
}

#[derive(Clone, Default)]
struct Probe {
    opened: Arc<Mutex<Vec<CameraSource>>>,
    live: Arc<AtomicUsize>,
    dropped: Arc<AtomicBool>,
}

impl Probe {
    fn endless_session(&self, source: CameraSource) -> CaptureSession {
        let probe = self.clone();
        CaptureSession::new(
            move |source: &CameraSource| -> anyhow::Result<Box<dyn LandmarkSource>> {
                probe.opened.lock().push(source.clone());
                probe.live.fetch_add(1, Ordering::SeqCst);
                Ok(Box::new(EndlessSource {
                    live: probe.live.clone(),
                    dropped: probe.dropped.clone(),
                }))
            },
            NullRenderer,
            source,
        )
    }
}

fn scripted_session<R: Renderer + 'static>(
    frames: Vec<LandmarkFrame>,
    renderer: R,
) -> CaptureSession {
    let frames = Mutex::new(Some(frames));
    CaptureSession::new(
        move |_: &CameraSource| -> anyhow::Result<Box<dyn LandmarkSource>> {
            let frames = frames.lock().take().unwrap_or_default();
            Ok(Box::new(ScriptedSource {
                frames: frames.into(),
            }))
        },
        renderer,
        CameraSource::Device(0),
    )
}

#[derive(Clone, Default)]
struct RecordingRenderer {
    seen: Arc<Mutex<Vec<FrameState>>>,
}

impl Renderer for RecordingRenderer {
    fn render(&mut self, _frame: &LandmarkFrame, state: &FrameState) -> anyhow::Result<()> {
        self.seen.lock().push(state.clone());
        Ok(())
    }
}

struct FailingRenderer {
    calls: Arc<AtomicUsize>,
}

impl Renderer for FailingRenderer {
    fn render(&mut self, _frame: &LandmarkFrame, _state: &FrameState) -> anyhow::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(anyhow!("display went away"))
    }
}

struct PanickingRenderer;

impl Renderer for PanickingRenderer {
    fn render(&mut self, _frame: &LandmarkFrame, _state: &FrameState) -> anyhow::Result<()> {
        panic!("renderer blew up");
    }
}

#[test]
fn test_new_session_is_stopped_with_default_state() {
    let session = Probe::default().endless_session(CameraSource::Device(0));
    assert_eq!(session.state(), SessionState::Stopped);
    assert_eq!(*session.current(), FrameState::default());
    assert!(session.last_error().is_none());
}

#[test]
fn test_double_start_runs_one_loop() {
    let probe = Probe::default();
    let session = probe.endless_session(CameraSource::Device(0));

    session.start().unwrap();
    session.start().unwrap();

    assert_eq!(session.state(), SessionState::Running);
    assert_eq!(probe.opened.lock().len(), 1);
    assert_eq!(probe.live.load(Ordering::SeqCst), 1);

    session.stop();
    assert_eq!(session.state(), SessionState::Stopped);
    assert_eq!(probe.live.load(Ordering::SeqCst), 0);
}

#[test]
fn test_concurrent_starts_run_one_loop() {
    let probe = Probe::default();
    let session = Arc::new(probe.endless_session(CameraSource::Device(0)));

    let starters: Vec<_> = (0..8)
        .map(|_| {
            let session = session.clone();
            thread::spawn(move || session.start())
        })
        .collect();
    for starter in starters {
        starter.join().unwrap().unwrap();
    }

    assert_eq!(probe.opened.lock().len(), 1);
    assert_eq!(probe.live.load(Ordering::SeqCst), 1);
    session.stop();
}

#[test]
fn test_stop_when_stopped_is_noop() {
    let probe = Probe::default();
    let session = probe.endless_session(CameraSource::Device(0));

    session.stop();
    session.stop();
    assert_eq!(session.state(), SessionState::Stopped);

    session.start().unwrap();
    session.stop();
    session.stop();
    assert_eq!(session.state(), SessionState::Stopped);
    assert!(probe.dropped.load(Ordering::SeqCst));
}

#[test]
fn test_running_loop_publishes_frames() {
    let session = Probe::default().endless_session(CameraSource::Device(0));
    session.start().unwrap();

    assert!(wait_until(TIMEOUT, || session.store().published_frames() >= 3));
    let state = session.current();
    assert_eq!(state.pose(), PoseLabel::StandingUpright);
    assert_eq!(
        state.gestures(),
        &[GestureLabel::Points(PointSignal::Two)]
    );
    assert_eq!(state.signalled_points(), 2);

    session.stop();
    let published = session.store().published_frames();
    thread::sleep(Duration::from_millis(20));
    assert_eq!(session.store().published_frames(), published);
}

#[test]
fn test_restart_after_stop() {
    let probe = Probe::default();
    let session = probe.endless_session(CameraSource::Device(0));

    session.start().unwrap();
    session.stop();
    session.start().unwrap();
    assert_eq!(session.state(), SessionState::Running);
    assert_eq!(probe.opened.lock().len(), 2);
    assert_eq!(probe.live.load(Ordering::SeqCst), 1);
    session.stop();
}

#[test]
fn test_unopenable_source_stays_stopped() {
    let session = CaptureSession::new(
        |source: &CameraSource| -> anyhow::Result<Box<dyn LandmarkSource>> {
            Err(anyhow!("no camera at {source}"))
        },
        NullRenderer,
        CameraSource::Device(3),
    );

    let err = session.start().unwrap_err();
    assert!(matches!(err, SessionError::SourceUnavailable(_)));
    assert!(err.to_string().contains("device camera #3"));
    assert_eq!(session.state(), SessionState::Stopped);
    assert_eq!(session.last_error(), Some(err));
}

#[test]
fn test_source_end_stops_session_and_reports() {
    let frames = vec![
        landmark_frame(Detection::default()),
        landmark_frame(Detection::default()),
        landmark_frame(Detection::default()),
    ];
    let session = scripted_session(frames, NullRenderer);

    session.start().unwrap();
    assert!(wait_until(TIMEOUT, || !session.is_running()));

    assert_eq!(session.store().published_frames(), 3);
    assert!(matches!(
        session.last_error(),
        Some(SessionError::SourceUnavailable(_))
    ));

    // Stopping after the loop ended on its own is still a no-op.
    session.stop();
    assert_eq!(session.state(), SessionState::Stopped);
}

#[test]
fn test_frames_publish_and_render_in_order() {
    let frames = vec![
        landmark_frame(Detection {
            body: Some(standing_body()),
            hands: vec![hand_with_fingers([0, 1, 1, 1, 0])],
        }),
        landmark_frame(Detection {
            body: Some(t_pose_body()),
            hands: vec![
                hand_with_fingers([0, 1, 1, 0, 0]),
                hand_with_fingers([1, 0, 0, 0, 0]),
            ],
        }),
        landmark_frame(Detection::default()),
    ];
    let expected: Vec<FrameState> = frames.iter().map(process_frame).collect();

    let renderer = RecordingRenderer::default();
    let seen = renderer.seen.clone();
    let session = scripted_session(frames, renderer);
    session.start().unwrap();
    assert!(wait_until(TIMEOUT, || !session.is_running()));

    assert_eq!(*seen.lock(), expected);
    assert_eq!(expected[1].signalled_points(), 2);
    assert!(expected[1].alert());
    assert_eq!(
        expected[1].gestures(),
        &[
            GestureLabel::Points(PointSignal::Two),
            GestureLabel::ThumbUp
        ]
    );
    assert_eq!(*session.current(), FrameState::default());
}

#[test]
fn test_renderer_errors_do_not_stop_the_loop() {
    let calls = Arc::new(AtomicUsize::new(0));
    let frames = (0..5)
        .map(|_| landmark_frame(Detection::default()))
        .collect();
    let session = scripted_session(
        frames,
        FailingRenderer {
            calls: calls.clone(),
        },
    );

    session.start().unwrap();
    assert!(wait_until(TIMEOUT, || !session.is_running()));
    assert_eq!(calls.load(Ordering::SeqCst), 5);
    assert_eq!(session.store().published_frames(), 5);
}

#[test]
fn test_set_source_is_deferred_while_running() {
    let probe = Probe::default();
    let session = probe.endless_session(CameraSource::Device(0));
    session.start().unwrap();

    let network = parse_network_source("0.212").unwrap();
    assert!(session.set_source(network.clone()));
    assert_eq!(session.source(), network);
    assert_eq!(*probe.opened.lock(), vec![CameraSource::Device(0)]);

    session.stop();
    session.start().unwrap();
    assert_eq!(
        *probe.opened.lock(),
        vec![CameraSource::Device(0), network]
    );
    session.stop();
}

#[test]
fn test_set_source_when_stopped_applies_on_start() {
    let probe = Probe::default();
    let session = probe.endless_session(CameraSource::Device(0));

    assert!(!session.set_source(CameraSource::Device(2)));
    session.start().unwrap();
    assert_eq!(*probe.opened.lock(), vec![CameraSource::Device(2)]);
    session.stop();
}

#[test]
fn test_rejected_source_keeps_previous() {
    let session = Probe::default().endless_session(CameraSource::Device(1));
    if let Ok(source) = parse_network_source("999.1") {
        session.set_source(source);
    }
    assert_eq!(session.source(), CameraSource::Device(1));
}

#[test]
fn test_drop_stops_running_loop() {
    let probe = Probe::default();
    let session = probe.endless_session(CameraSource::Device(0));
    session.start().unwrap();
    drop(session);

    assert!(probe.dropped.load(Ordering::SeqCst));
    assert_eq!(probe.live.load(Ordering::SeqCst), 0);
}

#[test]
fn test_panicking_renderer_returns_session_to_stopped() {
    let frames = (0..3)
        .map(|_| landmark_frame(Detection::default()))
        .collect();
    let session = scripted_session(frames, PanickingRenderer);

    session.start().unwrap();
    assert!(wait_until(TIMEOUT, || !session.is_running()));
    assert!(matches!(
        session.last_error(),
        Some(SessionError::LoopPanicked(_))
    ));
    assert_eq!(session.store().published_frames(), 1);

    let (done_tx, done_rx) = crossbeam_channel::bounded(1);
    thread::spawn(move || {
        session.stop();
        assert_eq!(session.state(), SessionState::Stopped);
        drop(session);
        let _ = done_tx.send(());
    });
    assert!(done_rx.recv_timeout(TIMEOUT).is_ok(), "stop or drop hung");
}

#[test]
fn test_malformed_landmarks_flow_through_loop_and_overlay() {
    let short_hand = HandLandmarks::new(vec![Point2D::new(0.5, 0.5); 20]);
    let huge_hand = HandLandmarks::new(vec![Point2D::new(1e10, -1e10); 21]);
    let nan_hand = HandLandmarks::new(vec![Point2D::new(f32::NAN, f32::NAN); 21]);
    let mut mixed = vec![Point2D::new(0.5, 0.5); 21];
    mixed[4] = Point2D::new(-1e10, 0.5);
    mixed[8] = Point2D::new(1e10, 0.5);
    let frames = vec![
        landmark_frame(Detection {
            body: None,
            hands: vec![short_hand, huge_hand],
        }),
        landmark_frame(Detection {
            body: None,
            hands: vec![nan_hand, HandLandmarks::new(mixed)],
        }),
        landmark_frame(Detection {
            body: Some(standing_body()),
            hands: vec![hand_with_fingers([0, 1, 1, 0, 0])],
        }),
    ];

    let (renderer, rx) = overlay_channel(8);
    let session = scripted_session(frames, renderer);
    session.start().unwrap();
    assert!(wait_until(TIMEOUT, || !session.is_running()));

    let states: Vec<FrameState> = rx.try_iter().map(|c| c.state).collect();
    assert_eq!(states.len(), 3);
    assert_eq!(states[0].gestures(), &[GestureLabel::Unknown; 2]);
    assert_eq!(states[1].gestures(), &[GestureLabel::Unknown; 2]);
    assert_eq!(states[0].signalled_points(), 0);
    assert_eq!(states[2].signalled_points(), 2);
    // The loop only ended because the script ran out.
    assert!(matches!(
        session.last_error(),
        Some(SessionError::SourceUnavailable(_))
    ));
}

#[test]
fn test_set_source_during_slow_open_is_deferred_without_blocking() {
    let (opening_tx, opening_rx) = crossbeam_channel::bounded::<()>(1);
    let (release_tx, release_rx) = crossbeam_channel::bounded::<()>(1);
    let session = Arc::new(CaptureSession::new(
        move |_: &CameraSource| -> anyhow::Result<Box<dyn LandmarkSource>> {
            let _ = opening_tx.send(());
            let _ = release_rx.recv_timeout(TIMEOUT);
            Ok(Box::new(ScriptedSource {
                frames: VecDeque::new(),
            }))
        },
        NullRenderer,
        CameraSource::Device(0),
    ));

    let starter = {
        let session = session.clone();
        thread::spawn(move || session.start())
    };
    opening_rx.recv_timeout(TIMEOUT).unwrap();

    // Both return while the open is still pending.
    assert_eq!(session.state(), SessionState::Stopped);
    assert!(session.set_source(CameraSource::Device(5)));

    release_tx.send(()).unwrap();
    starter.join().unwrap().unwrap();
    assert_eq!(session.source(), CameraSource::Device(5));
}

#[test]
fn test_racing_starts_and_stops_all_return() {
    let probe = Probe::default();
    let session = Arc::new(probe.endless_session(CameraSource::Device(0)));
    let (done_tx, done_rx) = crossbeam_channel::unbounded();

    for worker in 0..4 {
        let session = session.clone();
        let done_tx = done_tx.clone();
        thread::spawn(move || {
            for round in 0..50 {
                if (worker + round) % 2 == 0 {
                    let _ = session.start();
                } else {
                    session.stop();
                }
            }
            let _ = done_tx.send(());
        });
    }

    for _ in 0..4 {
        assert!(done_rx.recv_timeout(TIMEOUT * 2).is_ok(), "start/stop hung");
    }
    session.stop();
    assert_eq!(session.state(), SessionState::Stopped);
    assert_eq!(probe.live.load(Ordering::SeqCst), 0);
}
