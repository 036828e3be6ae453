use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result, anyhow};
use bjj_vision::{
    CameraSource, CaptureConfig, FrameState,
    config::{ABOUT_TEXT, DEFAULT_CAPTURE_HEIGHT, DEFAULT_CAPTURE_WIDTH},
    parse_network_source,
    pipeline::{CameraOpener, CaptureSession, ReplayOpener, interval_for_fps, overlay_channel},
    types::Frame,
};
use clap::Parser;
use crossbeam_channel::RecvTimeoutError;
use log::info;

const POLL_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Parser, Debug)]
#[command(author, version, about = "Real-time BJJ vision scoring", long_about = ABOUT_TEXT)]
struct Args {
    /// Local camera index
    #[arg(long, conflicts_with = "ip")]
    device: Option<u32>,

    /// IP camera: last two octets of its 192.168.x.y address, e.g. 0.212
    #[arg(long)]
    ip: Option<String>,

    /// Newline-delimited JSON landmarks produced by an external detector
    #[arg(long)]
    landmarks: Option<PathBuf>,

    /// Replay the landmark file on blank frames instead of opening a camera
    #[arg(long, requires = "landmarks")]
    no_camera: bool,

    /// Replay rate for --no-camera (unthrottled when omitted)
    #[arg(long, value_parser = parse_fps)]
    fps: Option<f32>,

    /// Requested capture width
    #[arg(long, default_value_t = DEFAULT_CAPTURE_WIDTH)]
    width: u32,

    /// Requested capture height
    #[arg(long, default_value_t = DEFAULT_CAPTURE_HEIGHT)]
    height: u32,

    /// Stop after this many frames
    #[arg(long)]
    frames: Option<u64>,

    /// Write the last composited frame to this PNG file
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// Enable debug output
    #[arg(short, long)]
    debug: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let default_filter = if args.debug { "debug" } else { "info" };
    env_logger::init_from_env(env_logger::Env::new().default_filter_or(default_filter));

    let mut config = CaptureConfig {
        width: args.width,
        height: args.height,
        ..CaptureConfig::default()
    };
    if let Some(octets) = &args.ip {
        config.source = parse_network_source(octets)?;
    } else if let Some(index) = args.device {
        config.source = CameraSource::Device(index);
    }

    let (renderer, composited_rx) = overlay_channel(2);
    let source = config.source.clone();
    let session = match &args.landmarks {
        Some(path) if args.no_camera => CaptureSession::new(
            ReplayOpener::new(path.clone(), &config, args.fps),
            renderer,
            source,
        ),
        Some(path) => CaptureSession::new(
            CameraOpener::with_recording(config.clone(), path.clone()),
            renderer,
            source,
        ),
        None => {
            info!("no landmark input given; frames will classify as Unknown");
            CaptureSession::new(CameraOpener::without_detector(config.clone()), renderer, source)
        }
    };

    session.start()?;

    let mut last_state: Option<FrameState> = None;
    let mut last_frame: Option<Frame> = None;
    loop {
        match composited_rx.recv_timeout(POLL_INTERVAL) {
            Ok(composited) => {
                if last_state.as_ref() != Some(&composited.state) {
                    info!("{}", composited.state.overlay_lines().join(" | "));
                    last_state = Some(composited.state);
                }
                last_frame = Some(composited.frame);
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        let published = session.store().published_frames();
        if args.frames.is_some_and(|limit| published >= limit) {
            info!("frame limit reached after {published} frames");
            break;
        }
        if !session.is_running() {
            break;
        }
    }

    session.stop();
    if let Some(composited) = composited_rx.try_iter().last() {
        last_frame = Some(composited.frame);
    }
    if let Some(err) = session.last_error() {
        info!("session ended: {err}");
    }

    if let Some(path) = &args.snapshot {
        let frame = last_frame.ok_or_else(|| anyhow!("no frame was captured for the snapshot"))?;
        save_snapshot(path, frame)?;
        info!("wrote snapshot to {}", path.display());
    }

    Ok(())
}

fn parse_fps(raw: &str) -> Result<f32, String> {
    let fps: f32 = raw.parse().map_err(|err| format!("{err}"))?;
    if interval_for_fps(fps).is_none() {
        return Err(format!("{fps} is not a usable frame rate"));
    }
    Ok(fps)
}

fn save_snapshot(path: &Path, frame: Frame) -> Result<()> {
    let image = image::RgbaImage::from_raw(frame.width, frame.height, frame.rgba)
        .ok_or_else(|| anyhow!("frame buffer does not match its dimensions"))?;
    image
        .save(path)
        .with_context(|| format!("failed to write snapshot {}", path.display()))
}
