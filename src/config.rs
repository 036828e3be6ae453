//! Capture configuration and camera source parsing.

use std::time::Duration;

use crate::{error::ValidationError, types::CameraSource};

pub const DEFAULT_CAPTURE_WIDTH: u32 = 1280;
pub const DEFAULT_CAPTURE_HEIGHT: u32 = 720;
pub const DEFAULT_NETWORK_TIMEOUT: Duration = Duration::from_secs(5);

// IP Webcam style stream on the local network.
const NETWORK_URL_PREFIX: &str = "http://192.168.";
const NETWORK_URL_SUFFIX: &str = ":8080/video";

pub const ABOUT_TEXT: &str = "Real-time BJJ vision demo\n\n\
    - Raise 2/3/4 fingers -> 2/3/4 points.\n\
    - Extend both arms sideways -> STOP FIGHT signal.";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CaptureConfig {
    /// Initial source; the session keeps its own copy that `set_source` replaces.
    pub source: CameraSource,
    pub width: u32,
    pub height: u32,
    /// Connect/read timeout for network streams. Bounds how long `stop()` can
    /// wait on a stalled IP camera.
    pub network_timeout: Duration,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            source: reset_to_device(),
            width: DEFAULT_CAPTURE_WIDTH,
            height: DEFAULT_CAPTURE_HEIGHT,
            network_timeout: DEFAULT_NETWORK_TIMEOUT,
        }
    }
}

/// Builds an IP camera source from the last two octets of a `192.168.x.y` address.
pub fn parse_network_source(last_two_octets: &str) -> Result<CameraSource, ValidationError> {
    let input = last_two_octets.trim();
    let invalid = || ValidationError::NetworkOctets {
        input: last_two_octets.to_string(),
    };

    let octets = input
        .split('.')
        .map(parse_octet)
        .collect::<Option<Vec<u8>>>()
        .ok_or_else(invalid)?;
    let &[third, fourth] = octets.as_slice() else {
        return Err(invalid());
    };

    Ok(CameraSource::Network(format!(
        "{NETWORK_URL_PREFIX}{third}.{fourth}{NETWORK_URL_SUFFIX}"
    )))
}

pub fn reset_to_device() -> CameraSource {
    CameraSource::Device(0)
}

fn parse_octet(raw: &str) -> Option<u8> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    raw.parse().ok()
}
