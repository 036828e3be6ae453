use anyhow::{Context, Result};
use rayon::prelude::*;
use reqwest::blocking::{Client, Response};

use super::mjpeg::{self, MjpegStream};
use crate::{
    config::CaptureConfig,
    types::{CameraSource, Frame},
};

/// Pulls raw images from a camera. An error means the camera is gone; callers
/// treat it as the end of the stream.
pub trait FrameGrabber {
    fn grab(&mut self) -> Result<Frame>;
}

pub fn open_frame_grabber(
    source: &CameraSource,
    config: &CaptureConfig,
) -> Result<Box<dyn FrameGrabber>> {
    match source {
        CameraSource::Device(index) => open_device(*index, config),
        CameraSource::Network(url) => {
            let grabber = NetworkGrabber::connect(url, config)?;
            Ok(Box::new(grabber))
        }
    }
}

#[cfg(feature = "camera-nokhwa")]
fn open_device(index: u32, config: &CaptureConfig) -> Result<Box<dyn FrameGrabber>> {
    Ok(Box::new(device::DeviceGrabber::open(index, config)?))
}

#[cfg(not(feature = "camera-nokhwa"))]
fn open_device(index: u32, _config: &CaptureConfig) -> Result<Box<dyn FrameGrabber>> {
    anyhow::bail!("cannot open device camera #{index}: built without the camera-nokhwa feature")
}

#[cfg(feature = "camera-nokhwa")]
mod device {
    use anyhow::{Result, anyhow};
    use nokhwa::{
        Camera,
        pixel_format::RgbFormat,
        utils::{
            CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType,
            Resolution,
        },
    };

    use super::{FrameGrabber, rgb_to_rgba};
    use crate::{config::CaptureConfig, types::Frame};

    fn requested_formats(width: u32, height: u32) -> [RequestedFormat<'static>; 3] {
        [
            RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(CameraFormat::new(
                Resolution::new(width, height),
                FrameFormat::MJPEG,
                30,
            ))),
            // Some drivers reject low default rates; prefer the fastest mode next.
            RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate),
            RequestedFormat::new::<RgbFormat>(RequestedFormatType::None),
        ]
    }

    pub(super) struct DeviceGrabber {
        camera: Camera,
    }

    impl DeviceGrabber {
        pub(super) fn open(index: u32, config: &CaptureConfig) -> Result<Self> {
            let mut last_err = None;

            for requested in requested_formats(config.width, config.height) {
                match Camera::new(CameraIndex::Index(index), requested) {
                    Ok(mut camera) => match camera.open_stream() {
                        Ok(()) => {
                            log::info!(
                                "device camera #{index} streaming at {:?}",
                                camera.camera_format()
                            );
                            return Ok(Self { camera });
                        }
                        Err(err) => last_err = Some(err.into()),
                    },
                    Err(err) => last_err = Some(err.into()),
                }
            }

            Err(last_err.unwrap_or_else(|| {
                anyhow!("failed to open device camera #{index} with any supported format")
            }))
        }
    }

    impl FrameGrabber for DeviceGrabber {
        fn grab(&mut self) -> Result<Frame> {
            let buffer = self.camera.frame()?;
            let decoded = buffer.decode_image::<RgbFormat>()?;
            let (width, height) = decoded.dimensions();
            rgb_to_rgba(&decoded.into_raw(), width, height)
        }
    }

    impl Drop for DeviceGrabber {
        fn drop(&mut self) {
            if let Err(err) = self.camera.stop_stream() {
                log::warn!("failed to stop device camera stream: {err:?}");
            }
        }
    }
}

pub struct NetworkGrabber {
    url: String,
    stream: MjpegStream<Response>,
}

impl NetworkGrabber {
    pub fn connect(url: &str, config: &CaptureConfig) -> Result<Self> {
        // The blocking client applies this timeout to every body read as well,
        // so a stalled camera cannot hang the capture loop forever.
        let client = Client::builder()
            .timeout(config.network_timeout)
            .build()
            .context("failed to build HTTP client")?;
        let response = client
            .get(url)
            .send()
            .with_context(|| format!("failed to connect to IP camera at {url}"))?
            .error_for_status()
            .with_context(|| format!("IP camera at {url} returned error status"))?;

        log::info!("connected to IP camera stream {url}");
        Ok(Self {
            url: url.to_string(),
            stream: MjpegStream::new(response),
        })
    }
}

impl FrameGrabber for NetworkGrabber {
    fn grab(&mut self) -> Result<Frame> {
        let jpeg = self
            .stream
            .next_jpeg()?
            .with_context(|| format!("IP camera stream {} ended", self.url))?;
        mjpeg::decode_jpeg(&jpeg)
    }
}

#[cfg_attr(not(feature = "camera-nokhwa"), allow(dead_code))]
pub(crate) fn rgb_to_rgba(rgb: &[u8], width: u32, height: u32) -> Result<Frame> {
    let pixels = (width as usize) * (height as usize);
    if pixels == 0 || rgb.len() < pixels * 3 {
        anyhow::bail!(
            "RGB buffer too small: got {}, expected {}",
            rgb.len(),
            pixels * 3
        );
    }

    let mut rgba = vec![0u8; pixels * 4];
    rgba.par_chunks_mut(4)
        .zip(rgb.par_chunks_exact(3))
        .for_each(|(dst, src)| {
            dst[..3].copy_from_slice(src);
            dst[3] = 255;
        });

    Ok(Frame {
        rgba,
        width,
        height,
        timestamp: std::time::Instant::now(),
    })
}
