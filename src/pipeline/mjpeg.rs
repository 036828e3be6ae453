use std::{io::Read, time::Instant};

use anyhow::{Context, Result, anyhow, bail};
use zune_jpeg::{
    JpegDecoder,
    zune_core::{bytestream::ZCursor, colorspace::ColorSpace, options::DecoderOptions},
};

use crate::types::Frame;

const SOI: [u8; 2] = [0xFF, 0xD8];
const EOI: [u8; 2] = [0xFF, 0xD9];
const READ_CHUNK: usize = 16 * 1024;
const MAX_FRAME_BYTES: usize = 8 * 1024 * 1024;

/// Splits a `multipart/x-mixed-replace` MJPEG body into individual JPEG images.
///
/// Part headers and boundaries are skipped by scanning for the JPEG start/end
/// markers, which is enough for the IP-camera apps this is used with. Entropy
/// coded data never contains a bare marker, so only embedded images nest.
pub struct MjpegStream<R> {
    reader: R,
    buffer: Vec<u8>,
}

impl<R: Read> MjpegStream<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buffer: Vec::with_capacity(READ_CHUNK * 4),
        }
    }

    /// Next complete JPEG, or `None` once the stream ends.
    pub fn next_jpeg(&mut self) -> Result<Option<Vec<u8>>> {
        let mut chunk = vec![0u8; READ_CHUNK];
        loop {
            match find_marker(&self.buffer, SOI, 0) {
                Some(start) => {
                    if let Some(stop) = find_image_end(&self.buffer, start) {
                        let jpeg = self.buffer[start..stop].to_vec();
                        self.buffer.drain(..stop);
                        return Ok(Some(jpeg));
                    }
                    self.buffer.drain(..start);
                }
                None => {
                    // A marker may straddle two reads; keep the last byte.
                    let keep_from = self.buffer.len().saturating_sub(1);
                    self.buffer.drain(..keep_from);
                }
            }

            if self.buffer.len() > MAX_FRAME_BYTES {
                bail!("MJPEG frame exceeds {MAX_FRAME_BYTES} bytes without an end marker");
            }

            let read = self
                .reader
                .read(&mut chunk)
                .context("failed while reading MJPEG stream")?;
            if read == 0 {
                return Ok(None);
            }
            self.buffer.extend_from_slice(&chunk[..read]);
        }
    }
}

/// End (exclusive) of the image starting at `start`. SOI/EOI pairs nested in
/// it, such as an EXIF thumbnail, are balanced rather than ending the image.
fn find_image_end(buffer: &[u8], start: usize) -> Option<usize> {
    let mut depth = 1usize;
    let mut pos = start + SOI.len();
    while let Some(pair) = buffer.get(pos..pos + 2) {
        if pair == SOI {
            depth += 1;
            pos += 2;
        } else if pair == EOI {
            depth -= 1;
            pos += 2;
            if depth == 0 {
                return Some(pos);
            }
        } else {
            pos += 1;
        }
    }
    None
}

fn find_marker(haystack: &[u8], marker: [u8; 2], from: usize) -> Option<usize> {
    haystack
        .get(from..)?
        .windows(2)
        .position(|pair| pair == marker)
        .map(|pos| pos + from)
}

pub fn decode_jpeg(data: &[u8]) -> Result<Frame> {
    let options = DecoderOptions::default().jpeg_set_out_colorspace(ColorSpace::RGBA);
    let mut decoder = JpegDecoder::new_with_options(ZCursor::new(data), options);
    let rgba = decoder
        .decode()
        .map_err(|err| anyhow!("MJPEG decode failed: {err:?}"))?;

    let info = decoder
        .info()
        .ok_or_else(|| anyhow!("MJPEG decoder returned no image info"))?;
    let width =
        u32::try_from(info.width).map_err(|_| anyhow!("MJPEG width does not fit u32"))?;
    let height =
        u32::try_from(info.height).map_err(|_| anyhow!("MJPEG height does not fit u32"))?;
    let expected_len = (width as usize) * (height as usize) * 4;
    if rgba.len() < expected_len {
        return Err(anyhow!(
            "MJPEG decode produced too few bytes: got {}, expected {}",
            rgba.len(),
            expected_len
        ));
    }

    Ok(Frame {
        rgba,
        width,
        height,
        timestamp: Instant::now(),
    })
}

#[cfg(test)]
mod tests {
    use std::io::{self, Cursor};

    use super::*;

    fn fake_jpeg(payload: &[u8]) -> Vec<u8> {
        let mut bytes = SOI.to_vec();
        bytes.extend_from_slice(payload);
        bytes.extend_from_slice(&EOI);
        bytes
    }

    fn multipart(parts: &[Vec<u8>]) -> Vec<u8> {
        let mut body = Vec::new();
        for part in parts {
            body.extend_from_slice(b"--frame\r\nContent-Type: image/jpeg\r\n");
            body.extend_from_slice(format!("Content-Length: {}\r\n\r\n", part.len()).as_bytes());
            body.extend_from_slice(part);
            body.extend_from_slice(b"\r\n");
        }
        body
    }

    struct OneByteReader(Cursor<Vec<u8>>);

    impl Read for OneByteReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let len = buf.len().min(1);
            self.0.read(&mut buf[..len])
        }
    }

    #[test]
    fn splits_parts_and_skips_headers() {
        let first = fake_jpeg(&[1, 2, 3]);
        let second = fake_jpeg(&[4, 5]);
        let body = multipart(&[first.clone(), second.clone()]);

        let mut stream = MjpegStream::new(Cursor::new(body));
        assert_eq!(stream.next_jpeg().unwrap(), Some(first));
        assert_eq!(stream.next_jpeg().unwrap(), Some(second));
        assert_eq!(stream.next_jpeg().unwrap(), None);
    }

    #[test]
    fn markers_split_across_reads_are_found() {
        let jpeg = fake_jpeg(&[0x10, 0xFF, 0x00, 0x20]);
        let body = multipart(&[jpeg.clone()]);

        let mut stream = MjpegStream::new(OneByteReader(Cursor::new(body)));
        assert_eq!(stream.next_jpeg().unwrap(), Some(jpeg));
        assert_eq!(stream.next_jpeg().unwrap(), None);
    }

    #[test]
    fn embedded_thumbnail_stays_inside_its_frame() {
        let thumbnail = fake_jpeg(&[7, 7]);
        let mut payload = vec![0xFF, 0xE1, 0x00, 0x10];
        payload.extend_from_slice(&thumbnail);
        payload.extend_from_slice(&[0x42, 0x43]);
        let full = fake_jpeg(&payload);
        let next = fake_jpeg(&[5]);
        let body = multipart(&[full.clone(), next.clone()]);

        let mut stream = MjpegStream::new(Cursor::new(body.clone()));
        assert_eq!(stream.next_jpeg().unwrap(), Some(full.clone()));
        assert_eq!(stream.next_jpeg().unwrap(), Some(next.clone()));
        assert_eq!(stream.next_jpeg().unwrap(), None);

        let mut stream = MjpegStream::new(OneByteReader(Cursor::new(body)));
        assert_eq!(stream.next_jpeg().unwrap(), Some(full));
        assert_eq!(stream.next_jpeg().unwrap(), Some(next));
    }

    #[test]
    fn truncated_part_ends_the_stream() {
        let mut body = multipart(&[fake_jpeg(&[9])]);
        body.extend_from_slice(b"--frame\r\n\r\n");
        body.extend_from_slice(&SOI);
        body.extend_from_slice(&[1, 2, 3]);

        let mut stream = MjpegStream::new(Cursor::new(body));
        assert!(stream.next_jpeg().unwrap().is_some());
        assert_eq!(stream.next_jpeg().unwrap(), None);
    }

    #[test]
    fn garbage_is_not_a_jpeg() {
        assert!(decode_jpeg(&fake_jpeg(&[0, 1, 2, 3])).is_err());
    }
}
