use bytes::Bytes;
use image::{codecs::jpeg::JpegEncoder, DynamicImage, RgbaImage};
use time::OffsetDateTime;
use tracing::warn;

use super::upload::UploadFile;

pub const CAPTURE_JPEG_QUALITY: u8 = 90;

/// One RGBA frame grabbed from the active camera stream.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

/// Snapshots a frame into a JPEG file. `None` when the frame has no usable surface
/// (zero-sized, or a pixel buffer that does not match its dimensions).
pub fn capture(frame: &VideoFrame) -> Option<UploadFile> {
    if frame.width == 0 || frame.height == 0 {
        return None;
    }
    let rgba = RgbaImage::from_raw(frame.width, frame.height, frame.rgba.clone())?;
    let rgb = DynamicImage::ImageRgba8(rgba).to_rgb8();

    let mut buf = Vec::new();
    {
        let mut encoder = JpegEncoder::new_with_quality(&mut buf, CAPTURE_JPEG_QUALITY);
        if let Err(e) = encoder.encode_image(&rgb) {
            warn!(error = %e, "camera frame encoding failed");
            return None;
        }
    }

    let millis = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
    Some(UploadFile {
        file_name: format!("camera-{}.jpg", millis),
        content_type: "image/jpeg".into(),
        bytes: Bytes::from(buf),
    })
}
