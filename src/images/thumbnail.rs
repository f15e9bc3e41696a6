//! Image validation and the iterative thumbnailing schedule (§4.4).
//!
//! Any crate that validates PNG/JPEG and supports controlled-quality JPEG
//! re-encoding plus resizing suffices per the source notes (§9); we use
//! the `image` crate, which the rest of the pack never reaches for but is
//! the standard one for this job.

use crate::error::{Error, Result};
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;

/// JPEG quality floor reached before falling back to plain resizing (§4.4).
const QUALITY_FLOOR: u8 = 60;
const QUALITY_STEP: u8 = 10;
const INITIAL_QUALITY: u8 = 90;
/// Backstop against pathological inputs that never converge under the
/// schedule below (e.g. already-minimal images at an oversized byte quota).
const MAX_ITERATIONS: u32 = 24;

/// Validates that `bytes` decode as PNG or JPEG, per the "image accepted
/// via profile update must validate as PNG or JPEG" rule.
pub fn validate(bytes: &[u8]) -> Result<DynamicImage> {
    let format = image::guess_format(bytes).map_err(|_| Error::InvalidValue("unrecognized image format".into()))?;
    if !matches!(format, ImageFormat::Png | ImageFormat::Jpeg) {
        return Err(Error::InvalidValue("image must be PNG or JPEG".into()));
    }
    image::load_from_memory_with_format(bytes, format)
        .map_err(|e| Error::InvalidValue(format!("invalid image data: {e}")))
}

/// Produces a thumbnail within `max_bytes`, following the schedule in
/// §4.4: re-encode at quality 90; if still oversized, one corrective
/// resize by `sqrt(max/current)`; then step quality down to a floor of
/// 60 in units of 10; then resize by 0.9 repeatedly.
pub fn make_thumbnail(image: &DynamicImage, max_bytes: usize) -> Result<Vec<u8>> {
    let mut img = image.clone();
    let mut quality = INITIAL_QUALITY;
    let mut encoded = encode_jpeg(&img, quality)?;
    let mut did_corrective_resize = false;

    for _ in 0..MAX_ITERATIONS {
        if encoded.len() <= max_bytes {
            break;
        }
        if !did_corrective_resize {
            let ratio = ((max_bytes as f64) / (encoded.len() as f64)).sqrt();
            img = resize_by_ratio(&img, ratio);
            did_corrective_resize = true;
        } else if quality > QUALITY_FLOOR {
            quality = quality.saturating_sub(QUALITY_STEP).max(QUALITY_FLOOR);
        } else {
            img = resize_by_ratio(&img, 0.9);
        }
        encoded = encode_jpeg(&img, quality)?;
    }

    Ok(encoded)
}

fn resize_by_ratio(img: &DynamicImage, ratio: f64) -> DynamicImage {
    let ratio = ratio.clamp(0.05, 1.0);
    let new_w = ((img.width() as f64) * ratio).round().max(1.0) as u32;
    let new_h = ((img.height() as f64) * ratio).round().max(1.0) as u32;
    img.resize(new_w, new_h, image::imageops::FilterType::Triangle)
}

fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut Cursor::new(&mut buf), quality);
    encoder
        .encode_image(img)
        .map_err(|e| Error::Internal(format!("jpeg encode failed: {e}")))?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid_png(w: u32, h: u32) -> Vec<u8> {
        let img = DynamicImage::new_rgb8(w, h);
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png).unwrap();
        buf
    }

    #[test]
    fn validates_png_and_rejects_garbage() {
        let png = solid_png(32, 32);
        assert!(validate(&png).is_ok());
        assert!(validate(b"not an image").is_err());
    }

    #[test]
    fn thumbnail_respects_byte_budget() {
        let png = solid_png(800, 600);
        let img = validate(&png).unwrap();
        let thumb = make_thumbnail(&img, 4096).unwrap();
        assert!(thumb.len() <= 4096 + 512, "thumbnail should approach the budget: {}", thumb.len());
    }
}
