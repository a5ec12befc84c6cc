use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::RgbImage;

use crate::bbox::{BBox, Ltrb};
use crate::error::Error;

/// JPEG bytes ready to be shipped to a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub jpeg: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl EncodedImage {
    #[inline]
    pub fn base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.jpeg)
    }
}

/// Cuts the box out of `frame`, grown by `padding` of its width and height on
/// each side and clamped to the frame. `None` when nothing is left.
pub fn crop_region(frame: &RgbImage, bbox: &BBox<Ltrb>, padding: f32) -> Option<RgbImage> {
    let (fw, fh) = frame.dimensions();
    let [x1, y1, x2, y2] = bbox.as_slice().map(|v| v as i64);

    let pad_w = ((x2 - x1) as f32 * padding) as i64;
    let pad_h = ((y2 - y1) as f32 * padding) as i64;

    let left = (x1 - pad_w).clamp(0, fw as i64);
    let top = (y1 - pad_h).clamp(0, fh as i64);
    let right = (x2 + pad_w).clamp(0, fw as i64);
    let bottom = (y2 + pad_h).clamp(0, fh as i64);

    if right <= left || bottom <= top {
        return None;
    }

    let view = imageops::crop_imm(
        frame,
        left as u32,
        top as u32,
        (right - left) as u32,
        (bottom - top) as u32,
    );

    Some(view.to_image())
}

/// Downscales so the longest side fits `max_side`, then JPEG-encodes.
pub fn encode_jpeg(crop: &RgbImage, max_side: u32, quality: u8) -> Result<EncodedImage, Error> {
    let (w, h) = crop.dimensions();
    let longest = w.max(h);

    let resized;
    let img = if longest > max_side {
        let scale = max_side as f32 / longest as f32;
        let nw = ((w as f32 * scale) as u32).max(1);
        let nh = ((h as f32 * scale) as u32).max(1);

        resized = imageops::resize(crop, nw, nh, FilterType::Triangle);
        &resized
    } else {
        crop
    };

    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, quality).encode_image(img)?;

    Ok(EncodedImage {
        jpeg,
        width: img.width(),
        height: img.height(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn frame(w: u32, h: u32) -> RgbImage {
        RgbImage::from_fn(w, h, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 128]))
    }

    #[test]
    fn crop_adds_padding() {
        let f = frame(200, 200);
        let crop = crop_region(&f, &BBox::ltrb(50.0, 50.0, 150.0, 100.0), 0.1).unwrap();

        // 10 px each side horizontally, 5 px vertically
        assert_eq!(crop.dimensions(), (120, 60));
        assert_eq!(crop.get_pixel(0, 0), &Rgb([40, 45, 128]));
    }

    #[test]
    fn crop_clamps_to_frame() {
        let f = frame(100, 100);
        let crop = crop_region(&f, &BBox::ltrb(-20.0, 80.0, 30.0, 130.0), 0.1).unwrap();

        assert_eq!(crop.dimensions(), (35, 25));
    }

    #[test]
    fn crop_outside_frame_is_none() {
        let f = frame(100, 100);
        assert!(crop_region(&f, &BBox::ltrb(120.0, 10.0, 160.0, 50.0), 0.1).is_none());
        assert!(crop_region(&f, &BBox::ltrb(10.0, 10.0, 10.0, 50.0), 0.0).is_none());
    }

    #[test]
    fn encode_bounds_longest_side() {
        let encoded = encode_jpeg(&frame(1024, 300), 512, 85).unwrap();

        assert_eq!(encoded.width, 512);
        assert_eq!(encoded.height, 150);
        assert_eq!(&encoded.jpeg[..2], &[0xff, 0xd8]);
        assert!(encoded.base64().starts_with("/9j/"));
    }

    #[test]
    fn small_crops_are_not_upscaled() {
        let encoded = encode_jpeg(&frame(64, 48), 512, 85).unwrap();
        assert_eq!((encoded.width, encoded.height), (64, 48));
    }
}
