//! Frame type and pixel conversion: YUYV to RGB, MJPG decode.

use image::{ImageFormat, RgbImage};

/// A captured colour camera frame.
#[derive(Clone)]
pub struct Frame {
    pub image: RgbImage,
    pub timestamp: std::time::Instant,
    pub sequence: u32,
}

impl Frame {
    pub fn new(image: RgbImage, sequence: u32) -> Self {
        Self {
            image,
            timestamp: std::time::Instant::now(),
            sequence,
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Average luma (0.0–255.0), BT.601 weights.
    pub fn avg_brightness(&self) -> f32 {
        let pixels = self.image.pixels().len();
        if pixels == 0 {
            return 0.0;
        }
        let sum: f32 = self
            .image
            .pixels()
            .map(|p| 0.299 * p[0] as f32 + 0.587 * p[1] as f32 + 0.114 * p[2] as f32)
            .sum();
        sum / pixels as f32
    }
}

/// Convert packed YUYV (4:2:2) to RGB.
///
/// YUYV packs two pixels per 4 bytes: [Y0, U, Y1, V]; both pixels share the
/// chroma pair. Uses BT.601 full-range coefficients.
pub fn yuyv_to_rgb(yuyv: &[u8], width: u32, height: u32) -> Result<RgbImage, FrameError> {
    let expected = (width as usize) * (height as usize) * 2;
    if yuyv.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: yuyv.len(),
        });
    }

    let mut out = RgbImage::new(width, height);
    for (pair, px) in yuyv[..expected]
        .chunks_exact(4)
        .zip(out.chunks_exact_mut(6))
    {
        let u = pair[1] as f32 - 128.0;
        let v = pair[3] as f32 - 128.0;
        let [r0, g0, b0] = ycbcr_to_rgb(pair[0] as f32, u, v);
        let [r1, g1, b1] = ycbcr_to_rgb(pair[2] as f32, u, v);
        px.copy_from_slice(&[r0, g0, b0, r1, g1, b1]);
    }
    Ok(out)
}

fn ycbcr_to_rgb(y: f32, u: f32, v: f32) -> [u8; 3] {
    [
        (y + 1.402 * v).round().clamp(0.0, 255.0) as u8,
        (y - 0.344_136 * u - 0.714_136 * v).round().clamp(0.0, 255.0) as u8,
        (y + 1.772 * u).round().clamp(0.0, 255.0) as u8,
    ]
}

/// Decode one MJPG buffer into RGB.
pub fn decode_mjpg(data: &[u8]) -> Result<RgbImage, FrameError> {
    if data.len() < 4 || data[0] != 0xFF || data[1] != 0xD8 {
        return Err(FrameError::NotJpeg);
    }
    let img = image::load_from_memory_with_format(data, ImageFormat::Jpeg)
        .map_err(|e| FrameError::Decode(e.to_string()))?;
    Ok(img.to_rgb8())
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid YUYV length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("buffer is not a JPEG image")]
    NotJpeg,
    #[error("MJPG decode failed: {0}")]
    Decode(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_yuyv_neutral_chroma_is_gray() {
        // 2x1 image: [Y0=100, U=128, Y1=200, V=128]
        let yuyv = vec![100, 128, 200, 128];
        let rgb = yuyv_to_rgb(&yuyv, 2, 1).unwrap();
        assert_eq!(rgb.get_pixel(0, 0), &Rgb([100, 100, 100]));
        assert_eq!(rgb.get_pixel(1, 0), &Rgb([200, 200, 200]));
    }

    #[test]
    fn test_yuyv_red_chroma() {
        // High V pushes red up and green down
        let yuyv = vec![128, 128, 128, 255];
        let rgb = yuyv_to_rgb(&yuyv, 2, 1).unwrap();
        let p = rgb.get_pixel(0, 0);
        assert_eq!(p[0], 255);
        assert!(p[1] < 128);
        assert_eq!(p[2], 128);
    }

    #[test]
    fn test_yuyv_4x2_layout() {
        let mut yuyv = Vec::new();
        for y in [10u8, 20, 30, 40, 50, 60, 70, 80].chunks(2) {
            yuyv.extend_from_slice(&[y[0], 128, y[1], 128]);
        }
        let rgb = yuyv_to_rgb(&yuyv, 4, 2).unwrap();
        assert_eq!(rgb.get_pixel(3, 0)[0], 40);
        assert_eq!(rgb.get_pixel(0, 1)[0], 50);
        assert_eq!(rgb.get_pixel(3, 1)[0], 80);
    }

    #[test]
    fn test_yuyv_invalid_length() {
        let yuyv = vec![100, 128]; // too short for 2x1
        assert!(matches!(
            yuyv_to_rgb(&yuyv, 2, 1),
            Err(FrameError::InvalidLength { expected: 4, actual: 2 })
        ));
    }

    #[test]
    fn test_decode_mjpg_roundtrip_dimensions() {
        let src = RgbImage::from_pixel(16, 8, Rgb([200, 30, 30]));
        let mut jpeg = Vec::new();
        image::codecs::jpeg::JpegEncoder::new_with_quality(&mut jpeg, 90)
            .encode(src.as_raw(), 16, 8, image::ExtendedColorType::Rgb8)
            .unwrap();

        let decoded = decode_mjpg(&jpeg).unwrap();
        assert_eq!(decoded.dimensions(), (16, 8));
    }

    #[test]
    fn test_decode_mjpg_rejects_garbage() {
        assert!(matches!(decode_mjpg(&[1, 2, 3, 4, 5]), Err(FrameError::NotJpeg)));
        assert!(matches!(decode_mjpg(&[0xFF, 0xD8, 0, 0, 0]), Err(FrameError::Decode(_))));
    }

    #[test]
    fn test_avg_brightness() {
        let frame = Frame::new(RgbImage::from_pixel(4, 4, Rgb([100, 100, 100])), 0);
        assert!((frame.avg_brightness() - 100.0).abs() < 0.01);
        assert_eq!(Frame::new(RgbImage::new(0, 0), 0).avg_brightness(), 0.0);
    }
}
