use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;

use crate::error::PipelineError;

pub const DEFAULT_JPEG_QUALITY: u8 = 85;

/// Compress an RGB image to JPEG bytes.
pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>, PipelineError> {
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality)
        .encode_image(image)
        .map_err(|e| PipelineError::Encoding(e.to_string()))?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn produces_a_decodable_jpeg() {
        let image = RgbImage::from_pixel(16, 8, image::Rgb([200, 100, 50]));
        let bytes = encode_jpeg(&image, DEFAULT_JPEG_QUALITY).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);

        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (16, 8));
    }
}
