//! JPEG encoding of captured grayscale frames for the analysis request.

use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageError};

const JPEG_QUALITY: u8 = 85;

/// Encode a grayscale frame as JPEG, size-bounded by capture resolution.
pub fn encode_jpeg(gray: &[u8], width: u32, height: u32) -> Result<Vec<u8>, ImageError> {
    let mut out = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY);
    encoder.encode(gray, width, height, ExtendedColorType::L8)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_produces_jpeg_magic() {
        let gray = vec![128u8; 32 * 32];
        let jpeg = encode_jpeg(&gray, 32, 32).unwrap();
        assert!(jpeg.len() > 2);
        assert_eq!(&jpeg[..2], &[0xff, 0xd8]);
    }

    #[test]
    fn test_encode_wrong_buffer_size_errors() {
        let gray = vec![128u8; 10];
        assert!(encode_jpeg(&gray, 32, 32).is_err());
    }
}
