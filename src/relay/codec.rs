use image::{codecs::jpeg::JpegEncoder, RgbImage};

use crate::posture::FrameError;

pub fn decode(data: &[u8]) -> Result<RgbImage, FrameError> {
    image::load_from_memory(data)
        .map(|image| image.to_rgb8())
        .map_err(FrameError::Decode)
}

pub fn encode_jpeg(frame: &RgbImage, quality: u8) -> Result<Vec<u8>, FrameError> {
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100))
        .encode_image(frame)
        .map_err(FrameError::Encode)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use image::Rgb;

    use super::*;

    #[test]
    fn jpeg_keeps_dimensions() {
        let frame = RgbImage::from_pixel(64, 48, Rgb([200, 30, 30]));
        let jpeg = encode_jpeg(&frame, 50).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);

        let decoded = decode(&jpeg).unwrap();
        assert_eq!(decoded.dimensions(), (64, 48));
    }

    #[test]
    fn garbage_is_a_decode_error() {
        let err = decode(b"not a frame").unwrap_err();
        assert!(matches!(err, FrameError::Decode(_)));
    }
}
