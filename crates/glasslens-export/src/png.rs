//! PNG encoding of raster buffers.

use base64::{Engine as _, engine::general_purpose};
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder};

use glasslens_pipeline::RgbaImage;

use crate::ExportError;

/// Encode an RGBA buffer as PNG bytes.
///
/// Straight alpha is preserved, so the specular layer keeps its
/// translucency and displacement pixels outside the capsule keep alpha 0.
///
/// # Errors
///
/// Returns [`ExportError::PngEncode`] if encoding fails.
pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, ExportError> {
    let mut png_bytes = Vec::new();
    PngEncoder::new(&mut png_bytes).write_image(
        image.as_raw(),
        image.width(),
        image.height(),
        ExtendedColorType::Rgba8,
    )?;
    Ok(png_bytes)
}

/// Encode an RGBA buffer as a `data:image/png;base64,...` URL.
///
/// # Errors
///
/// Returns [`ExportError::PngEncode`] if encoding fails.
pub fn to_data_url(image: &RgbaImage) -> Result<String, ExportError> {
    let b64 = general_purpose::STANDARD.encode(encode_png(image)?);
    Ok(format!("data:image/png;base64,{b64}"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn png_signature_and_round_trip() {
        let mut src = RgbaImage::from_pixel(3, 2, Rgba([128, 128, 128, 0]));
        src.put_pixel(1, 1, Rgba([48, 128, 128, 255]));
        let bytes = encode_png(&src).unwrap();
        assert_eq!(&bytes[..8], b"\x89PNG\r\n\x1a\n");

        let decoded = image::load_from_memory(&bytes).unwrap().to_rgba8();
        assert_eq!(decoded.as_raw(), src.as_raw());
    }

    #[test]
    fn data_url_has_png_prefix_and_decodes() {
        let src = RgbaImage::from_pixel(1, 1, Rgba([255, 255, 255, 51]));
        let url = to_data_url(&src).unwrap();
        let payload = url.strip_prefix("data:image/png;base64,").unwrap();
        let bytes = general_purpose::STANDARD.decode(payload).unwrap();
        assert_eq!(bytes, encode_png(&src).unwrap());
    }

    #[test]
    fn export_error_display() {
        let err = ExportError::MissingSource("displacement_map".to_owned());
        assert_eq!(
            err.to_string(),
            "graph references unknown source `displacement_map`"
        );
    }
}
