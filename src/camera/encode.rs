//! PNG encoding of captured photos.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bytes::Bytes;
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder, ImageFormat};

use super::types::{CameraError, Resolution};

/// MIME type of every captured photo.
pub const PNG_MIME: &str = "image/png";

/// Binary image data with its MIME type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    bytes: Bytes,
    mime_type: String,
}

impl Blob {
    pub fn new(bytes: Bytes, mime_type: impl Into<String>) -> Self {
        Self {
            bytes,
            mime_type: mime_type.into(),
        }
    }

    /// Size in bytes.
    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }
}

/// A still photo taken from the live preview.
///
/// Both representations come from the same encoded buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedPhoto {
    resolution: Resolution,
    data_url: String,
    blob: Blob,
}

impl CapturedPhoto {
    /// Wrap an encoded PNG, deriving the data URL from the same bytes.
    pub fn from_png(resolution: Resolution, png: Vec<u8>) -> Self {
        let bytes = Bytes::from(png);
        let data_url = to_data_url(PNG_MIME, &bytes);
        Self {
            resolution,
            data_url,
            blob: Blob::new(bytes, PNG_MIME),
        }
    }

    pub fn width(&self) -> u32 {
        self.resolution.width
    }

    pub fn height(&self) -> u32 {
        self.resolution.height
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    /// `data:image/png;base64,...`
    pub fn data_url(&self) -> &str {
        &self.data_url
    }

    pub fn blob(&self) -> &Blob {
        &self.blob
    }
}

/// Encode packed RGB8 pixels as PNG.
pub fn encode_png(resolution: Resolution, rgb: &[u8]) -> Result<Vec<u8>, CameraError> {
    let expected = resolution.width as usize * resolution.height as usize * 3;
    if rgb.len() != expected {
        return Err(CameraError::Encode(format!(
            "pixel buffer is {} bytes, expected {} for {}",
            rgb.len(),
            expected,
            resolution
        )));
    }

    let mut png = Vec::new();
    PngEncoder::new(&mut png)
        .write_image(
            rgb,
            resolution.width,
            resolution.height,
            ExtendedColorType::Rgb8,
        )
        .map_err(|e| CameraError::Encode(e.to_string()))?;
    Ok(png)
}

/// Decode a PNG back to packed RGB8 pixels.
pub fn decode_png(png: &[u8]) -> Result<(Resolution, Vec<u8>), CameraError> {
    let image = image::load_from_memory_with_format(png, ImageFormat::Png)
        .map_err(|e| CameraError::Encode(e.to_string()))?
        .to_rgb8();
    let resolution = Resolution {
        width: image.width(),
        height: image.height(),
    };
    Ok((resolution, image.into_raw()))
}

/// Build a base64 data URL.
pub fn to_data_url(mime_type: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", mime_type, STANDARD.encode(bytes))
}

/// Split a base64 data URL into MIME type and payload.
pub fn parse_data_url(url: &str) -> Option<(String, Vec<u8>)> {
    let rest = url.strip_prefix("data:")?;
    let (mime_type, payload) = rest.split_once(";base64,")?;
    let bytes = STANDARD.decode(payload).ok()?;
    Some((mime_type.to_string(), bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checker(resolution: Resolution) -> Vec<u8> {
        let mut data = Vec::new();
        for y in 0..resolution.height {
            for x in 0..resolution.width {
                let v = if (x + y) % 2 == 0 { 255 } else { 0 };
                data.extend_from_slice(&[v, 128, 255 - v]);
            }
        }
        data
    }

    #[test]
    fn test_encode_png_rejects_wrong_buffer_size() {
        let res = Resolution { width: 4, height: 4 };
        let err = encode_png(res, &[0; 10]).unwrap_err();
        assert!(matches!(err, CameraError::Encode(_)));
    }

    #[test]
    fn test_encoded_png_decodes_to_same_pixels() {
        let res = Resolution { width: 5, height: 3 };
        let pixels = checker(res);
        let png = encode_png(res, &pixels).unwrap();
        assert!(png.starts_with(&[0x89, b'P', b'N', b'G']));

        let (decoded_res, decoded) = decode_png(&png).unwrap();
        assert_eq!(decoded_res, res);
        assert_eq!(decoded, pixels);
    }

    #[test]
    fn test_photo_data_url_and_blob_share_bytes() {
        let res = Resolution { width: 2, height: 2 };
        let png = encode_png(res, &checker(res)).unwrap();
        let photo = CapturedPhoto::from_png(res, png.clone());

        assert!(photo.data_url().starts_with("data:image/png;base64,"));
        assert_eq!(photo.blob().mime_type(), PNG_MIME);
        assert_eq!(photo.blob().size(), png.len());

        let (mime, payload) = parse_data_url(photo.data_url()).unwrap();
        assert_eq!(mime, "image/png");
        assert_eq!(payload, png);
        assert_eq!(photo.width(), 2);
        assert_eq!(photo.height(), 2);
    }

    #[test]
    fn test_parse_data_url_rejects_garbage() {
        assert!(parse_data_url("not a url").is_none());
        assert!(parse_data_url("data:image/png,raw").is_none());
    }
}
