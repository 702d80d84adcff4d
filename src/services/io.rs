//! Image decoding and encoding for uploads and responses
//!
//! Everything here works on in-memory buffers; the service never touches the
//! file system for request data.

use crate::error::{BgRemovalError, Result};
use base64::{engine::general_purpose, Engine as _};
use image::{DynamicImage, ImageFormat, ImageReader};
use std::io::Cursor;

/// A decoded upload together with the format it was detected as
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub image: DynamicImage,
    /// Detected container format, `None` when it could not be guessed
    pub format: Option<ImageFormat>,
}

/// Service for image decoding and encoding
pub struct ImageIOService;

impl ImageIOService {
    /// Decode and fully materialize an image from raw bytes
    ///
    /// The format is guessed from the content, never from the declared
    /// content type.
    ///
    /// # Errors
    /// - `CorruptImage` for unrecognised, truncated or otherwise undecodable data
    pub fn decode(bytes: &[u8]) -> Result<DecodedImage> {
        let reader = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| BgRemovalError::corrupt_image(e.to_string()))?;
        let format = reader.format();

        let image = reader
            .decode()
            .map_err(|e| BgRemovalError::corrupt_image(e.to_string()))?;

        log::debug!(
            "Decoded {}x{} image ({:?}, {:?})",
            image.width(),
            image.height(),
            format,
            image.color()
        );

        Ok(DecodedImage { image, format })
    }

    /// Encode an image as PNG
    ///
    /// # Errors
    /// - Encoder failures
    pub fn encode_png(image: &DynamicImage) -> Result<Vec<u8>> {
        Self::encode(image, ImageFormat::Png)
    }

    /// Re-encode an upload in its detected format
    ///
    /// Unknown formats, and formats this build cannot write, are encoded as
    /// PNG. JPEG output drops the alpha channel.
    ///
    /// # Errors
    /// - PNG encoder failures
    pub fn encode_original(decoded: &DecodedImage) -> Result<(Vec<u8>, ImageFormat)> {
        let format = match decoded.format {
            Some(format @ (ImageFormat::Png | ImageFormat::Jpeg | ImageFormat::WebP)) => format,
            _ => ImageFormat::Png,
        };

        if format != ImageFormat::Png {
            match Self::encode(&decoded.image, format) {
                Ok(bytes) => return Ok((bytes, format)),
                Err(e) => log::debug!("Re-encoding as {format:?} failed, using PNG: {e}"),
            }
        }

        Ok((Self::encode_png(&decoded.image)?, ImageFormat::Png))
    }

    /// Encode an image in `format`, converting the pixel layout where the
    /// encoder requires it
    ///
    /// # Errors
    /// - The format has no encoder in this build
    /// - Encoder failures
    pub fn encode(image: &DynamicImage, format: ImageFormat) -> Result<Vec<u8>> {
        let converted;
        let image = match format {
            ImageFormat::Jpeg => {
                converted = DynamicImage::ImageRgb8(image.to_rgb8());
                &converted
            },
            ImageFormat::WebP if !matches!(image, DynamicImage::ImageRgb8(_) | DynamicImage::ImageRgba8(_)) => {
                converted = DynamicImage::ImageRgba8(image.to_rgba8());
                &converted
            },
            _ => image,
        };

        let mut buffer = Cursor::new(Vec::new());
        image.write_to(&mut buffer, format)?;
        Ok(buffer.into_inner())
    }

    /// Name reported for a format in response envelopes
    #[must_use]
    pub fn format_name(format: ImageFormat) -> &'static str {
        match format {
            ImageFormat::Jpeg => "JPEG",
            ImageFormat::WebP => "WEBP",
            _ => "PNG",
        }
    }

    /// Standard base64 of `bytes`
    #[must_use]
    pub fn to_base64(bytes: &[u8]) -> String {
        general_purpose::STANDARD.encode(bytes)
    }
}
