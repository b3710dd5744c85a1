//! Bitmap decoding for fetched regions.
//!
//! Sources return encoded bitmaps. Everything downstream works on 8-bit RGB,
//! so decoding also drops any alpha channel.

use std::io::Cursor;

use bytes::Bytes;
use image::codecs::png::PngEncoder;
use image::imageops::{self, FilterType};
use image::{ImageEncoder, ImageReader, RgbImage};

use crate::error::ImageSourceError;

/// Decode an encoded bitmap into RGB pixels, guessing the format.
///
/// # Errors
///
/// Returns `Decode` if the format is unknown or the data is corrupt.
pub fn decode_rgb(data: &[u8]) -> Result<RgbImage, ImageSourceError> {
    let reader = ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(|e| ImageSourceError::Decode {
            message: e.to_string(),
        })?;

    let img = reader.decode().map_err(|e| ImageSourceError::Decode {
        message: e.to_string(),
    })?;

    Ok(img.to_rgb8())
}

/// Resize `img` to `width`x`height` unless it already has that size.
pub fn fit_to_size(img: RgbImage, width: u32, height: u32) -> RgbImage {
    if img.dimensions() == (width, height) {
        return img;
    }
    imageops::resize(&img, width, height, FilterType::Triangle)
}

/// Encode RGB pixels losslessly as PNG.
pub fn encode_png(img: &RgbImage) -> Result<Bytes, ImageSourceError> {
    let mut output = Vec::new();
    PngEncoder::new(&mut output)
        .write_image(
            img.as_raw(),
            img.width(),
            img.height(),
            image::ExtendedColorType::Rgb8,
        )
        .map_err(|e| ImageSourceError::Fetch(format!("PNG encoding failed: {}", e)))?;

    Ok(Bytes::from(output))
}
