//! Image source interface for Whole Slide Images.
//!
//! Slides are gigapixel images that are never loaded whole. A source hands out
//! an opened image whose pixels are only reachable through region requests:
//! either a rectangle at full resolution or a downscaled thumbnail of the whole
//! slide. Both return an encoded bitmap (JPEG, PNG, ...) that the caller decodes.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::ImageSourceError;

// =============================================================================
// Tile Parameters
// =============================================================================

/// A pixel-space rectangle at full resolution plus a target resize dimension.
///
/// Patch datasets store these with `tileX`/`tileY`/`tileWidth`/`tileHeight`
/// field names, which are accepted when reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileParams {
    #[serde(alias = "tileX")]
    pub x: u32,

    #[serde(alias = "tileY")]
    pub y: u32,

    #[serde(alias = "tileWidth")]
    pub width: u32,

    #[serde(alias = "tileHeight")]
    pub height: u32,

    /// Edge length the region is resized to (0 = native size)
    #[serde(default, alias = "tileResolution")]
    pub size: u32,
}

impl TileParams {
    pub fn new(x: u32, y: u32, width: u32, height: u32, size: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
            size,
        }
    }

    /// A square region of `edge` pixels kept at native size.
    pub fn square(x: u32, y: u32, edge: u32) -> Self {
        Self::new(x, y, edge, edge, edge)
    }

    /// Check that the rectangle is non-empty and lies inside the image.
    pub fn validate(&self, info: &ImageInfo) -> Result<(), ImageSourceError> {
        if self.width == 0 || self.height == 0 {
            return Err(ImageSourceError::InvalidRequest(format!(
                "empty region {}x{}",
                self.width, self.height
            )));
        }

        let right = self.x as u64 + self.width as u64;
        let bottom = self.y as u64 + self.height as u64;
        if right > info.width as u64 || bottom > info.height as u64 {
            return Err(ImageSourceError::InvalidRequest(format!(
                "region ({}, {}) {}x{} exceeds image {}x{}",
                self.x, self.y, self.width, self.height, info.width, info.height
            )));
        }

        Ok(())
    }
}

// =============================================================================
// Requests and Metadata
// =============================================================================

/// A pixel request against an opened slide.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageRequest {
    /// A full-resolution rectangle
    Rectangle(TileParams),

    /// The whole slide downscaled to `width`; height follows the aspect ratio
    Thumbnail { width: u32 },
}

/// Slide metadata captured when the image is opened.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImageInfo {
    /// Full-resolution width in pixels
    pub width: u32,

    /// Full-resolution height in pixels
    pub height: u32,

    /// Physical resolution, when the format records it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pixels_per_meter: Option<f64>,
}

impl ImageInfo {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels_per_meter: None,
        }
    }

    /// Height of a thumbnail `width` pixels wide, preserving aspect ratio.
    pub fn thumbnail_height(&self, width: u32) -> u32 {
        if self.width == 0 {
            return 0;
        }
        let height = (width as f64 * self.height as f64 / self.width as f64).round() as u32;
        height.max(1)
    }
}

// =============================================================================
// Traits
// =============================================================================

/// An opened slide.
#[async_trait]
pub trait SlideImage: Send + Sync {
    /// Metadata read when the slide was opened.
    fn info(&self) -> ImageInfo;

    /// Fetch an encoded bitmap for the request.
    ///
    /// # Errors
    ///
    /// - `InvalidRequest` if a rectangle falls outside the image
    /// - `Fetch` on network or storage failure
    async fn fetch(&self, request: &ImageRequest) -> Result<Bytes, ImageSourceError>;
}

/// Opens slides by URL.
#[async_trait]
pub trait ImageSourceProvider: Send + Sync {
    /// The type of opened image this provider hands out.
    type Image: SlideImage + 'static;

    /// Open the slide at `url` and read its metadata.
    async fn open(&self, url: &str) -> Result<Self::Image, ImageSourceError>;
}
