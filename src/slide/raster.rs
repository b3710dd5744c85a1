//! Raster image source.
//!
//! Serves regions and thumbnails from a decoded raster. Images are registered
//! in memory, read from disk, or downloaded once from an `http(s)` URL, so the
//! whole image is held in memory. Gigapixel slides are read through
//! [`TileServiceSource`](super::TileServiceSource) instead.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use image::imageops::{self, FilterType};
use image::RgbImage;
use tracing::debug;

use super::decoder::{decode_rgb, encode_png};
use super::source::{ImageInfo, ImageRequest, ImageSourceProvider, SlideImage};
use crate::error::ImageSourceError;

/// A decoded raster exposed as a slide.
#[derive(Debug, Clone)]
pub struct RasterImage {
    pixels: Arc<RgbImage>,
}

impl RasterImage {
    pub fn new(pixels: RgbImage) -> Self {
        Self {
            pixels: Arc::new(pixels),
        }
    }
}

#[async_trait]
impl SlideImage for RasterImage {
    fn info(&self) -> ImageInfo {
        ImageInfo::new(self.pixels.width(), self.pixels.height())
    }

    async fn fetch(&self, request: &ImageRequest) -> Result<Bytes, ImageSourceError> {
        let info = self.info();
        let region = match request {
            ImageRequest::Rectangle(params) => {
                params.validate(&info)?;
                let crop = imageops::crop_imm(
                    self.pixels.as_ref(),
                    params.x,
                    params.y,
                    params.width,
                    params.height,
                )
                .to_image();

                if params.size > 0 && (params.width != params.size || params.height != params.size)
                {
                    imageops::resize(&crop, params.size, params.size, FilterType::Triangle)
                } else {
                    crop
                }
            }
            ImageRequest::Thumbnail { width } => {
                if *width == 0 {
                    return Err(ImageSourceError::InvalidRequest(
                        "thumbnail width must be positive".to_string(),
                    ));
                }
                let height = info.thumbnail_height(*width);
                imageops::resize(self.pixels.as_ref(), *width, height, FilterType::Triangle)
            }
        };

        encode_png(&region)
    }
}

/// Provider for in-memory rasters, remote images and local image files.
///
/// URLs registered with [`RasterImageSource::with_image`] are served from
/// memory. `http(s)://` URLs are downloaded whole and decoded; anything else
/// is treated as a local file path.
#[derive(Debug, Clone, Default)]
pub struct RasterImageSource {
    images: HashMap<String, RasterImage>,
    client: reqwest::Client,
}

impl RasterImageSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an in-memory raster under `url`.
    pub fn with_image(mut self, url: impl Into<String>, pixels: RgbImage) -> Self {
        self.images.insert(url.into(), RasterImage::new(pixels));
        self
    }

    /// Use a preconfigured HTTP client for remote images.
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    async fn open_remote(&self, url: &str) -> Result<RasterImage, ImageSourceError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ImageSourceError::Fetch(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(ImageSourceError::NotFound(url.to_string()));
        }
        let body = response
            .error_for_status()
            .map_err(|e| ImageSourceError::Fetch(e.to_string()))?
            .bytes()
            .await
            .map_err(|e| ImageSourceError::Fetch(e.to_string()))?;
        debug!(url = url, bytes = body.len(), "Downloaded remote image");

        let decoded = tokio::task::spawn_blocking(move || decode_rgb(&body))
            .await
            .map_err(|e| ImageSourceError::Fetch(e.to_string()))??;

        Ok(RasterImage::new(decoded))
    }

    async fn open_file(path: &str) -> Result<RasterImage, ImageSourceError> {
        if !Path::new(path).exists() {
            return Err(ImageSourceError::NotFound(path.to_string()));
        }

        let owned = path.to_string();
        let decoded = tokio::task::spawn_blocking(move || image::open(&owned))
            .await
            .map_err(|e| ImageSourceError::Fetch(e.to_string()))?
            .map_err(|e| ImageSourceError::Decode {
                message: e.to_string(),
            })?;

        Ok(RasterImage::new(decoded.to_rgb8()))
    }
}

#[async_trait]
impl ImageSourceProvider for RasterImageSource {
    type Image = RasterImage;

    async fn open(&self, url: &str) -> Result<Self::Image, ImageSourceError> {
        if let Some(image) = self.images.get(url) {
            return Ok(image.clone());
        }
        if url.starts_with("http://") || url.starts_with("https://") {
            return self.open_remote(url).await;
        }
        Self::open_file(url).await
    }
}
