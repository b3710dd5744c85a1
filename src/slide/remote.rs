//! Tile service image source.
//!
//! Reads slides from a tile server exposing each slide pyramid over HTTP:
//!
//! ```text
//! GET /slides/{slide_id}                       - dimensions and level layout
//! GET /slides/{slide_id}/thumbnail?max_size=N  - whole slide, longest side N
//! GET /tiles/{slide_id}/{level}/{x}/{y}.jpg    - one pyramid tile
//! ```
//!
//! Opening a slide costs one metadata request. A rectangle is assembled from
//! the full-resolution tiles it overlaps, so the slide is never transferred
//! whole.

use async_trait::async_trait;
use bytes::Bytes;
use image::imageops::{self, FilterType};
use image::RgbImage;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use super::decoder::{decode_rgb, encode_png, fit_to_size};
use super::source::{ImageInfo, ImageRequest, ImageSourceProvider, SlideImage, TileParams};
use crate::error::ImageSourceError;
use crate::explorer::GDC_DATA_URL;

/// Layout of one pyramid level, as reported by the tile server.
#[derive(Debug, Clone, Deserialize)]
struct LevelLayout {
    level: usize,
    tile_width: u32,
    tile_height: u32,
}

/// Body of `GET /slides/{slide_id}`.
#[derive(Debug, Clone, Deserialize)]
struct SlideMetadata {
    width: u32,
    height: u32,
    #[serde(default)]
    levels: Vec<LevelLayout>,
}

/// A slide served by a tile server.
#[derive(Debug, Clone)]
pub struct TileServiceImage {
    slide_id: String,
    base_url: Url,
    client: reqwest::Client,
    info: ImageInfo,
    tile_width: u32,
    tile_height: u32,
}

impl TileServiceImage {
    pub fn slide_id(&self) -> &str {
        &self.slide_id
    }

    /// Full-resolution tile size.
    pub fn tile_size(&self) -> (u32, u32) {
        (self.tile_width, self.tile_height)
    }

    async fn fetch_tile(&self, x: u32, y: u32) -> Result<RgbImage, ImageSourceError> {
        let filename = format!("{}.jpg", y);
        let url = endpoint(
            &self.base_url,
            &["tiles", &self.slide_id, "0", &x.to_string(), &filename],
        )?;
        let body = get_bytes(&self.client, url, &self.slide_id).await?;
        decode_rgb(&body)
    }

    /// Stitch the tiles overlapping `params` and cut the rectangle out.
    async fn read_region(&self, params: &TileParams) -> Result<RgbImage, ImageSourceError> {
        let first_x = params.x / self.tile_width;
        let last_x = (params.x + params.width - 1) / self.tile_width;
        let first_y = params.y / self.tile_height;
        let last_y = (params.y + params.height - 1) / self.tile_height;

        let mut region = RgbImage::new(params.width, params.height);
        for tile_y in first_y..=last_y {
            for tile_x in first_x..=last_x {
                let tile = self.fetch_tile(tile_x, tile_y).await?;
                let left = (tile_x * self.tile_width) as i64 - params.x as i64;
                let top = (tile_y * self.tile_height) as i64 - params.y as i64;
                imageops::replace(&mut region, &tile, left, top);
            }
        }
        debug!(
            slide = %self.slide_id,
            tiles = (last_x - first_x + 1) * (last_y - first_y + 1),
            "Assembled region"
        );

        Ok(region)
    }
}

#[async_trait]
impl SlideImage for TileServiceImage {
    fn info(&self) -> ImageInfo {
        self.info
    }

    async fn fetch(&self, request: &ImageRequest) -> Result<Bytes, ImageSourceError> {
        let region = match request {
            ImageRequest::Rectangle(params) => {
                params.validate(&self.info)?;
                let region = self.read_region(params).await?;
                if params.size > 0 && (params.width != params.size || params.height != params.size)
                {
                    imageops::resize(&region, params.size, params.size, FilterType::Triangle)
                } else {
                    region
                }
            }
            ImageRequest::Thumbnail { width } => {
                if *width == 0 {
                    return Err(ImageSourceError::InvalidRequest(
                        "thumbnail width must be positive".to_string(),
                    ));
                }
                let height = self.info.thumbnail_height(*width);
                let mut url = endpoint(&self.base_url, &["slides", &self.slide_id, "thumbnail"])?;
                url.query_pairs_mut()
                    .append_pair("max_size", &(*width).max(height).to_string());

                let body = get_bytes(&self.client, url, &self.slide_id).await?;
                // The server bounds thumbnail sizes, so the width may differ
                fit_to_size(decode_rgb(&body)?, *width, height)
            }
        };

        encode_png(&region)
    }
}

/// Provider for slides held by a tile server.
///
/// Slides are opened by id, or by their `{base}/slides/{slide_id}` URL. GDC
/// data URLs are opened by their file id.
#[derive(Debug, Clone)]
pub struct TileServiceSource {
    base_url: Url,
    client: reqwest::Client,
}

impl TileServiceSource {
    /// Create a source for the tile server at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` if `base_url` is not an absolute URL.
    pub fn new(base_url: &str) -> Result<Self, ImageSourceError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| ImageSourceError::InvalidRequest(format!("tile server URL {}: {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(ImageSourceError::InvalidRequest(format!(
                "tile server URL {} cannot hold paths",
                base_url
            )));
        }
        Ok(Self {
            base_url,
            client: reqwest::Client::new(),
        })
    }

    /// Use a preconfigured HTTP client.
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Slide id addressed by `url`.
    pub fn slide_id<'a>(&self, url: &'a str) -> &'a str {
        let base = self.base_url.as_str().trim_end_matches('/');
        url.strip_prefix(base)
            .and_then(|rest| rest.strip_prefix("/slides/"))
            .or_else(|| url.strip_prefix(GDC_DATA_URL))
            .unwrap_or(url)
    }
}

#[async_trait]
impl ImageSourceProvider for TileServiceSource {
    type Image = TileServiceImage;

    async fn open(&self, url: &str) -> Result<Self::Image, ImageSourceError> {
        let slide_id = self.slide_id(url).to_string();
        let metadata_url = endpoint(&self.base_url, &["slides", &slide_id])?;

        let response = send(&self.client, metadata_url, &slide_id).await?;
        let metadata: SlideMetadata = response
            .json()
            .await
            .map_err(|e| ImageSourceError::Fetch(format!("slide metadata for {}: {}", slide_id, e)))?;

        let base_level = metadata
            .levels
            .iter()
            .find(|level| level.level == 0)
            .ok_or_else(|| {
                ImageSourceError::Fetch(format!("slide {} has no full-resolution level", slide_id))
            })?;
        if metadata.width == 0 || metadata.height == 0 || base_level.tile_width == 0 || base_level.tile_height == 0 {
            return Err(ImageSourceError::Fetch(format!(
                "slide {} reports an empty image or tile",
                slide_id
            )));
        }
        debug!(
            slide = %slide_id,
            width = metadata.width,
            height = metadata.height,
            tile_width = base_level.tile_width,
            "Opened slide on tile server"
        );

        Ok(TileServiceImage {
            info: ImageInfo::new(metadata.width, metadata.height),
            tile_width: base_level.tile_width,
            tile_height: base_level.tile_height,
            base_url: self.base_url.clone(),
            client: self.client.clone(),
            slide_id,
        })
    }
}

/// `base` with `segments` appended as percent-encoded path segments.
fn endpoint(base: &Url, segments: &[&str]) -> Result<Url, ImageSourceError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| ImageSourceError::InvalidRequest(format!("tile server URL {} cannot hold paths", base)))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

async fn send(
    client: &reqwest::Client,
    url: Url,
    slide_id: &str,
) -> Result<reqwest::Response, ImageSourceError> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| ImageSourceError::Fetch(e.to_string()))?;

    if response.status() == reqwest::StatusCode::NOT_FOUND {
        return Err(ImageSourceError::NotFound(slide_id.to_string()));
    }
    response
        .error_for_status()
        .map_err(|e| ImageSourceError::Fetch(e.to_string()))
}

async fn get_bytes(client: &reqwest::Client, url: Url, slide_id: &str) -> Result<Bytes, ImageSourceError> {
    send(client, url, slide_id)
        .await?
        .bytes()
        .await
        .map_err(|e| ImageSourceError::Fetch(e.to_string()))
}
