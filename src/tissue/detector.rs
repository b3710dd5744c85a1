//! Tissue region detection on a low-resolution thumbnail.
//!
//! The thumbnail is cut into a `g×g` grid. Each cell is scored by its
//! background fraction and mapped back to full-resolution coordinates; the
//! least empty cells are the regions patches are drawn from.

use image::RgbImage;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::background::{BackgroundClassifier, DEFAULT_BACKGROUND_LEVEL};
use crate::slide::{decode_rgb, ImageInfo, ImageRequest, SlideImage};

/// Default grid dimension.
pub const DEFAULT_GRID_SIZE: u32 = 8;

/// Default thumbnail width in pixels.
pub const DEFAULT_THUMBNAIL_WIDTH: u32 = 1024;

/// Default number of regions returned.
pub const DEFAULT_MAX_REGIONS: usize = 8;

/// A coarse full-resolution area scored by background content.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TissueRegion {
    pub top_x: u32,
    pub top_y: u32,
    pub bottom_x: u32,
    pub bottom_y: u32,

    /// Fraction of near-white pixels, in `[0, 1]`
    pub empty_fraction: f32,
}

impl TissueRegion {
    /// A region covering the whole image.
    pub fn whole_image(info: &ImageInfo) -> Self {
        Self {
            top_x: 0,
            top_y: 0,
            bottom_x: info.width,
            bottom_y: info.height,
            empty_fraction: 0.0,
        }
    }

    pub fn width(&self) -> u32 {
        self.bottom_x.saturating_sub(self.top_x)
    }

    pub fn height(&self) -> u32 {
        self.bottom_y.saturating_sub(self.top_y)
    }
}

/// Detector settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectorConfig {
    /// Cells per side of the grid
    pub grid_size: u32,

    /// Width of the requested thumbnail
    pub thumbnail_width: u32,

    /// Number of least-empty regions returned
    pub max_regions: usize,

    /// Channel value above which a pixel is background
    pub background_level: u8,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            grid_size: DEFAULT_GRID_SIZE,
            thumbnail_width: DEFAULT_THUMBNAIL_WIDTH,
            max_regions: DEFAULT_MAX_REGIONS,
            background_level: DEFAULT_BACKGROUND_LEVEL,
        }
    }
}

/// Ranks thumbnail grid cells by tissue content.
#[derive(Debug, Clone, Default)]
pub struct TissueRegionDetector {
    config: DetectorConfig,
}

impl TissueRegionDetector {
    pub fn new(config: DetectorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Detect the least-empty regions of a slide.
    ///
    /// Never fails: if the thumbnail cannot be fetched or decoded, returns an
    /// empty list and callers sample the whole image instead.
    pub async fn detect<I: SlideImage + ?Sized>(&self, image: &I) -> Vec<TissueRegion> {
        let info = image.info();
        let request = ImageRequest::Thumbnail {
            width: self.config.thumbnail_width,
        };

        let bytes = match image.fetch(&request).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "Thumbnail fetch failed, falling back to whole-image sampling");
                return Vec::new();
            }
        };

        let thumbnail = match decode_rgb(&bytes) {
            Ok(thumbnail) => thumbnail,
            Err(e) => {
                warn!(error = %e, "Thumbnail decode failed, falling back to whole-image sampling");
                return Vec::new();
            }
        };

        let regions = self.regions_from_thumbnail(&thumbnail, &info);
        debug!(
            regions = regions.len(),
            least_empty = regions.first().map(|r| r.empty_fraction),
            "Detected tissue regions"
        );
        regions
    }

    /// Score every grid cell of `thumbnail` and return the least empty ones.
    ///
    /// Cells are scanned row by row; equal scores keep scan order.
    pub fn regions_from_thumbnail(&self, thumbnail: &RgbImage, info: &ImageInfo) -> Vec<TissueRegion> {
        let (thumb_width, thumb_height) = thumbnail.dimensions();
        if thumb_width == 0 || thumb_height == 0 {
            return Vec::new();
        }

        let grid = self.config.grid_size.max(1) as u64;
        let classifier = BackgroundClassifier {
            level: self.config.background_level,
            ..BackgroundClassifier::default()
        };

        let cell_edge = |i: u64, extent: u32| (i * extent as u64 / grid) as u32;
        let to_full = |v: u32, thumb_extent: u32, full_extent: u32| {
            let scaled = v as u64 * full_extent as u64 / thumb_extent as u64;
            scaled.min(full_extent as u64) as u32
        };

        let mut regions = Vec::with_capacity((grid * grid) as usize);
        for row in 0..grid {
            let y0 = cell_edge(row, thumb_height);
            let y1 = cell_edge(row + 1, thumb_height);
            for col in 0..grid {
                let x0 = cell_edge(col, thumb_width);
                let x1 = cell_edge(col + 1, thumb_width);
                if x1 <= x0 || y1 <= y0 {
                    continue;
                }

                let empty_fraction = classifier.fraction_in(thumbnail, x0, y0, x1 - x0, y1 - y0);
                regions.push(TissueRegion {
                    top_x: to_full(x0, thumb_width, info.width),
                    top_y: to_full(y0, thumb_height, info.height),
                    bottom_x: to_full(x1, thumb_width, info.width),
                    bottom_y: to_full(y1, thumb_height, info.height),
                    empty_fraction,
                });
            }
        }

        regions.sort_by(|a, b| a.empty_fraction.total_cmp(&b.empty_fraction));
        regions.truncate(self.config.max_regions);
        regions
    }
}
