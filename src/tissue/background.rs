//! Near-white background heuristic.
//!
//! A pixel is background when all of its R, G and B values exceed the
//! background level. Both the level and the fraction above which a patch
//! counts as empty are tuning parameters.

use image::RgbImage;

/// Channel value above which a pixel counts as background.
pub const DEFAULT_BACKGROUND_LEVEL: u8 = 200;

/// Background fraction at or above which a patch is discarded.
pub const DEFAULT_EMPTY_THRESHOLD: f32 = 0.9;

/// Classifies pixels and patches as background.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackgroundClassifier {
    /// Channel value above which a pixel is background
    pub level: u8,

    /// Fraction of background pixels at which a patch is empty
    pub empty_threshold: f32,
}

impl Default for BackgroundClassifier {
    fn default() -> Self {
        Self {
            level: DEFAULT_BACKGROUND_LEVEL,
            empty_threshold: DEFAULT_EMPTY_THRESHOLD,
        }
    }
}

impl BackgroundClassifier {
    pub fn new(level: u8, empty_threshold: f32) -> Self {
        Self {
            level,
            empty_threshold,
        }
    }

    /// Fraction of background pixels in the whole image.
    pub fn fraction(&self, img: &RgbImage) -> f32 {
        self.fraction_in(img, 0, 0, img.width(), img.height())
    }

    /// Fraction of background pixels in a rectangle of `img`.
    ///
    /// The rectangle is clipped to the image. An empty rectangle counts as
    /// all background.
    pub fn fraction_in(&self, img: &RgbImage, x: u32, y: u32, width: u32, height: u32) -> f32 {
        let x_end = x.saturating_add(width).min(img.width());
        let y_end = y.saturating_add(height).min(img.height());
        if x >= x_end || y >= y_end {
            return 1.0;
        }

        let mut background = 0u64;
        for py in y..y_end {
            for px in x..x_end {
                let pixel = img.get_pixel(px, py);
                if pixel.0.iter().all(|&c| c > self.level) {
                    background += 1;
                }
            }
        }

        let total = (x_end - x) as u64 * (y_end - y) as u64;
        background as f32 / total as f32
    }

    /// Whether a patch is mostly background.
    pub fn is_empty(&self, img: &RgbImage) -> bool {
        self.fraction(img) >= self.empty_threshold
    }
}
