//! Random patch sampling inside tissue regions.
//!
//! Each draw picks a region uniformly, picks a patch origin uniformly inside
//! it, fetches the rectangle and discards it if it is mostly background. Draws
//! are bounded: after `num_patches × attempts_per_patch` attempts the sampler
//! gives up with [`SamplingError::SamplingExhausted`].
//!
//! # Example
//!
//! ```ignore
//! use rand::{rngs::StdRng, SeedableRng};
//!
//! let sampler = PatchSampler::default();
//! let mut draws = sampler.draws(slide.as_ref(), 10, &regions)?;
//! let mut rng = StdRng::seed_from_u64(7);
//!
//! while let Some(patch) = draws.next(&mut rng).await? {
//!     // embed patch.pixels
//! }
//! ```

use image::RgbImage;
use rand::Rng;
use tracing::{debug, warn};

use super::background::{BackgroundClassifier, DEFAULT_BACKGROUND_LEVEL, DEFAULT_EMPTY_THRESHOLD};
use super::detector::TissueRegion;
use crate::error::{ImageSourceError, SamplingError};
use crate::slide::{decode_rgb, fit_to_size, ImageInfo, ImageRequest, SlideImage, TileParams};

/// Default patch edge length in pixels.
pub const DEFAULT_PATCH_SIZE: u32 = 224;

/// Default draws allowed per requested patch.
pub const DEFAULT_ATTEMPTS_PER_PATCH: usize = 100;

/// Sampler settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplerConfig {
    /// Patch edge length, also the size tiles are resized to
    pub patch_size: u32,

    /// Background fraction at which a patch is discarded
    pub empty_threshold: f32,

    /// Channel value above which a pixel is background
    pub background_level: u8,

    /// Draw budget per requested patch
    pub attempts_per_patch: usize,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            patch_size: DEFAULT_PATCH_SIZE,
            empty_threshold: DEFAULT_EMPTY_THRESHOLD,
            background_level: DEFAULT_BACKGROUND_LEVEL,
            attempts_per_patch: DEFAULT_ATTEMPTS_PER_PATCH,
        }
    }
}

/// A tissue patch accepted by the sampler.
#[derive(Debug, Clone)]
pub struct SampledPatch {
    /// Where the patch was read from
    pub params: TileParams,

    /// Decoded pixels, `patch_size × patch_size`
    pub pixels: RgbImage,
}

/// Draws tissue patches from a slide.
#[derive(Debug, Clone, Default)]
pub struct PatchSampler {
    config: SamplerConfig,
}

impl PatchSampler {
    pub fn new(config: SamplerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    fn classifier(&self) -> BackgroundClassifier {
        BackgroundClassifier::new(self.config.background_level, self.config.empty_threshold)
    }

    /// Start drawing `num_patches` patches from `image`.
    ///
    /// An empty `regions` slice samples the whole image.
    ///
    /// # Errors
    ///
    /// Returns [`SamplingError::ImageTooSmall`] if the image cannot hold a
    /// single patch.
    pub fn draws<'a, I: SlideImage + ?Sized>(
        &'a self,
        image: &'a I,
        num_patches: usize,
        regions: &[TissueRegion],
    ) -> Result<PatchDraws<'a, I>, SamplingError> {
        let info = image.info();
        let patch_size = self.config.patch_size;
        if info.width < patch_size || info.height < patch_size {
            return Err(SamplingError::ImageTooSmall {
                width: info.width,
                height: info.height,
                patch_size,
            });
        }

        let candidates = if regions.is_empty() {
            vec![TissueRegion::whole_image(&info)]
        } else {
            regions.to_vec()
        };

        Ok(PatchDraws {
            sampler: self,
            image,
            info,
            candidates,
            requested: num_patches,
            max_attempts: num_patches.saturating_mul(self.config.attempts_per_patch.max(1)),
            collected: 0,
            attempts: 0,
            empty_draws: 0,
            failed_fetches: 0,
        })
    }

    /// Draw all `num_patches` patches at once.
    pub async fn sample<I: SlideImage + ?Sized, R: Rng + Send>(
        &self,
        image: &I,
        num_patches: usize,
        regions: &[TissueRegion],
        rng: &mut R,
    ) -> Result<Vec<SampledPatch>, SamplingError> {
        let mut draws = self.draws(image, num_patches, regions)?;
        let mut patches = Vec::with_capacity(num_patches);
        while let Some(patch) = draws.next(rng).await? {
            patches.push(patch);
        }
        Ok(patches)
    }
}

/// An in-progress sampling run over one slide.
pub struct PatchDraws<'a, I: ?Sized> {
    sampler: &'a PatchSampler,
    image: &'a I,
    info: ImageInfo,
    candidates: Vec<TissueRegion>,
    requested: usize,
    max_attempts: usize,
    collected: usize,
    attempts: usize,
    empty_draws: usize,
    failed_fetches: usize,
}

impl<I: SlideImage + ?Sized> PatchDraws<'_, I> {
    /// Draw until the next tissue patch is accepted.
    ///
    /// Returns `Ok(None)` once the requested number of patches was produced.
    ///
    /// # Errors
    ///
    /// Returns [`SamplingError::SamplingExhausted`] when the draw budget runs
    /// out first.
    pub async fn next<R: Rng + Send>(
        &mut self,
        rng: &mut R,
    ) -> Result<Option<SampledPatch>, SamplingError> {
        if self.collected >= self.requested {
            return Ok(None);
        }

        let classifier = self.sampler.classifier();
        loop {
            if self.attempts >= self.max_attempts {
                return Err(SamplingError::SamplingExhausted {
                    attempts: self.attempts,
                    collected: self.collected,
                    requested: self.requested,
                });
            }
            self.attempts += 1;

            let params = self.draw_params(rng);
            let pixels = match self.fetch(params).await {
                Ok(pixels) => pixels,
                Err(e) => {
                    self.failed_fetches += 1;
                    warn!(
                        x = params.x,
                        y = params.y,
                        error = %e,
                        "Patch fetch failed, drawing another"
                    );
                    continue;
                }
            };

            let background = classifier.fraction(&pixels);
            if background >= classifier.empty_threshold {
                self.empty_draws += 1;
                debug!(
                    x = params.x,
                    y = params.y,
                    background = background,
                    "Discarding empty patch"
                );
                continue;
            }

            self.collected += 1;
            return Ok(Some(SampledPatch { params, pixels }));
        }
    }

    fn draw_params<R: Rng>(&self, rng: &mut R) -> TileParams {
        let patch_size = self.sampler.config.patch_size;
        let region = &self.candidates[rng.gen_range(0..self.candidates.len())];

        let x = draw_coordinate(rng, region.top_x, region.bottom_x, patch_size);
        let y = draw_coordinate(rng, region.top_y, region.bottom_y, patch_size);

        // Keep the patch inside the image even for regions at the border
        let x = x.min(self.info.width - patch_size);
        let y = y.min(self.info.height - patch_size);

        TileParams::square(x, y, patch_size)
    }

    async fn fetch(&self, params: TileParams) -> Result<RgbImage, ImageSourceError> {
        let bytes = self.image.fetch(&ImageRequest::Rectangle(params)).await?;
        let pixels = decode_rgb(&bytes)?;
        Ok(fit_to_size(pixels, params.size, params.size))
    }

    /// Patches accepted so far.
    pub fn collected(&self) -> usize {
        self.collected
    }

    /// Draws made so far, accepted or not.
    pub fn attempts(&self) -> usize {
        self.attempts
    }

    /// Draws discarded as background.
    pub fn empty_draws(&self) -> usize {
        self.empty_draws
    }

    /// Draws whose fetch or decode failed.
    pub fn failed_fetches(&self) -> usize {
        self.failed_fetches
    }
}

/// Uniform origin in `[start, end - patch_size)`, or `start` when the range is
/// degenerate.
fn draw_coordinate<R: Rng>(rng: &mut R, start: u32, end: u32, patch_size: u32) -> u32 {
    let upper = end.saturating_sub(patch_size);
    if upper > start {
        rng.gen_range(start..upper)
    } else {
        start
    }
}
