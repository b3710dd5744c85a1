//! Tissue localization and patch sampling.
//!
//! Slides are mostly glass. Before any patch is embedded the detector scores a
//! coarse grid on a thumbnail, and the sampler draws patches only inside the
//! least empty cells, discarding the ones that still land on background.
//!
//! ```text
//! thumbnail (w px) ──► g×g grid ──► k least-empty regions
//!                                          │
//!                                          ▼
//!                     random draw ──► fetch 224×224 ──► empty? ──► retry
//!                                                         │
//!                                                         ▼
//!                                                   SampledPatch
//! ```

mod background;
mod detector;
mod sampler;

pub use background::{BackgroundClassifier, DEFAULT_BACKGROUND_LEVEL, DEFAULT_EMPTY_THRESHOLD};
pub use detector::{
    DetectorConfig, TissueRegion, TissueRegionDetector, DEFAULT_GRID_SIZE, DEFAULT_MAX_REGIONS,
    DEFAULT_THUMBNAIL_WIDTH,
};
pub use sampler::{
    PatchDraws, PatchSampler, SampledPatch, SamplerConfig, DEFAULT_ATTEMPTS_PER_PATCH,
    DEFAULT_PATCH_SIZE,
};
