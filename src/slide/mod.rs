//! Slide access layer.
//!
//! This module defines how the pipeline reaches slide pixels without ever
//! holding a whole slide in memory.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │     Region detector / patch sampler     │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │             SlideHandles                │
//! │    (URL-keyed cache, singleflight)      │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │  ImageSourceProvider / SlideImage       │
//! │  fetch(Rectangle | Thumbnail) → bytes   │
//! │  (RasterImageSource, TileServiceSource) │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │   decode_rgb (encoded bitmap → RGB)     │
//! └─────────────────────────────────────────┘
//! ```

mod decoder;
mod raster;
mod registry;
mod remote;
mod source;

pub use decoder::{decode_rgb, encode_png, fit_to_size};
pub use raster::{RasterImage, RasterImageSource};
pub use registry::{SlideHandles, DEFAULT_HANDLE_CAPACITY};
pub use remote::{TileServiceImage, TileServiceSource};
pub use source::{ImageInfo, ImageRequest, ImageSourceProvider, SlideImage, TileParams};
