//! # Slide Explorer
//!
//! Embeds Whole Slide Images from tissue-bearing patches and explores a
//! collection of document embeddings by similarity.
//!
//! A slide embedding is built by finding tissue on a thumbnail, drawing random
//! patches inside the tissue regions, running each patch through an encoder
//! model and averaging the patch embeddings. Embedded slides join a document
//! collection that is ranked against a focus document and projected into a
//! colored point cloud.
//!
//! ## Architecture
//!
//! - [`slide`] - Image source traits, handle cache and raster source
//! - [`tissue`] - Tissue region detection and patch sampling
//! - [`embedding`] - Tensor preprocessing, inference engine and slide pipeline
//! - [`similarity`] - Distance/similarity measures and the ranked table
//! - [`state`] - Typed reactive state store
//! - [`explorer`] - Document collection, color scale, views and peer sync
//! - [`server`] - Axum-based HTTP API
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use rand::SeedableRng;
//! use slide_explorer::{
//!     EmbeddingEngine, HttpInferenceRuntime, RasterImageSource, SlideEmbedder, SlideHandles,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let runtime = HttpInferenceRuntime::new()?;
//!     let engine = EmbeddingEngine::new(runtime, "http://localhost:8000/v2/models/ctranspath");
//!     let handles = SlideHandles::new(RasterImageSource::new());
//!     let embedder = SlideEmbedder::new(Arc::new(handles), Arc::new(engine));
//!
//!     let mut rng = rand::rngs::StdRng::seed_from_u64(7);
//!     let slide = embedder.embed_slide("slide.png", 50, &mut rng).await?;
//!     println!("{} dimensions from {} patches", slide.vector.len(), slide.patches.len());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod embedding;
pub mod error;
pub mod explorer;
pub mod server;
pub mod similarity;
pub mod slide;
pub mod state;
pub mod tissue;

// Re-export commonly used types
pub use config::{Cli, Command, EmbedConfig, RankConfig, ServeConfig};
pub use embedding::{
    aggregate, EmbeddingEngine, HttpInferenceRuntime, InferenceRuntime, Preprocessor,
    SlideEmbedder, SlideEmbedding, Tensor, TensorLayout,
};
pub use error::{
    ApiError, DatasetError, ExplorerError, ImageSourceError, InferenceError, PipelineError,
    SamplingError, StateError, TensorError, VectorError,
};
pub use explorer::{Document, Explorer, ExplorerView, PeerMessage, SyncEvent};
pub use server::{create_router, AppState, ErrorResponse, RouterConfig};
pub use similarity::{distance, rank, similarity, Measure, RankedRow, RankedView};
pub use slide::{
    ImageRequest, ImageSourceProvider, RasterImageSource, SlideHandles, SlideImage, TileServiceSource,
};
pub use state::{StateKey, StateStore};
pub use tissue::{PatchSampler, TissueRegion, TissueRegionDetector};
