//! Whole-slide embedding.
//!
//! Ties the stages together for one slide URL:
//!
//! ```text
//! SlideHandles::get(url)
//!        │
//!        ▼
//! TissueRegionDetector::detect ──► PatchSampler::draws ──┐
//!                                                        │ per patch
//!                           Preprocessor ◄───────────────┘
//!                                │
//!                                ▼
//!                      EmbeddingEngine::embed ──► aggregate ──► SlideEmbedding
//! ```

use std::sync::Arc;
use std::time::Instant;

use rand::Rng;
use serde::Serialize;
use tracing::{debug, info};

use super::aggregate::{aggregate, PatchEmbedding};
use super::engine::{EmbeddingEngine, InferenceRuntime};
use super::tensor::{Preprocessor, TensorLayout};
use crate::error::PipelineError;
use crate::slide::{ImageSourceProvider, SlideHandles, SlideImage};
use crate::tissue::{DetectorConfig, PatchSampler, SamplerConfig, TissueRegion, TissueRegionDetector};

/// Result of embedding one slide.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlideEmbedding {
    pub url: String,

    /// Column-wise mean of the patch embeddings
    pub vector: Vec<f32>,

    /// The individual patches the mean was taken over
    pub patches: Vec<PatchEmbedding>,

    /// Regions the patches were drawn from (empty: whole image)
    pub regions: Vec<TissueRegion>,
}

/// Embeds slides from an image source with one encoder.
pub struct SlideEmbedder<P: ImageSourceProvider, R: InferenceRuntime> {
    handles: Arc<SlideHandles<P>>,
    engine: Arc<EmbeddingEngine<R>>,
    detector: TissueRegionDetector,
    sampler: PatchSampler,
    preprocessor: Preprocessor,
}

impl<P: ImageSourceProvider, R: InferenceRuntime> SlideEmbedder<P, R> {
    /// Create an embedder with default detector and sampler settings.
    pub fn new(handles: Arc<SlideHandles<P>>, engine: Arc<EmbeddingEngine<R>>) -> Self {
        let sampler = PatchSampler::default();
        Self {
            handles,
            engine,
            detector: TissueRegionDetector::default(),
            preprocessor: Preprocessor::new(sampler.config().patch_size),
            sampler,
        }
    }

    pub fn with_detector(mut self, config: DetectorConfig) -> Self {
        self.detector = TissueRegionDetector::new(config);
        self
    }

    /// Replace the sampler settings. The preprocessor follows the patch size.
    pub fn with_sampler(mut self, config: SamplerConfig) -> Self {
        self.sampler = PatchSampler::new(config);
        self.preprocessor = Preprocessor::new(config.patch_size).with_layout(self.preprocessor.layout());
        self
    }

    pub fn with_layout(mut self, layout: TensorLayout) -> Self {
        self.preprocessor = self.preprocessor.with_layout(layout);
        self
    }

    /// The same pipeline over another encoder, sharing the open slides.
    pub fn with_engine(&self, engine: Arc<EmbeddingEngine<R>>) -> Self {
        Self {
            handles: Arc::clone(&self.handles),
            engine,
            detector: self.detector.clone(),
            sampler: self.sampler.clone(),
            preprocessor: self.preprocessor,
        }
    }

    pub fn handles(&self) -> &SlideHandles<P> {
        &self.handles
    }

    pub fn engine(&self) -> &EmbeddingEngine<R> {
        &self.engine
    }

    /// Sample `num_patches` tissue patches from the slide at `url` and return
    /// the mean of their embeddings.
    ///
    /// # Errors
    ///
    /// Fails if the slide cannot be opened, the model cannot be loaded, the
    /// sampler runs out of draws, inference fails, or no patch was embedded
    /// ([`PipelineError::NoValidPatches`]).
    pub async fn embed_slide<G: Rng + Send>(
        &self,
        url: &str,
        num_patches: usize,
        rng: &mut G,
    ) -> Result<SlideEmbedding, PipelineError> {
        let start = Instant::now();
        self.engine.ensure_loaded().await?;

        let image = self.handles.get(url).await?;
        let info = image.info();
        info!(
            url = url,
            width = info.width,
            height = info.height,
            num_patches = num_patches,
            "Embedding slide"
        );

        let regions = self.detector.detect(image.as_ref()).await;
        let mut draws = self.sampler.draws(image.as_ref(), num_patches, &regions)?;

        let mut patches = Vec::with_capacity(num_patches);
        while let Some(patch) = draws.next(rng).await? {
            let tensor = self.preprocessor.preprocess_image(&patch.pixels)?;
            let vector = self.engine.embed(tensor).await?;
            debug!(
                x = patch.params.x,
                y = patch.params.y,
                embedded = patches.len() + 1,
                "Embedded patch"
            );
            patches.push(PatchEmbedding {
                tile_params: patch.params,
                vector,
            });
        }

        let vector = aggregate(&patches)?;
        if vector.is_empty() {
            return Err(PipelineError::NoValidPatches {
                url: url.to_string(),
            });
        }

        info!(
            url = url,
            patches = patches.len(),
            draws = draws.attempts(),
            empty_draws = draws.empty_draws(),
            failed_fetches = draws.failed_fetches(),
            dimension = vector.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Slide embedded"
        );

        Ok(SlideEmbedding {
            url: url.to_string(),
            vector,
            patches,
            regions,
        })
    }
}
