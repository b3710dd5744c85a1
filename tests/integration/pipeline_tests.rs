//! Slide embedding pipeline tests.
//!
//! Tests verify:
//! - Tissue detection ranks the tissue-bearing quadrant first
//! - Sampled patches come from tissue and are averaged into one vector
//! - The model is loaded once and reused across slides
//! - Failure modes surface as typed errors

use image::{Rgb, RgbImage};
use rand::rngs::StdRng;
use rand::SeedableRng;

use slide_explorer::error::{ImageSourceError, InferenceError, PipelineError, SamplingError};
use slide_explorer::explorer::{Explorer, Origin};
use slide_explorer::slide::{ImageSourceProvider, RasterImageSource};
use slide_explorer::tissue::{DetectorConfig, TissueRegionDetector};

use super::test_utils::{
    black_patch_embedding, black_square_slide, blank_slide, document, test_embedder,
    ChannelMeanRuntime, BLACK,
};

fn assert_close(actual: &[f32], expected: &[f32]) {
    assert_eq!(actual.len(), expected.len());
    for (a, e) in actual.iter().zip(expected) {
        assert!((a - e).abs() < 1e-4, "expected {:?}, got {:?}", expected, actual);
    }
}

// =============================================================================
// Tissue Detection
// =============================================================================

#[tokio::test]
async fn test_black_square_quadrant_ranks_first() {
    let source = RasterImageSource::new().with_image("mem://square", black_square_slide());
    let image = source.open("mem://square").await.unwrap();

    let detector = TissueRegionDetector::new(DetectorConfig {
        grid_size: 2,
        ..DetectorConfig::default()
    });
    let regions = detector.detect(&image).await;

    assert_eq!(regions.len(), 4);
    let first = regions[0];
    assert_eq!(
        (first.top_x, first.top_y, first.bottom_x, first.bottom_y),
        (0, 0, 256, 256)
    );
    assert!(first.empty_fraction < 0.1);
    assert!(regions[1..].iter().all(|r| r.empty_fraction > 0.9));
}

// =============================================================================
// End-to-End Embedding
// =============================================================================

#[tokio::test]
async fn test_embed_slide_from_tissue_patches() {
    let source = RasterImageSource::new().with_image("mem://square", black_square_slide());
    let runtime = ChannelMeanRuntime::new();
    let embedder = test_embedder(source, runtime.clone());

    let mut rng = StdRng::seed_from_u64(42);
    let slide = embedder.embed_slide("mem://square", 4, &mut rng).await.unwrap();

    assert_eq!(slide.url, "mem://square");
    assert_eq!(slide.patches.len(), 4);
    assert_eq!(runtime.run_count(), 4);
    for patch in &slide.patches {
        let params = patch.tile_params;
        assert_eq!((params.width, params.height), (224, 224));
        assert!(params.x + params.width <= 256 && params.y + params.height <= 256);
    }

    // Only black patches were embedded
    assert_close(&slide.vector, &black_patch_embedding());
    assert_eq!(slide.regions[0].top_x, 0);
}

#[tokio::test]
async fn test_model_loaded_once_across_slides() {
    let mut inverted = black_square_slide();
    for pixel in inverted.pixels_mut() {
        *pixel = Rgb([255 - pixel[0], 255 - pixel[1], 255 - pixel[2]]);
    }
    // Tissue everywhere except the top-left quadrant
    let source = RasterImageSource::new()
        .with_image("mem://a", black_square_slide())
        .with_image("mem://b", inverted);
    let runtime = ChannelMeanRuntime::new();
    let embedder = test_embedder(source, runtime.clone());

    let mut rng = StdRng::seed_from_u64(1);
    embedder.embed_slide("mem://a", 2, &mut rng).await.unwrap();
    let second = embedder.embed_slide("mem://b", 2, &mut rng).await.unwrap();

    assert_eq!(runtime.load_count(), 1);
    assert!(embedder.engine().is_loaded());
    assert_eq!(embedder.handles().cached_count().await, 2);
    assert!(second.regions[0].top_x >= 256 || second.regions[0].top_y >= 256);
}

#[tokio::test]
async fn test_same_seed_same_embedding() {
    let source = RasterImageSource::new().with_image("mem://square", black_square_slide());
    let embedder = test_embedder(source, ChannelMeanRuntime::new());

    let a = embedder
        .embed_slide("mem://square", 3, &mut StdRng::seed_from_u64(9))
        .await
        .unwrap();
    let b = embedder
        .embed_slide("mem://square", 3, &mut StdRng::seed_from_u64(9))
        .await
        .unwrap();

    let origins = |s: &slide_explorer::SlideEmbedding| {
        s.patches
            .iter()
            .map(|p| (p.tile_params.x, p.tile_params.y))
            .collect::<Vec<_>>()
    };
    assert_eq!(origins(&a), origins(&b));
    assert_eq!(a.vector, b.vector);
}

// =============================================================================
// Failure Modes
// =============================================================================

#[tokio::test]
async fn test_missing_slide() {
    let embedder = test_embedder(RasterImageSource::new(), ChannelMeanRuntime::new());
    let result = embedder
        .embed_slide("/nonexistent/slide.png", 2, &mut StdRng::seed_from_u64(0))
        .await;
    assert!(matches!(
        result,
        Err(PipelineError::Source(ImageSourceError::NotFound(_)))
    ));
}

#[tokio::test]
async fn test_blank_slide_exhausts_draws() {
    let source = RasterImageSource::new().with_image("mem://blank", blank_slide(300, 300));
    let runtime = ChannelMeanRuntime::new();
    let embedder = test_embedder(source, runtime.clone());

    let result = embedder
        .embed_slide("mem://blank", 2, &mut StdRng::seed_from_u64(0))
        .await;
    match result {
        Err(PipelineError::Sampling(SamplingError::SamplingExhausted {
            collected, requested, ..
        })) => {
            assert_eq!(collected, 0);
            assert_eq!(requested, 2);
        }
        other => panic!("expected SamplingExhausted, got {:?}", other.map(|s| s.vector)),
    }
    assert_eq!(runtime.run_count(), 0);
}

#[tokio::test]
async fn test_image_smaller_than_patch() {
    let source = RasterImageSource::new().with_image("mem://tiny", RgbImage::from_pixel(100, 100, BLACK));
    let embedder = test_embedder(source, ChannelMeanRuntime::new());

    let result = embedder
        .embed_slide("mem://tiny", 1, &mut StdRng::seed_from_u64(0))
        .await;
    assert!(matches!(
        result,
        Err(PipelineError::Sampling(SamplingError::ImageTooSmall { patch_size: 224, .. }))
    ));
}

#[tokio::test]
async fn test_model_load_failure() {
    let source = RasterImageSource::new().with_image("mem://square", black_square_slide());
    let runtime = ChannelMeanRuntime::failing();
    let embedder = test_embedder(source, runtime.clone());

    let result = embedder
        .embed_slide("mem://square", 1, &mut StdRng::seed_from_u64(0))
        .await;
    assert!(matches!(
        result,
        Err(PipelineError::Inference(InferenceError::Load { .. }))
    ));

    // A failed load is retried on the next call
    let _ = embedder
        .embed_slide("mem://square", 1, &mut StdRng::seed_from_u64(0))
        .await;
    assert_eq!(runtime.load_count(), 2);
}

// =============================================================================
// Collection Integration
// =============================================================================

#[tokio::test]
async fn test_embedded_slide_joins_collection() {
    let source = RasterImageSource::new().with_image("mem://square", black_square_slide());
    let embedder = test_embedder(source, ChannelMeanRuntime::new());
    let slide = embedder
        .embed_slide("mem://square", 2, &mut StdRng::seed_from_u64(3))
        .await
        .unwrap();

    let mut explorer = Explorer::new(
        vec![
            document(vec![1.0, 0.0, 0.0], "lung"),
            document(vec![-2.0, -2.0, -1.0], "breast"),
        ],
        Some("site".to_string()),
    )
    .unwrap();
    let mut sync = explorer.subscribe_sync();

    let index = explorer
        .add_embedded_slide(slide.vector, slide.url, serde_json::json!("breast"))
        .unwrap();
    assert_eq!(index, 2);
    assert_eq!(explorer.focus().unwrap(), Some(2));

    // The new slide ranks itself first, then its nearest neighbour
    let ranked = explorer.ranked_view().unwrap();
    assert_eq!(ranked.rows[0].document_index, 2);
    assert_eq!(ranked.rows[1].document_index, 1);

    let announced = sync.try_recv().unwrap();
    let slide_explorer::SyncEvent::NewPatchEmbedding(doc) = announced;
    assert_eq!(doc.source_ref.as_deref(), Some("mem://square"));

    // A peer copy of a 2-d document is rejected
    let result = explorer.add_document(
        document(vec![1.0, 2.0], "lung"),
        Origin::Peer { from: None },
    );
    assert!(result.is_err());
}
