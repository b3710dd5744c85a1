//! Test utilities for integration tests.
//!
//! Provides synthetic slides, a mock inference runtime, document fixtures and
//! helpers for driving the router.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use image::{Rgb, RgbImage};
use serde_json::{json, Value};
use tower::ServiceExt;

use slide_explorer::embedding::{
    default_model, EmbeddingEngine, InferenceRuntime, ModelMetadata, SlideEmbedder, Tensor,
    DEFAULT_OUTPUT_NAME, IMAGENET_MEAN, IMAGENET_STD,
};
use slide_explorer::error::InferenceError;
use slide_explorer::explorer::Document;
use slide_explorer::slide::{RasterImageSource, SlideHandles};
use slide_explorer::tissue::DetectorConfig;

pub const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
pub const BLACK: Rgb<u8> = Rgb([0, 0, 0]);

/// Model server the test embedders are configured against.
pub const TEST_MODEL_SERVER: &str = "mem://models";

// =============================================================================
// Synthetic Slides
// =============================================================================

/// 512×512 white image with a 256×256 black square in the top-left quadrant.
pub fn black_square_slide() -> RgbImage {
    RgbImage::from_fn(512, 512, |x, y| if x < 256 && y < 256 { BLACK } else { WHITE })
}

/// Image with no tissue at all.
pub fn blank_slide(width: u32, height: u32) -> RgbImage {
    RgbImage::from_pixel(width, height, WHITE)
}

/// What [`ChannelMeanRuntime`] returns for a fully black patch.
///
/// A constant patch normalizes to zero before per-channel standardization.
pub fn black_patch_embedding() -> Vec<f32> {
    (0..3).map(|c| -IMAGENET_MEAN[c] / IMAGENET_STD[c]).collect()
}

// =============================================================================
// Mock Inference Runtime
// =============================================================================

/// Runtime whose embedding is the per-channel mean of an interleaved tensor.
///
/// Counters are shared, so clones observe the same loads and runs.
#[derive(Clone, Default)]
pub struct ChannelMeanRuntime {
    loads: Arc<AtomicUsize>,
    loaded_urls: Arc<Mutex<Vec<String>>>,
    runs: Arc<AtomicUsize>,
    fail_load: bool,
}

impl ChannelMeanRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// A runtime whose model can never be loaded.
    pub fn failing() -> Self {
        Self {
            fail_load: true,
            ..Self::default()
        }
    }

    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    /// Model URLs in load order.
    pub fn loaded_urls(&self) -> Vec<String> {
        self.loaded_urls.lock().unwrap().clone()
    }

    pub fn run_count(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InferenceRuntime for ChannelMeanRuntime {
    type Session = ();

    async fn load_model(&self, url: &str) -> Result<((), ModelMetadata), InferenceError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.loaded_urls.lock().unwrap().push(url.to_string());
        if self.fail_load {
            return Err(InferenceError::Load {
                url: url.to_string(),
                message: "model not found".to_string(),
            });
        }
        Ok((
            (),
            ModelMetadata {
                input_name: "input".to_string(),
                input_shape: vec![-1, 3, 224, 224],
                outputs: vec![DEFAULT_OUTPUT_NAME.to_string()],
            },
        ))
    }

    async fn run(
        &self,
        _session: &(),
        inputs: Vec<(String, Tensor)>,
    ) -> Result<HashMap<String, Tensor>, InferenceError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        let (_, tensor) = inputs
            .first()
            .ok_or_else(|| InferenceError::Runtime("no input".to_string()))?;

        let mut sums = [0.0f64; 3];
        for (i, v) in tensor.data().iter().enumerate() {
            sums[i % 3] += *v as f64;
        }
        let count = (tensor.len() / 3).max(1) as f64;
        let means = sums.iter().map(|s| (s / count) as f32).collect();

        let output = Tensor::new(vec![1, 3], means).map_err(|e| InferenceError::Runtime(e.to_string()))?;
        Ok(HashMap::from([(DEFAULT_OUTPUT_NAME.to_string(), output)]))
    }
}

/// Embedder over `source` with a 2×2 tissue grid, serving the default model
/// from [`TEST_MODEL_SERVER`].
pub fn test_embedder(
    source: RasterImageSource,
    runtime: ChannelMeanRuntime,
) -> SlideEmbedder<RasterImageSource, ChannelMeanRuntime> {
    let engine = EmbeddingEngine::new(runtime, default_model().endpoint(TEST_MODEL_SERVER));
    SlideEmbedder::new(Arc::new(SlideHandles::new(source)), Arc::new(engine)).with_detector(
        DetectorConfig {
            grid_size: 2,
            thumbnail_width: 256,
            ..DetectorConfig::default()
        },
    )
}

// =============================================================================
// Document Fixtures
// =============================================================================

pub fn document(embedding: Vec<f32>, site: &str) -> Document {
    let mut properties = BTreeMap::new();
    properties.insert("site".to_string(), json!(site));
    Document::new(embedding, properties)
}

/// Three 3-d documents: two lung, one breast.
pub fn sample_documents() -> Vec<Document> {
    vec![
        document(vec![1.0, 0.0, 0.0], "lung"),
        document(vec![0.0, 1.0, 0.0], "breast"),
        document(vec![0.9, 0.1, 0.0], "lung"),
    ]
}

/// Write `contents` to a fresh file in the temp directory.
///
/// Every call gets its own directory, so tests running in parallel never
/// share a file.
pub fn write_temp_file(name: &str, contents: &str) -> PathBuf {
    static NEXT: AtomicUsize = AtomicUsize::new(0);
    let dir = std::env::temp_dir().join(format!(
        "slide-explorer-tests-{}-{}",
        std::process::id(),
        NEXT.fetch_add(1, Ordering::SeqCst)
    ));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

// =============================================================================
// Router Helpers
// =============================================================================

/// Send a request and return the status with the parsed JSON body.
pub async fn send(router: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

pub async fn get(router: &Router, uri: &str) -> (StatusCode, Value) {
    send(router, Method::GET, uri, None).await
}

pub async fn put(router: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    send(router, Method::PUT, uri, Some(body)).await
}

pub async fn post(router: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    send(router, Method::POST, uri, Some(body)).await
}
