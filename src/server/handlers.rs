//! HTTP request handlers for the explorer API.
//!
//! # Endpoints
//!
//! - `GET /health` - Health check
//! - `GET /documents`, `GET /documents/{index}` - The document collection
//! - `GET /state` - Focus, comparison, color property and measure
//! - `PUT /state/{focus,compare,color-by,measure}` - Change the explorer state
//! - `PUT /state/dataset` - Replace the collection with a catalog dataset
//! - `PUT /state/model` - Select the encoder for new slides
//! - `GET /models` - Supported encoder models
//! - `GET /views/table` - Documents ranked against the focus document
//! - `GET /views/explorer` - Point cloud view model
//! - `POST /slides/embed` - Embed a slide and add it to the collection
//! - `POST /peers/messages` - Apply a message from a peer

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info, warn};

use crate::config::DEFAULT_DATA_DIR;
use crate::embedding::{EmbedderSwitch, EncoderModel, InferenceRuntime, SlideEmbedder, SUPPORTED_MODELS};
use crate::error::{
    ApiError, DatasetError, ExplorerError, ImageSourceError, InferenceError, PipelineError,
    SamplingError,
};
use crate::explorer::{
    parse_label, resolve_slide_url, DataConfig, Document, Explorer, ExplorerView, PeerMessage,
    StateSnapshot,
};
use crate::similarity::{Measure, RankedView};
use crate::slide::ImageSourceProvider;
use crate::tissue::TissueRegion;

/// Patches sampled per slide when the request does not say.
pub const DEFAULT_NUM_PATCHES: usize = 50;

// =============================================================================
// Application State
// =============================================================================

/// Shared application state.
///
/// The explorer sits behind one lock; slide embedding runs without holding it
/// and only locks to commit the result.
pub struct AppState<P: ImageSourceProvider, R: InferenceRuntime> {
    /// Document collection and interactive state
    pub explorer: Arc<Mutex<Explorer>>,

    /// Slide embedding pipeline following the selected model (None when no
    /// inference endpoint is configured)
    pub embedder: Option<Arc<EmbedderSwitch<P, R>>>,

    /// Patches sampled per slide by default
    pub default_num_patches: usize,

    /// Directory catalog datasets are read from
    pub data_dir: PathBuf,

    /// Encoder selection published by the explorer
    selected_model: watch::Receiver<&'static EncoderModel>,
}

impl<P: ImageSourceProvider, R: InferenceRuntime> AppState<P, R> {
    pub fn new(explorer: Explorer) -> Self {
        let selected_model = explorer.watch_model();
        Self {
            explorer: Arc::new(Mutex::new(explorer)),
            embedder: None,
            default_num_patches: DEFAULT_NUM_PATCHES,
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            selected_model,
        }
    }

    /// Enable slide embedding. When another model is selected, its engine is
    /// built against the model server at `server_url`.
    pub fn with_embedder(mut self, embedder: SlideEmbedder<P, R>, server_url: impl Into<String>) -> Self {
        let switch = EmbedderSwitch::new(embedder, server_url, self.selected_model.clone());
        self.embedder = Some(Arc::new(switch));
        self
    }

    pub fn with_default_num_patches(mut self, num_patches: usize) -> Self {
        self.default_num_patches = num_patches;
        self
    }

    pub fn with_data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.data_dir = data_dir.into();
        self
    }
}

impl<P: ImageSourceProvider, R: InferenceRuntime> Clone for AppState<P, R> {
    fn clone(&self) -> Self {
        Self {
            explorer: Arc::clone(&self.explorer),
            embedder: self.embedder.clone(),
            default_num_patches: self.default_num_patches,
            data_dir: self.data_dir.clone(),
            selected_model: self.selected_model.clone(),
        }
    }
}

// =============================================================================
// Request Bodies
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct FocusRequest {
    pub index: usize,
}

#[derive(Debug, Deserialize)]
pub struct CompareRequest {
    pub indices: Vec<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColorByRequest {
    /// Property to color by; null for uniform points
    pub color_by: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MeasureRequest {
    pub measure: Measure,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetRequest {
    /// Catalog dataset id
    pub dataset: String,

    /// Overrides the dataset's color property
    #[serde(default)]
    pub color_by: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ModelRequest {
    /// Model name or id
    pub model: String,
}

/// Body of `POST /slides/embed`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbedSlideRequest {
    /// Slide URL, local path or GDC file id
    pub slide: String,

    /// Label stored under the current color property
    #[serde(default)]
    pub label: Value,

    #[serde(default)]
    pub num_patches: Option<usize>,

    /// Seed for reproducible patch draws
    #[serde(default)]
    pub seed: Option<u64>,
}

// =============================================================================
// Response Types
// =============================================================================

/// JSON error response returned for all error conditions.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error type identifier (e.g., "not_found", "invalid_request")
    pub error: String,

    /// Human-readable error message
    pub message: String,

    /// HTTP status code (included for convenience)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: None,
        }
    }

    pub fn with_status(
        error: impl Into<String>,
        message: impl Into<String>,
        status: StatusCode,
    ) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: Some(status.as_u16()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Debug, Serialize)]
pub struct DocumentsResponse {
    pub count: usize,
    pub documents: Vec<Document>,
}

/// Result of `POST /slides/embed`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbedSlideResponse {
    /// Index of the new document
    pub index: usize,
    pub source_ref: String,
    pub dimension: usize,
    pub patch_count: usize,
    pub regions: Vec<TissueRegion>,
}

#[derive(Debug, Serialize)]
pub struct AddedDocumentResponse {
    pub index: usize,
}

#[derive(Debug, Serialize)]
pub struct ModelsResponse {
    pub models: &'static [EncoderModel],

    /// Name of the selected model
    pub selected: String,
}

// =============================================================================
// Error Mapping
// =============================================================================

fn explorer_status(err: &ExplorerError) -> (StatusCode, &'static str) {
    match err {
        ExplorerError::DocumentNotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
        ExplorerError::UnknownProperty(_) => (StatusCode::BAD_REQUEST, "unknown_property"),
        ExplorerError::UnknownModel(_) => (StatusCode::BAD_REQUEST, "unknown_model"),
        ExplorerError::ModelDisabled(_) => (StatusCode::BAD_REQUEST, "model_disabled"),
        ExplorerError::Vector(_) => (StatusCode::UNPROCESSABLE_ENTITY, "dimension_mismatch"),
        ExplorerError::State(_) => (StatusCode::INTERNAL_SERVER_ERROR, "state_error"),
    }
}

fn source_status(err: &ImageSourceError) -> (StatusCode, &'static str) {
    match err {
        ImageSourceError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
        ImageSourceError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
        ImageSourceError::Fetch(_) | ImageSourceError::Decode { .. } => {
            (StatusCode::BAD_GATEWAY, "image_source_error")
        }
    }
}

fn pipeline_status(err: &PipelineError) -> (StatusCode, &'static str) {
    match err {
        PipelineError::Source(source) => source_status(source),
        PipelineError::Sampling(SamplingError::Source(source)) => source_status(source),
        PipelineError::Sampling(SamplingError::ImageTooSmall { .. }) => {
            (StatusCode::UNPROCESSABLE_ENTITY, "image_too_small")
        }
        PipelineError::Sampling(SamplingError::SamplingExhausted { .. }) => {
            (StatusCode::UNPROCESSABLE_ENTITY, "sampling_exhausted")
        }
        PipelineError::NoValidPatches { .. } => {
            (StatusCode::UNPROCESSABLE_ENTITY, "no_valid_patches")
        }
        PipelineError::Inference(InferenceError::Load { .. })
        | PipelineError::Inference(InferenceError::ModelNotLoaded) => {
            (StatusCode::SERVICE_UNAVAILABLE, "model_unavailable")
        }
        PipelineError::Inference(InferenceError::Runtime(_)) => {
            (StatusCode::BAD_GATEWAY, "inference_error")
        }
        PipelineError::Inference(_) | PipelineError::Tensor(_) | PipelineError::Vector(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "inference_error")
        }
    }
}

fn dataset_status(err: &DatasetError) -> (StatusCode, &'static str) {
    match err {
        DatasetError::InvalidUrl { .. } => (StatusCode::BAD_REQUEST, "invalid_slide"),
        DatasetError::UnknownDataset(_) => (StatusCode::NOT_FOUND, "not_found"),
        DatasetError::UnsupportedArchive(_) | DatasetError::Parse(_) => {
            (StatusCode::BAD_REQUEST, "invalid_dataset")
        }
        DatasetError::Io { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "io_error"),
    }
}

/// Convert ApiError to HTTP response.
///
/// - 5xx errors are logged at ERROR level
/// - 404s at DEBUG level, other 4xx at WARN level
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self {
            ApiError::Explorer(e) => explorer_status(e),
            ApiError::Pipeline(e) => pipeline_status(e),
            ApiError::Dataset(e) => dataset_status(e),
            ApiError::EmbeddingUnavailable => {
                (StatusCode::SERVICE_UNAVAILABLE, "embedding_unavailable")
            }
            ApiError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
        };
        let message = self.to_string();

        if status.is_server_error() {
            error!(
                error_type = error_type,
                status = status.as_u16(),
                "Server error: {}",
                message
            );
        } else if status == StatusCode::NOT_FOUND {
            debug!(
                error_type = error_type,
                status = status.as_u16(),
                "Resource not found: {}",
                message
            );
        } else {
            warn!(
                error_type = error_type,
                status = status.as_u16(),
                "Client error: {}",
                message
            );
        }

        let error_response = ErrorResponse::with_status(error_type, message, status);
        (status, Json(error_response)).into_response()
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// `GET /health`
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// `GET /documents`
pub async fn documents_handler<P, R>(
    State(state): State<AppState<P, R>>,
) -> Result<Json<DocumentsResponse>, ApiError>
where
    P: ImageSourceProvider + 'static,
    R: InferenceRuntime + 'static,
{
    let explorer = state.explorer.lock().await;
    let documents = explorer.documents()?.to_vec();
    Ok(Json(DocumentsResponse {
        count: documents.len(),
        documents,
    }))
}

/// `GET /documents/{index}`
pub async fn document_handler<P, R>(
    State(state): State<AppState<P, R>>,
    Path(index): Path<usize>,
) -> Result<Json<Document>, ApiError>
where
    P: ImageSourceProvider + 'static,
    R: InferenceRuntime + 'static,
{
    let explorer = state.explorer.lock().await;
    Ok(Json(explorer.document(index)?.clone()))
}

/// `GET /state`
pub async fn state_handler<P, R>(
    State(state): State<AppState<P, R>>,
) -> Result<Json<StateSnapshot>, ApiError>
where
    P: ImageSourceProvider + 'static,
    R: InferenceRuntime + 'static,
{
    let explorer = state.explorer.lock().await;
    Ok(Json(explorer.snapshot()?))
}

/// `PUT /state/focus`
pub async fn focus_handler<P, R>(
    State(state): State<AppState<P, R>>,
    Json(request): Json<FocusRequest>,
) -> Result<Json<StateSnapshot>, ApiError>
where
    P: ImageSourceProvider + 'static,
    R: InferenceRuntime + 'static,
{
    let mut explorer = state.explorer.lock().await;
    explorer.set_focus(request.index)?;
    Ok(Json(explorer.snapshot()?))
}

/// `PUT /state/compare`
pub async fn compare_handler<P, R>(
    State(state): State<AppState<P, R>>,
    Json(request): Json<CompareRequest>,
) -> Result<Json<StateSnapshot>, ApiError>
where
    P: ImageSourceProvider + 'static,
    R: InferenceRuntime + 'static,
{
    let mut explorer = state.explorer.lock().await;
    explorer.set_compare(request.indices)?;
    Ok(Json(explorer.snapshot()?))
}

/// `PUT /state/color-by`
pub async fn color_by_handler<P, R>(
    State(state): State<AppState<P, R>>,
    Json(request): Json<ColorByRequest>,
) -> Result<Json<StateSnapshot>, ApiError>
where
    P: ImageSourceProvider + 'static,
    R: InferenceRuntime + 'static,
{
    let mut explorer = state.explorer.lock().await;
    explorer.set_color_by(request.color_by)?;
    Ok(Json(explorer.snapshot()?))
}

/// `PUT /state/measure`
pub async fn measure_handler<P, R>(
    State(state): State<AppState<P, R>>,
    Json(request): Json<MeasureRequest>,
) -> Result<Json<StateSnapshot>, ApiError>
where
    P: ImageSourceProvider + 'static,
    R: InferenceRuntime + 'static,
{
    let mut explorer = state.explorer.lock().await;
    explorer.set_measure(request.measure)?;
    Ok(Json(explorer.snapshot()?))
}

/// `PUT /state/dataset`
///
/// Loads a catalog dataset from the data directory and makes it the
/// collection. Focus returns to the first document and comparisons are cleared.
pub async fn dataset_handler<P, R>(
    State(state): State<AppState<P, R>>,
    Json(request): Json<DatasetRequest>,
) -> Result<Json<StateSnapshot>, ApiError>
where
    P: ImageSourceProvider + 'static,
    R: InferenceRuntime + 'static,
{
    let mut config = DataConfig::from_catalog(&request.dataset, &state.data_dir)?;
    if request.color_by.is_some() {
        config = config.with_color_by(request.color_by);
    }
    let documents = config.load().await?;

    let mut explorer = state.explorer.lock().await;
    explorer.reload(config, documents)?;
    Ok(Json(explorer.snapshot()?))
}

/// `PUT /state/model`
///
/// Slides embedded afterwards use the new model; the collection is unchanged.
pub async fn model_handler<P, R>(
    State(state): State<AppState<P, R>>,
    Json(request): Json<ModelRequest>,
) -> Result<Json<StateSnapshot>, ApiError>
where
    P: ImageSourceProvider + 'static,
    R: InferenceRuntime + 'static,
{
    let mut explorer = state.explorer.lock().await;
    explorer.select_model(&request.model)?;
    Ok(Json(explorer.snapshot()?))
}

/// `GET /models`
pub async fn models_handler<P, R>(
    State(state): State<AppState<P, R>>,
) -> Result<Json<ModelsResponse>, ApiError>
where
    P: ImageSourceProvider + 'static,
    R: InferenceRuntime + 'static,
{
    let explorer = state.explorer.lock().await;
    Ok(Json(ModelsResponse {
        models: SUPPORTED_MODELS,
        selected: explorer.selected_model()?.name.to_string(),
    }))
}

/// `GET /views/table`
pub async fn table_handler<P, R>(
    State(state): State<AppState<P, R>>,
) -> Result<Json<RankedView>, ApiError>
where
    P: ImageSourceProvider + 'static,
    R: InferenceRuntime + 'static,
{
    let explorer = state.explorer.lock().await;
    Ok(Json(explorer.ranked_view()?.clone()))
}

/// `GET /views/explorer`
pub async fn explorer_view_handler<P, R>(
    State(state): State<AppState<P, R>>,
) -> Result<Json<ExplorerView>, ApiError>
where
    P: ImageSourceProvider + 'static,
    R: InferenceRuntime + 'static,
{
    let explorer = state.explorer.lock().await;
    Ok(Json(explorer.explorer_view()?.clone()))
}

/// `POST /slides/embed`
///
/// Samples tissue patches from the slide, embeds them and appends the mean
/// embedding as a new local document, which becomes the focus document.
pub async fn embed_slide_handler<P, R>(
    State(state): State<AppState<P, R>>,
    Json(request): Json<EmbedSlideRequest>,
) -> Result<(StatusCode, Json<EmbedSlideResponse>), ApiError>
where
    P: ImageSourceProvider + 'static,
    R: InferenceRuntime + 'static,
{
    let switch = state.embedder.as_ref().ok_or(ApiError::EmbeddingUnavailable)?;

    if request.label.is_null() {
        return Err(ApiError::InvalidRequest("a slide label is required".to_string()));
    }
    let label = match request.label {
        Value::String(text) => parse_label(&text),
        other => other,
    };
    let num_patches = request.num_patches.unwrap_or(state.default_num_patches);
    if num_patches == 0 {
        return Err(ApiError::InvalidRequest("numPatches must be positive".to_string()));
    }

    let url = resolve_slide_url(&request.slide)?;
    let mut rng = match request.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let embedder = switch.current().await;
    let slide = embedder.embed_slide(&url, num_patches, &mut rng).await?;
    let dimension = slide.vector.len();
    let patch_count = slide.patches.len();

    let index = {
        let mut explorer = state.explorer.lock().await;
        explorer.add_embedded_slide(slide.vector, url.clone(), label)?
    };
    info!(index = index, url = %url, patches = patch_count, "Slide added to collection");

    Ok((
        StatusCode::CREATED,
        Json(EmbedSlideResponse {
            index,
            source_ref: url,
            dimension,
            patch_count,
            regions: slide.regions,
        }),
    ))
}

/// `POST /peers/messages`
pub async fn peer_message_handler<P, R>(
    State(state): State<AppState<P, R>>,
    Json(message): Json<PeerMessage>,
) -> Result<(StatusCode, Json<AddedDocumentResponse>), ApiError>
where
    P: ImageSourceProvider + 'static,
    R: InferenceRuntime + 'static,
{
    let mut explorer = state.explorer.lock().await;
    let index = explorer.receive_peer_message(message)?;
    Ok((StatusCode::CREATED, Json(AddedDocumentResponse { index })))
}
