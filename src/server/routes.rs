//! Router configuration for the explorer API.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                 - Health check
//! GET  /documents              - Document collection
//! GET  /documents/{index}      - Single document
//! GET  /state                  - Explorer state snapshot
//! PUT  /state/focus            - Select the focus document
//! PUT  /state/compare          - Select the compared documents
//! PUT  /state/color-by         - Select the color property
//! PUT  /state/measure          - Select the similarity measure
//! PUT  /state/dataset          - Load a catalog dataset
//! PUT  /state/model            - Select the encoder model
//! GET  /models                 - Supported encoder models
//! GET  /views/table            - Ranked table view
//! GET  /views/explorer         - Point cloud view
//! POST /slides/embed           - Embed a slide into the collection
//! POST /peers/messages         - Apply a peer message
//! ```

use std::time::Duration;

use axum::{
    routing::{get, post, put},
    Router,
};
use http::header::{ACCEPT, CONTENT_TYPE};
use http::Method;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers::{
    color_by_handler, compare_handler, dataset_handler, document_handler, documents_handler,
    embed_slide_handler, explorer_view_handler, focus_handler, health_handler, measure_handler,
    model_handler, models_handler, peer_message_handler, state_handler, table_handler, AppState,
};
use crate::embedding::InferenceRuntime;
use crate::slide::ImageSourceProvider;

// =============================================================================
// Router Options
// =============================================================================

/// Cross-origin and tracing options for [`create_router`].
///
/// The explorer front end is usually served from another origin than the API,
/// so CORS is open unless a list of origins is given.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Origins allowed to call the API. `None` allows every origin.
    pub cors_origins: Option<Vec<String>>,

    /// Wrap the router in a `TraceLayer`.
    pub enable_tracing: bool,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl RouterConfig {
    /// Open CORS, tracing on.
    pub fn new() -> Self {
        Self {
            cors_origins: None,
            enable_tracing: true,
        }
    }

    /// Restrict CORS to `origins`. An empty list rejects every cross-origin call.
    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = Some(origins);
        self
    }

    pub fn with_cors_any_origin(mut self) -> Self {
        self.cors_origins = None;
        self
    }

    pub fn with_tracing(mut self, enabled: bool) -> Self {
        self.enable_tracing = enabled;
        self
    }
}

// =============================================================================
// Router
// =============================================================================

/// Build the explorer API over `state`.
///
/// Handlers are monomorphized for the image source `P` and inference runtime
/// `R` of the embedding pipeline, even when no pipeline is configured.
pub fn create_router<P, R>(state: AppState<P, R>, config: RouterConfig) -> Router
where
    P: ImageSourceProvider + 'static,
    R: InferenceRuntime + 'static,
{
    let router = Router::new()
        .route("/health", get(health_handler))
        .route("/documents", get(documents_handler::<P, R>))
        .route("/documents/{index}", get(document_handler::<P, R>))
        .route("/state", get(state_handler::<P, R>))
        .route("/state/focus", put(focus_handler::<P, R>))
        .route("/state/compare", put(compare_handler::<P, R>))
        .route("/state/color-by", put(color_by_handler::<P, R>))
        .route("/state/measure", put(measure_handler::<P, R>))
        .route("/state/dataset", put(dataset_handler::<P, R>))
        .route("/state/model", put(model_handler::<P, R>))
        .route("/models", get(models_handler::<P, R>))
        .route("/views/table", get(table_handler::<P, R>))
        .route("/views/explorer", get(explorer_view_handler::<P, R>))
        .route("/slides/embed", post(embed_slide_handler::<P, R>))
        .route("/peers/messages", post(peer_message_handler::<P, R>))
        .with_state(state)
        .layer(cors_layer(config.cors_origins.as_deref()));

    if config.enable_tracing {
        router.layer(TraceLayer::new_for_http())
    } else {
        router
    }
}

/// CORS for JSON reads and state updates. Unparseable origins are skipped.
fn cors_layer(origins: Option<&[String]>) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::PUT, Method::POST, Method::OPTIONS])
        .allow_headers([ACCEPT, CONTENT_TYPE])
        .max_age(Duration::from_secs(24 * 60 * 60));

    match origins {
        None => cors.allow_origin(Any),
        Some([]) => cors,
        Some(origins) => {
            let allowed: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
            cors.allow_origin(allowed)
        }
    }
}
