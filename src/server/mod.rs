//! HTTP server layer.
//!
//! Exposes the explorer state, its derived views and the slide embedding
//! pipeline as a JSON API.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         HTTP Layer                              │
//! │  ┌──────────────────────────┐   ┌────────────────────────────┐  │
//! │  │        handlers          │   │          routes            │  │
//! │  │ (requests, error mapping)│   │ (router config, CORS)      │  │
//! │  └─────────────┬────────────┘   └────────────────────────────┘  │
//! └────────────────┼────────────────────────────────────────────────┘
//!                  │
//!        ┌─────────┴──────────┐
//!        ▼                    ▼
//!    Explorer           SlideEmbedder
//!   (behind lock)      (no lock held)
//! ```

pub mod handlers;
pub mod routes;

pub use handlers::{
    health_handler, AddedDocumentResponse, AppState, ColorByRequest, CompareRequest,
    DatasetRequest, DocumentsResponse, EmbedSlideRequest, EmbedSlideResponse, ErrorResponse,
    FocusRequest, HealthResponse, MeasureRequest, ModelRequest, ModelsResponse,
    DEFAULT_NUM_PATCHES,
};
pub use routes::{create_router, RouterConfig};
