//! Embedding explorer.
//!
//! Holds the document collection and the interactive state around it: the
//! focus document, the compared documents, the color property and the
//! similarity measure. Every change flows through the state store, which
//! keeps the ranked table and the point cloud view current.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          Explorer                            │
//! │   set_focus / set_compare / set_color_by / set_measure       │
//! │   add_document / receive_peer_message                        │
//! └───────────────┬───────────────────────────────┬──────────────┘
//!                 │                               │
//!                 ▼                               ▼
//! ┌───────────────────────────────┐   ┌──────────────────────────┐
//! │          StateStore           │   │  broadcast<SyncEvent>    │
//! │ documents, focus, compare ... │   │   (local commits only)   │
//! └───────┬───────────────┬───────┘   └──────────────────────────┘
//!         │               │
//!         ▼               ▼
//!   RankedView      ExplorerView
//!   (ranker)        (ColorScale, highlighting)
//! ```

mod app;
mod color;
mod dataset;
mod document;
mod sync;
mod view;

pub use app::{keys, parse_label, Explorer, Origin, StateSnapshot, DEFAULT_LABEL_PROPERTY, SYNC_CHANNEL_CAPACITY};
pub use color::{color_index, Color, ColorScale, LegendEntry, JET_COLORMAP, MIN_OPACITY};
pub use dataset::{find_dataset, resolve_slide_url, DataConfig, DatasetConfig, EXAMPLE_DATASETS, GDC_DATA_URL};
pub use document::{load_documents, parse_documents, project_3d, Document};
pub use sync::{PeerMessage, SyncEvent};
pub use view::{
    ExplorerPoint, ExplorerView, DEFAULT_POINT_SIZE, HIGHLIGHT_BORDER_WIDTH, HIGHLIGHT_POINT_SIZE,
};
