//! Explorer controller.
//!
//! Owns the state store and wires the dependencies between entries:
//!
//! ```text
//! documents ──► colorByOptions, explorerView, focusDocument (first load)
//! focusDocument ──► rankedView ──► compareDocument = [top row]
//! measure ──► rankedView ──► compareDocument = [top row]
//! compareDocument, colorBy ──► explorerView
//! dataConfig ──► focusDocument = none, compareDocument = [], colorBy
//! selectedModel ──► model watch channel (encoder swap)
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use super::dataset::DataConfig;
use super::document::Document;
use super::sync::{PeerMessage, SyncEvent};
use super::view::ExplorerView;
use crate::embedding::{default_model, find_model, EncoderModel};
use crate::error::{ExplorerError, VectorError};
use crate::similarity::{rank, Measure, RankedView};
use crate::state::{StateKey, StateStore, SubscriberResult};

// =============================================================================
// State Keys
// =============================================================================

pub mod keys {
    use super::*;

    pub const DOCUMENTS: StateKey<Vec<Document>> = StateKey::new("documents");
    pub const FOCUS_DOCUMENT: StateKey<Option<usize>> = StateKey::new("focusDocument");
    pub const COMPARE_DOCUMENT: StateKey<Vec<usize>> = StateKey::new("compareDocument");
    pub const COLOR_BY: StateKey<Option<String>> = StateKey::new("colorBy");
    pub const COLOR_BY_OPTIONS: StateKey<Vec<String>> = StateKey::new("colorByOptions");
    pub const MEASURE: StateKey<Measure> = StateKey::new("measure");
    pub const RANKED_VIEW: StateKey<RankedView> = StateKey::new("rankedView");
    pub const EXPLORER_VIEW: StateKey<ExplorerView> = StateKey::new("explorerView");
    pub const DATA_CONFIG: StateKey<Option<DataConfig>> = StateKey::new("dataConfig");
    pub const SELECTED_MODEL: StateKey<&'static EncoderModel> = StateKey::new("selectedModel");
}

use keys::*;

/// Capacity of the sync event channel.
pub const SYNC_CHANNEL_CAPACITY: usize = 64;

/// Property a slide label is stored under when no color property is selected.
pub const DEFAULT_LABEL_PROPERTY: &str = "label";

/// Where a new document comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    /// Embedded by this instance; announced to peers
    Local,

    /// Received from a peer; never re-announced
    Peer { from: Option<String> },
}

/// Scalar explorer state, as reported to clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateSnapshot {
    pub document_count: usize,
    pub focus_document: Option<usize>,
    pub compare_document: Vec<usize>,
    pub color_by: Option<String>,
    pub color_by_options: Vec<String>,
    pub measure: Measure,
    pub data_config: Option<DataConfig>,
    pub selected_model: String,
}

/// The document explorer: collection, focus, comparison and derived views.
pub struct Explorer {
    store: StateStore,
    events: broadcast::Sender<SyncEvent>,
    model: Arc<watch::Sender<&'static EncoderModel>>,
}

impl Explorer {
    /// Create an explorer over `documents`, colored by `color_by`.
    ///
    /// Documents are re-indexed in the given order and the first one becomes
    /// the focus document.
    pub fn new(documents: Vec<Document>, color_by: Option<String>) -> Result<Self, ExplorerError> {
        let mut store = StateStore::new();

        store.declare(&DOCUMENTS, Vec::new())?;
        store.declare(&FOCUS_DOCUMENT, None)?;
        store.declare(&COMPARE_DOCUMENT, Vec::new())?;
        store.declare(&COLOR_BY, color_by)?;
        store.declare(&COLOR_BY_OPTIONS, Vec::new())?;
        store.declare(&MEASURE, Measure::default())?;
        store.declare(&RANKED_VIEW, RankedView::default())?;
        store.declare(&EXPLORER_VIEW, ExplorerView::default())?;
        store.declare(&DATA_CONFIG, None)?;
        store.declare(&SELECTED_MODEL, default_model())?;

        store.subscribe(&DOCUMENTS, refresh_color_by_options)?;
        store.subscribe(&DOCUMENTS, refresh_explorer_view)?;
        store.subscribe(&DOCUMENTS, focus_first_document)?;
        store.subscribe(&FOCUS_DOCUMENT, refresh_ranking)?;
        store.subscribe(&MEASURE, refresh_ranking)?;
        store.subscribe(&COMPARE_DOCUMENT, refresh_explorer_view)?;
        store.subscribe(&COLOR_BY, refresh_explorer_view)?;
        store.subscribe(&DATA_CONFIG, reset_for_data_config)?;

        let model = Arc::new(watch::channel(default_model()).0);
        let publisher = model.clone();
        store.subscribe(&SELECTED_MODEL, move |store| {
            let selected = store.get(&SELECTED_MODEL)?;
            publisher.send_replace(selected);
            Ok(())
        })?;

        let (events, _) = broadcast::channel(SYNC_CHANNEL_CAPACITY);
        let mut explorer = Self { store, events, model };

        let documents = reindex(documents);
        info!(count = documents.len(), "Explorer initialized");
        explorer.store.set(&DOCUMENTS, documents)?;

        Ok(explorer)
    }

    /// Create an explorer over the collection described by `config`.
    pub fn from_data_config(config: DataConfig, documents: Vec<Document>) -> Result<Self, ExplorerError> {
        let mut explorer = Self::new(Vec::new(), None)?;
        explorer.reload(config, documents)?;
        Ok(explorer)
    }

    /// Receive [`SyncEvent`]s for locally committed changes.
    pub fn subscribe_sync(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    /// Follow the selected encoder model.
    pub fn watch_model(&self) -> watch::Receiver<&'static EncoderModel> {
        self.model.subscribe()
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn documents(&self) -> Result<&[Document], ExplorerError> {
        Ok(self.store.get_ref(&DOCUMENTS)?.as_slice())
    }

    pub fn document(&self, index: usize) -> Result<&Document, ExplorerError> {
        self.documents()?
            .get(index)
            .ok_or(ExplorerError::DocumentNotFound(index))
    }

    pub fn focus(&self) -> Result<Option<usize>, ExplorerError> {
        Ok(self.store.get(&FOCUS_DOCUMENT)?)
    }

    pub fn ranked_view(&self) -> Result<&RankedView, ExplorerError> {
        Ok(self.store.get_ref(&RANKED_VIEW)?)
    }

    pub fn explorer_view(&self) -> Result<&ExplorerView, ExplorerError> {
        Ok(self.store.get_ref(&EXPLORER_VIEW)?)
    }

    pub fn snapshot(&self) -> Result<StateSnapshot, ExplorerError> {
        Ok(StateSnapshot {
            document_count: self.documents()?.len(),
            focus_document: self.store.get(&FOCUS_DOCUMENT)?,
            compare_document: self.store.get(&COMPARE_DOCUMENT)?,
            color_by: self.store.get(&COLOR_BY)?,
            color_by_options: self.store.get(&COLOR_BY_OPTIONS)?,
            measure: self.store.get(&MEASURE)?,
            data_config: self.store.get(&DATA_CONFIG)?,
            selected_model: self.selected_model()?.name.to_string(),
        })
    }

    /// Make the document at `index` the focus document.
    pub fn set_focus(&mut self, index: usize) -> Result<(), ExplorerError> {
        self.document(index)?;
        self.store.set(&FOCUS_DOCUMENT, Some(index))?;
        Ok(())
    }

    /// Replace the set of compared documents.
    pub fn set_compare(&mut self, indices: Vec<usize>) -> Result<(), ExplorerError> {
        for &index in &indices {
            self.document(index)?;
        }
        self.store.set(&COMPARE_DOCUMENT, indices)?;
        Ok(())
    }

    /// Color points by `property`, or uniformly with `None`.
    pub fn set_color_by(&mut self, property: Option<String>) -> Result<(), ExplorerError> {
        if let Some(ref name) = property {
            let options = self.store.get_ref(&COLOR_BY_OPTIONS)?;
            if !options.contains(name) {
                return Err(ExplorerError::UnknownProperty(name.clone()));
            }
        }
        self.store.set(&COLOR_BY, property)?;
        Ok(())
    }

    pub fn set_measure(&mut self, measure: Measure) -> Result<(), ExplorerError> {
        self.store.set(&MEASURE, measure)?;
        Ok(())
    }

    /// Replace the whole collection with the documents of another dataset.
    ///
    /// Focus, comparison and coloring start over: the first document becomes
    /// the focus and points are colored by the dataset's color property when
    /// its documents carry it. Documents are re-indexed in the given order.
    pub fn reload(&mut self, mut config: DataConfig, documents: Vec<Document>) -> Result<(), ExplorerError> {
        if let Some(property) = config.color_by.take() {
            let known = documents
                .first()
                .is_some_and(|doc| doc.properties.contains_key(&property));
            if known {
                config.color_by = Some(property);
            } else {
                warn!(property = %property, "Dataset has no such property; points left uncolored");
            }
        }

        let documents = reindex(documents);
        info!(
            dataset = ?config.id,
            path = %config.path.display(),
            count = documents.len(),
            "Reloading collection"
        );
        self.store.set(&DATA_CONFIG, Some(config))?;
        self.store.set(&DOCUMENTS, documents)?;
        Ok(())
    }

    pub fn data_config(&self) -> Result<Option<&DataConfig>, ExplorerError> {
        Ok(self.store.get_ref(&DATA_CONFIG)?.as_ref())
    }

    /// Select the encoder new slides are embedded with.
    ///
    /// # Errors
    ///
    /// [`ExplorerError::UnknownModel`] for names or ids not in the catalog,
    /// [`ExplorerError::ModelDisabled`] for models that cannot be used yet.
    pub fn select_model(&mut self, name_or_id: &str) -> Result<&'static EncoderModel, ExplorerError> {
        let model = find_model(name_or_id).ok_or_else(|| ExplorerError::UnknownModel(name_or_id.to_string()))?;
        if !model.enabled {
            return Err(ExplorerError::ModelDisabled(model.name.to_string()));
        }
        if self.selected_model()?.id != model.id {
            info!(model = model.name, "Encoder model selected");
            self.store.set(&SELECTED_MODEL, model)?;
        }
        Ok(model)
    }

    pub fn selected_model(&self) -> Result<&'static EncoderModel, ExplorerError> {
        Ok(self.store.get(&SELECTED_MODEL)?)
    }

    /// Append a document and focus it.
    ///
    /// Locally produced documents are announced on the sync channel once
    /// committed. Returns the index assigned to the document.
    ///
    /// # Errors
    ///
    /// Returns [`ExplorerError::Vector`] if the embedding dimension differs
    /// from the collection's.
    pub fn add_document(&mut self, document: Document, origin: Origin) -> Result<usize, ExplorerError> {
        let documents = self.documents()?;
        if let Some(existing) = documents.first() {
            if existing.embedding.len() != document.embedding.len() {
                return Err(VectorError::DimensionMismatch {
                    left: existing.embedding.len(),
                    right: document.embedding.len(),
                }
                .into());
            }
        }

        let index = documents.len();
        let mut document = document;
        document.index = index;

        let announced = matches!(origin, Origin::Local).then(|| document.clone());
        self.store.update(&DOCUMENTS, move |docs| docs.push(document))?;
        self.store.set(&FOCUS_DOCUMENT, Some(index))?;

        match origin {
            Origin::Local => {
                if let Some(document) = announced {
                    if self.events.send(SyncEvent::NewPatchEmbedding(document)).is_err() {
                        debug!(index = index, "No peers listening for new embeddings");
                    }
                }
                info!(index = index, "Added local document");
            }
            Origin::Peer { from } => {
                info!(index = index, from = ?from, "Added peer document");
            }
        }

        Ok(index)
    }

    /// Add a freshly embedded slide labeled under the current color property.
    pub fn add_embedded_slide(
        &mut self,
        embedding: Vec<f32>,
        source_ref: impl Into<String>,
        label: Value,
    ) -> Result<usize, ExplorerError> {
        let property = self
            .store
            .get(&COLOR_BY)?
            .unwrap_or_else(|| DEFAULT_LABEL_PROPERTY.to_string());

        let mut properties = BTreeMap::new();
        properties.insert(property, label);

        let document = Document::new(embedding, properties).with_source_ref(source_ref);
        self.add_document(document, Origin::Local)
    }

    /// Apply a message received from a peer.
    pub fn receive_peer_message(&mut self, message: PeerMessage) -> Result<usize, ExplorerError> {
        match message {
            PeerMessage::NewPatchEmbedding { from, data } => self.add_document(data, Origin::Peer { from }),
        }
    }
}

/// Interpret a user-entered label the way the slide form does.
///
/// A label starting with an integer (after optional whitespace and sign) is
/// stored as that integer, so `"3+4"` becomes `3`. Anything else is kept as
/// trimmed text.
pub fn parse_label(raw: &str) -> Value {
    let trimmed = raw.trim();
    let unsigned = trimmed.strip_prefix(['+', '-']).unwrap_or(trimmed);
    let digits = unsigned.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        return Value::String(trimmed.to_string());
    }

    let sign_len = trimmed.len() - unsigned.len();
    match trimmed[..sign_len + digits].parse::<i64>() {
        Ok(number) => Value::from(number),
        Err(_) => Value::String(trimmed.to_string()),
    }
}

fn reindex(mut documents: Vec<Document>) -> Vec<Document> {
    for (i, doc) in documents.iter_mut().enumerate() {
        doc.index = i;
    }
    documents
}

// =============================================================================
// Subscribers
// =============================================================================

fn refresh_color_by_options(store: &mut StateStore) -> SubscriberResult {
    let options: Vec<String> = store
        .get_ref(&DOCUMENTS)?
        .first()
        .map(|doc| doc.properties.keys().cloned().collect())
        .unwrap_or_default();

    if *store.get_ref(&COLOR_BY_OPTIONS)? != options {
        store.set(&COLOR_BY_OPTIONS, options)?;
    }
    Ok(())
}

/// A new dataset invalidates every selection made on the previous one.
fn reset_for_data_config(store: &mut StateStore) -> SubscriberResult {
    let color_by = store
        .get_ref(&DATA_CONFIG)?
        .as_ref()
        .and_then(|config| config.color_by.clone());
    store.set(&FOCUS_DOCUMENT, None)?;
    store.set(&COMPARE_DOCUMENT, Vec::new())?;
    store.set(&COLOR_BY, color_by)?;
    Ok(())
}

fn focus_first_document(store: &mut StateStore) -> SubscriberResult {
    let has_documents = !store.get_ref(&DOCUMENTS)?.is_empty();
    if has_documents && store.get(&FOCUS_DOCUMENT)?.is_none() {
        store.set(&FOCUS_DOCUMENT, Some(0))?;
    }
    Ok(())
}

fn refresh_ranking(store: &mut StateStore) -> SubscriberResult {
    let focus = store.get(&FOCUS_DOCUMENT)?;
    let measure = store.get(&MEASURE)?;
    let documents = store.get_ref(&DOCUMENTS)?;

    let ranked = match focus.and_then(|i| documents.get(i)) {
        Some(focus_doc) => rank(documents, focus_doc, measure),
        None => Ok(RankedView::default()),
    };

    match ranked {
        Ok(view) => {
            let compare: Vec<usize> = view
                .default_selection()
                .map(|row| vec![row.document_index])
                .unwrap_or_default();
            store.set(&RANKED_VIEW, view)?;
            store.set(&COMPARE_DOCUMENT, compare)?;
            Ok(())
        }
        Err(e) => {
            store.set(&RANKED_VIEW, RankedView::default())?;
            store.set(&COMPARE_DOCUMENT, Vec::new())?;
            Err(e.into())
        }
    }
}

fn refresh_explorer_view(store: &mut StateStore) -> SubscriberResult {
    let view = {
        let documents = store.get_ref(&DOCUMENTS)?;
        let focus = store.get(&FOCUS_DOCUMENT)?;
        let compare = store.get_ref(&COMPARE_DOCUMENT)?;
        let color_by = store.get_ref(&COLOR_BY)?;
        ExplorerView::build(documents, focus, compare, color_by.as_deref())
    };
    store.set(&EXPLORER_VIEW, view)?;
    Ok(())
}
