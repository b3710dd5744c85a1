//! Follows the selected encoder model.
//!
//! The explorer publishes its model selection on a watch channel. The switch
//! hands out the embedder for the currently selected model, building a new
//! engine against the model server on first use after a change. Open slide
//! handles and sampler settings carry over; embeddings already in the
//! collection are left as they are.

use std::sync::Arc;

use tokio::sync::{watch, RwLock};
use tracing::info;

use super::engine::InferenceRuntime;
use super::models::EncoderModel;
use super::pipeline::SlideEmbedder;
use crate::slide::ImageSourceProvider;

pub struct EmbedderSwitch<P: ImageSourceProvider, R: InferenceRuntime> {
    /// Model server the selected model is served from
    server_url: String,
    current: RwLock<Arc<SlideEmbedder<P, R>>>,
    selected: watch::Receiver<&'static EncoderModel>,
}

impl<P: ImageSourceProvider, R: InferenceRuntime> EmbedderSwitch<P, R> {
    pub fn new(
        embedder: SlideEmbedder<P, R>,
        server_url: impl Into<String>,
        selected: watch::Receiver<&'static EncoderModel>,
    ) -> Self {
        Self {
            server_url: server_url.into(),
            current: RwLock::new(Arc::new(embedder)),
            selected,
        }
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    /// The embedder for the selected model.
    ///
    /// Slides being embedded when the selection changes finish on the engine
    /// they started with.
    pub async fn current(&self) -> Arc<SlideEmbedder<P, R>> {
        let model: &'static EncoderModel = *self.selected.borrow();
        let url = model.endpoint(&self.server_url);

        {
            let current = self.current.read().await;
            if current.engine().model_url() == url {
                return Arc::clone(&current);
            }
        }

        let mut current = self.current.write().await;
        if current.engine().model_url() != url {
            info!(model = model.name, url = %url, "Switching encoder model");
            let engine = Arc::new(current.engine().for_model(url));
            *current = Arc::new(current.with_engine(engine));
        }
        Arc::clone(&current)
    }
}
