//! Patch encoder wrapper.
//!
//! The engine owns one model, loaded at most once through an
//! [`InferenceRuntime`] and reused for every patch afterwards.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::{debug, info};

use super::tensor::Tensor;
use crate::error::InferenceError;

/// Output read from the model unless configured otherwise.
pub const DEFAULT_OUTPUT_NAME: &str = "embedding";

/// What a loaded model declares about its interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// Name of the single image input
    pub input_name: String,

    /// Declared input shape; `-1` marks a dynamic dimension
    pub input_shape: Vec<i64>,

    /// Names of the outputs the model produces
    pub outputs: Vec<String>,
}

impl ModelMetadata {
    /// Whether a tensor of `shape` fits the declared input.
    pub fn accepts(&self, shape: &[usize]) -> bool {
        self.input_shape.len() == shape.len()
            && self
                .input_shape
                .iter()
                .zip(shape)
                .all(|(&declared, &actual)| declared < 0 || declared as usize == actual)
    }
}

/// Executes encoder models.
#[async_trait]
pub trait InferenceRuntime: Send + Sync {
    /// Handle to a loaded model.
    type Session: Send + Sync + 'static;

    /// Load the model at `url` and report its interface.
    async fn load_model(&self, url: &str) -> Result<(Self::Session, ModelMetadata), InferenceError>;

    /// Run one forward pass with named inputs, returning named outputs.
    async fn run(
        &self,
        session: &Self::Session,
        inputs: Vec<(String, Tensor)>,
    ) -> Result<HashMap<String, Tensor>, InferenceError>;
}

struct LoadedModel<S> {
    session: S,
    metadata: ModelMetadata,
}

/// A lazily loaded encoder turning patch tensors into embedding vectors.
pub struct EmbeddingEngine<R: InferenceRuntime> {
    runtime: Arc<R>,
    model_url: String,
    output_name: String,
    model: OnceCell<LoadedModel<R::Session>>,
}

impl<R: InferenceRuntime> EmbeddingEngine<R> {
    pub fn new(runtime: R, model_url: impl Into<String>) -> Self {
        Self {
            runtime: Arc::new(runtime),
            model_url: model_url.into(),
            output_name: DEFAULT_OUTPUT_NAME.to_string(),
            model: OnceCell::new(),
        }
    }

    /// Read a differently named model output.
    pub fn with_output_name(mut self, name: impl Into<String>) -> Self {
        self.output_name = name.into();
        self
    }

    /// An unloaded engine for the model at `model_url`, sharing this engine's
    /// runtime and output name.
    pub fn for_model(&self, model_url: impl Into<String>) -> Self {
        Self {
            runtime: Arc::clone(&self.runtime),
            model_url: model_url.into(),
            output_name: self.output_name.clone(),
            model: OnceCell::new(),
        }
    }

    pub fn model_url(&self) -> &str {
        &self.model_url
    }

    pub fn is_loaded(&self) -> bool {
        self.model.initialized()
    }

    /// Metadata of the loaded model, if any.
    pub fn metadata(&self) -> Option<&ModelMetadata> {
        self.model.get().map(|model| &model.metadata)
    }

    /// Load the model if this engine has not done so yet.
    ///
    /// Concurrent callers share one load. A failed load is not remembered, so
    /// the next call tries again.
    pub async fn ensure_loaded(&self) -> Result<&ModelMetadata, InferenceError> {
        let model = self
            .model
            .get_or_try_init(|| async {
                info!(url = %self.model_url, "Loading encoder model");
                let (session, metadata) = self.runtime.load_model(&self.model_url).await?;
                info!(
                    url = %self.model_url,
                    input = %metadata.input_name,
                    shape = ?metadata.input_shape,
                    "Encoder model loaded"
                );
                Ok::<_, InferenceError>(LoadedModel { session, metadata })
            })
            .await?;
        Ok(&model.metadata)
    }

    /// Embed one preprocessed patch.
    ///
    /// # Errors
    ///
    /// - [`InferenceError::ModelNotLoaded`] before [`ensure_loaded`](Self::ensure_loaded)
    /// - [`InferenceError::ShapeMismatch`] if the tensor does not fit the model input
    /// - [`InferenceError::MissingOutput`] if the model did not produce the embedding
    pub async fn embed(&self, tensor: Tensor) -> Result<Vec<f32>, InferenceError> {
        let model = self.model.get().ok_or(InferenceError::ModelNotLoaded)?;

        if !model.metadata.accepts(tensor.shape()) {
            return Err(InferenceError::ShapeMismatch {
                expected: model.metadata.input_shape.clone(),
                actual: tensor.shape().to_vec(),
            });
        }

        let inputs = vec![(model.metadata.input_name.clone(), tensor)];
        let mut outputs = self.runtime.run(&model.session, inputs).await?;

        let output = outputs
            .remove(&self.output_name)
            .ok_or_else(|| InferenceError::MissingOutput {
                name: self.output_name.clone(),
            })?;

        debug!(dimension = output.len(), "Patch embedded");
        Ok(output.into_data())
    }
}
