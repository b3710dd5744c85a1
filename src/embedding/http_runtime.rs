//! Remote inference over the KServe v2 (Open Inference Protocol) REST API.
//!
//! The encoder runs in a model server (Triton, KServe, MLServer, ...). A model
//! is addressed by its endpoint, e.g. `http://localhost:8000/v2/models/ctranspath`:
//!
//! - `GET  {endpoint}` returns the model metadata (input name and shape)
//! - `POST {endpoint}/infer` runs one forward pass on FP32 tensors

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::engine::{InferenceRuntime, ModelMetadata};
use super::tensor::Tensor;
use crate::error::InferenceError;

/// Default timeout for a single HTTP call.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

// =============================================================================
// Wire Types
// =============================================================================

#[derive(Debug, Deserialize)]
struct ModelMetadataResponse {
    #[serde(default)]
    name: String,
    inputs: Vec<TensorMetadata>,
    #[serde(default)]
    outputs: Vec<TensorMetadata>,
}

#[derive(Debug, Deserialize)]
struct TensorMetadata {
    name: String,
    #[serde(default)]
    datatype: String,
    #[serde(default)]
    shape: Vec<i64>,
}

#[derive(Debug, Serialize)]
struct InferenceRequest<'a> {
    inputs: Vec<InferenceInput<'a>>,
}

#[derive(Debug, Serialize)]
struct InferenceInput<'a> {
    name: &'a str,
    shape: &'a [usize],
    datatype: &'static str,
    data: &'a [f32],
}

#[derive(Debug, Deserialize)]
struct InferenceResponse {
    outputs: Vec<InferenceOutput>,
}

#[derive(Debug, Deserialize)]
struct InferenceOutput {
    name: String,
    shape: Vec<usize>,
    data: Vec<f32>,
}

// =============================================================================
// Runtime
// =============================================================================

/// A model endpoint resolved by [`HttpInferenceRuntime::load_model`].
#[derive(Debug, Clone)]
pub struct HttpSession {
    model_name: String,
    infer_url: String,
}

impl HttpSession {
    pub fn model_name(&self) -> &str {
        &self.model_name
    }
}

/// [`InferenceRuntime`] backed by a KServe v2 model server.
#[derive(Debug, Clone)]
pub struct HttpInferenceRuntime {
    client: reqwest::Client,
}

impl HttpInferenceRuntime {
    /// Create a runtime with [`DEFAULT_REQUEST_TIMEOUT`].
    pub fn new() -> Result<Self, InferenceError> {
        Self::with_timeout(DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, InferenceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| InferenceError::Runtime(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// Use an existing client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl InferenceRuntime for HttpInferenceRuntime {
    type Session = HttpSession;

    async fn load_model(&self, url: &str) -> Result<(HttpSession, ModelMetadata), InferenceError> {
        let endpoint = url.trim_end_matches('/');
        let load_error = |message: String| InferenceError::Load {
            url: endpoint.to_string(),
            message,
        };

        let response = self
            .client
            .get(endpoint)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| load_error(e.to_string()))?;

        let metadata: ModelMetadataResponse = response
            .json()
            .await
            .map_err(|e| load_error(format!("invalid model metadata: {e}")))?;

        let input = metadata
            .inputs
            .into_iter()
            .next()
            .ok_or_else(|| load_error("model declares no inputs".to_string()))?;

        if !input.datatype.is_empty() && input.datatype != "FP32" {
            return Err(load_error(format!(
                "input {} has datatype {}, expected FP32",
                input.name, input.datatype
            )));
        }

        debug!(
            model = %metadata.name,
            input = %input.name,
            shape = ?input.shape,
            "Fetched model metadata"
        );

        let session = HttpSession {
            model_name: metadata.name,
            infer_url: format!("{endpoint}/infer"),
        };
        let metadata = ModelMetadata {
            input_name: input.name,
            input_shape: input.shape,
            outputs: metadata.outputs.into_iter().map(|o| o.name).collect(),
        };
        Ok((session, metadata))
    }

    async fn run(
        &self,
        session: &HttpSession,
        inputs: Vec<(String, Tensor)>,
    ) -> Result<HashMap<String, Tensor>, InferenceError> {
        let request = InferenceRequest {
            inputs: inputs
                .iter()
                .map(|(name, tensor)| InferenceInput {
                    name,
                    shape: tensor.shape(),
                    datatype: "FP32",
                    data: tensor.data(),
                })
                .collect(),
        };

        let response = self
            .client
            .post(&session.infer_url)
            .json(&request)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| InferenceError::Runtime(e.to_string()))?;

        let body: InferenceResponse = response
            .json()
            .await
            .map_err(|e| InferenceError::Runtime(format!("invalid inference response: {e}")))?;

        body.outputs
            .into_iter()
            .map(|output| {
                let tensor = Tensor::new(output.shape, output.data)
                    .map_err(|e| InferenceError::Runtime(format!("output {}: {e}", output.name)))?;
                Ok((output.name, tensor))
            })
            .collect()
    }
}
