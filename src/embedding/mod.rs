//! Patch encoding and slide-level aggregation.
//!
//! Patches are normalized into tensors, passed through an encoder model
//! hosted by an [`InferenceRuntime`], and averaged into one vector per slide.

mod aggregate;
mod engine;
mod http_runtime;
mod models;
mod pipeline;
mod switch;
mod tensor;

pub use aggregate::{aggregate, mean_vector, PatchEmbedding};
pub use engine::{EmbeddingEngine, InferenceRuntime, ModelMetadata, DEFAULT_OUTPUT_NAME};
pub use http_runtime::{HttpInferenceRuntime, HttpSession, DEFAULT_REQUEST_TIMEOUT};
pub use models::{default_model, find_model, EncoderModel, SUPPORTED_MODELS};
pub use pipeline::{SlideEmbedder, SlideEmbedding};
pub use switch::EmbedderSwitch;
pub use tensor::{Preprocessor, Tensor, TensorLayout, IMAGENET_MEAN, IMAGENET_STD};
