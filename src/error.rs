use thiserror::Error;

/// Errors from vector arithmetic
#[derive(Debug, Clone, PartialEq, Error)]
pub enum VectorError {
    /// Operands have different lengths
    #[error("Dimension mismatch: {left} vs {right}")]
    DimensionMismatch { left: usize, right: usize },
}

/// Errors from the reactive state store
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    /// Key was read, set or subscribed before being declared
    #[error("Undeclared state key: {0}")]
    UndeclaredKey(String),

    /// Key was declared twice
    #[error("State key already declared: {0}")]
    AlreadyDeclared(String),

    /// Key holds a value of another type than the one requested
    #[error("State key {key} does not hold a value of type {expected}")]
    TypeMismatch { key: String, expected: &'static str },
}

/// Errors raised by an image source while opening a slide or fetching pixels
#[derive(Debug, Clone, Error)]
pub enum ImageSourceError {
    /// Slide does not exist at the given location
    #[error("Image not found: {0}")]
    NotFound(String),

    /// Network or storage failure while fetching a region
    #[error("Fetch failed: {0}")]
    Fetch(String),

    /// Returned bytes could not be decoded into a bitmap
    #[error("Failed to decode bitmap: {message}")]
    Decode { message: String },

    /// Request lies outside the image or has a zero dimension
    #[error("Invalid image request: {0}")]
    InvalidRequest(String),
}

/// Errors from patch sampling
#[derive(Debug, Clone, Error)]
pub enum SamplingError {
    /// Retry budget was spent before enough tissue patches were found
    #[error(
        "Sampling exhausted after {attempts} draws: collected {collected} of {requested} patches"
    )]
    SamplingExhausted {
        attempts: usize,
        collected: usize,
        requested: usize,
    },

    /// The image cannot hold a single patch
    #[error("Image {width}x{height} is smaller than patch size {patch_size}")]
    ImageTooSmall {
        width: u32,
        height: u32,
        patch_size: u32,
    },

    /// Image metadata could not be read
    #[error("Image source error: {0}")]
    Source(#[from] ImageSourceError),
}

/// Errors converting pixels to model input
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TensorError {
    /// Pixel buffer length is not 3·size²
    #[error("Invalid pixel buffer: expected {expected} values, got {actual}")]
    InvalidInput { expected: usize, actual: usize },
}

/// Errors from the inference runtime and embedding engine
#[derive(Debug, Clone, Error)]
pub enum InferenceError {
    /// `embed` was called before the model finished loading
    #[error("Model not loaded")]
    ModelNotLoaded,

    /// The model could not be fetched or initialized
    #[error("Failed to load model {url}: {message}")]
    Load { url: String, message: String },

    /// Input tensor does not match the model's declared input shape
    #[error("Tensor shape {actual:?} does not match model input {expected:?}")]
    ShapeMismatch {
        expected: Vec<i64>,
        actual: Vec<usize>,
    },

    /// The model returned no output with the expected name
    #[error("Model output '{name}' missing")]
    MissingOutput { name: String },

    /// Inference call failed
    #[error("Inference failed: {0}")]
    Runtime(String),
}

/// Errors that abort a slide embedding
#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    #[error("Image source error: {0}")]
    Source(#[from] ImageSourceError),

    #[error("Sampling error: {0}")]
    Sampling(#[from] SamplingError),

    #[error("Tensor error: {0}")]
    Tensor(#[from] TensorError),

    #[error("Inference error: {0}")]
    Inference(#[from] InferenceError),

    #[error("Vector error: {0}")]
    Vector(#[from] VectorError),

    /// No tissue patch was embedded; an empty aggregate is not a slide embedding
    #[error("No valid patches were embedded for {url}")]
    NoValidPatches { url: String },
}

/// Errors loading a document dataset
#[derive(Debug, Clone, Error)]
pub enum DatasetError {
    #[error("I/O error reading {path}: {message}")]
    Io { path: String, message: String },

    #[error("Invalid dataset JSON: {0}")]
    Parse(String),

    /// Archive-delivered datasets must be unpacked before loading
    #[error("Compressed datasets are not supported: {0}")]
    UnsupportedArchive(String),

    #[error("Unknown dataset: {0}")]
    UnknownDataset(String),

    #[error("Invalid slide URL {url}: {message}")]
    InvalidUrl { url: String, message: String },
}

/// Errors from explorer state transitions
#[derive(Debug, Clone, Error)]
pub enum ExplorerError {
    #[error("State error: {0}")]
    State(#[from] StateError),

    #[error("Vector error: {0}")]
    Vector(#[from] VectorError),

    #[error("Document not found: {0}")]
    DocumentNotFound(usize),

    #[error("Unknown property: {0}")]
    UnknownProperty(String),

    #[error("Unknown encoder model: {0}")]
    UnknownModel(String),

    #[error("Encoder model is not available yet: {0}")]
    ModelDisabled(String),
}

/// Errors returned by the HTTP API
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    #[error(transparent)]
    Explorer(#[from] ExplorerError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Dataset(#[from] DatasetError),

    /// The server was started without an inference endpoint
    #[error("Slide embedding is not configured on this server")]
    EmbeddingUnavailable,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}
