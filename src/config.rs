//! Command-line configuration.
//!
//! Every option can also be set through an environment variable with the
//! `SLIDE_EXPLORER_` prefix.
//!
//! # Commands
//!
//! - `serve` - Load a document collection and serve the explorer API
//! - `embed` - Embed one slide and print the result as JSON
//! - `rank` - Print a collection ranked against one of its documents
//!
//! # Environment Variables
//!
//! - `SLIDE_EXPLORER_HOST` - Server bind address (default: 0.0.0.0)
//! - `SLIDE_EXPLORER_PORT` - Server port (default: 3000)
//! - `SLIDE_EXPLORER_DOCUMENTS` - Path of a JSON document collection
//! - `SLIDE_EXPLORER_DATASET` - Id of a built-in dataset
//! - `SLIDE_EXPLORER_DATA_DIR` - Directory holding downloaded datasets
//! - `SLIDE_EXPLORER_INFERENCE_URL` - Base URL of a KServe v2 model server
//! - `SLIDE_EXPLORER_MODEL` - Encoder model name or id (default: CTransPath)
//! - `SLIDE_EXPLORER_TILE_SERVER` - Base URL of a slide tile server
//! - `SLIDE_EXPLORER_CORS_ORIGINS` - Allowed CORS origins (comma-separated)

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::embedding::{find_model, EncoderModel, TensorLayout};
use crate::explorer::{find_dataset, DataConfig};
use crate::similarity::Measure;
use crate::slide::DEFAULT_HANDLE_CAPACITY;
use crate::tissue::{
    DetectorConfig, SamplerConfig, DEFAULT_BACKGROUND_LEVEL, DEFAULT_EMPTY_THRESHOLD,
    DEFAULT_PATCH_SIZE,
};

// =============================================================================
// Default Values
// =============================================================================

/// Default server host.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default server port.
pub const DEFAULT_PORT: u16 = 3000;

/// Default directory of downloaded datasets.
pub const DEFAULT_DATA_DIR: &str = "data";

/// Default encoder model.
pub const DEFAULT_MODEL: &str = "CTransPath";

/// Default number of rows printed by `rank`.
pub const DEFAULT_RANK_LIMIT: usize = 10;

// =============================================================================
// CLI Structure
// =============================================================================

/// Slide Explorer - embed Whole Slide Images and explore embeddings by similarity.
#[derive(Parser, Debug, Clone)]
#[command(name = "slide-explorer")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn into_command(self) -> Command {
        self.command
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Serve the explorer API over a document collection
    Serve(ServeConfig),

    /// Embed a single slide and print the embedding as JSON
    Embed(EmbedConfig),

    /// Rank a document collection against one of its documents
    Rank(RankConfig),
}

// =============================================================================
// Shared Arguments
// =============================================================================

/// Where the document collection comes from.
#[derive(Args, Debug, Clone)]
pub struct DatasetArgs {
    /// Path of a JSON document collection.
    #[arg(long, env = "SLIDE_EXPLORER_DOCUMENTS", conflicts_with = "dataset")]
    pub documents: Option<PathBuf>,

    /// Id of a built-in dataset, read from --data-dir.
    #[arg(long, env = "SLIDE_EXPLORER_DATASET")]
    pub dataset: Option<String>,

    /// Directory holding downloaded (and unpacked) datasets.
    #[arg(long, default_value = DEFAULT_DATA_DIR, env = "SLIDE_EXPLORER_DATA_DIR")]
    pub data_dir: PathBuf,
}

impl DatasetArgs {
    /// Resolve the collection file to load.
    pub fn path(&self) -> Result<PathBuf, String> {
        match (&self.documents, &self.dataset) {
            (Some(path), _) => Ok(path.clone()),
            (None, Some(id)) => find_dataset(id)
                .map(|dataset| dataset.local_path(&self.data_dir))
                .map_err(|e| e.to_string()),
            (None, None) => Err(
                "No document collection given. Set --documents or --dataset".to_string(),
            ),
        }
    }

    /// The collection to load first.
    pub fn data_config(&self) -> Result<DataConfig, String> {
        match (&self.documents, &self.dataset) {
            (Some(path), _) => Ok(DataConfig::from_path(path.clone())),
            (None, Some(id)) => {
                DataConfig::from_catalog(id, &self.data_dir).map_err(|e| e.to_string())
            }
            (None, None) => Err(
                "No document collection given. Set --documents or --dataset".to_string(),
            ),
        }
    }

    /// Color property a built-in dataset is shown with by default.
    pub fn default_color_by(&self) -> Option<String> {
        if self.documents.is_some() {
            return None;
        }
        self.dataset
            .as_deref()
            .and_then(|id| find_dataset(id).ok())
            .and_then(|dataset| dataset.color_by)
            .map(str::to_string)
    }
}

/// Model server and patch sampling options.
#[derive(Args, Debug, Clone)]
pub struct InferenceArgs {
    /// Base URL of a KServe v2 model server (e.g. http://localhost:8000).
    #[arg(long, env = "SLIDE_EXPLORER_INFERENCE_URL")]
    pub inference_url: Option<String>,

    /// Encoder model name or id.
    #[arg(long, default_value = DEFAULT_MODEL, env = "SLIDE_EXPLORER_MODEL")]
    pub model: String,

    /// Base URL of a slide tile server. Slides are then read tile by tile
    /// instead of being downloaded whole.
    #[arg(long, env = "SLIDE_EXPLORER_TILE_SERVER")]
    pub tile_server: Option<String>,

    /// Patches sampled per slide (defaults to the model's own default).
    #[arg(long, env = "SLIDE_EXPLORER_NUM_PATCHES")]
    pub num_patches: Option<usize>,

    /// Edge length of sampled patches in full-resolution pixels.
    #[arg(long, default_value_t = DEFAULT_PATCH_SIZE, env = "SLIDE_EXPLORER_PATCH_SIZE")]
    pub patch_size: u32,

    /// Fraction of background pixels above which a patch is empty.
    #[arg(long, default_value_t = DEFAULT_EMPTY_THRESHOLD, env = "SLIDE_EXPLORER_EMPTY_THRESHOLD")]
    pub empty_threshold: f32,

    /// Channel value above which a pixel counts as background.
    #[arg(long, default_value_t = DEFAULT_BACKGROUND_LEVEL, env = "SLIDE_EXPLORER_BACKGROUND_LEVEL")]
    pub background_level: u8,

    /// Send tensors channel-planar (NCHW) instead of interleaved.
    #[arg(long, default_value_t = false)]
    pub planar: bool,
}

impl InferenceArgs {
    /// The selected encoder.
    pub fn encoder(&self) -> Result<&'static EncoderModel, String> {
        let model = find_model(&self.model).ok_or_else(|| format!("Unknown model '{}'", self.model))?;
        if !model.enabled {
            return Err(format!("Model '{}' is not available yet", model.name));
        }
        Ok(model)
    }

    /// Patches per slide, falling back to the model default.
    pub fn num_patches_or(&self, fallback: usize) -> usize {
        self.num_patches
            .or_else(|| self.encoder().ok().and_then(|m| m.default_num_patches))
            .unwrap_or(fallback)
    }

    pub fn layout(&self) -> TensorLayout {
        if self.planar {
            TensorLayout::Planar
        } else {
            TensorLayout::Interleaved
        }
    }

    pub fn sampler_config(&self) -> SamplerConfig {
        SamplerConfig {
            patch_size: self.patch_size,
            empty_threshold: self.empty_threshold,
            background_level: self.background_level,
            ..SamplerConfig::default()
        }
    }

    pub fn detector_config(&self) -> DetectorConfig {
        DetectorConfig {
            background_level: self.background_level,
            ..DetectorConfig::default()
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        self.encoder()?;

        if let Some(ref url) = self.inference_url {
            url::Url::parse(url).map_err(|e| format!("Invalid inference URL '{}': {}", url, e))?;
        }
        if let Some(ref url) = self.tile_server {
            url::Url::parse(url).map_err(|e| format!("Invalid tile server URL '{}': {}", url, e))?;
        }
        if self.num_patches == Some(0) {
            return Err("num_patches must be greater than 0".to_string());
        }
        if self.patch_size == 0 {
            return Err("patch_size must be greater than 0".to_string());
        }
        if !(0.0..=1.0).contains(&self.empty_threshold) {
            return Err("empty_threshold must be between 0 and 1".to_string());
        }
        Ok(())
    }
}

// =============================================================================
// Serve Command
// =============================================================================

#[derive(Args, Debug, Clone)]
pub struct ServeConfig {
    /// Host address to bind the server to.
    #[arg(long, default_value = DEFAULT_HOST, env = "SLIDE_EXPLORER_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "SLIDE_EXPLORER_PORT")]
    pub port: u16,

    #[command(flatten)]
    pub dataset: DatasetArgs,

    /// Property the points are colored by initially.
    #[arg(long, env = "SLIDE_EXPLORER_COLOR_BY")]
    pub color_by: Option<String>,

    #[command(flatten)]
    pub inference: InferenceArgs,

    /// Maximum number of opened slides kept in memory.
    #[arg(long, default_value_t = DEFAULT_HANDLE_CAPACITY, env = "SLIDE_EXPLORER_CACHE_SLIDES")]
    pub cache_slides: usize,

    /// Name this instance signs its peer messages with.
    #[arg(long, env = "SLIDE_EXPLORER_PEER_NAME")]
    pub peer_name: Option<String>,

    /// Allowed CORS origins (comma-separated). Any origin if not specified.
    #[arg(long, env = "SLIDE_EXPLORER_CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Option<Vec<String>>,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// Disable request tracing.
    #[arg(long, default_value_t = false)]
    pub no_tracing: bool,
}

impl ServeConfig {
    pub fn validate(&self) -> Result<(), String> {
        self.dataset.path()?;
        self.inference.validate()?;

        if self.cache_slides == 0 {
            return Err("cache_slides must be greater than 0".to_string());
        }
        Ok(())
    }

    /// Get the server bind address as "host:port".
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Initial color property: explicit option first, then the dataset default.
    pub fn initial_color_by(&self) -> Option<String> {
        self.color_by
            .clone()
            .or_else(|| self.dataset.default_color_by())
    }
}

// =============================================================================
// Embed Command
// =============================================================================

#[derive(Args, Debug, Clone)]
pub struct EmbedConfig {
    /// Slide URL, local image path or GDC file id.
    pub slide: String,

    #[command(flatten)]
    pub inference: InferenceArgs,

    /// Seed for reproducible patch draws.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Include per-patch embeddings in the output.
    #[arg(long, default_value_t = false)]
    pub patches: bool,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl EmbedConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.slide.trim().is_empty() {
            return Err("A slide reference is required".to_string());
        }
        if self.inference.inference_url.is_none() {
            return Err(
                "No model server configured. Set --inference-url or SLIDE_EXPLORER_INFERENCE_URL"
                    .to_string(),
            );
        }
        self.inference.validate()
    }
}

// =============================================================================
// Rank Command
// =============================================================================

#[derive(Args, Debug, Clone)]
pub struct RankConfig {
    #[command(flatten)]
    pub dataset: DatasetArgs,

    /// Index of the document to rank against.
    #[arg(long, default_value_t = 0)]
    pub focus: usize,

    /// Similarity measure (cosine_similarity or euclidean_distance).
    #[arg(long, default_value_t = Measure::CosineSimilarity)]
    pub measure: Measure,

    /// Number of rows to print.
    #[arg(long, default_value_t = DEFAULT_RANK_LIMIT)]
    pub limit: usize,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl RankConfig {
    pub fn validate(&self) -> Result<(), String> {
        self.dataset.path()?;
        if self.limit == 0 {
            return Err("limit must be greater than 0".to_string());
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
