//! Built-in dataset catalog and slide location resolution.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use super::document::{load_documents, Document};
use crate::error::DatasetError;

/// Base URL of the GDC data endpoint bare file ids resolve against.
pub const GDC_DATA_URL: &str = "https://api.gdc.cancer.gov/data/";

/// A published embedding dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetConfig {
    pub id: &'static str,

    /// Where the dataset is published
    pub path: &'static str,

    /// Property the points are colored by initially
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color_by: Option<&'static str>,
}

impl DatasetConfig {
    /// Whether the published file is a zip archive.
    pub fn is_archive(&self) -> bool {
        self.path.to_ascii_lowercase().ends_with(".zip")
    }

    /// File name of the published dataset.
    pub fn file_name(&self) -> &'static str {
        self.path.rsplit('/').next().unwrap_or(self.path)
    }

    /// Location of this dataset inside a directory of downloaded datasets.
    ///
    /// Archives are expected to have been unpacked next to the archive name,
    /// e.g. `tcga_reports_tsne.json.zip` → `tcga_reports_tsne.json`.
    pub fn local_path(&self, data_dir: &Path) -> PathBuf {
        let name = self.file_name();
        let name = if self.is_archive() {
            &name[..name.len() - ".zip".len()]
        } else {
            name
        };
        data_dir.join(name)
    }
}

pub const EXAMPLE_DATASETS: &[DatasetConfig] = &[
    DatasetConfig {
        id: "wsi_slides",
        path: "https://prafulb.github.io/fese/data/tcgaSlideEmbeddingsTSNE4Classes.json",
        color_by: Some("Primary Site"),
    },
    DatasetConfig {
        id: "tcga_reports",
        path: "https://prafulb.github.io/fese/data/tcga_reports_tsne.json.zip",
        color_by: Some("cancer_type"),
    },
    DatasetConfig {
        id: "gleason_slides",
        path: "https://prafulb.github.io/fese/data/tcgaGleasonSlideEmbeddingsTSNE.json",
        color_by: Some("gleason_score"),
    },
    DatasetConfig {
        id: "gleason_patches",
        path: "https://prafulb.github.io/fese/data/wsiGleasonPatchEmbeddingsTSNE.json",
        color_by: Some("gleason_score"),
    },
    DatasetConfig {
        id: "tcga_reports_verbose",
        path: "/ese/data/tcga_reports_verbose_tsne.json.zip",
        color_by: Some("cancer_type"),
    },
    DatasetConfig {
        id: "soc_codes",
        path: "/ese/data/soc_code_jobs_tsne.json.zip",
        color_by: None,
    },
];

/// The collection an explorer currently shows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataConfig {
    /// Catalog id, when the collection is a built-in dataset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Local JSON file the documents are read from
    pub path: PathBuf,

    /// Property the points are colored by after loading
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color_by: Option<String>,
}

impl DataConfig {
    /// A collection read from `path`, not colored.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self {
            id: None,
            path: path.into(),
            color_by: None,
        }
    }

    /// The catalog dataset `id`, read from `data_dir`.
    pub fn from_catalog(id: &str, data_dir: &Path) -> Result<Self, DatasetError> {
        let dataset = find_dataset(id)?;
        Ok(Self {
            id: Some(dataset.id.to_string()),
            path: dataset.local_path(data_dir),
            color_by: dataset.color_by.map(str::to_string),
        })
    }

    pub fn with_color_by(mut self, color_by: Option<String>) -> Self {
        self.color_by = color_by;
        self
    }

    /// Read the documents of this collection.
    pub async fn load(&self) -> Result<Vec<Document>, DatasetError> {
        load_documents(&self.path).await
    }
}

/// Look up a catalog dataset by id.
pub fn find_dataset(id: &str) -> Result<&'static DatasetConfig, DatasetError> {
    EXAMPLE_DATASETS
        .iter()
        .find(|dataset| dataset.id == id)
        .ok_or_else(|| DatasetError::UnknownDataset(id.to_string()))
}

/// Turn a slide reference into a location an image source can open.
///
/// - `http(s)://` URLs are validated and returned
/// - anything that looks like a file path is returned unchanged
/// - a bare identifier is taken as a GDC file id
pub fn resolve_slide_url(reference: &str) -> Result<String, DatasetError> {
    let reference = reference.trim();
    let invalid = |message: &str| DatasetError::InvalidUrl {
        url: reference.to_string(),
        message: message.to_string(),
    };

    if reference.is_empty() {
        return Err(invalid("empty slide reference"));
    }

    if reference.starts_with("http://") || reference.starts_with("https://") {
        return Url::parse(reference)
            .map(String::from)
            .map_err(|e| invalid(&e.to_string()));
    }

    if reference.contains(['/', '\\', '.']) {
        return Ok(reference.to_string());
    }

    Url::parse(GDC_DATA_URL)
        .and_then(|base| base.join(reference))
        .map(String::from)
        .map_err(|e| invalid(&e.to_string()))
}
