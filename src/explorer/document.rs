//! Embedded documents and dataset parsing.
//!
//! A dataset is a JSON array of document records. Records come from several
//! producers, so the slide location may appear as `sourceRef`, `wsiURL` or
//! `tcgaWSIURL`; the first one present wins. Any `_index` carried by a record
//! is ignored: indices are assigned in ingestion order.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::DatasetError;
use crate::slide::TileParams;

/// One point of the explored corpus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "DocumentRecord")]
pub struct Document {
    /// Stable position in the collection
    pub index: usize,

    /// Full embedding vector
    pub embedding: Vec<f32>,

    /// Projection used only for plotting
    #[serde(rename = "embedding3d")]
    pub embedding_3d: [f32; 3],

    /// Free-form metadata shown in tables and used for coloring
    pub properties: BTreeMap<String, Value>,

    /// Location of the source slide, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_ref: Option<String>,

    /// Region of the slide this document was embedded from (patch datasets)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tile_params: Option<TileParams>,
}

/// Wire shape accepted when reading documents.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DocumentRecord {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
    #[serde(default, rename = "embedding3d")]
    embedding_3d: Option<Vec<f32>>,
    #[serde(default)]
    properties: BTreeMap<String, Value>,
    #[serde(default)]
    source_ref: Option<String>,
    #[serde(default, rename = "wsiURL")]
    wsi_url: Option<String>,
    #[serde(default, rename = "tcgaWSIURL")]
    tcga_wsi_url: Option<String>,
    #[serde(default)]
    tile_params: Option<TileParams>,
}

impl From<DocumentRecord> for Document {
    fn from(record: DocumentRecord) -> Self {
        let embedding_3d = match record.embedding_3d {
            Some(coords) => project_3d(&coords),
            None => project_3d(&record.embedding),
        };

        Self {
            index: record.index,
            embedding_3d,
            embedding: record.embedding,
            properties: record.properties,
            source_ref: record
                .source_ref
                .or(record.tcga_wsi_url)
                .or(record.wsi_url),
            tile_params: record.tile_params,
        }
    }
}

impl Document {
    /// Create a document for a freshly embedded slide.
    ///
    /// The index is provisional; the collection assigns the final one on append.
    pub fn new(embedding: Vec<f32>, properties: BTreeMap<String, Value>) -> Self {
        Self {
            index: 0,
            embedding_3d: project_3d(&embedding),
            embedding,
            properties,
            source_ref: None,
            tile_params: None,
        }
    }

    /// Attach the source slide location.
    pub fn with_source_ref(mut self, source_ref: impl Into<String>) -> Self {
        self.source_ref = Some(source_ref.into());
        self
    }

    /// Display label of a property, used for grouping and coloring.
    ///
    /// Missing properties and JSON null both map to `"null"`.
    pub fn label(&self, property: &str) -> String {
        match self.properties.get(property) {
            None | Some(Value::Null) => "null".to_string(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        }
    }
}

/// First three components of `embedding`, zero padded.
pub fn project_3d(embedding: &[f32]) -> [f32; 3] {
    let mut coords = [0.0f32; 3];
    for (slot, value) in coords.iter_mut().zip(embedding) {
        *slot = *value;
    }
    coords
}

/// Parse a JSON array of document records and assign ingestion indices.
pub fn parse_documents(data: &[u8]) -> Result<Vec<Document>, DatasetError> {
    let mut documents: Vec<Document> =
        serde_json::from_slice(data).map_err(|e| DatasetError::Parse(e.to_string()))?;

    for (i, doc) in documents.iter_mut().enumerate() {
        doc.index = i;
    }

    Ok(documents)
}

/// Read and parse a dataset file.
///
/// Zip-delivered datasets are rejected; unpack them first.
pub async fn load_documents(path: impl AsRef<Path>) -> Result<Vec<Document>, DatasetError> {
    let path = path.as_ref();
    let shown = path.display().to_string();

    if path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("zip"))
    {
        return Err(DatasetError::UnsupportedArchive(shown));
    }

    let data = tokio::fs::read(path).await.map_err(|e| DatasetError::Io {
        path: shown.clone(),
        message: e.to_string(),
    })?;

    let documents = parse_documents(&data)?;
    tracing::info!(path = %shown, count = documents.len(), "Loaded dataset");
    Ok(documents)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_assigns_indices() {
        let json = br#"[
            {"embedding": [1.0, 2.0, 3.0, 4.0], "properties": {"site": "lung"}, "_index": 7},
            {"embedding": [0.5, 0.5, 0.5, 0.5], "embedding3d": [9.0, 8.0, 7.0], "properties": {}}
        ]"#;

        let docs = parse_documents(json).unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].index, 0);
        assert_eq!(docs[1].index, 1);
        assert_eq!(docs[0].embedding_3d, [1.0, 2.0, 3.0]);
        assert_eq!(docs[1].embedding_3d, [9.0, 8.0, 7.0]);
    }

    #[test]
    fn test_source_ref_aliases() {
        let json = br#"[
            {"embedding": [1.0], "wsiURL": "https://a/slide.svs"},
            {"embedding": [1.0], "wsiURL": "https://a/x.svs", "tcgaWSIURL": "https://gdc/y"},
            {"embedding": [1.0], "sourceRef": "s3://bucket/z.svs"}
        ]"#;

        let docs = parse_documents(json).unwrap();
        assert_eq!(docs[0].source_ref.as_deref(), Some("https://a/slide.svs"));
        assert_eq!(docs[1].source_ref.as_deref(), Some("https://gdc/y"));
        assert_eq!(docs[2].source_ref.as_deref(), Some("s3://bucket/z.svs"));
    }

    #[test]
    fn test_tile_params_aliases() {
        let json = br#"[{"embedding": [1.0],
            "tileParams": {"tileX": 10, "tileY": 20, "tileWidth": 224, "tileHeight": 224}}]"#;

        let docs = parse_documents(json).unwrap();
        let params = docs[0].tile_params.unwrap();
        assert_eq!((params.x, params.y), (10, 20));
        assert_eq!((params.width, params.height), (224, 224));
    }

    #[test]
    fn test_parse_invalid_json() {
        assert!(matches!(
            parse_documents(b"{not json"),
            Err(DatasetError::Parse(_))
        ));
        assert!(matches!(
            parse_documents(br#"[{"properties": {}}]"#),
            Err(DatasetError::Parse(_))
        ));
    }

    #[test]
    fn test_label() {
        let mut properties = BTreeMap::new();
        properties.insert("site".to_string(), Value::from("breast"));
        properties.insert("gleason_score".to_string(), Value::from(7));
        properties.insert("missing".to_string(), Value::Null);
        let doc = Document::new(vec![1.0], properties);

        assert_eq!(doc.label("site"), "breast");
        assert_eq!(doc.label("gleason_score"), "7");
        assert_eq!(doc.label("missing"), "null");
        assert_eq!(doc.label("absent"), "null");
    }

    #[test]
    fn test_project_3d_pads() {
        assert_eq!(project_3d(&[1.0]), [1.0, 0.0, 0.0]);
        assert_eq!(project_3d(&[1.0, 2.0, 3.0, 4.0]), [1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_serialize_roundtrip_keeps_index() {
        let doc = Document::new(vec![0.1, 0.2], BTreeMap::new()).with_source_ref("slide.svs");
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["sourceRef"], "slide.svs");
        assert!(json.get("tileParams").is_none());

        let back: Document = serde_json::from_value(json).unwrap();
        assert_eq!(back, doc);
    }

    #[tokio::test]
    async fn test_load_rejects_zip() {
        let result = load_documents("data/reports.json.zip").await;
        assert!(matches!(result, Err(DatasetError::UnsupportedArchive(_))));
    }

    #[tokio::test]
    async fn test_load_reads_file() {
        let subscriber = tracing_subscriber::fmt().with_test_writer().finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let dir = std::env::temp_dir().join(format!("slide-explorer-load-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("patches.json");
        std::fs::write(
            &path,
            r#"[{"embedding": [1.0, 0.0, 0.0], "properties": {"site": "lung"}}]"#,
        )
        .unwrap();

        let docs = load_documents(&path).await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].index, 0);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let result = load_documents("/nonexistent/dataset.json").await;
        assert!(matches!(result, Err(DatasetError::Io { .. })));
    }
}
