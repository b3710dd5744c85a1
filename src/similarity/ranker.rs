//! Scores documents against a focus document and builds the ranked table.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use serde_json::Value;

use super::measure::{Measure, MeasureKind};
use crate::error::VectorError;
use crate::explorer::Document;

/// A table row for one scored document.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedRow {
    /// Unique row key derived from the document index
    pub key: String,

    /// Index of the scored document in the collection
    pub document_index: usize,

    /// The document's declared properties
    pub properties: BTreeMap<String, Value>,

    /// Raw score against the focus document
    pub score: f32,

    /// Score rounded to three decimals for display
    pub display_score: f64,
}

/// Table-ready projection of a scored collection.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedView {
    /// Index of the focus document the scores were computed against
    pub focus_index: Option<usize>,

    /// Kind of measure used, which also names the score column
    pub measure: Option<MeasureKind>,

    /// Property columns followed by the score column
    pub columns: Vec<String>,

    /// Rows, closest first
    pub rows: Vec<RankedRow>,
}

impl RankedView {
    /// Key of the conventional default selection.
    pub fn default_selection(&self) -> Option<&RankedRow> {
        self.rows.first()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Row key for a document.
pub fn row_key(document_index: usize) -> String {
    format!("doc-{}", document_index)
}

fn round_display(score: f32) -> f64 {
    (score as f64 * 1000.0).round() / 1000.0
}

/// Score every document against `focus` and sort closest first.
///
/// Sorting is stable, so equal scores keep collection order.
pub fn rank(
    documents: &[Document],
    focus: &Document,
    measure: Measure,
) -> Result<RankedView, VectorError> {
    let kind = measure.kind();

    let mut rows = documents
        .iter()
        .map(|doc| {
            let score = measure.score(&doc.embedding, &focus.embedding)?;
            Ok(RankedRow {
                key: row_key(doc.index),
                document_index: doc.index,
                properties: doc.properties.clone(),
                score,
                display_score: round_display(score),
            })
        })
        .collect::<Result<Vec<_>, VectorError>>()?;

    rows.sort_by(|a, b| kind.compare(a.score, b.score));

    let property_names: BTreeSet<&String> = documents
        .iter()
        .flat_map(|doc| doc.properties.keys())
        .collect();
    let mut columns: Vec<String> = property_names.into_iter().cloned().collect();
    columns.push(kind.as_str().to_string());

    Ok(RankedView {
        focus_index: Some(focus.index),
        measure: Some(kind),
        columns,
        rows,
    })
}
