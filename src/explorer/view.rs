//! Point cloud view model.

use serde::Serialize;

use super::color::{Color, ColorScale, LegendEntry};
use super::document::Document;

/// Marker size of ordinary points.
pub const DEFAULT_POINT_SIZE: u32 = 15;

/// Marker size of the focus and compared documents.
pub const HIGHLIGHT_POINT_SIZE: u32 = 50;

/// Border width of the focus and compared documents.
pub const HIGHLIGHT_BORDER_WIDTH: u32 = 5;

/// One plotted document.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExplorerPoint {
    pub index: usize,
    pub position: [f32; 3],

    /// Value of the color property, if one is selected
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    pub color: Color,
    pub size: u32,
    pub border_width: u32,
    pub focused: bool,
    pub compared: bool,
}

/// Everything a renderer needs to draw the point cloud.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExplorerView {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color_by: Option<String>,

    pub points: Vec<ExplorerPoint>,
    pub legend: Vec<LegendEntry>,
}

impl ExplorerView {
    /// Build the view of `documents` with focus and compare highlighting.
    ///
    /// Indices that are not in the collection are ignored.
    pub fn build(
        documents: &[Document],
        focus: Option<usize>,
        compare: &[usize],
        color_by: Option<&str>,
    ) -> Self {
        let scale = color_by.map(|property| ColorScale::from_documents(documents, property));

        let points = documents
            .iter()
            .enumerate()
            .map(|(i, doc)| {
                let focused = focus == Some(i);
                let compared = compare.contains(&i);
                let highlighted = focused || compared;

                let label = color_by.map(|property| doc.label(property));
                let color = match (&scale, &label) {
                    (Some(scale), Some(label)) => scale.color_of(label),
                    _ => Color::GREY,
                };

                ExplorerPoint {
                    index: i,
                    position: doc.embedding_3d,
                    label,
                    color,
                    size: if highlighted {
                        HIGHLIGHT_POINT_SIZE
                    } else {
                        DEFAULT_POINT_SIZE
                    },
                    border_width: if highlighted { HIGHLIGHT_BORDER_WIDTH } else { 0 },
                    focused,
                    compared,
                }
            })
            .collect();

        Self {
            color_by: color_by.map(str::to_string),
            points,
            legend: scale.map(|s| s.legend).unwrap_or_default(),
        }
    }
}
