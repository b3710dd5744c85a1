//! Categorical coloring of the point cloud.
//!
//! Distinct labels of the color property are sorted and spread evenly over a
//! 64-entry jet colormap: with `n` labels each takes the middle entry of its
//! block of `64 / n` entries. Beyond 64 labels the table repeats.

use std::collections::BTreeMap;

use serde::Serialize;

use super::document::Document;

/// Jet colormap, 64 entries, components in `[0, 1]`.
pub const JET_COLORMAP: [[f32; 3]; 64] = [
    [0.0, 0.0, 0.5625],
    [0.0, 0.0, 0.625],
    [0.0, 0.0, 0.6875],
    [0.0, 0.0, 0.75],
    [0.0, 0.0, 0.8125],
    [0.0, 0.0, 0.875],
    [0.0, 0.0, 0.9375],
    [0.0, 0.0, 1.0],
    [0.0, 0.0625, 1.0],
    [0.0, 0.125, 1.0],
    [0.0, 0.1875, 1.0],
    [0.0, 0.25, 1.0],
    [0.0, 0.3125, 1.0],
    [0.0, 0.375, 1.0],
    [0.0, 0.4375, 1.0],
    [0.0, 0.5, 1.0],
    [0.0, 0.5625, 1.0],
    [0.0, 0.625, 1.0],
    [0.0, 0.6875, 1.0],
    [0.0, 0.75, 1.0],
    [0.0, 0.8125, 1.0],
    [0.0, 0.875, 1.0],
    [0.0, 0.9375, 1.0],
    [0.0, 1.0, 1.0],
    [0.0625, 1.0, 0.9375],
    [0.125, 1.0, 0.875],
    [0.1875, 1.0, 0.8125],
    [0.25, 1.0, 0.75],
    [0.3125, 1.0, 0.6875],
    [0.375, 1.0, 0.625],
    [0.4375, 1.0, 0.5625],
    [0.5, 1.0, 0.5],
    [0.5625, 1.0, 0.4375],
    [0.625, 1.0, 0.375],
    [0.6875, 1.0, 0.3125],
    [0.75, 1.0, 0.25],
    [0.8125, 1.0, 0.1875],
    [0.875, 1.0, 0.125],
    [0.9375, 1.0, 0.0625],
    [1.0, 1.0, 0.0],
    [1.0, 0.9375, 0.0],
    [1.0, 0.875, 0.0],
    [1.0, 0.8125, 0.0],
    [1.0, 0.75, 0.0],
    [1.0, 0.6875, 0.0],
    [1.0, 0.625, 0.0],
    [1.0, 0.5625, 0.0],
    [1.0, 0.5, 0.0],
    [1.0, 0.4375, 0.0],
    [1.0, 0.375, 0.0],
    [1.0, 0.3125, 0.0],
    [1.0, 0.25, 0.0],
    [1.0, 0.1875, 0.0],
    [1.0, 0.125, 0.0],
    [1.0, 0.0625, 0.0],
    [1.0, 0.0, 0.0],
    [0.9375, 0.0, 0.0],
    [0.875, 0.0, 0.0],
    [0.8125, 0.0, 0.0],
    [0.75, 0.0, 0.0],
    [0.6875, 0.0, 0.0],
    [0.625, 0.0, 0.0],
    [0.5625, 0.0, 0.0],
    [0.5, 0.0, 0.0],
];

/// Minimum legend opacity, given to the most frequent label.
pub const MIN_OPACITY: f32 = 0.6;

/// An 8-bit RGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    /// Color of points when no color property is selected.
    pub const GREY: Color = Color {
        r: 128,
        g: 128,
        b: 128,
    };

    fn from_unit(rgb: [f32; 3]) -> Self {
        let channel = |v: f32| (v * 255.0).round().clamp(0.0, 255.0) as u8;
        Self {
            r: channel(rgb[0]),
            g: channel(rgb[1]),
            b: channel(rgb[2]),
        }
    }

    /// CSS `rgb(...)` notation.
    pub fn css(&self) -> String {
        format!("rgb({},{},{})", self.r, self.g, self.b)
    }
}

/// Table entry for the `i`-th of `n` sorted labels.
pub fn color_index(i: usize, n: usize) -> usize {
    let block = if n == 0 { 0 } else { JET_COLORMAP.len() / n };
    if block == 0 {
        return i % JET_COLORMAP.len();
    }
    (i * block + block / 2) % JET_COLORMAP.len()
}

/// One label of the color legend.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LegendEntry {
    pub label: String,
    pub color: Color,

    /// Number of documents carrying the label
    pub count: usize,

    /// Inverse-frequency opacity in `[0.6, 1.0]`
    pub opacity: f32,
}

/// Label → color assignment for one color property.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ColorScale {
    pub property: String,
    pub legend: Vec<LegendEntry>,
}

impl ColorScale {
    /// Build the scale for `property` over `documents`.
    pub fn from_documents(documents: &[Document], property: &str) -> Self {
        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for doc in documents {
            *counts.entry(doc.label(property)).or_default() += 1;
        }

        let max = counts.values().copied().max().unwrap_or(0);
        let min = counts.values().copied().min().unwrap_or(0);
        let n = counts.len();

        let legend = counts
            .into_iter()
            .enumerate()
            .map(|(i, (label, count))| {
                let opacity = if max == min {
                    1.0
                } else {
                    MIN_OPACITY + (max - count) as f32 / (max - min) as f32 * (1.0 - MIN_OPACITY)
                };
                LegendEntry {
                    label,
                    color: Color::from_unit(JET_COLORMAP[color_index(i, n)]),
                    count,
                    opacity,
                }
            })
            .collect();

        Self {
            property: property.to_string(),
            legend,
        }
    }

    /// Color of `label`, grey for labels not in the scale.
    pub fn color_of(&self, label: &str) -> Color {
        self.legend
            .binary_search_by(|entry| entry.label.as_str().cmp(label))
            .map(|i| self.legend[i].color)
            .unwrap_or(Color::GREY)
    }
}
