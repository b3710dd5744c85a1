//! Similarity scoring.
//!
//! - [`vector`]: distance and cosine similarity primitives
//! - [`Measure`]: a scoring function plus its sort direction
//! - [`rank`]: scores a collection against a focus document and produces the
//!   ranked table view

mod measure;
mod ranker;
pub mod vector;

pub use measure::{Measure, MeasureKind};
pub use ranker::{rank, row_key, RankedRow, RankedView};
pub use vector::{distance, similarity};
