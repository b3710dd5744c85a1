use serde::{Deserialize, Serialize};

use crate::error::VectorError;
use crate::slide::TileParams;

/// One embedded patch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchEmbedding {
    pub tile_params: TileParams,
    pub vector: Vec<f32>,
}

/// Column-wise mean of the patch vectors.
///
/// An empty input yields an empty vector, which callers must not treat as a
/// slide embedding.
///
/// # Errors
///
/// Returns [`VectorError::DimensionMismatch`] if patches differ in dimension.
pub fn aggregate(patches: &[PatchEmbedding]) -> Result<Vec<f32>, VectorError> {
    mean_vector(patches.iter().map(|p| p.vector.as_slice()))
}

/// Column-wise mean of raw vectors.
pub fn mean_vector<'a, I>(vectors: I) -> Result<Vec<f32>, VectorError>
where
    I: IntoIterator<Item = &'a [f32]>,
{
    let mut vectors = vectors.into_iter();
    let Some(first) = vectors.next() else {
        return Ok(Vec::new());
    };

    let mut sums: Vec<f64> = first.iter().map(|&v| v as f64).collect();
    let mut count = 1usize;

    for vector in vectors {
        if vector.len() != sums.len() {
            return Err(VectorError::DimensionMismatch {
                left: sums.len(),
                right: vector.len(),
            });
        }
        for (sum, &v) in sums.iter_mut().zip(vector) {
            *sum += v as f64;
        }
        count += 1;
    }

    Ok(sums.into_iter().map(|sum| (sum / count as f64) as f32).collect())
}
