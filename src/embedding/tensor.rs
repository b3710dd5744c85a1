//! Pixel buffer to model input conversion.
//!
//! Encoders expect ImageNet-standardized input. Pixels are first min-max
//! normalized with the patch's own range, then standardized per channel.

use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::error::TensorError;

/// ImageNet channel means.
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];

/// ImageNet channel standard deviations.
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Memory order of the values in a `[1, 3, size, size]` tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TensorLayout {
    /// RGB triples in pixel order, as the buffer arrives
    #[default]
    Interleaved,

    /// One full plane per channel (NCHW)
    Planar,
}

/// A dense f32 tensor.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    shape: Vec<usize>,
    data: Vec<f32>,
}

impl Tensor {
    /// Build a tensor, checking that `data` fills `shape`.
    pub fn new(shape: Vec<usize>, data: Vec<f32>) -> Result<Self, TensorError> {
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(TensorError::InvalidInput {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self { shape, data })
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn into_data(self) -> Vec<f32> {
        self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Converts RGB patches into encoder input tensors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Preprocessor {
    size: u32,
    layout: TensorLayout,
    mean: [f32; 3],
    std: [f32; 3],
}

impl Preprocessor {
    /// Preprocessor for `size × size` patches with ImageNet statistics.
    pub fn new(size: u32) -> Self {
        Self {
            size,
            layout: TensorLayout::default(),
            mean: IMAGENET_MEAN,
            std: IMAGENET_STD,
        }
    }

    pub fn with_layout(mut self, layout: TensorLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn with_statistics(mut self, mean: [f32; 3], std: [f32; 3]) -> Self {
        self.mean = mean;
        self.std = std;
        self
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn layout(&self) -> TensorLayout {
        self.layout
    }

    /// Normalize a flat RGB buffer of `3 × size²` bytes.
    ///
    /// The output shape is always `[1, 3, size, size]`; the layout only
    /// changes the order of the values.
    ///
    /// # Errors
    ///
    /// Returns [`TensorError::InvalidInput`] if the buffer length is wrong.
    /// No resizing is attempted.
    pub fn preprocess(&self, rgb: &[u8]) -> Result<Tensor, TensorError> {
        let size = self.size as usize;
        let pixels = size * size;
        let expected = 3 * pixels;
        if rgb.len() != expected || expected == 0 {
            return Err(TensorError::InvalidInput {
                expected,
                actual: rgb.len(),
            });
        }

        let (min, max) = rgb
            .iter()
            .fold((u8::MAX, u8::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        let range = (max - min) as f32;

        let scaled = |v: u8| {
            if range == 0.0 {
                0.0
            } else {
                (v - min) as f32 / range
            }
        };

        let mut data = vec![0.0f32; expected];
        for (i, &value) in rgb.iter().enumerate() {
            let channel = i % 3;
            let standardized = (scaled(value) - self.mean[channel]) / self.std[channel];
            let target = match self.layout {
                TensorLayout::Interleaved => i,
                TensorLayout::Planar => channel * pixels + i / 3,
            };
            data[target] = standardized;
        }

        Tensor::new(vec![1, 3, size, size], data)
    }

    /// Normalize a decoded patch.
    pub fn preprocess_image(&self, image: &RgbImage) -> Result<Tensor, TensorError> {
        self.preprocess(image.as_raw())
    }
}
