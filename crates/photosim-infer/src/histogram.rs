//! Colour-histogram embedder.
//!
//! Buckets every pixel into a joint RGB histogram with `bins` levels per
//! channel and L1-normalises the counts, so the vector is independent of
//! image size. Crude next to a neural model, but deterministic, dependency
//! free and good enough to group photos by palette.

use ndarray::Array1;
use photosim_core::{Error, Result};

use crate::embedder::EmbedderBackend;
use crate::preprocess::PreparedImage;

pub struct HistogramEmbedder {
    bins: usize,
    model_id: String,
}

impl HistogramEmbedder {
    /// `bins` is clamped to 1..=64.
    pub fn new(bins: usize) -> Self {
        let bins = bins.clamp(1, 64);
        Self {
            bins,
            model_id: format!("rgb-histogram-{}", bins),
        }
    }

    fn bucket(&self, value: u8) -> usize {
        value as usize * self.bins / 256
    }
}

impl EmbedderBackend for HistogramEmbedder {
    fn embed(&self, image: &PreparedImage) -> Result<Array1<f32>> {
        let pixels = image.pixel_count();
        if pixels == 0 || image.rgb.len() != pixels * 3 {
            return Err(Error::Embedding("empty or malformed pixel buffer".into()));
        }

        let mut hist = Array1::<f32>::zeros(self.dimension());
        for px in image.rgb.chunks_exact(3) {
            let idx = (self.bucket(px[0]) * self.bins + self.bucket(px[1])) * self.bins
                + self.bucket(px[2]);
            hist[idx] += 1.0;
        }
        hist /= pixels as f32;
        Ok(hist)
    }

    fn dimension(&self) -> usize {
        self.bins * self.bins * self.bins
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn is_available(&self) -> bool {
        true
    }
}
