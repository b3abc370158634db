//! PhotoSim Infer — image preprocessing and embedding backends.
//!
//! Provides the `EmbedderBackend` trait for turning a prepared image into a
//! fixed-length vector. When the `onnx` feature is enabled and a model file
//! is present, `OnnxImageEmbedder` runs a MobileNet-style image model.
//! Otherwise `HistogramEmbedder` is used, a deterministic colour baseline.

pub mod embedder;
pub mod histogram;
pub mod onnx_embedder;
pub mod preprocess;

pub use embedder::EmbedderBackend;
pub use histogram::HistogramEmbedder;
pub use preprocess::{ImagePreprocessor, PreparedImage, ResizePreprocessor};

#[cfg(feature = "onnx")]
pub use onnx_embedder::OnnxImageEmbedder;

use std::path::Path;
use std::sync::Arc;

/// Create the best available embedder for the given model directory.
///
/// Tries ONNX first (if feature enabled and `model.onnx` present),
/// falls back to `HistogramEmbedder` with `histogram_bins` per channel.
pub fn create_embedder(model_dir: &Path, histogram_bins: usize) -> Arc<dyn EmbedderBackend> {
    #[cfg(feature = "onnx")]
    {
        match OnnxImageEmbedder::load(model_dir) {
            Ok(embedder) => {
                tracing::info!("Using ONNX image embedder (dim={})", embedder.dimension());
                return Arc::new(embedder);
            }
            Err(e) => {
                tracing::warn!("ONNX embedder unavailable: {}. Falling back to colour histograms.", e);
            }
        }
    }

    #[cfg(not(feature = "onnx"))]
    {
        let _ = model_dir;
        tracing::info!("ONNX feature disabled. Using colour histogram embeddings.");
    }

    Arc::new(HistogramEmbedder::new(histogram_bins))
}
