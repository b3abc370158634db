//! Embedding backend trait.
//!
//! Implementations:
//! - `OnnxImageEmbedder`: ONNX Runtime image model (requires `onnx` feature)
//! - `HistogramEmbedder`: joint RGB histogram, always available

use ndarray::Array1;
use photosim_core::Result;

use crate::preprocess::PreparedImage;

/// Trait for embedding backends.
///
/// `embed` is blocking from the caller's point of view. Every call for a
/// given backend must return vectors of the same `dimension()`.
pub trait EmbedderBackend: Send + Sync {
    /// Compute the embedding of a prepared image.
    fn embed(&self, image: &PreparedImage) -> Result<Array1<f32>>;

    /// Get the embedding dimension.
    fn dimension(&self) -> usize;

    /// Stable tag identifying the model and its version.
    fn model_id(&self) -> &str;

    /// Check if the embedder is available (model loaded).
    fn is_available(&self) -> bool;
}
