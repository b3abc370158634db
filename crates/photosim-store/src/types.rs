//! Record types returned by the store.

use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// A full `images` row.
#[derive(Debug, Clone)]
pub struct PhotoRecord {
    pub id: String,
    pub location: String,
    pub embedding: Array1<f32>,
    /// Tag of the model that produced `embedding`.
    pub model: String,
    /// Unix millis of the last write.
    pub indexed_at: i64,
}

/// The slice of a record the search scan needs.
#[derive(Debug, Clone)]
pub struct StoredEmbedding {
    pub location: String,
    pub embedding: Array1<f32>,
}

/// Store-level statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreStats {
    pub total_records: i64,
    /// Records written under a model tag other than the store's current one.
    pub stale_records: i64,
    /// Distinct embedding dimensions present (more than one means mixed models).
    pub dimensions: Vec<usize>,
    pub model: String,
    pub db_path: String,
    pub db_size_mb: f64,
}
