//! Search result types.

use ndarray::Array1;
use serde::Serialize;

/// One ranked store entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedMatch {
    pub location: String,
    pub score: f32,
}

/// A ranked entry annotated relative to the query photo.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarPhoto {
    pub location: String,
    pub score: f32,
    /// The entry is the query photo itself.
    pub is_query: bool,
}

/// A "find photos like this one" request.
#[derive(Debug, Clone, Default)]
pub struct SimilarityQuery {
    pub location: String,
    /// When set, the query photo is indexed under this id if its location isn't yet.
    pub id: Option<String>,
    /// Precomputed embedding; skips preprocessing and inference.
    pub embedding: Option<Array1<f32>>,
}

impl SimilarityQuery {
    pub fn from_location(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_embedding(mut self, embedding: Array1<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }
}
