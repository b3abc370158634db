//! Brute-force similarity search over the store.

use std::cmp::Ordering;

use ndarray::Array1;
use tracing::debug;

use crate::similarity::cosine_similarity;
use crate::types::RankedMatch;
use photosim_core::{Error, Result};
use photosim_store::{SqliteStore, StoredEmbedding};

pub use photosim_core::config::DEFAULT_TOP_K;

/// Ranks every stored embedding against a query vector.
pub struct SimilaritySearchEngine<'a> {
    store: &'a SqliteStore,
}

impl<'a> SimilaritySearchEngine<'a> {
    pub fn new(store: &'a SqliteStore) -> Self {
        Self { store }
    }

    /// Top `k` entries by cosine similarity, highest first.
    ///
    /// The photo that produced `query` is not excluded if it is in the store;
    /// callers that don't want it back filter by location afterwards.
    pub fn search(&self, query: &Array1<f32>, k: usize) -> Result<Vec<RankedMatch>> {
        if query.is_empty() {
            return Err(Error::InvalidInput("query embedding is empty".into()));
        }
        if query.iter().any(|v| !v.is_finite()) {
            return Err(Error::InvalidInput(
                "query embedding contains non-finite values".into(),
            ));
        }

        let entries = self.store.get_all()?;
        let scanned = entries.len();
        let results = rank(query, entries, k);
        debug!(
            "Ranked {} photos, returning {} (k={})",
            scanned,
            results.len(),
            k
        );
        Ok(results)
    }
}

/// Score, sort descending and truncate. Ties keep scan order.
pub fn rank(query: &Array1<f32>, entries: Vec<StoredEmbedding>, k: usize) -> Vec<RankedMatch> {
    let mut scored: Vec<RankedMatch> = entries
        .into_iter()
        .map(|e| RankedMatch {
            score: cosine_similarity(query, &e.embedding),
            location: e.location,
        })
        .collect();
    scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
    scored.truncate(k);
    scored
}
