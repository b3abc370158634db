//! "Photos like this one": embed a query photo and rank the corpus.

use std::sync::Arc;

use ndarray::Array1;
use tracing::{debug, info};

use crate::engine::SimilaritySearchEngine;
use crate::types::{SimilarPhoto, SimilarityQuery};
use photosim_core::{Error, Result};
use photosim_index::IndexingCoordinator;
use photosim_infer::{EmbedderBackend, ImagePreprocessor};
use photosim_store::SqliteStore;

/// Embeds query photos and ranks the store against them.
pub struct SimilarityFinder {
    store: Arc<SqliteStore>,
    embedder: Arc<dyn EmbedderBackend>,
    preprocessor: Arc<dyn ImagePreprocessor>,
    /// While this coordinator runs a job, query photos are not written back.
    coordinator: Option<Arc<IndexingCoordinator>>,
}

impl SimilarityFinder {
    pub fn new(
        store: Arc<SqliteStore>,
        embedder: Arc<dyn EmbedderBackend>,
        preprocessor: Arc<dyn ImagePreprocessor>,
    ) -> Self {
        Self {
            store,
            embedder,
            preprocessor,
            coordinator: None,
        }
    }

    /// Defer query-photo writes to `coordinator` while it is running a job.
    pub fn with_coordinator(mut self, coordinator: Arc<IndexingCoordinator>) -> Self {
        self.coordinator = Some(coordinator);
        self
    }

    /// Embed a single photo.
    pub fn embed_location(&self, location: &str) -> Result<Array1<f32>> {
        let image = self.preprocessor.prepare(location)?;
        self.embedder.embed(&image)
    }

    /// Embed one photo and store it immediately (e.g. a fresh camera capture).
    pub fn index_single(&self, id: &str, location: &str) -> Result<Array1<f32>> {
        if id.is_empty() {
            return Err(Error::InvalidInput("photo id must not be empty".into()));
        }
        let embedding = self.embed_location(location)?;
        self.store.upsert(id, location, &embedding)?;
        info!("Indexed {} → {}", id, location);
        Ok(embedding)
    }

    /// Rank the store against the query photo, top `k` first.
    ///
    /// Without a precomputed embedding the query photo is embedded here, and
    /// if it carries an id and its location isn't indexed yet it is stored so
    /// later queries can find it. Results whose location equals the query's
    /// are flagged `is_query`; use [`exclude_query`] to drop them.
    pub fn find_similar(&self, query: &SimilarityQuery, k: usize) -> Result<Vec<SimilarPhoto>> {
        let embedding = match &query.embedding {
            Some(e) => e.clone(),
            None => {
                let embedding = self.embed_location(&query.location)?;
                if let Some(id) = query.id.as_deref().filter(|id| !id.is_empty()) {
                    self.auto_index(id, &query.location, &embedding)?;
                }
                embedding
            }
        };

        let ranked = SimilaritySearchEngine::new(&self.store).search(&embedding, k)?;
        Ok(ranked
            .into_iter()
            .map(|m| SimilarPhoto {
                is_query: m.location == query.location,
                location: m.location,
                score: m.score,
            })
            .collect())
    }

    fn auto_index(&self, id: &str, location: &str, embedding: &Array1<f32>) -> Result<()> {
        if self.coordinator.as_ref().is_some_and(|c| c.is_running()) {
            debug!("Indexing job running, not storing query photo {}", id);
            return Ok(());
        }
        if self.store.is_location_indexed(location)? {
            return Ok(());
        }
        self.store.upsert(id, location, embedding)?;
        info!("Indexed query photo {} → {}", id, location);
        Ok(())
    }
}

/// Drop results that are the query photo itself.
pub fn exclude_query(results: Vec<SimilarPhoto>) -> Vec<SimilarPhoto> {
    results.into_iter().filter(|r| !r.is_query).collect()
}
