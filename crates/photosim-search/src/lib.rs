//! PhotoSim Search — rank the whole corpus against a query embedding.
//!
//! Every query scans every stored embedding (O(N·D) scoring plus an
//! O(N log N) sort). That is fine up to a few thousand photos; an
//! approximate nearest-neighbour index would slot in behind
//! `SimilaritySearchEngine::search` for larger corpora.

pub mod engine;
pub mod finder;
pub mod similarity;
pub mod types;

pub use engine::{SimilaritySearchEngine, DEFAULT_TOP_K};
pub use finder::{exclude_query, SimilarityFinder};
pub use similarity::cosine_similarity;
pub use types::*;
