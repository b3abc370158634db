//! PhotoSim Store — durable mapping from photo identity to location and embedding.

pub mod embedding;
pub mod schema;
pub mod sqlite;
pub mod types;

pub use sqlite::{SqliteStore, DB_FILE};
pub use types::*;
