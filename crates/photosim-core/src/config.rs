//! Configuration and data directory management.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::error::{Error, Result};

/// Default number of ranked matches returned by a similarity query.
pub const DEFAULT_TOP_K: usize = 30;

/// Square edge length images are resized to before embedding.
pub const DEFAULT_IMAGE_SIZE: u32 = 224;

/// Bins per colour channel for the histogram embedder (8 → 512 dims).
pub const DEFAULT_HISTOGRAM_BINS: usize = 8;

/// Paths to all PhotoSim data directories.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataPaths {
    /// Root data directory (e.g., `data/`).
    pub root: PathBuf,
    /// Vector database directory (`data/vectordb/`).
    pub vectordb: PathBuf,
    /// Embedding model directory (`data/models/`).
    pub models: PathBuf,
}

impl DataPaths {
    /// Create data paths from a root directory. Creates directories if needed.
    pub fn new(root: impl AsRef<Path>) -> std::io::Result<Self> {
        let root = root.as_ref().to_path_buf();
        let paths = Self {
            vectordb: root.join("vectordb"),
            models: root.join("models"),
            root,
        };
        paths.ensure_dirs()?;
        Ok(paths)
    }

    fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.vectordb)?;
        std::fs::create_dir_all(&self.models)?;
        Ok(())
    }
}

/// Top-level PhotoSim configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhotoSimConfig {
    /// Data directory paths.
    pub data_paths: DataPaths,
    /// Result-set size for similarity queries.
    pub top_k: usize,
    /// Edge length of the square image fed to the embedder.
    pub image_size: u32,
    /// Bins per channel for the histogram embedder.
    pub histogram_bins: usize,
}

impl PhotoSimConfig {
    /// Create configuration from environment and defaults.
    ///
    /// Reads `PHOTOSIM_TOP_K`, `PHOTOSIM_IMAGE_SIZE` and
    /// `PHOTOSIM_HISTOGRAM_BINS`; unparsable values fall back to defaults.
    pub fn from_env(data_dir: impl AsRef<Path>) -> Result<Self> {
        let data_paths = DataPaths::new(data_dir)?;

        let config = Self {
            data_paths,
            top_k: env_or("PHOTOSIM_TOP_K", DEFAULT_TOP_K),
            image_size: env_or("PHOTOSIM_IMAGE_SIZE", DEFAULT_IMAGE_SIZE),
            histogram_bins: env_or("PHOTOSIM_HISTOGRAM_BINS", DEFAULT_HISTOGRAM_BINS),
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make indexing or search meaningless.
    pub fn validate(&self) -> Result<()> {
        if self.top_k == 0 {
            return Err(Error::Config("top_k must be at least 1".into()));
        }
        if self.image_size == 0 {
            return Err(Error::Config("image_size must be at least 1".into()));
        }
        if !(1..=64).contains(&self.histogram_bins) {
            return Err(Error::Config(format!(
                "histogram_bins must be in 1..=64, got {}",
                self.histogram_bins
            )));
        }
        Ok(())
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("Ignoring unparsable {}={:?}", key, raw);
            default
        }),
        Err(_) => default,
    }
}
