//! PhotoSim Core — shared error type and configuration.

pub mod config;
pub mod error;

pub use config::{DataPaths, PhotoSimConfig};
pub use error::{Error, Result};
