//! PhotoSim Index — drains candidate photos through preprocess → embed → store.
//!
//! One job at a time, one photo at a time. Cancellation is cooperative and
//! only honoured between photos.

pub mod cancel;
pub mod coordinator;
pub mod types;

pub use cancel::CancellationToken;
pub use coordinator::{IndexingCoordinator, JobHandle, StartOutcome};
pub use types::*;
