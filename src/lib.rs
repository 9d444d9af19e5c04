//! Motion-sensor telemetry ingestion with bounded retention and spectral
//! shake detection.
//!
//! Batches posted by mobile clients are decoded by [`codec`], persisted by a
//! [`storage`] backend and mirrored into per-client live windows
//! ([`buffer`]). [`analysis`] turns a window or a durable range into
//! dominant-frequency features using [`spectral`]. [`sweeper`] enforces the
//! retention horizon in the background.

pub mod analysis;
pub mod buffer;
pub mod codec;
pub mod config;
pub mod error;
pub mod ingest;
pub mod registry;
pub mod sensors;
pub mod server;
pub mod spectral;
pub mod storage;
pub mod sweeper;
pub mod telemetry;

// Re-export commonly used types
pub use error::{Error, Result};
pub use ingest::{IngestGateway, IngestResponse};
pub use sensors::{Sample, SensorType, Timestamp};
pub use storage::{SensorStore, StorageBackendType};
