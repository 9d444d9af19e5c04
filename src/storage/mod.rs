//! Durable time-series storage for sensor samples.
//!
//! This module provides two backend implementations:
//! - `duckdb`: embedded DuckDB database, file-backed or in-memory
//! - `memory`: process-local ordered maps, used for tests and ephemeral runs
//!
//! Every backend keeps one logical table per sensor type keyed by
//! `(timestamp, client_id)`. Inserts are idempotent by key, so a retried or
//! overlapping batch never produces duplicate rows and never fails because of
//! them.

pub mod duckdb;
pub mod memory;

use self::{duckdb::DuckDbBackend, memory::MemoryStore};
use crate::config::StorageConfig;
use crate::error::{Error, Result};
use crate::registry::TagStore;
use crate::sensors::{Sample, SensorType, Timestamp};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Row counts and time bounds of one sensor table.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TableStats {
    pub total_records: u64,
    pub oldest: Option<Timestamp>,
    pub newest: Option<Timestamp>,
}

/// Storage contract for sensor samples, scoped by sensor type.
#[async_trait]
pub trait SensorStore: Send + Sync + 'static {
    /// Create tables for the given sensor types.
    async fn init(&self, sensors: &[SensorType]) -> Result<()>;

    /// Insert samples, skipping rows whose `(timestamp, client_id)` already
    /// exists. Returns the number of rows actually written.
    async fn insert_batch(&self, sensor: SensorType, samples: &[Sample]) -> Result<usize>;

    /// Samples for one client with `start <= timestamp <= end`, ascending.
    async fn query_range(
        &self,
        sensor: SensorType,
        client_id: &str,
        start: Timestamp,
        end: Timestamp,
    ) -> Result<Vec<Sample>>;

    /// Clients with at least one sample at or after `since`.
    async fn distinct_clients(&self, sensor: SensorType, since: Timestamp) -> Result<BTreeSet<String>>;

    /// Remove rows with `timestamp < cutoff`. Returns the number removed.
    async fn delete_older_than(&self, sensor: SensorType, cutoff: Timestamp) -> Result<usize>;

    /// Most recent sample for a client, if any.
    async fn latest(&self, sensor: SensorType, client_id: &str) -> Result<Option<Sample>>;

    /// Row count and time bounds of the sensor table.
    async fn stats(&self, sensor: SensorType) -> Result<TableStats>;

    /// Clients with at least one row, of any age, in any of `sensors`.
    async fn all_clients(&self, sensors: &[SensorType]) -> Result<BTreeSet<String>> {
        let mut clients = BTreeSet::new();
        for sensor in sensors {
            clients.extend(self.distinct_clients(*sensor, Timestamp::MIN).await?);
        }
        Ok(clients)
    }

    /// Every stored sample of one client, ascending.
    async fn client_history(&self, sensor: SensorType, client_id: &str) -> Result<Vec<Sample>> {
        self.query_range(sensor, client_id, Timestamp::MIN, Timestamp::MAX)
            .await
    }
}

#[derive(Clone)]
pub enum StorageBackendType {
    DuckDb(DuckDbBackend),
    Memory(MemoryStore),
}

impl StorageBackendType {
    /// Open the backend selected by `config.engine`.
    pub fn open(config: &StorageConfig) -> Result<Self> {
        match config.engine.as_str() {
            "duckdb" => Ok(StorageBackendType::DuckDb(DuckDbBackend::new(
                &config.connection,
                config.sweep_chunk_rows,
            )?)),
            "memory" => Ok(StorageBackendType::Memory(MemoryStore::new())),
            other => Err(Error::Config(format!("Invalid engine type: {}", other))),
        }
    }

    /// Sample store handle sharing this backend's connection.
    pub fn sensor_store(&self) -> Arc<dyn SensorStore> {
        match self {
            StorageBackendType::DuckDb(backend) => Arc::new(backend.clone()),
            StorageBackendType::Memory(backend) => Arc::new(backend.clone()),
        }
    }

    /// Tag store handle sharing this backend's connection.
    pub fn tag_store(&self) -> Arc<dyn TagStore> {
        match self {
            StorageBackendType::DuckDb(backend) => Arc::new(backend.clone()),
            StorageBackendType::Memory(backend) => Arc::new(backend.clone()),
        }
    }
}

/// Sort samples by timestamp and drop repeated keys, keeping the first.
pub(crate) fn dedup_by_key(samples: &[Sample]) -> Vec<&Sample> {
    let mut seen = BTreeSet::new();
    let mut unique: Vec<&Sample> = samples
        .iter()
        .filter(|s| seen.insert((s.timestamp, s.client_id.as_str())))
        .collect();
    unique.sort_by_key(|s| s.timestamp);
    unique
}
