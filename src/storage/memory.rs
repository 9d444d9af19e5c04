//! Process-local storage backend.
//!
//! Each sensor table is an ordered map guarded by its own lock, so writers
//! for different sensor types never contend. Nothing survives a restart.

use crate::error::{Error, Result};
use crate::registry::TagStore;
use crate::sensors::{Sample, SensorType, Timestamp};
use crate::storage::{dedup_by_key, SensorStore, TableStats};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

type Table = BTreeMap<(Timestamp, String), Sample>;

#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<HashMap<SensorType, Arc<RwLock<Table>>>>>,
    tags: Arc<RwLock<BTreeMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self, sensor: SensorType) -> Result<Arc<RwLock<Table>>> {
        self.tables
            .read()
            .get(&sensor)
            .cloned()
            .ok_or_else(|| Error::Storage(format!("Table {} not found", sensor.table_name())))
    }
}

#[async_trait]
impl SensorStore for MemoryStore {
    async fn init(&self, sensors: &[SensorType]) -> Result<()> {
        let mut tables = self.tables.write();
        for sensor in sensors {
            tables.entry(*sensor).or_default();
        }
        Ok(())
    }

    async fn insert_batch(&self, sensor: SensorType, samples: &[Sample]) -> Result<usize> {
        let table = self.table(sensor)?;
        let mut rows = table.write();
        let mut inserted = 0;
        for sample in dedup_by_key(samples) {
            if sample.sensor_type != sensor {
                return Err(Error::Validation(format!(
                    "Sample of type {} routed to {} table",
                    sample.sensor_type, sensor
                )));
            }
            let key = (sample.timestamp, sample.client_id.clone());
            if !rows.contains_key(&key) {
                rows.insert(key, sample.clone());
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn query_range(
        &self,
        sensor: SensorType,
        client_id: &str,
        start: Timestamp,
        end: Timestamp,
    ) -> Result<Vec<Sample>> {
        if start > end {
            return Ok(Vec::new());
        }
        let table = self.table(sensor)?;
        let rows = table.read();
        Ok(rows
            .range((start, String::new())..)
            .take_while(|((ts, _), _)| *ts <= end)
            .filter(|((_, client), _)| client == client_id)
            .map(|(_, sample)| sample.clone())
            .collect())
    }

    async fn distinct_clients(&self, sensor: SensorType, since: Timestamp) -> Result<BTreeSet<String>> {
        let table = self.table(sensor)?;
        let rows = table.read();
        Ok(rows
            .range((since, String::new())..)
            .map(|((_, client), _)| client.clone())
            .collect())
    }

    async fn delete_older_than(&self, sensor: SensorType, cutoff: Timestamp) -> Result<usize> {
        let table = self.table(sensor)?;
        let mut rows = table.write();
        let kept = rows.split_off(&(cutoff, String::new()));
        let deleted = rows.len();
        *rows = kept;
        Ok(deleted)
    }

    async fn latest(&self, sensor: SensorType, client_id: &str) -> Result<Option<Sample>> {
        let table = self.table(sensor)?;
        let rows = table.read();
        Ok(rows
            .values()
            .rev()
            .find(|sample| sample.client_id == client_id)
            .cloned())
    }

    async fn stats(&self, sensor: SensorType) -> Result<TableStats> {
        let table = self.table(sensor)?;
        let rows = table.read();
        Ok(TableStats {
            total_records: rows.len() as u64,
            oldest: rows.keys().next().map(|(ts, _)| *ts),
            newest: rows.keys().next_back().map(|(ts, _)| *ts),
        })
    }
}

#[async_trait]
impl TagStore for MemoryStore {
    async fn get_all(&self) -> Result<BTreeMap<String, String>> {
        Ok(self.tags.read().clone())
    }

    async fn upsert(&self, client_id: &str, tag: &str) -> Result<()> {
        self.tags.write().insert(client_id.to_owned(), tag.to_owned());
        Ok(())
    }
}
