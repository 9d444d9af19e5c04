use crate::error::{Error, Result};
use crate::registry::TagStore;
use crate::sensors::{Axes, Location, Payload, Sample, SensorType, Timestamp};
use crate::storage::{dedup_by_key, SensorStore, TableStats};
use async_trait::async_trait;
use duckdb::{params, Config, Connection, Row};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::Mutex;

/// DuckDB-based storage backend
#[derive(Clone)]
pub struct DuckDbBackend {
    conn: Arc<Mutex<Connection>>,
    sweep_chunk_rows: usize,
}

impl DuckDbBackend {
    pub fn new(connection_string: &str, sweep_chunk_rows: usize) -> Result<Self> {
        let config = Config::default();
        let conn = Connection::open_with_flags(connection_string, config)?;

        // Tag table is independent of the configured sensor set
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS client_tags (
                client_id VARCHAR PRIMARY KEY,
                tag VARCHAR NOT NULL
            );
            "#,
        )
        .map_err(|e| Error::Storage(format!("Failed to create tables: {e}")))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            sweep_chunk_rows: sweep_chunk_rows.max(1),
        })
    }

    pub fn new_in_memory() -> Result<Self> {
        Self::new(":memory:", 10_000)
    }

    fn create_table_sql(sensor: SensorType) -> String {
        let table = sensor.table_name();
        if sensor.is_motion() {
            format!(
                "CREATE TABLE IF NOT EXISTS {table} (
                    timestamp BIGINT NOT NULL,
                    client_id VARCHAR NOT NULL,
                    x DOUBLE NOT NULL,
                    y DOUBLE NOT NULL,
                    z DOUBLE NOT NULL,
                    PRIMARY KEY (timestamp, client_id)
                );"
            )
        } else {
            format!(
                "CREATE TABLE IF NOT EXISTS {table} (
                    timestamp BIGINT NOT NULL,
                    client_id VARCHAR NOT NULL,
                    latitude DOUBLE NOT NULL,
                    longitude DOUBLE NOT NULL,
                    altitude DOUBLE,
                    horizontal_accuracy DOUBLE,
                    vertical_accuracy DOUBLE,
                    PRIMARY KEY (timestamp, client_id)
                );"
            )
        }
    }

    fn value_columns(sensor: SensorType) -> &'static str {
        if sensor.is_motion() {
            "x, y, z"
        } else {
            "latitude, longitude, altitude, horizontal_accuracy, vertical_accuracy"
        }
    }

    fn select_sql(sensor: SensorType, filter: &str) -> String {
        format!(
            "SELECT timestamp, client_id, {} FROM {} {}",
            Self::value_columns(sensor),
            sensor.table_name(),
            filter
        )
    }

    fn row_to_sample(sensor: SensorType, row: &Row<'_>) -> duckdb::Result<Sample> {
        let timestamp = Timestamp::from_nanos(row.get(0)?);
        let client_id: String = row.get(1)?;
        let payload = if sensor.is_motion() {
            Payload::Axes(Axes {
                x: row.get(2)?,
                y: row.get(3)?,
                z: row.get(4)?,
            })
        } else {
            Payload::Location(Location {
                latitude: row.get(2)?,
                longitude: row.get(3)?,
                altitude: row.get(4)?,
                horizontal_accuracy: row.get(5)?,
                vertical_accuracy: row.get(6)?,
            })
        };
        Ok(Sample {
            sensor_type: sensor,
            client_id,
            timestamp,
            payload,
        })
    }
}

#[async_trait]
impl SensorStore for DuckDbBackend {
    async fn init(&self, sensors: &[SensorType]) -> Result<()> {
        let sql: String = sensors.iter().map(|s| Self::create_table_sql(*s)).collect();
        let conn = self.conn.lock().await;
        conn.execute_batch(&sql)
            .map_err(|e| Error::Storage(format!("Failed to create sensor tables: {e}")))
    }

    async fn insert_batch(&self, sensor: SensorType, samples: &[Sample]) -> Result<usize> {
        let unique = dedup_by_key(samples);
        if unique.is_empty() {
            return Ok(0);
        }

        let mut conn = self.conn.lock().await;
        let tx = conn
            .transaction()
            .map_err(|e| Error::Storage(format!("Failed to start transaction: {e}")))?;

        let mut inserted = 0;
        {
            let sql = if sensor.is_motion() {
                format!(
                    "INSERT OR IGNORE INTO {} (timestamp, client_id, x, y, z) VALUES (?, ?, ?, ?, ?)",
                    sensor.table_name()
                )
            } else {
                format!(
                    "INSERT OR IGNORE INTO {} (timestamp, client_id, {}) VALUES (?, ?, ?, ?, ?, ?, ?)",
                    sensor.table_name(),
                    Self::value_columns(sensor)
                )
            };
            let mut stmt = tx
                .prepare(&sql)
                .map_err(|e| Error::Storage(format!("Failed to prepare statement: {e}")))?;

            for sample in unique {
                if sample.sensor_type != sensor {
                    return Err(Error::Validation(format!(
                        "Sample of type {} routed to {} table",
                        sample.sensor_type, sensor
                    )));
                }
                let ts = sample.timestamp.as_nanos();
                let changed = match &sample.payload {
                    Payload::Axes(a) => stmt.execute(params![ts, sample.client_id, a.x, a.y, a.z]),
                    Payload::Location(l) => stmt.execute(params![
                        ts,
                        sample.client_id,
                        l.latitude,
                        l.longitude,
                        l.altitude,
                        l.horizontal_accuracy,
                        l.vertical_accuracy
                    ]),
                }
                .map_err(|e| Error::Storage(format!("Failed to insert row: {e}")))?;
                inserted += changed;
            }
        }

        tx.commit()
            .map_err(|e| Error::Storage(format!("Failed to commit transaction: {e}")))?;

        Ok(inserted)
    }

    async fn query_range(
        &self,
        sensor: SensorType,
        client_id: &str,
        start: Timestamp,
        end: Timestamp,
    ) -> Result<Vec<Sample>> {
        let sql = Self::select_sql(
            sensor,
            "WHERE client_id = ? AND timestamp >= ? AND timestamp <= ? ORDER BY timestamp ASC",
        );
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| Error::Storage(format!("Failed to prepare query: {e}")))?;
        let rows = stmt
            .query_map(params![client_id, start.as_nanos(), end.as_nanos()], |row| {
                Self::row_to_sample(sensor, row)
            })
            .map_err(|e| Error::Storage(format!("Query execution failed: {e}")))?;

        let mut samples = Vec::new();
        for row in rows {
            samples.push(row.map_err(|e| Error::Storage(format!("Row mapping failed: {e}")))?);
        }
        Ok(samples)
    }

    async fn distinct_clients(&self, sensor: SensorType, since: Timestamp) -> Result<BTreeSet<String>> {
        let sql = format!(
            "SELECT DISTINCT client_id FROM {} WHERE timestamp >= ?",
            sensor.table_name()
        );
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| Error::Storage(format!("Failed to prepare query: {e}")))?;
        let rows = stmt
            .query_map(params![since.as_nanos()], |row| row.get::<_, String>(0))
            .map_err(|e| Error::Storage(format!("Query execution failed: {e}")))?;

        let mut clients = BTreeSet::new();
        for row in rows {
            clients.insert(row.map_err(|e| Error::Storage(format!("Failed to read row: {e}")))?);
        }
        Ok(clients)
    }

    async fn delete_older_than(&self, sensor: SensorType, cutoff: Timestamp) -> Result<usize> {
        let table = sensor.table_name();
        let sql = format!(
            "DELETE FROM {table} WHERE rowid IN (SELECT rowid FROM {table} WHERE timestamp < ? LIMIT {})",
            self.sweep_chunk_rows
        );

        let mut total = 0;
        loop {
            // Lock is re-acquired per chunk so writers interleave with the sweep
            let deleted = {
                let conn = self.conn.lock().await;
                conn.execute(&sql, params![cutoff.as_nanos()])
                    .map_err(|e| Error::Storage(format!("Failed to delete expired rows: {e}")))?
            };
            total += deleted;
            if deleted < self.sweep_chunk_rows {
                break;
            }
            tokio::task::yield_now().await;
        }
        Ok(total)
    }

    async fn latest(&self, sensor: SensorType, client_id: &str) -> Result<Option<Sample>> {
        let sql = Self::select_sql(sensor, "WHERE client_id = ? ORDER BY timestamp DESC LIMIT 1");
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| Error::Storage(format!("Failed to prepare query: {e}")))?;
        let mut rows = stmt
            .query_map(params![client_id], |row| Self::row_to_sample(sensor, row))
            .map_err(|e| Error::Storage(format!("Query execution failed: {e}")))?;

        match rows.next() {
            Some(row) => Ok(Some(row.map_err(|e| Error::Storage(format!("Failed to read row: {e}")))?)),
            None => Ok(None),
        }
    }

    async fn stats(&self, sensor: SensorType) -> Result<TableStats> {
        let sql = format!(
            "SELECT COUNT(*), MIN(timestamp), MAX(timestamp) FROM {}",
            sensor.table_name()
        );
        let conn = self.conn.lock().await;
        conn.query_row(&sql, params![], |row| {
            let count: i64 = row.get(0)?;
            let oldest: Option<i64> = row.get(1)?;
            let newest: Option<i64> = row.get(2)?;
            Ok(TableStats {
                total_records: u64::try_from(count).unwrap_or(0),
                oldest: oldest.map(Timestamp::from_nanos),
                newest: newest.map(Timestamp::from_nanos),
            })
        })
        .map_err(|e| Error::Storage(format!("Failed to read table stats: {e}")))
    }
}

#[async_trait]
impl TagStore for DuckDbBackend {
    async fn get_all(&self) -> Result<BTreeMap<String, String>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare("SELECT client_id, tag FROM client_tags")
            .map_err(|e| Error::Storage(format!("Failed to prepare statement: {e}")))?;
        let rows = stmt
            .query_map(params![], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))
            .map_err(|e| Error::Storage(format!("Failed to execute query: {e}")))?;

        let mut tags = BTreeMap::new();
        for row in rows {
            let (client_id, tag) = row.map_err(|e| Error::Storage(format!("Failed to read row: {e}")))?;
            tags.insert(client_id, tag);
        }
        Ok(tags)
    }

    async fn upsert(&self, client_id: &str, tag: &str) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT OR REPLACE INTO client_tags (client_id, tag) VALUES (?, ?)",
            params![client_id, tag],
        )
        .map_err(|e| Error::Storage(format!("Failed to store client tag: {e}")))?;
        Ok(())
    }
}
