//! Batch ingestion: decode, route by sensor type, persist, then feed the
//! live windows.

use crate::buffer::LiveBuffer;
use crate::codec::SampleCodec;
use crate::error::Error;
use crate::sensors::{Sample, SensorType};
use crate::storage::SensorStore;
use futures::future::join_all;
use serde::Serialize;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestStatus {
    Success,
    Error,
}

/// Reply to every ingestion request. Failures are reported here, never as a
/// transport error.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestResponse {
    pub status: IngestStatus,
    pub processed_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl IngestResponse {
    fn success(processed_count: usize) -> Self {
        Self {
            status: IngestStatus::Success,
            processed_count,
            message: None,
        }
    }

    fn error(processed_count: usize, message: impl Into<String>) -> Self {
        Self {
            status: IngestStatus::Error,
            processed_count,
            message: Some(message.into()),
        }
    }
}

/// Running totals since process start.
#[derive(Debug, Default)]
pub struct IngestStats {
    batches: AtomicU64,
    rejected_batches: AtomicU64,
    samples: AtomicU64,
    stored: AtomicU64,
    skipped_unsupported: AtomicU64,
    skipped_malformed: AtomicU64,
    buffer_rejections: AtomicU64,
    store_failures: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestStatsSnapshot {
    pub batches: u64,
    pub rejected_batches: u64,
    pub samples: u64,
    pub stored: u64,
    pub skipped_unsupported: u64,
    pub skipped_malformed: u64,
    pub buffer_rejections: u64,
    pub store_failures: u64,
}

impl IngestStats {
    pub fn snapshot(&self) -> IngestStatsSnapshot {
        IngestStatsSnapshot {
            batches: self.batches.load(Ordering::Relaxed),
            rejected_batches: self.rejected_batches.load(Ordering::Relaxed),
            samples: self.samples.load(Ordering::Relaxed),
            stored: self.stored.load(Ordering::Relaxed),
            skipped_unsupported: self.skipped_unsupported.load(Ordering::Relaxed),
            skipped_malformed: self.skipped_malformed.load(Ordering::Relaxed),
            buffer_rejections: self.buffer_rejections.load(Ordering::Relaxed),
            store_failures: self.store_failures.load(Ordering::Relaxed),
        }
    }
}

pub struct IngestGateway {
    codec: SampleCodec,
    store: Arc<dyn SensorStore>,
    buffer: Arc<LiveBuffer>,
    include_client_port: bool,
    store_timeout: Duration,
    stats: IngestStats,
}

impl IngestGateway {
    pub fn new(
        codec: SampleCodec,
        store: Arc<dyn SensorStore>,
        buffer: Arc<LiveBuffer>,
        include_client_port: bool,
        store_timeout: Duration,
    ) -> Self {
        Self {
            codec,
            store,
            buffer,
            include_client_port,
            store_timeout,
            stats: IngestStats::default(),
        }
    }

    pub fn stats(&self) -> IngestStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn buffer(&self) -> &Arc<LiveBuffer> {
        &self.buffer
    }

    /// Identity recorded for samples sent from `peer`.
    pub fn client_id(&self, peer: SocketAddr) -> String {
        if self.include_client_port {
            peer.to_string()
        } else {
            peer.ip().to_string()
        }
    }

    /// Count and answer a batch whose body could not be read.
    pub fn reject(&self, peer: SocketAddr, message: impl Into<String>) -> IngestResponse {
        let message = message.into();
        self.stats.batches.fetch_add(1, Ordering::Relaxed);
        self.stats.rejected_batches.fetch_add(1, Ordering::Relaxed);
        warn!(%peer, error = %message, "rejected batch");
        IngestResponse::error(0, message)
    }

    pub async fn ingest(&self, body: &[u8], peer: SocketAddr) -> IngestResponse {
        self.stats.batches.fetch_add(1, Ordering::Relaxed);

        let batch = match self.codec.decode(body) {
            Ok(batch) => batch,
            Err(e) => {
                self.stats.rejected_batches.fetch_add(1, Ordering::Relaxed);
                warn!(%peer, error = %e, "rejected batch");
                return IngestResponse::error(0, e.to_string());
            }
        };

        let processed_count = batch.processed_count();
        self.stats
            .skipped_unsupported
            .fetch_add(batch.skipped_unsupported as u64, Ordering::Relaxed);
        self.stats
            .skipped_malformed
            .fetch_add(batch.skipped_malformed as u64, Ordering::Relaxed);
        self.stats
            .samples
            .fetch_add(processed_count as u64, Ordering::Relaxed);

        let client_id = self.client_id(peer);
        let groups = group_by_sensor(&client_id, batch.records);

        let outcomes = join_all(
            groups
                .iter()
                .map(|(sensor, samples)| self.store_group(*sensor, samples)),
        )
        .await;

        let mut failures = Vec::new();
        for (sensor, outcome) in groups.keys().zip(outcomes) {
            match outcome {
                Ok(inserted) => {
                    self.stats.stored.fetch_add(inserted as u64, Ordering::Relaxed);
                }
                Err(e) => {
                    self.stats.store_failures.fetch_add(1, Ordering::Relaxed);
                    error!(client_id = %client_id, sensor = %sensor, error = %e, "failed to store samples");
                    failures.push(format!("{}: {}", sensor, e));
                }
            }
        }

        for samples in groups.values() {
            for sample in samples {
                if sample.sensor_type.is_motion() && !self.buffer.admit(sample) {
                    self.stats.buffer_rejections.fetch_add(1, Ordering::Relaxed);
                }
            }
        }

        debug!(
            client_id = %client_id,
            processed = processed_count,
            unsupported = batch.skipped_unsupported,
            malformed = batch.skipped_malformed,
            "batch ingested"
        );

        if failures.is_empty() {
            IngestResponse::success(processed_count)
        } else {
            IngestResponse::error(processed_count, failures.join("; "))
        }
    }

    async fn store_group(&self, sensor: SensorType, samples: &[Sample]) -> Result<usize, Error> {
        tokio::time::timeout(self.store_timeout, self.store.insert_batch(sensor, samples))
            .await
            .map_err(|_| Error::Timeout(format!("insert into {}", sensor.table_name())))?
    }
}

/// Split decoded records per sensor type, each group ascending by timestamp
/// with repeated timestamps collapsed to their first occurrence.
fn group_by_sensor(
    client_id: &str,
    records: Vec<crate::codec::DecodedRecord>,
) -> BTreeMap<SensorType, Vec<Sample>> {
    let mut groups: BTreeMap<SensorType, Vec<Sample>> = BTreeMap::new();
    for record in records {
        groups.entry(record.sensor_type).or_default().push(Sample {
            sensor_type: record.sensor_type,
            client_id: client_id.to_owned(),
            timestamp: record.timestamp,
            payload: record.payload,
        });
    }
    for samples in groups.values_mut() {
        samples.sort_by_key(|s| s.timestamp);
        samples.dedup_by_key(|s| s.timestamp);
    }
    groups
}
