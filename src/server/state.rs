//! Server state management

use crate::analysis::FeatureExtractor;
use crate::buffer::LiveBuffer;
use crate::codec::SampleCodec;
use crate::config::ServiceConfig;
use crate::error::Result;
use crate::ingest::IngestGateway;
use crate::registry::{ClientRegistry, TagStore};
use crate::storage::{SensorStore, StorageBackendType};
use std::sync::Arc;
use std::time::Instant;

/// Shared server state
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<IngestGateway>,
    pub store: Arc<dyn SensorStore>,
    pub registry: ClientRegistry,
    pub extractor: Arc<FeatureExtractor>,
    pub config: Arc<ServiceConfig>,
    pub started_at: Instant,
}

impl AppState {
    /// Wire the components over an opened backend. Tables are expected to
    /// exist already.
    pub fn new(config: ServiceConfig, backend: &StorageBackendType) -> Result<Self> {
        Self::with_stores(config, backend.sensor_store(), backend.tag_store())
    }

    /// Wire the components over explicit store handles.
    pub fn with_stores(
        config: ServiceConfig,
        store: Arc<dyn SensorStore>,
        tags: Arc<dyn TagStore>,
    ) -> Result<Self> {
        let buffer = Arc::new(LiveBuffer::new(config.buffer.capacity()));
        let gateway = IngestGateway::new(
            SampleCodec::new(config.sensors.supported.clone()),
            store.clone(),
            buffer,
            config.server.include_client_port,
            config.storage.store_timeout(),
        );
        let extractor = FeatureExtractor::new(config.spectral_config())?;

        Ok(Self {
            gateway: Arc::new(gateway),
            store,
            registry: ClientRegistry::new(tags),
            extractor: Arc::new(extractor),
            config: Arc::new(config),
            started_at: Instant::now(),
        })
    }

    /// Whether `sensor` is stored by this deployment.
    pub fn supports(&self, sensor: crate::sensors::SensorType) -> bool {
        self.config.sensors.supported.contains(&sensor)
    }
}
