//! Common test utilities for shakestream integration tests

#![allow(dead_code)]

use serde_json::json;
use shakestream_core::{
    config::ServiceConfig,
    server::state::AppState,
    storage::{duckdb::DuckDbBackend, SensorStore, StorageBackendType},
    SensorType,
};
use std::f64::consts::PI;
use std::net::SocketAddr;
use tempfile::TempDir;

pub const NANOS_PER_SEC: i64 = 1_000_000_000;

pub fn peer() -> SocketAddr {
    "1.2.3.4:40000".parse().unwrap()
}

/// A file-backed DuckDB store with all sensor tables. Keep the directory
/// alive for as long as the backend is used.
pub async fn duckdb_backend() -> (StorageBackendType, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sensors.duckdb");
    let backend = StorageBackendType::DuckDb(DuckDbBackend::new(path.to_str().unwrap(), 4).unwrap());
    backend.sensor_store().init(&SensorType::ALL).await.unwrap();
    (backend, dir)
}

/// Application state over a fresh in-memory backend.
pub async fn memory_state() -> AppState {
    memory_state_with(ServiceConfig::default()).await
}

pub async fn memory_state_with(mut config: ServiceConfig) -> AppState {
    config.storage.engine = "memory".into();
    let backend = StorageBackendType::open(&config.storage).unwrap();
    backend.sensor_store().init(&SensorType::ALL).await.unwrap();
    AppState::new(config, &backend).unwrap()
}

/// One motion record in the mobile logger's wire format.
pub fn motion_record(name: &str, time_ns: i64, x: f64, y: f64, z: f64) -> serde_json::Value {
    json!({ "name": name, "time": time_ns, "values": { "x": x, "y": y, "z": z } })
}

pub fn batch(records: Vec<serde_json::Value>) -> Vec<u8> {
    serde_json::to_vec(&json!({ "payload": records })).unwrap()
}

/// `count` accelerometer records of a horizontal sway at `freq` Hz over
/// vertical jitter, sampled at 50 Hz and ending just before `end_ns`.
pub fn sway_records(count: usize, freq: f64, end_ns: i64) -> Vec<serde_json::Value> {
    let step = NANOS_PER_SEC / 50;
    let start = end_ns - step * count as i64;
    let mut seed = 17u64;
    (0..count)
        .map(|i| {
            let t = i as f64 / 50.0;
            seed = seed
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            let jitter = (seed >> 11) as f64 / (1u64 << 53) as f64 - 0.5;
            motion_record(
                "accelerometer",
                start + step * i as i64,
                (2.0 * PI * freq * t).sin(),
                0.5 * (2.0 * PI * freq * t).cos(),
                9.81 + jitter,
            )
        })
        .collect()
}
