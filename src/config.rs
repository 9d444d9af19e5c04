//! Configuration management for the shakestream service.
//!
//! This module provides configuration handling through multiple sources:
//! 1. Default configuration (embedded in binary)
//! 2. System-wide configuration file (`/etc/shakestream/config.toml`)
//! 3. User-specified configuration file
//! 4. Environment variables (prefixed with `SHAKESTREAM_`, sections separated
//!    by `__`, e.g. `SHAKESTREAM_STORAGE__ENGINE=memory`)
//! 5. Command-line arguments
//!
//! Configuration options are loaded in order of precedence, with later sources
//! overriding earlier ones.

use crate::error::{Error, Result};
use crate::sensors::SensorType;
use crate::spectral::SpectralConfig;
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_CONFIG: &str = include_str!("../config/default.toml");

/// Command-line arguments
#[derive(Debug, Default, Parser)]
#[clap(version, about = "Motion-sensor ingestion and shake detection service")]
pub struct Args {
    /// Configuration file path
    #[clap(short, long, env = "SHAKESTREAM_CONFIG")]
    pub config: Option<PathBuf>,

    /// Address to listen on
    #[clap(long)]
    pub host: Option<String>,

    /// Port to listen on
    #[clap(short, long)]
    pub port: Option<u16>,

    /// Storage engine type (duckdb, memory)
    #[clap(long)]
    pub engine: Option<String>,

    /// Storage engine connection string
    #[clap(long)]
    pub engine_connection: Option<String>,

    /// Identify clients by ip:port instead of ip
    #[clap(long)]
    pub include_client_port: Option<bool>,

    /// Retention horizon in seconds
    #[clap(long)]
    pub retention_secs: Option<u64>,

    /// Enable verbose logging (-v for debug, -vv for trace)
    #[clap(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Log level (trace, debug, info, warn, error)
    #[clap(long = "log-level")]
    pub log_level: Option<String>,

    /// Directory for the daily rolling log file
    #[clap(long = "log-dir")]
    pub log_dir: Option<PathBuf>,
}

/// Service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub retention: RetentionConfig,
    pub sensors: SensorsConfig,
    pub buffer: BufferConfig,
    pub analysis: AnalysisConfig,
    pub logging: LoggingConfig,
}

/// HTTP listener settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Upper bound on a single non-ingestion request, in seconds. Ingestion
    /// is bounded by `storage.store_timeout_ms` instead.
    pub request_timeout_secs: u64,
    /// Largest accepted ingestion body in bytes. Larger batches are answered
    /// with an error status.
    pub max_body_bytes: usize,
    /// Use `ip:port` as client identity so several devices behind one NAT
    /// stay apart. Reconnecting clients then show up as new clients, and
    /// each one keeps its own live window in memory for the life of the
    /// process: live windows are never evicted.
    pub include_client_port: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 56204,
            request_timeout_secs: 30,
            max_body_bytes: 32 * 1024 * 1024,
            include_client_port: false,
        }
    }
}

/// Storage backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Storage engine type
    pub engine: String,
    /// Connection string: a database path or `:memory:`
    pub connection: String,
    /// Upper bound on one insert, in milliseconds
    pub store_timeout_ms: u64,
    /// Rows deleted per retention chunk
    pub sweep_chunk_rows: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            engine: "duckdb".into(),
            connection: ":memory:".into(),
            store_timeout_ms: 5000,
            sweep_chunk_rows: 10_000,
        }
    }
}

impl StorageConfig {
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    pub horizon_secs: u64,
    pub sweep_interval_secs: u64,
    pub initial_delay_secs: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            horizon_secs: 86400,
            sweep_interval_secs: 3600,
            initial_delay_secs: 60,
        }
    }
}

impl RetentionConfig {
    pub fn horizon(&self) -> Duration {
        Duration::from_secs(self.horizon_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_secs(self.initial_delay_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorsConfig {
    pub supported: Vec<SensorType>,
}

impl Default for SensorsConfig {
    fn default() -> Self {
        Self {
            supported: SensorType::ALL.to_vec(),
        }
    }
}

/// Live window sizing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    pub window_secs: f64,
    pub nominal_rate_hz: f64,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            window_secs: 60.0,
            nominal_rate_hz: 50.0,
        }
    }
}

impl BufferConfig {
    /// Samples per live window: `ceil(window_secs * nominal_rate_hz)`, at
    /// least one.
    pub fn capacity(&self) -> usize {
        (self.window_secs * self.nominal_rate_hz).ceil().max(1.0) as usize
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub segment_len: usize,
    pub overlap: usize,
    pub band_low_hz: f64,
    pub band_high_hz: f64,
    pub power_threshold_db: f64,
    pub smoothing_sigma: f64,
    /// How far back a client must have sent data to count as active
    pub active_lookback_secs: u64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        let spectral = SpectralConfig::default();
        Self {
            segment_len: spectral.segment_len,
            overlap: spectral.overlap,
            band_low_hz: spectral.band_low_hz,
            band_high_hz: spectral.band_high_hz,
            power_threshold_db: spectral.power_threshold_db,
            smoothing_sigma: spectral.smoothing_sigma,
            active_lookback_secs: 60,
        }
    }
}

/// Logging configuration that can be set via CLI, env vars, or config file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    #[serde(skip)]
    pub verbose: u8,
    /// Log level (trace, debug, info, warn, error)
    pub level: Option<String>,
    /// Log filter directives, overriding `level`
    pub filter: Option<String>,
    /// Directory for a daily rolling log file
    pub directory: Option<PathBuf>,
}

impl LoggingConfig {
    pub fn get_effective_level(&self) -> &str {
        match (self.verbose, self.level.as_deref()) {
            (v, _) if v >= 2 => "trace",
            (1, _) => "debug",
            (0, Some(level)) => level,
            _ => "info",
        }
    }
}

impl ServiceConfig {
    /// Load configuration from all sources
    pub fn load(args: &Args) -> Result<Self> {
        let mut builder = config::Config::builder()
            .add_source(config::File::from_str(DEFAULT_CONFIG, config::FileFormat::Toml))
            .add_source(config::File::with_name("/etc/shakestream/config.toml").required(false));

        // Load user config if specified
        if let Some(path) = &args.config {
            builder = builder.add_source(config::File::from(path.as_path()));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("SHAKESTREAM")
                .prefix_separator("_")
                .separator("__"),
        );

        let mut config: ServiceConfig = builder.build()?.try_deserialize()?;
        config.apply_args(args);
        Ok(config)
    }

    fn apply_args(&mut self, args: &Args) {
        if let Some(host) = &args.host {
            self.server.host = host.clone();
        }
        if let Some(port) = args.port {
            self.server.port = port;
        }
        if let Some(engine) = &args.engine {
            self.storage.engine = engine.clone();
        }
        if let Some(connection) = &args.engine_connection {
            self.storage.connection = connection.clone();
        }
        if let Some(include) = args.include_client_port {
            self.server.include_client_port = include;
        }
        if let Some(secs) = args.retention_secs {
            self.retention.horizon_secs = secs;
        }
        self.logging.verbose = args.verbose;
        if let Some(level) = &args.log_level {
            self.logging.level = Some(level.clone());
        }
        if let Some(dir) = &args.log_dir {
            self.logging.directory = Some(dir.clone());
        }
    }

    /// Spectral parameters, sampled at the nominal buffer rate.
    pub fn spectral_config(&self) -> SpectralConfig {
        SpectralConfig {
            fs: self.buffer.nominal_rate_hz,
            segment_len: self.analysis.segment_len,
            overlap: self.analysis.overlap,
            band_low_hz: self.analysis.band_low_hz,
            band_high_hz: self.analysis.band_high_hz,
            power_threshold_db: self.analysis.power_threshold_db,
            smoothing_sigma: self.analysis.smoothing_sigma,
        }
    }

    /// Reject settings the service cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.server.request_timeout_secs == 0 {
            return Err(Error::Config("server.request_timeout_secs must be positive".into()));
        }
        if self.server.max_body_bytes == 0 {
            return Err(Error::Config("server.max_body_bytes must be positive".into()));
        }
        if !matches!(self.storage.engine.as_str(), "duckdb" | "memory") {
            return Err(Error::Config(format!(
                "Invalid engine type: {}",
                self.storage.engine
            )));
        }
        if self.storage.sweep_chunk_rows == 0 {
            return Err(Error::Config("storage.sweep_chunk_rows must be positive".into()));
        }
        if self.storage.store_timeout_ms == 0 {
            return Err(Error::Config("storage.store_timeout_ms must be positive".into()));
        }
        if self.storage.store_timeout_ms >= self.server.request_timeout_secs.saturating_mul(1000) {
            return Err(Error::Config(format!(
                "storage.store_timeout_ms ({}) must be shorter than server.request_timeout_secs ({} s)",
                self.storage.store_timeout_ms, self.server.request_timeout_secs
            )));
        }
        if self.retention.horizon_secs == 0 || self.retention.sweep_interval_secs == 0 {
            return Err(Error::Config(
                "retention horizon and sweep interval must be positive".into(),
            ));
        }
        if self.sensors.supported.is_empty() {
            return Err(Error::Config("sensors.supported must not be empty".into()));
        }
        if !(self.buffer.window_secs > 0.0 && self.buffer.nominal_rate_hz > 0.0) {
            return Err(Error::Config(
                "buffer window and nominal rate must be positive".into(),
            ));
        }
        self.spectral_config()
            .validate()
            .map_err(|e| Error::Config(e.to_string()))?;
        if self.buffer.capacity() < self.analysis.segment_len {
            return Err(Error::Config(format!(
                "buffer holds {} samples, fewer than one analysis segment of {}",
                self.buffer.capacity(),
                self.analysis.segment_len
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_config_defaults() {
        let config = ServiceConfig::load(&Args::default()).unwrap();
        assert_eq!(config.server.port, 56204);
        assert_eq!(config.storage.engine, "duckdb");
        assert_eq!(config.retention.horizon_secs, 86400);
        assert_eq!(config.retention.sweep_interval_secs, 3600);
        assert_eq!(config.sensors.supported, SensorType::ALL.to_vec());
        assert_eq!(config.buffer.capacity(), 3000);
        assert_eq!(config.spectral_config(), SpectralConfig::default());
        assert_eq!(config.logging.get_effective_level(), "info");
        config.validate().unwrap();
    }

    #[test]
    fn test_user_file_and_cli_override() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[retention]\nhorizon_secs = 600\n\n[sensors]\nsupported = [\"gyroscope\"]"
        )
        .unwrap();

        let args = Args {
            config: Some(file.path().to_path_buf()),
            engine: Some("memory".into()),
            port: Some(9000),
            verbose: 1,
            ..Args::default()
        };
        let config = ServiceConfig::load(&args).unwrap();
        assert_eq!(config.retention.horizon_secs, 600);
        // untouched keys keep their defaults
        assert_eq!(config.retention.sweep_interval_secs, 3600);
        assert_eq!(config.sensors.supported, vec![SensorType::Gyroscope]);
        assert_eq!(config.storage.engine, "memory");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.logging.get_effective_level(), "debug");
    }

    #[test]
    fn test_validate_rejects_bad_analysis() {
        let mut config = ServiceConfig::default();
        config.analysis.segment_len = 200;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = ServiceConfig::default();
        config.buffer.window_secs = 1.0;
        assert!(config.validate().is_err());

        let mut config = ServiceConfig::default();
        config.storage.engine = "postgres".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_request_timeout_below_store_timeout() {
        let mut config = ServiceConfig::default();
        config.server.request_timeout_secs = 0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = ServiceConfig::default();
        config.server.request_timeout_secs = 1;
        config.storage.store_timeout_ms = 5000;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        config.storage.store_timeout_ms = 1000;
        assert!(config.validate().is_err());
        config.storage.store_timeout_ms = 999;
        config.validate().unwrap();
    }

    #[test]
    fn test_buffer_capacity_uses_nominal_rate() {
        let sized = |window_secs, nominal_rate_hz| {
            BufferConfig {
                window_secs,
                nominal_rate_hz,
            }
            .capacity()
        };
        assert_eq!(sized(10.0, 50.0), 500);
        assert_eq!(sized(10.01, 50.0), 501);
        assert_eq!(sized(0.01, 50.0), 1);
        assert_eq!(sized(0.0, 50.0), 1);
    }

    #[test]
    fn test_effective_level() {
        let mut logging = LoggingConfig {
            level: Some("warn".into()),
            ..LoggingConfig::default()
        };
        assert_eq!(logging.get_effective_level(), "warn");
        logging.verbose = 3;
        assert_eq!(logging.get_effective_level(), "trace");
    }
}
