//! Sensor sample model shared by ingestion, storage, buffering and analysis.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Error, Result};

/// Sensor kinds the service knows how to store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorType {
    Accelerometer,
    Gravity,
    Gyroscope,
    #[serde(rename = "totalacceleration")]
    TotalAcceleration,
    Location,
}

impl SensorType {
    pub const ALL: [SensorType; 5] = [
        SensorType::Accelerometer,
        SensorType::Gravity,
        SensorType::Gyroscope,
        SensorType::TotalAcceleration,
        SensorType::Location,
    ];

    /// Tag used by clients in the `name` field of a record.
    pub fn as_str(&self) -> &'static str {
        match self {
            SensorType::Accelerometer => "accelerometer",
            SensorType::Gravity => "gravity",
            SensorType::Gyroscope => "gyroscope",
            SensorType::TotalAcceleration => "totalacceleration",
            SensorType::Location => "location",
        }
    }

    /// Name of the durable table holding this sensor's rows.
    pub fn table_name(&self) -> String {
        format!("{}_data", self.as_str())
    }

    /// Whether samples carry three axis values.
    pub fn is_motion(&self) -> bool {
        !matches!(self, SensorType::Location)
    }
}

impl fmt::Display for SensorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SensorType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        SensorType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| Error::Validation(format!("Unknown sensor type: {}", s)))
    }
}

/// Client-supplied instant, nanoseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub const MIN: Timestamp = Timestamp(i64::MIN);
    pub const MAX: Timestamp = Timestamp(i64::MAX);

    pub fn from_nanos(nanos: i64) -> Self {
        Timestamp(nanos)
    }

    pub fn as_nanos(&self) -> i64 {
        self.0
    }

    pub fn now() -> Self {
        Utc::now().into()
    }

    pub fn to_datetime(&self) -> DateTime<Utc> {
        Utc.timestamp_nanos(self.0)
    }

    pub fn saturating_sub(&self, duration: Duration) -> Self {
        let nanos = i64::try_from(duration.as_nanos()).unwrap_or(i64::MAX);
        Timestamp(self.0.saturating_sub(nanos))
    }

    pub fn saturating_add(&self, duration: Duration) -> Self {
        let nanos = i64::try_from(duration.as_nanos()).unwrap_or(i64::MAX);
        Timestamp(self.0.saturating_add(nanos))
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(dt: DateTime<Utc>) -> Self {
        // Out of range only past the year 2262
        Timestamp(dt.timestamp_nanos_opt().unwrap_or(i64::MAX))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_datetime().to_rfc3339())
    }
}

/// Three-axis reading from a motion sensor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Axes {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Position fix reported by the location sensor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: Option<f64>,
    pub horizontal_accuracy: Option<f64>,
    pub vertical_accuracy: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Payload {
    Axes(Axes),
    Location(Location),
}

/// One sensor reading from one client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub sensor_type: SensorType,
    pub client_id: String,
    pub timestamp: Timestamp,
    pub payload: Payload,
}

impl Sample {
    pub fn axes(
        sensor_type: SensorType,
        client_id: impl Into<String>,
        timestamp: Timestamp,
        x: f64,
        y: f64,
        z: f64,
    ) -> Self {
        Self {
            sensor_type,
            client_id: client_id.into(),
            timestamp,
            payload: Payload::Axes(Axes { x, y, z }),
        }
    }

    pub fn location(client_id: impl Into<String>, timestamp: Timestamp, location: Location) -> Self {
        Self {
            sensor_type: SensorType::Location,
            client_id: client_id.into(),
            timestamp,
            payload: Payload::Location(location),
        }
    }

    pub fn axis_values(&self) -> Option<Axes> {
        match self.payload {
            Payload::Axes(axes) => Some(axes),
            Payload::Location(_) => None,
        }
    }
}
