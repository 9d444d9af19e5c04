//! Decoding of inbound telemetry batches.
//!
//! A batch is a JSON body of the form
//! `{"payload": [{"name": "...", "time": <ns>, "values": {...}}, ...]}`.
//! Records for sensors we do not store and records missing required fields
//! are skipped and counted; neither aborts the batch.

use serde_json::{Map, Value};
use thiserror::Error;

use crate::sensors::{Location, Payload, SensorType, Timestamp};

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Invalid JSON body: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Invalid payload format")]
    PayloadNotList,
}

/// A record that decoded cleanly but is not yet attributed to a client.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedRecord {
    pub sensor_type: SensorType,
    pub timestamp: Timestamp,
    pub payload: Payload,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct DecodedBatch {
    pub records: Vec<DecodedRecord>,
    pub skipped_unsupported: usize,
    pub skipped_malformed: usize,
}

impl DecodedBatch {
    pub fn processed_count(&self) -> usize {
        self.records.len()
    }
}

/// Decodes batches against a fixed set of supported sensor types.
#[derive(Debug, Clone)]
pub struct SampleCodec {
    supported: Vec<SensorType>,
}

impl Default for SampleCodec {
    fn default() -> Self {
        Self::new(SensorType::ALL.to_vec())
    }
}

impl SampleCodec {
    pub fn new(supported: Vec<SensorType>) -> Self {
        Self { supported }
    }

    pub fn decode(&self, body: &[u8]) -> Result<DecodedBatch, CodecError> {
        let value: Value = serde_json::from_slice(body)?;
        self.decode_value(&value)
    }

    pub fn decode_value(&self, body: &Value) -> Result<DecodedBatch, CodecError> {
        let records = match body.get("payload") {
            Some(Value::Array(records)) => records.as_slice(),
            // A body without a payload is an empty batch
            None => &[],
            Some(_) => return Err(CodecError::PayloadNotList),
        };

        let mut batch = DecodedBatch::default();
        for raw in records {
            let Some(sensor_type) = self.sensor_for(raw) else {
                batch.skipped_unsupported += 1;
                continue;
            };
            match decode_record(sensor_type, raw) {
                Some(record) => batch.records.push(record),
                None => batch.skipped_malformed += 1,
            }
        }
        Ok(batch)
    }

    fn sensor_for(&self, raw: &Value) -> Option<SensorType> {
        let name = raw.get("name")?.as_str()?;
        self.supported.iter().copied().find(|t| t.as_str() == name)
    }
}

fn decode_record(sensor_type: SensorType, raw: &Value) -> Option<DecodedRecord> {
    let timestamp = parse_time(raw.get("time")?)?;
    let values = raw.get("values")?.as_object()?;
    let payload = if sensor_type.is_motion() {
        Payload::Axes(crate::sensors::Axes {
            x: number(values, &["x"])?,
            y: number(values, &["y"])?,
            z: number(values, &["z"])?,
        })
    } else {
        Payload::Location(Location {
            latitude: number(values, &["latitude"])?,
            longitude: number(values, &["longitude"])?,
            altitude: number(values, &["altitude"]),
            horizontal_accuracy: number(values, &["horizontal_accuracy", "horizontalAccuracy"]),
            vertical_accuracy: number(values, &["vertical_accuracy", "verticalAccuracy"]),
        })
    };
    Some(DecodedRecord {
        sensor_type,
        timestamp,
        payload,
    })
}

fn parse_time(value: &Value) -> Option<Timestamp> {
    match value {
        Value::Number(n) => n.as_i64().map(Timestamp::from_nanos),
        Value::String(s) => s.trim().parse::<i64>().ok().map(Timestamp::from_nanos),
        _ => None,
    }
}

fn number(values: &Map<String, Value>, keys: &[&str]) -> Option<f64> {
    keys.iter()
        .find_map(|key| values.get(*key))
        .and_then(Value::as_f64)
        .filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensors::Axes;
    use serde_json::json;

    #[test]
    fn decodes_motion_records() {
        let body = json!({"payload": [
            {"name": "accelerometer", "time": 1_000_000_000i64, "values": {"x": 1, "y": 2.5, "z": -3}}
        ]});
        let batch = SampleCodec::default().decode_value(&body).unwrap();
        assert_eq!(batch.processed_count(), 1);
        assert_eq!(
            batch.records[0],
            DecodedRecord {
                sensor_type: SensorType::Accelerometer,
                timestamp: Timestamp::from_nanos(1_000_000_000),
                payload: Payload::Axes(Axes { x: 1.0, y: 2.5, z: -3.0 }),
            }
        );
    }

    #[test]
    fn skips_unsupported_and_malformed_records() {
        let body = json!({"payload": [
            {"name": "magnetometer", "time": 1, "values": {"x": 1, "y": 2, "z": 3}},
            {"name": "gravity", "time": 2, "values": {"x": 1, "y": 2}},
            {"name": "gravity", "values": {"x": 1, "y": 2, "z": 3}},
            {"time": 3},
            {"name": "gyroscope", "time": "4", "values": {"x": 1, "y": 2, "z": 3}}
        ]});
        let batch = SampleCodec::default().decode_value(&body).unwrap();
        assert_eq!(batch.processed_count(), 1);
        assert_eq!(batch.skipped_unsupported, 2);
        assert_eq!(batch.skipped_malformed, 2);
        assert_eq!(batch.records[0].timestamp, Timestamp::from_nanos(4));
    }

    #[test]
    fn honours_the_supported_set() {
        let codec = SampleCodec::new(vec![SensorType::Gravity]);
        let body = json!({"payload": [
            {"name": "accelerometer", "time": 1, "values": {"x": 1, "y": 2, "z": 3}},
            {"name": "gravity", "time": 1, "values": {"x": 1, "y": 2, "z": 3}}
        ]});
        let batch = codec.decode_value(&body).unwrap();
        assert_eq!(batch.processed_count(), 1);
        assert_eq!(batch.skipped_unsupported, 1);
    }

    #[test]
    fn decodes_location_with_logger_field_names() {
        let body = json!({"payload": [
            {"name": "location", "time": 10, "values": {
                "latitude": 37.1, "longitude": -122.2, "altitude": 12.0,
                "horizontalAccuracy": 4.5
            }}
        ]});
        let batch = SampleCodec::default().decode_value(&body).unwrap();
        match batch.records[0].payload {
            Payload::Location(loc) => {
                assert_eq!(loc.horizontal_accuracy, Some(4.5));
                assert_eq!(loc.vertical_accuracy, None);
            }
            Payload::Axes(_) => panic!("expected a location payload"),
        }
    }

    #[test]
    fn rejects_non_list_payload_and_bad_json() {
        let codec = SampleCodec::default();
        assert!(matches!(
            codec.decode_value(&json!({"payload": {"name": "gravity"}})),
            Err(CodecError::PayloadNotList)
        ));
        assert!(matches!(codec.decode(b"not json"), Err(CodecError::InvalidJson(_))));
        assert_eq!(codec.decode(b"{}").unwrap().processed_count(), 0);
    }
}
