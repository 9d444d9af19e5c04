//! Live per-client windows of the most recent motion samples.
//!
//! One bounded ring per `(client_id, sensor_type)`. Each ring has its own
//! lock, so admissions for different keys never contend; the map lock is
//! only taken to find or create a ring.

use crate::sensors::{Axes, Sample, SensorType, Timestamp};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct BufferKey {
    pub client_id: String,
    pub sensor_type: SensorType,
}

impl BufferKey {
    pub fn new(client_id: impl Into<String>, sensor_type: SensorType) -> Self {
        Self {
            client_id: client_id.into(),
            sensor_type,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BufferedSample {
    pub timestamp: Timestamp,
    pub axes: Axes,
}

#[derive(Debug)]
struct Ring {
    entries: VecDeque<BufferedSample>,
    capacity: usize,
}

impl Ring {
    fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    fn push(&mut self, sample: BufferedSample) -> bool {
        if let Some(last) = self.entries.back() {
            if sample.timestamp <= last.timestamp {
                return false;
            }
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(sample);
        true
    }
}

#[derive(Debug)]
pub struct LiveBuffer {
    rings: RwLock<HashMap<BufferKey, Arc<Mutex<Ring>>>>,
    capacity: usize,
}

impl LiveBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            rings: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append a motion sample to its ring.
    ///
    /// Returns `false` for location samples and for samples not strictly
    /// newer than the last buffered one for the same key.
    pub fn admit(&self, sample: &Sample) -> bool {
        let Some(axes) = sample.axis_values() else {
            return false;
        };
        let key = BufferKey::new(sample.client_id.as_str(), sample.sensor_type);
        let ring = self.ring_for(key);
        let admitted = ring.lock().push(BufferedSample {
            timestamp: sample.timestamp,
            axes,
        });
        admitted
    }

    /// Ordered copy of the current window for `key`.
    pub fn snapshot(&self, key: &BufferKey) -> Vec<BufferedSample> {
        let ring = self.rings.read().get(key).cloned();
        match ring {
            Some(ring) => ring.lock().entries.iter().copied().collect(),
            None => Vec::new(),
        }
    }

    pub fn len(&self, key: &BufferKey) -> usize {
        let ring = self.rings.read().get(key).cloned();
        ring.map(|r| r.lock().entries.len()).unwrap_or(0)
    }

    pub fn keys(&self) -> Vec<BufferKey> {
        let mut keys: Vec<BufferKey> = self.rings.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    fn ring_for(&self, key: BufferKey) -> Arc<Mutex<Ring>> {
        if let Some(ring) = self.rings.read().get(&key) {
            return ring.clone();
        }
        let capacity = self.capacity;
        self.rings
            .write()
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(Ring::new(capacity))))
            .clone()
    }
}
