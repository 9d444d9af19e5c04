//! Per-client motion features built on the spectral engine.

use crate::buffer::BufferedSample;
use crate::sensors::{Axes, Sample};
use crate::spectral::{self, DominantPeak, SpectralConfig, SpectralError};
use serde::Serialize;

/// Dominant frequency per axis plus the horizontal/vertical peak.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MotionFeatures {
    pub x: Option<DominantPeak>,
    pub y: Option<DominantPeak>,
    pub z: Option<DominantPeak>,
    pub hv: Option<DominantPeak>,
    pub sample_count: usize,
    /// Sustained horizontal oscillation was found.
    pub shake_detected: bool,
}

#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    config: SpectralConfig,
}

impl FeatureExtractor {
    pub fn new(config: SpectralConfig) -> Result<Self, SpectralError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn from_window(&self, window: &[BufferedSample]) -> Result<MotionFeatures, SpectralError> {
        self.compute(window.iter().map(|s| s.axes))
    }

    /// Features of durable samples; location rows are ignored.
    pub fn from_samples(&self, samples: &[Sample]) -> Result<MotionFeatures, SpectralError> {
        self.compute(samples.iter().filter_map(Sample::axis_values))
    }

    fn compute(&self, axes: impl Iterator<Item = Axes>) -> Result<MotionFeatures, SpectralError> {
        let (mut xs, mut ys, mut zs) = (Vec::new(), Vec::new(), Vec::new());
        for a in axes {
            xs.push(a.x);
            ys.push(a.y);
            zs.push(a.z);
        }

        let threshold = self.config.power_threshold_db;
        let sx = spectral::spectrogram(&xs, &self.config)?;
        let sy = spectral::spectrogram(&ys, &self.config)?;
        let sz = spectral::spectrogram(&zs, &self.config)?;
        let hv = spectral::hv_dominant_frequency(&sx, &sy, &sz, threshold)?;

        Ok(MotionFeatures {
            x: spectral::dominant_frequency(&sx, threshold),
            y: spectral::dominant_frequency(&sy, threshold),
            z: spectral::dominant_frequency(&sz, threshold),
            hv,
            sample_count: xs.len(),
            shake_detected: hv.is_some(),
        })
    }
}
