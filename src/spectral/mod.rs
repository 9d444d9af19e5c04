//! Short-time spectral analysis of motion signals.
//!
//! A signal is cut into overlapping segments; each segment is detrended,
//! tapered with a Tukey window and transformed into a one-sided power
//! spectral density. The resulting time-frequency grid is smoothed with a
//! Gaussian kernel and restricted to the band of interest before peaks are
//! extracted from it.
//!
//! Every function here is a pure computation over its inputs.

mod fft;
pub mod smoothing;
pub mod window;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Floor applied before taking logarithms so silent bins stay finite.
pub const POWER_FLOOR: f64 = 1e-20;

/// Taper fraction of the segment window.
pub const TUKEY_ALPHA: f64 = 0.25;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SpectralError {
    #[error("need at least {needed} samples, got {got}")]
    InsufficientSamples { needed: usize, got: usize },

    #[error("frequency grids differ between axes")]
    GridMismatch,

    #[error("invalid spectral configuration: {0}")]
    InvalidConfig(String),
}

/// Parameters of the spectral pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpectralConfig {
    /// Sample rate in Hz.
    pub fs: f64,
    /// Samples per segment, a power of two.
    pub segment_len: usize,
    /// Samples shared by consecutive segments.
    pub overlap: usize,
    pub band_low_hz: f64,
    pub band_high_hz: f64,
    /// Peaks at or below this level (dB) are not reported.
    pub power_threshold_db: f64,
    /// Gaussian smoothing width in grid cells; zero disables smoothing.
    pub smoothing_sigma: f64,
}

impl Default for SpectralConfig {
    fn default() -> Self {
        Self {
            fs: 50.0,
            segment_len: 256,
            overlap: 128,
            band_low_hz: 0.05,
            band_high_hz: 4.0,
            power_threshold_db: -30.0,
            smoothing_sigma: 1.0,
        }
    }
}

impl SpectralConfig {
    pub fn validate(&self) -> Result<(), SpectralError> {
        if !(self.fs.is_finite() && self.fs > 0.0) {
            return Err(SpectralError::InvalidConfig(format!(
                "sample rate must be positive, got {}",
                self.fs
            )));
        }
        if self.segment_len < 2 || !self.segment_len.is_power_of_two() {
            return Err(SpectralError::InvalidConfig(format!(
                "segment length must be a power of two >= 2, got {}",
                self.segment_len
            )));
        }
        if self.overlap >= self.segment_len {
            return Err(SpectralError::InvalidConfig(format!(
                "overlap {} must be smaller than segment length {}",
                self.overlap, self.segment_len
            )));
        }
        if !(self.band_low_hz >= 0.0 && self.band_low_hz < self.band_high_hz) {
            return Err(SpectralError::InvalidConfig(format!(
                "empty band {}..{} Hz",
                self.band_low_hz, self.band_high_hz
            )));
        }
        if !(self.smoothing_sigma >= 0.0) {
            return Err(SpectralError::InvalidConfig(
                "smoothing sigma must not be negative".to_owned(),
            ));
        }
        Ok(())
    }

    fn hop(&self) -> usize {
        self.segment_len - self.overlap
    }
}

/// Power spectral density over time, restricted to the analysis band.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Spectrogram {
    /// Bin centre frequencies in Hz, ascending.
    pub frequencies: Vec<f64>,
    /// Segment centre times in seconds from the first sample.
    pub times: Vec<f64>,
    /// `power[bin][segment]`, in units²/Hz.
    pub power: Vec<Vec<f64>>,
}

impl Spectrogram {
    /// Power per bin accumulated over all segments, in dB.
    pub fn integrated_db(&self) -> Vec<f64> {
        self.power
            .iter()
            .map(|row| to_db(row.iter().sum()))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DominantPeak {
    pub frequency_hz: f64,
    /// Level of the peak in dB; for H/V peaks, the ratio in dB.
    pub power_db: f64,
}

fn to_db(power: f64) -> f64 {
    10.0 * power.max(POWER_FLOOR).log10()
}

/// Compute the band-limited, smoothed spectrogram of `signal`.
pub fn spectrogram(signal: &[f64], config: &SpectralConfig) -> Result<Spectrogram, SpectralError> {
    config.validate()?;
    let n = config.segment_len;
    if signal.len() < n {
        return Err(SpectralError::InsufficientSamples {
            needed: n,
            got: signal.len(),
        });
    }

    let window = window::tukey(n, TUKEY_ALPHA);
    let window_power: f64 = window.iter().map(|w| w * w).sum();
    let scale = 1.0 / (config.fs * window_power);
    let hop = config.hop();
    let segments = (signal.len() - n) / hop + 1;
    let bins = n / 2 + 1;

    let mut power = vec![vec![0.0; segments]; bins];
    let mut times = Vec::with_capacity(segments);
    let mut tapered = vec![0.0; n];
    for seg in 0..segments {
        let start = seg * hop;
        let chunk = &signal[start..start + n];
        let mean = chunk.iter().sum::<f64>() / n as f64;
        for ((out, x), w) in tapered.iter_mut().zip(chunk).zip(&window) {
            *out = (x - mean) * w;
        }
        for (bin, p) in fft::one_sided_power(&tapered).into_iter().enumerate() {
            // one-sided: fold negative frequencies except DC and Nyquist
            let fold = if bin == 0 || bin == n / 2 { 1.0 } else { 2.0 };
            power[bin][seg] = p * scale * fold;
        }
        times.push((start as f64 + n as f64 / 2.0) / config.fs);
    }

    smoothing::gaussian_2d(&mut power, config.smoothing_sigma);

    let resolution = config.fs / n as f64;
    let (frequencies, power): (Vec<f64>, Vec<Vec<f64>>) = power
        .into_iter()
        .enumerate()
        .map(|(bin, row)| (bin as f64 * resolution, row))
        .filter(|(f, _)| *f >= config.band_low_hz && *f <= config.band_high_hz)
        .unzip();

    Ok(Spectrogram {
        frequencies,
        times,
        power,
    })
}

/// Strongest band frequency of a spectrogram, if it rises above
/// `threshold_db`.
pub fn dominant_frequency(spec: &Spectrogram, threshold_db: f64) -> Option<DominantPeak> {
    let peak = spec
        .integrated_db()
        .into_iter()
        .zip(&spec.frequencies)
        .max_by(|a, b| a.0.total_cmp(&b.0))?;
    (peak.0 > threshold_db).then(|| DominantPeak {
        frequency_hz: *peak.1,
        power_db: peak.0,
    })
}

/// Frequency where horizontal motion most exceeds vertical motion.
///
/// The ratio per bin is `mean(dB_x, dB_y) - dB_z`. Nothing is reported when
/// any axis stays at or below `threshold_db`, or when no bin's ratio exceeds
/// it. All three spectrograms must share one frequency grid.
pub fn hv_dominant_frequency(
    x: &Spectrogram,
    y: &Spectrogram,
    z: &Spectrogram,
    threshold_db: f64,
) -> Result<Option<DominantPeak>, SpectralError> {
    if x.frequencies != y.frequencies || x.frequencies != z.frequencies {
        return Err(SpectralError::GridMismatch);
    }
    let (dx, dy, dz) = (x.integrated_db(), y.integrated_db(), z.integrated_db());

    let quiet = |curve: &[f64]| curve.iter().all(|db| *db <= threshold_db);
    if quiet(&dx) || quiet(&dy) || quiet(&dz) {
        return Ok(None);
    }

    let peak = dx
        .iter()
        .zip(&dy)
        .zip(&dz)
        .map(|((bx, by), bz)| (bx + by) / 2.0 - bz)
        .zip(&x.frequencies)
        .filter(|(ratio, _)| *ratio > threshold_db)
        .max_by(|a, b| a.0.total_cmp(&b.0));

    Ok(peak.map(|(ratio, f)| DominantPeak {
        frequency_hz: *f,
        power_db: ratio,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn sine(freq: f64, amplitude: f64, len: usize, fs: f64) -> Vec<f64> {
        (0..len)
            .map(|i| amplitude * (2.0 * PI * freq * i as f64 / fs).sin())
            .collect()
    }

    /// Deterministic white-ish noise in [-amplitude, amplitude].
    fn noise(amplitude: f64, len: usize, mut seed: u64) -> Vec<f64> {
        (0..len)
            .map(|_| {
                seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                let unit = (seed >> 11) as f64 / (1u64 << 53) as f64;
                amplitude * (2.0 * unit - 1.0)
            })
            .collect()
    }

    fn grid(frequencies: Vec<f64>, rows: Vec<f64>) -> Spectrogram {
        Spectrogram {
            frequencies,
            times: vec![0.0],
            power: rows.into_iter().map(|p| vec![p]).collect(),
        }
    }

    #[test]
    fn shape_follows_segmenting() {
        let config = SpectralConfig::default();
        let spec = spectrogram(&sine(1.0, 1.0, 1024, 50.0), &config).unwrap();
        // (1024 - 256) / 128 + 1
        assert_eq!(spec.times.len(), 7);
        assert!((spec.times[0] - 128.0 / 50.0).abs() < 1e-12);
        assert!(spec.frequencies.iter().all(|f| (0.05..=4.0).contains(f)));
        // bins 1..=20 of 50/256 Hz fall inside 0.05..4 Hz
        assert_eq!(spec.frequencies.len(), 20);
        assert!(spec.power.iter().all(|row| row.len() == 7));
    }

    #[test]
    fn sine_peak_is_found_within_one_bin() {
        let config = SpectralConfig::default();
        let resolution = config.fs / config.segment_len as f64;
        for f0 in [0.8, 1.5, 2.7] {
            let spec = spectrogram(&sine(f0, 1.0, 1500, config.fs), &config).unwrap();
            let peak = dominant_frequency(&spec, config.power_threshold_db).expect("peak");
            assert!(
                (peak.frequency_hz - f0).abs() <= resolution,
                "f0 {f0}: got {}",
                peak.frequency_hz
            );
        }
    }

    #[test]
    fn weak_noise_has_no_dominant_frequency() {
        let config = SpectralConfig::default();
        let spec = spectrogram(&noise(1e-4, 1024, 7), &config).unwrap();
        assert_eq!(dominant_frequency(&spec, config.power_threshold_db), None);
    }

    #[test]
    fn short_signal_is_rejected() {
        let err = spectrogram(&[0.0; 100], &SpectralConfig::default()).unwrap_err();
        assert_eq!(err, SpectralError::InsufficientSamples { needed: 256, got: 100 });
    }

    #[test]
    fn invalid_configs_are_rejected() {
        let bad = [
            SpectralConfig { segment_len: 200, ..Default::default() },
            SpectralConfig { overlap: 256, ..Default::default() },
            SpectralConfig { band_low_hz: 5.0, ..Default::default() },
            SpectralConfig { fs: 0.0, ..Default::default() },
        ];
        for config in bad {
            assert!(matches!(config.validate(), Err(SpectralError::InvalidConfig(_))));
        }
    }

    #[test]
    fn constant_offset_is_removed() {
        let config = SpectralConfig { smoothing_sigma: 0.0, band_low_hz: 0.0, ..Default::default() };
        let spec = spectrogram(&vec![9.81; 512], &config).unwrap();
        assert!(spec.power.iter().flatten().all(|p| p.abs() < 1e-20));
    }

    #[test]
    fn hv_picks_bin_of_horizontal_excess() {
        let freqs = vec![0.5, 1.0, 1.5, 2.0];
        let z = grid(freqs.clone(), vec![1.0; 4]);
        let mut horizontal = vec![1.0; 4];
        horizontal[2] = 100.0;
        let x = grid(freqs.clone(), horizontal.clone());
        let y = grid(freqs, horizontal);

        let peak = hv_dominant_frequency(&x, &y, &z, -30.0).unwrap().expect("peak");
        assert_eq!(peak.frequency_hz, 1.5);
        assert!((peak.power_db - 20.0).abs() < 1e-9);
    }

    #[test]
    fn hv_identical_spectra_below_threshold_ratio() {
        let freqs = vec![0.5, 1.0];
        let s = grid(freqs, vec![10.0, 10.0]);
        // every axis sits at 10 dB, so the ratio is 0 dB and never above 3 dB
        assert_eq!(hv_dominant_frequency(&s, &s, &s, 3.0).unwrap(), None);
    }

    #[test]
    fn hv_quiet_axis_yields_none() {
        let freqs = vec![0.5, 1.0];
        let loud = grid(freqs.clone(), vec![1.0, 1.0]);
        let quiet = grid(freqs, vec![1e-9, 1e-9]);
        assert_eq!(hv_dominant_frequency(&loud, &loud, &quiet, -30.0).unwrap(), None);
    }

    #[test]
    fn hv_mismatched_grids_fail() {
        let a = grid(vec![0.5, 1.0], vec![1.0, 1.0]);
        let b = grid(vec![0.5, 1.25], vec![1.0, 1.0]);
        assert_eq!(hv_dominant_frequency(&a, &a, &b, -30.0), Err(SpectralError::GridMismatch));
    }
}
