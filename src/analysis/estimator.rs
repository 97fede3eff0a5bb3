//! Autocorrelation pitch and amplitude estimation.
//!
//! Implements ACF2+: RMS gating, trimming of the buffer edges to the region
//! where the signal first drops below an amplitude threshold, unnormalized
//! autocorrelation, and parabolic refinement of the strongest period.

use serde::{Deserialize, Serialize};

/// Thresholds used by [`estimate`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EstimatorSettings {
    /// RMS below which the buffer is reported as silence.
    pub threshold_rms: f64,
    /// Absolute amplitude marking the trim points at either end.
    pub threshold_amplitude: f64,
}

impl Default for EstimatorSettings {
    fn default() -> Self {
        Self {
            threshold_rms: 0.01,
            threshold_amplitude: 0.2,
        }
    }
}

/// Pitch and loudness of one analysed buffer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PitchEstimate {
    /// Fundamental frequency in Hz, or `None` when no pitch was found.
    pub pitch: Option<f64>,
    /// Root mean square of the buffer.
    pub rms: f64,
    /// Mean absolute sample value of the buffer.
    pub amplitude: f64,
}

impl PitchEstimate {
    /// Sentinel value used for "no pitch" in flat representations.
    pub const NO_PITCH: f64 = -1.0;

    fn silent(rms: f64, amplitude: f64) -> Self {
        Self {
            pitch: None,
            rms,
            amplitude,
        }
    }

    /// Pitch in Hz, or `-1.0` when there is none.
    pub fn pitch_or_sentinel(&self) -> f64 {
        self.pitch.unwrap_or(Self::NO_PITCH)
    }

    /// Whether a pitch was detected.
    pub fn has_pitch(&self) -> bool {
        self.pitch.is_some()
    }
}

/// Estimates the pitch, RMS and mean amplitude of a mono buffer.
///
/// Never fails: buffers that are too quiet, too short, or have no periodic
/// structure yield `pitch: None`.
///
/// # Arguments
///
/// * `buffer` - Samples in [-1, 1]
/// * `sample_rate` - Sample rate in Hz
/// * `settings` - RMS and trim thresholds
///
/// # Examples
///
/// ```
/// use sound2midi::analysis::{estimate, EstimatorSettings};
///
/// let silence = vec![0.0f32; 1024];
/// let result = estimate(&silence, 32_000, &EstimatorSettings::default());
/// assert_eq!(result.pitch, None);
/// ```
pub fn estimate(buffer: &[f32], sample_rate: u32, settings: &EstimatorSettings) -> PitchEstimate {
    if buffer.is_empty() {
        return PitchEstimate::silent(0.0, 0.0);
    }

    let len = buffer.len() as f64;
    let (sum_sq, sum_abs) = buffer.iter().fold((0.0f64, 0.0f64), |(sq, abs), &s| {
        let s = s as f64;
        (sq + s * s, abs + s.abs())
    });
    let rms = (sum_sq / len).sqrt();
    let amplitude = sum_abs / len;

    if !rms.is_finite() || rms < settings.threshold_rms || buffer.len() < 3 {
        return PitchEstimate::silent(rms, amplitude);
    }

    let trimmed = trim_edges(buffer, settings.threshold_amplitude);
    let correlation = autocorrelate(trimmed);

    let pitch = peak_lag(&correlation)
        .map(|lag| refine_lag(&correlation, lag))
        .filter(|lag| lag.is_finite() && *lag > 0.0)
        .map(|lag| sample_rate as f64 / lag);

    PitchEstimate {
        pitch,
        rms,
        amplitude,
    }
}

/// Returns `buffer[r1..r2]`, where `r1` is the first sample in the first
/// half below `threshold` and `r2` the last such sample in the second half.
fn trim_edges(buffer: &[f32], threshold: f64) -> &[f32] {
    let size = buffer.len();
    let half = size.div_ceil(2);

    let r1 = (0..half)
        .find(|&i| (buffer[i] as f64).abs() < threshold)
        .unwrap_or(0);
    let r2 = (1..half)
        .map(|i| size - i)
        .find(|&i| (buffer[i] as f64).abs() < threshold)
        .unwrap_or(size - 1);

    if r1 < r2 {
        &buffer[r1..r2]
    } else {
        &[]
    }
}

/// Unnormalized autocorrelation `c[i] = Σ x[j]·x[j+i]` for every lag.
fn autocorrelate(buffer: &[f32]) -> Vec<f64> {
    let size = buffer.len();
    (0..size)
        .map(|lag| {
            buffer[..size - lag]
                .iter()
                .zip(&buffer[lag..])
                .map(|(&a, &b)| a as f64 * b as f64)
                .sum()
        })
        .collect()
}

/// Lag of the strongest peak after the zero-lag lobe.
///
/// Returns `None` if the correlation never stops decreasing, has no interior
/// maximum, or the buffer was all zeros.
fn peak_lag(c: &[f64]) -> Option<usize> {
    if c.len() < 3 || c[0] <= 0.0 {
        return None;
    }

    // Walk down the zero-lag lobe
    let mut d = 0;
    while d + 1 < c.len() && c[d] > c[d + 1] {
        d += 1;
    }
    if d + 1 >= c.len() {
        return None;
    }

    let mut max_val = f64::NEG_INFINITY;
    let mut max_pos = None;
    for (i, &value) in c.iter().enumerate().skip(d) {
        if value > max_val {
            max_val = value;
            max_pos = Some(i);
        }
    }

    // Parabolic refinement needs both neighbours
    max_pos.filter(|&pos| pos > 0 && pos + 1 < c.len())
}

/// Refines an integer lag with the vertex of the parabola through its
/// neighbours. Leaves the lag unchanged when the curvature is zero.
fn refine_lag(c: &[f64], lag: usize) -> f64 {
    let (x1, x2, x3) = (c[lag - 1], c[lag], c[lag + 1]);
    let a = (x1 + x3 - 2.0 * x2) / 2.0;
    let b = (x3 - x1) / 2.0;
    if a != 0.0 {
        lag as f64 - b / (2.0 * a)
    } else {
        lag as f64
    }
}
