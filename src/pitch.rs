//! YIN fundamental-frequency estimation.
//!
//! YIN is an autocorrelation-based monophonic pitch estimator built on the
//! cumulative mean normalized difference function (CMNDF). The per-frame
//! entry point returns `(pitch_hz, probability)` with `pitch_hz = -1.0` for
//! unvoiced frames; [`track`] aggregates frames across a whole buffer.

use crate::cancel::CancelToken;
use crate::frame::Frames;
use crate::io::AudioBuffer;

/// Pitch reported for frames where no periodicity was found.
pub const UNVOICED: f64 = -1.0;

/// Configuration for YIN pitch tracking.
///
/// # Example
/// ```
/// use encore::pitch::YinConfig;
///
/// let config = YinConfig::new(44100).with_threshold(0.15);
/// assert_eq!(config.frame_length, 2048);
/// ```
#[derive(Debug, Clone)]
pub struct YinConfig {
    /// Sample rate of the analyzed audio.
    pub sample_rate: u32,
    /// Length of analysis frames in samples.
    pub frame_length: usize,
    /// Minimum detectable frequency in Hz.
    pub fmin: f64,
    /// Maximum detectable frequency in Hz.
    pub fmax: f64,
    /// Absolute CMNDF threshold for candidate selection.
    pub threshold: f64,
}

impl YinConfig {
    /// Defaults matched to the analysis pipeline: 2048-sample frames, a
    /// vocal-friendly 40 Hz floor and a quarter-rate ceiling.
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            frame_length: 2048,
            fmin: 40.0,
            fmax: sample_rate as f64 / 4.0,
            threshold: 0.1,
        }
    }

    /// Set the frame length.
    pub fn with_frame_length(mut self, frame_length: usize) -> Self {
        self.frame_length = frame_length;
        self
    }

    /// Set the absolute threshold.
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }
}

/// One voiced pitch observation from [`track`].
#[derive(Debug, Clone, Copy)]
pub struct PitchFrame {
    /// Frame start time in milliseconds.
    pub time_ms: f64,
    /// Estimated fundamental frequency in Hz.
    pub pitch_hz: f64,
    /// Detection confidence in [0, 1].
    pub probability: f64,
}

/// Estimate the fundamental frequency of a single frame.
///
/// Computes the difference function and CMNDF, picks the first dip under
/// the absolute threshold, and refines the lag with parabolic
/// interpolation. Returns `(UNVOICED, 0.0)` when no candidate survives.
///
/// # Example
/// ```
/// use encore::io::tone;
/// use encore::pitch::{yin_frame, YinConfig};
///
/// let signal = tone(440.0, 44100, 0.1);
/// let config = YinConfig::new(44100);
/// let (pitch, probability) = yin_frame(&signal[..2048], &config);
/// assert!((pitch - 440.0).abs() < 10.0);
/// assert!(probability > 0.5);
/// ```
pub fn yin_frame(samples: &[f64], config: &YinConfig) -> (f64, f64) {
    let frame_len = samples.len();
    let tau_min = ((config.sample_rate as f64 / config.fmax).max(1.0)) as usize;
    let tau_max = ((config.sample_rate as f64 / config.fmin) as usize)
        .min(frame_len / 2);

    if tau_max <= tau_min || frame_len < tau_max {
        return (UNVOICED, 0.0);
    }

    // Difference function.
    let mut diff = vec![0.0f64; tau_max];
    for (tau, d) in diff.iter_mut().enumerate().skip(1) {
        let mut sum = 0.0f64;
        for j in 0..(frame_len - tau) {
            let delta = samples[j] - samples[j + tau];
            sum += delta * delta;
        }
        *d = sum;
    }

    // Cumulative mean normalized difference.
    let mut cmndf = vec![1.0f64; tau_max];
    let mut running_sum = 0.0f64;
    for tau in 1..tau_max {
        running_sum += diff[tau];
        if running_sum > 0.0 {
            cmndf[tau] = diff[tau] * tau as f64 / running_sum;
        }
    }

    // First dip under the absolute threshold, extended to its local minimum.
    let mut tau_estimate = 0usize;
    let mut tau = tau_min;
    while tau < tau_max {
        if cmndf[tau] < config.threshold {
            while tau + 1 < tau_max && cmndf[tau + 1] < cmndf[tau] {
                tau += 1;
            }
            tau_estimate = tau;
            break;
        }
        tau += 1;
    }

    if tau_estimate == 0 {
        return (UNVOICED, 0.0);
    }

    let probability = (1.0 - cmndf[tau_estimate]).clamp(0.0, 1.0);

    // Parabolic interpolation for sub-sample lag accuracy.
    let tau_refined = if tau_estimate > 0 && tau_estimate < tau_max - 1 {
        let s0 = cmndf[tau_estimate - 1];
        let s1 = cmndf[tau_estimate];
        let s2 = cmndf[tau_estimate + 1];
        let denom = s0 - 2.0 * s1 + s2;
        if denom.abs() > 1e-12 {
            tau_estimate as f64 + 0.5 * (s0 - s2) / denom
        } else {
            tau_estimate as f64
        }
    } else {
        tau_estimate as f64
    };

    if tau_refined <= 0.0 {
        return (UNVOICED, 0.0);
    }

    let pitch = config.sample_rate as f64 / tau_refined;
    if pitch < config.fmin || pitch > config.fmax {
        return (UNVOICED, 0.0);
    }

    (pitch, probability)
}

/// Track pitch across a whole buffer with non-overlapping frames.
///
/// Only voiced frames are returned; the caller sees `(time_ms, pitch_hz,
/// probability)` triples ordered by time. The cancel token is checked once
/// per frame.
pub fn track(
    buffer: &AudioBuffer,
    config: &YinConfig,
    cancel: &CancelToken,
) -> crate::Result<Vec<PitchFrame>> {
    let mut voiced = Vec::new();
    for frame in Frames::over(buffer, config.frame_length, config.frame_length) {
        cancel.bail_if_cancelled()?;
        let (pitch_hz, probability) = yin_frame(frame.samples, config);
        if pitch_hz > 0.0 {
            voiced.push(PitchFrame {
                time_ms: frame.start_ms,
                pitch_hz,
                probability,
            });
        }
    }
    log::debug!("pitch track: {} voiced frames", voiced.len());
    Ok(voiced)
}
