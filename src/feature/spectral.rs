//! Segment-level spectral descriptors used by the sound fingerprinter.
//!
//! All spectrum-domain features are computed over the first
//! `min(len, 2048)` samples of a segment, zero-padded to 2048; time-domain
//! features (ZCR, RMS, transient length) use the raw segment.

use crate::fft;
use crate::window;

/// FFT size for segment spectra.
pub const SEGMENT_FFT_SIZE: usize = 2048;
/// Fraction of total spectral energy below the rolloff frequency.
pub const ROLLOFF_FRACTION: f64 = 0.85;

/// Magnitude spectrum of a segment: Hann-windowed, zero-padded to
/// [`SEGMENT_FFT_SIZE`].
pub fn segment_spectrum(segment: &[f64]) -> Vec<f64> {
    let n = segment.len().min(SEGMENT_FFT_SIZE);
    let mut padded = vec![0.0f64; SEGMENT_FFT_SIZE];
    padded[..n].copy_from_slice(&segment[..n]);
    window::apply(&mut padded[..n], &window::hann(n));
    fft::magnitude_spectrum(&padded)
}

/// Magnitude-weighted mean frequency: `Σ f·|X(f)| / Σ |X(f)|`.
///
/// Returns 0 for silent spectra. Brightness cue: claps sit around
/// 2–4 kHz, muffled thuds well below.
pub fn spectral_centroid(magnitudes: &[f64], sample_rate: u32) -> f64 {
    let mut weighted = 0.0f64;
    let mut total = 0.0f64;
    for (k, &m) in magnitudes.iter().enumerate() {
        weighted += fft::bin_frequency(k, sample_rate, SEGMENT_FFT_SIZE) * m;
        total += m;
    }
    if total > 1e-10 { weighted / total } else { 0.0 }
}

/// Lowest frequency below which [`ROLLOFF_FRACTION`] of the total spectral
/// power resides. Falls back to Nyquist for empty spectra.
pub fn spectral_rolloff(magnitudes: &[f64], sample_rate: u32) -> f64 {
    let total: f64 = magnitudes.iter().map(|m| m * m).sum();
    let threshold = ROLLOFF_FRACTION * total;
    let mut cumulative = 0.0f64;
    for (k, &m) in magnitudes.iter().enumerate() {
        cumulative += m * m;
        if cumulative >= threshold && total > 0.0 {
            return fft::bin_frequency(k, sample_rate, SEGMENT_FFT_SIZE);
        }
    }
    sample_rate as f64 / 2.0
}

/// Wiener entropy: geometric mean over arithmetic mean of the magnitude
/// spectrum. 1 for white noise, near 0 for a pure tone.
pub fn spectral_flatness(magnitudes: &[f64]) -> f64 {
    if magnitudes.is_empty() {
        return 0.0;
    }
    let mut log_sum = 0.0f64;
    let mut sum = 0.0f64;
    for &m in magnitudes {
        let m = m.max(1e-10);
        log_sum += m.ln();
        sum += m;
    }
    let geometric = (log_sum / magnitudes.len() as f64).exp();
    let arithmetic = sum / magnitudes.len() as f64;
    if arithmetic > 1e-10 {
        (geometric / arithmetic).clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Fraction of samples at which the signal changes sign.
pub fn zero_crossing_rate(samples: &[f64]) -> f64 {
    if samples.len() < 2 {
        return 0.0;
    }
    let mut crossings = 0usize;
    for pair in samples.windows(2) {
        if (pair[1] >= 0.0 && pair[0] < 0.0) || (pair[1] < 0.0 && pair[0] >= 0.0) {
            crossings += 1;
        }
    }
    crossings as f64 / samples.len() as f64
}

/// Root mean square energy of a segment.
pub fn rms(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples.iter().map(|s| s * s).sum();
    (sum / samples.len() as f64).sqrt()
}

/// Time in milliseconds from the peak-magnitude sample to the first later
/// sample below 10 % of the peak. 0 when the segment never decays.
pub fn transient_duration_ms(samples: &[f64], sample_rate: u32) -> f64 {
    let mut peak = 0.0f64;
    let mut peak_idx = 0usize;
    for (i, &s) in samples.iter().enumerate() {
        if s.abs() > peak {
            peak = s.abs();
            peak_idx = i;
        }
    }

    let threshold = peak * 0.1;
    let mut decay_idx = peak_idx;
    for (i, &s) in samples.iter().enumerate().skip(peak_idx) {
        if s.abs() < threshold {
            decay_idx = i;
            break;
        }
    }

    (decay_idx - peak_idx) as f64 * 1000.0 / sample_rate as f64
}
