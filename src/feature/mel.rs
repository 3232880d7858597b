use ndarray::Array2;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Number of triangular mel filters in the analysis filterbank.
pub const NUM_MEL_FILTERS: usize = 40;
/// Lower edge of the filterbank in Hz.
pub const MEL_LOW_HZ: f64 = 300.0;

/// Convert frequency in Hz to the mel scale.
///
/// Uses the HTK formula `2595 · log10(1 + f/700)`.
///
/// # Example
/// ```
/// use encore::feature::mel::hz_to_mel;
///
/// assert!((hz_to_mel(0.0)).abs() < 1e-12);
/// assert!(hz_to_mel(1000.0) > 999.0 && hz_to_mel(1000.0) < 1001.0);
/// ```
pub fn hz_to_mel(hz: f64) -> f64 {
    2595.0 * (1.0 + hz / 700.0).log10()
}

/// Convert a mel-scale value back to Hz. Inverse of [`hz_to_mel`].
pub fn mel_to_hz(mel: f64) -> f64 {
    700.0 * (10.0f64.powf(mel / 2595.0) - 1.0)
}

/// Build a triangular mel filterbank matrix.
///
/// Returns a matrix of shape `(n_mels, n_fft/2 + 1)`; each row is one
/// triangular filter with unit peak, spanning `fmin..fmax` evenly on the
/// mel scale.
pub fn mel_filterbank(sr: u32, n_fft: usize, n_mels: usize, fmin: f64, fmax: f64) -> Array2<f64> {
    let n_freq = n_fft / 2 + 1;
    let mut fb = Array2::<f64>::zeros((n_mels, n_freq));
    if n_mels == 0 || n_fft == 0 {
        return fb;
    }

    let fmax = fmax.min(sr as f64 / 2.0).max(fmin);
    let mel_min = hz_to_mel(fmin);
    let mel_max = hz_to_mel(fmax);
    let step = (mel_max - mel_min) / (n_mels + 1) as f64;
    let mel_points: Vec<f64> = (0..n_mels + 2)
        .map(|i| mel_to_hz(mel_min + step * i as f64))
        .collect();

    for m in 0..n_mels {
        let f_lo = mel_points[m];
        let f_center = mel_points[m + 1];
        let f_hi = mel_points[m + 2];
        let denom_left = (f_center - f_lo).max(1e-8);
        let denom_right = (f_hi - f_center).max(1e-8);

        for k in 0..n_freq {
            let freq = k as f64 * sr as f64 / n_fft as f64;
            let lower = (freq - f_lo) / denom_left;
            let upper = (f_hi - freq) / denom_right;
            fb[(m, k)] = lower.min(upper).max(0.0);
        }
    }

    fb
}

/// Process-wide filterbank cache keyed by `(sample_rate, n_fft)`.
///
/// Filterbanks are immutable after construction; concurrent pipelines share
/// the same `Arc`.
static FILTERBANK_CACHE: Lazy<Mutex<HashMap<(u32, usize), Arc<Array2<f64>>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// The analysis filterbank for a given rate and FFT size: 40 filters over
/// 300 Hz .. Nyquist, cached process-wide.
pub fn analysis_filterbank(sample_rate: u32, n_fft: usize) -> Arc<Array2<f64>> {
    let mut cache = FILTERBANK_CACHE.lock().expect("filterbank cache poisoned");
    cache
        .entry((sample_rate, n_fft))
        .or_insert_with(|| {
            Arc::new(mel_filterbank(
                sample_rate,
                n_fft,
                NUM_MEL_FILTERS,
                MEL_LOW_HZ,
                sample_rate as f64 / 2.0,
            ))
        })
        .clone()
}
