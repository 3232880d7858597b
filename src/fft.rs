use num_complex::Complex64;
use once_cell::sync::Lazy;
use realfft::{RealFftPlanner, RealToComplex};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Process-wide cache of real-input FFT plans keyed by transform length.
///
/// Plans are immutable once constructed; the mutex only guards the map
/// itself, so concurrent pipelines share plans without contention during
/// the transform.
static PLAN_CACHE: Lazy<Mutex<HashMap<usize, Arc<dyn RealToComplex<f64>>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

fn plan(len: usize) -> Arc<dyn RealToComplex<f64>> {
    let mut cache = PLAN_CACHE.lock().expect("fft plan cache poisoned");
    cache
        .entry(len)
        .or_insert_with(|| RealFftPlanner::<f64>::new().plan_fft_forward(len))
        .clone()
}

/// Compute the real-to-complex FFT (rfft) of a real-valued input.
///
/// Returns only the non-redundant half of the spectrum (input.len()/2 + 1
/// bins). Plans are cached process-wide and reused across calls.
///
/// # Example
/// ```
/// use encore::fft::rfft;
///
/// let signal = vec![1.0f64; 1024];
/// let spectrum = rfft(&signal);
/// assert_eq!(spectrum.len(), 513); // 1024/2 + 1
/// ```
pub fn rfft(input: &[f64]) -> Vec<Complex64> {
    if input.is_empty() {
        return Vec::new();
    }
    let r2c = plan(input.len());
    let mut in_buf = input.to_vec();
    let mut out_buf = r2c.make_output_vec();
    let _ = r2c.process(&mut in_buf, &mut out_buf);
    out_buf
}

/// Magnitude spectrum of a real-valued input: `|rfft(x)|` per bin.
pub fn magnitude_spectrum(input: &[f64]) -> Vec<f64> {
    rfft(input).iter().map(|c| c.norm()).collect()
}

/// Power spectrum of a real-valued input: `|rfft(x)|^2` per bin.
pub fn power_spectrum(input: &[f64]) -> Vec<f64> {
    rfft(input).iter().map(|c| c.norm_sqr()).collect()
}

/// Frequency in Hz of FFT bin `k` for a transform of `n_fft` samples.
pub fn bin_frequency(k: usize, sample_rate: u32, n_fft: usize) -> f64 {
    if n_fft == 0 {
        return 0.0;
    }
    k as f64 * sample_rate as f64 / n_fft as f64
}
