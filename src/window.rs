/// Compute a periodic Hann (raised cosine) window.
///
/// Used ahead of every FFT in the crate to limit spectral leakage.
///
/// # Arguments
/// * `n` - Window length
///
/// # Returns
/// Hann window of length `n`
pub fn hann(n: usize) -> Vec<f64> {
    if n == 0 {
        return Vec::new();
    }
    if n == 1 {
        return vec![1.0];
    }
    let m = n as f64;
    (0..n)
        .map(|i| 0.5 - 0.5 * (2.0 * std::f64::consts::PI * i as f64 / m).cos())
        .collect()
}

/// Multiply a signal slice by a window in place.
///
/// The window must be at least as long as the slice; excess window samples
/// are ignored.
pub fn apply(samples: &mut [f64], window: &[f64]) {
    for (s, w) in samples.iter_mut().zip(window.iter()) {
        *s *= w;
    }
}
