use log::debug;

use crate::cancel::CancelToken;
use crate::feature::mel::analysis_filterbank;
use crate::fft;
use crate::frame::Frames;
use crate::io::AudioBuffer;
use crate::window;

/// Number of cepstral coefficients kept per frame.
pub const MFCC_COEFFICIENTS: usize = 13;
/// Analysis window in samples.
pub const MFCC_FRAME_LENGTH: usize = 2048;
/// 50 % overlap between MFCC frames.
pub const MFCC_HOP_LENGTH: usize = 1024;

/// Compute the Discrete Cosine Transform (DCT) Type-II with orthonormal
/// scaling.
///
/// # Example
/// ```
/// use encore::feature::mfcc::dct_type_ii;
///
/// let dct = dct_type_ii(&[1.0, 2.0, 3.0, 4.0], 4);
/// assert_eq!(dct.len(), 4);
/// assert!((dct[0] - 5.0).abs() < 1e-9); // sum / sqrt(n)
/// ```
pub fn dct_type_ii(x: &[f64], n_out: usize) -> Vec<f64> {
    let n = x.len() as f64;
    if x.is_empty() || n_out == 0 {
        return Vec::new();
    }
    let mut out = vec![0.0f64; n_out];
    for (k, out_val) in out.iter_mut().enumerate() {
        let mut sum = 0.0f64;
        for (i, v) in x.iter().enumerate() {
            let angle = std::f64::consts::PI / n * (i as f64 + 0.5) * k as f64;
            sum += v * angle.cos();
        }
        let scale = if k == 0 {
            (1.0 / n).sqrt()
        } else {
            (2.0 / n).sqrt()
        };
        *out_val = sum * scale;
    }
    out
}

/// MFCC vector for one already-windowed frame of `MFCC_FRAME_LENGTH`
/// samples (shorter slices are zero-padded).
///
/// Magnitude-squared spectrum, 40-filter mel projection, natural-log
/// energies floored at 1e-10, DCT-II, first 13 coefficients.
pub fn mfcc_frame(samples: &[f64], sample_rate: u32) -> [f64; MFCC_COEFFICIENTS] {
    let mut padded = vec![0.0f64; MFCC_FRAME_LENGTH];
    let n = samples.len().min(MFCC_FRAME_LENGTH);
    padded[..n].copy_from_slice(&samples[..n]);

    let power = fft::power_spectrum(&padded);
    let fb = analysis_filterbank(sample_rate, MFCC_FRAME_LENGTH);

    let n_mels = fb.shape()[0];
    let n_freq = fb.shape()[1].min(power.len());
    let mut log_energies = vec![0.0f64; n_mels];
    for (m, log_e) in log_energies.iter_mut().enumerate() {
        let mut energy = 0.0f64;
        for (k, p) in power.iter().enumerate().take(n_freq) {
            energy += fb[(m, k)] * p;
        }
        *log_e = energy.max(1e-10).ln();
    }

    let coeffs = dct_type_ii(&log_energies, MFCC_COEFFICIENTS);
    let mut out = [0.0f64; MFCC_COEFFICIENTS];
    out.copy_from_slice(&coeffs);
    out
}

/// Extract one MFCC vector per frame across a whole buffer.
///
/// Frames are `MFCC_FRAME_LENGTH` samples with 50 % overlap and a Hann
/// window; the cancel token is checked once per frame.
///
/// # Example
/// ```
/// use encore::cancel::CancelToken;
/// use encore::feature::mfcc::extract_mfcc;
/// use encore::io::{tone, AudioBuffer};
///
/// let buffer = AudioBuffer {
///     sample_rate_hz: 44100,
///     channels: 1,
///     samples: tone(440.0, 44100, 0.5),
/// };
/// let frames = extract_mfcc(&buffer, &CancelToken::new()).unwrap();
/// assert!(!frames.is_empty());
/// assert_eq!(frames[0].len(), 13);
/// ```
pub fn extract_mfcc(
    buffer: &AudioBuffer,
    cancel: &CancelToken,
) -> crate::Result<Vec<[f64; MFCC_COEFFICIENTS]>> {
    let hann = window::hann(MFCC_FRAME_LENGTH);
    let mut vectors = Vec::new();

    for frame in Frames::over(buffer, MFCC_FRAME_LENGTH, MFCC_HOP_LENGTH) {
        cancel.bail_if_cancelled()?;
        let mut windowed = frame.samples.to_vec();
        window::apply(&mut windowed, &hann);
        vectors.push(mfcc_frame(&windowed, buffer.sample_rate_hz));
    }

    debug!("mfcc: {} frames of {} coefficients", vectors.len(), MFCC_COEFFICIENTS);
    Ok(vectors)
}
