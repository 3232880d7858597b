use log::debug;

use crate::cancel::CancelToken;
use crate::fft;
use crate::frame::Frames;
use crate::io::AudioBuffer;
use crate::window;

/// Configuration for spectral-flux percussive onset detection.
#[derive(Debug, Clone)]
pub struct PercussiveConfig {
    /// Analysis window in samples; frames do not overlap.
    pub buffer_size: usize,
    /// Detection sensitivity in percent. Higher values fire on smaller
    /// bursts; the floor on rising bins is `(100 − sensitivity) · n_bins /
    /// 200`.
    pub sensitivity: f64,
    /// Per-bin magnitude rise (in dB) that counts the bin as attacking.
    pub threshold_db: f64,
}

impl Default for PercussiveConfig {
    fn default() -> Self {
        Self {
            buffer_size: 2048,
            sensitivity: 20.0,
            threshold_db: 10.0,
        }
    }
}

/// A detected percussive onset.
#[derive(Debug, Clone, Copy)]
pub struct PercussiveOnset {
    /// Onset time in seconds.
    pub time_secs: f64,
    /// Number of spectral bins that rose past the threshold at the peak;
    /// larger means a broader-band, more salient attack.
    pub salience: f64,
}

/// Detect percussive onsets via spectral flux.
///
/// Each non-overlapping frame is Hann-windowed and transformed; a frame's
/// detection function is the count of frequency bins whose magnitude rose
/// more than `threshold_db` over the previous frame. An onset is emitted at
/// every local maximum of that function that clears the sensitivity floor,
/// which suppresses sustained tonal content while responding to broadband
/// attacks.
pub fn detect_percussive_onsets(
    buffer: &AudioBuffer,
    config: &PercussiveConfig,
    cancel: &CancelToken,
) -> crate::Result<Vec<PercussiveOnset>> {
    let n = config.buffer_size;
    if n == 0 {
        return Err(crate::Error::InvalidSize {
            name: "buffer_size",
            value: 0,
            reason: "must be > 0",
        });
    }

    let hann = window::hann(n);
    let mut prev_magnitudes: Vec<f64> = Vec::new();
    // Detection-function history: counts for the two preceding frames.
    let mut df_minus_1 = 0usize;
    let mut df_minus_2 = 0usize;
    let mut onsets = Vec::new();

    let hop_secs = n as f64 / buffer.sample_rate_hz as f64;
    let n_bins = n / 2 + 1;
    let floor = (100.0 - config.sensitivity) * n_bins as f64 / 200.0;

    for frame in Frames::over(buffer, n, n) {
        cancel.bail_if_cancelled()?;

        let mut windowed = frame.samples.to_vec();
        window::apply(&mut windowed, &hann);
        let magnitudes = fft::magnitude_spectrum(&windowed);

        let mut bins_over = 0usize;
        if !prev_magnitudes.is_empty() {
            for (curr, prev) in magnitudes.iter().zip(prev_magnitudes.iter()) {
                let rise_db = 10.0 * (curr / prev.max(1e-10)).max(1e-10).log10();
                if rise_db >= config.threshold_db {
                    bins_over += 1;
                }
            }
        }

        // The previous frame was a local maximum of the detection function.
        if df_minus_2 < df_minus_1 && df_minus_1 >= bins_over && df_minus_1 as f64 > floor {
            let peak_frame = frame.index.saturating_sub(1);
            onsets.push(PercussiveOnset {
                time_secs: peak_frame as f64 * hop_secs,
                salience: df_minus_1 as f64,
            });
        }

        df_minus_2 = df_minus_1;
        df_minus_1 = bins_over;
        prev_magnitudes = magnitudes;
    }

    debug!("percussive onsets: {} detected", onsets.len());
    Ok(onsets)
}
