use log::debug;

use crate::cancel::CancelToken;
use crate::io::AudioBuffer;

/// Default silence floor in dBFS.
pub const SILENCE_DEFAULT_DB: f64 = -40.0;
/// Level must rise this many dB over the previous window to count as an
/// attack.
pub const RISE_DB: f64 = 3.0;
/// Level must fall this many dB below the threshold before a new sound can
/// begin.
pub const HYSTERESIS_DB: f64 = 6.0;
/// Dynamic threshold tracks the peak at this offset.
const PEAK_OFFSET_DB: f64 = 20.0;
/// RMS window length in seconds.
const WINDOW_SECS: f64 = 0.02;

/// Configuration for energy-based onset detection.
#[derive(Debug, Clone)]
pub struct EnergyOnsetConfig {
    /// Absolute silence floor in dBFS; the effective threshold never goes
    /// below this.
    pub silence_threshold_db: f64,
    /// Two onsets closer than this are collapsed into one (debounce).
    pub min_onset_interval_ms: f64,
}

impl Default for EnergyOnsetConfig {
    fn default() -> Self {
        Self {
            silence_threshold_db: SILENCE_DEFAULT_DB,
            min_onset_interval_ms: 100.0,
        }
    }
}

/// Detect onsets by RMS energy rise, returning onset times in milliseconds.
///
/// RMS is measured over 20 ms windows with 75 % overlap and converted to
/// dBFS. The detection threshold adapts to the signal: `max(silence floor,
/// peak − 20 dB)`. An onset fires on the transition from quiet to a window
/// that is both above threshold and at least [`RISE_DB`] louder than its
/// predecessor; the detector then stays "inside" the sound until the level
/// drops [`HYSTERESIS_DB`] below threshold, so level flicker around the
/// threshold cannot double-fire. Onsets within `min_onset_interval_ms` of
/// the previous accepted onset are rejected.
///
/// The returned sequence is strictly increasing with consecutive gaps of at
/// least `min_onset_interval_ms`.
pub fn detect_energy_onsets(
    buffer: &AudioBuffer,
    config: &EnergyOnsetConfig,
    cancel: &CancelToken,
) -> crate::Result<Vec<f64>> {
    let sample_rate = buffer.sample_rate_hz as f64;
    let window_size = (sample_rate * WINDOW_SECS) as usize;
    let hop_size = (window_size / 4).max(1);

    if window_size == 0 || buffer.samples.len() < window_size {
        return Ok(Vec::new());
    }

    // RMS per window, in dBFS.
    let mut energies_db = Vec::new();
    let mut times_ms = Vec::new();
    let mut i = 0usize;
    while i + window_size <= buffer.samples.len() {
        cancel.bail_if_cancelled()?;
        let mut sum = 0.0f64;
        for &s in &buffer.samples[i..i + window_size] {
            sum += s * s;
        }
        let rms = (sum / window_size as f64).sqrt();
        energies_db.push(20.0 * rms.max(1e-10).log10());
        times_ms.push(i as f64 * 1000.0 / sample_rate);
        i += hop_size;
    }

    let peak_db = energies_db.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b));
    let threshold = config.silence_threshold_db.max(peak_db - PEAK_OFFSET_DB);

    let mut onsets = Vec::new();
    let mut in_sound = false;
    let mut last_onset_ms = -config.min_onset_interval_ms;

    for t in 1..energies_db.len() {
        let prev = energies_db[t - 1];
        let curr = energies_db[t];
        let time = times_ms[t];

        if !in_sound && curr > threshold && curr > prev + RISE_DB {
            if time - last_onset_ms >= config.min_onset_interval_ms {
                onsets.push(time);
                last_onset_ms = time;
            }
            in_sound = true;
        } else if in_sound && curr < threshold - HYSTERESIS_DB {
            in_sound = false;
        }
    }

    debug!(
        "energy onsets: {} hits, threshold {:.1} dB",
        onsets.len(),
        threshold
    );
    Ok(onsets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::clicks;

    fn buffer(samples: Vec<f64>) -> AudioBuffer {
        AudioBuffer {
            sample_rate_hz: 44100,
            channels: 1,
            samples,
        }
    }

    #[test]
    fn detects_spaced_clicks() {
        let signal = clicks(&[0.1, 0.6, 1.1, 1.6], 44100, 44100 * 2);
        let onsets = detect_energy_onsets(
            &buffer(signal),
            &EnergyOnsetConfig::default(),
            &CancelToken::new(),
        )
        .unwrap();

        assert_eq!(onsets.len(), 4, "got {onsets:?}");
        for (found, expected) in onsets.iter().zip([100.0, 600.0, 1100.0, 1600.0]) {
            assert!(
                (found - expected).abs() < 30.0,
                "onset {found} ms, expected {expected} ms"
            );
        }
    }

    #[test]
    fn silence_has_no_onsets() {
        let onsets = detect_energy_onsets(
            &buffer(vec![0.0; 44100]),
            &EnergyOnsetConfig::default(),
            &CancelToken::new(),
        )
        .unwrap();
        assert!(onsets.is_empty());
    }

    #[test]
    fn debounce_enforces_min_interval() {
        // Clicks 40 ms apart with a 100 ms debounce: only alternate hits pass.
        let times: Vec<f64> = (0..10).map(|i| 0.1 + i as f64 * 0.04).collect();
        let signal = clicks(&times, 44100, 44100);
        let onsets = detect_energy_onsets(
            &buffer(signal),
            &EnergyOnsetConfig::default(),
            &CancelToken::new(),
        )
        .unwrap();

        for pair in onsets.windows(2) {
            assert!(pair[1] - pair[0] >= 100.0, "gap violates debounce: {pair:?}");
        }
    }

    #[test]
    fn onsets_strictly_increasing() {
        let signal = clicks(&[0.2, 0.5, 0.8], 44100, 44100);
        let onsets = detect_energy_onsets(
            &buffer(signal),
            &EnergyOnsetConfig::default(),
            &CancelToken::new(),
        )
        .unwrap();
        for pair in onsets.windows(2) {
            assert!(pair[1] > pair[0]);
        }
    }

    #[test]
    fn short_buffer_is_empty() {
        let onsets = detect_energy_onsets(
            &buffer(vec![0.5; 100]),
            &EnergyOnsetConfig::default(),
            &CancelToken::new(),
        )
        .unwrap();
        assert!(onsets.is_empty());
    }

    #[test]
    fn cancellation_propagates() {
        let token = CancelToken::new();
        token.cancel();
        let result = detect_energy_onsets(
            &buffer(vec![0.0; 44100]),
            &EnergyOnsetConfig::default(),
            &token,
        );
        assert!(matches!(result, Err(crate::Error::Cancelled)));
    }
}
