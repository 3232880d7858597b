use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::cancel::CancelToken;
use crate::feature::mfcc::{MFCC_COEFFICIENTS, mfcc_frame};
use crate::feature::spectral;
use crate::io::AudioBuffer;
use crate::score::cosine_similarity;

/// Length of the audio segment fingerprinted after each onset.
pub const SEGMENT_DURATION_MS: f64 = 150.0;

/// Spectral fingerprint of a single beat, used to compare timbre between
/// reference and user audio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SoundFingerprint {
    /// Mel-frequency cepstral coefficients.
    pub mfcc: [f64; MFCC_COEFFICIENTS],
    /// Brightness cue in Hz; a typical clap sits around 2000–4000 Hz.
    pub spectral_centroid_hz: f64,
    /// Frequency below which 85 % of the spectral energy resides.
    pub spectral_rolloff_hz: f64,
    /// Sign-change fraction in [0, 1]; high for percussive sounds.
    pub zero_crossing_rate: f64,
    /// RMS amplitude in [0, 1].
    pub rms_energy: f64,
    /// Wiener entropy in [0, 1]; 1 is noise-like.
    pub spectral_flatness: f64,
    /// Attack decay time in milliseconds.
    pub transient_duration_ms: f64,
}

/// Coarse quality tag derived from the spectral features.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SoundQuality {
    Sharp,
    Muffled,
    Clear,
}

impl std::fmt::Display for SoundQuality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SoundQuality::Sharp => write!(f, "SHARP"),
            SoundQuality::Muffled => write!(f, "MUFFLED"),
            SoundQuality::Clear => write!(f, "CLEAR"),
        }
    }
}

impl SoundFingerprint {
    /// All-zero fingerprint, emitted when a segment falls outside the
    /// buffer.
    pub fn empty() -> Self {
        Self {
            mfcc: [0.0; MFCC_COEFFICIENTS],
            spectral_centroid_hz: 0.0,
            spectral_rolloff_hz: 0.0,
            zero_crossing_rate: 0.0,
            rms_energy: 0.0,
            spectral_flatness: 0.0,
            transient_duration_ms: 0.0,
        }
    }

    /// Quality tag: SHARP for bright, busy spectra; MUFFLED for dull or
    /// tonal ones; CLEAR otherwise.
    pub fn quality(&self) -> SoundQuality {
        if self.spectral_centroid_hz > 3500.0 && self.zero_crossing_rate > 0.3 {
            SoundQuality::Sharp
        } else if self.spectral_centroid_hz < 1500.0 || self.zero_crossing_rate < 0.15 {
            SoundQuality::Muffled
        } else {
            SoundQuality::Clear
        }
    }
}

/// Per-beat comparison between a reference fingerprint and the user's.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SoundComparisonDetail {
    pub beat_index: usize,
    /// MFCC cosine similarity mapped to [0, 100].
    pub mfcc_similarity: f64,
    pub spectral_centroid_ref: f64,
    pub spectral_centroid_user: f64,
    /// Centroid ratio in [0, 100].
    pub brightness_match: f64,
    /// RMS ratio in [0, 100].
    pub energy_match: f64,
    /// Weighted blend: 60 % MFCC, 25 % brightness, 15 % energy.
    pub overall_sound_score: f64,
    pub user_quality: SoundQuality,
    pub reference_quality: SoundQuality,
    pub feedback: String,
}

impl SoundComparisonDetail {
    /// Placeholder for a beat the user never played.
    pub fn missed(beat_index: usize) -> Self {
        Self {
            beat_index,
            mfcc_similarity: 0.0,
            spectral_centroid_ref: 0.0,
            spectral_centroid_user: 0.0,
            brightness_match: 0.0,
            energy_match: 0.0,
            overall_sound_score: 0.0,
            user_quality: SoundQuality::Muffled,
            reference_quality: SoundQuality::Muffled,
            feedback: "Missed beat".to_string(),
        }
    }
}

/// Fingerprint the 150 ms segment after each onset.
///
/// `onset_times_ms` are absolute positions in the buffer. Segments are
/// clipped to the buffer bounds; an empty segment yields
/// [`SoundFingerprint::empty`] so the output always has one entry per
/// onset.
pub fn extract_fingerprints(
    buffer: &AudioBuffer,
    onset_times_ms: &[f64],
    cancel: &CancelToken,
) -> crate::Result<Vec<SoundFingerprint>> {
    let sample_rate = buffer.sample_rate_hz;
    let segment_samples = (SEGMENT_DURATION_MS / 1000.0 * sample_rate as f64) as usize;
    let mut fingerprints = Vec::with_capacity(onset_times_ms.len());

    for &onset_ms in onset_times_ms {
        cancel.bail_if_cancelled()?;

        let start = ((onset_ms / 1000.0) * sample_rate as f64).max(0.0) as usize;
        let end = (start + segment_samples).min(buffer.samples.len());
        if start >= end {
            warn!("onset at {onset_ms:.0} ms falls outside the buffer, zero fingerprint");
            fingerprints.push(SoundFingerprint::empty());
            continue;
        }

        let segment = &buffer.samples[start..end];
        let magnitudes = spectral::segment_spectrum(segment);
        fingerprints.push(SoundFingerprint {
            mfcc: mfcc_frame(segment, sample_rate),
            spectral_centroid_hz: spectral::spectral_centroid(&magnitudes, sample_rate),
            spectral_rolloff_hz: spectral::spectral_rolloff(&magnitudes, sample_rate),
            zero_crossing_rate: spectral::zero_crossing_rate(segment),
            rms_energy: spectral::rms(segment),
            spectral_flatness: spectral::spectral_flatness(&magnitudes),
            transient_duration_ms: spectral::transient_duration_ms(segment, sample_rate),
        });
    }

    debug!("extracted {} sound fingerprints", fingerprints.len());
    Ok(fingerprints)
}

fn ratio_match(a: f64, b: f64) -> f64 {
    let max = a.max(b);
    if max <= 1e-10 {
        return 0.0;
    }
    a.min(b) / max * 100.0
}

/// Compare two fingerprints into a per-beat detail record.
pub fn compare_fingerprints(
    reference: &SoundFingerprint,
    user: &SoundFingerprint,
    beat_index: usize,
) -> SoundComparisonDetail {
    let mfcc_similarity =
        (cosine_similarity(&reference.mfcc, &user.mfcc) + 1.0) / 2.0 * 100.0;
    let brightness_match = ratio_match(reference.spectral_centroid_hz, user.spectral_centroid_hz);
    let energy_match = ratio_match(reference.rms_energy, user.rms_energy);
    let overall_sound_score =
        mfcc_similarity * 0.6 + brightness_match * 0.25 + energy_match * 0.15;

    let feedback = sound_feedback(reference, user, overall_sound_score);

    SoundComparisonDetail {
        beat_index,
        mfcc_similarity,
        spectral_centroid_ref: reference.spectral_centroid_hz,
        spectral_centroid_user: user.spectral_centroid_hz,
        brightness_match,
        energy_match,
        overall_sound_score,
        user_quality: user.quality(),
        reference_quality: reference.quality(),
        feedback,
    }
}

fn sound_feedback(reference: &SoundFingerprint, user: &SoundFingerprint, score: f64) -> String {
    if score >= 85.0 {
        return "Excellent sound match!".to_string();
    }

    let ref_quality = reference.quality();
    let user_quality = user.quality();

    if user_quality == SoundQuality::Muffled && ref_quality != SoundQuality::Muffled {
        return "Try a crisper, clearer clap".to_string();
    }
    if user_quality == SoundQuality::Sharp && ref_quality == SoundQuality::Clear {
        return "Good! Slightly softer might match better".to_string();
    }
    if user.rms_energy < reference.rms_energy * 0.5 {
        return "Try clapping a bit louder".to_string();
    }
    if user.rms_energy > reference.rms_energy * 1.5 {
        return "Try clapping a bit softer".to_string();
    }
    if score >= 70.0 {
        return "Good sound quality".to_string();
    }

    "Try to match the reference sound more closely".to_string()
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

    fn clap_like() -> SoundFingerprint {
        SoundFingerprint {
            mfcc: [1.0; MFCC_COEFFICIENTS],
            spectral_centroid_hz: 3000.0,
            spectral_rolloff_hz: 6000.0,
            zero_crossing_rate: 0.25,
            rms_energy: 0.5,
            spectral_flatness: 0.5,
            transient_duration_ms: 40.0,
        }
    }

    #[test]
    fn quality_thresholds() {
        let mut fp = clap_like();
        assert_eq!(fp.quality(), SoundQuality::Clear);

        fp.spectral_centroid_hz = 4000.0;
        fp.zero_crossing_rate = 0.4;
        assert_eq!(fp.quality(), SoundQuality::Sharp);

        fp.spectral_centroid_hz = 1000.0;
        assert_eq!(fp.quality(), SoundQuality::Muffled);

        fp.spectral_centroid_hz = 2000.0;
        fp.zero_crossing_rate = 0.1;
        assert_eq!(fp.quality(), SoundQuality::Muffled);
    }

    #[test]
    fn one_fingerprint_per_onset() {
        let signal = clicks(&[0.1, 0.5], 44100, 44100);
        let fingerprints = extract_fingerprints(
            &buffer(signal),
            &[100.0, 500.0, 5000.0],
            &CancelToken::new(),
        )
        .unwrap();
        assert_eq!(fingerprints.len(), 3);
        // The out-of-range onset gets the zero fingerprint.
        assert_eq!(fingerprints[2], SoundFingerprint::empty());
        assert!(fingerprints[0].rms_energy > 0.0);
    }

    #[test]
    fn identical_fingerprints_score_high() {
        let fp = clap_like();
        let detail = compare_fingerprints(&fp, &fp, 0);
        assert!((detail.mfcc_similarity - 100.0).abs() < 1e-9);
        assert!((detail.brightness_match - 100.0).abs() < 1e-9);
        assert!((detail.energy_match - 100.0).abs() < 1e-9);
        assert!((detail.overall_sound_score - 100.0).abs() < 1e-9);
        assert_eq!(detail.feedback, "Excellent sound match!");
    }

    #[test]
    fn quiet_user_gets_louder_feedback() {
        let reference = clap_like();
        let mut user = clap_like();
        user.rms_energy = 0.1;
        // A mild timbre mismatch keeps the overall score below the
        // "excellent" threshold so the energy branch is reachable.
        user.mfcc[0] = -1.0;
        let detail = compare_fingerprints(&reference, &user, 1);
        assert!(detail.overall_sound_score < 85.0);
        assert_eq!(detail.feedback, "Try clapping a bit louder");
        assert!(detail.energy_match < 25.0);
    }

    #[test]
    fn muffled_user_gets_crisper_feedback() {
        let reference = clap_like();
        let mut user = clap_like();
        user.spectral_centroid_hz = 800.0;
        user.mfcc = [-1.0; MFCC_COEFFICIENTS];
        let detail = compare_fingerprints(&reference, &user, 0);
        assert_eq!(detail.user_quality, SoundQuality::Muffled);
        assert_eq!(detail.feedback, "Try a crisper, clearer clap");
    }

    #[test]
    fn zero_fingerprints_do_not_divide_by_zero() {
        let empty = SoundFingerprint::empty();
        let detail = compare_fingerprints(&empty, &empty, 0);
        assert!(detail.overall_sound_score.is_finite());
        assert_eq!(detail.brightness_match, 0.0);
        assert_eq!(detail.energy_match, 0.0);
    }

    #[test]
    fn missed_beat_is_zeroed() {
        let detail = SoundComparisonDetail::missed(3);
        assert_eq!(detail.beat_index, 3);
        assert_eq!(detail.overall_sound_score, 0.0);
        assert_eq!(detail.feedback, "Missed beat");
    }

    #[test]
    fn serde_uses_camel_case_and_uppercase_quality() {
        let json = serde_json::to_value(clap_like()).unwrap();
        assert!(json.get("spectralCentroidHz").is_some());
        let quality = serde_json::to_value(SoundQuality::Sharp).unwrap();
        assert_eq!(quality, serde_json::json!("SHARP"));
    }
}
