use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::feature::mfcc::MFCC_COEFFICIENTS;
use crate::fingerprint::SoundComparisonDetail;
use crate::note::NoteEvent;

/// Pitch deviations up to this many semitones count as a hit.
pub const PITCH_EQUAL_TOLERANCE_SEMITONES: f64 = 0.5;
/// Onsets within this window of the reference count as on time.
pub const ONSET_EQUAL_TOLERANCE_MS: f64 = 100.0;

/// Composite result of scoring one performance.
///
/// Superset record shared by all challenge types; fields that a given
/// challenge does not produce are zero/empty. `detailed_metrics` carries
/// the stable-key JSON document persisted by collaborators.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoringResult {
    pub overall_score: f64,
    pub pitch_score: f64,
    pub rhythm_score: f64,
    pub voice_score: f64,
    pub combined_score: f64,
    pub per_beat_scores: Vec<f64>,
    pub timing_errors_ms: Vec<f64>,
    pub absolute_errors_ms: Vec<f64>,
    pub perfect_beats: usize,
    pub good_beats: usize,
    pub missed_beats: usize,
    pub average_error_ms: f64,
    pub max_error_ms: f64,
    pub consistency_score: f64,
    pub passed: bool,
    pub feedback: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sound_details: Option<Vec<SoundComparisonDetail>>,
    pub detailed_metrics: serde_json::Value,
}

impl Default for ScoringResult {
    fn default() -> Self {
        Self {
            overall_score: 0.0,
            pitch_score: 0.0,
            rhythm_score: 0.0,
            voice_score: 0.0,
            combined_score: 0.0,
            per_beat_scores: Vec::new(),
            timing_errors_ms: Vec::new(),
            absolute_errors_ms: Vec::new(),
            perfect_beats: 0,
            good_beats: 0,
            missed_beats: 0,
            average_error_ms: 0.0,
            max_error_ms: 0.0,
            consistency_score: 0.0,
            passed: false,
            feedback: String::new(),
            sound_details: None,
            detailed_metrics: json!({}),
        }
    }
}

impl ScoringResult {
    /// Zero-score result carrying an error message in its metrics, used
    /// when a graded failure must still return diagnostics.
    pub fn zero_with_error(message: &str) -> Self {
        Self {
            detailed_metrics: json!({ "error": message }),
            ..Self::default()
        }
    }
}

/// Cosine similarity of two equal-length vectors in [-1, 1].
///
/// Returns 0 on length mismatch or when either vector has zero norm.
///
/// # Example
/// ```
/// use encore::score::cosine_similarity;
///
/// assert!((cosine_similarity(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0]) - 1.0).abs() < 1e-12);
/// assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-12);
/// ```
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    let denom = (norm_a * norm_b).sqrt();
    if denom <= 1e-10 { 0.0 } else { dot / denom }
}

/// Pitch accuracy over index-paired notes, in [0, 100].
///
/// Mean absolute semitone deviation costs 20 points per semitone; the
/// fraction of notes within [`PITCH_EQUAL_TOLERANCE_SEMITONES`] earns up
/// to 20 bonus points. Unvoiced pairs are excluded from the deviation.
pub fn pitch_score_semitones(user_notes: &[NoteEvent], reference_notes: &[NoteEvent]) -> f64 {
    if user_notes.is_empty() || reference_notes.is_empty() {
        return 0.0;
    }

    let paired = user_notes.len().min(reference_notes.len());
    let mut deviations = Vec::new();
    let mut perfect_notes = 0usize;

    for i in 0..paired {
        if let Some(semitones) = user_notes[i].semitones_to(&reference_notes[i]) {
            let deviation = semitones.abs();
            deviations.push(deviation);
            if deviation <= PITCH_EQUAL_TOLERANCE_SEMITONES {
                perfect_notes += 1;
            }
        }
    }

    if deviations.is_empty() {
        return 0.0;
    }

    let avg_deviation = deviations.iter().sum::<f64>() / deviations.len() as f64;
    let raw = 100.0 - avg_deviation * 20.0;
    let accuracy_bonus = perfect_notes as f64 / paired as f64 * 20.0;

    (raw + accuracy_bonus).clamp(0.0, 100.0)
}

/// Onset timing accuracy over index-paired notes, in [0, 100].
///
/// Mean absolute offset costs 1 point per 10 ms (weighted 0.7); the
/// fraction within [`ONSET_EQUAL_TOLERANCE_MS`] earns up to 30 points.
pub fn rhythm_score_onsets(user_notes: &[NoteEvent], reference_notes: &[NoteEvent]) -> f64 {
    if user_notes.is_empty() || reference_notes.is_empty() {
        return 0.0;
    }

    let paired = user_notes.len().min(reference_notes.len());
    let mut total_abs_offset = 0.0f64;
    let mut on_time = 0usize;

    for i in 0..paired {
        let offset = user_notes[i].timing_offset_ms(&reference_notes[i]);
        total_abs_offset += offset.abs();
        if offset.abs() <= ONSET_EQUAL_TOLERANCE_MS {
            on_time += 1;
        }
    }

    let avg_offset = total_abs_offset / paired as f64;
    let timing = 100.0 - avg_offset / 10.0;
    let on_time_bonus = on_time as f64 / paired as f64 * 30.0;

    (timing * 0.7 + on_time_bonus).clamp(0.0, 100.0)
}

/// Voice/timbre similarity over index-paired MFCC frames, in [0, 100].
///
/// Mean per-frame cosine similarity mapped from [-1, 1] to [0, 100].
pub fn voice_similarity_mfcc(
    user_mfccs: &[[f64; MFCC_COEFFICIENTS]],
    reference_mfccs: &[[f64; MFCC_COEFFICIENTS]],
) -> f64 {
    if user_mfccs.is_empty() || reference_mfccs.is_empty() {
        return 0.0;
    }

    let paired = user_mfccs.len().min(reference_mfccs.len());
    let mut total = 0.0f64;
    for i in 0..paired {
        total += cosine_similarity(&user_mfccs[i], &reference_mfccs[i]);
    }
    let avg = total / paired as f64;

    ((avg + 1.0) / 2.0 * 100.0).clamp(0.0, 100.0)
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

fn round3(x: f64) -> f64 {
    (x * 1000.0).round() / 1000.0
}

/// Build the stable-key `detailed_metrics` JSON document for note/voice
/// challenges: per-dimension sub-records plus the blended overall score.
#[allow(clippy::too_many_arguments)]
pub fn detailed_metrics(
    user_notes: &[NoteEvent],
    reference_notes: &[NoteEvent],
    user_mfccs: &[[f64; MFCC_COEFFICIENTS]],
    reference_mfccs: &[[f64; MFCC_COEFFICIENTS]],
    pitch_score: f64,
    rhythm_score: f64,
    voice_score: f64,
    overall_score: f64,
) -> serde_json::Value {
    let paired = user_notes.len().min(reference_notes.len());

    let mut perfect_notes = 0usize;
    let mut total_semitones = 0.0f64;
    let mut max_deviation = 0.0f64;
    let mut measured = 0usize;
    for i in 0..paired {
        if let Some(semitones) = user_notes[i].semitones_to(&reference_notes[i]) {
            let deviation = semitones.abs();
            total_semitones += deviation;
            max_deviation = max_deviation.max(deviation);
            measured += 1;
            if deviation <= PITCH_EQUAL_TOLERANCE_SEMITONES {
                perfect_notes += 1;
            }
        }
    }
    let avg_semitones = if measured > 0 {
        total_semitones / measured as f64
    } else {
        0.0
    };
    let accuracy_pct = if paired > 0 {
        perfect_notes as f64 / paired as f64 * 100.0
    } else {
        0.0
    };

    let mut on_time = 0usize;
    let mut early = 0usize;
    let mut late = 0usize;
    let mut total_offset = 0.0f64;
    let mut max_offset = 0.0f64;
    for i in 0..paired {
        let offset = user_notes[i].timing_offset_ms(&reference_notes[i]);
        let abs_offset = offset.abs();
        total_offset += abs_offset;
        max_offset = max_offset.max(abs_offset);
        if abs_offset <= ONSET_EQUAL_TOLERANCE_MS {
            on_time += 1;
        } else if offset < 0.0 {
            early += 1;
        } else {
            late += 1;
        }
    }
    let avg_offset = if paired > 0 {
        total_offset / paired as f64
    } else {
        0.0
    };

    let mfcc_paired = user_mfccs.len().min(reference_mfccs.len());
    let mut total_similarity = 0.0f64;
    for i in 0..mfcc_paired {
        total_similarity += cosine_similarity(&user_mfccs[i], &reference_mfccs[i]);
    }
    let avg_similarity = if mfcc_paired > 0 {
        total_similarity / mfcc_paired as f64
    } else {
        0.0
    };
    let spectral_distance = 1.0 - (avg_similarity + 1.0) / 2.0;

    json!({
        "pitchAccuracy": {
            "averageSemitoneDeviation": round2(avg_semitones),
            "notesHitCorrectly": perfect_notes,
            "totalNotes": paired,
            "accuracyPercentage": round2(accuracy_pct),
            "maxDeviation": round2(max_deviation),
            "perfectNotesCount": perfect_notes,
        },
        "rhythmTiming": {
            "averageTimingOffsetMs": round2(avg_offset),
            "onTimeNotesCount": on_time,
            "earlyNotesCount": early,
            "lateNotesCount": late,
            "maxTimingErrorMs": round2(max_offset),
        },
        "voiceSimilarity": {
            "mfccSimilarityScore": round2(voice_score),
            "spectralDistance": round3(spectral_distance),
            "timbreMatchPercentage": round2(voice_score),
        },
        "overallScore": round2(overall_score),
    })
}
