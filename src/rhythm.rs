use log::{debug, info};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::cancel::CancelToken;
use crate::fingerprint::{
    SoundComparisonDetail, SoundFingerprint, compare_fingerprints, extract_fingerprints,
};
use crate::io::AudioBuffer;
use crate::onset::{EnergyOnsetConfig, detect_energy_onsets};
use crate::score::ScoringResult;

/// Default share of the combined score contributed by timing.
pub const DEFAULT_TIMING_WEIGHT: f64 = 0.7;
/// Default share of the combined score contributed by sound similarity.
pub const DEFAULT_SOUND_WEIGHT: f64 = 0.3;

/// Serialized rhythm pattern format version.
pub const PATTERN_VERSION: u32 = 1;

/// A reference rhythm extracted from audio.
///
/// Onset times are normalized so the first beat sits at 0;
/// `trimmed_start_ms` records how much silence was cut so fingerprints can
/// be re-anchored to the original audio.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RhythmPattern {
    pub version: u32,
    /// Normalized onset times; first entry is 0 when beats exist.
    pub onset_times_ms: Vec<f64>,
    /// Consecutive onset gaps.
    pub intervals_ms: Vec<f64>,
    pub estimated_bpm: u32,
    pub time_signature: String,
    pub total_beats: u32,
    pub trimmed_start_ms: f64,
    pub trimmed_end_ms: f64,
    pub original_duration_ms: f64,
    pub silence_threshold_db: f64,
    pub min_onset_interval_ms: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub beat_fingerprints: Option<Vec<SoundFingerprint>>,
    pub sound_similarity_enabled: bool,
    pub timing_weight: f64,
    pub sound_weight: f64,
}

impl RhythmPattern {
    fn empty(config: &EnergyOnsetConfig, original_duration_ms: f64) -> Self {
        Self {
            version: PATTERN_VERSION,
            onset_times_ms: Vec::new(),
            intervals_ms: Vec::new(),
            estimated_bpm: 0,
            time_signature: "4/4".to_string(),
            total_beats: 0,
            trimmed_start_ms: 0.0,
            trimmed_end_ms: 0.0,
            original_duration_ms,
            silence_threshold_db: config.silence_threshold_db,
            min_onset_interval_ms: config.min_onset_interval_ms,
            beat_fingerprints: None,
            sound_similarity_enabled: false,
            timing_weight: DEFAULT_TIMING_WEIGHT,
            sound_weight: DEFAULT_SOUND_WEIGHT,
        }
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / values.len() as f64
}

fn intervals_of(onsets: &[f64]) -> Vec<f64> {
    onsets.windows(2).map(|pair| pair[1] - pair[0]).collect()
}

/// Extract a rhythm pattern from audio: energy onsets, silence trimming,
/// interval statistics and a BPM estimate.
///
/// With fewer than two onsets the pattern carries the raw onsets and no
/// intervals; scoring such a pattern reports "Insufficient beats to score".
pub fn extract_pattern(
    buffer: &AudioBuffer,
    config: &EnergyOnsetConfig,
    cancel: &CancelToken,
) -> crate::Result<RhythmPattern> {
    let original_duration_ms = buffer.duration_ms();
    let raw_onsets = detect_energy_onsets(buffer, config, cancel)?;

    if raw_onsets.len() < 2 {
        debug!("insufficient onsets for a pattern: {}", raw_onsets.len());
        let total = raw_onsets.len() as u32;
        return Ok(RhythmPattern {
            onset_times_ms: raw_onsets,
            total_beats: total,
            ..RhythmPattern::empty(config, original_duration_ms)
        });
    }

    let first_onset = raw_onsets[0];
    let last_onset = *raw_onsets.last().expect("non-empty");
    let normalized: Vec<f64> = raw_onsets.iter().map(|t| t - first_onset).collect();
    let intervals = intervals_of(&normalized);

    let avg_interval = mean(&intervals).max(1e-10);
    let estimated_bpm = (60_000.0 / avg_interval).round() as u32;
    let time_signature = detect_time_signature(&intervals, estimated_bpm);

    info!(
        "pattern extracted: {} beats, ~{} BPM, {}",
        raw_onsets.len(),
        estimated_bpm,
        time_signature
    );

    Ok(RhythmPattern {
        version: PATTERN_VERSION,
        total_beats: normalized.len() as u32,
        onset_times_ms: normalized,
        intervals_ms: intervals,
        estimated_bpm,
        time_signature,
        trimmed_start_ms: first_onset,
        trimmed_end_ms: last_onset,
        original_duration_ms,
        silence_threshold_db: config.silence_threshold_db,
        min_onset_interval_ms: config.min_onset_interval_ms,
        beat_fingerprints: None,
        sound_similarity_enabled: false,
        timing_weight: DEFAULT_TIMING_WEIGHT,
        sound_weight: DEFAULT_SOUND_WEIGHT,
    })
}

/// [`extract_pattern`], then fingerprint every beat for sound-similarity
/// scoring. Normalized onsets are shifted back by `trimmed_start_ms` to
/// locate their segments in the original audio.
pub fn extract_pattern_with_fingerprints(
    buffer: &AudioBuffer,
    config: &EnergyOnsetConfig,
    cancel: &CancelToken,
) -> crate::Result<RhythmPattern> {
    let mut pattern = extract_pattern(buffer, config, cancel)?;

    if pattern.total_beats > 0 {
        let absolute: Vec<f64> = pattern
            .onset_times_ms
            .iter()
            .map(|t| t + pattern.trimmed_start_ms)
            .collect();
        pattern.beat_fingerprints = Some(extract_fingerprints(buffer, &absolute, cancel)?);
        pattern.sound_similarity_enabled = true;
    }

    Ok(pattern)
}

// Accent-pattern detection is not implemented; every pattern reports 4/4.
fn detect_time_signature(_intervals: &[f64], _bpm: u32) -> String {
    "4/4".to_string()
}

fn timing_feedback(score: f64) -> &'static str {
    if score >= 90.0 {
        "Perfect rhythm! Outstanding timing!"
    } else if score >= 75.0 {
        "Great rhythm! Very good timing."
    } else if score >= 60.0 {
        "Good effort! Keep practicing the timing."
    } else if score >= 40.0 {
        "Getting there! Focus on listening to the beat."
    } else {
        "Keep practicing! Try tapping along with the pattern first."
    }
}

fn sound_feedback(score: f64) -> &'static str {
    if score >= 85.0 {
        "Excellent sound quality!"
    } else if score >= 70.0 {
        "Good sound match."
    } else if score >= 50.0 {
        "Sound could be clearer."
    } else {
        "Try to match the reference sound more closely."
    }
}

fn insufficient_result() -> ScoringResult {
    ScoringResult {
        feedback: "Insufficient beats to score".to_string(),
        ..ScoringResult::default()
    }
}

/// Score user onsets against a reference pattern, beat by beat.
///
/// The user sequence is normalized to its own first onset. Tolerance
/// defaults to `min(150 ms, avg_interval/3)`; errors past `avg_interval/2`
/// are missed beats. Each surviving beat scores `100·e^(−|err|/tolerance)`;
/// a mismatched beat count costs 5 points per extra or missing beat.
pub fn score_rhythm_pattern(
    reference: &RhythmPattern,
    user_onsets_ms: &[f64],
    tolerance_ms: Option<f64>,
    min_score: Option<u32>,
) -> ScoringResult {
    let ref_onsets = &reference.onset_times_ms;
    let paired = ref_onsets.len().min(user_onsets_ms.len());

    if paired < 2 {
        debug!(
            "cannot score: {} ref beats, {} user beats",
            ref_onsets.len(),
            user_onsets_ms.len()
        );
        return insufficient_result();
    }

    let user_first = user_onsets_ms[0];
    let user_normalized: Vec<f64> = user_onsets_ms.iter().map(|t| t - user_first).collect();

    let avg_interval = if reference.intervals_ms.is_empty() {
        500.0
    } else {
        mean(&reference.intervals_ms)
    };
    let tolerance = tolerance_ms.unwrap_or_else(|| (avg_interval / 3.0).min(150.0));
    let max_tolerance = avg_interval / 2.0;

    let mut per_beat_scores = Vec::with_capacity(paired);
    let mut timing_errors = Vec::with_capacity(paired);
    let mut absolute_errors = Vec::with_capacity(paired);
    let mut perfect_beats = 0usize;
    let mut good_beats = 0usize;
    let mut missed_beats = 0usize;

    for i in 0..paired {
        let error = user_normalized[i] - ref_onsets[i];
        let abs_error = error.abs();
        timing_errors.push(error);
        absolute_errors.push(abs_error);

        if abs_error >= max_tolerance {
            per_beat_scores.push(0.0);
            missed_beats += 1;
        } else {
            per_beat_scores.push(100.0 * (-abs_error / tolerance.max(1e-10)).exp());
            if abs_error < 50.0 {
                perfect_beats += 1;
            } else if abs_error < 150.0 {
                good_beats += 1;
            }
        }
    }

    let beat_count_penalty =
        5.0 * (ref_onsets.len() as f64 - user_onsets_ms.len() as f64).abs();
    let overall = (mean(&per_beat_scores) - beat_count_penalty).max(0.0);

    let user_intervals = intervals_of(&user_normalized);
    let consistency = user_consistency(&user_intervals);

    let average_error_ms = mean(&absolute_errors);
    let max_error_ms = absolute_errors.iter().fold(0.0f64, |a, &b| a.max(b));
    let passed = min_score.map_or(true, |m| overall >= m as f64);
    let feedback = timing_feedback(overall).to_string();

    info!(
        "rhythm scored: {:.1} overall, {perfect_beats} perfect / {good_beats} good / {missed_beats} missed",
        overall
    );

    ScoringResult {
        overall_score: overall,
        rhythm_score: overall,
        combined_score: overall,
        per_beat_scores,
        timing_errors_ms: timing_errors,
        absolute_errors_ms: absolute_errors,
        perfect_beats,
        good_beats,
        missed_beats,
        average_error_ms,
        max_error_ms,
        consistency_score: consistency,
        passed,
        feedback,
        ..ScoringResult::default()
    }
}

fn user_consistency(user_intervals: &[f64]) -> f64 {
    if user_intervals.is_empty() {
        return 0.0;
    }
    let avg = mean(user_intervals).max(1e-10);
    let normalized_deviation = variance(user_intervals).sqrt() / avg;
    (100.0 * (1.0 - normalized_deviation * 2.0)).clamp(0.0, 100.0)
}

/// Knobs for [`score_rhythm_with_sound_similarity`].
#[derive(Debug, Clone, Default)]
pub struct SoundScoreOptions {
    pub tolerance_ms: Option<f64>,
    pub min_score: Option<u32>,
    pub timing_weight: Option<f64>,
    pub sound_weight: Option<f64>,
}

/// Timing score blended with per-beat timbre comparison.
///
/// Falls back to the plain timing score when the pattern carries no
/// fingerprints or no user audio is supplied. Reference beats the user
/// never played contribute missed comparison details with score 0. The
/// aggregate sound score lands in `voice_score`;
/// `combined = timing_weight·timing + sound_weight·sound`.
pub fn score_rhythm_with_sound_similarity(
    reference: &RhythmPattern,
    user_onsets_ms: &[f64],
    user_audio: Option<&AudioBuffer>,
    options: &SoundScoreOptions,
    cancel: &CancelToken,
) -> crate::Result<ScoringResult> {
    let mut result =
        score_rhythm_pattern(reference, user_onsets_ms, options.tolerance_ms, options.min_score);

    // An insufficient timing pass has nothing to blend against.
    if result.per_beat_scores.is_empty() {
        return Ok(result);
    }

    let timing_weight = options.timing_weight.unwrap_or(reference.timing_weight);
    let sound_weight = options.sound_weight.unwrap_or(reference.sound_weight);

    let fingerprints = match (&reference.beat_fingerprints, user_audio) {
        (Some(fps), Some(audio)) if reference.sound_similarity_enabled && !fps.is_empty() => {
            (fps, audio)
        }
        _ => {
            result.combined_score = result.overall_score;
            return Ok(result);
        }
    };
    let (ref_fingerprints, audio) = fingerprints;

    let user_fingerprints = extract_fingerprints(audio, user_onsets_ms, cancel)?;

    let compared = ref_fingerprints
        .len()
        .min(user_fingerprints.len())
        .min(reference.onset_times_ms.len())
        .min(user_onsets_ms.len());

    let mut details = Vec::new();
    let mut per_beat_sound = Vec::new();
    for i in 0..compared {
        let detail = compare_fingerprints(&ref_fingerprints[i], &user_fingerprints[i], i);
        per_beat_sound.push(detail.overall_sound_score);
        details.push(detail);
    }
    for i in compared..reference.total_beats as usize {
        details.push(SoundComparisonDetail::missed(i));
        per_beat_sound.push(0.0);
    }

    let sound_score = mean(&per_beat_sound);
    let combined = result.overall_score * timing_weight + sound_score * sound_weight;
    let passed = options.min_score.map_or(true, |m| combined >= m as f64);

    info!(
        "sound-similarity scored: timing {:.1}, sound {:.1}, combined {:.1}",
        result.overall_score, sound_score, combined
    );

    result.feedback = format!("{} {}", result.feedback, sound_feedback(sound_score));
    result.voice_score = sound_score;
    result.combined_score = combined;
    result.passed = passed;
    result.sound_details = Some(details);
    Ok(result)
}

/// How regular the beat spacing is, in [0, 100].
///
/// Each interval's relative error against the expected spacing
/// (`60000/target_bpm` ms, or the mean interval when no BPM is given) is
/// capped at 100 % and averaged.
pub fn analyze_consistency(onsets_ms: &[f64], target_bpm: Option<u32>) -> f64 {
    if onsets_ms.len() < 2 {
        return 0.0;
    }

    let intervals = intervals_of(onsets_ms);
    let expected = match target_bpm {
        Some(bpm) if bpm > 0 => 60_000.0 / bpm as f64,
        _ => mean(&intervals),
    };
    if expected <= 1e-10 {
        return 0.0;
    }

    let avg_error = intervals
        .iter()
        .map(|i| ((i - expected).abs() / expected).min(1.0))
        .sum::<f64>()
        / intervals.len() as f64;

    (100.0 * (1.0 - avg_error)).max(0.0)
}

/// Rhythmic variety, in [0, 100]: the fraction of distinct quantized
/// interval classes, scaled by 1.5. Patterns with fewer than four onsets
/// get a neutral 50.
pub fn analyze_creativity(onsets_ms: &[f64]) -> f64 {
    if onsets_ms.len() < 4 {
        return 50.0;
    }

    let intervals = intervals_of(onsets_ms);
    let min_interval = intervals
        .iter()
        .fold(f64::INFINITY, |a, &b| a.min(b))
        .max(1e-10);

    let mut classes = std::collections::HashSet::new();
    for interval in &intervals {
        classes.insert((interval / min_interval).round() as i64);
    }

    let variety = classes.len() as f64 / intervals.len() as f64;
    (variety * 150.0).min(100.0)
}

/// DTW similarity of two onset sequences, in [0, 100].
///
/// Intervals are aligned with absolute-difference cost; the accumulated
/// distance is normalized by `max(n, m)` times the mean reference
/// interval.
pub fn compare_rhythms(user_onsets_ms: &[f64], reference_onsets_ms: &[f64]) -> f64 {
    let user_intervals = intervals_of(user_onsets_ms);
    let ref_intervals = intervals_of(reference_onsets_ms);
    if user_intervals.is_empty() || ref_intervals.is_empty() {
        return 0.0;
    }

    let n = user_intervals.len();
    let m = ref_intervals.len();
    let mut cost = Array2::<f64>::from_elem((n + 1, m + 1), f64::INFINITY);
    cost[(0, 0)] = 0.0;

    for i in 1..=n {
        for j in 1..=m {
            let local = (user_intervals[i - 1] - ref_intervals[j - 1]).abs();
            let best = cost[(i - 1, j)]
                .min(cost[(i, j - 1)])
                .min(cost[(i - 1, j - 1)]);
            cost[(i, j)] = local + best;
        }
    }

    let avg_interval = mean(&ref_intervals).max(1e-10);
    let normalized = cost[(n, m)] / (n.max(m) as f64 * avg_interval);

    (100.0 * (1.0 - normalized)).max(0.0)
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Metrics JSON for free-form rhythm creation.
pub fn creation_metrics(onsets_ms: &[f64], consistency: f64, creativity: f64) -> serde_json::Value {
    let mut root = json!({
        "totalBeats": onsets_ms.len(),
        "consistencyScore": round2(consistency),
        "creativityScore": round2(creativity),
    });

    if onsets_ms.len() > 1 {
        let intervals = intervals_of(onsets_ms);
        let avg_interval = mean(&intervals).max(1e-10);
        root["estimatedBpm"] = json!((60_000.0 / avg_interval).round() as u64);
        root["averageIntervalMs"] = json!(avg_interval.round() as u64);
    }

    root
}

/// Metrics JSON for pattern-vs-pattern rhythm scoring.
pub fn comparison_metrics(
    reference: &RhythmPattern,
    user: &RhythmPattern,
    result: &ScoringResult,
) -> serde_json::Value {
    json!({
        "referencePattern": {
            "totalBeats": reference.total_beats,
            "estimatedBpm": reference.estimated_bpm,
            "timeSignature": reference.time_signature,
        },
        "userPattern": {
            "totalBeats": user.total_beats,
            "estimatedBpm": user.estimated_bpm,
            "timeSignature": user.time_signature,
        },
        "scoring": {
            "overallScore": round2(result.overall_score),
            "perfectBeats": result.perfect_beats,
            "goodBeats": result.good_beats,
            "missedBeats": result.missed_beats,
            "averageErrorMs": round2(result.average_error_ms),
            "maxErrorMs": round2(result.max_error_ms),
            "consistencyScore": round2(result.consistency_score),
            "feedback": result.feedback,
        },
    })
}
