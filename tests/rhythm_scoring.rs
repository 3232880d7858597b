//! Rhythm-path scenarios: pattern extraction, per-beat scoring, sound
//! similarity blending.

mod common;

use common::wav_source;
use encore::cancel::CancelToken;
use encore::io::{clicks, decode};
use encore::onset::EnergyOnsetConfig;
use encore::rhythm::{
    self, DEFAULT_SOUND_WEIGHT, DEFAULT_TIMING_WEIGHT, PATTERN_VERSION, RhythmPattern,
    SoundScoreOptions,
};

fn pattern_from(onsets: &[f64]) -> RhythmPattern {
    let intervals: Vec<f64> = onsets.windows(2).map(|p| p[1] - p[0]).collect();
    let avg = if intervals.is_empty() {
        0.0
    } else {
        intervals.iter().sum::<f64>() / intervals.len() as f64
    };
    RhythmPattern {
        version: PATTERN_VERSION,
        onset_times_ms: onsets.to_vec(),
        intervals_ms: intervals,
        estimated_bpm: if avg > 0.0 {
            (60_000.0 / avg).round() as u32
        } else {
            0
        },
        time_signature: "4/4".to_string(),
        total_beats: onsets.len() as u32,
        trimmed_start_ms: 0.0,
        trimmed_end_ms: onsets.last().copied().unwrap_or(0.0),
        original_duration_ms: 4_000.0,
        silence_threshold_db: -40.0,
        min_onset_interval_ms: 100.0,
        beat_fingerprints: None,
        sound_similarity_enabled: false,
        timing_weight: DEFAULT_TIMING_WEIGHT,
        sound_weight: DEFAULT_SOUND_WEIGHT,
    }
}

#[test]
fn perfect_match_scores_one_hundred() {
    let reference = pattern_from(&[0.0, 500.0, 1000.0, 1500.0]);
    let result =
        rhythm::score_rhythm_pattern(&reference, &[0.0, 500.0, 1000.0, 1500.0], Some(150.0), None);

    assert_eq!(result.overall_score, 100.0);
    assert_eq!(result.perfect_beats, 4);
    assert_eq!(result.good_beats, 0);
    assert_eq!(result.missed_beats, 0);
    assert!(result.passed);
    assert!(result.timing_errors_ms.iter().all(|&e| e == 0.0));
}

#[test]
fn exponential_decay_per_beat() {
    // After first-onset normalization, beats 1..3 land 50 ms late each.
    let reference = pattern_from(&[0.0, 500.0, 1000.0, 1500.0]);
    let result =
        rhythm::score_rhythm_pattern(&reference, &[0.0, 550.0, 1050.0, 1550.0], Some(150.0), None);

    let expected_beat = 100.0 * (-50.0f64 / 150.0).exp(); // ~71.65
    assert!((expected_beat - 71.65).abs() < 0.01);
    for &score in &result.per_beat_scores[1..] {
        assert!((score - expected_beat).abs() < 1e-9);
    }
    // 50 ms is not under the 50 ms perfect threshold.
    assert_eq!(result.perfect_beats, 1);
    assert_eq!(result.good_beats, 3);
    let expected_overall = (100.0 + 3.0 * expected_beat) / 4.0;
    assert!((result.overall_score - expected_overall).abs() < 1e-9);
}

#[test]
fn dropped_beat_is_missed_and_penalized() {
    // Index pairing drags the third user beat 500 ms off; avg interval 500,
    // max tolerance 250, so it is a miss. One-beat count mismatch costs 5.
    let reference = pattern_from(&[0.0, 500.0, 1000.0, 1500.0]);
    let result = rhythm::score_rhythm_pattern(&reference, &[0.0, 500.0, 1500.0], Some(150.0), None);

    assert_eq!(result.missed_beats, 1);
    let expected = (100.0 + 100.0 + 0.0) / 3.0 - 5.0;
    assert!(
        (result.overall_score - expected).abs() < 1e-9,
        "got {}, want {expected}",
        result.overall_score
    );
}

#[test]
fn missing_beat_never_outscores_complete_take() {
    let reference = pattern_from(&[0.0, 500.0, 1000.0, 1500.0]);
    let complete =
        rhythm::score_rhythm_pattern(&reference, &[0.0, 500.0, 1000.0, 1500.0], Some(150.0), None);
    let dropped =
        rhythm::score_rhythm_pattern(&reference, &[0.0, 500.0, 1500.0], Some(150.0), None);

    assert!(dropped.missed_beats >= 1);
    assert!(dropped.overall_score <= complete.overall_score);
}

#[test]
fn insufficient_beats_reports_feedback() {
    let reference = pattern_from(&[0.0]);
    let result = rhythm::score_rhythm_pattern(&reference, &[0.0], None, Some(60));
    assert_eq!(result.feedback, "Insufficient beats to score");
    assert_eq!(result.overall_score, 0.0);
    assert!(!result.passed);
    assert!(result.per_beat_scores.is_empty());
}

#[test]
fn extraction_is_idempotent_after_trimming() {
    // Extract a pattern, cut the leading silence the pattern reports, and
    // re-extract: the normalized onset sequence must match.
    let sample_rate = 44_100u32;
    let signal = clicks(&[0.35, 0.85, 1.35, 1.85], sample_rate, sample_rate as usize * 3);
    let buffer = decode(&wav_source(&signal, sample_rate)).unwrap();

    let config = EnergyOnsetConfig::default();
    let token = CancelToken::new();
    let first_pass = rhythm::extract_pattern(&buffer, &config, &token).unwrap();
    assert_eq!(first_pass.total_beats, 4);

    let start_sample = (first_pass.trimmed_start_ms / 1000.0 * sample_rate as f64) as usize;
    let trimmed = encore::io::AudioBuffer {
        sample_rate_hz: sample_rate,
        channels: 1,
        samples: buffer.samples[start_sample..].to_vec(),
    };
    let second_pass = rhythm::extract_pattern(&trimmed, &config, &token).unwrap();

    assert_eq!(second_pass.total_beats, first_pass.total_beats);
    for (a, b) in second_pass
        .onset_times_ms
        .iter()
        .zip(first_pass.onset_times_ms.iter())
    {
        assert!((a - b).abs() < 15.0, "onset drifted: {a} vs {b}");
    }
}

#[test]
fn debounce_holds_in_extracted_patterns() {
    let sample_rate = 44_100u32;
    // A burst of rapid clicks 60 ms apart, then sparse ones.
    let times: Vec<f64> = (0..8)
        .map(|i| 0.2 + i as f64 * 0.06)
        .chain([1.2, 1.7].into_iter())
        .collect();
    let signal = clicks(&times, sample_rate, sample_rate as usize * 2);
    let buffer = decode(&wav_source(&signal, sample_rate)).unwrap();

    let config = EnergyOnsetConfig {
        silence_threshold_db: -40.0,
        min_onset_interval_ms: 150.0,
    };
    let pattern = rhythm::extract_pattern(&buffer, &config, &CancelToken::new()).unwrap();

    for pair in pattern.onset_times_ms.windows(2) {
        assert!(
            pair[1] - pair[0] >= config.min_onset_interval_ms,
            "debounce violated: {pair:?}"
        );
    }
}

#[test]
fn combined_score_blends_weights_exactly() {
    let sample_rate = 44_100u32;
    let signal = clicks(&[0.3, 0.8, 1.3], sample_rate, sample_rate as usize * 2);
    let buffer = decode(&wav_source(&signal, sample_rate)).unwrap();
    let token = CancelToken::new();

    let pattern = rhythm::extract_pattern_with_fingerprints(
        &buffer,
        &EnergyOnsetConfig::default(),
        &token,
    )
    .unwrap();
    let absolute: Vec<f64> = pattern
        .onset_times_ms
        .iter()
        .map(|t| t + pattern.trimmed_start_ms)
        .collect();

    let options = SoundScoreOptions {
        timing_weight: Some(0.5),
        sound_weight: Some(0.5),
        ..SoundScoreOptions::default()
    };
    let result = rhythm::score_rhythm_with_sound_similarity(
        &pattern,
        &absolute,
        Some(&buffer),
        &options,
        &token,
    )
    .unwrap();

    let expected = result.overall_score * 0.5 + result.voice_score * 0.5;
    assert!(
        (result.combined_score - expected).abs() < 1e-6,
        "combined {} vs blend {expected}",
        result.combined_score
    );
}

#[test]
fn consistency_and_creativity_bounds() {
    let steady = [0.0, 400.0, 800.0, 1200.0, 1600.0];
    let consistency = rhythm::analyze_consistency(&steady, None);
    assert!((0.0..=100.0).contains(&consistency));
    assert_eq!(consistency, 100.0);

    let creativity = rhythm::analyze_creativity(&steady);
    assert!((0.0..=100.0).contains(&creativity));

    // Short patterns get the neutral creativity score.
    assert_eq!(rhythm::analyze_creativity(&[0.0, 300.0, 600.0]), 50.0);
}

#[test]
fn dtw_comparison_is_tempo_shape_aware() {
    let reference = [0.0, 500.0, 1000.0, 1500.0, 2000.0];
    assert_eq!(rhythm::compare_rhythms(&reference, &reference), 100.0);

    // Same shape, slightly jittered: still close.
    let jittered = [0.0, 520.0, 990.0, 1530.0, 2010.0];
    let close = rhythm::compare_rhythms(&jittered, &reference);
    assert!(close > 85.0, "jittered score {close}");

    // A very different shape scores lower.
    let different = [0.0, 100.0, 900.0, 1000.0, 2000.0];
    let far = rhythm::compare_rhythms(&different, &reference);
    assert!(far < close);
}

#[test]
fn rhythm_scores_stay_in_range() {
    let reference = pattern_from(&[0.0, 500.0, 1000.0, 1500.0]);
    let wild_sequences: [&[f64]; 4] = [
        &[0.0, 100.0, 5000.0],
        &[0.0, 499.0, 1001.0, 1499.0, 2000.0, 2500.0, 3000.0],
        &[0.0, 2000.0, 4000.0, 6000.0],
        &[0.0, 500.0],
    ];
    for user in wild_sequences {
        let result = rhythm::score_rhythm_pattern(&reference, user, None, None);
        assert!(result.overall_score.is_finite());
        assert!((0.0..=100.0).contains(&result.overall_score), "{user:?}");
        assert!((0.0..=100.0).contains(&result.consistency_score));
    }
}
