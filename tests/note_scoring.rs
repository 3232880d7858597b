//! Note/voice-path scenarios: semitone math, metric identities, challenge
//! dispatch blends.

mod common;

use approx::assert_relative_eq;
use common::wav_source;
use encore::cancel::CancelToken;
use encore::challenge::{ChallengeType, ReferenceBundle, ScoreOptions, ScoringRequest, dispatch};
use encore::io::tone;
use encore::note::NoteEvent;
use encore::score::{
    cosine_similarity, pitch_score_semitones, rhythm_score_onsets, voice_similarity_mfcc,
};

fn melody() -> Vec<NoteEvent> {
    vec![
        NoteEvent::new(0.0, 440.0, 400.0, 0.9),
        NoteEvent::new(400.0, 493.88, 400.0, 0.8),
        NoteEvent::new(800.0, 523.25, 400.0, 0.85),
        NoteEvent::new(1200.0, 587.33, 500.0, 0.9),
    ]
}

#[test]
fn cosine_identity() {
    assert_eq!(cosine_similarity(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0]), 1.0);
}

#[test]
fn semitone_math_octave() {
    let a4 = NoteEvent::new(0.0, 440.0, 100.0, 1.0);
    let a5 = NoteEvent::new(0.0, 880.0, 100.0, 1.0);
    assert_eq!(a5.semitones_to(&a4), Some(12.0));
}

#[test]
fn self_comparison_identities() {
    let notes = melody();
    assert_eq!(pitch_score_semitones(&notes, &notes), 100.0);
    assert_eq!(rhythm_score_onsets(&notes, &notes), 100.0);

    let mfccs: Vec<[f64; 13]> = (0..20)
        .map(|i| {
            let mut v = [0.0; 13];
            for (j, x) in v.iter_mut().enumerate() {
                *x = ((i * 13 + j) as f64 * 0.37).sin() + 2.0;
            }
            v
        })
        .collect();
    assert!(voice_similarity_mfcc(&mfccs, &mfccs) >= 99.99);
}

#[test]
fn pitch_score_penalizes_detuning() {
    let reference = melody();
    // Everything a whole tone (2 semitones) sharp: raw 100 - 40, no bonus.
    let sharp: Vec<NoteEvent> = reference
        .iter()
        .map(|n| NoteEvent::new(n.onset_ms, n.pitch_hz * 2.0f64.powf(2.0 / 12.0), n.duration_ms, n.amplitude))
        .collect();
    let score = pitch_score_semitones(&sharp, &reference);
    assert!((score - 60.0).abs() < 1e-6, "score {score}");
}

#[test]
fn rhythm_score_penalizes_lateness() {
    let reference = melody();
    let late: Vec<NoteEvent> = reference
        .iter()
        .map(|n| NoteEvent::new(n.onset_ms + 200.0, n.pitch_hz, n.duration_ms, n.amplitude))
        .collect();
    // avg offset 200 ms, none within 100 ms: (100-20)*0.7 = 56.
    let score = rhythm_score_onsets(&late, &reference);
    assert!((score - 56.0).abs() < 1e-6, "score {score}");
}

fn singing_request(challenge: ChallengeType) -> ScoringRequest {
    let user = tone(440.0, 44100, 1.0);
    let reference = tone(440.0, 44100, 1.0);
    ScoringRequest {
        challenge,
        user_audio: wav_source(&user, 44100),
        reference: ReferenceBundle {
            audio: Some(wav_source(&reference, 44100)),
            ..ReferenceBundle::default()
        },
        options: ScoreOptions::default(),
    }
}

#[test]
fn singing_dispatch_blend() {
    let result = dispatch(&singing_request(ChallengeType::Singing), &CancelToken::new()).unwrap();
    let blend =
        0.5 * result.pitch_score + 0.3 * result.rhythm_score + 0.2 * result.voice_score;
    assert_relative_eq!(result.overall_score, blend, epsilon = 1e-9);
    // Same audio on both sides: pitch and voice should be excellent.
    assert!(result.pitch_score > 90.0, "pitch {}", result.pitch_score);
    assert!(result.voice_score > 95.0, "voice {}", result.voice_score);
}

#[test]
fn sound_match_dispatch_blend() {
    let result =
        dispatch(&singing_request(ChallengeType::SoundMatch), &CancelToken::new()).unwrap();
    let blend =
        0.5 * result.pitch_score + 0.4 * result.voice_score + 0.1 * result.rhythm_score;
    assert_relative_eq!(result.overall_score, blend, epsilon = 1e-9);
}

#[test]
fn dispatch_grades_silent_audio() {
    // Silence yields no notes; the dispatcher converts the alignment
    // failure into a zero-score result with error diagnostics.
    let request = ScoringRequest {
        challenge: ChallengeType::Singing,
        user_audio: wav_source(&vec![0.0; 44_100], 44100),
        reference: ReferenceBundle {
            audio: Some(wav_source(&tone(440.0, 44100, 1.0), 44100)),
            ..ReferenceBundle::default()
        },
        options: ScoreOptions::default(),
    };
    let result = dispatch(&request, &CancelToken::new()).unwrap();
    assert_eq!(result.overall_score, 0.0);
    assert!(result.detailed_metrics["error"].is_string());
}

#[test]
fn legacy_pitch_data_reference_works() {
    // Reference as a bare pitch array sampled every 100 ms.
    let request = ScoringRequest {
        challenge: ChallengeType::Singing,
        user_audio: wav_source(&tone(440.0, 44100, 1.0), 44100),
        reference: ReferenceBundle {
            pitch_data: Some(vec![440.0; 10]),
            ..ReferenceBundle::default()
        },
        options: ScoreOptions::default(),
    };
    let result = dispatch(&request, &CancelToken::new()).unwrap();
    // In-tune user against an in-tune legacy reference.
    assert!(result.pitch_score > 90.0, "pitch {}", result.pitch_score);
    // No reference audio, so the voice dimension contributes nothing.
    assert_eq!(result.voice_score, 0.0);
}

#[test]
fn detailed_metrics_keys_are_stable() {
    let result = dispatch(&singing_request(ChallengeType::Singing), &CancelToken::new()).unwrap();
    let metrics = &result.detailed_metrics;
    for key in ["pitchAccuracy", "rhythmTiming", "voiceSimilarity", "overallScore"] {
        assert!(metrics.get(key).is_some(), "missing {key}");
    }
    for key in [
        "averageSemitoneDeviation",
        "notesHitCorrectly",
        "totalNotes",
        "accuracyPercentage",
        "maxDeviation",
    ] {
        assert!(metrics["pitchAccuracy"].get(key).is_some(), "missing {key}");
    }
    for key in [
        "averageTimingOffsetMs",
        "onTimeNotesCount",
        "earlyNotesCount",
        "lateNotesCount",
        "maxTimingErrorMs",
    ] {
        assert!(metrics["rhythmTiming"].get(key).is_some(), "missing {key}");
    }
    for key in ["mfccSimilarityScore", "spectralDistance", "timbreMatchPercentage"] {
        assert!(metrics["voiceSimilarity"].get(key).is_some(), "missing {key}");
    }
}

#[test]
fn all_returned_scores_in_range() {
    for challenge in [
        ChallengeType::Singing,
        ChallengeType::SoundMatch,
        ChallengeType::RhythmRepeat,
        ChallengeType::RhythmCreation,
    ] {
        let result = dispatch(&singing_request(challenge), &CancelToken::new()).unwrap();
        for score in [
            result.overall_score,
            result.pitch_score,
            result.rhythm_score,
            result.voice_score,
            result.combined_score,
            result.consistency_score,
        ] {
            assert!(score.is_finite(), "{challenge:?}: non-finite score");
            assert!((0.0..=100.0).contains(&score), "{challenge:?}: {score}");
        }
    }
}
