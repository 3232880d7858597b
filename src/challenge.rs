use log::{error, info};

use crate::cancel::CancelToken;
use crate::feature::mfcc::{MFCC_COEFFICIENTS, extract_mfcc};
use crate::io::{PcmSource, decode};
use crate::note::{NoteEvent, extract_note_events};
use crate::onset::{EnergyOnsetConfig, detect_energy_onsets};
use crate::rhythm::{
    SoundScoreOptions, comparison_metrics, creation_metrics, extract_pattern,
    score_rhythm_pattern, score_rhythm_with_sound_similarity,
};
use crate::score::{
    ScoringResult, detailed_metrics, pitch_score_semitones, rhythm_score_onsets,
    voice_similarity_mfcc,
};
use crate::{Error, Result};

/// Default sample interval for legacy reference pitch arrays.
pub const LEGACY_PITCH_INTERVAL_MS: f64 = 100.0;

/// The metric blend applied to a performance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChallengeType {
    /// 50 % pitch, 30 % rhythm, 20 % voice.
    #[default]
    Singing,
    /// 50 % pitch, 40 % voice, 10 % rhythm.
    SoundMatch,
    /// Pattern-based rhythm scoring against a reference recording.
    RhythmRepeat,
    /// 70 % consistency, 30 % creativity of a free-form rhythm.
    RhythmCreation,
}

impl ChallengeType {
    /// Parse a challenge-type string; anything unrecognized falls back to
    /// [`ChallengeType::Singing`].
    pub fn parse(value: &str) -> Self {
        match value {
            "RHYTHM_CREATION" => ChallengeType::RhythmCreation,
            "RHYTHM_REPEAT" => ChallengeType::RhythmRepeat,
            "SOUND_MATCH" => ChallengeType::SoundMatch,
            "SINGING" => ChallengeType::Singing,
            _ => ChallengeType::Singing,
        }
    }
}

/// Reference material for scoring a performance.
///
/// Preferred form is an explicit [`NoteEvent`] list; the legacy form is a
/// bare pitch array sampled at [`LEGACY_PITCH_INTERVAL_MS`] (overridable in
/// [`ScoreOptions`]). Reference audio is required for voice similarity and
/// rhythm-repeat; an optional pre-extracted rhythm pattern enables
/// sound-similarity blending.
#[derive(Debug, Clone, Default)]
pub struct ReferenceBundle {
    pub note_events: Option<Vec<NoteEvent>>,
    /// Legacy pitch samples at a fixed interval.
    pub pitch_data: Option<Vec<f64>>,
    pub audio: Option<PcmSource>,
    pub rhythm_pattern: Option<crate::rhythm::RhythmPattern>,
}

/// Tuning knobs for a scoring request.
#[derive(Debug, Clone, Default)]
pub struct ScoreOptions {
    pub tolerance_ms: Option<f64>,
    pub min_score: Option<u32>,
    pub timing_weight: Option<f64>,
    pub sound_weight: Option<f64>,
    /// Target tempo for rhythm-creation consistency.
    pub target_bpm: Option<u32>,
    pub time_signature: Option<String>,
    /// Sample interval of legacy `pitch_data`, for references captured at a
    /// different rate.
    pub pitch_sample_interval_ms: Option<f64>,
}

/// A complete scoring request.
#[derive(Debug, Clone)]
pub struct ScoringRequest {
    pub challenge: ChallengeType,
    pub user_audio: PcmSource,
    pub reference: ReferenceBundle,
    pub options: ScoreOptions,
}

/// Expand a legacy pitch array into evenly-spaced note events.
pub fn pitch_data_to_notes(pitch_data: &[f64], interval_ms: f64) -> Vec<NoteEvent> {
    pitch_data
        .iter()
        .enumerate()
        .map(|(i, &pitch)| NoteEvent::new(i as f64 * interval_ms, pitch, interval_ms, 0.5))
        .collect()
}

/// Route a scoring request to the right metric blend.
///
/// Graded failures (insufficient data, alignment) and every error below
/// the decode layer are captured as a zero-score result whose
/// `detailed_metrics` carries `{"error": ...}`, so collaborators always
/// receive diagnostics. Cancellation propagates.
pub fn dispatch(request: &ScoringRequest, cancel: &CancelToken) -> Result<ScoringResult> {
    info!("scoring request: {:?}", request.challenge);

    let outcome = match request.challenge {
        ChallengeType::RhythmCreation => score_rhythm_creation(request, cancel),
        ChallengeType::RhythmRepeat => score_rhythm_repeat(request, cancel),
        ChallengeType::SoundMatch => score_note_blend(request, cancel, 0.5, 0.1, 0.4),
        ChallengeType::Singing => score_note_blend(request, cancel, 0.5, 0.3, 0.2),
    };

    match outcome {
        Ok(result) => Ok(result),
        Err(Error::Cancelled) => Err(Error::Cancelled),
        Err(err) if err.is_graded() => {
            info!("graded failure: {err}");
            Ok(ScoringResult::zero_with_error(&err.to_string()))
        }
        Err(err) => {
            error!("scoring failed: {err}");
            Err(err)
        }
    }
}

fn reference_notes(request: &ScoringRequest, cancel: &CancelToken) -> Result<Vec<NoteEvent>> {
    if let Some(notes) = &request.reference.note_events {
        return Ok(notes.clone());
    }
    if let Some(pitch_data) = &request.reference.pitch_data {
        let interval = request
            .options
            .pitch_sample_interval_ms
            .unwrap_or(LEGACY_PITCH_INTERVAL_MS);
        return Ok(pitch_data_to_notes(pitch_data, interval));
    }
    if let Some(audio) = &request.reference.audio {
        let buffer = decode(audio)?;
        return extract_note_events(&buffer, cancel);
    }
    Err(Error::Insufficient(
        "reference bundle carries no note events, pitch data or audio".into(),
    ))
}

fn reference_mfccs(
    request: &ScoringRequest,
    cancel: &CancelToken,
) -> Result<Vec<[f64; MFCC_COEFFICIENTS]>> {
    match &request.reference.audio {
        Some(audio) => {
            let buffer = decode(audio)?;
            extract_mfcc(&buffer, cancel)
        }
        None => Ok(Vec::new()),
    }
}

fn score_note_blend(
    request: &ScoringRequest,
    cancel: &CancelToken,
    pitch_weight: f64,
    rhythm_weight: f64,
    voice_weight: f64,
) -> Result<ScoringResult> {
    let user_buffer = decode(&request.user_audio)?;
    let user_notes = extract_note_events(&user_buffer, cancel)?;
    let user_mfccs = extract_mfcc(&user_buffer, cancel)?;
    drop(user_buffer);

    let ref_notes = reference_notes(request, cancel)?;
    let ref_mfccs = reference_mfccs(request, cancel)?;

    if user_notes.is_empty() || ref_notes.is_empty() {
        return Err(Error::Alignment(format!(
            "no paired notes: {} user, {} reference",
            user_notes.len(),
            ref_notes.len()
        )));
    }

    let pitch = pitch_score_semitones(&user_notes, &ref_notes);
    let rhythm = rhythm_score_onsets(&user_notes, &ref_notes);
    let voice = voice_similarity_mfcc(&user_mfccs, &ref_mfccs);
    let overall = pitch * pitch_weight + rhythm * rhythm_weight + voice * voice_weight;

    let metrics = detailed_metrics(
        &user_notes,
        &ref_notes,
        &user_mfccs,
        &ref_mfccs,
        pitch,
        rhythm,
        voice,
        overall,
    );

    Ok(ScoringResult {
        overall_score: overall,
        pitch_score: pitch,
        rhythm_score: rhythm,
        voice_score: voice,
        combined_score: overall,
        passed: true,
        detailed_metrics: metrics,
        ..ScoringResult::default()
    })
}

fn score_rhythm_repeat(request: &ScoringRequest, cancel: &CancelToken) -> Result<ScoringResult> {
    let user_buffer = decode(&request.user_audio)?;

    let onset_config = EnergyOnsetConfig::default();
    // Prefer a pre-extracted pattern (it may carry fingerprints); fall back
    // to analyzing the reference recording.
    let ref_pattern = match &request.reference.rhythm_pattern {
        Some(pattern) => pattern.clone(),
        None => {
            let audio = request.reference.audio.as_ref().ok_or_else(|| {
                Error::Insufficient("rhythm repeat needs a reference pattern or audio".into())
            })?;
            let ref_buffer = decode(audio)?;
            extract_pattern(&ref_buffer, &onset_config, cancel)?
        }
    };

    let user_pattern = extract_pattern(&user_buffer, &onset_config, cancel)?;
    let tolerance = request.options.tolerance_ms.or(Some(150.0));

    let mut result = if ref_pattern.sound_similarity_enabled {
        let user_absolute: Vec<f64> = user_pattern
            .onset_times_ms
            .iter()
            .map(|t| t + user_pattern.trimmed_start_ms)
            .collect();
        score_rhythm_with_sound_similarity(
            &ref_pattern,
            &user_absolute,
            Some(&user_buffer),
            &SoundScoreOptions {
                tolerance_ms: tolerance,
                min_score: request.options.min_score,
                timing_weight: request.options.timing_weight,
                sound_weight: request.options.sound_weight,
            },
            cancel,
        )?
    } else {
        score_rhythm_pattern(
            &ref_pattern,
            &user_pattern.onset_times_ms,
            tolerance,
            request.options.min_score,
        )
    };

    result.detailed_metrics = comparison_metrics(&ref_pattern, &user_pattern, &result);
    // With fingerprints the blended score is authoritative.
    result.overall_score = if ref_pattern.sound_similarity_enabled {
        result.combined_score
    } else {
        result.overall_score
    };
    result.rhythm_score = result.overall_score;
    Ok(result)
}

fn score_rhythm_creation(request: &ScoringRequest, cancel: &CancelToken) -> Result<ScoringResult> {
    let user_buffer = decode(&request.user_audio)?;
    let onsets = detect_energy_onsets(&user_buffer, &EnergyOnsetConfig::default(), cancel)?;
    drop(user_buffer);

    let consistency = crate::rhythm::analyze_consistency(&onsets, request.options.target_bpm);
    let creativity = crate::rhythm::analyze_creativity(&onsets);
    let rhythm_score = consistency * 0.7 + creativity * 0.3;

    Ok(ScoringResult {
        overall_score: rhythm_score,
        rhythm_score,
        combined_score: rhythm_score,
        consistency_score: consistency,
        passed: true,
        detailed_metrics: creation_metrics(&onsets, consistency, creativity),
        ..ScoringResult::default()
    })
}
