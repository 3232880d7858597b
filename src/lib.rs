//! Audio performance analysis and scoring engine.
//!
//! Encore scores a musical performance — sung or clapped/tapped — against a
//! reference track, producing a composite score in [0, 100] plus per-beat
//! diagnostics. The pipeline converts raw PCM into note events, onset
//! times and spectral fingerprints, then aligns and compares user and
//! reference sequences across pitch, rhythm, voice timbre and sound
//! similarity.
//!
//! # Quick start
//!
//! ```
//! use encore::rhythm;
//!
//! // Score a tapped rhythm against a known reference pattern.
//! let reference = rhythm::RhythmPattern {
//!     version: rhythm::PATTERN_VERSION,
//!     onset_times_ms: vec![0.0, 500.0, 1000.0, 1500.0],
//!     intervals_ms: vec![500.0, 500.0, 500.0],
//!     estimated_bpm: 120,
//!     time_signature: "4/4".to_string(),
//!     total_beats: 4,
//!     trimmed_start_ms: 0.0,
//!     trimmed_end_ms: 1500.0,
//!     original_duration_ms: 2000.0,
//!     silence_threshold_db: -40.0,
//!     min_onset_interval_ms: 100.0,
//!     beat_fingerprints: None,
//!     sound_similarity_enabled: false,
//!     timing_weight: 0.7,
//!     sound_weight: 0.3,
//! };
//! let result = rhythm::score_rhythm_pattern(
//!     &reference,
//!     &[0.0, 500.0, 1000.0, 1500.0],
//!     Some(150.0),
//!     None,
//! );
//! assert_eq!(result.overall_score, 100.0);
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`io`] | PCM decoding (WAV/MP3/OGG/M4A/AAC), signal generators |
//! | [`frame`] | Lazy analysis-window iteration |
//! | [`fft`] | Real-input FFT with process-wide plan cache |
//! | [`window`] | Window functions |
//! | [`pitch`] | YIN fundamental-frequency estimation |
//! | [`onset`] | Energy and percussive onset detection |
//! | [`feature`] | Mel filterbank, MFCC, spectral descriptors |
//! | [`note`] | Note events and extraction |
//! | [`fingerprint`] | Per-beat sound fingerprints and comparison |
//! | [`rhythm`] | Rhythm patterns, DTW comparison, pattern scoring |
//! | [`score`] | Metric functions, composite results, detailed metrics |
//! | [`challenge`] | Challenge dispatch across metric blends |
//! | [`pipeline`] | Per-performance orchestration with progress reports |
//! | [`cancel`] | Cooperative cancellation |
//!
//! # Error handling
//!
//! All fallible operations return [`Result<T>`], an alias for
//! `std::result::Result<T, Error>`. Decode and internal errors propagate;
//! insufficient-data and alignment conditions are graded into zero-score
//! results with diagnostics so collaborators always get an answer.
//!
//! # Concurrency
//!
//! The engine is synchronous and CPU-bound with no shared mutable state;
//! parallelism belongs to the caller's worker pool. FFT plans and mel
//! filterbanks live in immutable process-wide caches. Every stage checks a
//! caller-provided [`cancel::CancelToken`] at frame granularity.

#![forbid(unsafe_code)]

pub mod error;
pub use error::{Error, ErrorKind, Result};

pub mod cancel;
pub mod challenge;
pub mod feature;
pub mod fft;
pub mod fingerprint;
pub mod frame;
pub mod io;
pub mod note;
pub mod onset;
pub mod pipeline;
pub mod pitch;
pub mod rhythm;
pub mod score;
pub mod window;

pub use challenge::{ChallengeType, ReferenceBundle, ScoreOptions, ScoringRequest};
pub use io::{AudioBuffer, PcmSource};
pub use note::NoteEvent;
pub use pipeline::{Performance, ProcessingStatus};
pub use score::ScoringResult;

use cancel::CancelToken;
use onset::EnergyOnsetConfig;

/// Default analysis sample rate for reference material.
pub const SAMPLE_RATE: u32 = 44_100;
/// Default analysis window in samples.
pub const BUFFER_SIZE: usize = 2_048;

/// Score one performance end to end: decode, analyze, compare, blend.
///
/// Progress is reported through `progress` with the orchestrator's literal
/// stage messages; pass a closure that ignores its arguments when progress
/// is not needed.
pub fn score_performance(
    audio: PcmSource,
    reference: &ReferenceBundle,
    challenge: ChallengeType,
    options: &ScoreOptions,
    progress: &mut dyn FnMut(u8, &str),
    cancel: &CancelToken,
) -> Result<ScoringResult> {
    let mut performance = Performance::new();
    performance
        .process(audio, reference, challenge, options, progress, cancel)
        .cloned()
}

/// Extract a rhythm pattern from audio, optionally fingerprinting each
/// beat for sound-similarity scoring.
pub fn extract_rhythm_pattern(
    audio: &PcmSource,
    silence_threshold_db: f64,
    min_onset_interval_ms: f64,
    with_fingerprints: bool,
    cancel: &CancelToken,
) -> Result<rhythm::RhythmPattern> {
    if !min_onset_interval_ms.is_finite() || min_onset_interval_ms < 0.0 {
        return Err(Error::InvalidParameter {
            name: "min_onset_interval_ms",
            value: min_onset_interval_ms.to_string(),
            reason: "must be finite and non-negative",
        });
    }
    let buffer = io::decode(audio)?;
    let config = EnergyOnsetConfig {
        silence_threshold_db,
        min_onset_interval_ms,
    };
    if with_fingerprints {
        rhythm::extract_pattern_with_fingerprints(&buffer, &config, cancel)
    } else {
        rhythm::extract_pattern(&buffer, &config, cancel)
    }
}

/// Score user onsets against a reference pattern, with optional
/// sound-similarity blending when `user_audio` is supplied and the
/// pattern carries beat fingerprints.
pub fn score_rhythm_pattern(
    pattern: &rhythm::RhythmPattern,
    user_onsets_ms: &[f64],
    user_audio: Option<&PcmSource>,
    options: &rhythm::SoundScoreOptions,
    cancel: &CancelToken,
) -> Result<ScoringResult> {
    let buffer = match user_audio {
        Some(source) => Some(io::decode(source)?),
        None => None,
    };
    rhythm::score_rhythm_with_sound_similarity(
        pattern,
        user_onsets_ms,
        buffer.as_ref(),
        options,
        cancel,
    )
}
