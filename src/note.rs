use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::cancel::CancelToken;
use crate::io::AudioBuffer;
use crate::onset::{PercussiveConfig, detect_percussive_onsets};
use crate::pitch::{PitchFrame, YinConfig, track};

/// Notes shorter than this are discarded as noise.
pub const MIN_NOTE_DURATION_MS: f64 = 50.0;
/// Pitch samples within this window of an onset belong to its note.
const PITCH_MATCH_WINDOW_MS: f64 = 100.0;
/// Pitch jump that opens a new note in the fallback segmentation.
const PITCH_CHANGE_TOLERANCE_HZ: f64 = 50.0;

/// A single sung or played note.
///
/// `pitch_hz <= 0` marks silence/unvoiced. Events produced by
/// [`extract_note_events`] are strictly ordered by onset and at least
/// [`MIN_NOTE_DURATION_MS`] long.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NoteEvent {
    /// Note start in milliseconds from the beginning of the audio.
    pub onset_ms: f64,
    /// Fundamental frequency in Hz; `<= 0` for unvoiced.
    pub pitch_hz: f64,
    /// Note length in milliseconds.
    pub duration_ms: f64,
    /// Relative strength in [0, 1].
    pub amplitude: f64,
}

impl NoteEvent {
    pub fn new(onset_ms: f64, pitch_hz: f64, duration_ms: f64, amplitude: f64) -> Self {
        Self {
            onset_ms,
            pitch_hz,
            duration_ms,
            amplitude,
        }
    }

    /// Whether the event carries a usable pitch.
    pub fn is_voiced(&self) -> bool {
        self.pitch_hz > 0.0
    }

    /// MIDI note number: `round(69 + 12·log2(pitch/440))`. `None` when
    /// unvoiced.
    pub fn midi_note(&self) -> Option<i32> {
        if !self.is_voiced() {
            return None;
        }
        Some((69.0 + 12.0 * (self.pitch_hz / 440.0).log2()).round() as i32)
    }

    /// Signed pitch distance to another note in semitones:
    /// `12·log2(self/other)`. `None` when either side is unvoiced.
    pub fn semitones_to(&self, other: &NoteEvent) -> Option<f64> {
        if !self.is_voiced() || !other.is_voiced() {
            return None;
        }
        Some(12.0 * (self.pitch_hz / other.pitch_hz).log2())
    }

    /// Onset difference in milliseconds; positive when this note starts
    /// after the other.
    pub fn timing_offset_ms(&self, other: &NoteEvent) -> f64 {
        self.onset_ms - other.onset_ms
    }
}

/// Extract note events by merging percussive onsets with YIN pitch frames.
///
/// Two passes over the buffer: onsets first, then voiced pitch samples. For
/// every onset, the pitch samples within ±100 ms are averaged into one
/// note; its duration runs to the next onset (the last note runs to the
/// final pitch sample). Notes shorter than [`MIN_NOTE_DURATION_MS`] or
/// without voiced support are dropped.
///
/// When onset detection yields nothing usable, the continuous pitch stream
/// is segmented directly: a jump of more than 50 Hz opens a new note.
pub fn extract_note_events(
    buffer: &AudioBuffer,
    cancel: &CancelToken,
) -> crate::Result<Vec<NoteEvent>> {
    let onsets = detect_percussive_onsets(buffer, &PercussiveConfig::default(), cancel)?;
    let onset_times_ms: Vec<f64> = onsets.iter().map(|o| o.time_secs * 1000.0).collect();

    let pitch_frames = track(buffer, &YinConfig::new(buffer.sample_rate_hz), cancel)?;
    debug!(
        "note extraction: {} onsets, {} pitch samples",
        onset_times_ms.len(),
        pitch_frames.len()
    );

    if pitch_frames.is_empty() {
        return Ok(Vec::new());
    }

    let mut notes = Vec::new();
    let last_pitch_time = pitch_frames.last().map(|p| p.time_ms).unwrap_or(0.0);

    for (i, &onset_ms) in onset_times_ms.iter().enumerate() {
        cancel.bail_if_cancelled()?;

        let nearby: Vec<&PitchFrame> = pitch_frames
            .iter()
            .filter(|p| (p.time_ms - onset_ms).abs() < PITCH_MATCH_WINDOW_MS)
            .collect();
        if nearby.is_empty() {
            continue;
        }

        let pitch = nearby.iter().map(|p| p.pitch_hz).sum::<f64>() / nearby.len() as f64;
        let amplitude = nearby.iter().map(|p| p.probability).sum::<f64>() / nearby.len() as f64;

        let duration = if i + 1 < onset_times_ms.len() {
            onset_times_ms[i + 1] - onset_ms
        } else {
            last_pitch_time - onset_ms
        };

        if duration >= MIN_NOTE_DURATION_MS && pitch > 0.0 {
            notes.push(NoteEvent::new(onset_ms, pitch, duration, amplitude));
        }
    }

    if notes.is_empty() {
        info!("onset pass yielded no notes, falling back to pitch segmentation");
        notes = segment_pitch_stream(&pitch_frames);
    }

    info!("extracted {} note events", notes.len());
    Ok(notes)
}

/// Fallback: split the continuous pitch stream into notes at significant
/// pitch jumps, averaging pitch and probability over each run.
fn segment_pitch_stream(pitch_frames: &[PitchFrame]) -> Vec<NoteEvent> {
    let mut notes = Vec::new();
    let Some(first) = pitch_frames.first() else {
        return notes;
    };

    let mut current_onset = first.time_ms;
    let mut current_pitch = first.pitch_hz;
    let mut amplitude_sum = first.probability;
    let mut sample_count = 1usize;

    for frame in &pitch_frames[1..] {
        if (frame.pitch_hz - current_pitch).abs() > PITCH_CHANGE_TOLERANCE_HZ {
            let duration = frame.time_ms - current_onset;
            if duration >= MIN_NOTE_DURATION_MS {
                notes.push(NoteEvent::new(
                    current_onset,
                    current_pitch,
                    duration,
                    amplitude_sum / sample_count as f64,
                ));
            }
            current_onset = frame.time_ms;
            current_pitch = frame.pitch_hz;
            amplitude_sum = frame.probability;
            sample_count = 1;
        } else {
            current_pitch =
                (current_pitch * sample_count as f64 + frame.pitch_hz) / (sample_count + 1) as f64;
            amplitude_sum += frame.probability;
            sample_count += 1;
        }
    }

    let last_time = pitch_frames.last().map(|p| p.time_ms).unwrap_or(current_onset);
    let duration = last_time - current_onset;
    if duration >= MIN_NOTE_DURATION_MS {
        notes.push(NoteEvent::new(
            current_onset,
            current_pitch,
            duration,
            amplitude_sum / sample_count as f64,
        ));
    }

    notes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::tone;
    use crate::pitch::PitchFrame;

    #[test]
    fn midi_note_for_concert_a() {
        let a4 = NoteEvent::new(0.0, 440.0, 100.0, 1.0);
        assert_eq!(a4.midi_note(), Some(69));
        let a5 = NoteEvent::new(0.0, 880.0, 100.0, 1.0);
        assert_eq!(a5.midi_note(), Some(81));
    }

    #[test]
    fn semitones_across_an_octave() {
        let a4 = NoteEvent::new(0.0, 440.0, 100.0, 1.0);
        let a5 = NoteEvent::new(0.0, 880.0, 100.0, 1.0);
        assert!((a5.semitones_to(&a4).unwrap() - 12.0).abs() < 1e-12);
        assert!((a4.semitones_to(&a5).unwrap() + 12.0).abs() < 1e-12);
    }

    #[test]
    fn semitones_undefined_for_unvoiced() {
        let voiced = NoteEvent::new(0.0, 440.0, 100.0, 1.0);
        let silent = NoteEvent::new(0.0, -1.0, 100.0, 0.0);
        assert_eq!(voiced.semitones_to(&silent), None);
        assert_eq!(silent.semitones_to(&voiced), None);
        assert_eq!(silent.midi_note(), None);
    }

    #[test]
    fn timing_offset_signs() {
        let early = NoteEvent::new(100.0, 440.0, 100.0, 1.0);
        let late = NoteEvent::new(250.0, 440.0, 100.0, 1.0);
        assert_eq!(late.timing_offset_ms(&early), 150.0);
        assert_eq!(early.timing_offset_ms(&late), -150.0);
    }

    fn frames_from(specs: &[(f64, f64)]) -> Vec<PitchFrame> {
        specs
            .iter()
            .map(|&(time_ms, pitch_hz)| PitchFrame {
                time_ms,
                pitch_hz,
                probability: 0.9,
            })
            .collect()
    }

    #[test]
    fn segmentation_splits_on_pitch_jump() {
        // 440 Hz for 200 ms, then 660 Hz for 200 ms.
        let frames = frames_from(&[
            (0.0, 440.0),
            (50.0, 441.0),
            (100.0, 439.0),
            (150.0, 440.0),
            (200.0, 660.0),
            (250.0, 661.0),
            (300.0, 659.0),
            (350.0, 660.0),
        ]);
        let notes = segment_pitch_stream(&frames);
        assert_eq!(notes.len(), 2);
        assert!((notes[0].pitch_hz - 440.0).abs() < 2.0);
        assert!((notes[1].pitch_hz - 660.0).abs() < 2.0);
        assert_eq!(notes[0].onset_ms, 0.0);
        assert_eq!(notes[1].onset_ms, 200.0);
    }

    #[test]
    fn segmentation_drops_short_runs() {
        // Single 40 ms run: under the minimum duration.
        let frames = frames_from(&[(0.0, 440.0), (40.0, 440.0)]);
        let notes = segment_pitch_stream(&frames);
        assert!(notes.is_empty());
    }

    #[test]
    fn sustained_tone_produces_notes() {
        let buffer = AudioBuffer {
            sample_rate_hz: 44100,
            channels: 1,
            samples: tone(440.0, 44100, 1.0),
        };
        let notes = extract_note_events(&buffer, &CancelToken::new()).unwrap();
        assert!(!notes.is_empty());
        for note in &notes {
            assert!(note.is_voiced());
            assert!(note.duration_ms >= MIN_NOTE_DURATION_MS);
            assert!((note.pitch_hz - 440.0).abs() < 30.0, "pitch {}", note.pitch_hz);
        }
    }

    #[test]
    fn notes_are_ordered_by_onset() {
        let buffer = AudioBuffer {
            sample_rate_hz: 44100,
            channels: 1,
            samples: tone(440.0, 44100, 1.0),
        };
        let notes = extract_note_events(&buffer, &CancelToken::new()).unwrap();
        for pair in notes.windows(2) {
            assert!(pair[1].onset_ms > pair[0].onset_ms);
        }
    }

    #[test]
    fn silence_has_no_notes() {
        let buffer = AudioBuffer {
            sample_rate_hz: 44100,
            channels: 1,
            samples: vec![0.0; 44100],
        };
        let notes = extract_note_events(&buffer, &CancelToken::new()).unwrap();
        assert!(notes.is_empty());
    }
}
