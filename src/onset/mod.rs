//! Onset detection.
//!
//! Two detectors with different jobs: the energy detector drives the rhythm
//! path (claps/taps against a silence floor, with hysteresis and debounce),
//! the percussive detector drives the note path (spectral-flux bursts that
//! mark where sung notes begin).

mod energy;
mod percussive;

pub use energy::{
    EnergyOnsetConfig, HYSTERESIS_DB, RISE_DB, SILENCE_DEFAULT_DB, detect_energy_onsets,
};
pub use percussive::{PercussiveConfig, PercussiveOnset, detect_percussive_onsets};
