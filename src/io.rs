use log::{debug, info};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::{MediaSource, MediaSourceStream};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::{Error, Result};

/// Maximum accepted in-memory payload: 50 MiB.
pub const MAX_SOURCE_BYTES: usize = 50 * 1024 * 1024;

/// Lowest decoder sample rate the analysis chain accepts.
pub const MIN_SAMPLE_RATE: u32 = 8_000;
/// Highest decoder sample rate the analysis chain accepts.
pub const MAX_SAMPLE_RATE: u32 = 192_000;

/// A PCM audio source: either a file on disk or an in-memory payload with
/// its declared content type.
///
/// Decoding a [`PcmSource::Bytes`] never touches the filesystem.
#[derive(Debug, Clone)]
pub enum PcmSource {
    /// Audio file readable from the local filesystem.
    Path(PathBuf),
    /// Raw container bytes plus a MIME content type such as `audio/wav`.
    Bytes { data: Vec<u8>, content_type: String },
}

impl PcmSource {
    /// Convenience constructor from anything path-like.
    pub fn path<P: AsRef<Path>>(path: P) -> Self {
        PcmSource::Path(path.as_ref().to_path_buf())
    }

    /// Convenience constructor for in-memory payloads.
    pub fn bytes(data: Vec<u8>, content_type: impl Into<String>) -> Self {
        PcmSource::Bytes {
            data,
            content_type: content_type.into(),
        }
    }
}

/// Decoded audio: mono samples normalized into [-1, 1].
///
/// The channel count records the source layout; `samples` is always the
/// arithmetic mean across channels. No resampling is ever performed, so
/// downstream stages must treat `sample_rate_hz` parametrically.
#[derive(Debug, Clone)]
pub struct AudioBuffer {
    pub sample_rate_hz: u32,
    pub channels: u8,
    pub samples: Vec<f64>,
}

impl AudioBuffer {
    /// Duration of the buffer in milliseconds.
    pub fn duration_ms(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate_hz as f64 * 1000.0
    }
}

fn extension_for_content_type(content_type: &str) -> Result<&'static str> {
    match content_type {
        "audio/wav" | "audio/x-wav" => Ok("wav"),
        "audio/mp3" | "audio/mpeg" => Ok("mp3"),
        "audio/ogg" => Ok("ogg"),
        "audio/m4a" => Ok("m4a"),
        "audio/aac" => Ok("aac"),
        other => Err(Error::Decode(format!(
            "unsupported content type `{other}`"
        ))),
    }
}

/// Decode a PCM source into a normalized mono [`AudioBuffer`].
///
/// Supports WAV/MP3/OGG/M4A/AAC containers via symphonia. Multi-channel
/// audio is collapsed by arithmetic mean; peaks above full scale are
/// rescaled so the result stays within [-1, 1].
///
/// # Errors
/// Returns [`Error::Decode`] on unknown formats, malformed containers,
/// empty streams, oversized byte payloads, or sample rates outside
/// [`MIN_SAMPLE_RATE`]..=[`MAX_SAMPLE_RATE`].
pub fn decode(source: &PcmSource) -> Result<AudioBuffer> {
    match source {
        PcmSource::Path(path) => {
            let mut hint = Hint::new();
            if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
                hint.with_extension(ext);
            }
            let file = std::fs::File::open(path)
                .map_err(|e| Error::Decode(format!("cannot open {}: {e}", path.display())))?;
            decode_stream(Box::new(file), hint)
        }
        PcmSource::Bytes { data, content_type } => {
            if data.len() > MAX_SOURCE_BYTES {
                return Err(Error::Decode(format!(
                    "payload of {} bytes exceeds the {} byte limit",
                    data.len(),
                    MAX_SOURCE_BYTES
                )));
            }
            let mut hint = Hint::new();
            hint.with_extension(extension_for_content_type(content_type)?);
            decode_stream(Box::new(Cursor::new(data.clone())), hint)
        }
    }
}

fn decode_stream(source: Box<dyn MediaSource>, hint: Hint) -> Result<AudioBuffer> {
    let mss = MediaSourceStream::new(source, Default::default());
    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| Error::Decode(format!("unrecognized container: {e}")))?;

    let mut format = probed.format;
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.sample_rate.is_some())
        .ok_or_else(|| Error::Decode("no audio track found".into()))?
        .clone();

    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| Error::Decode("track is missing a sample rate".into()))?;
    if !(MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&sample_rate) {
        return Err(Error::Decode(format!(
            "sample rate {sample_rate} Hz outside supported range \
             {MIN_SAMPLE_RATE}..={MAX_SAMPLE_RATE}"
        )));
    }
    let channels = track
        .codec_params
        .channels
        .map(|c| c.count())
        .unwrap_or(0);
    if channels == 0 {
        return Err(Error::Decode("track reports zero channels".into()));
    }

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| Error::Decode(format!("no decoder for track: {e}")))?;

    let mut interleaved: Vec<f64> = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::ResetRequired) => {
                decoder.reset();
                continue;
            }
            Err(SymphoniaError::IoError(_)) => break,
            Err(e) => return Err(Error::Decode(format!("demux failed: {e}"))),
        };

        if packet.track_id() != track.id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(audio) => audio,
            Err(SymphoniaError::IoError(_)) => break,
            Err(SymphoniaError::DecodeError(_)) => continue,
            Err(e) => return Err(Error::Decode(format!("codec failed: {e}"))),
        };

        let mut sb = SampleBuffer::<f64>::new(decoded.capacity() as u64, *decoded.spec());
        sb.copy_interleaved_ref(decoded);
        interleaved.extend_from_slice(sb.samples());
    }

    if interleaved.is_empty() {
        return Err(Error::Decode("decoded stream contains no samples".into()));
    }

    let frames = interleaved.len() / channels;
    let mut samples = Vec::with_capacity(frames);
    for frame in 0..frames {
        let mut acc = 0.0f64;
        for ch in 0..channels {
            acc += interleaved[frame * channels + ch];
        }
        samples.push(acc / channels as f64);
    }

    let peak = samples.iter().fold(0.0f64, |a, &s| a.max(s.abs()));
    if peak > 1.0 {
        debug!("peak {peak:.3} above full scale, rescaling");
        for s in &mut samples {
            *s /= peak;
        }
    }

    info!(
        "decoded {} mono samples at {} Hz from {} channel(s)",
        samples.len(),
        sample_rate,
        channels
    );

    Ok(AudioBuffer {
        sample_rate_hz: sample_rate,
        channels: channels.min(u8::MAX as usize) as u8,
        samples,
    })
}

/// Generate a pure sine tone, mostly useful for fixtures.
pub fn tone(frequency: f64, sample_rate: u32, duration_secs: f64) -> Vec<f64> {
    let n_samples = (duration_secs * sample_rate as f64) as usize;
    let angular = 2.0 * std::f64::consts::PI * frequency / sample_rate as f64;
    (0..n_samples).map(|i| (angular * i as f64).sin()).collect()
}

/// Generate a click track: short exponentially-decaying sine bursts at the
/// given times (in seconds), over a silent bed of `length` samples.
pub fn clicks(times_secs: &[f64], sample_rate: u32, length: usize) -> Vec<f64> {
    let mut y = vec![0.0f64; length];
    let click_samples = (0.03 * sample_rate as f64) as usize;
    let angular = 2.0 * std::f64::consts::PI * 1000.0 / sample_rate as f64;

    for &time in times_secs {
        let start = (time * sample_rate as f64) as usize;
        if start >= length {
            continue;
        }
        for i in 0..click_samples {
            let idx = start + i;
            if idx >= length {
                break;
            }
            let t = i as f64;
            let envelope = (-t / (click_samples as f64 * 0.1)).exp();
            y[idx] += envelope * (angular * t).sin();
        }
    }
    y
}
