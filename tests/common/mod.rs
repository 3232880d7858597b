use std::io::Cursor;

use encore::io::PcmSource;

/// Encode mono f64 samples as an in-memory 16-bit WAV payload.
pub fn wav_source(samples: &[f64], sample_rate: u32) -> PcmSource {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for &s in samples {
            writer
                .write_sample((s.clamp(-1.0, 1.0) * i16::MAX as f64) as i16)
                .unwrap();
        }
        writer.finalize().unwrap();
    }
    PcmSource::bytes(cursor.into_inner(), "audio/wav")
}
