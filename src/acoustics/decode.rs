use super::sound::Sound;
use hound::{SampleFormat, WavReader};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
    #[error("WAV decode error: {0}")]
    Wav(#[from] hound::Error),
    #[error("Audio file declares zero channels")]
    NoChannels,
}

/// Load an audio file as a mono sound at its native sample rate.
/// Multi-channel files are averaged across channels.
pub fn load_audio(path: &Path) -> Result<Sound, DecodeError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    match ext.as_str() {
        "wav" | "wave" => load_wav(path),
        _ => Err(DecodeError::UnsupportedFormat(ext)),
    }
}

fn load_wav(path: &Path) -> Result<Sound, DecodeError> {
    let reader = WavReader::open(path)?;
    let spec = reader.spec();
    let channels = spec.channels as usize;
    if channels == 0 {
        return Err(DecodeError::NoChannels);
    }

    let interleaved: Vec<f64> = match spec.sample_format {
        SampleFormat::Float => reader
            .into_samples::<f32>()
            .map(|s| s.map(f64::from))
            .collect::<Result<_, _>>()?,
        SampleFormat::Int => {
            let scale = 1.0 / (1u64 << (spec.bits_per_sample.saturating_sub(1))) as f64;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f64 * scale))
                .collect::<Result<_, _>>()?
        }
    };

    let samples = if channels == 1 {
        interleaved
    } else {
        interleaved
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f64>() / channels as f64)
            .collect()
    };

    log::trace!(
        "Decoded {}: {} samples at {} Hz ({} ch, {} bit)",
        path.display(),
        samples.len(),
        spec.sample_rate,
        channels,
        spec.bits_per_sample
    );

    Ok(Sound::new(samples, spec.sample_rate as f64))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use hound::{WavSpec, WavWriter};

    /// Write `samples` (range -1..1) as 16-bit mono PCM.
    pub(crate) fn write_wav(path: &Path, samples: &[f64], sample_rate: u32) {
        let spec = WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(path, spec).unwrap();
        for s in samples {
            writer
                .write_sample((s.clamp(-1.0, 1.0) * 32767.0) as i16)
                .unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_load_16bit_mono() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        write_wav(&path, &[0.0, 0.5, -0.5, 1.0], 16000);
        let sound = load_audio(&path).unwrap();
        assert_eq!(sound.sample_rate(), 16000.0);
        assert_eq!(sound.num_samples(), 4);
        assert!((sound.samples()[1] - 0.5).abs() < 1e-3);
        assert!((sound.samples()[2] + 0.5).abs() < 1e-3);
    }

    #[test]
    fn test_stereo_is_averaged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        let spec = WavSpec {
            channels: 2,
            sample_rate: 8000,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };
        let mut writer = WavWriter::create(&path, spec).unwrap();
        for (l, r) in [(0.2f32, 0.4f32), (-1.0, 1.0)] {
            writer.write_sample(l).unwrap();
            writer.write_sample(r).unwrap();
        }
        writer.finalize().unwrap();

        let sound = load_audio(&path).unwrap();
        assert_eq!(sound.num_samples(), 2);
        assert!((sound.samples()[0] - 0.3).abs() < 1e-6);
        assert!(sound.samples()[1].abs() < 1e-6);
    }

    #[test]
    fn test_unsupported_extension() {
        assert!(matches!(
            load_audio(Path::new("track.shn")),
            Err(DecodeError::UnsupportedFormat(e)) if e == "shn"
        ));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            load_audio(Path::new("/nonexistent/0018.wav")),
            Err(DecodeError::Wav(_))
        ));
    }
}
