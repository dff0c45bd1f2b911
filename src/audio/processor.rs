use crate::error::{AppError, Result};
use rubato::{FftFixedInOut, Resampler};
use std::fs::File;
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, info, warn};

/// Resample mono audio between two rates
///
/// The output holds exactly `ceil(len * to / from)` samples; the resampler
/// delay is removed so the signal stays aligned with the input.
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    if from_rate == to_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    debug!("Resampling {} samples from {}Hz to {}Hz", samples.len(), from_rate, to_rate);

    let mut resampler = FftFixedInOut::<f32>::new(from_rate as usize, to_rate as usize, 1024, 1)
        .map_err(|e| AppError::Audio(format!("Failed to create resampler: {}", e)))?;

    let expected = (samples.len() as u64 * to_rate as u64).div_ceil(from_rate as u64) as usize;
    let delay = resampler.output_delay();
    let chunk_size = resampler.input_frames_next();
    let mut output = Vec::with_capacity(expected + delay + chunk_size);

    for chunk in samples.chunks(chunk_size) {
        let mut input_chunk = chunk.to_vec();

        // Pad last chunk if needed
        if input_chunk.len() < chunk_size {
            input_chunk.resize(chunk_size, 0.0);
        }

        let result = resampler
            .process(&[input_chunk], None)
            .map_err(|e| AppError::Audio(format!("Resampling failed: {}", e)))?;

        if let Some(channel) = result.first() {
            output.extend_from_slice(channel);
        }
    }

    // Flush the delay line
    while output.len() < expected + delay {
        let silence = vec![0.0f32; chunk_size];
        let result = resampler
            .process(&[silence], None)
            .map_err(|e| AppError::Audio(format!("Resampling failed: {}", e)))?;
        match result.first() {
            Some(channel) if !channel.is_empty() => output.extend_from_slice(channel),
            _ => break,
        }
    }

    output.drain(..delay.min(output.len()));
    output.truncate(expected);
    Ok(output)
}

/// Load audio from file as mono f32 at its native sample rate
///
/// WAV goes through hound, anything else (MP3, FLAC, OGG) through symphonia.
/// Every failure is reported as [`AppError::Decode`].
pub fn load_audio_file(path: &Path) -> Result<(Vec<f32>, u32)> {
    if !path.exists() {
        return Err(AppError::Decode(format!("File not found: {}", path.display())));
    }

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|s| s.to_lowercase())
        .unwrap_or_default();

    let (samples, sample_rate) = match extension.as_str() {
        "wav" => load_wav(path)?,
        _ => load_compressed(path, &extension)?,
    };

    if samples.is_empty() {
        return Err(AppError::Decode(format!("No audio samples in {}", path.display())));
    }
    if sample_rate == 0 {
        return Err(AppError::Decode(format!("Invalid sample rate in {}", path.display())));
    }

    info!(
        "Loaded {:?}: {} samples at {}Hz ({:.2}s)",
        path.file_name().unwrap_or_default(),
        samples.len(),
        sample_rate,
        samples.len() as f64 / sample_rate as f64
    );

    Ok((samples, sample_rate))
}

fn load_wav(path: &Path) -> Result<(Vec<f32>, u32)> {
    let reader = hound::WavReader::open(path).map_err(|e| AppError::Decode(e.to_string()))?;

    let spec = reader.spec();
    let sample_rate = spec.sample_rate;
    let channels = spec.channels as usize;

    debug!(
        "Loading WAV: {}Hz, {} channels, {:?}",
        sample_rate, channels, spec.sample_format
    );

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AppError::Decode(e.to_string()))?,
        hound::SampleFormat::Int => {
            let bits = spec.bits_per_sample;
            let max_val = (1i64 << (bits - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max_val))
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| AppError::Decode(e.to_string()))?
        }
    };

    Ok((downmix_to_mono(&samples, channels), sample_rate))
}

fn load_compressed(path: &Path, extension: &str) -> Result<(Vec<f32>, u32)> {
    let file = File::open(path).map_err(|e| AppError::Decode(e.to_string()))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if !extension.is_empty() {
        hint.with_extension(extension);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| AppError::Decode(format!("Unsupported format: {}", e)))?;

    let mut format = probed.format;
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| AppError::Decode("No supported audio track".to_string()))?;

    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(0);
    let mut channels = track.codec_params.channels.map(|c| c.count()).unwrap_or(0);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| AppError::Decode(format!("Unsupported codec: {}", e)))?;

    let mut interleaved: Vec<f32> = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(e) => return Err(AppError::Decode(e.to_string())),
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                sample_rate = spec.rate;
                channels = spec.channels.count();

                let mut buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                buf.copy_interleaved_ref(decoded);
                interleaved.extend_from_slice(buf.samples());
            }
            Err(SymphoniaError::DecodeError(e)) => {
                // Corrupt frame, keep decoding the rest
                warn!("Skipping undecodable packet at ts={}: {}", packet.ts, e);
                continue;
            }
            Err(e) => return Err(AppError::Decode(e.to_string())),
        }
    }

    debug!(
        "Decoded {}: {}Hz, {} channels, {} interleaved samples",
        extension,
        sample_rate,
        channels,
        interleaved.len()
    );

    Ok((downmix_to_mono(&interleaved, channels.max(1)), sample_rate))
}

/// Convert interleaved audio to mono by averaging channels
pub fn downmix_to_mono(samples: &[f32], channels: usize) -> Vec<f32> {
    if channels > 1 {
        samples
            .chunks(channels)
            .map(|chunk| chunk.iter().sum::<f32>() / channels as f32)
            .collect()
    } else {
        samples.to_vec()
    }
}

/// Calculate the duration in milliseconds
pub fn duration_ms(samples: &[f32], sample_rate: u32) -> i64 {
    ((samples.len() as f64 / sample_rate as f64) * 1000.0) as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_test_wav(path: &Path, channels: u16, frames: &[Vec<i16>], sample_rate: u32) {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for frame in frames {
            for &s in frame {
                writer.write_sample(s).unwrap();
            }
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_load_mono_wav_keeps_native_rate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mono.wav");
        let frames: Vec<Vec<i16>> = (0..22050).map(|_| vec![16384]).collect();
        write_test_wav(&path, 1, &frames, 22050);

        let (samples, rate) = load_audio_file(&path).unwrap();
        assert_eq!(rate, 22050);
        assert_eq!(samples.len(), 22050);
        assert!((samples[0] - 0.5).abs() < 1e-4);
    }

    #[test]
    fn test_load_stereo_wav_downmixes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        let frames: Vec<Vec<i16>> = (0..1000).map(|_| vec![16384, -16384]).collect();
        write_test_wav(&path, 2, &frames, 44100);

        let (samples, rate) = load_audio_file(&path).unwrap();
        assert_eq!(rate, 44100);
        assert_eq!(samples.len(), 1000);
        assert!(samples.iter().all(|s| s.abs() < 1e-6));
    }

    #[test]
    fn test_corrupt_file_is_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.mp3");
        std::fs::write(&path, b"definitely not an mp3 stream").unwrap();

        let err = load_audio_file(&path).unwrap_err();
        assert!(matches!(err, AppError::Decode(_)), "got {:?}", err);

        let wav = dir.path().join("broken.wav");
        std::fs::write(&wav, b"RIFF....WAVEjunk").unwrap();
        assert!(matches!(load_audio_file(&wav), Err(AppError::Decode(_))));
    }

    #[test]
    fn test_missing_file_is_decode_error() {
        let err = load_audio_file(Path::new("/nonexistent/song.wav")).unwrap_err();
        assert!(matches!(err, AppError::Decode(_)));
    }

    #[test]
    fn test_resample_length() {
        let samples: Vec<f32> = (0..48000)
            .map(|i| (i as f32 * 440.0 * 2.0 * std::f32::consts::PI / 48000.0).sin() * 0.5)
            .collect();

        let resampled = resample(&samples, 48000, 44100).unwrap();
        assert_eq!(resampled.len(), 44100);

        let same = resample(&samples, 48000, 48000).unwrap();
        assert_eq!(same.len(), samples.len());
    }

    #[test]
    fn test_duration_ms() {
        let samples = vec![0.0f32; 44100 * 3 / 2];
        assert_eq!(duration_ms(&samples, 44100), 1500);
    }
}
