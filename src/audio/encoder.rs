use crate::error::{AppError, Result};
use std::path::Path;
use tracing::{debug, warn};

/// Write mono 16-bit PCM samples to a WAV file
///
/// On failure the partially written file is removed.
pub fn write_wav_pcm16(path: &Path, samples: &[i16], sample_rate: u32) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let written = (|| -> std::result::Result<(), hound::Error> {
        let mut writer = hound::WavWriter::create(path, spec)?;
        let mut i16_writer = writer.get_i16_writer(samples.len() as u32);
        for &sample in samples {
            i16_writer.write_sample(sample);
        }
        i16_writer.flush()?;
        writer.finalize()
    })();

    match written {
        Ok(()) => {
            debug!("Wrote {} samples at {}Hz to {:?}", samples.len(), sample_rate, path);
            Ok(())
        }
        Err(e) => {
            if path.exists() {
                if let Err(remove_err) = std::fs::remove_file(path) {
                    warn!("Failed to remove partial output {:?}: {}", path, remove_err);
                }
            }
            Err(AppError::Encode(format!("{}: {}", path.display(), e)))
        }
    }
}
