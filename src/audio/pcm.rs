//! Float to 16-bit PCM conversion for the separated tracks

use crate::error::{AppError, Result};

/// Full-scale value used for quantization
pub const PCM16_SCALE: f32 = 32767.0;

/// Clamp a sample to [-1.0, 1.0]; NaN becomes silence
#[inline]
pub fn clamp_sample(sample: f32) -> f32 {
    if sample.is_nan() {
        0.0
    } else {
        sample.clamp(-1.0, 1.0)
    }
}

/// Clamp then scale by 32767, truncating toward zero
pub fn quantize_pcm16(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&s| (clamp_sample(s) * PCM16_SCALE) as i16)
        .collect()
}

/// Convert both reassembled tracks to PCM
///
/// The tracks must already be aligned; a length mismatch here means the
/// reassembly step was skipped.
pub fn postprocess_tracks(vocals: &[f32], accompaniment: &[f32]) -> Result<(Vec<i16>, Vec<i16>)> {
    if vocals.len() != accompaniment.len() {
        return Err(AppError::PostProcess(format!(
            "Track length mismatch: vocals={} accompaniment={}",
            vocals.len(),
            accompaniment.len()
        )));
    }
    if vocals.is_empty() {
        return Err(AppError::PostProcess("Tracks are empty".to_string()));
    }

    Ok((quantize_pcm16(vocals), quantize_pcm16(accompaniment)))
}
