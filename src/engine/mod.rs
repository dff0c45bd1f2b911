pub mod config;
pub mod merger;
pub mod onnxruntime;
pub mod pipeline;
pub mod stft;

use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

pub use config::{AccompanimentSource, DevicePreference, SeparationConfig};
pub use merger::StemAssembler;
pub use onnxruntime::OnnxSeparator;
pub use pipeline::{BatchEntry, SeparatedPaths, SeparationPipeline};

/// Stem carrying the singing voice
pub const STEM_VOCALS: &str = "vocals";
/// Preferred name for the non-vocal remainder
pub const STEM_ACCOMPANIMENT: &str = "accompaniment";
/// Alternative name for the non-vocal remainder
pub const STEM_OTHER: &str = "other";

/// Compute device the model runs on, fixed for the lifetime of a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    Cpu,
    Cuda,
}

impl Device {
    pub fn display_name(&self) -> &'static str {
        match self {
            Device::Cpu => "CPU",
            Device::Cuda => "CUDA",
        }
    }
}

/// Resolve a configured preference into a concrete device
///
/// `accelerator_available` is only consulted for [`DevicePreference::Auto`].
/// An explicit `Cuda` request is honored as-is; the backend reports the
/// failure if the provider cannot be registered.
pub fn resolve_device(
    preference: DevicePreference,
    accelerator_available: impl FnOnce() -> bool,
) -> Device {
    let device = match preference {
        DevicePreference::Cpu => Device::Cpu,
        DevicePreference::Cuda => Device::Cuda,
        DevicePreference::Auto => {
            if accelerator_available() {
                Device::Cuda
            } else {
                Device::Cpu
            }
        }
    };
    info!("Resolved device preference {:?} to {}", preference, device.display_name());
    device
}

/// Model output for one chunk: stem name to samples
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeparationEstimate {
    stems: BTreeMap<String, Vec<f32>>,
}

impl SeparationEstimate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stem(mut self, name: impl Into<String>, samples: Vec<f32>) -> Self {
        self.insert(name, samples);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, samples: Vec<f32>) {
        self.stems.insert(name.into(), samples);
    }

    pub fn get(&self, name: &str) -> Option<&[f32]> {
        self.stems.get(name).map(Vec::as_slice)
    }

    pub fn stem_names(&self) -> impl Iterator<Item = &str> {
        self.stems.keys().map(String::as_str)
    }

    pub fn vocals(&self) -> Option<&[f32]> {
        self.get(STEM_VOCALS)
    }

    /// The non-vocal stem, "accompaniment" first, then "other"
    pub fn accompaniment(&self) -> Option<&[f32]> {
        self.get(STEM_ACCOMPANIMENT).or_else(|| self.get(STEM_OTHER))
    }

    /// Split into (vocals, accompaniment), failing with
    /// [`AppError::EstimateShape`] when either is missing
    pub fn into_pair(mut self) -> Result<(Vec<f32>, Vec<f32>)> {
        let names = self.stem_names().collect::<Vec<_>>().join(", ");

        let vocals = self.stems.remove(STEM_VOCALS).ok_or_else(|| {
            AppError::EstimateShape(format!("missing '{}' stem (got: [{}])", STEM_VOCALS, names))
        })?;
        let accompaniment = self
            .stems
            .remove(STEM_ACCOMPANIMENT)
            .or_else(|| self.stems.remove(STEM_OTHER))
            .ok_or_else(|| {
                AppError::EstimateShape(format!(
                    "missing '{}' or '{}' stem (got: [{}])",
                    STEM_ACCOMPANIMENT, STEM_OTHER, names
                ))
            })?;

        Ok((vocals, accompaniment))
    }
}

/// A pretrained source-separation model
///
/// Implementations receive one chunk of mono samples and return an estimate
/// whose stems have the chunk's length. Calls may come from several threads;
/// a backend whose session is not reentrant must serialize internally.
pub trait Separator: Send + Sync {
    fn separate(&self, samples: &[f32], sample_rate: u32) -> Result<SeparationEstimate>;
}

impl<S: Separator + ?Sized> Separator for Box<S> {
    fn separate(&self, samples: &[f32], sample_rate: u32) -> Result<SeparationEstimate> {
        (**self).separate(samples, sample_rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accompaniment_falls_back_to_other() {
        let estimate = SeparationEstimate::new()
            .with_stem(STEM_VOCALS, vec![0.1])
            .with_stem(STEM_OTHER, vec![0.2]);
        assert_eq!(estimate.accompaniment(), Some(&[0.2f32][..]));

        let (vocals, accompaniment) = estimate.into_pair().unwrap();
        assert_eq!(vocals, vec![0.1]);
        assert_eq!(accompaniment, vec![0.2]);
    }

    #[test]
    fn test_accompaniment_preferred_over_other() {
        let estimate = SeparationEstimate::new()
            .with_stem(STEM_VOCALS, vec![0.1])
            .with_stem(STEM_OTHER, vec![0.2])
            .with_stem(STEM_ACCOMPANIMENT, vec![0.3]);
        let (_, accompaniment) = estimate.into_pair().unwrap();
        assert_eq!(accompaniment, vec![0.3]);
    }

    #[test]
    fn test_missing_non_vocal_stem_is_shape_error() {
        let estimate = SeparationEstimate::new()
            .with_stem(STEM_VOCALS, vec![0.1])
            .with_stem("drums", vec![0.2]);
        let err = estimate.into_pair().unwrap_err();
        assert!(matches!(err, AppError::EstimateShape(ref msg) if msg.contains("drums")));
    }

    #[test]
    fn test_missing_vocals_is_shape_error() {
        let estimate = SeparationEstimate::new().with_stem(STEM_ACCOMPANIMENT, vec![0.1]);
        assert!(matches!(estimate.into_pair(), Err(AppError::EstimateShape(_))));
    }

    #[test]
    fn test_resolve_device() {
        assert_eq!(resolve_device(DevicePreference::Auto, || true), Device::Cuda);
        assert_eq!(resolve_device(DevicePreference::Auto, || false), Device::Cpu);
        assert_eq!(
            resolve_device(DevicePreference::Cpu, || panic!("probe must not run")),
            Device::Cpu
        );
        assert_eq!(resolve_device(DevicePreference::Cuda, || false), Device::Cuda);
    }
}
