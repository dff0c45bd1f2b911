//! ONNX Runtime backend for spectral source separation
//!
//! Model contract:
//! - input `magnitude`: f32 `[1, frames, bins]` mixture magnitude spectrogram
//! - outputs named after stems (`vocals`, `accompaniment` and/or `other`):
//!   f32 `[1, frames, bins]` magnitude estimates
//!
//! Estimates are turned into ratio masks over the complex mixture spectrum,
//! so the stems sum back to the mixture.

use crate::audio::resample;
use crate::engine::config::SeparationConfig;
use crate::engine::stft::Stft;
use crate::engine::{
    resolve_device, Device, SeparationEstimate, Separator, STEM_ACCOMPANIMENT, STEM_OTHER,
    STEM_VOCALS,
};
use crate::error::{AppError, Result};
use ort::execution_providers::{CPUExecutionProvider, CUDAExecutionProvider, ExecutionProvider};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Tensor;
use ndarray::Array2;
use parking_lot::Mutex;
use rustfft::num_complex::Complex;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Name of the model's single input
const MODEL_INPUT: &str = "magnitude";

/// Stem outputs looked up on the model, in this order
const MODEL_OUTPUTS: [&str; 3] = [STEM_VOCALS, STEM_ACCOMPANIMENT, STEM_OTHER];

/// Keeps the mask denominator away from zero in silent bins
const MASK_EPS: f32 = 1e-8;

/// Probe the runtime for a usable CUDA provider
pub fn cuda_available() -> bool {
    CUDAExecutionProvider::default().is_available().unwrap_or(false)
}

fn ensure_model_exists(model_path: &Path) -> Result<()> {
    if model_path.exists() {
        Ok(())
    } else {
        Err(AppError::NotFound(format!(
            "Separation model not found: {}",
            model_path.display()
        )))
    }
}

/// Separator backed by an ONNX magnitude-estimation model
pub struct OnnxSeparator {
    session: Mutex<Session>,
    stft: Stft,
    model_sample_rate: u32,
    device: Device,
    model_path: PathBuf,
}

impl OnnxSeparator {
    /// Load the model, choosing the device once from `config.device`
    pub fn load(model_path: &Path, config: &SeparationConfig) -> Result<Self> {
        ensure_model_exists(model_path)?;
        let device = resolve_device(config.device, cuda_available);
        Self::load_on(model_path, config, device)
    }

    /// Load the model on an already resolved device
    pub fn load_on(model_path: &Path, config: &SeparationConfig, device: Device) -> Result<Self> {
        ensure_model_exists(model_path)?;

        info!(
            "Loading separation model {:?} on {}...",
            model_path,
            device.display_name()
        );

        let builder = Session::builder()
            .map_err(|e| AppError::Model(format!("Failed to create session builder: {}", e)))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| AppError::Model(format!("Failed to set optimization level: {}", e)))?;

        let builder = match device {
            Device::Cuda => builder
                .with_execution_providers([
                    CUDAExecutionProvider::default().build(),
                    CPUExecutionProvider::default().build(),
                ])
                .map_err(|e| AppError::Model(format!("Failed to configure CUDA: {}", e)))?,
            Device::Cpu => builder
                .with_execution_providers([CPUExecutionProvider::default().build()])
                .map_err(|e| AppError::Model(format!("Failed to configure CPU provider: {}", e)))?,
        };

        let session = builder
            .commit_from_file(model_path)
            .map_err(|e| AppError::Model(format!("Failed to load separation model: {}", e)))?;

        info!("Separation model loaded");

        Ok(Self {
            session: Mutex::new(session),
            stft: Stft::new(config.n_fft, config.hop_length),
            model_sample_rate: config.model_sample_rate,
            device,
            model_path: model_path.to_path_buf(),
        })
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    /// Run the model on a magnitude spectrogram, returning each stem's
    /// flattened `[frames, bins]` estimate
    fn run_model(&self, magnitude: Vec<f32>, frames: usize, bins: usize) -> Result<Vec<(String, Vec<f32>)>> {
        let input = Tensor::from_array(([1usize, frames, bins], magnitude))
            .map_err(|e| AppError::Model(format!("Failed to create magnitude tensor: {}", e)))?;

        let mut session = self.session.lock();
        let outputs = session
            .run(ort::inputs![MODEL_INPUT => input])
            .map_err(|e| AppError::Model(format!("Separation inference failed: {}", e)))?;

        let mut estimates = Vec::new();
        for name in MODEL_OUTPUTS {
            let Some(value) = outputs.get(name) else {
                continue;
            };

            let (shape, data) = value
                .try_extract_tensor::<f32>()
                .map_err(|e| AppError::EstimateShape(format!("Stem '{}' is not f32: {}", name, e)))?;

            if data.len() != frames * bins {
                return Err(AppError::EstimateShape(format!(
                    "Stem '{}' has shape {:?}, expected [1, {}, {}]",
                    name, shape, frames, bins
                )));
            }

            estimates.push((name.to_string(), data.to_vec()));
        }

        debug!(
            "Model produced stems: {:?}",
            estimates.iter().map(|(n, _)| n.as_str()).collect::<Vec<_>>()
        );
        Ok(estimates)
    }
}

impl Separator for OnnxSeparator {
    fn separate(&self, samples: &[f32], sample_rate: u32) -> Result<SeparationEstimate> {
        let model_input = resample(samples, sample_rate, self.model_sample_rate)?;

        let spectrum = self.stft.forward(&model_input);
        let (frames, bins) = spectrum.dim();
        let magnitude: Vec<f32> = spectrum.iter().map(|c| c.norm()).collect();

        debug!(
            "Chunk of {} samples -> {} frames x {} bins",
            samples.len(),
            frames,
            bins
        );

        let raw = self.run_model(magnitude, frames, bins)?;

        reconstruct_stems(
            &self.stft,
            &spectrum,
            raw,
            model_input.len(),
            self.model_sample_rate,
            sample_rate,
            samples.len(),
        )
    }
}

/// Apply the estimates as ratio masks over the mixture spectrum and bring
/// each stem back to `sample_rate`, exactly `output_len` samples long
///
/// Negative estimates count as silence, so the masks of all stems sum to at
/// most one in every bin.
fn reconstruct_stems(
    stft: &Stft,
    spectrum: &Array2<Complex<f32>>,
    raw: Vec<(String, Vec<f32>)>,
    model_len: usize,
    model_sample_rate: u32,
    sample_rate: u32,
    output_len: usize,
) -> Result<SeparationEstimate> {
    let mut denominator = vec![MASK_EPS; spectrum.len()];
    for (_, stem) in &raw {
        for (d, e) in denominator.iter_mut().zip(stem) {
            *d += e.max(0.0);
        }
    }

    let mut estimate = SeparationEstimate::new();
    for (name, stem) in raw {
        let mut masked = spectrum.clone();
        for ((value, e), d) in masked.iter_mut().zip(&stem).zip(&denominator) {
            *value *= e.max(0.0) / d;
        }

        let audio = stft.inverse(&masked, model_len);
        let mut audio = resample(&audio, model_sample_rate, sample_rate)?;
        audio.resize(output_len, 0.0);
        estimate.insert(name, audio);
    }

    Ok(estimate)
}
