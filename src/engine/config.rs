use serde::{Deserialize, Serialize};

use crate::audio::ChunkConfig;

/// Which compute device the separation model should run on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DevicePreference {
    /// CUDA when the runtime reports it, CPU otherwise
    #[default]
    Auto,
    Cpu,
    Cuda,
}

impl std::str::FromStr for DevicePreference {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "cpu" => Ok(Self::Cpu),
            "cuda" | "gpu" => Ok(Self::Cuda),
            other => Err(format!("unknown device '{}', expected auto, cpu or cuda", other)),
        }
    }
}

/// How the non-vocal track is derived from a chunk's estimate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AccompanimentSource {
    /// Use the model's "accompaniment" (or "other") stem
    #[default]
    StemOutput,
    /// Original chunk minus the vocal estimate
    Subtraction,
}

impl std::str::FromStr for AccompanimentSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "stem_output" | "stem" => Ok(Self::StemOutput),
            "subtraction" | "subtract" => Ok(Self::Subtraction),
            other => Err(format!(
                "unknown accompaniment source '{}', expected stem-output or subtraction",
                other
            )),
        }
    }
}

/// Lowest model sample rate accepted from configuration
const MIN_MODEL_SAMPLE_RATE: u32 = 8000;

/// Configuration for the separation pipeline and its model backend
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SeparationConfig {
    /// Window length fed to the model, in seconds of input audio
    pub chunk_seconds: f32,
    /// Sample rate the model was trained at
    pub model_sample_rate: u32,
    /// STFT frame size
    pub n_fft: usize,
    /// STFT hop size
    pub hop_length: usize,
    pub device: DevicePreference,
    pub accompaniment: AccompanimentSource,
}

impl Default for SeparationConfig {
    fn default() -> Self {
        Self {
            chunk_seconds: 10.0,
            model_sample_rate: 44100,
            n_fft: 4096,
            hop_length: 1024,
            device: DevicePreference::Auto,
            accompaniment: AccompanimentSource::StemOutput,
        }
    }
}

impl SeparationConfig {
    /// Set the chunk duration (0.5s - 600s)
    pub fn with_chunk_seconds(mut self, chunk_seconds: f32) -> Self {
        self.chunk_seconds = if chunk_seconds.is_finite() {
            chunk_seconds.clamp(0.5, 600.0)
        } else {
            10.0
        };
        self
    }

    pub fn with_device(mut self, device: DevicePreference) -> Self {
        self.device = device;
        self
    }

    pub fn with_accompaniment(mut self, accompaniment: AccompanimentSource) -> Self {
        self.accompaniment = accompaniment;
        self
    }

    /// Set STFT parameters; hop is kept within (0, n_fft]
    pub fn with_stft(mut self, n_fft: usize, hop_length: usize) -> Self {
        self.n_fft = n_fft.max(16);
        self.hop_length = hop_length.clamp(1, self.n_fft);
        self
    }

    /// Re-apply the builder limits to values that bypassed them, such as a
    /// deserialized configuration file
    pub fn normalized(self) -> Self {
        let chunk_seconds = self.chunk_seconds;
        let (n_fft, hop_length) = (self.n_fft, self.hop_length);
        let mut config = self.with_chunk_seconds(chunk_seconds).with_stft(n_fft, hop_length);
        config.model_sample_rate = config.model_sample_rate.max(MIN_MODEL_SAMPLE_RATE);
        config
    }

    pub fn chunk_config(&self) -> ChunkConfig {
        ChunkConfig::new(self.chunk_seconds)
    }
}
