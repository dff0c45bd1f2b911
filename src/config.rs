use crate::engine::SeparationConfig;
use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Largest upload accepted by the intake (5 MB)
pub const MAX_UPLOAD_BYTES: u64 = 5 * 1024 * 1024;

/// Telegram bot credentials for usage notifications
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    pub bot_token: Option<String>,
    pub chat_id: Option<String>,
}

impl TelegramConfig {
    pub fn is_configured(&self) -> bool {
        matches!((&self.bot_token, &self.chat_id), (Some(t), Some(c)) if !t.is_empty() && !c.is_empty())
    }
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Where accepted uploads are copied
    pub upload_dir: PathBuf,
    /// Where separated tracks are written
    pub output_dir: PathBuf,
    pub database_path: PathBuf,
    /// Separation model; discovered next to the executable when unset
    pub model_path: Option<PathBuf>,
    pub max_upload_bytes: u64,
    /// Optional log file, in addition to the console
    pub log_file: Option<PathBuf>,
    pub telegram: TelegramConfig,
    pub separation: SeparationConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from("uploads"),
            output_dir: PathBuf::from("temp_audio"),
            database_path: PathBuf::from("voxsplit.db"),
            model_path: None,
            max_upload_bytes: MAX_UPLOAD_BYTES,
            log_file: None,
            telegram: TelegramConfig::default(),
            separation: SeparationConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load from an optional JSON file, then apply environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => {
                info!("Loading configuration from {:?}", path);
                let text = std::fs::read_to_string(path).map_err(|e| {
                    AppError::Config(format!("Cannot read {}: {}", path.display(), e))
                })?;
                Self::from_json(&text)?
            }
            None => Self::default(),
        };

        Ok(config.with_env_overrides(|key| std::env::var(key).ok()))
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let mut config: Self = serde_json::from_str(text)
            .map_err(|e| AppError::Config(format!("Invalid configuration: {}", e)))?;
        config.separation = config.separation.normalized();
        Ok(config)
    }

    /// Apply overrides from `lookup` (the process environment in production)
    pub fn with_env_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = non_empty("VOXSPLIT_MODEL") {
            self.model_path = Some(PathBuf::from(v));
        }
        if let Some(v) = non_empty("VOXSPLIT_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(v);
        }
        if let Some(v) = non_empty("VOXSPLIT_UPLOAD_DIR") {
            self.upload_dir = PathBuf::from(v);
        }
        if let Some(v) = non_empty("VOXSPLIT_DB") {
            self.database_path = PathBuf::from(v);
        }
        if let Some(v) = non_empty("TELEGRAM_BOT_TOKEN") {
            self.telegram.bot_token = Some(v);
        }
        if let Some(v) = non_empty("TELEGRAM_CHAT_ID") {
            self.telegram.chat_id = Some(v);
        }

        debug!("Effective configuration: {:?}", self.redacted());
        self
    }

    /// Copy with secrets masked, for logging
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.telegram.bot_token.is_some() {
            copy.telegram.bot_token = Some("***".to_string());
        }
        copy
    }

    /// Configured model path, or the first `model/separator.onnx` found
    pub fn resolve_model_path(&self) -> Option<PathBuf> {
        self.model_path.clone().or_else(find_model_path)
    }
}

/// Look for `model/separator.onnx` near the executable, then in the
/// current directory
fn find_model_path() -> Option<PathBuf> {
    const MODEL_FILE: &str = "separator.onnx";

    if let Ok(exe_path) = std::env::current_exe() {
        // In development: target/debug/voxsplit, model at project_root/model
        let mut path = exe_path.clone();
        for _ in 0..3 {
            path.pop();
        }
        let candidate = path.join("model").join(MODEL_FILE);
        if candidate.exists() {
            return Some(candidate);
        }

        // Installed: model next to the binary
        if let Some(dir) = exe_path.parent() {
            let candidate = dir.join("model").join(MODEL_FILE);
            if candidate.exists() {
                return Some(candidate);
            }
        }
    }

    let current = PathBuf::from("model").join(MODEL_FILE);
    if current.exists() {
        return Some(current);
    }

    None
}
