use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Failed to decode audio: {0}")]
    Decode(String),

    #[error("Separation model returned unexpected stems: {0}")]
    EstimateShape(String),

    #[error("Post-processing failed: {0}")]
    PostProcess(String),

    #[error("Failed to encode output: {0}")]
    Encode(String),

    #[error("Audio error: {0}")]
    Audio(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Upload rejected: {0}")]
    Upload(String),

    #[error("Notification failed: {0}")]
    Notification(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AppError {
    /// Short machine-friendly label, stored alongside failed separations
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Decode(_) => "decode",
            AppError::EstimateShape(_) => "estimate_shape",
            AppError::PostProcess(_) => "post_process",
            AppError::Encode(_) => "encode",
            AppError::Audio(_) => "audio",
            AppError::Model(_) => "model",
            AppError::Upload(_) => "upload",
            AppError::Notification(_) => "notification",
            AppError::Config(_) => "config",
            AppError::NotFound(_) => "not_found",
            AppError::InvalidState(_) => "invalid_state",
            AppError::Database(_) => "database",
            AppError::Io(_) => "io",
            AppError::Http(_) => "http",
            AppError::Json(_) => "json",
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
