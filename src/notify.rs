//! Usage notification: the original upload is forwarded to a Telegram chat

use crate::config::TelegramConfig;
use crate::error::{AppError, Result};
use reqwest::{multipart, Client};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Caption attached to every forwarded song
pub const DEFAULT_CAPTION: &str = "Separate the voices from the music in the song";

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Bot API client for the `sendAudio` method
pub struct TelegramNotifier {
    client: Client,
    bot_token: String,
    chat_id: String,
    api_base: String,
}

impl TelegramNotifier {
    /// `None` when the credentials are incomplete, which disables notification
    pub fn from_config(config: &TelegramConfig) -> Result<Option<Self>> {
        if !config.is_configured() {
            debug!("Telegram credentials missing, notifications disabled");
            return Ok(None);
        }
        let (Some(token), Some(chat_id)) = (&config.bot_token, &config.chat_id) else {
            return Ok(None);
        };
        Self::new(token.clone(), chat_id.clone()).map(Some)
    }

    pub fn new(bot_token: String, chat_id: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;

        Ok(Self {
            client,
            bot_token,
            chat_id,
            api_base: TELEGRAM_API_BASE.to_string(),
        })
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    pub fn send_audio_url(&self) -> String {
        format!(
            "{}/bot{}/sendAudio",
            self.api_base.trim_end_matches('/'),
            self.bot_token
        )
    }

    /// Post `path` as an audio message with `caption`
    ///
    /// The file is read up front so callers may delete it while the request
    /// is in flight.
    pub async fn send_audio(&self, path: &Path, caption: &str) -> Result<()> {
        let payload = AudioPayload::read(path)?;
        self.send_payload(payload, caption).await
    }

    pub async fn send_payload(&self, payload: AudioPayload, caption: &str) -> Result<()> {
        let size = payload.bytes.len();
        let form = multipart::Form::new()
            .text("chat_id", self.chat_id.clone())
            .text("caption", caption.to_string())
            .part(
                "audio",
                multipart::Part::bytes(payload.bytes).file_name(payload.file_name.clone()),
            );

        let response = self
            .client
            .post(self.send_audio_url())
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Notification(format!(
                "sendAudio returned {}: {}",
                status, body
            )));
        }

        info!("Forwarded {} ({} bytes) to Telegram", payload.file_name, size);
        Ok(())
    }

    /// Send every payload, logging failures instead of returning them
    pub async fn send_all(&self, payloads: Vec<AudioPayload>, caption: &str) {
        for payload in payloads {
            let name = payload.file_name.clone();
            if let Err(e) = self.send_payload(payload, caption).await {
                warn!("Failed to forward {} to Telegram: {}", name, e);
            }
        }
    }
}

/// File contents captured for a notification
#[derive(Debug, Clone)]
pub struct AudioPayload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl AudioPayload {
    pub fn read(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|e| {
            AppError::Notification(format!("Cannot read {}: {}", path.display(), e))
        })?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio".to_string());
        Ok(Self { file_name, bytes })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_without_credentials() {
        let config = TelegramConfig {
            bot_token: Some("123:abc".to_string()),
            chat_id: None,
        };
        assert!(TelegramNotifier::from_config(&config).unwrap().is_none());
        assert!(TelegramNotifier::from_config(&TelegramConfig::default())
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_send_audio_url() {
        let notifier = TelegramNotifier::new("123:abc".to_string(), "42".to_string()).unwrap();
        assert_eq!(
            notifier.send_audio_url(),
            "https://api.telegram.org/bot123:abc/sendAudio"
        );

        let local = notifier.with_api_base("http://127.0.0.1:9/");
        assert_eq!(local.send_audio_url(), "http://127.0.0.1:9/bot123:abc/sendAudio");
    }

    #[test]
    fn test_payload_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("song.mp3");
        std::fs::write(&path, b"ID3").unwrap();

        let payload = AudioPayload::read(&path).unwrap();
        assert_eq!(payload.file_name, "song.mp3");
        assert_eq!(payload.bytes, b"ID3");

        let err = AudioPayload::read(&dir.path().join("missing.mp3")).unwrap_err();
        assert!(matches!(err, AppError::Notification(_)));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_an_error() {
        let notifier = TelegramNotifier::new("t".to_string(), "1".to_string())
            .unwrap()
            .with_api_base("http://127.0.0.1:9");
        let payload = AudioPayload {
            file_name: "a.mp3".to_string(),
            bytes: vec![1, 2, 3],
        };
        assert!(notifier.send_payload(payload, DEFAULT_CAPTION).await.is_err());
    }
}
