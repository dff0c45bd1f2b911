use crate::config::AppConfig;
use crate::engine::{
    AccompanimentSource, BatchEntry, DevicePreference, OnnxSeparator, SeparationPipeline,
};
use crate::error::{AppError, Result};
use crate::notify::{AudioPayload, TelegramNotifier, DEFAULT_CAPTION};
use crate::session::SessionContext;
use crate::storage::Database;
use crate::upload::{accept_upload, AcceptedUpload};
use clap::Args;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Separate songs into voice and music tracks
#[derive(Args, Debug)]
pub struct SeparateCommand {
    /// Input songs (mp3 or wav)
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Directory for the separated tracks
    #[arg(short = 'o', long)]
    pub output_dir: Option<PathBuf>,

    /// Length of the windows fed to the model, in seconds
    #[arg(long)]
    pub chunk_seconds: Option<f32>,

    /// Compute device (auto, cpu, cuda)
    #[arg(long)]
    pub device: Option<DevicePreference>,

    /// How the music track is derived (stem-output, subtraction)
    #[arg(long)]
    pub accompaniment: Option<AccompanimentSource>,

    /// Do not forward the songs to Telegram
    #[arg(long)]
    pub no_notify: bool,

    /// Delete the separated tracks once the run is reported
    #[arg(long)]
    pub cleanup: bool,
}

impl SeparateCommand {
    /// Apply command-line overrides on top of the loaded configuration
    pub fn effective_config(&self, config: &AppConfig) -> AppConfig {
        let mut config = config.clone();
        if let Some(dir) = &self.output_dir {
            config.output_dir = dir.clone();
        }
        if let Some(seconds) = self.chunk_seconds {
            config.separation = config.separation.with_chunk_seconds(seconds);
        }
        if let Some(device) = self.device {
            config.separation = config.separation.with_device(device);
        }
        if let Some(accompaniment) = self.accompaniment {
            config.separation = config.separation.with_accompaniment(accompaniment);
        }
        config
    }

    /// Run one session over all files. Returns `true` when every file
    /// produced both tracks.
    pub async fn run(&self, config: &AppConfig, json: bool) -> Result<bool> {
        let config = self.effective_config(config);
        let db = Arc::new(Database::open(&config.database_path)?);
        let mut session = SessionContext::start(db)?;

        let result = self.run_session(&config, &mut session, json).await;

        // The active slot is released even when the run failed
        if let Err(e) = session.end() {
            warn!("Failed to close session: {}", e);
        }
        result
    }

    async fn run_session(
        &self,
        config: &AppConfig,
        session: &mut SessionContext,
        json: bool,
    ) -> Result<bool> {
        let intake = self.intake(config, session);

        let accepted: Vec<PathBuf> = intake
            .iter()
            .filter_map(|r| r.as_ref().ok().map(|u| u.path.clone()))
            .collect();
        let batch = if accepted.is_empty() {
            Vec::new()
        } else {
            separate_batch(config, accepted).await
        };
        let mut separated = batch.into_iter();

        // Report against the user's paths, in input order
        let mut entries = Vec::with_capacity(self.files.len());
        let mut payloads = Vec::new();
        for (file, slot) in self.files.iter().zip(&intake) {
            let entry = match slot {
                Ok(upload) => {
                    let mut entry = separated
                        .next()
                        .unwrap_or_else(|| BatchEntry::failed(file, "No result for this file"));
                    if entry.is_success() {
                        match AudioPayload::read(&upload.path) {
                            Ok(payload) => payloads.push(payload),
                            Err(e) => warn!("Skipping notification for {:?}: {}", file, e),
                        }
                    }
                    entry.original = file.clone();
                    entry
                }
                Err(message) => BatchEntry::failed(file, message.clone()),
            };
            entries.push(entry);
        }

        let all_succeeded = entries.iter().all(BatchEntry::is_success);
        print_entries(&entries, json)?;
        let recorded = session.record_results(entries);

        let notifier = if self.no_notify {
            None
        } else {
            TelegramNotifier::from_config(&config.telegram).unwrap_or_else(|e| {
                warn!("Telegram notifier unavailable: {}", e);
                None
            })
        };

        let keep_outputs = !self.cleanup;
        let notify = async {
            if let Some(notifier) = &notifier {
                notifier.send_all(payloads, DEFAULT_CAPTION).await;
            }
        };
        let cleanup = async { session.cleanup(keep_outputs) };
        tokio::join!(notify, cleanup);

        recorded?;
        Ok(all_succeeded)
    }

    /// Validate and copy every input. One slot per input; rejected files keep
    /// their error. Two inputs that would produce the same output names are
    /// not allowed in one batch.
    fn intake(
        &self,
        config: &AppConfig,
        session: &mut SessionContext,
    ) -> Vec<std::result::Result<AcceptedUpload, String>> {
        let mut stems = HashSet::new();
        let mut intake = Vec::with_capacity(self.files.len());

        for file in &self.files {
            let upload = match accept_upload(file, &config.upload_dir, config.max_upload_bytes) {
                Ok(upload) => upload,
                Err(e) => {
                    warn!("Rejected {:?}: {}", file, e);
                    intake.push(Err(e.to_string()));
                    continue;
                }
            };

            if let Some(slot) = &upload.slot {
                session.attach_upload(slot.clone());
            }

            let stem = upload
                .path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            if !stems.insert(stem.clone()) {
                warn!("Rejected {:?}: duplicate name '{}'", file, stem);
                intake.push(Err(format!(
                    "Another file named '{}' is already in this batch",
                    stem
                )));
                continue;
            }

            intake.push(Ok(upload));
        }
        intake
    }
}

/// Load the model and separate `accepted` in order. A model that cannot be
/// loaded fails every file instead of the whole run.
async fn separate_batch(config: &AppConfig, accepted: Vec<PathBuf>) -> Vec<BatchEntry> {
    let pipeline = match build_pipeline(config).await {
        Ok(pipeline) => pipeline,
        Err(e) => {
            error!("Cannot separate {} files: {}", accepted.len(), e);
            return failed_entries(&accepted, &e.to_string());
        }
    };

    let paths = accepted.clone();
    match tokio::task::spawn_blocking(move || pipeline.process_multiple_files(&paths)).await {
        Ok(entries) => entries,
        Err(e) => {
            error!("Separation task failed: {}", e);
            failed_entries(&accepted, &format!("Separation task failed: {}", e))
        }
    }
}

fn failed_entries(paths: &[PathBuf], message: &str) -> Vec<BatchEntry> {
    paths.iter().map(|p| BatchEntry::failed(p, message)).collect()
}

async fn build_pipeline(config: &AppConfig) -> Result<Arc<SeparationPipeline>> {
    let model_path = config
        .resolve_model_path()
        .ok_or_else(|| AppError::NotFound("Separation model not found (set VOXSPLIT_MODEL)".to_string()))?;
    info!("Found model at {:?}", model_path);

    let separation = config.separation.clone();
    let output_dir = config.output_dir.clone();
    let pipeline = tokio::task::spawn_blocking(move || {
        let separator = OnnxSeparator::load(&model_path, &separation)?;
        SeparationPipeline::new(Box::new(separator), separation, output_dir)
    })
    .await
    .map_err(|e| AppError::InvalidState(format!("Model loading task failed: {}", e)))??;

    Ok(Arc::new(pipeline))
}

fn print_entries(entries: &[BatchEntry], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(entries)?);
        return Ok(());
    }

    for entry in entries {
        match (&entry.voice, &entry.music) {
            (Some(voice), Some(music)) => println!(
                "✓ {}\n    voice: {}\n    music: {}",
                entry.original.display(),
                voice.display(),
                music.display()
            ),
            _ => println!(
                "✗ {}: {}",
                entry.original.display(),
                entry.error.as_deref().unwrap_or("separation failed")
            ),
        }
    }
    Ok(())
}
