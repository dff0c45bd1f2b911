//! Intake of user-provided song files

use crate::error::{AppError, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use uuid::Uuid;

/// Extensions accepted by the intake
pub const ALLOWED_EXTENSIONS: [&str; 3] = ["mp3", "wav", "mpeg"];

static RE_UNSAFE_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^A-Za-z0-9._-]+").unwrap());

/// Replace anything outside `[A-Za-z0-9._-]` and strip leading dots
pub fn sanitize_file_name(name: &str) -> String {
    let cleaned = RE_UNSAFE_CHARS.replace_all(name.trim(), "_");
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned.to_string()
    }
}

/// A file accepted by the intake
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptedUpload {
    /// File handed to the pipeline
    pub path: PathBuf,
    /// Per-upload directory created by the intake, deleted with the upload.
    /// `None` when the source already lived in the upload directory and is
    /// used in place; such a file belongs to the user and is never deleted.
    pub slot: Option<PathBuf>,
}

impl AcceptedUpload {
    pub fn is_owned(&self) -> bool {
        self.slot.is_some()
    }
}

/// Validate `source` and copy it into its own slot under `upload_dir`
///
/// The copy keeps the (sanitized) file name, so output naming follows the
/// name the user gave. Same-named uploads land in different slots.
pub fn accept_upload(source: &Path, upload_dir: &Path, max_bytes: u64) -> Result<AcceptedUpload> {
    let file_name = source
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| AppError::Upload(format!("Invalid file name: {}", source.display())))?;

    let extension = source
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();
    if !ALLOWED_EXTENSIONS.contains(&extension.as_str()) {
        return Err(AppError::Upload(format!(
            "Unsupported file type '{}', expected one of: {}",
            extension,
            ALLOWED_EXTENSIONS.join(", ")
        )));
    }

    let metadata = std::fs::metadata(source)
        .map_err(|e| AppError::Upload(format!("Cannot read {}: {}", source.display(), e)))?;
    if !metadata.is_file() {
        return Err(AppError::Upload(format!("Not a file: {}", source.display())));
    }

    let size = metadata.len();
    if size > max_bytes {
        return Err(AppError::Upload(format!(
            "File is too large. Maximum allowed size is {:.2}MB, your file is {:.2}MB",
            max_bytes as f64 / 1024.0 / 1024.0,
            size as f64 / 1024.0 / 1024.0
        )));
    }

    std::fs::create_dir_all(upload_dir)?;

    if is_inside(source, upload_dir)? {
        info!("Using {:?} in place, it is already in the upload directory", source);
        return Ok(AcceptedUpload {
            path: source.to_path_buf(),
            slot: None,
        });
    }

    let slot = upload_dir.join(Uuid::new_v4().simple().to_string());
    std::fs::create_dir(&slot)?;
    let destination = slot.join(sanitize_file_name(file_name));
    if let Err(e) = std::fs::copy(source, &destination) {
        if let Err(remove_err) = std::fs::remove_dir_all(&slot) {
            warn!("Failed to remove upload slot {:?}: {}", slot, remove_err);
        }
        return Err(e.into());
    }

    info!("Accepted upload {} ({} bytes) -> {:?}", file_name, size, destination);
    Ok(AcceptedUpload {
        path: destination,
        slot: Some(slot),
    })
}

/// Whether `path` resolves to a location under `dir`
fn is_inside(path: &Path, dir: &Path) -> Result<bool> {
    let path = path.canonicalize()?;
    let dir = dir.canonicalize()?;
    Ok(path.starts_with(dir))
}
