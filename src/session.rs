//! Per-session state owned by the hosting layer
//!
//! A session counts as a visit when it starts and releases its active slot
//! when it ends. Everything a user uploaded or produced during the session is
//! tracked here so cleanup knows what to delete.

use crate::engine::BatchEntry;
use crate::error::Result;
use crate::storage::{
    self, Database, SeparationRecord, SeparationStatus, COUNTER_ACTIVE_SESSIONS,
    COUNTER_TOTAL_VISITS,
};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub struct SessionContext {
    id: Uuid,
    started_at: DateTime<Utc>,
    db: Arc<Database>,
    uploads: Vec<PathBuf>,
    results: Vec<BatchEntry>,
    processed: bool,
}

impl SessionContext {
    /// Start a session and count the visit
    pub fn start(db: Arc<Database>) -> Result<Self> {
        let id = Uuid::new_v4();
        let visits = db.with_conn(|conn| {
            storage::increment_counter(conn, COUNTER_ACTIVE_SESSIONS)?;
            storage::increment_counter(conn, COUNTER_TOTAL_VISITS)
        })?;

        info!("Session {} started (visit #{})", id, visits);

        Ok(Self {
            id,
            started_at: Utc::now(),
            db,
            uploads: Vec::new(),
            results: Vec::new(),
            processed: false,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn uploads(&self) -> &[PathBuf] {
        &self.uploads
    }

    pub fn results(&self) -> &[BatchEntry] {
        &self.results
    }

    pub fn is_processed(&self) -> bool {
        self.processed
    }

    /// Track a file or upload slot directory to delete on cleanup
    pub fn attach_upload(&mut self, path: PathBuf) {
        debug!("Session {}: upload slot {:?}", self.id, path);
        self.uploads.push(path);
    }

    /// Store the batch results, mark the session processed and append them
    /// to the history
    pub fn record_results(&mut self, results: Vec<BatchEntry>) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let session_id = self.id.to_string();
        let records: Vec<SeparationRecord> = results
            .iter()
            .map(|entry| SeparationRecord {
                id: Uuid::new_v4().to_string(),
                created_at: now.clone(),
                session_id: session_id.clone(),
                original: entry.original.display().to_string(),
                voice_path: entry.voice.as_ref().map(|p| p.display().to_string()),
                music_path: entry.music.as_ref().map(|p| p.display().to_string()),
                status: if entry.is_success() {
                    SeparationStatus::Success
                } else {
                    SeparationStatus::Failed
                },
                error: entry.error.clone(),
            })
            .collect();

        self.db
            .with_conn_mut(|conn| storage::insert_separations(conn, &records))?;

        self.results = results;
        self.processed = true;
        Ok(())
    }

    /// Start over: drop the outputs of the previous run, keep the uploads
    pub fn reset(&mut self) {
        for entry in std::mem::take(&mut self.results) {
            for path in [entry.voice, entry.music].into_iter().flatten() {
                remove_quietly(&path);
            }
        }
        self.processed = false;
        info!("Session {} state cleared for start over", self.id);
    }

    /// Delete attached uploads and, unless `keep_outputs`, the separated tracks
    pub fn cleanup(&mut self, keep_outputs: bool) {
        for path in std::mem::take(&mut self.uploads) {
            remove_quietly(&path);
        }

        if keep_outputs {
            self.processed = false;
            return;
        }
        self.reset();
    }

    /// End the session, releasing its active slot
    pub fn end(self) -> Result<()> {
        let active = self
            .db
            .with_conn(|conn| storage::decrement_counter(conn, COUNTER_ACTIVE_SESSIONS))?;
        info!(
            "Session {} ended after {}s ({} active)",
            self.id,
            (Utc::now() - self.started_at).num_seconds(),
            active
        );
        Ok(())
    }
}

fn remove_quietly(path: &Path) {
    if !path.exists() {
        return;
    }
    let removed = if path.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    };
    match removed {
        Ok(()) => debug!("Removed {:?}", path),
        Err(e) => warn!("Error removing {:?}: {}", path, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::get_visit_stats;

    fn entry(dir: &Path, name: &str, ok: bool) -> BatchEntry {
        let voice = dir.join(format!("{}_voice.wav", name));
        let music = dir.join(format!("{}_music.wav", name));
        if ok {
            std::fs::write(&voice, b"v").unwrap();
            std::fs::write(&music, b"m").unwrap();
        }
        BatchEntry {
            original: dir.join(format!("{}.mp3", name)),
            voice: ok.then_some(voice),
            music: ok.then_some(music),
            error: (!ok).then(|| "Failed to decode audio: bad".to_string()),
        }
    }

    #[test]
    fn test_start_and_end_update_counters() {
        let db = Arc::new(Database::open_in_memory().unwrap());

        let first = SessionContext::start(db.clone()).unwrap();
        let second = SessionContext::start(db.clone()).unwrap();
        assert_ne!(first.id(), second.id());

        let stats = db.with_conn(get_visit_stats).unwrap();
        assert_eq!(stats.total_visits, 2);
        assert_eq!(stats.active_sessions, 2);

        first.end().unwrap();
        second.end().unwrap();
        let stats = db.with_conn(get_visit_stats).unwrap();
        assert_eq!(stats.total_visits, 2);
        assert_eq!(stats.active_sessions, 0);
    }

    #[test]
    fn test_record_results_writes_history() {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(Database::open_in_memory().unwrap());
        let mut session = SessionContext::start(db.clone()).unwrap();

        session
            .record_results(vec![entry(dir.path(), "a", true), entry(dir.path(), "b", false)])
            .unwrap();
        assert!(session.is_processed());
        assert_eq!(session.results().len(), 2);

        let history = db.with_conn(|conn| storage::list_separations(conn, 10)).unwrap();
        assert_eq!(history.len(), 2);
        assert!(history.iter().all(|r| r.session_id == session.id().to_string()));
        assert_eq!(
            history.iter().filter(|r| r.status == SeparationStatus::Failed).count(),
            1
        );
    }

    #[test]
    fn test_cleanup_removes_uploads_and_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(Database::open_in_memory().unwrap());
        let mut session = SessionContext::start(db).unwrap();

        let upload = dir.path().join("song.mp3");
        std::fs::write(&upload, b"x").unwrap();
        session.attach_upload(upload.clone());
        session.record_results(vec![entry(dir.path(), "song", true)]).unwrap();

        session.cleanup(false);
        assert!(!upload.exists());
        assert!(!dir.path().join("song_voice.wav").exists());
        assert!(!dir.path().join("song_music.wav").exists());
        assert!(!session.is_processed());
        assert!(session.uploads().is_empty());
    }

    #[test]
    fn test_cleanup_removes_upload_slot_directories() {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(Database::open_in_memory().unwrap());
        let mut session = SessionContext::start(db).unwrap();

        let slot = dir.path().join("uploads").join("slot");
        std::fs::create_dir_all(&slot).unwrap();
        std::fs::write(slot.join("song.mp3"), b"x").unwrap();
        session.attach_upload(slot.clone());

        session.cleanup(true);
        assert!(!slot.exists());
        assert!(dir.path().join("uploads").exists());
    }

    #[test]
    fn test_cleanup_can_keep_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(Database::open_in_memory().unwrap());
        let mut session = SessionContext::start(db).unwrap();

        let upload = dir.path().join("song.mp3");
        std::fs::write(&upload, b"x").unwrap();
        session.attach_upload(upload.clone());
        session.record_results(vec![entry(dir.path(), "song", true)]).unwrap();

        session.cleanup(true);
        assert!(!upload.exists());
        assert!(dir.path().join("song_voice.wav").exists());
        assert!(dir.path().join("song_music.wav").exists());
    }
}
