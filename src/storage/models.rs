use serde::{Deserialize, Serialize};

/// Counter tracking every session ever started
pub const COUNTER_TOTAL_VISITS: &str = "total_visits";
/// Counter tracking sessions currently open
pub const COUNTER_ACTIVE_SESSIONS: &str = "active_sessions";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeparationStatus {
    Success,
    Failed,
}

impl SeparationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SeparationStatus::Success => "success",
            SeparationStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "success" => SeparationStatus::Success,
            _ => SeparationStatus::Failed,
        }
    }
}

/// One processed file, as stored in the history
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeparationRecord {
    pub id: String,
    pub created_at: String,
    pub session_id: String,
    pub original: String,
    pub voice_path: Option<String>,
    pub music_path: Option<String>,
    pub status: SeparationStatus,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitStats {
    pub total_visits: i64,
    pub active_sessions: i64,
}
