use crate::config::AppConfig;
use crate::error::Result;
use crate::storage::{self, Database, SeparationRecord, SeparationStatus};
use clap::Args;

/// List recent separations
#[derive(Args, Debug)]
pub struct HistoryCommand {
    /// Number of entries to show
    #[arg(short = 'n', long, default_value_t = 20)]
    pub limit: usize,
}

impl HistoryCommand {
    pub async fn run(&self, config: &AppConfig, json: bool) -> Result<()> {
        let db = Database::open(&config.database_path)?;
        let records = db.with_conn(|conn| storage::list_separations(conn, self.limit))?;

        if json {
            println!("{}", serde_json::to_string_pretty(&records)?);
        } else if records.is_empty() {
            println!("No separations yet");
        } else {
            for record in &records {
                println!("{}", render_line(record));
            }
        }
        Ok(())
    }
}

fn render_line(record: &SeparationRecord) -> String {
    match record.status {
        SeparationStatus::Success => format!(
            "{}  ok      {} -> {}, {}",
            record.created_at,
            record.original,
            record.voice_path.as_deref().unwrap_or("-"),
            record.music_path.as_deref().unwrap_or("-")
        ),
        SeparationStatus::Failed => format!(
            "{}  failed  {}: {}",
            record.created_at,
            record.original,
            record.error.as_deref().unwrap_or("unknown error")
        ),
    }
}
