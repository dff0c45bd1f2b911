use crate::config::AppConfig;
use crate::error::Result;
use crate::storage::{self, format_count, Database, VisitStats};
use clap::Args;

/// Show the visit counters
#[derive(Args, Debug, Default)]
pub struct StatsCommand {}

impl StatsCommand {
    pub async fn run(&self, config: &AppConfig, json: bool) -> Result<()> {
        let db = Database::open(&config.database_path)?;
        let stats = db.with_conn(storage::get_visit_stats)?;
        println!("{}", render(&stats, json)?);
        Ok(())
    }
}

fn render(stats: &VisitStats, json: bool) -> Result<String> {
    if json {
        return Ok(serde_json::to_string_pretty(stats)?);
    }
    Ok(format!(
        "Total visits: {}\nActive sessions: {}",
        format_count(stats.total_visits),
        format_count(stats.active_sessions)
    ))
}
