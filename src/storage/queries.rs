use crate::error::Result;
use crate::storage::models::{
    SeparationRecord, SeparationStatus, VisitStats, COUNTER_ACTIVE_SESSIONS, COUNTER_TOTAL_VISITS,
};
use rusqlite::{params, Connection, OptionalExtension};

// Counter queries

pub fn increment_counter(conn: &Connection, name: &str) -> Result<i64> {
    conn.execute(
        r#"
        INSERT INTO counters (name, value) VALUES (?1, 1)
        ON CONFLICT(name) DO UPDATE SET value = value + 1
        "#,
        params![name],
    )?;
    get_counter(conn, name)
}

/// Decrement, never going below zero
pub fn decrement_counter(conn: &Connection, name: &str) -> Result<i64> {
    conn.execute(
        "UPDATE counters SET value = MAX(value - 1, 0) WHERE name = ?1",
        params![name],
    )?;
    get_counter(conn, name)
}

pub fn get_counter(conn: &Connection, name: &str) -> Result<i64> {
    let value = conn
        .query_row(
            "SELECT value FROM counters WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )
        .optional()?;
    Ok(value.unwrap_or(0))
}

pub fn get_visit_stats(conn: &Connection) -> Result<VisitStats> {
    Ok(VisitStats {
        total_visits: get_counter(conn, COUNTER_TOTAL_VISITS)?,
        active_sessions: get_counter(conn, COUNTER_ACTIVE_SESSIONS)?,
    })
}

/// Format a count with thousands separators ("1,234,567")
pub fn format_count(value: i64) -> String {
    let digits = value.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);

    if value < 0 {
        out.push('-');
    }
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

// Separation history queries

pub fn insert_separation(conn: &Connection, r: &SeparationRecord) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO separations (id, created_at, session_id, original, voice_path, music_path, status, error)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
        params![
            r.id,
            r.created_at,
            r.session_id,
            r.original,
            r.voice_path,
            r.music_path,
            r.status.as_str(),
            r.error
        ],
    )?;
    Ok(())
}

/// Insert a whole batch atomically
pub fn insert_separations(conn: &mut Connection, records: &[SeparationRecord]) -> Result<()> {
    let tx = conn.transaction()?;
    for record in records {
        insert_separation(&tx, record)?;
    }
    tx.commit()?;
    Ok(())
}

/// Most recent separations first
pub fn list_separations(conn: &Connection, limit: usize) -> Result<Vec<SeparationRecord>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT id, created_at, session_id, original, voice_path, music_path, status, error
        FROM separations
        ORDER BY created_at DESC, rowid DESC
        LIMIT ?1
        "#,
    )?;

    let records = stmt
        .query_map([limit as i64], |row| {
            let status: String = row.get(6)?;
            Ok(SeparationRecord {
                id: row.get(0)?,
                created_at: row.get(1)?,
                session_id: row.get(2)?,
                original: row.get(3)?,
                voice_path: row.get(4)?,
                music_path: row.get(5)?,
                status: SeparationStatus::parse(&status),
                error: row.get(7)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(records)
}
