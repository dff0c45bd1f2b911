use crate::error::Result;
use parking_lot::Mutex;
use rusqlite::Connection;
use std::path::Path;
use tracing::info;

/// SQLite handle shared by the sessions of one process
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) the database file and run migrations
    pub fn open(path: &Path) -> Result<Self> {
        info!("Initializing database at {:?}", path);

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// Throwaway database, nothing survives the process
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        // Run migrations
        conn.execute_batch(include_str!("../../migrations/001_init.sql"))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn.lock();
        f(&conn)
    }

    pub fn with_conn_mut<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T>,
    {
        let mut conn = self.conn.lock();
        f(&mut conn)
    }
}
