//! Database layer for the opsgraph data access layer.

pub mod comments;
pub mod milestones;
pub mod projects;
pub mod sprints;
pub mod stories;
pub mod tasks;
pub mod time_entries;
pub mod timeline;

use crate::config::{DEFAULT_TIMELINE_PAGE_SIZE, StoreConfig};
use crate::watch::WatchRegistry;
use anyhow::Result;
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};

mod embedded {
    use refinery::embed_migrations;
    embed_migrations!("migrations");
}

/// Database handle wrapping a SQLite connection plus the watcher registry
/// that fans mutations out to live queries.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
    watchers: Arc<WatchRegistry>,
    timeline_page_size: usize,
}

impl Database {
    /// Open or create the database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_config(path, &StoreConfig::default())
    }

    /// Open or create the database at the given path with explicit config.
    pub fn open_with_config<P: AsRef<Path>>(path: P, config: &StoreConfig) -> Result<Self> {
        let conn = Connection::open(path)?;

        // Enable WAL mode for concurrent access
        conn.execute_batch(&format!(
            "PRAGMA journal_mode=WAL;
             PRAGMA foreign_keys=ON;
             PRAGMA busy_timeout={};",
            config.busy_timeout_ms
        ))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
            watchers: Arc::new(WatchRegistry::new()),
            timeline_page_size: config.timeline_page_size,
        };

        db.run_migrations()?;

        Ok(db)
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;

        conn.execute_batch("PRAGMA foreign_keys=ON;")?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
            watchers: Arc::new(WatchRegistry::new()),
            timeline_page_size: DEFAULT_TIMELINE_PAGE_SIZE,
        };

        db.run_migrations()?;

        Ok(db)
    }

    /// Run database migrations.
    fn run_migrations(&self) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        embedded::migrations::runner().run(&mut *conn)?;
        Ok(())
    }

    /// Execute a function with exclusive access to the connection.
    pub(crate) fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn.lock().unwrap();
        f(&conn)
    }

    /// Execute a function with mutable access to the connection (for
    /// transactions).
    pub(crate) fn with_conn_mut<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T>,
    {
        let mut conn = self.conn.lock().unwrap();
        f(&mut conn)
    }

    pub(crate) fn watchers(&self) -> &Arc<WatchRegistry> {
        &self.watchers
    }

    pub(crate) fn timeline_page_size(&self) -> usize {
        self.timeline_page_size
    }
}

/// Get the current timestamp in milliseconds.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Percentage of `completed` over `total`, rounded to the nearest integer.
/// Zero when there is nothing to count.
pub(crate) fn completion_percentage(completed: i64, total: i64) -> i64 {
    if total <= 0 {
        return 0;
    }
    ((completed as f64 / total as f64) * 100.0).round() as i64
}
