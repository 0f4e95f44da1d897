use crate::error::{Result, SnapError};
use crate::io::{atomic_write, remove_if_exists};
use crate::paths::DefaultPaths;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::time::Duration;

// ---------------------------------------------------------------------------
// File store
// ---------------------------------------------------------------------------

/// Snapshot files under the snapshot directory, one per host, label and
/// command.
#[derive(Debug, Clone)]
pub struct FileStore {
    paths: DefaultPaths,
}

impl FileStore {
    pub fn new(paths: DefaultPaths) -> Self {
        Self { paths }
    }

    pub fn path_for(&self, host: &str, label: &str, command: &str) -> PathBuf {
        self.paths.snapshot_file(host, label, command)
    }

    pub fn write(&self, host: &str, label: &str, command: &str, data: &str) -> Result<PathBuf> {
        let path = self.path_for(host, label, command);
        atomic_write(&path, data.as_bytes())?;
        Ok(path)
    }

    pub fn read(&self, host: &str, label: &str, command: &str) -> Result<String> {
        let path = self.path_for(host, label, command);
        match std::fs::read_to_string(&path) {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(SnapError::SnapshotNotFound(path.display().to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn remove(&self, host: &str, label: &str, command: &str) -> Result<bool> {
        remove_if_exists(&self.path_for(host, label, command))
    }
}

// ---------------------------------------------------------------------------
// SQLite store
// ---------------------------------------------------------------------------

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS snapshots (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    hostname    TEXT NOT NULL,
    label       TEXT NOT NULL,
    command     TEXT NOT NULL,
    data        TEXT NOT NULL,
    created_at  TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS snapshots_host_command ON snapshots (hostname, command);
";

/// Stored replies keyed by host and command.
///
/// Lookup ids are relative: for a host and command, `0` is the newest stored
/// reply, `1` the one before it.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        // Workers for different hosts share one database file.
        conn.busy_timeout(Duration::from_secs(10))?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    pub fn open_in(paths: &DefaultPaths, database_name: &str) -> Result<Self> {
        Self::open(&paths.database_path(database_name))
    }

    /// Store one reply; returns its row id.
    pub fn insert(&self, host: &str, label: &str, command: &str, data: &str) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO snapshots (hostname, label, command, data, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![host, label, command, data, Utc::now().to_rfc3339()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// The reply `id` steps back from the newest one.
    pub fn nth_latest(&self, host: &str, command: &str, id: i64) -> Result<Option<String>> {
        if id < 0 {
            return Ok(None);
        }
        let data = self
            .conn
            .query_row(
                "SELECT data FROM snapshots
                 WHERE hostname = ?1 AND command = ?2
                 ORDER BY id DESC LIMIT 1 OFFSET ?3",
                params![host, command, id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(data)
    }

    /// Newest reply stored under `label`.
    pub fn latest_by_label(&self, host: &str, label: &str, command: &str) -> Result<Option<String>> {
        let data = self
            .conn
            .query_row(
                "SELECT data FROM snapshots
                 WHERE hostname = ?1 AND label = ?2 AND command = ?3
                 ORDER BY id DESC LIMIT 1",
                params![host, label, command],
                |row| row.get(0),
            )
            .optional()?;
        Ok(data)
    }

    pub fn delete_label(&self, host: &str, label: &str) -> Result<usize> {
        Ok(self.conn.execute(
            "DELETE FROM snapshots WHERE hostname = ?1 AND label = ?2",
            params![host, label],
        )?)
    }

    pub fn count(&self, host: &str) -> Result<i64> {
        Ok(self.conn.query_row(
            "SELECT COUNT(*) FROM snapshots WHERE hostname = ?1",
            params![host],
            |row| row.get(0),
        )?)
    }
}
