//! Append-only record of comics that have already been delivered.
//!
//! The most recent identifier is the largest one stored. Entries are only
//! ever appended; nothing here rewrites or compacts existing history.

use chrono::Utc;
use rusqlite::{params, Connection};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::config::{Config, HistoryBackend};
use crate::error::{Error, Result};

pub trait HistoryStore {
    /// Highest identifier recorded so far, `None` on first run.
    fn last_seen(&self) -> Result<Option<u32>>;

    /// Append `num`. Call only after delivery succeeded.
    fn mark_seen(&mut self, num: u32) -> Result<()>;
}

impl<T: HistoryStore + ?Sized> HistoryStore for Box<T> {
    fn last_seen(&self) -> Result<Option<u32>> {
        (**self).last_seen()
    }

    fn mark_seen(&mut self, num: u32) -> Result<()> {
        (**self).mark_seen(num)
    }
}

/// Open the backend selected in configuration.
pub fn open_history(config: &Config) -> Result<Box<dyn HistoryStore>> {
    match config.history_backend {
        HistoryBackend::File => Ok(Box::new(FileHistory::new(&config.history_path))),
        HistoryBackend::Sqlite => Ok(Box::new(SqliteHistory::open(&config.history_path)?)),
    }
}

/// Plain text history, one comic number per line.
pub struct FileHistory {
    path: PathBuf,
}

impl FileHistory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl HistoryStore for FileHistory {
    fn last_seen(&self) -> Result<Option<u32>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(Error::Persistence(format!(
                    "Failed to read history file {}: {}",
                    self.path.display(),
                    e
                )))
            }
        };

        let mut last: Option<u32> = None;
        for (lineno, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let num: u32 = line.parse().map_err(|_| {
                Error::Persistence(format!(
                    "Corrupt history file {} at line {}: {:?}",
                    self.path.display(),
                    lineno + 1,
                    line
                ))
            })?;
            last = last.max(Some(num));
        }

        Ok(last)
    }

    fn mark_seen(&mut self, num: u32) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                Error::Persistence(format!(
                    "Failed to create history directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| {
                Error::Persistence(format!(
                    "Failed to open history file {}: {}",
                    self.path.display(),
                    e
                ))
            })?;

        // One newline-terminated entry per comic
        writeln!(file, "{}", num)
            .and_then(|_| file.sync_all())
            .map_err(|e| {
                Error::Persistence(format!(
                    "Failed to append to history file {}: {}",
                    self.path.display(),
                    e
                ))
            })
    }
}

/// History kept in an embedded SQLite database.
pub struct SqliteHistory {
    conn: Connection,
}

impl SqliteHistory {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                Error::Persistence(format!(
                    "Failed to create history directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }
        Self::init(Connection::open(path)?)
    }

    pub fn in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                num INTEGER NOT NULL,
                seen_at TEXT NOT NULL
            );",
        )?;
        Ok(Self { conn })
    }
}

impl HistoryStore for SqliteHistory {
    fn last_seen(&self) -> Result<Option<u32>> {
        let last = self
            .conn
            .query_row("SELECT MAX(num) FROM history", [], |row| {
                row.get::<_, Option<u32>>(0)
            })?;
        Ok(last)
    }

    fn mark_seen(&mut self, num: u32) -> Result<()> {
        self.conn.execute(
            "INSERT INTO history (num, seen_at) VALUES (?1, ?2)",
            params![num, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }
}
