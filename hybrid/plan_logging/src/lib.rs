#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! Structured JSON-lines logging for search and repair components.

use std::{
    collections::VecDeque,
    fs::{self, File},
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::Result;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Log severity level, ordered from least to most severe.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    /// Per-node and per-candidate detail.
    Debug,
    /// Search milestones.
    Info,
    /// Recoverable trouble (repair declined, budget exhausted).
    Warn,
    /// Contract violations.
    Error,
}

impl LogLevel {
    /// Parses a level name (case-insensitive).
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "debug" => Some(Self::Debug),
            "info" => Some(Self::Info),
            "warn" | "warning" => Some(Self::Warn),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

/// Structured log record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    /// Timestamp in ISO8601.
    pub timestamp: DateTime<Utc>,
    /// Component emitting the log.
    pub module: String,
    /// Severity.
    pub level: LogLevel,
    /// Dotted message key, e.g. `search.node.expanded`.
    pub message: String,
    /// Search iteration the record belongs to, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iteration: Option<u64>,
    /// Arbitrary JSON payload.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl LogRecord {
    /// Creates a record with the provided info.
    #[must_use]
    pub fn new(module: impl Into<String>, level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            module: module.into(),
            level,
            message: message.into(),
            iteration: None,
            metadata: serde_json::Map::new(),
        }
    }

    /// Tags the record with a search iteration.
    #[must_use]
    pub fn at_iteration(mut self, iteration: u64) -> Self {
        self.iteration = Some(iteration);
        self
    }

    /// Merges object fields into the metadata map; non-object values are stored under `value`.
    #[must_use]
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        match metadata {
            serde_json::Value::Object(map) => self.metadata.extend(map),
            serde_json::Value::Null => {}
            other => {
                self.metadata.insert("value".into(), other);
            }
        }
        self
    }
}

/// Destination for log records.
pub trait LogSink: Send + Sync {
    /// Persists one record.
    fn write(&self, record: &LogRecord) -> Result<()>;

    /// Minimum level accepted by the sink.
    fn min_level(&self) -> LogLevel {
        LogLevel::Debug
    }

    /// Writes the record if it passes the level filter.
    fn log(&self, record: &LogRecord) -> Result<()> {
        if record.level < self.min_level() {
            return Ok(());
        }
        self.write(record)
    }
}

/// Thread-safe JSON-lines logger with append-only semantics.
#[derive(Debug)]
pub struct JsonLogger {
    path: PathBuf,
    min_level: LogLevel,
    writer: Mutex<File>,
}

impl JsonLogger {
    /// Creates or opens a logger at the desired path.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;
        Ok(Self {
            path,
            min_level: LogLevel::Debug,
            writer: Mutex::new(file),
        })
    }

    /// Drops records below `level`.
    #[must_use]
    pub fn with_min_level(mut self, level: LogLevel) -> Self {
        self.min_level = level;
        self
    }

    /// Returns the underlying file path (useful for tests).
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LogSink for JsonLogger {
    fn write(&self, record: &LogRecord) -> Result<()> {
        let mut writer = self.writer.lock();
        serde_json::to_writer(&mut *writer, record)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }

    fn min_level(&self) -> LogLevel {
        self.min_level
    }
}

/// Bounded in-memory sink; the oldest record is evicted once full.
#[derive(Debug)]
pub struct MemoryLogger {
    capacity: usize,
    records: Mutex<VecDeque<LogRecord>>,
}

impl MemoryLogger {
    /// Creates a sink retaining at most `capacity` records.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            records: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Copies the retained records.
    #[must_use]
    pub fn snapshot(&self) -> Vec<LogRecord> {
        self.records.lock().iter().cloned().collect()
    }

    /// Returns retained records whose message starts with `prefix`.
    #[must_use]
    pub fn matching(&self, prefix: &str) -> Vec<LogRecord> {
        self.records
            .lock()
            .iter()
            .filter(|record| record.message.starts_with(prefix))
            .cloned()
            .collect()
    }
}

impl LogSink for MemoryLogger {
    fn write(&self, record: &LogRecord) -> Result<()> {
        let mut records = self.records.lock();
        if records.len() == self.capacity {
            records.pop_front();
        }
        records.push_back(record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn writes_json_lines() {
        let dir = tempdir().unwrap();
        let logger = JsonLogger::new(dir.path().join("search.log")).unwrap();
        logger
            .log(&LogRecord::new("search", LogLevel::Info, "search.started").at_iteration(3))
            .unwrap();
        let content = fs::read_to_string(logger.path()).unwrap();
        assert!(content.contains("\"message\":\"search.started\""));
        assert!(content.contains("\"iteration\":3"));
    }

    #[test]
    fn level_filter_drops_debug() {
        let dir = tempdir().unwrap();
        let logger = JsonLogger::new(dir.path().join("filtered.log"))
            .unwrap()
            .with_min_level(LogLevel::Warn);
        logger
            .log(&LogRecord::new("repair", LogLevel::Debug, "repair.candidate"))
            .unwrap();
        logger
            .log(&LogRecord::new("repair", LogLevel::Warn, "repair.declined"))
            .unwrap();
        let content = fs::read_to_string(logger.path()).unwrap();
        assert_eq!(content.lines().count(), 1);
        assert!(content.contains("repair.declined"));
    }

    #[test]
    fn memory_logger_evicts_oldest() {
        let sink = MemoryLogger::new(2);
        for key in ["a.one", "a.two", "b.three"] {
            sink.log(&LogRecord::new("m", LogLevel::Info, key)).unwrap();
        }
        let kept = sink.snapshot();
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].message, "a.two");
        assert_eq!(sink.matching("a.").len(), 1);
    }

    #[test]
    fn metadata_merges_objects() {
        let record = LogRecord::new("m", LogLevel::Info, "k")
            .with_metadata(serde_json::json!({ "step": 4 }))
            .with_metadata(serde_json::json!(7));
        assert_eq!(record.metadata["step"], 4);
        assert_eq!(record.metadata["value"], 7);
    }

    #[test]
    fn parses_levels() {
        assert_eq!(LogLevel::parse("WARNING"), Some(LogLevel::Warn));
        assert_eq!(LogLevel::parse("trace"), None);
        assert!(LogLevel::Debug < LogLevel::Error);
    }
}
