//! JSONL activity log: one self-contained JSON object per line recording every
//! refresh and every hold/release/kill squid issued.
//!
//! Lines are assembled in memory and written with a single `write_all` so a
//! concurrent `tail -f` never sees a partial record.
//!
//! Degradation chain:
//! 1. Configured file path (rotated by size)
//! 2. stderr with `[SQUID-LOG]` prefix
//! 3. Silent discard (logging must never break a queue operation)

#![allow(missing_docs)]

use std::fs::{self, File, OpenOptions, rename};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::config::{Config, LoggingConfig};
use crate::core::errors::{Result, SquidError};

/// Severity level for log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
}

/// What happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Refresh,
    Hold,
    Release,
    Kill,
    Bulk,
    Error,
}

/// A single activity record; everything but `ts`, `event` and `severity` is optional.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// RFC 3339 UTC timestamp.
    pub ts: String,
    pub event: EventType,
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    /// Action name for bulk records (`hold`, `release`, `kill`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    /// Jobs in the snapshot, or jobs attempted by a bulk action.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jobs: Option<usize>,
    /// Job ids whose command failed during a bulk action.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ok: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl LogEntry {
    /// Create a new entry stamped with the current UTC time.
    pub fn new(event: EventType, severity: Severity) -> Self {
        Self {
            ts: format_utc_now(),
            event,
            severity,
            job_id: None,
            action: None,
            jobs: None,
            failed: None,
            filter: None,
            duration_ms: None,
            ok: None,
            error_code: None,
            error_message: None,
        }
    }

    /// Mark the entry as failed with `error`.
    #[must_use]
    pub fn with_error(mut self, error: &SquidError) -> Self {
        self.severity = Severity::Warning;
        self.ok = Some(false);
        self.error_code = Some(error.code().to_string());
        self.error_message = Some(error.to_string());
        self
    }
}

/// Degradation state of the JSONL writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriterState {
    Normal,
    Stderr,
    Discard,
}

/// Configuration for the JSONL writer.
#[derive(Debug, Clone)]
pub struct JsonlConfig {
    pub path: PathBuf,
    /// Size at which the file is rotated.
    pub max_size_bytes: u64,
    /// Rotated files kept (`activity.jsonl.1` .. `.N`).
    pub max_rotated_files: u32,
}

impl JsonlConfig {
    /// Writer settings from the loaded configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let LoggingConfig {
            max_size_bytes,
            max_rotated_files,
            ..
        } = config.logging;
        Self {
            path: config.paths.activity_log.clone(),
            max_size_bytes,
            max_rotated_files,
        }
    }
}

/// Append-only JSONL writer with rotation and stderr fallback.
pub struct JsonlWriter {
    config: JsonlConfig,
    writer: Option<BufWriter<File>>,
    state: WriterState,
    bytes_written: u64,
}

impl JsonlWriter {
    /// Open the log file. Falls back to stderr if it cannot be opened.
    pub fn open(config: JsonlConfig) -> Self {
        let mut w = Self {
            config,
            writer: None,
            state: WriterState::Discard,
            bytes_written: 0,
        };
        match open_append(&w.config.path) {
            Ok((file, size)) => {
                w.writer = Some(BufWriter::new(file));
                w.state = WriterState::Normal;
                w.bytes_written = size;
            }
            Err(error) => {
                let _ = writeln!(io::stderr(), "[SQUID-LOG] {error}; logging to stderr");
                w.state = WriterState::Stderr;
            }
        }
        w
    }

    /// Writer that drops everything, for runs with the activity log disabled.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            config: JsonlConfig {
                path: PathBuf::new(),
                max_size_bytes: u64::MAX,
                max_rotated_files: 1,
            },
            writer: None,
            state: WriterState::Discard,
            bytes_written: 0,
        }
    }

    /// Append one entry and flush it.
    pub fn write_entry(&mut self, entry: &LogEntry) {
        let line = match serde_json::to_string(entry) {
            Ok(json) => format!("{json}\n"),
            Err(e) => {
                let _ = writeln!(io::stderr(), "[SQUID-LOG] serialize error: {e}");
                return;
            }
        };
        self.write_line(&line);
    }

    /// Current degradation state.
    pub fn state(&self) -> &str {
        match self.state {
            WriterState::Normal => "normal",
            WriterState::Stderr => "stderr",
            WriterState::Discard => "discard",
        }
    }

    fn write_line(&mut self, line: &str) {
        if self.state == WriterState::Normal
            && self.bytes_written + line.len() as u64 > self.config.max_size_bytes
        {
            self.rotate();
        }

        match self.state {
            WriterState::Normal => {
                let written = self
                    .writer
                    .as_mut()
                    .is_some_and(|w| w.write_all(line.as_bytes()).and_then(|()| w.flush()).is_ok());
                if written {
                    self.bytes_written += line.len() as u64;
                } else {
                    self.degrade();
                    self.write_line(line);
                }
            }
            WriterState::Stderr => {
                if write!(io::stderr(), "[SQUID-LOG] {line}").is_err() {
                    self.degrade();
                }
            }
            WriterState::Discard => {}
        }
    }

    fn degrade(&mut self) {
        self.writer = None;
        self.state = match self.state {
            WriterState::Normal => WriterState::Stderr,
            WriterState::Stderr | WriterState::Discard => WriterState::Discard,
        };
    }

    fn rotate(&mut self) {
        if let Some(w) = self.writer.as_mut() {
            let _ = w.flush();
        }
        self.writer = None;

        let base = self.config.path.clone();
        for i in (1..self.config.max_rotated_files).rev() {
            let _ = rename(rotated_name(&base, i), rotated_name(&base, i + 1));
        }
        let _ = rename(&base, rotated_name(&base, 1));

        match open_append(&base) {
            Ok((file, _)) => {
                self.writer = Some(BufWriter::new(file));
                self.bytes_written = 0;
            }
            Err(_) => self.degrade(),
        }
    }
}

/// Open or create a file for appending. Returns `(File, current_size)`.
fn open_append(path: &Path) -> Result<(File, u64)> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| SquidError::io(parent, source))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| SquidError::io(path, source))?;
    let size = file.metadata().map(|m| m.len()).unwrap_or(0);
    Ok((file, size))
}

/// `activity.jsonl` → `activity.jsonl.3`.
fn rotated_name(base: &Path, index: u32) -> PathBuf {
    let mut name = base.as_os_str().to_owned();
    name.push(format!(".{index}"));
    PathBuf::from(name)
}

fn format_utc_now() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_at(path: &Path, max_size_bytes: u64) -> JsonlConfig {
        JsonlConfig {
            path: path.to_path_buf(),
            max_size_bytes,
            max_rotated_files: 2,
        }
    }

    #[test]
    fn entries_are_single_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("activity.jsonl");
        let mut writer = JsonlWriter::open(config_at(&path, 1024 * 1024));
        assert_eq!(writer.state(), "normal");

        let mut entry = LogEntry::new(EventType::Kill, Severity::Info);
        entry.job_id = Some("4211337".to_string());
        entry.ok = Some(true);
        writer.write_entry(&entry);
        writer.write_entry(&LogEntry::new(EventType::Refresh, Severity::Info));

        let contents = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        let parsed: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed["event"], "kill");
        assert_eq!(parsed["job_id"], "4211337");
        assert_eq!(parsed["severity"], "info");
    }

    #[test]
    fn unset_fields_are_omitted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sparse.jsonl");
        let mut writer = JsonlWriter::open(config_at(&path, 1024 * 1024));
        writer.write_entry(&LogEntry::new(EventType::Refresh, Severity::Info));

        let line = fs::read_to_string(&path).unwrap();
        assert!(!line.contains("\"job_id\""));
        assert!(!line.contains("\"failed\""));
    }

    #[test]
    fn with_error_marks_failure() {
        let err = SquidError::QueueQuery {
            command: "squeue".to_string(),
            details: "timeout".to_string(),
        };
        let entry = LogEntry::new(EventType::Refresh, Severity::Info).with_error(&err);
        assert_eq!(entry.severity, Severity::Warning);
        assert_eq!(entry.ok, Some(false));
        assert_eq!(entry.error_code.as_deref(), Some("SQD-2001"));
    }

    #[test]
    fn rotation_keeps_bounded_history() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rot.jsonl");
        let mut writer = JsonlWriter::open(config_at(&path, 100));
        for _ in 0..10 {
            writer.write_entry(&LogEntry::new(EventType::Refresh, Severity::Info));
        }

        assert!(path.exists());
        assert!(rotated_name(&path, 1).exists());
        assert!(rotated_name(&path, 2).exists());
        assert!(!rotated_name(&path, 3).exists());
    }

    #[test]
    fn unwritable_path_falls_back_to_stderr() {
        let writer = JsonlWriter::open(config_at(
            Path::new("/nonexistent_squid_test_dir/\0bad/activity.jsonl"),
            1024,
        ));
        assert_eq!(writer.state(), "stderr");
    }

    #[test]
    fn disabled_writer_discards() {
        let mut writer = JsonlWriter::disabled();
        writer.write_entry(&LogEntry::new(EventType::Hold, Severity::Info));
        assert_eq!(writer.state(), "discard");
    }
}
