//! SQD-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, SquidError>;

/// Top-level error type for squid.
#[derive(Debug, Error)]
pub enum SquidError {
    #[error("[SQD-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[SQD-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[SQD-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[SQD-2001] queue query `{command}` failed: {details}")]
    QueueQuery { command: String, details: String },

    #[error(
        "[SQD-2002] unrecognised squeue row at line {line_number} ({token_count} columns): {line:?}"
    )]
    Parse {
        line_number: usize,
        line: String,
        token_count: usize,
    },

    #[error("[SQD-2101] unknown job attribute: {key:?}")]
    InvalidAttribute { key: String },

    #[error("[SQD-2102] invalid filter pattern {pattern:?}: {details}")]
    InvalidPattern { pattern: String, details: String },

    #[error("[SQD-2201] {action} failed for job {job_id}: {details}")]
    Mutation {
        action: &'static str,
        job_id: String,
        details: String,
    },

    #[error("[SQD-3001] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[SQD-3002] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SquidError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "SQD-1001",
            Self::MissingConfig { .. } => "SQD-1002",
            Self::ConfigParse { .. } => "SQD-1003",
            Self::QueueQuery { .. } => "SQD-2001",
            Self::Parse { .. } => "SQD-2002",
            Self::InvalidAttribute { .. } => "SQD-2101",
            Self::InvalidPattern { .. } => "SQD-2102",
            Self::Mutation { .. } => "SQD-2201",
            Self::Serialization { .. } => "SQD-3001",
            Self::Io { .. } => "SQD-3002",
        }
    }

    /// Whether the failure stems from operator input rather than the
    /// environment (bad attribute, bad regex, bad config).
    #[must_use]
    pub const fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidConfig { .. }
                | Self::MissingConfig { .. }
                | Self::ConfigParse { .. }
                | Self::InvalidAttribute { .. }
                | Self::InvalidPattern { .. }
        )
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

impl From<serde_json::Error> for SquidError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for SquidError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn every_variant() -> Vec<SquidError> {
        vec![
            SquidError::InvalidConfig {
                details: String::new(),
            },
            SquidError::MissingConfig {
                path: PathBuf::new(),
            },
            SquidError::ConfigParse {
                context: "",
                details: String::new(),
            },
            SquidError::QueueQuery {
                command: String::new(),
                details: String::new(),
            },
            SquidError::Parse {
                line_number: 0,
                line: String::new(),
                token_count: 0,
            },
            SquidError::InvalidAttribute { key: String::new() },
            SquidError::InvalidPattern {
                pattern: String::new(),
                details: String::new(),
            },
            SquidError::Mutation {
                action: "hold",
                job_id: String::new(),
                details: String::new(),
            },
            SquidError::Serialization {
                context: "",
                details: String::new(),
            },
            SquidError::Io {
                path: PathBuf::new(),
                source: std::io::Error::other("test"),
            },
        ]
    }

    #[test]
    fn error_codes_are_unique() {
        let codes: Vec<&str> = every_variant().iter().map(SquidError::code).collect();
        let unique: std::collections::HashSet<&&str> = codes.iter().collect();
        assert_eq!(
            codes.len(),
            unique.len(),
            "error codes must be unique: {codes:?}"
        );
    }

    #[test]
    fn display_includes_code() {
        for err in every_variant() {
            let msg = err.to_string();
            assert!(
                msg.contains(err.code()),
                "display should contain {}: {msg}",
                err.code()
            );
        }
    }

    #[test]
    fn parse_error_names_offending_line() {
        let err = SquidError::Parse {
            line_number: 3,
            line: "123 short row".to_string(),
            token_count: 3,
        };
        let msg = err.to_string();
        assert!(msg.contains("line 3"), "{msg}");
        assert!(msg.contains("123 short row"), "{msg}");
    }

    #[test]
    fn user_errors_are_classified() {
        assert!(SquidError::InvalidAttribute { key: "x".into() }.is_user_error());
        assert!(
            SquidError::InvalidPattern {
                pattern: "(".into(),
                details: String::new()
            }
            .is_user_error()
        );
        assert!(
            !SquidError::QueueQuery {
                command: "squeue".into(),
                details: String::new()
            }
            .is_user_error()
        );
        assert!(
            !SquidError::Mutation {
                action: "kill",
                job_id: "1".into(),
                details: String::new()
            }
            .is_user_error()
        );
    }

    #[test]
    fn io_convenience_constructor() {
        let err = SquidError::io(
            "/tmp/activity.jsonl",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert_eq!(err.code(), "SQD-3002");
        assert!(err.to_string().contains("/tmp/activity.jsonl"));
    }

    #[test]
    fn from_toml_error() {
        let toml_err = toml::from_str::<toml::Value>("= invalid").unwrap_err();
        let err: SquidError = toml_err.into();
        assert_eq!(err.code(), "SQD-1003");
    }

    #[test]
    fn from_serde_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err: SquidError = json_err.into();
        assert_eq!(err.code(), "SQD-3001");
    }
}
