//! Job rows as reported by `squeue`, and the fixed set of filterable fields.
//!
//! Every attribute is kept as the pre-formatted text squeue printed; nothing is
//! reinterpreted as a number or timestamp.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::errors::SquidError;

/// Number of fields in a [`JobRecord`].
pub const FIELD_COUNT: usize = 11;

/// One row of a queue snapshot (one job-array element).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: String,
    pub name: String,
    pub partition: String,
    pub time_used: String,
    pub submit_time: String,
    pub start_time: String,
    pub end_time: String,
    pub state: String,
    pub array_job_id: String,
    pub array_task_id: String,
    /// Allocated nodes, or the pending reason when nothing is allocated.
    pub node_list: String,
}

impl JobRecord {
    /// Build a record from the eleven columns in squeue order.
    #[must_use]
    pub fn from_columns(columns: [String; FIELD_COUNT]) -> Self {
        let [
            job_id,
            name,
            partition,
            time_used,
            submit_time,
            start_time,
            end_time,
            state,
            array_job_id,
            array_task_id,
            node_list,
        ] = columns;
        Self {
            job_id,
            name,
            partition,
            time_used,
            submit_time,
            start_time,
            end_time,
            state,
            array_job_id,
            array_task_id,
            node_list,
        }
    }

    /// Synthetic banner row whose fields are the column titles.
    ///
    /// Its `job_id` is not numeric, so every mutating operation ignores it.
    #[must_use]
    pub fn header() -> Self {
        Self {
            job_id: "Job ID".to_string(),
            name: "Name".to_string(),
            partition: "Partition".to_string(),
            time_used: "Time".to_string(),
            submit_time: "Submit Time".to_string(),
            start_time: "Start Time".to_string(),
            end_time: "End Time".to_string(),
            state: "State".to_string(),
            array_job_id: "Ar.J.Id".to_string(),
            array_task_id: "Ar.T.Id".to_string(),
            node_list: "Node/Reason".to_string(),
        }
    }

    /// Whether this row refers to a real scheduler job that may be held,
    /// released or cancelled.
    #[must_use]
    pub fn is_actionable(&self) -> bool {
        is_job_id(&self.job_id)
    }

    /// Value of `field` on this record.
    #[must_use]
    pub fn get(&self, field: JobField) -> &str {
        match field {
            JobField::JobId => &self.job_id,
            JobField::Name => &self.name,
            JobField::Partition => &self.partition,
            JobField::TimeUsed => &self.time_used,
            JobField::SubmitTime => &self.submit_time,
            JobField::StartTime => &self.start_time,
            JobField::EndTime => &self.end_time,
            JobField::State => &self.state,
            JobField::ArrayJobId => &self.array_job_id,
            JobField::ArrayTaskId => &self.array_task_id,
            JobField::NodeList => &self.node_list,
        }
    }

    /// Fixed-width single-line rendering used by the dashboard and `list`.
    #[must_use]
    pub fn display_row(&self) -> String {
        format!(
            "{:<10}{:<20}{:<25}{:<10}{:<15}{:<15}{:<15}{:<11}{:<16}{:<10}{:<10}",
            self.job_id,
            self.name,
            self.partition,
            self.time_used,
            short_time(&self.submit_time),
            short_time(&self.start_time),
            short_time(&self.end_time),
            self.state,
            self.node_list,
            self.array_job_id,
            self.array_task_id,
        )
    }
}

impl fmt::Display for JobRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_row())
    }
}

/// A positive decimal job id such as `4211337`.
#[must_use]
pub fn is_job_id(raw: &str) -> bool {
    !raw.is_empty() && raw.bytes().all(|b| b.is_ascii_digit()) && raw.bytes().any(|b| b != b'0')
}

/// Drop the date part of a squeue timestamp: `2024-03-05T10:00:00` → `05T10:00:00`.
fn short_time(raw: &str) -> &str {
    raw.rsplit('-').next().unwrap_or(raw)
}

/// Field selector used by filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobField {
    JobId,
    Name,
    Partition,
    TimeUsed,
    SubmitTime,
    StartTime,
    EndTime,
    State,
    ArrayJobId,
    ArrayTaskId,
    NodeList,
}

/// Filterable attributes in menu order: display name and field.
static FILTERABLE: [(&str, JobField); FIELD_COUNT] = [
    ("Name", JobField::Name),
    ("Partition", JobField::Partition),
    ("State", JobField::State),
    ("Time", JobField::TimeUsed),
    ("Node/Reason", JobField::NodeList),
    ("Submit Time", JobField::SubmitTime),
    ("Start Time", JobField::StartTime),
    ("Job ID", JobField::JobId),
    ("Max End Time", JobField::EndTime),
    ("Array Job Id", JobField::ArrayJobId),
    ("Array Task Id", JobField::ArrayTaskId),
];

/// Ordered mapping of display name → field offered to the operator.
#[must_use]
pub fn filterable_attributes() -> &'static [(&'static str, JobField)] {
    &FILTERABLE
}

impl JobField {
    /// Snake-case key, as used in config files and on the command line.
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::JobId => "job_id",
            Self::Name => "name",
            Self::Partition => "partition",
            Self::TimeUsed => "time_used",
            Self::SubmitTime => "submit_time",
            Self::StartTime => "start_time",
            Self::EndTime => "end_time",
            Self::State => "state",
            Self::ArrayJobId => "array_job_id",
            Self::ArrayTaskId => "array_task_id",
            Self::NodeList => "node_list",
        }
    }

    /// Menu label for this field.
    #[must_use]
    pub fn display_name(self) -> &'static str {
        FILTERABLE
            .iter()
            .find(|(_, field)| *field == self)
            .map_or("?", |(name, _)| *name)
    }

    /// Look a field up by its menu label (`"Node/Reason"`).
    #[must_use]
    pub fn from_display_name(name: &str) -> Option<Self> {
        FILTERABLE
            .iter()
            .find(|(label, _)| *label == name)
            .map(|(_, field)| *field)
    }
}

impl fmt::Display for JobField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for JobField {
    type Err = SquidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FILTERABLE
            .iter()
            .map(|(_, field)| *field)
            .find(|field| field.key() == s)
            .ok_or_else(|| SquidError::InvalidAttribute { key: s.to_string() })
    }
}
