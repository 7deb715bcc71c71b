//! Queue controller: the single owner of the current snapshot and filter.
//!
//! Every operation blocks on the scheduler. Refreshes replace the snapshot
//! wholesale and leave prior state untouched on failure; mutations never
//! refresh on their own.

#![allow(missing_docs)]

use std::time::Instant;

use serde::Serialize;

use crate::core::errors::{Result, SquidError};
use crate::logger::jsonl::{EventType, JsonlWriter, LogEntry, Severity};
use crate::queue::filter::{FilterSpec, filter_jobs};
use crate::queue::job::JobRecord;
use crate::queue::parser::parse_queue;
use crate::queue::scheduler::{JobAction, Scheduler};

/// Result of a single-job mutation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationOutcome {
    /// The row has no real job id (header, array element); nothing was issued.
    Skipped,
    /// The scheduler command was issued and succeeded.
    Issued,
}

/// One failed job inside a bulk operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BulkFailure {
    pub job_id: String,
    pub error: String,
}

/// Aggregate outcome of a hold/release/kill-all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BulkReport {
    pub action: JobAction,
    /// Jobs a command was issued for.
    pub attempted: usize,
    /// Rows without an actionable id.
    pub skipped: usize,
    pub failures: Vec<BulkFailure>,
}

impl BulkReport {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Jobs whose command succeeded.
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.attempted - self.failures.len()
    }

    /// Ids of the failed jobs, in the order they were attempted.
    #[must_use]
    pub fn failed_ids(&self) -> Vec<String> {
        self.failures.iter().map(|f| f.job_id.clone()).collect()
    }

    /// One-line summary for status bars and terminal output.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut line = format!(
            "{} {}/{} job(s)",
            self.action,
            self.succeeded(),
            self.attempted
        );
        if !self.is_success() {
            line.push_str(&format!("; failed: {}", self.failed_ids().join(", ")));
        }
        line
    }
}

/// Owns the live queue snapshot and routes every read and write through the
/// scheduler.
pub struct QueueController<S: Scheduler> {
    scheduler: S,
    snapshot: Vec<JobRecord>,
    filter: FilterSpec,
    activity: JsonlWriter,
}

impl<S: Scheduler> QueueController<S> {
    /// Empty snapshot, identity filter, no activity log.
    pub fn new(scheduler: S) -> Self {
        Self {
            scheduler,
            snapshot: Vec::new(),
            filter: FilterSpec::identity(),
            activity: JsonlWriter::disabled(),
        }
    }

    /// Record refreshes and mutations to `writer`.
    #[must_use]
    pub fn with_activity_log(mut self, writer: JsonlWriter) -> Self {
        self.activity = writer;
        self
    }

    /// Jobs stored by the last successful refresh.
    pub fn snapshot(&self) -> &[JobRecord] {
        &self.snapshot
    }

    /// Filter used by the last successful refresh.
    pub const fn filter(&self) -> &FilterSpec {
        &self.filter
    }

    pub const fn scheduler(&self) -> &S {
        &self.scheduler
    }

    /// Job with `job_id` in the current snapshot.
    pub fn find(&self, job_id: &str) -> Option<&JobRecord> {
        self.snapshot.iter().find(|job| job.job_id == job_id)
    }

    /// Query, parse and filter the queue, then store the result and `spec`.
    ///
    /// Returns the number of jobs kept. On failure nothing is stored.
    pub fn refresh(&mut self, spec: FilterSpec) -> Result<usize> {
        let started = Instant::now();
        let result = self
            .scheduler
            .query_queue()
            .and_then(|raw| parse_queue(&raw))
            .map(|jobs| filter_jobs(jobs, &spec));

        let mut entry = LogEntry::new(EventType::Refresh, Severity::Info);
        entry.filter = Some(spec.describe());
        entry.duration_ms = Some(u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX));

        match result {
            Ok(jobs) => {
                let count = jobs.len();
                self.snapshot = jobs;
                self.filter = spec;
                entry.jobs = Some(count);
                entry.ok = Some(true);
                self.activity.write_entry(&entry);
                Ok(count)
            }
            Err(error) => {
                self.activity.write_entry(&entry.with_error(&error));
                Err(error)
            }
        }
    }

    /// Refresh again with the filter currently in force.
    pub fn refresh_current(&mut self) -> Result<usize> {
        self.refresh(self.filter.clone())
    }

    pub fn hold(&mut self, job: &JobRecord) -> Result<MutationOutcome> {
        self.mutate(JobAction::Hold, job)
    }

    pub fn release(&mut self, job: &JobRecord) -> Result<MutationOutcome> {
        self.mutate(JobAction::Release, job)
    }

    pub fn kill(&mut self, job: &JobRecord) -> Result<MutationOutcome> {
        self.mutate(JobAction::Kill, job)
    }

    /// Apply `action` to `job` unless its id is not a real job id.
    pub fn mutate(&mut self, action: JobAction, job: &JobRecord) -> Result<MutationOutcome> {
        if !job.is_actionable() {
            return Ok(MutationOutcome::Skipped);
        }
        self.issue(action, &job.job_id)?;
        Ok(MutationOutcome::Issued)
    }

    pub fn hold_all(&mut self) -> BulkReport {
        self.apply_all(JobAction::Hold)
    }

    pub fn release_all(&mut self) -> BulkReport {
        self.apply_all(JobAction::Release)
    }

    pub fn kill_all(&mut self) -> BulkReport {
        self.apply_all(JobAction::Kill)
    }

    /// Apply `action` to every actionable job of the snapshot, in order,
    /// continuing past failures.
    pub fn apply_all(&mut self, action: JobAction) -> BulkReport {
        let targets: Vec<String> = self
            .snapshot
            .iter()
            .filter(|job| job.is_actionable())
            .map(|job| job.job_id.clone())
            .collect();
        let skipped = self.snapshot.len() - targets.len();

        let failures: Vec<BulkFailure> = targets
            .iter()
            .filter_map(|job_id| {
                self.issue(action, job_id).err().map(|error| BulkFailure {
                    job_id: job_id.clone(),
                    error: error.to_string(),
                })
            })
            .collect();

        let report = BulkReport {
            action,
            attempted: targets.len(),
            skipped,
            failures,
        };

        let mut entry = LogEntry::new(
            EventType::Bulk,
            if report.is_success() {
                Severity::Info
            } else {
                Severity::Warning
            },
        );
        entry.action = Some(action.label().to_string());
        entry.jobs = Some(report.attempted);
        entry.ok = Some(report.is_success());
        if !report.is_success() {
            entry.failed = Some(report.failed_ids());
        }
        self.activity.write_entry(&entry);
        report
    }

    fn issue(&mut self, action: JobAction, job_id: &str) -> Result<()> {
        let result = action.apply(&self.scheduler, job_id);
        let event = match action {
            JobAction::Hold => EventType::Hold,
            JobAction::Release => EventType::Release,
            JobAction::Kill => EventType::Kill,
        };
        let mut entry = LogEntry::new(event, Severity::Info);
        entry.job_id = Some(job_id.to_string());
        match &result {
            Ok(()) => entry.ok = Some(true),
            Err(error) => entry = entry.with_error(error),
        }
        self.activity.write_entry(&entry);
        result
    }
}

/// Human-facing message for a controller error, as shown in the status line.
#[must_use]
pub fn status_message(error: &SquidError) -> String {
    match error {
        SquidError::QueueQuery { details, .. } => format!("squeue failed: {details}"),
        SquidError::Parse {
            line_number, line, ..
        } => format!("cannot parse squeue line {line_number}: {}", line.trim()),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::jsonl::JsonlConfig;
    use crate::queue::job::JobField;
    use crate::queue::scheduler::MockScheduler;

    fn row(id: &str, name: &str, state: &str) -> String {
        format!("{id} {name} batch 0:10 2024-01-01T00:00:00 2024-01-01T00:01:00 2024-01-02T00:01:00 {state} {id} N/A node01")
    }

    fn queue_of(rows: &[(&str, &str, &str)]) -> String {
        rows.iter()
            .map(|(id, name, state)| row(id, name, state))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn three_jobs() -> QueueController<MockScheduler> {
        let mock = MockScheduler::with_queue(queue_of(&[
            ("101", "alpha", "RUNNING"),
            ("102", "beta", "PENDING"),
            ("103", "gamma", "RUNNING"),
        ]));
        let mut controller = QueueController::new(mock);
        controller.refresh(FilterSpec::identity()).unwrap();
        controller
    }

    fn ids(controller: &QueueController<MockScheduler>) -> Vec<&str> {
        controller
            .snapshot()
            .iter()
            .map(|job| job.job_id.as_str())
            .collect()
    }

    #[test]
    fn starts_empty() {
        let controller = QueueController::new(MockScheduler::default());
        assert!(controller.snapshot().is_empty());
        assert!(controller.filter().is_identity());
        assert_eq!(controller.scheduler().query_count(), 0);
    }

    #[test]
    fn refresh_stores_filtered_snapshot_and_spec() {
        let mut controller = three_jobs();
        let spec = FilterSpec::new(Some(JobField::State), "RUN").unwrap();
        assert_eq!(controller.refresh(spec).unwrap(), 2);
        assert_eq!(ids(&controller), ["101", "103"]);
        assert_eq!(controller.filter().pattern(), "RUN");

        assert_eq!(controller.refresh_current().unwrap(), 2);
        assert_eq!(controller.scheduler().query_count(), 3);
    }

    #[test]
    fn failed_query_leaves_previous_snapshot() {
        let mut controller = three_jobs();
        controller.scheduler().fail_queries("slurmctld unreachable");
        let spec = FilterSpec::new(Some(JobField::Name), "beta").unwrap();
        let err = controller.refresh(spec).unwrap_err();
        assert_eq!(err.code(), "SQD-2001");
        assert_eq!(ids(&controller), ["101", "102", "103"]);
        assert!(controller.filter().is_identity());
    }

    #[test]
    fn failed_parse_leaves_previous_snapshot() {
        let mut controller = three_jobs();
        controller
            .scheduler()
            .set_queue(format!("{}\n104 short row", row("104", "delta", "PENDING")));
        let err = controller.refresh_current().unwrap_err();
        assert!(matches!(err, SquidError::Parse { line_number: 2, .. }));
        assert_eq!(controller.snapshot().len(), 3);
    }

    #[test]
    fn refresh_replaces_rather_than_merges() {
        let mut controller = three_jobs();
        controller
            .scheduler()
            .set_queue(queue_of(&[("200", "new", "PENDING")]));
        controller.refresh_current().unwrap();
        assert_eq!(ids(&controller), ["200"]);
    }

    #[test]
    fn header_row_is_never_mutated() {
        let mut controller = QueueController::new(MockScheduler::default());
        let header = JobRecord::header();
        assert_eq!(controller.hold(&header).unwrap(), MutationOutcome::Skipped);
        assert_eq!(controller.release(&header).unwrap(), MutationOutcome::Skipped);
        assert_eq!(controller.kill(&header).unwrap(), MutationOutcome::Skipped);
        assert!(controller.scheduler().calls().is_empty());
    }

    #[test]
    fn single_mutations_issue_one_call_and_do_not_refresh() {
        let mut controller = three_jobs();
        let job = controller.snapshot()[1].clone();
        assert_eq!(controller.hold(&job).unwrap(), MutationOutcome::Issued);
        assert_eq!(controller.release(&job).unwrap(), MutationOutcome::Issued);
        assert_eq!(
            controller.scheduler().calls(),
            [
                (JobAction::Hold, "102".to_string()),
                (JobAction::Release, "102".to_string())
            ]
        );
        assert_eq!(controller.scheduler().query_count(), 1);
    }

    #[test]
    fn single_mutation_failure_is_returned() {
        let mut controller = three_jobs();
        controller.scheduler().fail_job("101");
        let job = controller.snapshot()[0].clone();
        let err = controller.kill(&job).unwrap_err();
        assert_eq!(err.code(), "SQD-2201");
    }

    #[test]
    fn kill_all_continues_past_failures() {
        let mut controller = three_jobs();
        controller.scheduler().fail_job("102");
        let report = controller.kill_all();

        let killed: Vec<String> = controller
            .scheduler()
            .calls()
            .into_iter()
            .map(|(_, id)| id)
            .collect();
        assert_eq!(killed, ["101", "102", "103"]);
        assert_eq!(report.attempted, 3);
        assert_eq!(report.failed_ids(), ["102"]);
        assert!(!report.is_success());
        assert_eq!(report.summary(), "kill 2/3 job(s); failed: 102");
    }

    #[test]
    fn bulk_skips_rows_without_job_ids() {
        let mock = MockScheduler::with_queue(queue_of(&[
            ("300_1", "array", "PENDING"),
            ("301", "plain", "PENDING"),
        ]));
        let mut controller = QueueController::new(mock);
        controller.refresh(FilterSpec::identity()).unwrap();
        let report = controller.hold_all();
        assert_eq!(report.attempted, 1);
        assert_eq!(report.skipped, 1);
        assert!(report.is_success());
        assert_eq!(
            controller.scheduler().calls(),
            [(JobAction::Hold, "301".to_string())]
        );
    }

    #[test]
    fn bulk_on_empty_snapshot_is_a_successful_no_op() {
        let mut controller = QueueController::new(MockScheduler::default());
        let report = controller.release_all();
        assert_eq!(report.attempted, 0);
        assert!(report.is_success());
        assert!(controller.scheduler().calls().is_empty());
    }

    #[test]
    fn activity_log_records_refreshes_and_mutations() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("activity.jsonl");
        let writer = JsonlWriter::open(JsonlConfig {
            path: path.clone(),
            max_size_bytes: 1024 * 1024,
            max_rotated_files: 1,
        });
        let mock = MockScheduler::with_queue(queue_of(&[("1", "a", "PENDING"), ("2", "b", "PENDING")]));
        mock.fail_job("2");
        let mut controller = QueueController::new(mock).with_activity_log(writer);
        controller.refresh(FilterSpec::identity()).unwrap();
        controller.kill_all();

        let events: Vec<serde_json::Value> = std::fs::read_to_string(&path)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        let kinds: Vec<&str> = events.iter().map(|e| e["event"].as_str().unwrap()).collect();
        assert_eq!(kinds, ["refresh", "kill", "kill", "bulk"]);
        assert_eq!(events[0]["jobs"], 2);
        assert_eq!(events[2]["ok"], false);
        assert_eq!(events[2]["error_code"], "SQD-2201");
        assert_eq!(events[3]["failed"][0], "2");
    }

    #[test]
    fn status_message_is_short() {
        let err = SquidError::QueueQuery {
            command: "squeue -u alice".to_string(),
            details: "exit 1: timeout".to_string(),
        };
        assert_eq!(status_message(&err), "squeue failed: exit 1: timeout");
    }
}
