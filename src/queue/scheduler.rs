//! Scheduler trait and implementations (Slurm command line, in-memory mock).

#![allow(missing_docs)]

use std::collections::HashSet;
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::process::Command;

use parking_lot::Mutex;
use serde::Serialize;

use crate::core::config::SchedulerConfig;
use crate::core::errors::{Result, SquidError};

/// squeue columns requested, in the order the parser expects them.
pub const SQUEUE_COLUMNS: [&str; 12] = [
    "JobID",
    "Name",
    "Partition",
    "TimeUsed",
    "SubmitTime",
    "StartTime",
    "EndTime",
    "State",
    "ArrayJobID",
    "ArrayTaskID",
    "NodeList",
    "Reason",
];

/// A state-changing operation on a single job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobAction {
    Hold,
    Release,
    Kill,
}

impl JobAction {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Hold => "hold",
            Self::Release => "release",
            Self::Kill => "kill",
        }
    }

    /// Issue this action for `job_id` through `scheduler`.
    pub fn apply(self, scheduler: &dyn Scheduler, job_id: &str) -> Result<()> {
        match self {
            Self::Hold => scheduler.hold_job(job_id),
            Self::Release => scheduler.release_job(job_id),
            Self::Kill => scheduler.kill_job(job_id),
        }
    }
}

impl fmt::Display for JobAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// External batch-scheduler surface consumed by the queue controller.
///
/// Every call blocks until the underlying command has finished.
pub trait Scheduler: Send + Sync {
    /// Raw, headerless listing of the current user's jobs, array-expanded.
    fn query_queue(&self) -> Result<String>;
    fn hold_job(&self, job_id: &str) -> Result<()>;
    fn release_job(&self, job_id: &str) -> Result<()>;
    fn kill_job(&self, job_id: &str) -> Result<()>;
}

/// Slurm implementation driving `squeue`, `scontrol` and `scancel`.
#[derive(Debug, Clone)]
pub struct SlurmScheduler {
    squeue_bin: PathBuf,
    scontrol_bin: PathBuf,
    scancel_bin: PathBuf,
    user: String,
    column_width: usize,
}

impl SlurmScheduler {
    /// Build from configuration, resolving the user whose queue is shown.
    pub fn from_config(config: &SchedulerConfig) -> Result<Self> {
        let user = if config.user.trim().is_empty() {
            current_user()?
        } else {
            config.user.trim().to_string()
        };
        Ok(Self {
            squeue_bin: config.squeue_bin.clone(),
            scontrol_bin: config.scontrol_bin.clone(),
            scancel_bin: config.scancel_bin.clone(),
            user,
            column_width: config.column_width,
        })
    }

    #[must_use]
    pub fn user(&self) -> &str {
        &self.user
    }

    /// Arguments passed to squeue.
    #[must_use]
    pub fn squeue_args(&self) -> Vec<String> {
        vec![
            "-u".to_string(),
            self.user.clone(),
            "--noheader".to_string(),
            "--array".to_string(),
            "--Format".to_string(),
            format_spec(self.column_width),
        ]
    }

    fn run_control(&self, action: JobAction, job_id: &str) -> Result<()> {
        let (bin, args): (&PathBuf, Vec<&str>) = match action {
            JobAction::Hold => (&self.scontrol_bin, vec!["hold", job_id]),
            JobAction::Release => (&self.scontrol_bin, vec!["release", job_id]),
            JobAction::Kill => (&self.scancel_bin, vec![job_id]),
        };
        let output = Command::new(bin)
            .args(&args)
            .output()
            .map_err(|error| SquidError::Mutation {
                action: action.label(),
                job_id: job_id.to_string(),
                details: format!("cannot run {}: {error}", bin.display()),
            })?;
        if output.status.success() {
            Ok(())
        } else {
            Err(SquidError::Mutation {
                action: action.label(),
                job_id: job_id.to_string(),
                details: format!(
                    "{} {} exited with {}: {}",
                    bin.display(),
                    args.join(" "),
                    output.status.code().unwrap_or(-1),
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            })
        }
    }
}

impl Scheduler for SlurmScheduler {
    fn query_queue(&self) -> Result<String> {
        let args = self.squeue_args();
        let command = format!("{} -u {}", self.squeue_bin.display(), self.user);
        let output = Command::new(&self.squeue_bin)
            .args(&args)
            .output()
            .map_err(|error| SquidError::QueueQuery {
                command: command.clone(),
                details: error.to_string(),
            })?;
        if !output.status.success() {
            return Err(SquidError::QueueQuery {
                command,
                details: format!(
                    "exit {}: {}",
                    output.status.code().unwrap_or(-1),
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }
        String::from_utf8(output.stdout).map_err(|error| SquidError::QueueQuery {
            command,
            details: format!("output is not UTF-8: {error}"),
        })
    }

    fn hold_job(&self, job_id: &str) -> Result<()> {
        self.run_control(JobAction::Hold, job_id)
    }

    fn release_job(&self, job_id: &str) -> Result<()> {
        self.run_control(JobAction::Release, job_id)
    }

    fn kill_job(&self, job_id: &str) -> Result<()> {
        self.run_control(JobAction::Kill, job_id)
    }
}

/// `--Format` argument: every column padded to `width`.
#[must_use]
pub fn format_spec(width: usize) -> String {
    SQUEUE_COLUMNS
        .iter()
        .map(|column| format!("{column}:{width}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Login name of the invoking user: `$USER`, `$LOGNAME`, then the passwd entry.
pub fn current_user() -> Result<String> {
    resolve_user(|var| env::var(var).ok(), passwd_user)
}

fn resolve_user<L, P>(lookup: L, passwd: P) -> Result<String>
where
    L: Fn(&str) -> Option<String>,
    P: FnOnce() -> Option<String>,
{
    ["USER", "LOGNAME"]
        .into_iter()
        .find_map(|var| lookup(var).filter(|v| !v.trim().is_empty()))
        .or_else(passwd)
        .filter(|name| !name.trim().is_empty())
        .ok_or_else(|| SquidError::InvalidConfig {
            details: "cannot determine the current user; set scheduler.user or SQUID_USER"
                .to_string(),
        })
}

#[cfg(unix)]
fn passwd_user() -> Option<String> {
    nix::unistd::User::from_uid(nix::unistd::getuid())
        .ok()
        .flatten()
        .map(|user| user.name)
}

#[cfg(not(unix))]
fn passwd_user() -> Option<String> {
    None
}

/// In-memory scheduler for deterministic tests and demos.
#[derive(Debug, Default)]
pub struct MockScheduler {
    queue: Mutex<String>,
    query_failure: Mutex<Option<String>>,
    failing_ids: Mutex<HashSet<String>>,
    queries: Mutex<usize>,
    calls: Mutex<Vec<(JobAction, String)>>,
}

impl MockScheduler {
    /// Scheduler whose queue listing is `raw`.
    #[must_use]
    pub fn with_queue(raw: impl Into<String>) -> Self {
        let mock = Self::default();
        mock.set_queue(raw);
        mock
    }

    /// Replace the listing returned by the next queries.
    pub fn set_queue(&self, raw: impl Into<String>) {
        *self.queue.lock() = raw.into();
        *self.query_failure.lock() = None;
    }

    /// Make the next queries fail with `details`.
    pub fn fail_queries(&self, details: impl Into<String>) {
        *self.query_failure.lock() = Some(details.into());
    }

    /// Make every mutation on `job_id` fail.
    pub fn fail_job(&self, job_id: impl Into<String>) {
        self.failing_ids.lock().insert(job_id.into());
    }

    /// Number of queue queries issued so far.
    #[must_use]
    pub fn query_count(&self) -> usize {
        *self.queries.lock()
    }

    /// Mutations issued so far, in order (including failed ones).
    #[must_use]
    pub fn calls(&self) -> Vec<(JobAction, String)> {
        self.calls.lock().clone()
    }

    fn record(&self, action: JobAction, job_id: &str) -> Result<()> {
        self.calls.lock().push((action, job_id.to_string()));
        if self.failing_ids.lock().contains(job_id) {
            return Err(SquidError::Mutation {
                action: action.label(),
                job_id: job_id.to_string(),
                details: "mock failure".to_string(),
            });
        }
        Ok(())
    }
}

impl Scheduler for MockScheduler {
    fn query_queue(&self) -> Result<String> {
        *self.queries.lock() += 1;
        if let Some(details) = self.query_failure.lock().clone() {
            return Err(SquidError::QueueQuery {
                command: "mock squeue".to_string(),
                details,
            });
        }
        Ok(self.queue.lock().clone())
    }

    fn hold_job(&self, job_id: &str) -> Result<()> {
        self.record(JobAction::Hold, job_id)
    }

    fn release_job(&self, job_id: &str) -> Result<()> {
        self.record(JobAction::Release, job_id)
    }

    fn kill_job(&self, job_id: &str) -> Result<()> {
        self.record(JobAction::Kill, job_id)
    }
}
