#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};
use std::time::{SystemTime, UNIX_EPOCH};

pub struct CmdResult {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
    pub log_path: PathBuf,
}

fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis())
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

fn resolve_bin_path() -> PathBuf {
    if let Ok(path) = std::env::var("CARGO_BIN_EXE_squid") {
        return PathBuf::from(path);
    }

    let exe_name = if cfg!(windows) { "squid.exe" } else { "squid" };
    let fallback = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(PathBuf::from))
        .and_then(|deps| deps.parent().map(PathBuf::from))
        .map(|debug_dir| debug_dir.join(exe_name));

    match fallback {
        Some(path) if path.exists() => path,
        _ => panic!("unable to resolve squid binary path for integration test"),
    }
}

/// Run the squid binary with `args` and extra environment, logging the
/// transcript to a temp file for post-mortem.
pub fn run_cli_case(case_name: &str, args: &[&str], envs: &[(&str, &Path)]) -> CmdResult {
    let root = std::env::temp_dir().join("squid-test-logs");
    fs::create_dir_all(&root).expect("create temp test log dir");

    let log_path = root.join(format!("{}-{}.log", sanitize(case_name), now_millis()));
    let bin_path = resolve_bin_path();

    let mut command = Command::new(&bin_path);
    command
        .args(args)
        .env_remove("SQUID_OUTPUT_FORMAT")
        .env("RUST_BACKTRACE", "1");
    for (name, value) in envs {
        command.env(name, value);
    }
    let output = command.output().expect("execute squid command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();

    let mut log_content = String::new();
    log_content.push_str(&format!("case={case_name}\n"));
    log_content.push_str(&format!("bin={}\n", bin_path.display()));
    log_content.push_str(&format!("args={args:?}\n"));
    log_content.push_str(&format!("status={}\n", output.status));
    log_content.push_str("----- stdout -----\n");
    log_content.push_str(&stdout);
    log_content.push('\n');
    log_content.push_str("----- stderr -----\n");
    log_content.push_str(&stderr);
    log_content.push('\n');
    fs::write(&log_path, log_content).expect("write test log");

    CmdResult {
        status: output.status,
        stdout,
        stderr,
        log_path,
    }
}

/// squeue row with 11 columns, as printed with wide `--Format` padding.
pub fn squeue_row(id: &str, name: &str, state: &str) -> String {
    format!(
        "{id:<20}{name:<20}{:<20}{:<20}{:<20}{:<20}{:<20}{state:<20}{id:<20}{:<20}{:<20}",
        "batch",
        "0:42",
        "2024-03-05T10:00:00",
        "2024-03-05T10:05:00",
        "2024-03-06T10:05:00",
        "N/A",
        "node01"
    )
}

/// Fake `squeue`/`scontrol`/`scancel` in a temp dir, pointed at by `SQUID_*`
/// environment overrides. Every control call is appended to `calls.log`.
pub struct FakeSlurm {
    pub dir: tempfile::TempDir,
}

impl FakeSlurm {
    /// `queue` is printed verbatim by squeue; control calls on ids listed in
    /// `failing_ids` exit 1.
    pub fn new(queue: &str, failing_ids: &[&str]) -> Self {
        let dir = tempfile::tempdir().expect("create fake slurm dir");
        let calls = dir.path().join("calls.log");
        let queue_file = dir.path().join("queue.txt");
        fs::write(&queue_file, queue).expect("write queue fixture");

        write_script(
            &dir.path().join("squeue"),
            &format!(
                "echo \"squeue $*\" >> '{calls}'\ncat '{queue}'\n",
                calls = calls.display(),
                queue = queue_file.display()
            ),
        );

        let failing = failing_ids
            .iter()
            .map(|id| format!("  {id}) echo \"slurm error for {id}\" >&2; exit 1 ;;\n"))
            .collect::<String>();
        let control = |name: &str| {
            format!(
                "echo \"{name} $*\" >> '{calls}'\nfor last; do :; done\ncase \"$last\" in\n{failing}esac\nexit 0\n",
                calls = calls.display()
            )
        };
        write_script(&dir.path().join("scontrol"), &control("scontrol"));
        write_script(&dir.path().join("scancel"), &control("scancel"));

        Self { dir }
    }

    /// squeue that always fails.
    pub fn broken() -> Self {
        let fake = Self::new("", &[]);
        write_script(
            &fake.dir.path().join("squeue"),
            "echo 'slurm_load_jobs error: Unable to contact slurm controller' >&2\nexit 1\n",
        );
        fake
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Environment pointing squid at the fakes, a private HOME and log.
    pub fn env(&self) -> Vec<(&'static str, PathBuf)> {
        vec![
            ("SQUID_SQUEUE_BIN", self.path("squeue")),
            ("SQUID_SCONTROL_BIN", self.path("scontrol")),
            ("SQUID_SCANCEL_BIN", self.path("scancel")),
            ("SQUID_USER", PathBuf::from("alice")),
            ("SQUID_ACTIVITY_LOG", self.path("activity.jsonl")),
            ("HOME", self.dir.path().to_path_buf()),
        ]
    }

    pub fn run(&self, case_name: &str, args: &[&str]) -> CmdResult {
        let env = self.env();
        let refs: Vec<(&str, &Path)> = env.iter().map(|(k, v)| (*k, v.as_path())).collect();
        run_cli_case(case_name, args, &refs)
    }

    /// Control calls issued so far, one per line (`scancel 12`).
    pub fn control_calls(&self) -> Vec<String> {
        fs::read_to_string(self.path("calls.log"))
            .unwrap_or_default()
            .lines()
            .filter(|line| !line.starts_with("squeue"))
            .map(str::to_string)
            .collect()
    }

    pub fn squeue_calls(&self) -> Vec<String> {
        fs::read_to_string(self.path("calls.log"))
            .unwrap_or_default()
            .lines()
            .filter(|line| line.starts_with("squeue"))
            .map(str::to_string)
            .collect()
    }
}

#[cfg(unix)]
fn write_script(path: &Path, body: &str) {
    use std::os::unix::fs::PermissionsExt;

    fs::write(path, format!("#!/bin/sh\n{body}")).expect("write fake script");
    let mut perms = fs::metadata(path).expect("stat fake script").permissions();
    perms.set_mode(0o755);
    fs::set_permissions(path, perms).expect("chmod fake script");
}

#[cfg(not(unix))]
fn write_script(_path: &Path, _body: &str) {
    unimplemented!("fake slurm scripts need a POSIX shell");
}
