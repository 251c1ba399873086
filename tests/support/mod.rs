/*!
Test support helpers shared across integration tests.

- have_git(), git(), init_repo(): real repositories with an isolated HOME
- mgit(): run the built binary with color off
- fake_repos(), ScriptedRunner: in-process fleets for scheduler tests

Tests print their own "skipping: ..." line when git is unavailable.
*/
#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use mgit::{
    FailureKind, LocalStatus, OperationFailure, OperationResult, Payload, RemoteStatus,
    Repository, SyncState, Task, TaskRunner,
};

pub fn have_git() -> bool {
    Command::new("git")
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Isolate git from the user's configuration.
pub fn git_env(cmd: &mut Command, home: &Path) {
    cmd.env("HOME", home)
        .env("XDG_CONFIG_HOME", home.join(".config"))
        .env("GIT_CONFIG_NOSYSTEM", "1")
        .env("GIT_AUTHOR_NAME", "Mgit Test")
        .env("GIT_AUTHOR_EMAIL", "mgit@example.com")
        .env("GIT_COMMITTER_NAME", "Mgit Test")
        .env("GIT_COMMITTER_EMAIL", "mgit@example.com");
}

pub fn git(dir: &Path, home: &Path, args: &[&str]) -> Output {
    let mut cmd = Command::new("git");
    cmd.args(args).current_dir(dir);
    git_env(&mut cmd, home);
    let out = cmd.output().expect("spawn git");
    assert!(
        out.status.success(),
        "git {:?} failed in {}: {}",
        args,
        dir.display(),
        String::from_utf8_lossy(&out.stderr)
    );
    out
}

pub fn git_stdout(dir: &Path, home: &Path, args: &[&str]) -> String {
    String::from_utf8_lossy(&git(dir, home, args).stdout)
        .trim()
        .to_string()
}

/// `git init` with `branch` checked out and one commit of README.md.
pub fn init_repo(dir: &Path, home: &Path, branch: &str) {
    std::fs::create_dir_all(dir).expect("mkdir repo");
    git(dir, home, &["init", "-q"]);
    git(dir, home, &["symbolic-ref", "HEAD", &format!("refs/heads/{branch}")]);
    std::fs::write(dir.join("README.md"), "hello\n").expect("write");
    git(dir, home, &["add", "-A"]);
    git(dir, home, &["commit", "-q", "-m", "init"]);
}

/// Run the mgit binary in `root` with color off and a private HOME.
pub fn mgit(root: &Path, home: &Path, args: &[&str]) -> Output {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_mgit"));
    cmd.args(args)
        .current_dir(root)
        .env("NO_COLOR", "1")
        .env_remove("MGIT_LOG")
        .env_remove("RUST_LOG")
        .env_remove("MGIT_CACHE_TTL")
        .env_remove("MGIT_SCAN_DEPTH")
        .stdin(Stdio::null());
    git_env(&mut cmd, home);
    cmd.output().expect("spawn mgit")
}

pub fn stdout_of(out: &Output) -> String {
    String::from_utf8_lossy(&out.stdout).to_string()
}

pub fn stderr_of(out: &Output) -> String {
    String::from_utf8_lossy(&out.stderr).to_string()
}

/// The table row whose first column is `name`.
pub fn row<'a>(table: &'a str, name: &str) -> Option<&'a str> {
    table
        .lines()
        .find(|l| l.split_whitespace().next() == Some(name))
}

/// Fake repositories: directories holding a minimal `.git` so fingerprints resolve.
pub fn fake_repos(root: &Path, names: &[&str]) -> Vec<Repository> {
    names
        .iter()
        .map(|n| {
            let path = root.join(n);
            std::fs::create_dir_all(path.join(".git/refs/heads")).expect("mkdir .git");
            std::fs::write(path.join(".git/HEAD"), "ref: refs/heads/main\n").expect("HEAD");
            Repository::new(path, n.to_string(), n.to_string())
        })
        .collect()
}

pub fn set_head(repo: &Repository, branch: &str) {
    std::fs::write(
        repo.path.join(".git/HEAD"),
        format!("ref: refs/heads/{branch}\n"),
    )
    .expect("HEAD");
}

pub fn status_ok(branch: &str, unstaged: u32) -> OperationResult {
    OperationResult::Success(Payload::Status(LocalStatus {
        branch: branch.to_string(),
        detached: false,
        unstaged,
        changed: unstaged,
    }))
}

pub fn failure(repo: &Repository, task: &Task, kind: FailureKind) -> OperationResult {
    OperationResult::Failure(OperationFailure {
        kind,
        task: task.name().to_string(),
        repository: repo.path.clone(),
        exit_code: Some(1),
        detail: "scripted failure".to_string(),
    })
}

/// In-process stand-in for git. Records every invocation, tracks peak concurrency, and
/// answers from a per-repository script.
#[derive(Default)]
pub struct ScriptedRunner {
    pub log: Mutex<Vec<(String, &'static str)>>,
    pub delays: HashMap<String, Duration>,
    pub failing_status: Vec<String>,
    in_flight: AtomicUsize,
    pub peak: AtomicUsize,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, repo: &str, d: Duration) -> Self {
        self.delays.insert(repo.to_string(), d);
        self
    }

    pub fn failing(mut self, repo: &str) -> Self {
        self.failing_status.push(repo.to_string());
        self
    }

    pub fn calls(&self) -> Vec<(String, &'static str)> {
        self.log.lock().unwrap().clone()
    }

    pub fn count(&self, task: &str) -> usize {
        self.calls().iter().filter(|(_, t)| *t == task).count()
    }
}

impl TaskRunner for ScriptedRunner {
    fn execute(
        &self,
        repo: &Repository,
        task: &Task,
        _local: Option<&LocalStatus>,
    ) -> OperationResult {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        self.log
            .lock()
            .unwrap()
            .push((repo.rel_path.clone(), task.name()));
        if let Some(d) = self.delays.get(&repo.rel_path) {
            std::thread::sleep(*d);
        }
        let res = match task {
            Task::LocalStatus if self.failing_status.contains(&repo.rel_path) => {
                failure(repo, task, FailureKind::CommandError)
            }
            Task::LocalStatus => status_ok(&format!("{}-branch", repo.rel_path), 0),
            Task::RemoteSync => OperationResult::Success(Payload::Sync(RemoteStatus {
                state: SyncState::Synced,
                ahead: 0,
                behind: 0,
                pull_request: None,
                web_url: None,
            })),
            Task::Checkout { branch, .. } => {
                OperationResult::Success(Payload::Checkout(mgit::operation::CheckoutSummary {
                    branch: branch.clone(),
                    created: false,
                    tracking: None,
                    message: format!("Switched to branch '{branch}'"),
                }))
            }
            Task::Pull => OperationResult::Success(Payload::Pull(mgit::operation::PullSummary {
                outcome: mgit::operation::PullOutcome::UpToDate,
                message: "Already up to date".to_string(),
            })),
        };
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        res
    }
}

pub fn root_of(td: &tempfile::TempDir) -> PathBuf {
    td.path().canonicalize().expect("canonical tmpdir")
}
