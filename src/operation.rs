//! Per-repository units of work and the git/gh boundary.
//!
//! All assumptions about git and gh output formats live in this module. Everything
//! downstream sees only [`OperationResult`].
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{FailureKind, OperationFailure};
use crate::repo::Repository;
use crate::util::exec::{ExecError, ExecOutput, ExecRequest, ExecService};
use crate::util::excerpt;

const DETAIL_MAX_CHARS: usize = 160;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Phase {
    /// Answerable from on-disk state; runs first for every repository.
    Local,
    /// Remote access or working-tree writes; only after the repository's local phase.
    Network,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Task {
    LocalStatus,
    RemoteSync,
    Checkout { branch: String, create: bool },
    Pull,
}

impl Task {
    pub fn name(&self) -> &'static str {
        match self {
            Task::LocalStatus => "status",
            Task::RemoteSync => "sync",
            Task::Checkout { .. } => "checkout",
            Task::Pull => "pull",
        }
    }

    pub fn phase(&self) -> Phase {
        match self {
            Task::LocalStatus => Phase::Local,
            Task::RemoteSync | Task::Checkout { .. } | Task::Pull => Phase::Network,
        }
    }

    /// Talks to a remote; a timeout is retried once.
    pub fn is_network(&self) -> bool {
        match self {
            Task::RemoteSync | Task::Pull => true,
            Task::LocalStatus | Task::Checkout { .. } => false,
        }
    }

    /// Results may be served from the cache while the fingerprint holds.
    pub fn is_cacheable(&self) -> bool {
        match self {
            Task::LocalStatus => true,
            Task::RemoteSync | Task::Checkout { .. } | Task::Pull => false,
        }
    }

    /// Writes to the working tree; a success drops cached entries for the repository.
    pub fn invalidates_cache(&self) -> bool {
        match self {
            Task::Checkout { .. } | Task::Pull => true,
            Task::LocalStatus | Task::RemoteSync => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalStatus {
    pub branch: String,
    pub detached: bool,
    /// Porcelain entries with unstaged or untracked changes.
    pub unstaged: u32,
    /// All porcelain entries, staged included.
    pub changed: u32,
}

impl LocalStatus {
    pub fn dirty(&self) -> bool {
        self.changed > 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncState {
    Synced,
    Ahead,
    Behind,
    Diverged,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteStatus {
    pub state: SyncState,
    pub ahead: u32,
    pub behind: u32,
    pub pull_request: Option<PullRequest>,
    pub web_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutSummary {
    pub branch: String,
    pub created: bool,
    pub tracking: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PullOutcome {
    UpToDate,
    FastForward,
    Merged,
    Updated,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullSummary {
    pub outcome: PullOutcome,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Payload {
    Status(LocalStatus),
    Sync(RemoteStatus),
    Checkout(CheckoutSummary),
    Pull(PullSummary),
}

/// Outcome of one task. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperationResult {
    Success(Payload),
    Failure(OperationFailure),
}

impl OperationResult {
    pub fn is_success(&self) -> bool {
        matches!(self, OperationResult::Success(_))
    }

    pub fn failure(&self) -> Option<&OperationFailure> {
        match self {
            OperationResult::Failure(f) => Some(f),
            OperationResult::Success(_) => None,
        }
    }

    pub fn local_status(&self) -> Option<&LocalStatus> {
        match self {
            OperationResult::Success(Payload::Status(s)) => Some(s),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self.failure(), Some(f) if f.kind == FailureKind::Timeout)
    }
}

/// Executes one task against one repository. `local` carries the repository's
/// phase-1 status for second-phase tasks.
pub trait TaskRunner: Sync {
    fn execute(&self, repo: &Repository, task: &Task, local: Option<&LocalStatus>)
        -> OperationResult;
}

#[derive(Debug, Clone)]
pub struct GitRunner {
    exec: ExecService,
    git: PathBuf,
    gh: Option<PathBuf>,
    local_timeout: Duration,
    network_timeout: Duration,
}

impl GitRunner {
    pub fn new(
        git: PathBuf,
        gh: Option<PathBuf>,
        local_timeout: Duration,
        network_timeout: Duration,
    ) -> Self {
        Self {
            exec: ExecService::new(local_timeout),
            git,
            gh,
            local_timeout,
            network_timeout,
        }
    }

    fn request(
        &self,
        program: &Path,
        repo: &Repository,
        args: &[&str],
        timeout: Duration,
    ) -> ExecRequest {
        ExecRequest::new(program.as_os_str())
            .args(args.iter().copied())
            .cwd(&repo.path)
            .env("LC_ALL", "C")
            .env("GIT_TERMINAL_PROMPT", "0")
            .env("GIT_OPTIONAL_LOCKS", "0")
            .env("GH_PROMPT_DISABLED", "1")
            .timeout(timeout)
    }

    /// Run git; a non-zero exit or a timeout becomes an [`OperationFailure`].
    fn git_ok(
        &self,
        repo: &Repository,
        task: &Task,
        args: &[&str],
        timeout: Duration,
    ) -> Result<ExecOutput, OperationFailure> {
        let out = self
            .exec
            .run(self.request(&self.git, repo, args, timeout))
            .map_err(|e| exec_failure(repo, task, &e))?;
        if out.success() {
            Ok(out)
        } else {
            Err(exit_failure(repo, task, &out))
        }
    }

    /// Run git where a non-zero exit is an answer ("no such ref"), not a failure.
    fn git_probe(
        &self,
        repo: &Repository,
        task: &Task,
        args: &[&str],
        timeout: Duration,
    ) -> Result<Option<String>, OperationFailure> {
        let out = self
            .exec
            .run(self.request(&self.git, repo, args, timeout))
            .map_err(|e| exec_failure(repo, task, &e))?;
        Ok(out.success().then(|| out.stdout_trimmed().to_string()))
    }

    fn gh_stdout(&self, repo: &Repository, args: &[&str]) -> Option<String> {
        let gh = self.gh.as_ref()?;
        match self.exec.run(self.request(gh, repo, args, self.network_timeout)) {
            Ok(out) if out.success() => Some(out.stdout_trimmed().to_string()),
            Ok(out) => {
                tracing::debug!(repo = %repo.rel_path, code = ?out.status.code(), stderr = %excerpt(&out.stderr, DETAIL_MAX_CHARS), "gh failed");
                None
            }
            Err(e) => {
                tracing::debug!(repo = %repo.rel_path, error = %e, "gh not usable");
                None
            }
        }
    }

    fn local_status(&self, repo: &Repository, task: &Task) -> Result<Payload, OperationFailure> {
        let t = self.local_timeout;
        let branch_out = self.git_ok(repo, task, &["branch", "--show-current"], t)?;
        let branch = branch_out.stdout_trimmed();
        let status_out = self.git_ok(repo, task, &["status", "--porcelain"], t)?;
        let (unstaged, changed) = parse_porcelain(&status_out.stdout);
        Ok(Payload::Status(LocalStatus {
            branch: if branch.is_empty() { "detached".to_string() } else { branch.to_string() },
            detached: branch.is_empty(),
            unstaged,
            changed,
        }))
    }

    fn remote_sync(
        &self,
        repo: &Repository,
        task: &Task,
        local: Option<&LocalStatus>,
    ) -> Result<Payload, OperationFailure> {
        let web_url = self
            .gh_stdout(repo, &["repo", "view", "--json", "url"])
            .and_then(|s| parse_repo_url(&s));

        let branch = match local {
            Some(l) if !l.detached => l.branch.clone(),
            _ => {
                return Ok(Payload::Sync(RemoteStatus {
                    state: SyncState::Unknown,
                    ahead: 0,
                    behind: 0,
                    pull_request: None,
                    web_url,
                }))
            }
        };

        let net = self.network_timeout;
        let fetch = self
            .exec
            .run(self.request(&self.git, repo, &["fetch", "--quiet"], net))
            .map_err(|e| exec_failure(repo, task, &e))?;
        if !fetch.success() {
            // Compare against the last fetched remote refs.
            tracing::debug!(repo = %repo.rel_path, stderr = %excerpt(&fetch.stderr, DETAIL_MAX_CHARS), "fetch failed");
        }

        let local_ref = format!("refs/heads/{branch}");
        let remote_ref = format!("refs/remotes/origin/{branch}");
        let t = self.local_timeout;
        let (state, ahead, behind) =
            match self.git_probe(repo, task, &["rev-parse", "--verify", "--quiet", &local_ref], t)? {
                None => (SyncState::Unknown, 0, 0),
                Some(local_sha) => {
                    match self.git_probe(repo, task, &["rev-parse", "--verify", "--quiet", &remote_ref], t)? {
                        None => (SyncState::Ahead, 1, 0),
                        Some(remote_sha) if remote_sha == local_sha => (SyncState::Synced, 0, 0),
                        Some(_) => {
                            let range = format!("{local_ref}...{remote_ref}");
                            let out = self.git_ok(
                                repo,
                                task,
                                &["rev-list", "--left-right", "--count", &range],
                                t,
                            )?;
                            let (ahead, behind) = parse_left_right(out.stdout_trimmed());
                            (sync_state_for(ahead, behind), ahead, behind)
                        }
                    }
                }
            };

        let pull_request = self
            .gh_stdout(
                repo,
                &["pr", "list", "--head", &branch, "--json", "number,url", "--limit", "1"],
            )
            .and_then(|s| parse_pr_list(&s));

        Ok(Payload::Sync(RemoteStatus {
            state,
            ahead,
            behind,
            pull_request,
            web_url,
        }))
    }

    fn checkout(
        &self,
        repo: &Repository,
        task: &Task,
        branch: &str,
        create: bool,
        local: Option<&LocalStatus>,
    ) -> Result<Payload, OperationFailure> {
        if branch.is_empty() || branch.starts_with('-') || branch.contains(char::is_whitespace) {
            return Err(failure(
                repo,
                task,
                FailureKind::BranchNotFound,
                None,
                format!("invalid branch name '{branch}'"),
            ));
        }
        if local.map(|l| !l.detached && l.branch == branch).unwrap_or(false) {
            return Ok(Payload::Checkout(CheckoutSummary {
                branch: branch.to_string(),
                created: false,
                tracking: None,
                message: format!("Already on '{branch}'"),
            }));
        }

        let t = self.local_timeout;
        let listed = self.git_ok(repo, task, &["branch", "--list", branch], t)?;
        if !listed.stdout_trimmed().is_empty() {
            self.git_ok(repo, task, &["checkout", branch, "--"], t)?;
            return Ok(Payload::Checkout(CheckoutSummary {
                branch: branch.to_string(),
                created: false,
                tracking: None,
                message: format!("Switched to branch '{branch}'"),
            }));
        }

        let upstream = format!("origin/{branch}");
        let remote = self.git_ok(repo, task, &["branch", "-r", "--list", &upstream], t)?;
        if !remote.stdout_trimmed().is_empty() {
            self.git_ok(repo, task, &["checkout", "-b", branch, "--track", &upstream], t)?;
            return Ok(Payload::Checkout(CheckoutSummary {
                branch: branch.to_string(),
                created: true,
                tracking: Some(upstream.clone()),
                message: format!("Created and switched to branch '{branch}' tracking {upstream}"),
            }));
        }

        if !create {
            return Err(failure(
                repo,
                task,
                FailureKind::BranchNotFound,
                None,
                format!("branch '{branch}' not found locally or on origin"),
            ));
        }
        self.git_ok(repo, task, &["checkout", "-b", branch], t)?;
        Ok(Payload::Checkout(CheckoutSummary {
            branch: branch.to_string(),
            created: true,
            tracking: None,
            message: format!("Created and switched to new branch '{branch}'"),
        }))
    }

    fn pull(&self, repo: &Repository, task: &Task) -> Result<Payload, OperationFailure> {
        let out = self
            .exec
            .run(self.request(&self.git, repo, &["pull"], self.network_timeout))
            .map_err(|e| exec_failure(repo, task, &e))?;
        if !out.success() {
            // Conflict summaries go to stdout; look there first.
            let combined = format!("{}\n{}", out.stdout, out.stderr);
            return Err(failure(
                repo,
                task,
                FailureKind::CommandError,
                out.status.code(),
                excerpt(&combined, DETAIL_MAX_CHARS),
            ));
        }
        let outcome = parse_pull_outcome(&out.stdout);
        Ok(Payload::Pull(PullSummary {
            outcome,
            message: pull_message(outcome).to_string(),
        }))
    }
}

impl TaskRunner for GitRunner {
    fn execute(
        &self,
        repo: &Repository,
        task: &Task,
        local: Option<&LocalStatus>,
    ) -> OperationResult {
        if !repo.is_repository() {
            return OperationResult::Failure(failure(
                repo,
                task,
                FailureKind::NotARepository,
                None,
                "no .git marker".to_string(),
            ));
        }
        let res = match task {
            Task::LocalStatus => self.local_status(repo, task),
            Task::RemoteSync => self.remote_sync(repo, task, local),
            Task::Checkout { branch, create } => self.checkout(repo, task, branch, *create, local),
            Task::Pull => self.pull(repo, task),
        };
        match res {
            Ok(p) => OperationResult::Success(p),
            Err(f) => OperationResult::Failure(f),
        }
    }
}

fn failure(
    repo: &Repository,
    task: &Task,
    kind: FailureKind,
    exit_code: Option<i32>,
    detail: String,
) -> OperationFailure {
    OperationFailure {
        kind,
        task: task.name().to_string(),
        repository: repo.path.clone(),
        exit_code,
        detail,
    }
}

fn exec_failure(repo: &Repository, task: &Task, e: &ExecError) -> OperationFailure {
    let kind = match e {
        ExecError::TimedOut { .. } => FailureKind::Timeout,
        ExecError::Spawn { .. } | ExecError::Wait { .. } => FailureKind::CommandError,
    };
    failure(repo, task, kind, None, e.to_string())
}

fn exit_failure(repo: &Repository, task: &Task, out: &ExecOutput) -> OperationFailure {
    let detail = if out.stderr.trim().is_empty() {
        excerpt(&out.stdout, DETAIL_MAX_CHARS)
    } else {
        excerpt(&out.stderr, DETAIL_MAX_CHARS)
    };
    failure(repo, task, FailureKind::CommandError, out.status.code(), detail)
}

/// Count `git status --porcelain` entries: (unstaged-or-untracked, all).
pub fn parse_porcelain(output: &str) -> (u32, u32) {
    let mut unstaged = 0u32;
    let mut changed = 0u32;
    for line in output.lines() {
        let b = line.as_bytes();
        if b.len() < 2 {
            continue;
        }
        changed += 1;
        if b[0] == b'?' || matches!(b[1], b'M' | b'D' | b'A' | b'?') {
            unstaged += 1;
        }
    }
    (unstaged, changed)
}

/// Parse `rev-list --left-right --count A...B` output: "<ahead>\t<behind>".
pub fn parse_left_right(output: &str) -> (u32, u32) {
    let mut it = output.split_whitespace().map(|t| t.parse::<u32>().unwrap_or(0));
    let ahead = it.next().unwrap_or(0);
    let behind = it.next().unwrap_or(0);
    (ahead, behind)
}

pub fn sync_state_for(ahead: u32, behind: u32) -> SyncState {
    match (ahead > 0, behind > 0) {
        (true, true) => SyncState::Diverged,
        (true, false) => SyncState::Ahead,
        (false, true) => SyncState::Behind,
        (false, false) => SyncState::Synced,
    }
}

pub fn parse_pull_outcome(stdout: &str) -> PullOutcome {
    if stdout.contains("Already up to date") || stdout.contains("Already up-to-date") {
        PullOutcome::UpToDate
    } else if stdout.lines().any(|l| l.trim() == "Fast-forward") {
        PullOutcome::FastForward
    } else if stdout.contains("Merge made by") {
        PullOutcome::Merged
    } else {
        PullOutcome::Updated
    }
}

fn pull_message(outcome: PullOutcome) -> &'static str {
    match outcome {
        PullOutcome::UpToDate => "Already up to date",
        PullOutcome::FastForward => "Fast-forwarded",
        PullOutcome::Merged => "Merged remote changes",
        PullOutcome::Updated => "Updated",
    }
}

#[derive(Deserialize)]
struct GhPr {
    number: u64,
    url: String,
}

#[derive(Deserialize)]
struct GhRepo {
    url: String,
}

/// First entry of `gh pr list --json number,url`.
pub fn parse_pr_list(json: &str) -> Option<PullRequest> {
    let prs: Vec<GhPr> = serde_json::from_str(json).ok()?;
    prs.into_iter().next().map(|p| PullRequest {
        number: p.number,
        url: p.url,
    })
}

pub fn parse_repo_url(json: &str) -> Option<String> {
    serde_json::from_str::<GhRepo>(json)
        .ok()
        .map(|r| r.url)
        .filter(|u| !u.is_empty())
}
