//! Two-phase bounded worker pool over the repository set.
//!
//! Phase 1 runs the local task for every repository; phase 2 starts only after every
//! phase-1 job has finished and runs the second task for repositories whose local result
//! succeeded. Completions are streamed as [`FleetEvent`]s; the returned [`FleetRun`] holds
//! the same results in scanner order.
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::cache::{repo_fingerprint, CacheKey, ResultCache};
use crate::config::FleetConfig;
use crate::errors::{OperationFailure, EXIT_FAILURES, EXIT_INTERRUPTED, EXIT_OK};
use crate::operation::{LocalStatus, OperationResult, Phase, Task, TaskRunner};
use crate::repo::Repository;
use crate::signal;

/// Stops dispatch of new jobs. In-flight jobs run to completion or their own timeout.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    watch_interrupt: bool,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token that also trips once SIGINT has been received (see [`signal::install_interrupt_handler`]).
    pub fn on_interrupt() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            watch_interrupt: true,
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst) || (self.watch_interrupt && signal::interrupted())
    }
}

/// What runs in each phase for one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FleetPlan {
    pub local: Task,
    pub second: Option<Task>,
}

impl FleetPlan {
    pub fn status(local_only: bool) -> Self {
        Self {
            local: Task::LocalStatus,
            second: (!local_only).then_some(Task::RemoteSync),
        }
    }

    pub fn checkout(branch: impl Into<String>, create: bool) -> Self {
        Self {
            local: Task::LocalStatus,
            second: Some(Task::Checkout {
                branch: branch.into(),
                create,
            }),
        }
    }

    pub fn pull() -> Self {
        Self {
            local: Task::LocalStatus,
            second: Some(Task::Pull),
        }
    }

    pub fn is_status(&self) -> bool {
        matches!(self.second, None | Some(Task::RemoteSync))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Not dispatched before cancellation.
    Interrupted,
    /// Second phase not run because the local task failed.
    LocalFailed,
}

#[derive(Debug, Clone)]
pub enum FleetEvent {
    Completed {
        index: usize,
        phase: Phase,
        result: OperationResult,
        cached: bool,
    },
    Skipped {
        index: usize,
        phase: Phase,
        reason: SkipReason,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskState {
    NotPlanned,
    Pending,
    Done {
        result: OperationResult,
        cached: bool,
    },
    Skipped(SkipReason),
}

impl TaskState {
    pub fn result(&self) -> Option<&OperationResult> {
        match self {
            TaskState::Done { result, .. } => Some(result),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict<'a> {
    Succeeded,
    Failed(&'a OperationFailure),
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoOutcome {
    pub local: TaskState,
    pub second: TaskState,
}

impl RepoOutcome {
    fn new(plan: &FleetPlan) -> Self {
        Self {
            local: TaskState::Pending,
            second: if plan.second.is_some() {
                TaskState::Pending
            } else {
                TaskState::NotPlanned
            },
        }
    }

    pub fn state(&self, phase: Phase) -> &TaskState {
        match phase {
            Phase::Local => &self.local,
            Phase::Network => &self.second,
        }
    }

    fn state_mut(&mut self, phase: Phase) -> &mut TaskState {
        match phase {
            Phase::Local => &mut self.local,
            Phase::Network => &mut self.second,
        }
    }

    /// The result that decides the repository's outcome: a local failure, else the
    /// second-phase result, else the local result when no second phase was planned.
    pub fn final_result(&self) -> Option<&OperationResult> {
        match (&self.local, &self.second) {
            (TaskState::Done { result, .. }, _) if !result.is_success() => Some(result),
            (_, TaskState::Done { result, .. }) => Some(result),
            (TaskState::Done { result, .. }, TaskState::NotPlanned) => Some(result),
            _ => None,
        }
    }

    pub fn verdict(&self) -> Verdict<'_> {
        match self.final_result() {
            Some(OperationResult::Success(_)) => Verdict::Succeeded,
            Some(OperationResult::Failure(f)) => Verdict::Failed(f),
            None => Verdict::Skipped,
        }
    }

    pub fn cache_hit(&self) -> bool {
        matches!(self.local, TaskState::Done { cached: true, .. })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub total: usize,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} succeeded, {} failed, {} skipped (of {})",
            self.succeeded, self.failed, self.skipped, self.total
        )
    }
}

/// All outcomes of one invocation, indexed like the scanned repository list.
#[derive(Debug, Clone)]
pub struct FleetRun {
    pub outcomes: Vec<RepoOutcome>,
    pub interrupted: bool,
    pub elapsed: Duration,
}

impl FleetRun {
    pub fn summary(&self) -> RunSummary {
        let mut s = RunSummary {
            total: self.outcomes.len(),
            ..RunSummary::default()
        };
        for o in &self.outcomes {
            match o.verdict() {
                Verdict::Succeeded => s.succeeded += 1,
                Verdict::Failed(_) => s.failed += 1,
                Verdict::Skipped => s.skipped += 1,
            }
        }
        s
    }

    pub fn exit_code(&self) -> u8 {
        let s = self.summary();
        if self.interrupted {
            EXIT_INTERRUPTED
        } else if s.failed + s.skipped > 0 {
            EXIT_FAILURES
        } else {
            EXIT_OK
        }
    }
}

pub struct FleetScheduler<'a> {
    config: &'a FleetConfig,
    cache: &'a ResultCache,
    cancel: CancelToken,
}

impl<'a> FleetScheduler<'a> {
    pub fn new(config: &'a FleetConfig, cache: &'a ResultCache, cancel: CancelToken) -> Self {
        Self {
            config,
            cache,
            cancel,
        }
    }

    pub fn run<R>(
        &self,
        repos: &[Repository],
        plan: &FleetPlan,
        runner: &R,
        events: &Sender<FleetEvent>,
    ) -> FleetRun
    where
        R: TaskRunner + ?Sized,
    {
        let started = Instant::now();
        let mut outcomes: Vec<RepoOutcome> = repos.iter().map(|_| RepoOutcome::new(plan)).collect();

        let all: Vec<usize> = (0..repos.len()).collect();
        let local = self.run_phase(Phase::Local, all, events, |i| {
            self.run_local(&repos[i], &plan.local, runner)
        });
        for (i, state) in local {
            outcomes[i].local = state;
        }

        if let Some(second) = plan.second.as_ref() {
            let mut ready = Vec::new();
            for (i, o) in outcomes.iter_mut().enumerate() {
                let reason = match &o.local {
                    TaskState::Done { result, .. } if result.is_success() => {
                        ready.push(i);
                        continue;
                    }
                    TaskState::Done { .. } => SkipReason::LocalFailed,
                    _ => SkipReason::Interrupted,
                };
                o.second = TaskState::Skipped(reason);
                let _ = events.send(FleetEvent::Skipped {
                    index: i,
                    phase: Phase::Network,
                    reason,
                });
            }

            let snapshot = &outcomes;
            let results = self.run_phase(Phase::Network, ready, events, |i| {
                let local = snapshot[i].local.result().and_then(OperationResult::local_status);
                self.run_second(&repos[i], second, local, runner)
            });
            for (i, state) in results {
                *outcomes[i].state_mut(Phase::Network) = state;
            }
        }

        let interrupted = self.cancel.is_cancelled();
        if interrupted {
            tracing::debug!("run interrupted; undispatched repositories were skipped");
        }
        FleetRun {
            outcomes,
            interrupted,
            elapsed: started.elapsed(),
        }
    }

    /// Drain `jobs` (in order) with the phase's worker count. Jobs left in the queue after
    /// cancellation come back as skipped.
    fn run_phase<F>(
        &self,
        phase: Phase,
        jobs: Vec<usize>,
        events: &Sender<FleetEvent>,
        work: F,
    ) -> Vec<(usize, TaskState)>
    where
        F: Fn(usize) -> (OperationResult, bool) + Sync,
    {
        if jobs.is_empty() {
            return Vec::new();
        }
        let workers = self.config.workers_for(phase).min(jobs.len());
        tracing::debug!(?phase, jobs = jobs.len(), workers, "phase started");

        let queue = Mutex::new(jobs.into_iter().collect::<VecDeque<usize>>());
        let done: Mutex<Vec<(usize, TaskState)>> = Mutex::new(Vec::new());

        std::thread::scope(|s| {
            for _ in 0..workers {
                let events = events.clone();
                let (queue, done, work) = (&queue, &done, &work);
                s.spawn(move || loop {
                    if self.cancel.is_cancelled() {
                        break;
                    }
                    let next = queue
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .pop_front();
                    let Some(index) = next else {
                        break;
                    };
                    let (result, cached) = work(index);
                    let _ = events.send(FleetEvent::Completed {
                        index,
                        phase,
                        result: result.clone(),
                        cached,
                    });
                    done.lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .push((index, TaskState::Done { result, cached }));
                });
            }
        });

        let mut out = done.into_inner().unwrap_or_else(PoisonError::into_inner);
        for index in queue.into_inner().unwrap_or_else(PoisonError::into_inner) {
            let _ = events.send(FleetEvent::Skipped {
                index,
                phase,
                reason: SkipReason::Interrupted,
            });
            out.push((index, TaskState::Skipped(SkipReason::Interrupted)));
        }
        out
    }

    fn run_local<R>(&self, repo: &Repository, task: &Task, runner: &R) -> (OperationResult, bool)
    where
        R: TaskRunner + ?Sized,
    {
        if !task.is_cacheable() {
            return (self.execute(repo, task, None, runner), false);
        }
        let Some(fingerprint) = repo_fingerprint(&repo.path) else {
            return (self.execute(repo, task, None, runner), false);
        };
        let key = CacheKey::new(repo, task, fingerprint);
        if let Some(hit) = self.cache.get(&key) {
            tracing::debug!(repo = %repo.rel_path, task = task.name(), "cache hit");
            return (hit, true);
        }
        let result = self.execute(repo, task, None, runner);
        if result.is_success() {
            self.cache.put(&key, result.clone());
        }
        (result, false)
    }

    fn run_second<R>(
        &self,
        repo: &Repository,
        task: &Task,
        local: Option<&LocalStatus>,
        runner: &R,
    ) -> (OperationResult, bool)
    where
        R: TaskRunner + ?Sized,
    {
        let result = self.execute(repo, task, local, runner);
        if result.is_success() && task.invalidates_cache() {
            self.cache.invalidate(&repo.path);
        }
        (result, false)
    }

    /// One invocation; a network task that timed out gets one more attempt.
    fn execute<R>(
        &self,
        repo: &Repository,
        task: &Task,
        local: Option<&LocalStatus>,
        runner: &R,
    ) -> OperationResult
    where
        R: TaskRunner + ?Sized,
    {
        let first = runner.execute(repo, task, local);
        if task.is_network() && first.is_timeout() && !self.cancel.is_cancelled() {
            tracing::info!(repo = %repo.rel_path, task = task.name(), "timed out; retrying once");
            return runner.execute(repo, task, local);
        }
        first
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::FailureKind;
    use crate::operation::{Payload, RemoteStatus, SyncState};
    use std::path::PathBuf;
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc;

    fn repos(names: &[&str]) -> Vec<Repository> {
        names
            .iter()
            .map(|n| Repository::new(PathBuf::from(format!("/nowhere/{n}")), n.to_string(), n.to_string()))
            .collect()
    }

    fn fail(repo: &Repository, task: &Task, kind: FailureKind) -> OperationResult {
        OperationResult::Failure(OperationFailure {
            kind,
            task: task.name().to_string(),
            repository: repo.path.clone(),
            exit_code: None,
            detail: "scripted".to_string(),
        })
    }

    /// Fails status for "bad"; times out sync on the first call for "slow".
    struct Scripted {
        calls: AtomicUsize,
        slow_calls: AtomicUsize,
    }

    impl TaskRunner for Scripted {
        fn execute(&self, repo: &Repository, task: &Task, _l: Option<&LocalStatus>) -> OperationResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match (task, repo.rel_path.as_str()) {
                (Task::LocalStatus, "bad") => fail(repo, task, FailureKind::CommandError),
                (Task::LocalStatus, _) => OperationResult::Success(Payload::Status(LocalStatus {
                    branch: "main".to_string(),
                    detached: false,
                    unstaged: 0,
                    changed: 0,
                })),
                (Task::RemoteSync, "slow") if self.slow_calls.fetch_add(1, Ordering::SeqCst) == 0 => {
                    fail(repo, task, FailureKind::Timeout)
                }
                _ => OperationResult::Success(Payload::Sync(RemoteStatus {
                    state: SyncState::Synced,
                    ahead: 0,
                    behind: 0,
                    pull_request: None,
                    web_url: None,
                })),
            }
        }
    }

    fn scripted() -> Scripted {
        Scripted {
            calls: AtomicUsize::new(0),
            slow_calls: AtomicUsize::new(0),
        }
    }

    #[test]
    fn test_local_failure_skips_second_phase_and_is_final() {
        let cfg = FleetConfig::default();
        let cache = ResultCache::in_memory(None);
        let (tx, rx) = mpsc::channel();
        let rs = repos(&["a", "bad", "c"]);
        let run = FleetScheduler::new(&cfg, &cache, CancelToken::new()).run(&rs, &FleetPlan::status(false), &scripted(), &tx);
        drop(tx);

        assert_eq!(run.outcomes[1].second, TaskState::Skipped(SkipReason::LocalFailed));
        assert!(matches!(run.outcomes[1].verdict(), Verdict::Failed(f) if f.task == "status"));
        let s = run.summary();
        assert_eq!((s.succeeded, s.failed, s.skipped, s.total), (2, 1, 0, 3));
        assert_eq!(run.exit_code(), EXIT_FAILURES);
        // 3 local completions, 2 second-phase completions, 1 skip
        assert_eq!(rx.iter().count(), 6);
    }

    #[test]
    fn test_network_timeout_is_retried_once() {
        let cfg = FleetConfig::default();
        let cache = ResultCache::in_memory(None);
        let (tx, _rx) = mpsc::channel();
        let runner = scripted();
        let run = FleetScheduler::new(&cfg, &cache, CancelToken::new()).run(&repos(&["slow"]), &FleetPlan::status(false), &runner, &tx);
        assert_eq!(run.outcomes[0].verdict(), Verdict::Succeeded);
        assert_eq!(runner.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_cancelled_before_start_skips_everything() {
        let cfg = FleetConfig::default();
        let cache = ResultCache::in_memory(None);
        let (tx, _rx) = mpsc::channel();
        let cancel = CancelToken::new();
        cancel.cancel();
        let runner = scripted();
        let run = FleetScheduler::new(&cfg, &cache, cancel).run(&repos(&["a", "b"]), &FleetPlan::pull(), &runner, &tx);
        assert_eq!(runner.calls.load(Ordering::SeqCst), 0);
        assert!(run.interrupted);
        assert_eq!(run.summary().skipped, 2);
        assert_eq!(run.exit_code(), EXIT_INTERRUPTED);
        assert_eq!(run.outcomes[0].second, TaskState::Skipped(SkipReason::Interrupted));
    }

    #[test]
    fn test_local_only_plan_has_no_second_phase() {
        let plan = FleetPlan::status(true);
        assert!(plan.second.is_none() && plan.is_status());
        assert!(!FleetPlan::pull().is_status());
        let cfg = FleetConfig::default();
        let cache = ResultCache::in_memory(None);
        let (tx, _rx) = mpsc::channel();
        let run = FleetScheduler::new(&cfg, &cache, CancelToken::new()).run(&repos(&["a"]), &plan, &scripted(), &tx);
        assert_eq!(run.outcomes[0].second, TaskState::NotPlanned);
        assert_eq!(run.exit_code(), EXIT_OK);
    }

    #[test]
    fn test_summary_display() {
        let s = RunSummary {
            succeeded: 2,
            failed: 1,
            skipped: 0,
            total: 3,
        };
        assert_eq!(s.to_string(), "2 succeeded, 1 failed, 0 skipped (of 3)");
    }
}
