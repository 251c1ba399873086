//! Run configuration: defaults, `MGIT_*` environment overrides, then CLI flags.
//!
//! | variable               | default | meaning                                   |
//! |------------------------|---------|-------------------------------------------|
//! | `MGIT_JOBS`            | 8       | worker threads for the local phase        |
//! | `MGIT_NETWORK_JOBS`    | 4       | cap on workers for the second phase       |
//! | `MGIT_LOCAL_TIMEOUT`   | 20s     | per-invocation timeout, local git calls   |
//! | `MGIT_NETWORK_TIMEOUT` | 60s     | per-invocation timeout, fetch/pull/gh     |
//! | `MGIT_CACHE_TTL`       | 10m     | freshness window for cached status; 0 = off |
//! | `MGIT_SCAN_DEPTH`      | 1       | directory levels scanned below the root   |
//! | `MGIT_ASCII`           | unset   | `1` selects ASCII spinner frames          |
use std::time::Duration;

use crate::operation::Phase;
use crate::scanner::{DEFAULT_SCAN_DEPTH, MAX_SCAN_DEPTH};

pub const DEFAULT_JOBS: usize = 8;
pub const DEFAULT_NETWORK_JOBS: usize = 4;
pub const DEFAULT_LOCAL_TIMEOUT: Duration = Duration::from_secs(20);
pub const DEFAULT_NETWORK_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(600);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FleetConfig {
    pub jobs: usize,
    pub network_jobs: usize,
    pub local_timeout: Duration,
    pub network_timeout: Duration,
    pub cache_ttl: Option<Duration>,
    pub scan_depth: usize,
    pub ascii: bool,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            jobs: DEFAULT_JOBS,
            network_jobs: DEFAULT_NETWORK_JOBS,
            local_timeout: DEFAULT_LOCAL_TIMEOUT,
            network_timeout: DEFAULT_NETWORK_TIMEOUT,
            cache_ttl: Some(DEFAULT_CACHE_TTL),
            scan_depth: DEFAULT_SCAN_DEPTH,
            ascii: false,
        }
    }
}

impl FleetConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Build from an arbitrary variable source. Invalid values are logged and ignored.
    pub fn from_lookup<F>(get: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        if let Some(n) = parse_count(&get, "MGIT_JOBS") {
            cfg.jobs = n;
        }
        if let Some(n) = parse_count(&get, "MGIT_NETWORK_JOBS") {
            cfg.network_jobs = n;
        }
        if let Some(d) = parse_duration(&get, "MGIT_LOCAL_TIMEOUT") {
            cfg.local_timeout = d;
        }
        if let Some(d) = parse_duration(&get, "MGIT_NETWORK_TIMEOUT") {
            cfg.network_timeout = d;
        }
        if let Some(d) = parse_duration(&get, "MGIT_CACHE_TTL") {
            cfg.cache_ttl = if d.is_zero() { None } else { Some(d) };
        }
        if let Some(n) = parse_count(&get, "MGIT_SCAN_DEPTH") {
            cfg.scan_depth = n.min(MAX_SCAN_DEPTH);
        }
        cfg.ascii = get("MGIT_ASCII").as_deref() == Some("1");
        cfg
    }

    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    /// `--no-parallel`: one worker in both phases, dispatch in scan order.
    pub fn sequential(mut self) -> Self {
        self.jobs = 1;
        self.network_jobs = 1;
        self
    }

    pub fn workers_for(&self, phase: Phase) -> usize {
        match phase {
            Phase::Local => self.jobs.max(1),
            Phase::Network => self.jobs.min(self.network_jobs).max(1),
        }
    }
}

fn parse_count<F: Fn(&str) -> Option<String>>(get: &F, key: &str) -> Option<usize> {
    let raw = get(key)?;
    match raw.trim().parse::<usize>() {
        Ok(n) if n >= 1 => Some(n),
        _ => {
            tracing::warn!(key, value = %raw, "ignoring invalid count");
            None
        }
    }
}

/// Accepts humantime syntax (`90s`, `2m`) or a bare number of seconds.
fn parse_duration<F: Fn(&str) -> Option<String>>(get: &F, key: &str) -> Option<Duration> {
    let raw = get(key)?;
    let t = raw.trim();
    if let Ok(secs) = t.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    match humantime::parse_duration(t) {
        Ok(d) => Some(d),
        Err(e) => {
            tracing::warn!(key, value = %raw, error = %e, "ignoring invalid duration");
            None
        }
    }
}
