//! Diagnostic logging to stderr.
//!
//! Filter: `MGIT_LOG`, else `RUST_LOG`, else `warn`. `--verbose` replaces the filter with
//! `mgit=debug` unless one of the variables is set.
use std::env;

use once_cell::sync::OnceCell;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

static INIT: OnceCell<()> = OnceCell::new();

pub fn filter_directive<F>(verbose: bool, get: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let from_env = get("MGIT_LOG")
        .or_else(|| get("RUST_LOG"))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());
    match from_env {
        Some(f) => f,
        None if verbose => "warn,mgit=debug".to_string(),
        None => "warn".to_string(),
    }
}

/// Install the global subscriber once; later calls are no-ops.
pub fn init_logging(verbose: bool) {
    if INIT.get().is_some() {
        return;
    }
    let filter = filter_directive(verbose, |k| env::var(k).ok());
    let env_filter = tracing_subscriber::EnvFilter::try_new(&filter).unwrap_or_else(|e| {
        eprintln!("mgit: invalid log filter '{filter}': {e}; using 'warn'");
        tracing_subscriber::EnvFilter::new("warn")
    });
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_ansi(crate::color::color_enabled_stderr());
    if tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .is_err()
    {
        eprintln!("mgit: logging init skipped (global subscriber already set)");
        return;
    }
    let _ = INIT.set(());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_precedence() {
        let none = |_: &str| None;
        assert_eq!(filter_directive(false, none), "warn");
        assert_eq!(filter_directive(true, none), "warn,mgit=debug");
        let both = |k: &str| match k {
            "MGIT_LOG" => Some("mgit=trace".to_string()),
            "RUST_LOG" => Some("info".to_string()),
            _ => None,
        };
        assert_eq!(filter_directive(true, both), "mgit=trace");
        let rust_only = |k: &str| (k == "RUST_LOG").then(|| "info".to_string());
        assert_eq!(filter_directive(false, rust_only), "info");
    }
}
