use std::env;
use std::process::Command;
use std::time::{SystemTime, UNIX_EPOCH};

/// First line of a command's stdout, when it runs and succeeds.
fn first_line(program: &str, args: &[&str]) -> Option<String> {
    let out = Command::new(program).args(args).output().ok()?;
    if !out.status.success() {
        return None;
    }
    let text = String::from_utf8_lossy(&out.stdout);
    text.lines().next().map(|l| l.trim().to_string())
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    let date = first_line("date", &["-u", "+%Y-%m-%dT%H:%M:%SZ"]).unwrap_or_else(|| {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        format!("unix:{secs}")
    });
    let target = env::var("TARGET").unwrap_or_else(|_| "unknown".to_string());
    // Cargo hands build scripts the compiler it will use.
    let rustc = env::var("RUSTC").unwrap_or_else(|_| "rustc".to_string());
    let rustc_version =
        first_line(&rustc, &["--version"]).unwrap_or_else(|| "unknown".to_string());

    for (key, value) in [
        ("MGIT_BUILD_DATE", date),
        ("MGIT_BUILD_TARGET", target),
        ("MGIT_BUILD_RUSTC", rustc_version),
    ] {
        println!("cargo:rustc-env={key}={value}");
    }
}
