mod support;

use std::fs;
use std::path::Path;

use support::{git, have_git, init_repo, mgit, row, stderr_of, stdout_of};

fn commit_file(repo: &Path, home: &Path, file: &str, content: &str) {
    fs::write(repo.join(file), content).unwrap();
    git(repo, home, &["add", file]);
    git(repo, home, &["commit", "-q", "-m", &format!("touch {file}")]);
}

#[test]
fn test_status_reports_sync_state_against_origin() {
    if !have_git() {
        eprintln!("skipping: git not found in PATH");
        return;
    }
    let td = tempfile::tempdir().expect("tmpdir");
    let base = td.path().canonicalize().expect("canonical tmpdir");
    let home = base.join("home");
    fs::create_dir_all(&home).unwrap();

    let remote = base.join("remote.git");
    fs::create_dir_all(&remote).unwrap();
    git(&remote, &home, &["init", "-q", "--bare"]);
    git(&remote, &home, &["symbolic-ref", "HEAD", "refs/heads/main"]);
    let remote_s = remote.to_str().unwrap();

    let seed = base.join("seed");
    init_repo(&seed, &home, "main");
    git(&seed, &home, &["remote", "add", "origin", remote_s]);
    git(&seed, &home, &["push", "-q", "origin", "main"]);

    let ws = base.join("ws");
    fs::create_dir_all(&ws).unwrap();
    let clone = |name: &str| {
        git(&ws, &home, &["clone", "-q", remote_s, name]);
        ws.join(name)
    };

    // Cloned before the upstream moves on.
    clone("behind");
    let diverged = clone("diverged");
    commit_file(&diverged, &home, "local.txt", "mine\n");

    commit_file(&seed, &home, "upstream.txt", "theirs\n");
    git(&seed, &home, &["push", "-q", "origin", "main"]);

    clone("synced");
    let ahead = clone("ahead");
    commit_file(&ahead, &home, "local.txt", "mine\n");
    let topic = clone("topic");
    git(&topic, &home, &["checkout", "-q", "-b", "topic"]);
    let detached = clone("detached");
    git(&detached, &home, &["checkout", "-q", "--detach"]);

    let out = mgit(&ws, &home, &[]);
    let table = stdout_of(&out);
    assert_eq!(out.status.code(), Some(0), "{table}\n{}", stderr_of(&out));
    assert!(table.lines().next().unwrap_or("").contains("Sync"), "{table}");

    let rows = table.as_str();
    let sync_of =
        move |name: &str| row(rows, name).unwrap_or_else(|| panic!("row {name}:\n{rows}"));
    assert!(sync_of("synced").contains('✓'), "{table}");
    assert!(sync_of("behind").contains("↓1"), "{table}");
    assert!(sync_of("ahead").contains("↑1"), "{table}");
    assert!(sync_of("diverged").contains("↕ ↑1 ↓1"), "{table}");
    // No origin/topic: counted as one commit ahead.
    assert!(sync_of("topic").contains("↑1"), "{table}");
    let d = sync_of("detached");
    assert!(d.contains('?') && d.split_whitespace().nth(2) == Some("detached"), "{table}");
    assert!(table.contains("6 succeeded, 0 failed, 0 skipped (of 6)"), "{table}");

    // fetch brought the upstream commit into the behind clone's remote refs
    let behind_remote = git(&ws.join("behind"), &home, &["rev-parse", "origin/main"]);
    let seed_head = git(&seed, &home, &["rev-parse", "HEAD"]);
    assert_eq!(behind_remote.stdout, seed_head.stdout);
}
