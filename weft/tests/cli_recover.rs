//! CLI tests for `weft backup`, `weft abandon` and `weft recover`.
//!
//! Spawns the weft binary inside a scratch repository and checks exit codes
//! and the messages users rely on.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use weft::exit_codes;
use weft::test_support::TestRepo;

fn weft(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_weft"))
        .current_dir(dir)
        .args(args)
        .output()
        .expect("run weft")
}

fn abandoned_fix_bug() -> TestRepo {
    let repo = TestRepo::new().expect("repo");
    repo.write_plan("fix-bug", "# Fix Bug").expect("plan");
    repo.commit_all("plan: fix-bug").expect("commit");

    let out = weft(repo.root(), &["backup", "fix-bug"]);
    assert_eq!(out.status.code(), Some(exit_codes::OK), "{out:?}");

    let out = weft(
        repo.root(),
        &["abandon", "fix-bug", "--reason", "obsolete", "--yes"],
    );
    assert_eq!(out.status.code(), Some(exit_codes::OK), "{out:?}");
    repo
}

#[test]
fn recover_abandoned_without_flag_fails_with_hint() {
    let repo = abandoned_fix_bug();

    let out = weft(repo.root(), &["recover", "fix-bug"]);
    assert_eq!(out.status.code(), Some(exit_codes::FAILURE));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("abandoned"), "{stderr}");
    assert!(stderr.contains("--abandoned"), "{stderr}");
    assert!(!repo.root().join("tasks/fix-bug.md").exists());
}

#[test]
fn recover_abandoned_restores_file() {
    let repo = abandoned_fix_bug();

    let out = weft(repo.root(), &["recover", "fix-bug", "--abandoned"]);
    assert_eq!(out.status.code(), Some(exit_codes::OK), "{out:?}");
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("obsolete"), "{stdout}");
    assert_eq!(
        fs::read_to_string(repo.root().join("tasks/fix-bug.md")).expect("read"),
        "# Fix Bug"
    );

    let refs = repo
        .git(&["for-each-ref", "--format=%(refname)", "refs/plan-backups/", "refs/plan-abandoned/"])
        .expect("refs");
    assert_eq!(refs.trim(), "refs/plan-backups/fix-bug");
}

#[test]
fn recover_existing_file_without_force_fails() {
    let repo = TestRepo::new().expect("repo");
    repo.write_plan("fix-bug", "# Fix Bug").expect("plan");
    let out = weft(repo.root(), &["backup", "fix-bug"]);
    assert_eq!(out.status.code(), Some(exit_codes::OK), "{out:?}");

    let out = weft(repo.root(), &["recover", "fix-bug"]);
    assert_eq!(out.status.code(), Some(exit_codes::FAILURE));
    assert!(String::from_utf8_lossy(&out.stderr).contains("--force"));

    let out = weft(repo.root(), &["recover", "fix-bug", "--force"]);
    assert_eq!(out.status.code(), Some(exit_codes::OK), "{out:?}");
}

#[test]
fn listing_json_includes_both_namespaces() {
    let repo = abandoned_fix_bug();
    repo.write_plan("live-plan", "# Live").expect("plan");
    let out = weft(repo.root(), &["backup", "live-plan"]);
    assert_eq!(out.status.code(), Some(exit_codes::OK), "{out:?}");

    let out = weft(repo.root(), &["recover", "--all", "--json"]);
    assert_eq!(out.status.code(), Some(exit_codes::OK), "{out:?}");
    let rows: serde_json::Value = serde_json::from_slice(&out.stdout).expect("json");
    let rows = rows.as_array().expect("array");
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["plan_id"], "fix-bug");
    assert_eq!(rows[0]["namespace"], "abandoned");
    assert_eq!(rows[0]["reason"], "obsolete");
    assert_eq!(rows[1]["plan_id"], "live-plan");
    assert_eq!(rows[1]["namespace"], "active");
    assert_eq!(rows[1]["file_exists"], true);
}

#[test]
fn abandon_with_nothing_to_clean_exits_ok() {
    let repo = TestRepo::new().expect("repo");
    let out = weft(repo.root(), &["abandon", "ghost-plan", "--yes"]);
    assert_eq!(out.status.code(), Some(exit_codes::OK), "{out:?}");
    assert!(String::from_utf8_lossy(&out.stdout).contains("Nothing to clean"));
}
