//! End-to-end runs of the Suitefile loader and the process executor against shell-script test programs.

#![cfg(unix)]

use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tempfile::TempDir;
use testdrive::{
    CancelToken, ConfigTree, Driver, Outcome, OutcomeKind, ProcessExecutor, RunHooks, RunOptions, SuitefileLoader, TestFilter,
    TestProgram,
};

#[derive(Default)]
struct Collect {
    results: HashMap<String, Outcome>,
}

impl RunHooks for Collect {
    fn got_test_case(&mut self, _program: &TestProgram, _case_name: &str) {}

    fn got_result(&mut self, program: &TestProgram, case_name: &str, outcome: &Outcome, _duration: Duration) {
        self.results.insert(
            format!("{}:{}", program.relative_path().display(), case_name),
            outcome.clone(),
        );
    }
}

fn write(root: &Path, relative: &str, contents: &str) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, contents).unwrap();
}

fn script(root: &Path, relative: &str, body: &str) {
    write(root, relative, &format!("#!/bin/sh\n{body}\n"));
    let path = root.join(relative);
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
}

/// A suite with one program of each interface and one program that cannot be listed.
fn sample_suite(root: &Path) {
    write(
        root,
        "Suitefile",
        r#"{
            "syntax": 1,
            "test_suite": "sample",
            "include": ["dir/Suitefile"],
            "test_programs": [
                {"name": "plain_pass"},
                {"name": "plain_fail"},
                {"name": "known_bug", "expected_failure": "Crashes on empty input"}
            ]
        }"#,
    );
    write(
        root,
        "dir/Suitefile",
        r#"{
            "syntax": 1,
            "test_programs": [
                {"name": "cases", "interface": "listing", "timeout": 1},
                {"name": "needs", "interface": "listing", "required_configs": ["server"]},
                {"name": "unlistable", "interface": "listing"}
            ]
        }"#,
    );

    script(root, "plain_pass", "echo hello; exit 0");
    script(root, "plain_fail", "echo oops >&2; exit 3");
    script(root, "known_bug", "exit 1");
    script(
        root,
        "dir/cases",
        r#"if [ "$1" = "--list" ]; then printf 'ok\nskip\nhang\nsignal\n'; exit 0; fi
case "$1" in
    ok) exit 0 ;;
    skip) exit 77 ;;
    hang) exec sleep 30 ;;
    signal) kill -9 $$ ;;
esac"#,
    );
    script(
        root,
        "dir/needs",
        r#"if [ "$1" = "--list" ]; then echo only; exit 0; fi
exit 0"#,
    );
    script(root, "dir/unlistable", "exit 1");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_full_run_maps_exit_statuses() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("suite");
    let store = dir.path().join("store");
    sample_suite(&root);

    let driver = Driver::new(Arc::new(SuitefileLoader), Arc::new(ProcessExecutor));
    let options = RunOptions::new(&root).with_store_path(&store);
    let mut config = ConfigTree::new();
    config.set("parallelism", "4").unwrap();
    let mut hooks = Collect::default();

    let result = driver
        .drive(&options, &BTreeSet::new(), &config, &CancelToken::new(), &mut hooks)
        .await
        .unwrap();
    assert!(result.unused_filters.is_empty());

    let results = hooks.results;
    assert_eq!(results["plain_pass:main"], Outcome::passed());
    assert_eq!(results["plain_fail:main"], Outcome::failed("Returned non-success exit status 3"));
    assert_eq!(results["dir/cases:ok"], Outcome::passed());
    assert_eq!(results["dir/cases:skip"].kind, OutcomeKind::Skipped);
    assert_eq!(results["dir/cases:hang"], Outcome::broken("Test case timed out"));
    assert_eq!(results["dir/cases:signal"], Outcome::broken("Received signal 9"));
    assert_eq!(
        results["dir/needs:only"],
        Outcome::skipped("Required configuration property 'server' not defined")
    );
    let listing = &results["dir/unlistable:__test_cases_list__"];
    assert_eq!(listing.kind, OutcomeKind::Broken);
    assert_eq!(results["known_bug:main"], Outcome::expected_failure("Crashes on empty input"));
    assert_eq!(results.len(), 9);

    assert_eq!(fs::read_to_string(store.join("plain_pass/main.stdout")).unwrap(), "hello\n");
    assert_eq!(fs::read_to_string(store.join("plain_fail/main.stderr")).unwrap(), "oops\n");
    assert!(store.join("dir_cases/ok.stdout").exists());
}

#[tokio::test]
async fn test_filtered_run_with_suite_variables() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    sample_suite(root);

    let driver = Driver::new(Arc::new(SuitefileLoader), Arc::new(ProcessExecutor));
    let mut config = ConfigTree::new();
    config.set_override("test_suites.sample.server=localhost").unwrap();
    let filters: BTreeSet<TestFilter> = ["dir/needs", "dir/cases:ok", "dir/missing"]
        .iter()
        .map(|s| s.parse().unwrap())
        .collect();
    let mut hooks = Collect::default();

    let result = driver
        .drive(&RunOptions::new(root), &filters, &config, &CancelToken::new(), &mut hooks)
        .await
        .unwrap();

    let executed: BTreeSet<&str> = hooks.results.keys().map(String::as_str).collect();
    assert_eq!(executed, BTreeSet::from(["dir/cases:ok", "dir/needs:only"]));
    assert!(hooks.results.values().all(|outcome| *outcome == Outcome::passed()));

    let unused: Vec<String> = result.unused_filters.iter().map(ToString::to_string).collect();
    assert_eq!(unused, ["dir/missing"]);
}

#[tokio::test]
async fn test_separate_build_root() {
    let dir = TempDir::new().unwrap();
    let src = dir.path().join("src");
    let obj = dir.path().join("obj");
    write(
        &src,
        "Suitefile",
        r#"{"syntax": 1, "test_suite": "s", "test_programs": [{"name": "sub/prog"}]}"#,
    );
    script(&obj, "sub/prog", "exit 0");

    let driver = Driver::new(Arc::new(SuitefileLoader), Arc::new(ProcessExecutor));
    let mut hooks = Collect::default();
    driver
        .drive(
            &RunOptions::new(&src).with_build_root(&obj),
            &BTreeSet::new(),
            &ConfigTree::new(),
            &CancelToken::new(),
            &mut hooks,
        )
        .await
        .unwrap();

    assert_eq!(hooks.results["sub/prog:main"], Outcome::passed());
}

#[tokio::test]
async fn test_relative_suite_and_build_root() {
    let cwd = std::env::current_dir().unwrap();
    let dir = TempDir::new_in(&cwd).unwrap();
    let root = dir.path().strip_prefix(&cwd).unwrap();
    write(
        root,
        "Suitefile",
        r#"{"syntax": 1, "test_suite": "s", "test_programs": [
            {"name": "dir/prog"},
            {"name": "dir/lst", "interface": "listing"}
        ]}"#,
    );
    script(root, "dir/prog", "exit 0");
    script(
        root,
        "dir/lst",
        r#"if [ "$1" = "--list" ]; then printf 'one\ntwo\n'; exit 0; fi
exit 0"#,
    );

    let driver = Driver::new(Arc::new(SuitefileLoader), Arc::new(ProcessExecutor));
    let mut hooks = Collect::default();
    let result = driver
        .drive(
            &RunOptions::new(root).with_build_root(root),
            &BTreeSet::new(),
            &ConfigTree::new(),
            &CancelToken::new(),
            &mut hooks,
        )
        .await
        .unwrap();

    assert!(result.unused_filters.is_empty());
    let executed: BTreeSet<&str> = hooks.results.keys().map(String::as_str).collect();
    assert_eq!(executed, BTreeSet::from(["dir/lst:one", "dir/lst:two", "dir/prog:main"]));
    assert!(hooks.results.values().all(|outcome| *outcome == Outcome::passed()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancellation_kills_running_program() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write(
        root,
        "Suitefile",
        r#"{"syntax": 1, "test_suite": "s", "test_programs": [{"name": "sleeper"}, {"name": "after"}]}"#,
    );
    script(root, "sleeper", "exec sleep 30");
    script(root, "after", "exit 0");

    let driver = Driver::new(Arc::new(SuitefileLoader), Arc::new(ProcessExecutor));
    let cancel = CancelToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        trigger.cancel();
    });

    let mut hooks = Collect::default();
    let started = Instant::now();
    let result = driver
        .drive(&RunOptions::new(root), &BTreeSet::new(), &ConfigTree::new(), &cancel, &mut hooks)
        .await
        .unwrap();

    assert!(started.elapsed() < Duration::from_secs(10));
    assert!(result.cancelled);
    assert_eq!(hooks.results["sleeper:main"], Outcome::broken("Test case was cancelled"));
    assert_eq!(hooks.results["after:main"].kind, OutcomeKind::Skipped);
}
