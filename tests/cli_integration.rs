//! Integration tests for the `tv` CLI.
//!
//! Each test creates a temp vault directory, runs `tv` as a subprocess,
//! and verifies stdout and/or file contents.

use std::fs;
use std::path::Path;
use std::process::Command;

use pretty_assertions::assert_eq;

/// Create a small vault with tasks in two files and a nested folder.
fn create_test_vault(root: &Path) {
    fs::create_dir_all(root.join("projects")).unwrap();
    fs::create_dir_all(root.join(".hidden")).unwrap();

    fs::write(
        root.join("inbox.md"),
        "\
# Inbox

- [ ] Buy milk 📅 2024-06-01
- [ ] Call plumber #home
    - [ ] find the number
- [x] Renew passport ✅ 2024-05-20

Some prose that is not a task.
- plain list item
",
    )
    .unwrap();

    fs::write(
        root.join("projects/work.md"),
        "\
# Today
- [ ] Review pull request

# Later
- [/] Write quarterly report ⏳ 2024-07-01
",
    )
    .unwrap();

    fs::write(root.join(".hidden/ignored.md"), "- [ ] never listed\n").unwrap();
    fs::write(root.join("notes.txt"), "- [ ] not markdown\n").unwrap();
}

/// Run `tv` with the given args against `vault`, returning (stdout, stderr, success).
fn run_tv(vault: &Path, args: &[&str]) -> (String, String, bool) {
    let output = Command::new(env!("CARGO_BIN_EXE_tv"))
        .arg("-C")
        .arg(vault)
        .args(args)
        .output()
        .expect("failed to run tv");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

/// Run `tv` expecting success, return stdout.
fn run_tv_ok(vault: &Path, args: &[&str]) -> String {
    let (stdout, stderr, success) = run_tv(vault, args);
    if !success {
        panic!("tv {:?} failed:\nstdout: {}\nstderr: {}", args, stdout, stderr);
    }
    stdout
}

// ---------------------------------------------------------------------------
// Read command tests
// ---------------------------------------------------------------------------

#[test]
fn test_list_groups_by_file() {
    let tmp = tempfile::TempDir::new().unwrap();
    create_test_vault(tmp.path());

    let out = run_tv_ok(tmp.path(), &["list"]);
    insta::assert_snapshot!(out.trim_end(), @r"
    inbox.md
       3 [ ] Buy milk 📅 2024-06-01
       4 [ ] Call plumber #home
       5 [ ] find the number
       6 [x] Renew passport ✅ 2024-05-20

    projects/work.md
       2 [ ] Review pull request
       5 [/] Write quarterly report ⏳ 2024-07-01
    ");
}

#[test]
fn test_list_path_filter() {
    let tmp = tempfile::TempDir::new().unwrap();
    create_test_vault(tmp.path());

    let out = run_tv_ok(tmp.path(), &["list", "--path", "projects/"]);
    assert!(out.contains("Review pull request"));
    assert!(!out.contains("Buy milk"));
}

#[test]
fn test_list_json() {
    let tmp = tempfile::TempDir::new().unwrap();
    create_test_vault(tmp.path());

    let out = run_tv_ok(tmp.path(), &["list", "--json"]);
    let parsed: serde_json::Value = serde_json::from_str(&out).unwrap();
    let files = parsed.as_array().unwrap();
    assert_eq!(files.len(), 2);
    assert_eq!(files[0]["path"], "inbox.md");
    assert_eq!(files[0]["tasks"][0]["due"], "2024-06-01");
    assert_eq!(files[0]["tasks"][1]["tags"][0], "#home");
    assert_eq!(files[0]["tasks"][3]["status"], "done");
    assert_eq!(files[1]["tasks"][1]["status"], "in_progress");
    assert_eq!(files[1]["tasks"][1]["heading"], "Later");
}

#[test]
fn test_list_respects_global_filter() {
    let tmp = tempfile::TempDir::new().unwrap();
    fs::write(tmp.path().join("a.md"), "- [ ] #task managed\n- [ ] unmanaged\n").unwrap();
    fs::write(tmp.path().join(".taskvault.toml"), "global_filter = \"#task\"\n").unwrap();

    let out = run_tv_ok(tmp.path(), &["list"]);
    assert!(out.contains("#task managed"));
    assert!(!out.contains("unmanaged"));
}

#[test]
fn test_list_date_fallback_from_file_name() {
    let tmp = tempfile::TempDir::new().unwrap();
    fs::create_dir_all(tmp.path().join("daily")).unwrap();
    fs::write(
        tmp.path().join("daily/2024-03-15.md"),
        "- [ ] undated\n- [ ] dated 📅 2024-04-01\n",
    )
    .unwrap();
    run_tv_ok(tmp.path(), &["config", "date_fallback.enabled", "true"]);

    let out = run_tv_ok(tmp.path(), &["list", "--json"]);
    let parsed: serde_json::Value = serde_json::from_str(&out).unwrap();
    let tasks = &parsed[0]["tasks"];
    assert_eq!(tasks[0]["scheduled"], "2024-03-15");
    assert_eq!(tasks[0]["scheduled_inferred"], true);
    assert!(tasks[1].get("scheduled").is_none());
}

// ---------------------------------------------------------------------------
// Write command tests
// ---------------------------------------------------------------------------

#[test]
fn test_toggle_marks_done_and_back() {
    let tmp = tempfile::TempDir::new().unwrap();
    create_test_vault(tmp.path());

    let out = run_tv_ok(tmp.path(), &["toggle", "inbox.md:3"]);
    assert_eq!(out.trim(), "- [x] Buy milk 📅 2024-06-01");
    let content = fs::read_to_string(tmp.path().join("inbox.md")).unwrap();
    assert!(content.contains("\n- [x] Buy milk 📅 2024-06-01\n"));

    run_tv_ok(tmp.path(), &["toggle", "inbox.md:3"]);
    let content = fs::read_to_string(tmp.path().join("inbox.md")).unwrap();
    assert!(content.contains("\n- [ ] Buy milk 📅 2024-06-01\n"));
}

#[test]
fn test_toggle_keeps_the_rest_of_the_file() {
    let tmp = tempfile::TempDir::new().unwrap();
    create_test_vault(tmp.path());
    let before = fs::read_to_string(tmp.path().join("projects/work.md")).unwrap();

    run_tv_ok(tmp.path(), &["toggle", "projects/work.md:2"]);
    let after = fs::read_to_string(tmp.path().join("projects/work.md")).unwrap();
    assert_eq!(after, before.replace("- [ ] Review", "- [x] Review"));
}

#[test]
fn test_toggle_no_task_at_line() {
    let tmp = tempfile::TempDir::new().unwrap();
    create_test_vault(tmp.path());

    let (_, stderr, success) = run_tv(tmp.path(), &["toggle", "inbox.md:1"]);
    assert!(!success);
    assert!(stderr.contains("no task at inbox.md:1"));
}

#[test]
fn test_failed_toggle_reports_once() {
    let tmp = tempfile::TempDir::new().unwrap();
    create_test_vault(tmp.path());
    // A directory where the lock file belongs makes every write fail
    fs::create_dir(tmp.path().join(".taskvault.lock")).unwrap();
    let before = fs::read_to_string(tmp.path().join("inbox.md")).unwrap();

    let (stdout, stderr, success) = run_tv(tmp.path(), &["toggle", "inbox.md:3"]);
    assert!(!success);
    assert!(stdout.is_empty());
    assert_eq!(stderr.matches("could not open lock file").count(), 1, "stderr: {stderr}");
    assert_eq!(stderr.lines().count(), 1, "stderr: {stderr}");
    assert_eq!(fs::read_to_string(tmp.path().join("inbox.md")).unwrap(), before);
}

#[test]
fn test_move_under_heading_in_other_file() {
    let tmp = tempfile::TempDir::new().unwrap();
    create_test_vault(tmp.path());

    run_tv_ok(tmp.path(), &["move", "inbox.md:4", "projects/work.md", "--heading", "Today"]);

    let inbox = fs::read_to_string(tmp.path().join("inbox.md")).unwrap();
    assert!(!inbox.contains("Call plumber"));
    assert!(!inbox.contains("find the number"));

    let work = fs::read_to_string(tmp.path().join("projects/work.md")).unwrap();
    assert_eq!(
        work,
        "\
# Today
- [ ] Review pull request
- [ ] Call plumber #home
    - [ ] find the number

# Later
- [/] Write quarterly report ⏳ 2024-07-01
"
    );
}

#[test]
fn test_move_to_end_of_same_file() {
    let tmp = tempfile::TempDir::new().unwrap();
    fs::write(tmp.path().join("a.md"), "- [ ] first\n- [ ] second\n- [ ] third").unwrap();

    run_tv_ok(tmp.path(), &["move", "a.md:1", "a.md", "--end"]);
    let content = fs::read_to_string(tmp.path().join("a.md")).unwrap();
    assert_eq!(content, "- [ ] second\n- [ ] third\n- [ ] first");
}

#[test]
fn test_move_to_missing_file_fails() {
    let tmp = tempfile::TempDir::new().unwrap();
    create_test_vault(tmp.path());
    let before = fs::read_to_string(tmp.path().join("inbox.md")).unwrap();

    let (_, stderr, success) = run_tv(tmp.path(), &["move", "inbox.md:3", "nope.md"]);
    assert!(!success);
    assert!(stderr.contains("target file not found: nope.md"));
    assert_eq!(fs::read_to_string(tmp.path().join("inbox.md")).unwrap(), before);
}

// ---------------------------------------------------------------------------
// Config tests
// ---------------------------------------------------------------------------

#[test]
fn test_config_preserves_comments() {
    let tmp = tempfile::TempDir::new().unwrap();
    fs::write(
        tmp.path().join(".taskvault.toml"),
        "# my vault\n\n[edit]\nmax_retries = 3 # be quick\n",
    )
    .unwrap();

    let out = run_tv_ok(tmp.path(), &["config", "cache.debounce_ms", "250"]);
    assert_eq!(out.trim(), "cache.debounce_ms = 250");

    let text = fs::read_to_string(tmp.path().join(".taskvault.toml")).unwrap();
    assert!(text.starts_with("# my vault\n"));
    assert!(text.contains("max_retries = 3 # be quick"));
    assert!(text.contains("[cache]\ndebounce_ms = 250"));
}

#[test]
fn test_config_rejects_unknown_key() {
    let tmp = tempfile::TempDir::new().unwrap();
    let (_, stderr, success) = run_tv(tmp.path(), &["config", "colour", "blue"]);
    assert!(!success);
    assert!(stderr.contains("unknown setting 'colour'"));
    assert!(!tmp.path().join(".taskvault.toml").exists());
}
