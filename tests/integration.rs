use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn formwork_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("formwork");
    path
}

fn write_survey(root: &Path, name: &str, title: &str) {
    let dir = root.join(name);
    fs::create_dir_all(&dir).unwrap();
    fs::write(
        dir.join("metadata.yaml"),
        format!("title: {}\nintro: Thanks for taking part.\n", title),
    )
    .unwrap();
    fs::write(
        dir.join("questions.yaml"),
        r#"questions:
  - type: single-choice
    id: role
    label: What is your role?
    options: [engineer, designer, manager]
  - type: rating
    id: score
    label: How likely are you to recommend us?
    min: 0
    max: 10
"#,
    )
    .unwrap();
    fs::write(dir.join("security.yaml"), "duplicateProtection: cookie\n").unwrap();
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    fs::create_dir_all(root.join("data")).unwrap();

    let surveys_dir = root.join("surveys");
    write_survey(&surveys_dir, "onboarding", "Onboarding");
    write_survey(&surveys_dir, "quarterly", "Quarterly pulse");

    let config_content = format!(
        r#"[db]
path = "{}/data/formwork.sqlite"

[server]
bind = "127.0.0.1:7431"

[surveys]
root = "{}/surveys"
"#,
        root.display(),
        root.display()
    );

    let config_path = config_dir.join("formwork.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_formwork(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = formwork_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run formwork binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_formwork(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data/formwork.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_formwork(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_formwork(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_check_valid_surveys() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_formwork(&config_path, &["check"]);
    assert!(success, "check failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("ok     onboarding (2 questions"));
    assert!(stdout.contains("ok     quarterly (2 questions"));
    assert!(stdout.contains("2 survey(s) OK."));
}

#[test]
fn test_check_reports_broken_survey_and_fails() {
    let (tmp, config_path) = setup_test_env();
    let broken = tmp.path().join("surveys/broken");
    fs::create_dir_all(&broken).unwrap();
    fs::write(broken.join("metadata.yaml"), "title: Broken\n").unwrap();

    let (stdout, _stderr, success) = run_formwork(&config_path, &["check"]);
    assert!(!success, "check should fail when a survey is broken");
    assert!(stdout.contains("error  broken: required file 'questions.yaml' not found"));
    assert!(stdout.contains("ok     onboarding"));
}

#[test]
fn test_check_explicit_dir_without_config() {
    let (tmp, _config_path) = setup_test_env();
    let missing_config = tmp.path().join("config/does-not-exist.toml");
    let dir = tmp.path().join("surveys");

    let (stdout, stderr, success) =
        run_formwork(&missing_config, &["check", dir.to_str().unwrap()]);
    assert!(success, "check DIR failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("2 survey(s) OK."));
}

#[test]
fn test_sync_creates_then_updates() {
    let (_tmp, config_path) = setup_test_env();
    run_formwork(&config_path, &["init"]);

    let (stdout, stderr, success) = run_formwork(&config_path, &["sync"]);
    assert!(success, "sync failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("2 created, 0 updated, 0 marked deleted"));

    let (stdout, _, success) = run_formwork(&config_path, &["sync"]);
    assert!(success);
    assert!(stdout.contains("0 created, 2 updated, 0 marked deleted"));
}

#[test]
fn test_sync_marks_removed_survey_deleted() {
    let (tmp, config_path) = setup_test_env();

    let (_, _, success) = run_formwork(&config_path, &["sync"]);
    assert!(success);

    fs::remove_dir_all(tmp.path().join("surveys/quarterly")).unwrap();
    let (stdout, stderr, success) = run_formwork(&config_path, &["sync"]);
    assert!(success, "sync failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("0 created, 1 updated, 1 marked deleted"));
}

#[test]
fn test_sync_reports_parse_errors_without_failing() {
    let (tmp, config_path) = setup_test_env();
    fs::write(
        tmp.path().join("surveys/onboarding/metadata.yaml"),
        "title: Onboarding\ntheme: neon\n",
    )
    .unwrap();

    let (stdout, stderr, success) = run_formwork(&config_path, &["sync"]);
    assert!(success, "sync failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("2 created"));
    assert!(stdout.contains("parse error  onboarding: theme is invalid: neon"));
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, success) = run_formwork(&tmp.path().join("nope.toml"), &["sync"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"));
}
