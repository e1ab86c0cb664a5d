/// Integration tests for the arbiter binary
use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// Helper to create a temporary directory for testing
fn create_temp_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp directory")
}

/// Command running in `dir`, isolated from any user config
fn arbiter(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("arbiter").expect("binary should build");
    cmd.current_dir(dir.path())
        .env("HOME", dir.path())
        .env_remove("ARBITER_SERVICE_URL");
    cmd
}

#[test]
fn test_stages_lists_default_registry() {
    let dir = create_temp_dir();

    arbiter(&dir)
        .arg("stages")
        .assert()
        .success()
        .stdout(predicate::str::contains("1. Data Ingestion"))
        .stdout(predicate::str::contains("3. Reasoning"))
        .stdout(predicate::str::contains("5. Execution Planning"));
}

#[test]
fn test_init_writes_config_once() {
    let dir = create_temp_dir();

    arbiter(&dir).arg("init").assert().success();

    let path = dir.path().join(".arbiter/config.toml");
    assert!(path.exists(), "config should exist at {:?}", path);
    let content = std::fs::read_to_string(&path).unwrap();
    assert!(content.contains("base_url = \"http://localhost:8000\""));
    assert!(content.contains("Execution Planning"));

    arbiter(&dir).arg("init").assert().failure();
    arbiter(&dir).args(["init", "--force"]).assert().success();
}

#[test]
fn test_config_uses_local_file_and_env_override() {
    let dir = create_temp_dir();
    std::fs::create_dir_all(dir.path().join(".arbiter")).unwrap();
    std::fs::write(
        dir.path().join(".arbiter/config.toml"),
        "[polling]\ninterval = \"5s\"\n\n[[stages]]\nname = \"Fetch\"\n",
    )
    .unwrap();

    arbiter(&dir)
        .arg("config")
        .env("ARBITER_SERVICE_URL", "http://10.1.2.3:9000")
        .assert()
        .success()
        .stdout(predicate::str::contains("http://10.1.2.3:9000"))
        .stdout(predicate::str::contains("interval = \"5s\""));

    arbiter(&dir)
        .arg("stages")
        .assert()
        .success()
        .stdout(predicate::str::contains("1. Fetch"))
        .stdout(predicate::str::contains("Analysis").not());
}

#[test]
fn test_invalid_service_url_is_rejected() {
    let dir = create_temp_dir();

    arbiter(&dir)
        .args(["--service-url", "not a url", "stages"])
        .assert()
        .failure();
}

#[test]
fn test_run_reports_submission_failure() {
    let dir = create_temp_dir();

    // Nothing listens on the discard port
    arbiter(&dir)
        .args(["--service-url", "http://127.0.0.1:9", "run", "emergency"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Submission"));
}

#[test]
fn test_env_url_overrides_broken_file_url() {
    let dir = create_temp_dir();
    std::fs::create_dir_all(dir.path().join(".arbiter")).unwrap();
    std::fs::write(
        dir.path().join(".arbiter/config.toml"),
        "[service]\nbase_url = \"::bad\"\n",
    )
    .unwrap();

    arbiter(&dir).arg("stages").assert().failure();

    arbiter(&dir)
        .arg("stages")
        .env("ARBITER_SERVICE_URL", "http://localhost:8000")
        .assert()
        .success()
        .stdout(predicate::str::contains("1. Data Ingestion"));
}
