use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::io::Write;

fn pvedeploy() -> assert_cmd::Command {
    cargo_bin_cmd!("pvedeploy").into()
}

/// Valid config pointing at an unreachable endpoint — commands that touch
/// the cluster fail fast with an API error, everything before that works.
fn write_test_config(dir: &tempfile::TempDir) -> std::path::PathBuf {
    let config_path = dir.path().join("pvedeploy.toml");
    let mut f = std::fs::File::create(&config_path).unwrap();
    write!(
        f,
        r#"
[api]
url = "http://127.0.0.1:1"
user = "root@pam"
token_id = "deploy"
token_secret = "test-secret"

[ssh]
host = "127.0.0.1"
"#
    )
    .unwrap();
    config_path
}

#[test]
fn help_works() {
    pvedeploy()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("CLI-based VM deployment"));
}

#[test]
fn missing_config_shows_error() {
    pvedeploy()
        .args(["--config", "/nonexistent/pvedeploy.toml", "nodes"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to load config"));
}

#[test]
fn bad_toml_shows_parse_error() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("pvedeploy.toml");
    std::fs::write(&config_path, "not toml [").unwrap();

    pvedeploy()
        .args(["--config", config_path.to_str().unwrap(), "nodes"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to parse config"));
}

#[test]
fn user_without_realm_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("pvedeploy.toml");
    let mut f = std::fs::File::create(&config_path).unwrap();
    write!(
        f,
        r#"
[api]
url = "http://127.0.0.1:1"
user = "root"
token_id = "deploy"
token_secret = "test-secret"

[ssh]
host = "127.0.0.1"
"#
    )
    .unwrap();

    pvedeploy()
        .args(["--config", config_path.to_str().unwrap(), "nodes"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("realm"));
}

#[test]
fn limits_storage_without_node_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = write_test_config(&dir);

    pvedeploy()
        .args([
            "--config",
            config_path.to_str().unwrap(),
            "limits",
            "--storage",
            "local",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "node and storage must be given together",
        ));
}

#[test]
fn unreachable_cluster_reports_api_error() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = write_test_config(&dir);

    pvedeploy()
        .args(["--config", config_path.to_str().unwrap(), "nodes"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cluster API request failed"));
}

#[test]
fn deploy_requires_image_argument() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = write_test_config(&dir);

    pvedeploy()
        .args([
            "--config",
            config_path.to_str().unwrap(),
            "deploy",
            "--vmid",
            "100",
            "--name",
            "web-01",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--image"));
}

#[test]
fn deploy_rejects_missing_image_file() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = write_test_config(&dir);

    pvedeploy()
        .args([
            "--config",
            config_path.to_str().unwrap(),
            "deploy",
            "--image",
            "/nonexistent/ubuntu.img",
            "--vmid",
            "100",
            "--name",
            "web-01",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("file not found"));
}
