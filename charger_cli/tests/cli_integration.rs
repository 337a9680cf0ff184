use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut f = tempfile::NamedTempFile::new().expect("tempfile");
    f.write_all(contents.as_bytes()).expect("write config");
    f.flush().expect("flush");
    f
}

#[test]
fn check_config_accepts_a_valid_file() {
    let cfg = write_config(
        r#"
[polling]
mode = "always"
interval_ms = 15000

[battery]
fullbatt_uv = 4350000
fullbatt_ua = 120000
"#,
    );
    Command::cargo_bin("charger_cli")
        .expect("binary")
        .args(["--config"])
        .arg(cfg.path())
        .arg("check-config")
        .assert()
        .success()
        .stdout(predicate::str::contains("config ok"));
}

#[test]
fn check_config_reports_json_when_asked() {
    let cfg = write_config("[polling]\nmode = \"always\"\ninterval_ms = 15000\n");
    Command::cargo_bin("charger_cli")
        .expect("binary")
        .args(["--json", "--config"])
        .arg(cfg.path())
        .arg("check-config")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"valid\":true"));
}

#[test]
fn check_config_rejects_invalid_settings() {
    let cfg = write_config("[polling]\nmode = \"always\"\ninterval_ms = 0\n");
    Command::cargo_bin("charger_cli")
        .expect("binary")
        .args(["--config"])
        .arg(cfg.path())
        .arg("check-config")
        .assert()
        .failure()
        .stderr(predicate::str::contains("interval_ms"));
}

#[test]
fn missing_config_file_fails_with_context() {
    Command::cargo_bin("charger_cli")
        .expect("binary")
        .args(["--config", "/nonexistent/charger.toml", "check-config"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("reading config"));
}

#[test]
fn run_requires_a_charger_argument() {
    let cfg = write_config("[polling]\nmode = \"always\"\ninterval_ms = 15000\n");
    Command::cargo_bin("charger_cli")
        .expect("binary")
        .args(["--config"])
        .arg(cfg.path())
        .args(["run", "--fuel-gauge", "fgu"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--charger"));
}
