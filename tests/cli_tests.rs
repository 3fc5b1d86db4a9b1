//! Binary-level checks for the `sentryfs` CLI.

use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn patterns_lists_the_builtin_catalog() {
    let mut cmd = Command::cargo_bin("sentryfs").unwrap();
    cmd.arg("patterns")
        .assert()
        .success()
        .stdout(predicate::str::contains("ssn"))
        .stdout(predicate::str::contains("credit_card"))
        .stdout(predicate::str::contains("private_key"));
}

#[test]
fn scan_blocks_sensitive_file_with_exit_code_two() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("leak.txt"), "SSN: 123-45-6789").unwrap();

    let mut cmd = Command::cargo_bin("sentryfs").unwrap();
    cmd.arg("scan")
        .arg(dir.path())
        .assert()
        .code(2)
        .stdout(predicate::str::contains("BLOCK"))
        .stdout(predicate::str::contains("ssn"))
        // The matched value itself must never be printed.
        .stdout(predicate::str::contains("123-45-6789").not());
}

#[test]
fn scan_passes_clean_directory() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("notes.txt"), "ordinary meeting notes").unwrap();

    let mut cmd = Command::cargo_bin("sentryfs").unwrap();
    cmd.arg("scan")
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("0 blocked"));
}

#[test]
fn bad_custom_regex_in_config_fails_fast() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("sentryfs.toml");
    std::fs::write(
        &config_path,
        r#"
[[custom_patterns]]
name = "broken"
regex = "([unclosed"
"#,
    )
    .unwrap();

    let mut cmd = Command::cargo_bin("sentryfs").unwrap();
    cmd.arg("--config")
        .arg(&config_path)
        .arg("patterns")
        .assert()
        .failure()
        .stderr(predicate::str::contains("broken"));
}
