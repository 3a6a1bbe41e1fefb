use anyhow::Result;
use assert_cmd::Command;
use predicates::prelude::*;
use std::fs::{self, File};
use std::io::Write;
use tempfile::{tempdir, TempDir};

fn create_test_tree(dir: &TempDir) -> Result<()> {
    let logs = dir.path().join("logs");
    fs::create_dir(&logs)?;
    File::create(logs.join("app.log"))?.write_all(b"hello")?;
    File::create(logs.join("app.txt"))?.write_all(b"hi")?;
    File::create(dir.path().join("notes.txt"))?;
    Ok(())
}

fn pfind(dir: &TempDir) -> Result<Command> {
    let mut cmd = Command::cargo_bin("pfind")?;
    cmd.current_dir(dir.path());
    Ok(cmd)
}

#[test]
fn test_no_arguments_prints_help() -> Result<()> {
    let dir = tempdir()?;
    pfind(&dir)?
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage"));
    Ok(())
}

#[test]
fn test_prints_totals() -> Result<()> {
    let dir = tempdir()?;
    create_test_tree(&dir)?;

    pfind(&dir)?
        .args(["-j", "2", "--silent"])
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::ends_with("2/2\n"))
        .stdout(predicate::str::contains("Not sure what to do about"));
    Ok(())
}

#[test]
fn test_name_filter_reports_match() -> Result<()> {
    let dir = tempdir()?;
    create_test_tree(&dir)?;

    pfind(&dir)?
        .args(["-j", "3", "-n", "log"])
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("app.log [5, modified "))
        .stdout(predicate::str::contains("app.txt").not())
        .stdout(predicate::str::ends_with("1/2\n"));
    Ok(())
}

#[test]
fn test_size_filter() -> Result<()> {
    let dir = tempdir()?;
    create_test_tree(&dir)?;

    pfind(&dir)?
        .args(["-j", "2", "--silent", "-s", "2"])
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::ends_with("1/2\n"));
    Ok(())
}

#[test]
fn test_newer_accepts_rfc3339() -> Result<()> {
    let dir = tempdir()?;
    create_test_tree(&dir)?;

    pfind(&dir)?
        .args(["-j", "2", "--silent", "--newer", "2000-01-01T00:00:00Z"])
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::ends_with("2/2\n"));
    Ok(())
}

#[test]
fn test_invalid_newer_is_usage_error() -> Result<()> {
    let dir = tempdir()?;

    pfind(&dir)?
        .args(["--newer", "last tuesday"])
        .arg(dir.path())
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Invalid timestamp"));
    Ok(())
}

#[test]
fn test_single_member_warning() -> Result<()> {
    let dir = tempdir()?;
    create_test_tree(&dir)?;

    pfind(&dir)?
        .args(["-j", "1"])
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("WARNING: Running in non-parallel mode."))
        .stdout(predicate::str::contains("Did you mean to request more processes (-j)?"));
    Ok(())
}

#[test]
fn test_human_readable_sizes() -> Result<()> {
    let dir = tempdir()?;
    let sub = dir.path().join("sub");
    fs::create_dir(&sub)?;
    File::create(sub.join("big.bin"))?.write_all(&vec![0u8; 1536])?;

    pfind(&dir)?
        .args(["-j", "2", "-h"])
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("big.bin [1.5K, modified "));
    Ok(())
}

#[test]
fn test_missing_root_fails_without_totals() -> Result<()> {
    let dir = tempdir()?;

    pfind(&dir)?
        .args(["-j", "2"])
        .arg(dir.path().join("missing"))
        .assert()
        .code(1)
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("cannot list"));
    Ok(())
}

#[test]
fn test_config_file_supplies_criteria() -> Result<()> {
    let dir = tempdir()?;
    create_test_tree(&dir)?;
    let config = dir.path().join("custom.yaml");
    fs::write(&config, "criteria:\n  name: \".txt\"\n  silent: true\npool_size: 2\n")?;

    pfind(&dir)?
        .arg("-c")
        .arg(&config)
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::ends_with("1/2\n"));
    Ok(())
}

#[test]
fn test_missing_config_file_fails() -> Result<()> {
    let dir = tempdir()?;

    pfind(&dir)?
        .args(["-c", "nowhere.yaml"])
        .arg(dir.path())
        .assert()
        .code(1)
        .stderr(predicate::str::contains("config file not found"));
    Ok(())
}

#[test]
fn test_processes_flag_overrides_config_file() -> Result<()> {
    let dir = tempdir()?;
    create_test_tree(&dir)?;
    let config = dir.path().join("custom.yaml");
    fs::write(&config, "pool_size: 3\n")?;

    pfind(&dir)?
        .args(["-j", "1", "-c"])
        .arg(&config)
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::starts_with("WARNING: Running in non-parallel mode.\n"))
        .stdout(predicate::str::ends_with("2/2\n"));
    Ok(())
}
