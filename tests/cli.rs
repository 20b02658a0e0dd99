use std::path::Path;
use std::process::{Command, Output};

use tempfile::tempdir;

fn run(dir: &Path, args: &[&str]) -> std::io::Result<Output> {
    let db = dir.join("villaops.sqlite3");
    Command::new(env!("CARGO_BIN_EXE_villaops"))
        .env("VILLAOPS_LOG_DIR", dir.join("logs"))
        .env_remove("VILLAOPS_FUNCTIONS_URL")
        .env_remove("VILLAOPS_API_KEY")
        .arg("--db")
        .arg(&db)
        .args(args)
        .output()
}

#[test]
fn status_reports_pending_until_migrated() -> anyhow::Result<()> {
    let dir = tempdir()?;

    let before = run(dir.path(), &["db", "status"])?;
    assert_eq!(before.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&before.stdout).contains("pending"));

    let migrate = run(dir.path(), &["db", "migrate"])?;
    assert!(migrate.status.success());

    let after = run(dir.path(), &["db", "status"])?;
    assert_eq!(after.status.code(), Some(0));
    assert!(!String::from_utf8_lossy(&after.stdout).contains("pending"));
    Ok(())
}

#[test]
fn sync_without_endpoint_fails_cleanly() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let output = run(dir.path(), &["sync", "listings"])?;
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("VILLAOPS_FUNCTIONS_URL"));
    Ok(())
}

#[test]
fn settings_round_trip_through_files() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let file = dir.path().join("settings.json");
    let file_arg = file.to_string_lossy().to_string();

    let export = run(dir.path(), &["settings", "export", "--out", &file_arg])?;
    assert!(export.status.success());
    assert!(file.exists());

    let import = run(dir.path(), &["settings", "import", &file_arg])?;
    assert!(import.status.success());
    Ok(())
}

#[test]
fn bad_dates_are_rejected_by_the_parser() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let output = run(dir.path(), &["report", "--from", "yesterday"])?;
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("YYYY-MM-DD"));
    Ok(())
}
