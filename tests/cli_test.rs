use std::fs;
use std::process::Command;
use tempfile::tempdir;

#[test]
fn test_cli_run_prints_report() {
    let dir = tempdir().unwrap();
    let input_path = dir.path().join("metadata.csv");
    fs::write(
        &input_path,
        "cord_uid,publish_time,journal\na,2020-03-01,A\nb,not-a-date,B\nc,2021-07-15,A\n",
    )
    .unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_dualbench"))
        .args(["run", input_path.to_str().unwrap(), "--no-progress"])
        .env("DUALBENCH_LOG", "info")
        .output()
        .expect("Failed to run dualbench");

    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("(eager) ==="), "stdout: {}", stdout);
    assert!(stdout.contains("(deferred) ==="), "stdout: {}", stdout);
    assert!(stdout.contains("Top 10 by frequency of journal"));
    assert!(stdout.contains("Memory delta (MB):"));
    assert!(stdout.contains("=== Comparison ==="));

    // logs stay off stdout
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Run complete"), "stderr: {}", stderr);
}

#[test]
fn test_cli_config_file_and_overrides() {
    let dir = tempdir().unwrap();
    let input_path = dir.path().join("papers.csv");
    fs::write(&input_path, "venue\nX\nY\nX\n").unwrap();

    let config_path = dir.path().join("bench.yaml");
    let yaml = format!(
        r#"
source:
  path: "{input}"
  encoding: utf8
analysis:
  frequency_column: venue
report:
  summary_table: false
"#,
        input = input_path.to_str().unwrap()
    );
    fs::write(&config_path, yaml).unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_dualbench"))
        .args([
            "run",
            "--config",
            config_path.to_str().unwrap(),
            "--top-n",
            "1",
            "--partition-size",
            "1KB",
            "--no-progress",
        ])
        .output()
        .expect("Failed to run dualbench");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Top 1 by frequency of venue"));
    assert!(!stdout.contains("=== Comparison ==="));
    // publish_time is absent, so both year stages are skipped
    assert_eq!(stdout.matches("[NOTE]").count(), 2);
}

#[test]
fn test_cli_missing_file_fails() {
    let dir = tempdir().unwrap();
    let missing = dir.path().join("nope.csv");

    let output = Command::new(env!("CARGO_BIN_EXE_dualbench"))
        .args(["run", missing.to_str().unwrap(), "--no-progress"])
        .output()
        .expect("Failed to run dualbench");

    assert!(!output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(!stdout.contains("==="));
}

#[test]
fn test_cli_rejects_invalid_top_n() {
    let dir = tempdir().unwrap();
    let input_path = dir.path().join("metadata.csv");
    fs::write(&input_path, "journal\nA\n").unwrap();

    let status = Command::new(env!("CARGO_BIN_EXE_dualbench"))
        .args(["run", input_path.to_str().unwrap(), "--top-n", "0"])
        .status()
        .expect("Failed to run dualbench");

    assert!(!status.success());
}
