#![allow(missing_docs)]

use std::{process::Stdio, time::Duration};
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;

#[allow(dead_code)]
mod test_common {
    include!(concat!(env!("CARGO_MANIFEST_DIR"), "/tests/common/mod.rs"));
}

type TestResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

async fn run_shell_with_input(args: &[&str], input: &str) -> TestResult<std::process::Output> {
    let bin = assert_cmd::cargo::cargo_bin!("lazytable");
    let mut cmd = tokio::process::Command::new(bin);
    cmd.args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = cmd.spawn()?;
    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(input.as_bytes()).await?;
        drop(stdin);
    }

    let output = tokio::time::timeout(Duration::from_secs(30), child.wait_with_output())
        .await
        .map_err(|_| "command timed out")??;

    Ok(output)
}

#[tokio::test]
async fn shell_over_file_filters_and_reports_status() -> TestResult<()> {
    let tmp = TempDir::new()?;
    let fixed = test_common::write_fixed(tmp.path())?;
    let fixed_str = fixed.to_string_lossy();

    let input = "take 2\nfilter species == versicolor\ntake\nstatus\nreset\nrow 4\nexit\n";
    let output = run_shell_with_input(&["shell", "--file", fixed_str.as_ref()], input).await?;

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("lazytable shell"));
    assert!(stdout.contains("0\t1.4\t5.1\tsetosa\tf-01"));
    assert!(stdout.contains("filters: species == versicolor"));
    assert!(stdout.contains("1\t4.5\t6.4\tversicolor\tf-05"));
    assert!(stdout.contains("rows: 5"));
    assert!(stdout.contains("filters: none"));
    assert!(stdout.contains("4\t4.5\t6.4\tversicolor\tf-05"));
    Ok(())
}

#[tokio::test]
async fn shell_over_generator_pulls_region() -> TestResult<()> {
    let input = "roi rows 100..110\npull 3\nstatus\nstats\nquit\n";
    let output = run_shell_with_input(&["shell", "--generate", "--seed", "3"], input).await?;

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("region: rows 100..110"));
    assert!(stdout.contains("admitted 5"));
    assert!(stdout.contains("materialized: 10"));
    assert!(stdout.contains("region coverage: 100.0%"));
    assert!(stdout.contains("attribute") && stdout.contains("unknown"));
    Ok(())
}

#[tokio::test]
async fn shell_prefetch_uses_config_file() -> TestResult<()> {
    let tmp = TempDir::new()?;
    let config = tmp.path().join("prefetch.json");
    std::fs::write(&config, r#"{"interval_ms": 10, "batch_rows": 3}"#)?;
    let config_str = config.to_string_lossy();

    let input = "prefetch start\nstatus\nprefetch stop\nexit\n";
    let output = run_shell_with_input(
        &["shell", "--generate", "--prefetch-config", config_str.as_ref()],
        input,
    )
    .await?;

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("prefetch: on (every 10 ms, 3 rows per cycle)"));
    assert!(stdout.contains("prefetch: off"));
    Ok(())
}

#[tokio::test]
async fn shell_requires_a_source() -> TestResult<()> {
    let output = run_shell_with_input(&["shell"], "exit\n").await?;
    assert!(!output.status.success());
    Ok(())
}
