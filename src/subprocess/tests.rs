use super::*;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[tokio::test]
async fn test_production_runner_success() {
    let runner = TokioProcessRunner::default();
    let command = ProcessCommandBuilder::new("echo")
        .args(["hello world"])
        .build();

    let output = runner.run(command).await.unwrap();
    assert!(output.status.success());
    assert_eq!(output.stdout.trim(), "hello world");
    assert!(output.stderr.is_empty());
}

#[tokio::test]
async fn test_production_runner_failure() {
    let runner = TokioProcessRunner::default();
    let command = ProcessCommandBuilder::new("sh")
        .args(["-c", "echo broken >&2; exit 3"])
        .build();

    let output = runner.run(command).await.unwrap();
    assert!(!output.status.success());
    assert_eq!(output.status.code(), Some(3));
    assert_eq!(output.stderr.trim(), "broken");
}

#[tokio::test]
async fn test_production_runner_command_not_found() {
    let runner = TokioProcessRunner::default();
    let command = ProcessCommandBuilder::new("nonexistent-command-12345").build();

    let result = runner.run(command).await;
    assert!(matches!(
        result.unwrap_err(),
        ProcessError::CommandNotFound(_)
    ));
}

#[tokio::test]
async fn test_production_runner_working_dir() {
    let dir = tempfile::TempDir::new().unwrap();
    let runner = TokioProcessRunner::default();
    let command = ProcessCommandBuilder::new("sh")
        .args(["-c", "pwd"])
        .current_dir(dir.path())
        .build();

    let output = runner.run(command).await.unwrap();
    assert_eq!(
        std::fs::canonicalize(output.stdout.trim()).unwrap(),
        std::fs::canonicalize(dir.path()).unwrap()
    );
}

#[tokio::test]
async fn test_dropping_run_kills_process() {
    let dir = tempfile::TempDir::new().unwrap();
    let marker = dir.path().join("survived");
    let script = format!("sleep 2; touch {}", marker.display());

    let runner = TokioProcessRunner::default();
    let command = ProcessCommandBuilder::new("sh").args(["-c", script.as_str()]).build();

    let start = Instant::now();
    let result = tokio::time::timeout(Duration::from_millis(200), runner.run(command)).await;
    assert!(result.is_err());
    assert!(start.elapsed() < Duration::from_secs(2));

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert!(!marker.exists());
}

#[tokio::test]
async fn test_mock_answers_with_first_matching_response() {
    let mut mock = MockProcessRunner::new();
    mock.expect_command("E-Run")
        .with_args(|args| args.get(2).map(String::as_str) == Some("SHE_CTE_EstimateShear"))
        .returns_stderr("ERROR: no PSF")
        .returns_exit_code(1)
        .finish();
    mock.expect_command("E-Run").finish();

    let estimate = ProcessCommandBuilder::launcher("E-Run", &[])
        .args(["SHE_CTE", "0.8.5", "SHE_CTE_EstimateShear"])
        .build();
    let output = mock.run(estimate).await.unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert_eq!(output.stderr, "ERROR: no PSF");

    let statistics = ProcessCommandBuilder::launcher("E-Run", &[])
        .args(["SHE_CTE", "0.8.5", "SHE_CTE_MeasureStatistics"])
        .build();
    assert!(mock.run(statistics).await.unwrap().status.success());

    let calls = mock.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[1].args[2], "SHE_CTE_MeasureStatistics");
}

#[tokio::test]
async fn test_mock_side_effect_and_unscripted_program() {
    let dir = tempfile::TempDir::new().unwrap();
    let out = dir.path().join("out.xml");
    let out_clone = out.clone();

    let mut mock = MockProcessRunner::new();
    mock.expect_command("E-Run")
        .on_call(move |_| std::fs::write(&out_clone, "<p/>").unwrap())
        .finish();

    assert!(mock.run(ProcessCommandBuilder::new("E-Run").build()).await.is_ok());
    assert!(out.exists());

    let err = mock
        .run(ProcessCommandBuilder::new("pipeline_runner.py").build())
        .await
        .unwrap_err();
    assert!(matches!(err, ProcessError::Unexpected(_)));
}

#[tokio::test]
async fn test_subprocess_manager_shares_runner() {
    let mut mock = MockProcessRunner::new();
    mock.expect_command("pipeline_runner.py")
        .returns_exit_code(2)
        .finish();
    let manager = SubprocessManager::new(Arc::new(mock.clone()));

    let output = manager
        .runner()
        .run(ProcessCommandBuilder::new("pipeline_runner.py").build())
        .await
        .unwrap();

    assert_eq!(output.status.code(), Some(2));
    assert_eq!(mock.calls().len(), 1);
}
