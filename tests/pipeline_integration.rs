//! End-to-end runs through the library with real child processes
//!
//! Stages are played by a shell script standing in for the launcher; it
//! writes every declared output and fails on inputs tagged `FAIL`.

mod common;

use common::Workspace;
use she_pipeline::config::{RunArgs, RunnerConfig};
use she_pipeline::error::EXIT_WORKER;
use she_pipeline::merge::AGGREGATE_LISTFILE;
use she_pipeline::product::read_listfile;
use she_pipeline::runner::PipelineRunner;
use she_pipeline::stage::{FINAL_MEASUREMENTS, FINAL_RESIDUALS};
use she_pipeline::subprocess::SubprocessManager;
use she_pipeline::supervisor::SupervisionPolicy;
use std::time::Duration;

fn run_args(ws: &Workspace) -> RunArgs {
    RunArgs {
        isf: Some("bias_isf.txt".to_string()),
        workdir: Some(ws.root().to_path_buf()),
        pipeline_dir: Some(ws.path("pkg")),
        settings: Some(ws.settings()),
        ..RunArgs::default()
    }
}

fn runner(args: RunArgs, concurrency: usize) -> PipelineRunner {
    let mut config = RunnerConfig::from_args(args).unwrap();
    config.concurrency = concurrency;
    let processes = SubprocessManager::production(Duration::from_secs(1));
    PipelineRunner::new(config, processes.runner()).unwrap()
}

#[tokio::test]
async fn test_five_simulations_in_three_batches() {
    let ws = Workspace::with_configs(&["s0.xml", "s1.xml", "s2.xml", "s3.xml", "s4.xml"]);
    let mut args = run_args(&ws);
    args.residuals = true;

    let report = runner(args, 2).run().await.unwrap();

    assert_eq!(report.batches.len(), 3);
    assert_eq!(report.batches[2].batch.worker_count, 1);
    let listed = read_listfile(&ws.path(AGGREGATE_LISTFILE)).unwrap();
    assert_eq!(listed.len(), 5);
    let mut distinct = listed.clone();
    distinct.sort();
    distinct.dedup();
    assert_eq!(distinct.len(), 5);
    for entry in &listed {
        assert!(ws.path(entry).exists(), "{entry} missing");
    }
    assert!(ws.path(FINAL_MEASUREMENTS).exists());
    assert!(ws.path(FINAL_RESIDUALS).exists());
    assert!(ws.path("thread0/logs/SHE_GST_GenGalaxyImages.out").exists());
}

#[tokio::test]
async fn test_fail_fast_with_real_processes() {
    let ws = Workspace::with_configs(&["s0.xml", "s1_FAIL.xml", "s2.xml"]);

    let err = runner(run_args(&ws), 3).run().await.unwrap_err();

    assert_eq!(err.exit_code(), EXIT_WORKER);
    assert!(!ws.path(FINAL_MEASUREMENTS).exists());
}

#[tokio::test]
async fn test_best_effort_with_real_processes() {
    let ws = Workspace::with_configs(&["s0.xml", "s1_FAIL.xml", "s2.xml"]);
    let mut args = run_args(&ws);
    args.policy = SupervisionPolicy::BestEffort;

    let report = runner(args, 3).run().await.unwrap();

    assert_eq!(report.failed_workers(), 1);
    let listed = read_listfile(&ws.path(AGGREGATE_LISTFILE)).unwrap();
    assert_eq!(
        listed,
        vec![
            "thread0/data/shear_bias_measurements_sim0.xml",
            "thread2/data/shear_bias_measurements_sim2.xml"
        ]
    );
    assert!(ws.path(FINAL_MEASUREMENTS).exists());
}

#[tokio::test]
async fn test_configs_generated_from_simulation_plan() {
    let ws = Workspace::with_configs(&[]);
    ws.write("data/plan.ecsv", "# simulation plan");
    ws.write("data/template.conf", "# configuration template");
    ws.write(
        "bias_isf.txt",
        "simulation_plan=data/plan.ecsv\nconfig_template=data/template.conf\nmdb=None\n",
    );

    let report = runner(run_args(&ws), 2).run().await.unwrap();

    assert_eq!(report.total_units, 2);
    assert_eq!(report.aggregate_entries, 2);
    assert!(ws.path("thread1/data/generated_1.xml").exists());
}

#[tokio::test]
async fn test_rerun_starts_a_fresh_aggregate() {
    let ws = Workspace::with_configs(&["s0.xml", "s1.xml"]);

    runner(run_args(&ws), 2).run().await.unwrap();
    runner(run_args(&ws), 1).run().await.unwrap();

    let listed = read_listfile(&ws.path(AGGREGATE_LISTFILE)).unwrap();
    assert_eq!(
        listed,
        vec![
            "thread0/data/shear_bias_measurements_sim0.xml",
            "thread0/data/shear_bias_measurements_sim1.xml"
        ]
    );
}

#[tokio::test]
async fn test_saved_args_replay_a_run() {
    let ws = Workspace::with_configs(&["s0.xml"]);
    runner(run_args(&ws), 1).run().await.unwrap();
    std::fs::remove_file(ws.path(FINAL_MEASUREMENTS)).unwrap();

    let replay = RunArgs {
        workdir: Some(ws.root().to_path_buf()),
        saved_args: Some("data/run_args.json".to_string()),
        ..RunArgs::default()
    };
    runner(replay, 1).run().await.unwrap();

    assert!(ws.path(FINAL_MEASUREMENTS).exists());
}
