mod common;

use common::{grafana_settings, panel, settings, start_fake_grafana, REJECTED_DASHBOARD};
use elbwiz::{
    config::run::{Mode, RunConfig, SweepAxes},
    executor::LOG_FILE_NAME,
    grafana::GrafanaClient,
    sweep::run_sweep,
};
use std::time::{Duration, Instant};

fn run_config(mode: Mode, dry_run: bool) -> RunConfig {
    RunConfig {
        mode,
        paths: vec!["/mnt/vol/file1".to_string()],
        size: "1g".to_string(),
        time_limit: None,
        random_offsets: false,
        delete_files: false,
        hosts: vec![],
        run_tag: "nightly".to_string(),
        description: Some("sweep test".to_string()),
        dry_run,
    }
}

fn axes(threads: Vec<u32>) -> SweepAxes {
    SweepAxes {
        threads,
        block_sizes: vec!["4k".to_string()],
        iodepths: vec![1],
    }
}

#[cfg(target_family = "unix")]
#[tokio::test]
async fn dry_run_executes_every_combination_without_side_channels() -> anyhow::Result<()> {
    let (server, recorded) = start_fake_grafana().await?;
    let dir = tempfile::tempdir()?;
    let mut settings = settings("echo", dir.path(), 60);
    let grafana = grafana_settings(&server, vec![1], vec![panel("throughput", "elbencho")]);
    let client = GrafanaClient::new(&grafana, "key".into())?;
    settings.grafana = Some(grafana);

    let started = Instant::now();
    let report = run_sweep(
        &settings,
        &run_config(Mode::Write, true),
        &axes(vec![8, 16]),
        Some(&client),
    )
    .await;

    // no inter-run sleep
    assert!(started.elapsed() < Duration::from_secs(30));
    assert_eq!(report.runs.len(), 2);
    assert_eq!(report.failed(), 0);

    let logs = report
        .runs
        .iter()
        .map(|run| {
            let dir = run.run_dir.as_ref().expect("dry runs still get a directory");
            assert!(dir.join("run_description.txt").exists());
            assert!(!dir.join("throughput.png").exists());
            std::fs::read_to_string(dir.join(LOG_FILE_NAME))
        })
        .collect::<Result<Vec<_>, _>>()?;
    assert!(logs[0].contains("--threads 8 --block 4k --iodepth 1"));
    assert!(logs[1].contains("--threads 16 --block 4k --iodepth 1"));
    assert!(logs.iter().all(|log| log.contains("--dryrun")));

    assert!(recorded.annotations().is_empty());
    assert!(recorded.renders().is_empty());
    assert!(!dir.path().join("forwarded.csv").exists());
    Ok(())
}

#[cfg(target_family = "unix")]
#[tokio::test]
async fn failing_runs_do_not_stop_the_sweep() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let settings = settings("false", dir.path(), 0);

    let report = run_sweep(&settings, &run_config(Mode::Read, false), &axes(vec![1, 2, 4]), None).await;

    assert_eq!(report.runs.len(), 3);
    assert_eq!(report.failed(), 3);
    assert!(report.runs.iter().all(|run| run.exit_code == Some(1)));
    assert!(report.runs.iter().all(|run| run.error.is_none()));
    assert_eq!(
        report.runs.iter().map(|run| run.index).collect::<Vec<_>>(),
        [1, 2, 3]
    );
    Ok(())
}

#[cfg(target_family = "unix")]
#[tokio::test]
async fn missing_benchmark_is_recorded_and_sweep_continues() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let settings = settings("definitely-not-elbencho", dir.path(), 0);

    let report = run_sweep(&settings, &run_config(Mode::Read, true), &axes(vec![1, 2]), None).await;

    assert_eq!(report.runs.len(), 2);
    for run in &report.runs {
        assert!(run.error.is_some());
        let run_dir = run.run_dir.as_ref().expect("directory is reported for failed runs");
        let log = std::fs::read_to_string(run_dir.join(LOG_FILE_NAME))?;
        assert!(log.starts_with("$ definitely-not-elbencho"));
    }
    Ok(())
}

#[cfg(target_family = "unix")]
#[tokio::test]
async fn sleeps_between_runs_but_not_after_the_last() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let settings = settings("echo", dir.path(), 1);

    let started = Instant::now();
    let report = run_sweep(&settings, &run_config(Mode::Write, false), &axes(vec![1, 2]), None).await;
    let elapsed = started.elapsed();

    assert_eq!(report.runs.len(), 2);
    assert_eq!(report.failed(), 0);
    assert!(elapsed >= Duration::from_secs(1));
    assert!(elapsed < Duration::from_secs(2) + Duration::from_millis(1500));
    Ok(())
}

#[cfg(target_family = "unix")]
#[tokio::test]
async fn annotations_and_screenshots_bracket_each_run() -> anyhow::Result<()> {
    let (server, recorded) = start_fake_grafana().await?;
    let dir = tempfile::tempdir()?;
    let mut settings = settings("echo", dir.path(), 0);
    let grafana = grafana_settings(
        &server,
        vec![1, REJECTED_DASHBOARD],
        vec![panel("throughput", "elbencho"), panel("latency", "broken")],
    );
    let client = GrafanaClient::new(&grafana, "key".into())?;
    settings.grafana = Some(grafana);

    let report = run_sweep(
        &settings,
        &run_config(Mode::ReadWrite, false),
        &axes(vec![8]),
        Some(&client),
    )
    .await;

    // write then read
    assert_eq!(report.runs.len(), 2);
    assert_eq!(report.failed(), 0);
    assert!(report.runs[0].label.starts_with("write"));
    assert!(report.runs[1].label.starts_with("read"));

    let tags = recorded
        .annotations()
        .iter()
        .map(|a| a.body["tags"][0].as_str().unwrap_or_default().to_string())
        .collect::<Vec<_>>();
    assert_eq!(
        tags,
        [
            "run_start",
            "run_start",
            "run_complete",
            "run_complete",
            "run_start",
            "run_start",
            "run_complete",
            "run_complete"
        ]
    );

    for run in &report.runs {
        let run_dir = run.run_dir.as_ref().unwrap();
        assert_eq!(run.screenshots, 1);
        assert!(run_dir.join("throughput.png").exists());
        assert!(!run_dir.join("latency.png").exists());
    }

    let forwarded = std::fs::read_to_string(dir.path().join("forwarded.csv"))?;
    assert!(forwarded.contains("--write"));
    assert!(forwarded.contains("--read"));
    assert!(!forwarded.contains("--dryrun"));
    Ok(())
}
