/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use crate::{
    command::{benchmark_command, forwarder_command},
    config::{
        run::{plan_runs, RunConfig, RunInstance, SweepAxes},
        Panel, Settings,
    },
    executor::{self, RunOutcome, TimeWindow},
    grafana::{AnnotationTag, GrafanaClient},
};
use anyhow::Context;
use chrono::{Local, Utc};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::{
    path::{Path, PathBuf},
    time::Duration,
};
use term_table::{row, row::Row, rows, table_cell::*, Table, TableStyle};
use tracing::{error, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub index: usize,
    pub label: String,
    pub command: String,
    pub run_dir: Option<PathBuf>,
    pub exit_code: Option<i32>,
    pub success: bool,
    pub screenshots: usize,
    pub error: Option<String>,
}

#[derive(Debug, Default)]
pub struct SweepReport {
    pub runs: Vec<RunSummary>,
}
impl SweepReport {
    pub fn failed(&self) -> usize {
        self.runs.iter().filter(|run| !run.success).count()
    }

    pub fn render_table(&self) -> String {
        let mut rows = rows![row![
            TableCell::new("#".bold()),
            TableCell::new("Run".bold()),
            TableCell::new("Exit".bold()),
            TableCell::new("Screenshots".bold()),
            TableCell::new("Directory".bold())
        ]];
        for run in &self.runs {
            let exit = match (&run.error, run.exit_code) {
                (Some(_), _) => "error".red(),
                (None, Some(0)) => "0".green(),
                (None, Some(code)) => code.to_string().red(),
                (None, None) => "signal".red(),
            };
            rows.push(row![
                TableCell::new(run.index),
                TableCell::new(&run.label),
                TableCell::new(exit),
                TableCell::new(run.screenshots),
                TableCell::new(
                    run.run_dir
                        .as_ref()
                        .map(|dir| dir.display().to_string())
                        .unwrap_or("--".to_string())
                )
            ]);
        }

        Table::builder()
            .rows(rows)
            .style(TableStyle::rounded())
            .build()
            .render()
    }
}

/// Runs every combination of the sweep axes one after another.
///
/// Runs are strictly sequential. A run that fails, whether the benchmark exits unsuccessfully or
/// its directory can't be created, is recorded in the report and the sweep moves on. In dry run
/// mode the forwarder is never started, Grafana is never contacted and there is no pause between
/// runs.
pub async fn run_sweep(
    settings: &Settings,
    config: &RunConfig,
    axes: &SweepAxes,
    grafana: Option<&GrafanaClient>,
) -> SweepReport {
    let grafana = if config.dry_run { None } else { grafana };
    let panels = settings
        .grafana
        .as_ref()
        .map(|g| g.panels.as_slice())
        .unwrap_or_default();
    let delay = Duration::from_secs(settings.sweep.sleep_between_runs);

    let runs = plan_runs(&config.mode, axes);
    let total = runs.len();
    let mut report = SweepReport::default();

    for instance in runs {
        println!(
            "> running {}/{} - {}",
            instance.index,
            total,
            instance.label().green()
        );

        // failed runs still report their directory
        let summary = match executor::create_run_dir(&settings.sweep.results_dir, &Local::now()) {
            Ok(run_dir) => {
                match run_instance(settings, config, &instance, &run_dir, grafana, panels).await {
                    Ok(summary) => summary,
                    Err(e) => failed_run(settings, config, &instance, Some(run_dir), e),
                }
            }
            Err(e) => failed_run(settings, config, &instance, None, e),
        };
        report.runs.push(summary);

        if instance.index < total && !config.dry_run && !delay.is_zero() {
            pause(delay).await;
        }
    }

    report
}

fn failed_run(
    settings: &Settings,
    config: &RunConfig,
    instance: &RunInstance,
    run_dir: Option<PathBuf>,
    e: anyhow::Error,
) -> RunSummary {
    error!("Run {} ({}) failed: {:#}", instance.index, instance.label(), e);
    RunSummary {
        index: instance.index,
        label: instance.label(),
        command: benchmark_command(&settings.benchmark, config, instance).to_string(),
        run_dir,
        exit_code: None,
        success: false,
        screenshots: 0,
        error: Some(format!("{:#}", e)),
    }
}

async fn run_instance(
    settings: &Settings,
    config: &RunConfig,
    instance: &RunInstance,
    run_dir: &Path,
    grafana: Option<&GrafanaClient>,
    panels: &[Panel],
) -> anyhow::Result<RunSummary> {
    let benchmark = benchmark_command(&settings.benchmark, config, instance);
    let forwarder =
        (!config.dry_run).then(|| forwarder_command(&settings.forwarder, &config.run_tag));

    info!("Run {} writing to {}", instance.index, run_dir.display());
    if let Some(description) = &config.description {
        executor::write_description(run_dir, description).await?;
    }

    let text = format!("{} [{}] {}", config.run_tag, instance.index, instance.label());
    if let Some(grafana) = grafana {
        grafana
            .send_annotation(AnnotationTag::RunStart, &text, Utc::now().timestamp_millis())
            .await;
    }

    let outcome = executor::execute(run_dir, &benchmark, forwarder.as_ref())
        .await
        .context(format!("Run in {} did not complete", run_dir.display()))?;

    let mut screenshots = 0;
    if let Some(grafana) = grafana {
        grafana
            .send_annotation(
                AnnotationTag::RunComplete,
                &text,
                outcome.finished.timestamp_millis(),
            )
            .await;
        screenshots = capture_panels(grafana, panels, &outcome).await;
    }

    if outcome.success() {
        println!("\t{}", "✓".green());
    } else {
        println!("\t{} {}", "✗".red(), outcome.status.to_string().bright_black());
    }

    Ok(RunSummary {
        index: instance.index,
        label: instance.label(),
        command: benchmark.to_string(),
        run_dir: Some(outcome.run_dir.clone()),
        exit_code: outcome.status.code(),
        success: outcome.success(),
        screenshots,
        error: None,
    })
}

/// Saves every configured panel for the run's window, skipping (and logging) panels that fail to
/// render.
async fn capture_panels(grafana: &GrafanaClient, panels: &[Panel], outcome: &RunOutcome) -> usize {
    if panels.is_empty() {
        return 0;
    }
    wait_for_window_end(&outcome.window).await;

    let mut saved = 0;
    for panel in panels {
        match grafana.save_panel(panel, &outcome.window, &outcome.run_dir).await {
            Ok(path) => {
                info!("Saved panel {} to {}", panel.name, path.display());
                saved += 1;
            }
            Err(e) => warn!("Skipping screenshot of panel {}: {:#}", panel.name, e),
        }
    }
    saved
}

/// The render window ends a few seconds after the run, so don't ask for it before then.
async fn wait_for_window_end(window: &TimeWindow) {
    let remaining = window.to_ms - Utc::now().timestamp_millis();
    if remaining > 0 {
        tokio::time::sleep(Duration::from_millis(remaining as u64)).await;
    }
}

async fn pause(delay: Duration) {
    let pb = ProgressBar::new(delay.as_secs());
    pb.set_style(
        ProgressStyle::with_template("  sleeping {spinner:.green} [{wide_bar:.cyan/blue}] {pos}/{len}s")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    for _ in 0..delay.as_secs() {
        tokio::time::sleep(Duration::from_secs(1)).await;
        pb.inc(1);
    }
    pb.finish_and_clear();
}
