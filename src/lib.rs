/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

pub mod command;
pub mod config;
pub mod executor;
pub mod file_size;
pub mod grafana;
pub mod nic;
pub mod params;
pub mod sweep;

use colored::*;
use config::{run::{plan_runs, Mode}, Settings};
use grafana::GrafanaClient;
use params::{Prompter, RawParams};
use std::io::{BufRead, Write};
use sweep::SweepReport;
use term_table::{row, row::Row, table_cell::*, Table, TableStyle};
use tracing::info;

#[derive(Debug)]
pub enum WizardResult {
    /// The user declined the confirmation prompt. Nothing was run.
    Aborted,
    Completed(SweepReport),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct WizardOptions {
    pub dry_run: bool,
    /// Take defaults for anything not given and skip the confirmation.
    pub assume_yes: bool,
}

/// Collects and validates the sweep parameters, asks for confirmation and runs the sweep.
///
/// Validation happens before anything is spawned; an invalid parameter aborts with an error.
pub async fn run_wizard<R: BufRead, W: Write>(
    settings: &Settings,
    raw: RawParams,
    mode: Mode,
    opts: WizardOptions,
    prompter: &mut Prompter<R, W>,
) -> anyhow::Result<WizardResult> {
    let custom = matches!(mode, Mode::Custom { .. });
    let raw = params::complete(raw, custom, opts.assume_yes, prompter)?;
    let (config, axes) = params::resolve(&raw, mode, opts.dry_run)?;
    let runs = plan_runs(&config.mode, &axes);

    let rows = params::summary(&config, &axes, runs.len())
        .into_iter()
        .map(|(key, value)| row![TableCell::new(key.bold()), TableCell::new(value)])
        .collect::<Vec<Row>>();
    prompter.writeln(format!("\n{}", " Parameters ".reversed().green()))?;
    prompter.writeln(
        Table::builder()
            .rows(rows)
            .style(TableStyle::rounded())
            .build()
            .render(),
    )?;
    if let Some(first) = runs.first() {
        let cmd = command::benchmark_command(&settings.benchmark, &config, first);
        prompter.writeln(format!("first run: {}", cmd.to_string().bright_black()))?;
    }

    if !opts.assume_yes && !prompter.ask_bool("Run with these parameters?", false)? {
        prompter.writeln("Aborted.".yellow())?;
        return Ok(WizardResult::Aborted);
    }

    let grafana = match (&settings.grafana, config.dry_run) {
        (Some(grafana_settings), false) if !grafana_settings.server.is_empty() => {
            let api_key = grafana::resolve_api_key(prompter)?;
            Some(GrafanaClient::new(grafana_settings, api_key)?)
        }
        _ => None,
    };

    info!("Starting {} sweep with {} runs", config.mode, runs.len());
    let report = sweep::run_sweep(settings, &config, &axes, grafana.as_ref()).await;
    Ok(WizardResult::Completed(report))
}
