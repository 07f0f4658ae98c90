/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use crate::command::CommandLine;
use anyhow::Context;
use chrono::{DateTime, Local, Utc};
use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    process::{ExitStatus, Stdio},
};
use tokio::{
    fs::File,
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    process::ChildStdin,
};
use tracing::{debug, info, warn};

/// Seconds added either side of a run so rendered panels include the samples around it.
pub const WINDOW_BUFFER_SECS: i64 = 5;

pub const LOG_FILE_NAME: &str = "elbencho.log";
pub const DESCRIPTION_FILE_NAME: &str = "run_description.txt";

pub fn window_start_ms(start_secs: i64) -> i64 {
    (start_secs - WINDOW_BUFFER_SECS) * 1000
}

pub fn window_end_ms(end_secs: i64) -> i64 {
    (end_secs + WINDOW_BUFFER_SECS) * 1000
}

/// Dashboard time range covering a run, in epoch milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub from_ms: i64,
    pub to_ms: i64,
}
impl TimeWindow {
    pub fn around(start: &DateTime<Utc>, end: &DateTime<Utc>) -> Self {
        Self {
            from_ms: window_start_ms(start.timestamp()),
            to_ms: window_end_ms(end.timestamp()),
        }
    }
}

/// The result of executing one run.
#[derive(Debug)]
pub struct RunOutcome {
    pub run_dir: PathBuf,
    pub log_path: PathBuf,
    pub started: DateTime<Utc>,
    pub finished: DateTime<Utc>,
    pub window: TimeWindow,
    pub status: ExitStatus,
}
impl RunOutcome {
    pub fn success(&self) -> bool {
        self.status.success()
    }
}

/// Creates a fresh directory named after the given time with second resolution. If a run already
/// claimed that second, `_1`, `_2`, ... is appended until an unused name is found.
pub fn create_run_dir(results_dir: &Path, now: &DateTime<Local>) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(results_dir).context(format!(
        "Unable to create results directory {}",
        results_dir.display()
    ))?;

    let base = now.format("%Y%m%d_%H%M%S").to_string();
    let mut suffix = 0;
    loop {
        let name = match suffix {
            0 => base.clone(),
            n => format!("{}_{}", base, n),
        };
        let dir = results_dir.join(name);
        match std::fs::create_dir(&dir) {
            Ok(()) => return Ok(dir),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => suffix += 1,
            Err(e) => {
                return Err(e).context(format!("Unable to create run directory {}", dir.display()))
            }
        }
    }
}

pub async fn write_description(run_dir: &Path, description: &str) -> anyhow::Result<()> {
    let path = run_dir.join(DESCRIPTION_FILE_NAME);
    tokio::fs::write(&path, format!("{}\n", description))
        .await
        .context(format!("Unable to write {}", path.display()))
}

/// Runs the benchmark to completion inside `run_dir`.
///
/// Everything the benchmark prints is written to the run log and echoed to the terminal. When a
/// forwarder is given, the benchmark's stdout is also piped into it line by line. A benchmark that
/// exits unsuccessfully is not an error here, the status is reported in the outcome and the log.
pub async fn execute(
    run_dir: &Path,
    benchmark: &CommandLine,
    forwarder: Option<&CommandLine>,
) -> anyhow::Result<RunOutcome> {
    let log_path = run_dir.join(LOG_FILE_NAME);
    let mut log = File::create(&log_path)
        .await
        .context(format!("Unable to create log file {}", log_path.display()))?;
    log.write_all(format!("$ {}\n", benchmark).as_bytes()).await?;

    let mut forwarder_child = match forwarder {
        Some(cmd) => {
            debug!("Starting forwarder: {}", cmd);
            let child = cmd
                .to_command()
                .stdin(Stdio::piped())
                .kill_on_drop(true)
                .spawn()
                .context(format!("Failed to start forwarder {}", cmd.program))?;
            Some(child)
        }
        None => None,
    };
    let mut forward_to = forwarder_child.as_mut().and_then(|child| child.stdin.take());

    let started = Utc::now();
    info!("Running {}", benchmark);
    let mut child = benchmark
        .to_command()
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .context(format!("Failed to start benchmark {}", benchmark.program))?;

    let stdout = child.stdout.take().context("Benchmark stdout should be piped")?;
    let stderr = child.stderr.take().context("Benchmark stderr should be piped")?;
    // split on raw bytes, benchmark output is not guaranteed to be valid UTF-8
    let mut stdout_lines = BufReader::new(stdout).split(b'\n');
    let mut stderr_lines = BufReader::new(stderr).split(b'\n');
    let (mut stdout_open, mut stderr_open) = (true, true);

    while stdout_open || stderr_open {
        tokio::select! {
            line = stdout_lines.next_segment(), if stdout_open => match line? {
                Some(line) => {
                    println!("{}", String::from_utf8_lossy(&line));
                    log.write_all(&line).await?;
                    log.write_all(b"\n").await?;
                    forward_line(&mut forward_to, &line).await;
                }
                None => stdout_open = false,
            },
            line = stderr_lines.next_segment(), if stderr_open => match line? {
                Some(line) => {
                    eprintln!("{}", String::from_utf8_lossy(&line));
                    log.write_all(&line).await?;
                    log.write_all(b"\n").await?;
                }
                None => stderr_open = false,
            },
        }
    }

    let status = child.wait().await.context("Failed waiting for benchmark")?;
    let finished = Utc::now();

    // closing stdin lets the forwarder flush and exit on its own
    drop(forward_to);
    if let Some(mut forwarder_child) = forwarder_child {
        match forwarder_child.wait().await {
            Ok(status) if status.success() => debug!("Forwarder exited successfully"),
            Ok(status) => warn!("Forwarder exited with {}", status),
            Err(e) => warn!("Error waiting for forwarder: {}", e),
        }
    }

    let window = TimeWindow::around(&started, &finished);
    if !status.success() {
        warn!("Benchmark exited with {}", status);
    }
    log.write_all(timing_footer(&started, &finished, &window, &status).as_bytes())
        .await?;
    log.flush().await?;

    Ok(RunOutcome {
        run_dir: run_dir.to_path_buf(),
        log_path,
        started,
        finished,
        window,
        status,
    })
}

/// Writes one line to the forwarder. A forwarder that went away is dropped so the benchmark output
/// keeps being logged.
async fn forward_line(forward_to: &mut Option<ChildStdin>, line: &[u8]) {
    if let Some(stdin) = forward_to {
        let res = async {
            stdin.write_all(line).await?;
            stdin.write_all(b"\n").await
        }
        .await;
        if let Err(e) = res {
            warn!("Forwarder stopped accepting data, no longer forwarding: {}", e);
            *forward_to = None;
        }
    }
}

fn timing_footer(
    started: &DateTime<Utc>,
    finished: &DateTime<Utc>,
    window: &TimeWindow,
    status: &ExitStatus,
) -> String {
    let duration = (*finished - *started).num_milliseconds() as f64 / 1000.0;
    format!(
        "\n==== timing ====\nstart: {} ({} ns)\nend: {} ({} ns)\nduration: {:.3}s\nwindow: {} .. {}\nexit status: {}\n",
        started.with_timezone(&Local).to_rfc3339(),
        started.timestamp_nanos_opt().unwrap_or_default(),
        finished.with_timezone(&Local).to_rfc3339(),
        finished.timestamp_nanos_opt().unwrap_or_default(),
        duration,
        window.from_ms,
        window.to_ms,
        status
    )
}
