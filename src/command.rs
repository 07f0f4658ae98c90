/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use crate::config::{
    run::{Mode, Phase, RunConfig, RunInstance},
    BenchmarkSettings, ForwarderSettings,
};
use anyhow::{anyhow, Context};
use std::fmt;

/// Live statistics interval in milliseconds, fixed so the forwarder sees one sample per second.
pub const LIVE_INTERVAL_MS: u32 = 1000;

/// A program and its argument vector. Never passed through a shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub program: String,
    pub args: Vec<String>,
}
impl CommandLine {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: vec![],
        }
    }

    fn arg(&mut self, arg: impl Into<String>) -> &mut Self {
        self.args.push(arg.into());
        self
    }

    fn flag_value(&mut self, flag: &str, value: impl ToString) -> &mut Self {
        self.arg(flag).arg(value.to_string())
    }

    pub fn to_command(&self) -> tokio::process::Command {
        let mut command = tokio::process::Command::new(&self.program);
        command.args(&self.args);
        command
    }
}
impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let words = std::iter::once(self.program.as_str()).chain(self.args.iter().map(|a| a.as_str()));
        match shlex::try_join(words.clone()) {
            Ok(joined) => write!(f, "{}", joined),
            // nul bytes can't be quoted, fall back to a plain join
            Err(_) => write!(f, "{}", words.collect::<Vec<_>>().join(" ")),
        }
    }
}

/// Builds the benchmark invocation for a single run.
pub fn benchmark_command(
    settings: &BenchmarkSettings,
    config: &RunConfig,
    instance: &RunInstance,
) -> CommandLine {
    let mut cmd = CommandLine::new(&settings.binary);

    match instance.phase {
        Phase::Read => {
            cmd.arg("--read");
        }
        Phase::Write => {
            cmd.arg("--write");
        }
        Phase::Custom => {
            if let Mode::Custom { args } = &config.mode {
                for arg in args {
                    cmd.arg(arg);
                }
            }
        }
    }
    if settings.direct && instance.phase != Phase::Custom {
        cmd.arg("--direct");
    }

    let combination = &instance.combination;
    cmd.flag_value("--threads", combination.threads)
        .flag_value("--block", &combination.block_size)
        .flag_value("--iodepth", combination.iodepth)
        .flag_value("--size", &config.size);

    if config.random_offsets {
        cmd.arg("--rand");
    }
    if let Some(time_limit) = config.time_limit {
        cmd.arg("--infloop").flag_value("--timelimit", time_limit);
    }
    if !config.hosts.is_empty() {
        cmd.flag_value("--hosts", config.hosts.join(","));
    }
    if config.delete_files {
        cmd.arg("--delfiles");
    }
    if instance.phase == Phase::Write {
        cmd.arg("--lat").arg("--cpu");
    }
    cmd.flag_value("--livecsv", "stdout")
        .flag_value("--liveint", LIVE_INTERVAL_MS);
    if config.dry_run {
        cmd.arg("--dryrun");
    }

    for path in &config.paths {
        cmd.arg(path);
    }
    cmd
}

/// Builds the forwarder invocation that reads the benchmark's live csv on stdin.
pub fn forwarder_command(settings: &ForwarderSettings, run_tag: &str) -> CommandLine {
    let mut cmd = CommandLine::new(&settings.program);
    for arg in &settings.args {
        cmd.arg(arg);
    }
    cmd.flag_value("-s", &settings.graphite_server)
        .flag_value("-t", run_tag);
    cmd
}

/// Splits user supplied benchmark arguments using POSIX shell word rules.
pub fn split_custom_args(text: &str) -> anyhow::Result<Vec<String>> {
    let words = shlex::split(text).context("Custom arguments are not POSIX compliant")?;
    if words.is_empty() {
        return Err(anyhow!("Custom arguments must not be empty"));
    }
    Ok(words)
}

/// Expands shell style brace patterns, e.g. `/mnt/vol{1..3}/file{a,b}`.
///
/// Supports comma lists and numeric ranges, including zero padded ranges such as `{01..10}` and
/// descending ranges. Braces that contain neither form are kept literally.
pub fn expand_braces(pattern: &str) -> Vec<String> {
    let Some((open, close)) = find_brace_group(pattern) else {
        return vec![pattern.to_string()];
    };

    let prefix = &pattern[..open];
    let body = &pattern[open + 1..close];
    let suffix = &pattern[close + 1..];

    let alternatives = match range_alternatives(body) {
        Some(alternatives) => alternatives,
        None => split_top_level(body),
    };

    alternatives
        .iter()
        .flat_map(|alt| expand_braces(&format!("{}{}{}", prefix, alt, suffix)))
        .collect()
}

/// Returns the byte offsets of the first expandable `{...}` group.
fn find_brace_group(pattern: &str) -> Option<(usize, usize)> {
    let bytes = pattern.as_bytes();
    let mut start = 0;
    while let Some(rel) = pattern[start..].find('{') {
        let open = start + rel;
        let mut depth = 0;
        let mut close = None;
        for (i, b) in bytes.iter().enumerate().skip(open) {
            match b {
                b'{' => depth += 1,
                b'}' => {
                    depth -= 1;
                    if depth == 0 {
                        close = Some(i);
                        break;
                    }
                }
                _ => {}
            }
        }
        let close = close?;
        let body = &pattern[open + 1..close];
        if range_alternatives(body).is_some() || split_top_level(body).len() > 1 {
            return Some((open, close));
        }
        start = open + 1;
    }
    None
}

fn split_top_level(body: &str) -> Vec<String> {
    let mut parts = vec![];
    let mut depth = 0;
    let mut current = String::new();
    for c in body.chars() {
        match c {
            '{' => {
                depth += 1;
                current.push(c);
            }
            '}' => {
                depth -= 1;
                current.push(c);
            }
            ',' if depth == 0 => parts.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    parts.push(current);
    parts
}

fn range_alternatives(body: &str) -> Option<Vec<String>> {
    let (from, to) = body.split_once("..")?;
    let start: i64 = from.parse().ok()?;
    let end: i64 = to.parse().ok()?;

    let padded = |s: &str| s.trim_start_matches('-').len() > 1 && s.trim_start_matches('-').starts_with('0');
    let width = if padded(from) || padded(to) {
        from.len().max(to.len())
    } else {
        0
    };

    let values: Vec<i64> = if start <= end {
        (start..=end).collect()
    } else {
        (end..=start).rev().collect()
    };
    Some(
        values
            .into_iter()
            .map(|v| format!("{:0width$}", v, width = width))
            .collect(),
    )
}
