/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Turns raw user input (flags or interactive answers) into a validated [`RunConfig`] and
//! [`SweepAxes`] pair. Nothing here spawns a process.

use crate::{
    command::{expand_braces, split_custom_args},
    config::run::{Mode, RunConfig, SweepAxes},
};
use anyhow::{anyhow, Context};
use colored::Colorize;
use itertools::Itertools;
use std::{
    fmt::Display,
    io::{BufRead, Write},
    str::FromStr,
};

pub const DEFAULT_THREADS: &str = "32";
pub const DEFAULT_BLOCK_SIZES: &str = "1m";
pub const DEFAULT_IODEPTHS: &str = "1";
pub const DEFAULT_SIZE: &str = "1g";
pub const DEFAULT_RUN_TAG: &str = "elbencho";

/// Raw, unvalidated wizard answers. `None` means "not given on the command line".
#[derive(Debug, Clone, Default)]
pub struct RawParams {
    pub path: Option<String>,
    pub threads: Option<String>,
    pub block_sizes: Option<String>,
    pub iodepths: Option<String>,
    pub size: Option<String>,
    pub time_limit: Option<String>,
    pub random_offsets: Option<bool>,
    pub delete_files: Option<bool>,
    pub hosts: Option<String>,
    pub run_tag: Option<String>,
    pub description: Option<String>,
    pub custom_args: Option<String>,
}

/// Line based question/answer helper. Generic over the streams so it can be driven from tests.
pub struct Prompter<R, W> {
    input: R,
    output: W,
}
impl<R: BufRead, W: Write> Prompter<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    /// Asks a question and returns the trimmed answer, or the default when the answer is blank.
    pub fn ask(&mut self, question: &str, default: Option<&str>) -> anyhow::Result<String> {
        match default {
            Some(default) if !default.is_empty() => {
                write!(self.output, "{} [{}]: ", question, default.bright_black())?
            }
            _ => write!(self.output, "{}: ", question)?,
        }
        self.output.flush()?;

        let mut answer = String::new();
        let read = self.input.read_line(&mut answer)?;
        if read == 0 {
            return Err(anyhow!("Input closed while waiting for '{}'", question));
        }

        let answer = answer.trim();
        if answer.is_empty() {
            Ok(default.unwrap_or_default().to_string())
        } else {
            Ok(answer.to_string())
        }
    }

    pub fn ask_bool(&mut self, question: &str, default: bool) -> anyhow::Result<bool> {
        loop {
            let default_str = if default { "y" } else { "n" };
            let answer = self.ask(&format!("{} (y/n)", question), Some(default_str))?;
            match answer.to_lowercase().as_str() {
                "y" | "yes" => return Ok(true),
                "n" | "no" => return Ok(false),
                _ => writeln!(self.output, "{}", "Please enter y or n.".yellow())?,
            }
        }
    }

    pub fn writeln(&mut self, line: impl Display) -> anyhow::Result<()> {
        writeln!(self.output, "{}", line)?;
        Ok(())
    }
}

/// Fills in everything the user didn't pass as a flag, by asking or, when `assume_defaults` is
/// set, by taking the documented default.
pub fn complete<R: BufRead, W: Write>(
    mut raw: RawParams,
    custom: bool,
    assume_defaults: bool,
    prompter: &mut Prompter<R, W>,
) -> anyhow::Result<RawParams> {
    macro_rules! fill {
        ($field:ident, $question:expr, $default:expr) => {
            if raw.$field.is_none() {
                raw.$field = Some(if assume_defaults {
                    $default.to_string()
                } else {
                    prompter.ask($question, Some($default))?
                });
            }
        };
    }

    if custom {
        fill!(custom_args, "Benchmark arguments (e.g. --write --files 10)", "");
    }
    fill!(path, "Volume path (brace patterns like file{1..4} allowed)", "");
    fill!(threads, "Thread counts (space separated)", DEFAULT_THREADS);
    fill!(block_sizes, "Block sizes (space separated)", DEFAULT_BLOCK_SIZES);
    fill!(iodepths, "IO depths (space separated)", DEFAULT_IODEPTHS);
    fill!(size, "File size", DEFAULT_SIZE);
    fill!(time_limit, "Time limit in seconds (blank runs to completion)", "");
    fill!(hosts, "Hosts (space separated, blank for local)", "");
    fill!(run_tag, "Run tag", DEFAULT_RUN_TAG);
    fill!(description, "Run description (optional)", "");

    if raw.random_offsets.is_none() {
        raw.random_offsets = Some(!assume_defaults && prompter.ask_bool("Random offsets", false)?);
    }
    if raw.delete_files.is_none() {
        raw.delete_files =
            Some(!assume_defaults && prompter.ask_bool("Delete files after the run", false)?);
    }

    Ok(raw)
}

/// Validates the answers and produces the immutable sweep description.
pub fn resolve(raw: &RawParams, mode: Mode, dry_run: bool) -> anyhow::Result<(RunConfig, SweepAxes)> {
    let mode = match mode {
        Mode::Custom { args } if args.is_empty() => Mode::Custom {
            args: split_custom_args(raw.custom_args.as_deref().unwrap_or_default())?,
        },
        mode => mode,
    };

    let path = raw.path.as_deref().unwrap_or_default().trim();
    if path.is_empty() {
        return Err(anyhow!("A volume path is required"));
    }
    let paths = path.split_whitespace().flat_map(expand_braces).collect_vec();

    let threads = parse_list::<u32>(
        raw.threads.as_deref().unwrap_or(DEFAULT_THREADS),
        "thread count",
    )?;
    let block_sizes = parse_sizes(
        raw.block_sizes.as_deref().unwrap_or(DEFAULT_BLOCK_SIZES),
        "block size",
    )?;
    let iodepths = parse_list::<u32>(
        raw.iodepths.as_deref().unwrap_or(DEFAULT_IODEPTHS),
        "io depth",
    )?;
    if threads.contains(&0) {
        return Err(anyhow!("Thread counts must be greater than 0"));
    }
    if iodepths.contains(&0) {
        return Err(anyhow!("IO depths must be greater than 0"));
    }

    let size = raw.size.as_deref().unwrap_or(DEFAULT_SIZE).trim().to_string();
    if !is_size(&size) {
        return Err(anyhow!("Invalid file size '{}'", size));
    }

    let time_limit = match raw.time_limit.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(text) => {
            let secs = text
                .parse::<u64>()
                .context(format!("Invalid time limit '{}'", text))?;
            if secs == 0 {
                return Err(anyhow!("Time limit must be greater than 0"));
            }
            Some(secs)
        }
    };

    let run_tag = raw.run_tag.as_deref().unwrap_or(DEFAULT_RUN_TAG).trim().to_string();
    if run_tag.is_empty() || run_tag.contains(char::is_whitespace) {
        return Err(anyhow!("Run tag must be a single non-empty word"));
    }

    let description = raw
        .description
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_string);

    let config = RunConfig {
        mode,
        paths,
        size,
        time_limit,
        random_offsets: raw.random_offsets.unwrap_or(false),
        delete_files: raw.delete_files.unwrap_or(false),
        hosts: normalize_hosts(raw.hosts.as_deref().unwrap_or_default()),
        run_tag,
        description,
        dry_run,
    };
    let axes = SweepAxes {
        threads,
        block_sizes,
        iodepths,
    };
    Ok((config, axes))
}

/// Parses a whitespace or comma separated list. The list must contain at least one element.
pub fn parse_list<T>(text: &str, what: &str) -> anyhow::Result<Vec<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let values = split_words(text)
        .map(|word| {
            word.parse::<T>()
                .context(format!("Invalid {} '{}'", what, word))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    if values.is_empty() {
        return Err(anyhow!("At least one {} is required", what));
    }
    Ok(values)
}

fn parse_sizes(text: &str, what: &str) -> anyhow::Result<Vec<String>> {
    let sizes = split_words(text).map(str::to_string).collect_vec();
    if sizes.is_empty() {
        return Err(anyhow!("At least one {} is required", what));
    }
    if let Some(bad) = sizes.iter().find(|s| !is_size(s)) {
        return Err(anyhow!("Invalid {} '{}'", what, bad));
    }
    Ok(sizes)
}

/// Accepts sizes in the benchmark's notation: digits with an optional k/m/g/t suffix, e.g.
/// `4k`, `1M`, `10GiB`, `512`.
pub fn is_size(text: &str) -> bool {
    let digits = text.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits == 0 {
        return false;
    }
    let unit = text[digits..].to_lowercase();
    matches!(
        unit.as_str(),
        "" | "b" | "k" | "kb" | "kib" | "m" | "mb" | "mib" | "g" | "gb" | "gib" | "t" | "tb" | "tib"
    )
}

/// Splits a free form host list into individual host names.
pub fn normalize_hosts(text: &str) -> Vec<String> {
    split_words(text).map(str::to_string).collect()
}

fn split_words(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| c.is_whitespace() || c == ',')
        .filter(|word| !word.is_empty())
}

/// Human readable description of the resolved parameters, shown before asking for confirmation.
pub fn summary(config: &RunConfig, axes: &SweepAxes, run_count: usize) -> Vec<(String, String)> {
    let mut rows = vec![
        ("Mode".to_string(), config.mode.to_string()),
        ("Paths".to_string(), config.paths.join(" ")),
        ("Threads".to_string(), axes.threads.iter().join(" ")),
        ("Block sizes".to_string(), axes.block_sizes.join(" ")),
        ("IO depths".to_string(), axes.iodepths.iter().join(" ")),
        ("Size".to_string(), config.size.clone()),
        (
            "Time limit".to_string(),
            config
                .time_limit
                .map(|t| format!("{}s", t))
                .unwrap_or_else(|| "run to completion".to_string()),
        ),
        ("Random offsets".to_string(), config.random_offsets.to_string()),
        ("Delete files".to_string(), config.delete_files.to_string()),
        (
            "Hosts".to_string(),
            if config.hosts.is_empty() {
                "local".to_string()
            } else {
                config.hosts.join(",")
            },
        ),
        ("Run tag".to_string(), config.run_tag.clone()),
        ("Dry run".to_string(), config.dry_run.to_string()),
        ("Runs".to_string(), run_count.to_string()),
    ];
    if let Mode::Custom { args } = &config.mode {
        rows.insert(1, ("Arguments".to_string(), args.join(" ")));
    }
    if let Some(description) = &config.description {
        rows.push(("Description".to_string(), description.clone()));
    }
    rows
}
