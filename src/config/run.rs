/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use itertools::iproduct;
use std::fmt;

/// What a wizard invocation benchmarks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    Read,
    Write,
    /// Write then read the same files for every combination.
    ReadWrite,
    /// User supplied benchmark arguments replacing the read/write flags.
    Custom { args: Vec<String> },
}
impl Mode {
    pub fn phases(&self) -> Vec<Phase> {
        match self {
            Mode::Read => vec![Phase::Read],
            Mode::Write => vec![Phase::Write],
            Mode::ReadWrite => vec![Phase::Write, Phase::Read],
            Mode::Custom { .. } => vec![Phase::Custom],
        }
    }
}
impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Read => write!(f, "read"),
            Mode::Write => write!(f, "write"),
            Mode::ReadWrite => write!(f, "read-write"),
            Mode::Custom { .. } => write!(f, "custom"),
        }
    }
}

/// The concrete operation performed by a single run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Read,
    Write,
    Custom,
}
impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Read => write!(f, "read"),
            Phase::Write => write!(f, "write"),
            Phase::Custom => write!(f, "custom"),
        }
    }
}

/// Everything about a sweep that stays the same between runs. Built once by the parameter
/// resolver and never mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub mode: Mode,
    /// Target paths with any brace patterns already expanded.
    pub paths: Vec<String>,
    pub size: String,
    pub time_limit: Option<u64>,
    pub random_offsets: bool,
    pub delete_files: bool,
    pub hosts: Vec<String>,
    pub run_tag: String,
    pub description: Option<String>,
    pub dry_run: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepAxes {
    pub threads: Vec<u32>,
    pub block_sizes: Vec<String>,
    pub iodepths: Vec<u32>,
}
impl SweepAxes {
    /// The cartesian product of the axes, threads outermost and io-depth innermost.
    pub fn combinations(&self) -> Vec<Combination> {
        iproduct!(
            self.threads.iter(),
            self.block_sizes.iter(),
            self.iodepths.iter()
        )
        .map(|(threads, block_size, iodepth)| Combination {
            threads: *threads,
            block_size: block_size.clone(),
            iodepth: *iodepth,
        })
        .collect()
    }

    pub fn len(&self) -> usize {
        self.threads.len() * self.block_sizes.len() * self.iodepths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Combination {
    pub threads: u32,
    pub block_size: String,
    pub iodepth: u32,
}

/// One benchmark invocation within a sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunInstance {
    /// 1-based position in the sweep.
    pub index: usize,
    pub combination: Combination,
    pub phase: Phase,
}
impl RunInstance {
    pub fn label(&self) -> String {
        format!(
            "{} threads={} block={} iodepth={}",
            self.phase, self.combination.threads, self.combination.block_size, self.combination.iodepth
        )
    }
}

/// Expands the axes and mode into the ordered list of runs to execute.
pub fn plan_runs(mode: &Mode, axes: &SweepAxes) -> Vec<RunInstance> {
    let phases = mode.phases();
    axes.combinations()
        .into_iter()
        .flat_map(|combination| {
            phases.iter().map(move |phase| (combination.clone(), *phase))
        })
        .enumerate()
        .map(|(i, (combination, phase))| RunInstance {
            index: i + 1,
            combination,
            phase,
        })
        .collect()
}
