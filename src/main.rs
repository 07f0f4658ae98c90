/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use elbwiz::{
    command::split_custom_args,
    config::{run::Mode, Settings},
    file_size, grafana, nic,
    params::{Prompter, RawParams},
    run_wizard, WizardOptions, WizardResult,
};
use std::{io, path::PathBuf};
use tracing::{info, subscriber::set_global_default, Subscriber};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to the configuration file, defaults to ./elbwiz.toml
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose logging (-v, --verbose)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Sweep read benchmarks
    Read(WizardArgs),

    /// Sweep write benchmarks
    Write(WizardArgs),

    /// Sweep write benchmarks, each followed by a read of the same files
    ReadWrite(WizardArgs),

    /// Sweep a benchmark with your own operation arguments
    Custom {
        /// Benchmark arguments replacing --read/--write, e.g. "--mkdirs --write --files 10"
        #[arg(long, allow_hyphen_values = true)]
        args: Option<String>,

        #[command(flatten)]
        wizard: WizardArgs,
    },

    /// List dashboards and their ids
    Dashboards,

    /// Work out per-file sizes for spreading a data volume over a number of files
    FileSize {
        /// Total data volume in GiB
        #[arg(long)]
        total_gib: f64,

        /// Number(s) of files, comma separated
        #[arg(long, value_delimiter = ',', required = true)]
        files: Vec<u64>,
    },

    /// Check NIC tuning (MTU, pause frames, ring sizes, QoS)
    NicCheck {
        /// Interfaces to check, defaults to the RDMA interfaces
        #[arg(short, long)]
        interface: Vec<String>,

        #[arg(long, default_value_t = nic::DEFAULT_EXPECTED_MTU)]
        expected_mtu: u32,
    },

    /// Write an example elbwiz.toml to the current directory
    Init,
}

#[derive(Args, Debug, Clone)]
pub struct WizardArgs {
    /// Print the commands the benchmark would run without doing any I/O
    #[arg(long)]
    pub dryrun: bool,

    /// Don't ask, take defaults for anything not given
    #[arg(short, long)]
    pub yes: bool,

    /// Volume path, brace patterns like /mnt/vol/file{1..4} are expanded
    #[arg(long)]
    pub path: Option<String>,

    /// Thread counts, space or comma separated
    #[arg(long)]
    pub threads: Option<String>,

    /// Block sizes, space or comma separated
    #[arg(long)]
    pub block: Option<String>,

    /// IO depths, space or comma separated
    #[arg(long)]
    pub iodepth: Option<String>,

    /// File size
    #[arg(long)]
    pub size: Option<String>,

    /// Time limit in seconds, the benchmark runs to completion if unset
    #[arg(long)]
    pub timelimit: Option<String>,

    /// Use random offsets
    #[arg(long)]
    pub rand: bool,

    /// Delete files after the run
    #[arg(long)]
    pub delfiles: bool,

    /// Hosts, space or comma separated
    #[arg(long)]
    pub hosts: Option<String>,

    /// Run tag passed to the forwarder
    #[arg(long)]
    pub tag: Option<String>,

    /// Free form description saved with every run
    #[arg(long)]
    pub description: Option<String>,

    /// Seconds to sleep between runs, overrides the config file
    #[arg(long)]
    pub sleep: Option<u64>,
}
impl WizardArgs {
    fn raw_params(&self, custom_args: Option<String>) -> RawParams {
        RawParams {
            path: self.path.clone(),
            threads: self.threads.clone(),
            block_sizes: self.block.clone(),
            iodepths: self.iodepth.clone(),
            size: self.size.clone(),
            time_limit: self.timelimit.clone(),
            // flags can only switch things on, leave the rest to the prompt
            random_offsets: self.rand.then_some(true),
            delete_files: self.delfiles.then_some(true),
            hosts: self.hosts.clone(),
            run_tag: self.tag.clone(),
            description: self.description.clone(),
            custom_args,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    init_subscriber(get_subscriber(default_filter.into()));

    match cli.command {
        Commands::Read(args) => wizard(cli.config, args, Mode::Read, None).await,
        Commands::Write(args) => wizard(cli.config, args, Mode::Write, None).await,
        Commands::ReadWrite(args) => wizard(cli.config, args, Mode::ReadWrite, None).await,
        Commands::Custom { args, wizard: wizard_args } => {
            // validate early so a typo doesn't cost a round of prompts
            if let Some(args) = &args {
                split_custom_args(args)?;
            }
            wizard(cli.config, wizard_args, Mode::Custom { args: vec![] }, args).await
        }

        Commands::Dashboards => {
            let settings = Settings::load(cli.config.as_deref())?;
            let grafana_settings = settings
                .grafana
                .filter(|g| !g.server.is_empty())
                .context("No [grafana] server configured")?;

            let stdin = io::stdin();
            let mut prompter = Prompter::new(stdin.lock(), io::stdout());
            let api_key = grafana::resolve_api_key(&mut prompter)?;
            let client = grafana::GrafanaClient::new(&grafana_settings, api_key)?;

            for dashboard in client.list_dashboards().await? {
                println!(
                    "Dashboard Name: {}, ID: {}, UID: {}",
                    dashboard.title.green(),
                    dashboard.id,
                    dashboard.uid.bright_black()
                );
            }
            Ok(())
        }

        Commands::FileSize { total_gib, files } => {
            for size in file_size::file_sizes(total_gib, &files)? {
                println!("\nFor {} file(s):", size.files);
                println!("  {:.3} GiB per file", size.gib());
                println!("  {} MiB per file", size.mib);
                println!("  {} KiB per file", size.kib());
            }
            Ok(())
        }

        Commands::NicCheck {
            interface,
            expected_mtu,
        } => {
            let interfaces = if interface.is_empty() {
                nic::discover_interfaces()
            } else {
                interface.into_iter().map(|i| (i, None)).collect()
            };
            if interfaces.is_empty() {
                println!("{}", "No network interfaces found.".yellow());
                return Ok(());
            }

            let reports = interfaces
                .into_iter()
                .map(|(iface, device)| {
                    nic::check_interface(std::path::Path::new(nic::SYSFS_NET), &iface, device)
                })
                .collect::<Vec<_>>();
            println!("{}", nic::render_reports(&reports, expected_mtu));
            Ok(())
        }

        Commands::Init => {
            let path = PathBuf::from(elbwiz::config::DEFAULT_CONFIG_PATH);
            Settings::write_example_to_file(&path)?;
            println!("{}", format!("{} created!", path.display()).green());
            Ok(())
        }
    }
}

async fn wizard(
    config_path: Option<PathBuf>,
    args: WizardArgs,
    mode: Mode,
    custom_args: Option<String>,
) -> anyhow::Result<()> {
    let mut settings = Settings::load(config_path.as_deref())?;
    if let Some(sleep) = args.sleep {
        settings.sweep.sleep_between_runs = sleep;
    }

    println!("\n{}", format!(" elbencho {} wizard ", mode).reversed().green());
    let opts = WizardOptions {
        dry_run: args.dryrun,
        assume_yes: args.yes,
    };
    let raw = args.raw_params(custom_args);

    let stdin = io::stdin();
    let mut prompter = Prompter::new(stdin.lock(), io::stdout());
    match run_wizard(&settings, raw, mode, opts, &mut prompter).await? {
        WizardResult::Aborted => std::process::exit(1),
        WizardResult::Completed(report) => {
            println!("\n{}", " Summary ".reversed().green());
            println!("{}", report.render_table());
            info!(
                "Sweep finished, {} of {} runs failed",
                report.failed(),
                report.runs.len()
            );
            Ok(())
        }
    }
}

fn get_subscriber(env_filter: String) -> impl Subscriber + Sync + Send {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(env_filter));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(io::stderr)
        .finish()
}

fn init_subscriber(subscriber: impl Subscriber + Sync + Send) {
    set_global_default(subscriber).expect("Failed to set subscriber");
}
