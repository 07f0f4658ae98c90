/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Read-only checks of the network tuning on a benchmark client: MTU, link state, pause frames,
//! ring sizes and QoS, for the RDMA-capable interfaces.

use colored::*;
use itertools::Itertools;
use std::path::Path;
use subprocess::{Exec, Redirection};
use sysinfo::Networks;
use term_table::{row, row::Row, rows, table_cell::*, Table, TableStyle};
use tracing::debug;

pub const SYSFS_NET: &str = "/sys/class/net";
pub const DEFAULT_EXPECTED_MTU: u32 = 9000;

/// One line of `ibdev2netdev`, e.g. `mlx5_0 port 1 ==> ens1f0np0 (Up)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IbMapping {
    pub device: String,
    pub port: u32,
    pub interface: String,
    pub state: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryOutput {
    Ok(String),
    Failed(String),
    /// The tool isn't installed.
    Missing,
}
impl QueryOutput {
    fn summary(&self) -> ColoredString {
        match self {
            QueryOutput::Ok(_) => "ok".green(),
            QueryOutput::Failed(_) => "failed".red(),
            QueryOutput::Missing => "not installed".bright_black(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NicReport {
    pub interface: String,
    pub ib_device: Option<String>,
    pub operstate: Option<String>,
    pub mtu: Option<u32>,
    pub pause: QueryOutput,
    pub rings: QueryOutput,
    pub qos: QueryOutput,
}
impl NicReport {
    pub fn mtu_ok(&self, expected: u32) -> bool {
        self.mtu == Some(expected)
    }
}

pub fn parse_ibdev2netdev(output: &str) -> Vec<IbMapping> {
    output
        .lines()
        .filter_map(|line| {
            let (left, right) = line.split_once("==>")?;
            let mut left = left.split_whitespace();
            let device = left.next()?.to_string();
            let port = match (left.next(), left.next()) {
                (Some("port"), Some(port)) => port.parse().ok()?,
                _ => return None,
            };

            let mut right = right.split_whitespace();
            let interface = right.next()?.to_string();
            let state = right
                .next()
                .map(|s| s.trim_matches(|c| c == '(' || c == ')').to_string())
                .unwrap_or_default();

            Some(IbMapping {
                device,
                port,
                interface,
                state,
            })
        })
        .collect()
}

/// Runs a query tool and captures its combined output.
fn query(program: &str, args: &[&str]) -> QueryOutput {
    debug!("Querying {} {}", program, args.join(" "));
    let res = Exec::cmd(program)
        .args(args)
        .stdout(Redirection::Pipe)
        .stderr(Redirection::Merge)
        .capture();

    match res {
        Ok(data) if data.exit_status.success() => QueryOutput::Ok(data.stdout_str()),
        Ok(data) => QueryOutput::Failed(data.stdout_str()),
        Err(subprocess::PopenError::IoError(e)) if e.kind() == std::io::ErrorKind::NotFound => {
            QueryOutput::Missing
        }
        Err(e) => QueryOutput::Failed(e.to_string()),
    }
}

fn read_sysfs(sysfs_root: &Path, interface: &str, attr: &str) -> Option<String> {
    std::fs::read_to_string(sysfs_root.join(interface).join(attr))
        .ok()
        .map(|s| s.trim().to_string())
}

/// Finds the interfaces to check: RDMA interfaces if `ibdev2netdev` is available, every non
/// loopback interface otherwise.
pub fn discover_interfaces() -> Vec<(String, Option<String>)> {
    if let QueryOutput::Ok(output) = query("ibdev2netdev", &[]) {
        let mappings = parse_ibdev2netdev(&output);
        if !mappings.is_empty() {
            return mappings
                .into_iter()
                .map(|m| (m.interface, Some(m.device)))
                .collect();
        }
    }

    let networks = Networks::new_with_refreshed_list();
    networks
        .list()
        .keys()
        .filter(|name| name.as_str() != "lo")
        .sorted()
        .map(|name| (name.clone(), None))
        .collect()
}

pub fn check_interface(sysfs_root: &Path, interface: &str, ib_device: Option<String>) -> NicReport {
    NicReport {
        interface: interface.to_string(),
        ib_device,
        operstate: read_sysfs(sysfs_root, interface, "operstate"),
        mtu: read_sysfs(sysfs_root, interface, "mtu").and_then(|mtu| mtu.parse().ok()),
        pause: query("ethtool", &["-a", interface]),
        rings: query("ethtool", &["-g", interface]),
        qos: query("mlnx_qos", &["-i", interface]),
    }
}

pub fn render_reports(reports: &[NicReport], expected_mtu: u32) -> String {
    let mut rows = rows![row![
        TableCell::new("Interface".bold()),
        TableCell::new("Device".bold()),
        TableCell::new("State".bold()),
        TableCell::new(format!("MTU (want {})", expected_mtu).bold()),
        TableCell::new("Pause".bold()),
        TableCell::new("Rings".bold()),
        TableCell::new("QoS".bold())
    ]];
    for report in reports {
        let mtu = match report.mtu {
            Some(mtu) if report.mtu_ok(expected_mtu) => mtu.to_string().green(),
            Some(mtu) => mtu.to_string().red(),
            None => "--".bright_black(),
        };
        rows.push(row![
            TableCell::new(&report.interface),
            TableCell::new(report.ib_device.clone().unwrap_or("--".to_string())),
            TableCell::new(report.operstate.clone().unwrap_or("--".to_string())),
            TableCell::new(mtu),
            TableCell::new(report.pause.summary()),
            TableCell::new(report.rings.summary()),
            TableCell::new(report.qos.summary())
        ]);
    }

    let mut out = Table::builder()
        .rows(rows)
        .style(TableStyle::rounded())
        .build()
        .render();

    for report in reports {
        for (name, output) in [
            ("ethtool -a", &report.pause),
            ("ethtool -g", &report.rings),
            ("mlnx_qos -i", &report.qos),
        ] {
            if let QueryOutput::Ok(text) | QueryOutput::Failed(text) = output {
                out.push_str(&format!(
                    "\n{}\n{}",
                    format!("--- {} {} ---", name, report.interface).bright_black(),
                    text.trim_end()
                ));
            }
        }
    }
    out
}
