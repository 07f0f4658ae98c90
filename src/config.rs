/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

pub mod run;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::{
    fs::{self, File},
    io::Write,
    path::{Path, PathBuf},
};

static EXAMPLE_CONFIG: &str = include_str!("templates/elbwiz.toml");

pub const DEFAULT_CONFIG_PATH: &str = "./elbwiz.toml";

// ******** ******** ********
// **    CONFIGURATION     **
// ******** ******** ********
#[derive(Debug, Default, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub benchmark: BenchmarkSettings,
    pub forwarder: ForwarderSettings,
    pub grafana: Option<GrafanaSettings>,
    pub sweep: SweepSettings,
}
impl Settings {
    /// Loads settings from the given path, or from `./elbwiz.toml` if no path is given.
    ///
    /// A missing default file is not an error, the built-in defaults are used instead. A missing
    /// file that was asked for explicitly is.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Settings> {
        match path {
            Some(path) => Settings::try_from_path(path),
            None => {
                let path = Path::new(DEFAULT_CONFIG_PATH);
                if path.exists() {
                    Settings::try_from_path(path)
                } else {
                    tracing::debug!("No {} found, using defaults", DEFAULT_CONFIG_PATH);
                    Ok(Settings::default())
                }
            }
        }
    }

    pub fn try_from_path(path: &Path) -> anyhow::Result<Settings> {
        let conf_str = fs::read_to_string(path)
            .context(format!("Unable to read config file {}", path.display()))?;
        Settings::try_from_str(&conf_str)
    }

    pub fn try_from_str(conf_str: &str) -> anyhow::Result<Settings> {
        let settings = toml::from_str::<Settings>(conf_str)
            .map_err(|e| anyhow::anyhow!("TOML parsing error: {}", e))?;
        if let Some(grafana) = &settings.grafana {
            for panel in &grafana.panels {
                panel.validate()?;
            }
        }
        Ok(settings)
    }

    pub fn write_example_to_file(path: &Path) -> anyhow::Result<File> {
        let mut file = File::create_new(path)
            .context(format!("Unable to create {}, does it already exist?", path.display()))?;
        file.write_all(EXAMPLE_CONFIG.as_bytes())?;
        Ok(file)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct BenchmarkSettings {
    pub binary: String,
    pub direct: bool,
}
impl Default for BenchmarkSettings {
    fn default() -> Self {
        Self {
            binary: "elbencho".to_string(),
            direct: true,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct ForwarderSettings {
    pub program: String,
    pub args: Vec<String>,
    pub graphite_server: String,
}
impl Default for ForwarderSettings {
    fn default() -> Self {
        Self {
            program: "python3".to_string(),
            args: vec!["graphite_forwarder.py".to_string()],
            graphite_server: "localhost".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct GrafanaSettings {
    pub server: String,
    pub dashboard_ids: Vec<u64>,
    pub org_id: u32,
    pub panel_width: u32,
    pub panel_height: u32,
    pub timeout_secs: u64,
    #[serde(rename(serialize = "panel", deserialize = "panel"))]
    pub panels: Vec<Panel>,
}
impl Default for GrafanaSettings {
    fn default() -> Self {
        Self {
            server: String::new(),
            dashboard_ids: vec![],
            org_id: 1,
            panel_width: 1000,
            panel_height: 500,
            timeout_secs: 30,
            panels: vec![],
        }
    }
}

/// A dashboard panel to screenshot at the end of every run.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Panel {
    pub name: String,
    pub dashboard_uid: String,
    pub panel_id: u32,
    /// Raw query string appended to the render url, e.g. `var-host=All`.
    pub vars: Option<String>,
}
impl Panel {
    /// The name becomes `<name>.png` inside the run directory, so it must be a plain file name.
    pub fn validate(&self) -> anyhow::Result<()> {
        let name = self.name.trim();
        if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
            return Err(anyhow::anyhow!(
                "Panel name '{}' must be a plain file name",
                self.name
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct SweepSettings {
    pub results_dir: PathBuf,
    pub sleep_between_runs: u64,
}
impl Default for SweepSettings {
    fn default() -> Self {
        Self {
            results_dir: PathBuf::from("./results"),
            sleep_between_runs: 60,
        }
    }
}
