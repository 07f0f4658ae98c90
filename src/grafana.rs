/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use crate::{
    config::{GrafanaSettings, Panel},
    executor::TimeWindow,
    params::Prompter,
};
use anyhow::{anyhow, Context};
use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    io::{BufRead, Write},
    path::{Path, PathBuf},
    time::Duration,
};
use tracing::{debug, warn};

pub const API_KEY_ENV: &str = "GRAFANA_API_KEY";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnotationTag {
    RunStart,
    RunComplete,
}
impl AnnotationTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnnotationTag::RunStart => "run_start",
            AnnotationTag::RunComplete => "run_complete",
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AnnotationRequest<'a> {
    dashboard_id: u64,
    time: i64,
    is_region: bool,
    tags: [&'a str; 1],
    text: &'a str,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct DashboardInfo {
    pub id: u64,
    #[serde(default)]
    pub uid: String,
    pub title: String,
}

/// Returns the API key from the environment (a `.env` file counts), asking for it otherwise.
pub fn resolve_api_key<R: BufRead, W: Write>(
    prompter: &mut Prompter<R, W>,
) -> anyhow::Result<String> {
    if let Ok(key) = dotenvy::var(API_KEY_ENV) {
        if !key.trim().is_empty() {
            return Ok(key.trim().to_string());
        }
    }

    let key = prompter.ask(&format!("Enter your Grafana API key ({} is not set)", API_KEY_ENV), None)?;
    if key.is_empty() {
        return Err(anyhow!("A Grafana API key is required"));
    }
    Ok(key)
}

/// Talks to the Grafana HTTP API. Built once per invocation, never mutated.
#[derive(Clone)]
pub struct GrafanaClient {
    client: reqwest::Client,
    server: String,
    api_key: String,
    dashboard_ids: Vec<u64>,
    org_id: u32,
    panel_width: u32,
    panel_height: u32,
}
impl fmt::Debug for GrafanaClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GrafanaClient")
            .field("server", &self.server)
            .field("api_key", &"<redacted>")
            .field("dashboard_ids", &self.dashboard_ids)
            .field("org_id", &self.org_id)
            .field("panel_width", &self.panel_width)
            .field("panel_height", &self.panel_height)
            .finish_non_exhaustive()
    }
}
impl GrafanaClient {
    pub fn new(settings: &GrafanaSettings, api_key: String) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .context("Unable to build http client")?;

        Ok(Self {
            client,
            server: settings.server.trim_end_matches('/').to_string(),
            api_key,
            dashboard_ids: settings.dashboard_ids.clone(),
            org_id: settings.org_id,
            panel_width: settings.panel_width,
            panel_height: settings.panel_height,
        })
    }

    /// Posts a point annotation to every configured dashboard. Failures are logged and skipped.
    ///
    /// # Returns
    ///
    /// The number of dashboards that accepted the annotation.
    pub async fn send_annotation(&self, tag: AnnotationTag, text: &str, time_ms: i64) -> usize {
        let mut accepted = 0;
        for dashboard_id in &self.dashboard_ids {
            match self.post_annotation(*dashboard_id, tag, text, time_ms).await {
                Ok(()) => {
                    debug!("Annotated dashboard {} with {}", dashboard_id, tag.as_str());
                    accepted += 1;
                }
                Err(e) => warn!(
                    "Failed to annotate dashboard {} with {}: {:#}",
                    dashboard_id,
                    tag.as_str(),
                    e
                ),
            }
        }
        accepted
    }

    async fn post_annotation(
        &self,
        dashboard_id: u64,
        tag: AnnotationTag,
        text: &str,
        time_ms: i64,
    ) -> anyhow::Result<()> {
        let body = AnnotationRequest {
            dashboard_id,
            time: time_ms,
            is_region: false,
            tags: [tag.as_str()],
            text,
        };

        self.client
            .post(format!("{}/api/annotations", self.server))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    pub fn render_url(&self, panel: &Panel, window: &TimeWindow) -> String {
        let mut url = format!(
            "{}/render/d-solo/{}?panelId={}&orgId={}&width={}&height={}&from={}&to={}",
            self.server,
            panel.dashboard_uid,
            panel.panel_id,
            self.org_id,
            self.panel_width,
            self.panel_height,
            window.from_ms,
            window.to_ms
        );
        if let Some(vars) = panel.vars.as_deref().map(|v| v.trim_start_matches('&')) {
            if !vars.is_empty() {
                url.push('&');
                url.push_str(vars);
            }
        }
        url
    }

    /// Renders a panel for the given window. Non-2xx responses and anything that isn't an image
    /// are errors, so a failed render never ends up on disk as a screenshot.
    pub async fn capture_panel(&self, panel: &Panel, window: &TimeWindow) -> anyhow::Result<Bytes> {
        let resp = self
            .client
            .get(self.render_url(panel, window))
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(anyhow!("Render of panel {} returned {}", panel.name, status));
        }

        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        if !content_type.starts_with("image/") {
            return Err(anyhow!(
                "Render of panel {} returned '{}' instead of an image",
                panel.name,
                content_type
            ));
        }

        Ok(resp.bytes().await?)
    }

    /// Captures a panel and writes it to `<dir>/<panel name>.png`.
    pub async fn save_panel(
        &self,
        panel: &Panel,
        window: &TimeWindow,
        dir: &Path,
    ) -> anyhow::Result<PathBuf> {
        panel.validate()?;
        let image = self.capture_panel(panel, window).await?;
        let path = dir.join(format!("{}.png", panel.name));
        tokio::fs::write(&path, &image)
            .await
            .context(format!("Unable to write {}", path.display()))?;
        Ok(path)
    }

    pub async fn list_dashboards(&self) -> anyhow::Result<Vec<DashboardInfo>> {
        let dashboards = self
            .client
            .get(format!("{}/api/search?type=dash-db", self.server))
            .bearer_auth(&self.api_key)
            .header(CONTENT_TYPE, "application/json")
            .send()
            .await?
            .error_for_status()
            .context("Failed to retrieve dashboards")?
            .json()
            .await?;
        Ok(dashboards)
    }
}
