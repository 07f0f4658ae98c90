#![allow(dead_code)]

use axum::{
    extract::{Path, RawQuery, State},
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderMap, StatusCode,
    },
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use elbwiz::config::{
    BenchmarkSettings, ForwarderSettings, GrafanaSettings, Panel, Settings, SweepSettings,
};
use serde_json::{json, Value};
use std::{
    path::Path as FsPath,
    sync::{Arc, Mutex},
};

pub const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\nfake";

/// Dashboard id the fake server refuses to annotate.
pub const REJECTED_DASHBOARD: u64 = 404;

#[derive(Debug, Clone)]
pub struct Annotation {
    pub authorization: Option<String>,
    pub body: Value,
}

#[derive(Debug, Clone, Default)]
pub struct Recorded {
    pub annotations: Arc<Mutex<Vec<Annotation>>>,
    pub renders: Arc<Mutex<Vec<String>>>,
}
impl Recorded {
    pub fn annotations(&self) -> Vec<Annotation> {
        self.annotations.lock().unwrap().clone()
    }

    pub fn renders(&self) -> Vec<String> {
        self.renders.lock().unwrap().clone()
    }
}

/// Starts an in-process stand-in for the Grafana endpoints used by elbwiz.
pub async fn start_fake_grafana() -> anyhow::Result<(String, Recorded)> {
    let recorded = Recorded::default();
    let app = Router::new()
        .route("/api/annotations", post(annotate))
        .route("/render/d-solo/:uid", get(render))
        .route("/api/search", get(search))
        .with_state(recorded.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });

    Ok((format!("http://{}", addr), recorded))
}

async fn annotate(
    State(recorded): State<Recorded>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let authorization = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let rejected = body["dashboardId"].as_u64() == Some(REJECTED_DASHBOARD);
    recorded
        .annotations
        .lock()
        .unwrap()
        .push(Annotation { authorization, body });

    if rejected {
        (StatusCode::NOT_FOUND, Json(json!({"message": "Dashboard not found"}))).into_response()
    } else {
        Json(json!({"id": 1, "message": "Annotation added"})).into_response()
    }
}

async fn render(
    State(recorded): State<Recorded>,
    Path(uid): Path<String>,
    RawQuery(query): RawQuery,
) -> Response {
    recorded
        .renders
        .lock()
        .unwrap()
        .push(format!("{}?{}", uid, query.unwrap_or_default()));

    match uid.as_str() {
        "broken" => (StatusCode::INTERNAL_SERVER_ERROR, "render failed").into_response(),
        "login" => ([(CONTENT_TYPE, "text/html")], "<html>login</html>").into_response(),
        _ => ([(CONTENT_TYPE, "image/png")], PNG_BYTES.to_vec()).into_response(),
    }
}

async fn search() -> Json<Value> {
    Json(json!([
        {"id": 1, "uid": "elbencho", "title": "Elbencho", "type": "dash-db"},
        {"id": 7, "uid": "nodes", "title": "Nodes", "type": "dash-db"}
    ]))
}

pub fn panel(name: &str, dashboard_uid: &str) -> Panel {
    Panel {
        name: name.to_string(),
        dashboard_uid: dashboard_uid.to_string(),
        panel_id: 2,
        vars: Some("var-host=All".to_string()),
    }
}

pub fn grafana_settings(server: &str, dashboard_ids: Vec<u64>, panels: Vec<Panel>) -> GrafanaSettings {
    GrafanaSettings {
        server: server.to_string(),
        dashboard_ids,
        timeout_secs: 5,
        panels,
        ..Default::default()
    }
}

/// Settings that run `binary` as the benchmark and append the forwarded stream to
/// `<results>/forwarded.csv`.
pub fn settings(binary: &str, results_dir: &FsPath, sleep_between_runs: u64) -> Settings {
    let forwarded = results_dir.join("forwarded.csv");
    Settings {
        benchmark: BenchmarkSettings {
            binary: binary.to_string(),
            direct: true,
        },
        forwarder: ForwarderSettings {
            program: "sh".to_string(),
            args: vec![
                "-c".to_string(),
                format!("cat >> '{}'", forwarded.display()),
            ],
            graphite_server: "graphite.test".to_string(),
        },
        grafana: None,
        sweep: SweepSettings {
            results_dir: results_dir.join("runs"),
            sleep_between_runs,
        },
    }
}
