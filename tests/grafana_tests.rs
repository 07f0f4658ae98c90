mod common;

use common::{grafana_settings, panel, start_fake_grafana, PNG_BYTES, REJECTED_DASHBOARD};
use elbwiz::{
    executor::TimeWindow,
    grafana::{AnnotationTag, GrafanaClient},
};

const WINDOW: TimeWindow = TimeWindow {
    from_ms: 1_699_999_995_000,
    to_ms: 1_700_000_065_000,
};

#[tokio::test]
async fn annotation_is_posted_to_every_dashboard() -> anyhow::Result<()> {
    let (server, recorded) = start_fake_grafana().await?;
    let client = GrafanaClient::new(&grafana_settings(&server, vec![1, 7], vec![]), "key".into())?;

    let accepted = client
        .send_annotation(AnnotationTag::RunStart, "nightly [1] write", 1_700_000_000_000)
        .await;
    assert_eq!(accepted, 2);

    let annotations = recorded.annotations();
    assert_eq!(annotations.len(), 2);
    assert_eq!(annotations[0].authorization.as_deref(), Some("Bearer key"));
    assert_eq!(annotations[0].body["dashboardId"], 1);
    assert_eq!(annotations[1].body["dashboardId"], 7);
    assert_eq!(annotations[0].body["time"], 1_700_000_000_000i64);
    assert_eq!(annotations[0].body["isRegion"], false);
    assert_eq!(annotations[0].body["tags"][0], "run_start");
    assert_eq!(annotations[0].body["text"], "nightly [1] write");
    Ok(())
}

#[tokio::test]
async fn rejected_annotation_is_not_fatal() -> anyhow::Result<()> {
    let (server, recorded) = start_fake_grafana().await?;
    let settings = grafana_settings(&server, vec![REJECTED_DASHBOARD, 1], vec![]);
    let client = GrafanaClient::new(&settings, "key".into())?;

    let accepted = client
        .send_annotation(AnnotationTag::RunComplete, "done", 1_700_000_000_000)
        .await;
    assert_eq!(accepted, 1);
    assert_eq!(recorded.annotations().len(), 2);
    Ok(())
}

#[tokio::test]
async fn unreachable_server_is_not_fatal() -> anyhow::Result<()> {
    // nothing listens on the discard port
    let client = GrafanaClient::new(&grafana_settings("http://127.0.0.1:9", vec![1], vec![]), "key".into())?;
    let accepted = client
        .send_annotation(AnnotationTag::RunStart, "start", 1_700_000_000_000)
        .await;
    assert_eq!(accepted, 0);
    Ok(())
}

#[tokio::test]
async fn panel_render_returns_image_bytes() -> anyhow::Result<()> {
    let (server, recorded) = start_fake_grafana().await?;
    let client = GrafanaClient::new(&grafana_settings(&server, vec![], vec![]), "key".into())?;

    let image = client.capture_panel(&panel("throughput", "elbencho"), &WINDOW).await?;
    assert_eq!(&image[..], PNG_BYTES);

    let renders = recorded.renders();
    assert_eq!(
        renders,
        vec![
            "elbencho?panelId=2&orgId=1&width=1000&height=500&from=1699999995000&to=1700000065000&var-host=All"
        ]
    );
    Ok(())
}

#[tokio::test]
async fn failed_render_is_not_treated_as_an_image() -> anyhow::Result<()> {
    let (server, _) = start_fake_grafana().await?;
    let client = GrafanaClient::new(&grafana_settings(&server, vec![], vec![]), "key".into())?;

    assert!(client.capture_panel(&panel("a", "broken"), &WINDOW).await.is_err());
    assert!(client.capture_panel(&panel("b", "login"), &WINDOW).await.is_err());
    Ok(())
}

#[tokio::test]
async fn save_panel_writes_png_only_on_success() -> anyhow::Result<()> {
    let (server, _) = start_fake_grafana().await?;
    let client = GrafanaClient::new(&grafana_settings(&server, vec![], vec![]), "key".into())?;
    let dir = tempfile::tempdir()?;

    let path = client
        .save_panel(&panel("throughput", "elbencho"), &WINDOW, dir.path())
        .await?;
    assert_eq!(path, dir.path().join("throughput.png"));
    assert_eq!(std::fs::read(&path)?, PNG_BYTES);

    let res = client
        .save_panel(&panel("latency", "broken"), &WINDOW, dir.path())
        .await;
    assert!(res.is_err());
    assert!(!dir.path().join("latency.png").exists());
    Ok(())
}

#[tokio::test]
async fn save_panel_refuses_names_outside_the_directory() -> anyhow::Result<()> {
    let (server, recorded) = start_fake_grafana().await?;
    let client = GrafanaClient::new(&grafana_settings(&server, vec![], vec![]), "key".into())?;
    let dir = tempfile::tempdir()?;
    let run_dir = dir.path().join("run");
    std::fs::create_dir(&run_dir)?;

    let res = client
        .save_panel(&panel("../escaped", "elbencho"), &WINDOW, &run_dir)
        .await;
    assert!(res.is_err());
    assert!(!dir.path().join("escaped.png").exists());
    assert!(recorded.renders().is_empty());
    Ok(())
}

#[tokio::test]
async fn lists_dashboards() -> anyhow::Result<()> {
    let (server, _) = start_fake_grafana().await?;
    let client = GrafanaClient::new(&grafana_settings(&server, vec![], vec![]), "key".into())?;

    let dashboards = client.list_dashboards().await?;
    let titles = dashboards.iter().map(|d| (d.id, d.title.as_str())).collect::<Vec<_>>();
    assert_eq!(titles, [(1, "Elbencho"), (7, "Nodes")]);
    assert_eq!(dashboards[1].uid, "nodes");
    Ok(())
}
