mod common;

use anyhow::Result;
use common::{ensure_server, json_body};
use reqwest::StatusCode;

#[tokio::test]
async fn root_lists_endpoints() -> Result<()> {
    let server = ensure_server().await?;
    let resp = reqwest::get(server.url("/")).await?;
    assert_eq!(resp.status(), StatusCode::OK);

    let body = json_body(resp).await?;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["name"], "Dashboard API");
    assert!(body["data"]["endpoints"]["resources"].is_string());
    Ok(())
}

#[tokio::test]
async fn health_reports_database_state() -> Result<()> {
    let server = ensure_server().await?;
    let resp = reqwest::get(server.url("/health")).await?;
    let status = resp.status();
    let body = json_body(resp).await?;

    match status {
        StatusCode::OK => {
            assert_eq!(body["success"], true);
            assert_eq!(body["data"]["status"], "ok");
        }
        StatusCode::SERVICE_UNAVAILABLE => {
            assert_eq!(body["success"], false);
            assert_eq!(body["data"]["status"], "degraded");
            assert!(body["error"].is_string());
        }
        other => panic!("unexpected health status {}", other),
    }
    assert!(body["data"]["timestamp"].is_string());
    Ok(())
}

#[tokio::test]
async fn unknown_routes_are_not_found() -> Result<()> {
    let server = ensure_server().await?;
    let resp = reqwest::get(server.url("/nope")).await?;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    Ok(())
}
