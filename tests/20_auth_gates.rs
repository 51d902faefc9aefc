mod common;

use anyhow::Result;
use common::{ensure_server, json_body, token_for};
use dashboard_api::types::Role;
use reqwest::StatusCode;
use serde_json::json;

#[tokio::test]
async fn api_requires_bearer_token() -> Result<()> {
    let server = ensure_server().await?;
    let client = reqwest::Client::new();

    let resp = client.get(server.url("/api/brands")).send().await?;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(resp).await?;
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "UNAUTHORIZED");
    assert_eq!(body["error"], "Missing Authorization header");

    let resp = client
        .get(server.url("/api/brands"))
        .header("Authorization", "Token abc")
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn viewers_cannot_write() -> Result<()> {
    let server = ensure_server().await?;
    let client = reqwest::Client::new();

    let resp = client
        .post(server.url("/api/products"))
        .bearer_auth(token_for(Role::Viewer))
        .json(&json!({"name": "Green tea"}))
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    let body = json_body(resp).await?;
    assert_eq!(body["code"], "FORBIDDEN");
    assert_eq!(body["error"], "Admin role required");
    Ok(())
}

#[tokio::test]
async fn admins_cannot_manage_users() -> Result<()> {
    let server = ensure_server().await?;
    let resp = reqwest::Client::new()
        .post(server.url("/api/users"))
        .bearer_auth(token_for(Role::Admin))
        .json(&json!({"email": "new@example.com", "password": "secret1", "name": "New", "role": "AGENT"}))
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    assert_eq!(json_body(resp).await?["error"], "Super admin role required");
    Ok(())
}

#[tokio::test]
async fn login_rejects_incomplete_bodies() -> Result<()> {
    let server = ensure_server().await?;
    let resp = reqwest::Client::new()
        .post(server.url("/auth/login/acme"))
        .json(&json!({"password": "secret1"}))
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let body = json_body(resp).await?;
    assert_eq!(body["code"], "VALIDATION_ERROR");
    assert_eq!(body["field_errors"]["email"], "This field is required");
    assert!(body["field_errors"].get("password").is_none());
    Ok(())
}

#[tokio::test]
async fn refresh_requires_a_signed_token() -> Result<()> {
    let server = ensure_server().await?;
    let client = reqwest::Client::new();

    let resp = client.post(server.url("/auth/refresh")).json(&json!({})).send().await?;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = client
        .post(server.url("/auth/refresh"))
        .json(&json!({"token": "eyJhbGciOiJIUzI1NiJ9.e30.invalid"}))
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}
