#![allow(dead_code)]

use std::process::{Child, Command, Stdio};
use std::sync::{Mutex, OnceLock};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use dashboard_api::auth::{generate_jwt, Claims};
use dashboard_api::types::Role;
use reqwest::StatusCode;
use uuid::Uuid;

static SERVER: OnceLock<TestServer> = OnceLock::new();

pub struct TestServer {
    pub port: u16,
    pub base_url: String,
    child: Mutex<Child>,
}

impl TestServer {
    fn spawn() -> Result<Self> {
        // Pick an unused port for isolation
        let port = portpicker::pick_unused_port().context("failed to pick free port")?;
        let base_url = format!("http://127.0.0.1:{}", port);

        // Same secret as this process so tests can mint tokens the server accepts
        let secret = dashboard_api::config::config().security.jwt_secret.clone();

        let mut cmd = Command::new(env!("CARGO_BIN_EXE_dashboard-api"));
        cmd.env("API_PORT", port.to_string())
            .env("JWT_SECRET", secret)
            .env("RUST_LOG", "warn")
            // Keep /health quick when the configured database is unreachable
            .env("DATABASE_CONNECTION_TIMEOUT", "2")
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());

        let child = cmd.spawn().context("failed to spawn server binary")?;

        Ok(Self {
            port,
            base_url,
            child: Mutex::new(child),
        })
    }

    async fn wait_ready(&self, timeout: Duration) -> Result<()> {
        let client = reqwest::Client::new();
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            let url = format!("{}/health", self.base_url);
            if let Ok(resp) = client.get(&url).send().await {
                // Up, with or without a reachable database
                if resp.status() == StatusCode::OK || resp.status() == StatusCode::SERVICE_UNAVAILABLE {
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_millis(150)).await;
        }
        anyhow::bail!("server did not become ready on {} within {:?}", self.base_url, timeout)
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Ok(child) = self.child.get_mut() {
            let _ = child.kill();
        }
    }
}

pub async fn ensure_server() -> Result<&'static TestServer> {
    let server = SERVER.get_or_init(|| TestServer::spawn().expect("failed to spawn server binary"));
    server.wait_ready(Duration::from_secs(15)).await?;
    Ok(server)
}

/// Signed session token for a tenant that need not exist
pub fn token_for(role: Role) -> String {
    let claims = Claims::new(
        Uuid::new_v4(),
        "tester@example.com".to_string(),
        "acme".to_string(),
        "tenant_0123456789abcdef".to_string(),
        role,
    );
    generate_jwt(&claims).expect("token")
}

pub async fn json_body(resp: reqwest::Response) -> Result<serde_json::Value> {
    let text = resp.text().await?;
    serde_json::from_str(&text).with_context(|| format!("response is not JSON: {}", text))
}
