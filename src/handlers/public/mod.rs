// Public handlers: no authentication. Token acquisition plus service status.

pub mod auth;

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Value};

use crate::database::manager::DatabaseManager;

/// GET / - service description
pub async fn root() -> Json<Value> {
    Json(json!({
        "success": true,
        "data": {
            "name": "Dashboard API",
            "version": env!("CARGO_PKG_VERSION"),
            "description": "Multi-tenant admin API for catalogs, SOPs, knowledge, training and agent performance",
            "endpoints": {
                "home": "/ (public)",
                "health": "/health (public)",
                "public_auth": "/auth/login/:tenant, /auth/refresh (public - token acquisition)",
                "auth": "/api/auth/whoami (protected)",
                "resources": "/api/:resource[/:id[/children]] (protected, writes require ADMIN)",
                "users": "/api/users[/:id] (protected, writes require SUPER_ADMIN)",
                "performance": "/api/agents/:id/performance/summary (protected)",
                "audit": "/api/tracer-updates (protected, ADMIN)",
                "upload": "/api/upload (protected, ADMIN)",
            }
        }
    }))
}

/// GET /health - registry database reachability
pub async fn health() -> impl IntoResponse {
    let now = chrono::Utc::now();

    match DatabaseManager::health_check().await {
        Ok(_) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "data": {
                    "status": "ok",
                    "timestamp": now,
                    "database": "ok"
                }
            })),
        ),
        Err(e) => {
            tracing::warn!("Health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "success": false,
                    "error": "database unavailable",
                    "code": "SERVICE_UNAVAILABLE",
                    "data": {
                        "status": "degraded",
                        "timestamp": now,
                        "database": "unavailable"
                    }
                })),
            )
        }
    }
}
