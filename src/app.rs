use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue, Method};
use axum::middleware::from_fn;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::auth::identity::{BaasIdentity, IdentityProvider};
use crate::config::AppConfig;
use crate::handlers::{protected, public};
use crate::middleware::{
    jwt_auth_middleware, require_admin, require_admin_for_writes, require_super_admin_for_writes,
    validate_tenant_middleware,
};
use crate::storage::{BaasStorage, ObjectStorage};

/// External services shared by every request
#[derive(Clone)]
pub struct AppState {
    pub identity: Arc<dyn IdentityProvider>,
    pub storage: Arc<dyn ObjectStorage>,
}

impl AppState {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            identity: Arc::new(BaasIdentity::new(&config.identity)),
            storage: Arc::new(BaasStorage::new(&config.storage)),
        }
    }
}

pub fn router(state: AppState, config: &AppConfig) -> Router {
    Router::new()
        .merge(public_routes())
        .merge(protected_routes())
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(config.api.max_request_size_bytes))
        .layer(cors_layer(&config.security.cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn public_routes() -> Router<AppState> {
    use public::auth;

    Router::new()
        .route("/", get(public::root))
        .route("/health", get(public::health))
        .route("/auth/login/:tenant", post(auth::login_post))
        .route("/auth/refresh", post(auth::refresh_post))
}

/// JWT first, then the role gate, then tenant validation, so a caller with
/// the wrong role is refused before any database work.
fn protected_routes() -> Router<AppState> {
    use protected::{auth, performance, resource, tracer, upload, users};

    let session = Router::new()
        .route("/api/auth/whoami", get(auth::whoami_get))
        .route_layer(from_fn(validate_tenant_middleware));

    let resources = Router::new()
        .route("/api/:resource", get(resource::resource_get).post(resource::resource_post))
        .route(
            "/api/:resource/:id",
            get(resource::record_get)
                .put(resource::record_put)
                .patch(resource::record_patch)
                .delete(resource::record_delete),
        )
        .route("/api/:resource/:id/children", get(resource::children_get))
        .route("/api/:resource/:id/performance/summary", get(performance::summary_get))
        .route_layer(from_fn(validate_tenant_middleware))
        .route_layer(from_fn(require_admin_for_writes));

    let user_routes = Router::new()
        .route("/api/users", get(users::users_get).post(users::users_post))
        .route(
            "/api/users/:id",
            get(users::user_get).patch(users::user_patch).delete(users::user_delete),
        )
        .route_layer(from_fn(validate_tenant_middleware))
        .route_layer(from_fn(require_super_admin_for_writes));

    let admin = Router::new()
        .route("/api/tracer-updates", get(tracer::tracer_updates_get))
        .route("/api/upload", post(upload::upload_post).delete(upload::upload_delete))
        .route_layer(from_fn(validate_tenant_middleware))
        .route_layer(from_fn(require_admin));

    Router::new()
        .merge(session)
        .merge(resources)
        .merge(user_routes)
        .merge(admin)
        .route_layer(from_fn(jwt_auth_middleware))
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    if origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", o);
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(allowed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::identity::{Identity, IdentityError};
    use crate::auth::{generate_jwt, Claims};
    use crate::config;
    use crate::storage::StorageError;
    use crate::types::Role;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use uuid::Uuid;

    struct FakeIdentity;

    #[async_trait]
    impl IdentityProvider for FakeIdentity {
        async fn sign_in(&self, _email: &str, _password: &str) -> Result<Identity, IdentityError> {
            Err(IdentityError::InvalidCredentials)
        }
        async fn create_user(&self, email: &str, _password: &str) -> Result<Identity, IdentityError> {
            Err(IdentityError::AlreadyRegistered(email.to_string()))
        }
        async fn delete_user(&self, _id: Uuid) -> Result<(), IdentityError> {
            Ok(())
        }
    }

    struct FakeStorage;

    #[async_trait]
    impl ObjectStorage for FakeStorage {
        async fn upload(&self, path: &str, _content_type: &str, _bytes: Vec<u8>) -> Result<String, StorageError> {
            Ok(self.public_url(path))
        }
        async fn remove(&self, _path: &str) -> Result<(), StorageError> {
            Ok(())
        }
        fn public_url(&self, path: &str) -> String {
            format!("http://storage.test/{}", path)
        }
    }

    fn app() -> Router {
        let state = AppState {
            identity: Arc::new(FakeIdentity),
            storage: Arc::new(FakeStorage),
        };
        router(state, config::config())
    }

    fn token(role: Role) -> String {
        let claims = Claims::new(
            Uuid::new_v4(),
            "someone@example.com".to_string(),
            "acme".to_string(),
            "tenant_0123456789abcdef".to_string(),
            role,
        );
        generate_jwt(&claims).unwrap()
    }

    async fn send(request: Request<Body>) -> (StatusCode, Value) {
        let response = app().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    fn request(method: &str, uri: &str, role: Option<Role>, body: Option<Value>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(role) = role {
            builder = builder.header("authorization", format!("Bearer {}", token(role)));
        }
        match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    #[tokio::test]
    async fn root_describes_the_service() {
        let (status, body) = send(request("GET", "/", None, None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["name"], "Dashboard API");
    }

    #[tokio::test]
    async fn protected_routes_require_a_token() {
        let (status, body) = send(request("GET", "/api/brands", None, None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["success"], false);
        assert_eq!(body["code"], "UNAUTHORIZED");
    }

    #[tokio::test]
    async fn garbage_tokens_are_rejected() {
        let req = Request::builder()
            .uri("/api/auth/whoami")
            .header("authorization", "Bearer not.a.jwt")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(req).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body["error"].as_str().unwrap().starts_with("Invalid session token"));
    }

    #[tokio::test]
    async fn non_admins_cannot_write_resources() {
        for role in [Role::Viewer, Role::Agent] {
            let (status, body) = send(request("POST", "/api/brands", Some(role), Some(json!({"name": "Acme"})))).await;
            assert_eq!(status, StatusCode::FORBIDDEN, "{:?}", role);
            assert_eq!(body["code"], "FORBIDDEN");
        }
        let (status, _) = send(request("DELETE", &format!("/api/brands/{}", Uuid::new_v4()), Some(Role::Viewer), None)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn user_management_needs_super_admin() {
        let uri = format!("/api/users/{}", Uuid::new_v4());
        let (status, body) = send(request("DELETE", &uri, Some(Role::Admin), None)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "Super admin role required");
    }

    #[tokio::test]
    async fn audit_log_and_uploads_need_admin() {
        let (status, _) = send(request("GET", "/api/tracer-updates", Some(Role::Agent), None)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _) = send(request("DELETE", "/api/upload", Some(Role::Viewer), Some(json!({"path": "a/b.png"})))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn login_validates_body_before_any_lookup() {
        let (status, body) = send(request("POST", "/auth/login/acme", None, Some(json!({"email": "a@b.c"})))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "VALIDATION_ERROR");
        assert_eq!(body["field_errors"]["password"], "This field is required");

        let req = Request::builder()
            .method("POST")
            .uri("/auth/login/acme")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let (status, body) = send(req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "BAD_REQUEST");
    }

    #[tokio::test]
    async fn refresh_rejects_forged_tokens() {
        let (status, body) = send(request("POST", "/auth/refresh", None, Some(json!({"token": "x.y.z"})))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["success"], false);
    }

    #[test]
    fn cors_accepts_wildcard_and_lists() {
        let _ = cors_layer(&["*".to_string()]);
        let _ = cors_layer(&["http://localhost:5173".to_string(), "bad\norigin".to_string()]);
    }
}
