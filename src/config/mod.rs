use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub database: DatabaseConfig,
    pub api: ApiConfig,
    pub security: SecurityConfig,
    pub storage: StorageConfig,
    pub identity: IdentityConfig,
    pub audit: AuditConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub max_connections: u32,
    pub connection_timeout: u64,
    /// Transaction poolers (pgbouncer, supavisor) break named prepared statements
    pub disable_statement_cache: bool,
    pub retry_attempts: u32,
    pub retry_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub port: u16,
    pub max_request_size_bytes: usize,
    pub default_page_size: i64,
    pub max_page_size: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub jwt_secret: String,
    pub jwt_expiry_hours: u64,
    pub refresh_window_hours: u64,
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub url: String,
    pub service_key: String,
    pub bucket: String,
    pub max_upload_bytes: usize,
    pub allowed_content_types: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    pub url: String,
    pub anon_key: String,
    pub service_key: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditMode {
    /// Database triggers write tracer_updates; the API only tags the acting user
    Trigger,
    /// The repository diffs rows and writes tracer_updates itself
    Application,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    pub mode: AuditMode,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        // Database overrides
        if let Ok(v) = env::var("DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = v.parse().unwrap_or(self.database.max_connections);
        }
        if let Ok(v) = env::var("DATABASE_CONNECTION_TIMEOUT") {
            self.database.connection_timeout = v.parse().unwrap_or(self.database.connection_timeout);
        }
        if let Ok(v) = env::var("DATABASE_DISABLE_STATEMENT_CACHE") {
            self.database.disable_statement_cache =
                v.parse().unwrap_or(self.database.disable_statement_cache);
        }
        if let Ok(v) = env::var("DATABASE_RETRY_ATTEMPTS") {
            self.database.retry_attempts = v.parse().unwrap_or(self.database.retry_attempts);
        }
        if let Ok(v) = env::var("DATABASE_RETRY_DELAY_MS") {
            self.database.retry_delay_ms = v.parse().unwrap_or(self.database.retry_delay_ms);
        }

        // API overrides
        if let Some(port) = env::var("API_PORT")
            .ok()
            .or_else(|| env::var("PORT").ok())
            .and_then(|s| s.parse().ok())
        {
            self.api.port = port;
        }
        if let Ok(v) = env::var("API_MAX_REQUEST_SIZE_BYTES") {
            self.api.max_request_size_bytes = v.parse().unwrap_or(self.api.max_request_size_bytes);
        }
        if let Ok(v) = env::var("API_DEFAULT_PAGE_SIZE") {
            self.api.default_page_size = v.parse().unwrap_or(self.api.default_page_size);
        }
        if let Ok(v) = env::var("API_MAX_PAGE_SIZE") {
            self.api.max_page_size = v.parse().unwrap_or(self.api.max_page_size);
        }

        // Security overrides
        if let Ok(v) = env::var("JWT_SECRET") {
            self.security.jwt_secret = v;
        }
        if let Ok(v) = env::var("SECURITY_JWT_EXPIRY_HOURS") {
            self.security.jwt_expiry_hours = v.parse().unwrap_or(self.security.jwt_expiry_hours);
        }
        if let Ok(v) = env::var("SECURITY_REFRESH_WINDOW_HOURS") {
            self.security.refresh_window_hours =
                v.parse().unwrap_or(self.security.refresh_window_hours);
        }
        if let Ok(v) = env::var("SECURITY_CORS_ORIGINS") {
            self.security.cors_origins = split_list(&v);
        }

        // Storage overrides
        if let Ok(v) = env::var("STORAGE_URL").or_else(|_| env::var("BAAS_URL")) {
            self.storage.url = v;
        }
        if let Ok(v) = env::var("STORAGE_SERVICE_KEY").or_else(|_| env::var("BAAS_SERVICE_KEY")) {
            self.storage.service_key = v;
        }
        if let Ok(v) = env::var("STORAGE_BUCKET") {
            self.storage.bucket = v;
        }
        if let Ok(v) = env::var("STORAGE_MAX_UPLOAD_BYTES") {
            self.storage.max_upload_bytes = v.parse().unwrap_or(self.storage.max_upload_bytes);
        }
        if let Ok(v) = env::var("STORAGE_ALLOWED_CONTENT_TYPES") {
            self.storage.allowed_content_types = split_list(&v);
        }

        // Identity overrides
        if let Ok(v) = env::var("IDENTITY_URL").or_else(|_| env::var("BAAS_URL")) {
            self.identity.url = v;
        }
        if let Ok(v) = env::var("IDENTITY_ANON_KEY").or_else(|_| env::var("BAAS_ANON_KEY")) {
            self.identity.anon_key = v;
        }
        if let Ok(v) = env::var("IDENTITY_SERVICE_KEY").or_else(|_| env::var("BAAS_SERVICE_KEY")) {
            self.identity.service_key = v;
        }

        // Audit overrides
        match env::var("AUDIT_MODE").as_deref() {
            Ok("application") => self.audit.mode = AuditMode::Application,
            Ok("trigger") => self.audit.mode = AuditMode::Trigger,
            _ => {}
        }

        self
    }

    /// Settings that must be present before the server starts accepting requests
    pub fn validate(&self) -> Result<(), String> {
        if self.security.jwt_secret.is_empty() {
            return Err("JWT_SECRET must be set".to_string());
        }
        if self.environment == Environment::Production && self.security.jwt_secret.len() < 32 {
            return Err("JWT_SECRET must be at least 32 bytes in production".to_string());
        }
        if self.api.default_page_size <= 0 || self.api.default_page_size > self.api.max_page_size {
            return Err("API_DEFAULT_PAGE_SIZE must be between 1 and API_MAX_PAGE_SIZE".to_string());
        }
        Ok(())
    }

    fn development() -> Self {
        Self {
            environment: Environment::Development,
            database: DatabaseConfig {
                max_connections: 10,
                connection_timeout: 30,
                disable_statement_cache: false,
                retry_attempts: 3,
                retry_delay_ms: 100,
            },
            api: ApiConfig {
                port: 3000,
                max_request_size_bytes: 10 * 1024 * 1024, // 10MB
                default_page_size: 20,
                max_page_size: 500,
            },
            security: SecurityConfig {
                jwt_secret: "development-secret-change-me".to_string(),
                jwt_expiry_hours: 24 * 7, // 1 week
                refresh_window_hours: 24 * 30,
                cors_origins: vec![
                    "http://localhost:3000".to_string(),
                    "http://localhost:5173".to_string(),
                ],
            },
            storage: StorageConfig {
                url: "http://localhost:54321".to_string(),
                service_key: String::new(),
                bucket: "images".to_string(),
                max_upload_bytes: 10 * 1024 * 1024,
                allowed_content_types: default_content_types(),
            },
            identity: IdentityConfig {
                url: "http://localhost:54321".to_string(),
                anon_key: String::new(),
                service_key: String::new(),
            },
            audit: AuditConfig { mode: AuditMode::Trigger },
        }
    }

    fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            database: DatabaseConfig {
                max_connections: 20,
                connection_timeout: 10,
                disable_statement_cache: true,
                retry_attempts: 3,
                retry_delay_ms: 200,
            },
            api: ApiConfig {
                port: 3000,
                max_request_size_bytes: 5 * 1024 * 1024, // 5MB
                default_page_size: 20,
                max_page_size: 200,
            },
            security: SecurityConfig {
                jwt_secret: String::new(),
                jwt_expiry_hours: 24,
                refresh_window_hours: 24 * 7,
                cors_origins: vec!["https://staging.example.com".to_string()],
            },
            storage: StorageConfig {
                url: String::new(),
                service_key: String::new(),
                bucket: "images".to_string(),
                max_upload_bytes: 5 * 1024 * 1024,
                allowed_content_types: default_content_types(),
            },
            identity: IdentityConfig {
                url: String::new(),
                anon_key: String::new(),
                service_key: String::new(),
            },
            audit: AuditConfig { mode: AuditMode::Trigger },
        }
    }

    fn production() -> Self {
        Self {
            environment: Environment::Production,
            database: DatabaseConfig {
                max_connections: 50,
                connection_timeout: 5,
                disable_statement_cache: true,
                retry_attempts: 3,
                retry_delay_ms: 250,
            },
            api: ApiConfig {
                port: 3000,
                max_request_size_bytes: 5 * 1024 * 1024, // 5MB
                default_page_size: 20,
                max_page_size: 100,
            },
            security: SecurityConfig {
                jwt_secret: String::new(),
                jwt_expiry_hours: 8,
                refresh_window_hours: 24 * 7,
                cors_origins: vec!["https://app.example.com".to_string()],
            },
            storage: StorageConfig {
                url: String::new(),
                service_key: String::new(),
                bucket: "images".to_string(),
                max_upload_bytes: 5 * 1024 * 1024,
                allowed_content_types: default_content_types(),
            },
            identity: IdentityConfig {
                url: String::new(),
                anon_key: String::new(),
                service_key: String::new(),
            },
            audit: AuditConfig { mode: AuditMode::Trigger },
        }
    }
}

fn default_content_types() -> Vec<String> {
    ["image/png", "image/jpeg", "image/webp", "image/gif", "application/pdf"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn split_list(v: &str) -> Vec<String> {
    v.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

// Global singleton config - initialized once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

pub fn config() -> &'static AppConfig {
    &CONFIG
}
