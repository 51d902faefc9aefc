//! Object storage passthrough for uploaded images and files.

use async_trait::async_trait;
use uuid::Uuid;

use crate::config::StorageConfig;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("file is {size} bytes, limit is {max} bytes")]
    TooLarge { size: usize, max: usize },
    #[error("content type '{0}' is not accepted")]
    UnsupportedContentType(String),
    #[error("invalid object path: {0}")]
    InvalidPath(String),
    #[error("storage not configured: {0}")]
    NotConfigured(&'static str),
    #[error("storage request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("storage returned {status}: {message}")]
    Rejected { status: u16, message: String },
}

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Store bytes at `path` and return the public URL
    async fn upload(&self, path: &str, content_type: &str, bytes: Vec<u8>) -> Result<String, StorageError>;
    async fn remove(&self, path: &str) -> Result<(), StorageError>;
    fn public_url(&self, path: &str) -> String;
}

/// Storage backed by the BaaS storage REST API
pub struct BaasStorage {
    client: reqwest::Client,
    base_url: String,
    service_key: String,
    bucket: String,
}

impl BaasStorage {
    pub fn new(config: &StorageConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.url.trim_end_matches('/').to_string(),
            service_key: config.service_key.clone(),
            bucket: config.bucket.clone(),
        }
    }

    fn object_url(&self, path: &str) -> String {
        format!("{}/storage/v1/object/{}/{}", self.base_url, self.bucket, path)
    }

    fn require_configured(&self) -> Result<&str, StorageError> {
        if self.base_url.is_empty() {
            return Err(StorageError::NotConfigured("STORAGE_URL"));
        }
        if self.service_key.is_empty() {
            return Err(StorageError::NotConfigured("STORAGE_SERVICE_KEY"));
        }
        Ok(&self.service_key)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, StorageError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let message = response.text().await.unwrap_or_default();
        Err(StorageError::Rejected { status, message })
    }
}

#[async_trait]
impl ObjectStorage for BaasStorage {
    async fn upload(&self, path: &str, content_type: &str, bytes: Vec<u8>) -> Result<String, StorageError> {
        let key = self.require_configured()?;
        let response = self
            .client
            .post(self.object_url(path))
            .header("apikey", key)
            .bearer_auth(key)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .header("x-upsert", "false")
            .body(bytes)
            .send()
            .await?;
        Self::check(response).await?;

        tracing::info!("Uploaded object {}/{}", self.bucket, path);
        Ok(self.public_url(path))
    }

    async fn remove(&self, path: &str) -> Result<(), StorageError> {
        let key = self.require_configured()?;
        let response = self
            .client
            .delete(self.object_url(path))
            .header("apikey", key)
            .bearer_auth(key)
            .send()
            .await?;
        Self::check(response).await?;

        tracing::info!("Removed object {}/{}", self.bucket, path);
        Ok(())
    }

    fn public_url(&self, path: &str) -> String {
        format!("{}/storage/v1/object/public/{}/{}", self.base_url, self.bucket, path)
    }
}

/// Reject uploads the bucket should never see
pub fn check_upload(config: &StorageConfig, content_type: &str, size: usize) -> Result<(), StorageError> {
    if size > config.max_upload_bytes {
        return Err(StorageError::TooLarge {
            size,
            max: config.max_upload_bytes,
        });
    }
    let essence = content_type.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
    if !config.allowed_content_types.iter().any(|t| t.eq_ignore_ascii_case(&essence)) {
        return Err(StorageError::UnsupportedContentType(essence));
    }
    Ok(())
}

/// `<folder>/<uuid>-<name>` with both parts reduced to URL-safe characters
pub fn object_path(folder: &str, filename: &str) -> Result<String, StorageError> {
    let folder = sanitize_folder(folder)?;
    let name = sanitize_segment(filename.rsplit(['/', '\\']).next().unwrap_or(filename));
    let name = if name.is_empty() { "file".to_string() } else { name };
    Ok(format!("{}/{}-{}", folder, Uuid::new_v4().simple(), name))
}

/// Validate a caller-supplied path for removal
pub fn validate_object_path(path: &str) -> Result<&str, StorageError> {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty()
        || trimmed.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..")
        || trimmed.chars().any(|c| c.is_control() || c == '\\')
    {
        return Err(StorageError::InvalidPath(path.to_string()));
    }
    Ok(trimmed)
}

fn sanitize_folder(folder: &str) -> Result<String, StorageError> {
    let segments: Vec<String> = folder
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|s| {
            if s == "." || s == ".." {
                Err(StorageError::InvalidPath(folder.to_string()))
            } else {
                Ok(sanitize_segment(s))
            }
        })
        .collect::<Result<_, _>>()?;

    let segments: Vec<String> = segments.into_iter().filter(|s| !s.is_empty()).collect();
    if segments.is_empty() {
        return Ok("uploads".to_string());
    }
    Ok(segments.join("/"))
}

fn sanitize_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for c in segment.trim().chars() {
        if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
            out.push(c.to_ascii_lowercase());
        } else if (c.is_whitespace() || c == '+') && !out.ends_with('-') {
            out.push('-');
        }
    }
    out.trim_matches(|c| c == '.' || c == '-').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> StorageConfig {
        StorageConfig {
            url: "https://project.example.co".to_string(),
            service_key: "service".to_string(),
            bucket: "images".to_string(),
            max_upload_bytes: 1024,
            allowed_content_types: vec!["image/png".to_string(), "image/jpeg".to_string()],
        }
    }

    #[test]
    fn generated_paths_are_prefixed_and_sanitised() {
        let path = object_path("brands", "My Logo (final).PNG").unwrap();
        let (folder, rest) = path.split_once('/').unwrap();
        assert_eq!(folder, "brands");
        let (_uuid, name) = rest.split_once('-').unwrap();
        assert_eq!(name, "my-logo-final.png");
    }

    #[test]
    fn folder_traversal_is_rejected() {
        assert!(object_path("../secrets", "a.png").is_err());
        assert_eq!(object_path("", "a.png").unwrap().split('/').next(), Some("uploads"));
    }

    #[test]
    fn strips_client_directories_from_filename() {
        let path = object_path("products", "C:\\Users\\me\\photo.jpg").unwrap();
        assert!(path.ends_with("-photo.jpg"));
    }

    #[test]
    fn upload_checks_size_and_type() {
        let cfg = config();
        assert!(check_upload(&cfg, "image/png", 10).is_ok());
        assert!(check_upload(&cfg, "IMAGE/JPEG; charset=binary", 10).is_ok());
        assert!(matches!(check_upload(&cfg, "image/png", 2048), Err(StorageError::TooLarge { .. })));
        assert!(matches!(
            check_upload(&cfg, "text/html", 10),
            Err(StorageError::UnsupportedContentType(_))
        ));
    }

    #[test]
    fn removal_paths_are_validated() {
        assert_eq!(validate_object_path("/brands/x.png").unwrap(), "brands/x.png");
        assert!(validate_object_path("brands/../x.png").is_err());
        assert!(validate_object_path("").is_err());
    }

    #[test]
    fn public_url_uses_bucket() {
        let storage = BaasStorage::new(&config());
        assert_eq!(
            storage.public_url("brands/a.png"),
            "https://project.example.co/storage/v1/object/public/images/brands/a.png"
        );
    }
}
