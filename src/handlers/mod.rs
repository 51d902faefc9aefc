// Handler tiers:
// public (no auth) → protected (JWT + tenant validation, role gates per route)

pub mod public;
pub mod protected;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::Query;
use axum::Json;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

use crate::database::page_offset;
use crate::error::ApiError;

/// Unwrap a JSON body, turning axum's plain-text rejections into API errors
pub fn json_body(body: Result<Json<Value>, JsonRejection>) -> Result<Value, ApiError> {
    match body {
        Ok(Json(value)) => Ok(value),
        Err(rejection) if rejection.status() == axum::http::StatusCode::PAYLOAD_TOO_LARGE => {
            Err(ApiError::PayloadTooLarge(rejection.body_text()))
        }
        Err(rejection) => Err(ApiError::bad_request(rejection.body_text())),
    }
}

pub fn query_params<T>(query: Result<Query<T>, QueryRejection>) -> Result<T, ApiError> {
    match query {
        Ok(Query(params)) => Ok(params),
        Err(rejection) => Err(ApiError::bad_request(rejection.body_text())),
    }
}

/// Every listed field must be present, non-null and, for strings, non-blank
pub fn require_fields(body: &Value, fields: &[&str]) -> Result<(), ApiError> {
    let missing: HashMap<String, String> = fields
        .iter()
        .filter(|f| match body.get(**f) {
            None | Some(Value::Null) => true,
            Some(Value::String(s)) => s.trim().is_empty(),
            Some(_) => false,
        })
        .map(|f| (f.to_string(), "This field is required".to_string()))
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(ApiError::validation_error("Missing required fields", Some(missing)))
    }
}

/// Deserialize an already-checked body into a typed request
pub fn parse_body<T: DeserializeOwned>(body: Value) -> Result<T, ApiError> {
    serde_json::from_value(body).map_err(|e| ApiError::bad_request(format!("Invalid request body: {}", e)))
}

pub fn parse_id(id: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(id).map_err(|_| ApiError::bad_request(format!("Invalid id '{}': expected a UUID", id)))
}

/// 1-based page and a limit clamped to the configured maximum
pub fn page_and_limit(page: Option<&str>, limit: Option<&str>) -> Result<(i64, i64), ApiError> {
    let api = &crate::config::config().api;
    let page = match page {
        Some(p) => p
            .parse::<i64>()
            .ok()
            .filter(|p| *p >= 1)
            .ok_or_else(|| ApiError::bad_request("page must be a positive integer"))?,
        None => 1,
    };
    let limit = match limit {
        Some(l) => l
            .parse::<i64>()
            .ok()
            .filter(|l| *l >= 1)
            .ok_or_else(|| ApiError::bad_request("limit must be a positive integer"))?,
        None => api.default_page_size,
    };
    let limit = limit.min(api.max_page_size);
    if page_offset(page, limit).is_none() {
        return Err(ApiError::bad_request("page is out of range"));
    }
    Ok((page, limit))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn require_fields_lists_every_missing_field() {
        let err = require_fields(&json!({"email": " ", "password": null}), &["email", "password"]).unwrap_err();
        let body = err.to_json();
        assert_eq!(body["code"], "VALIDATION_ERROR");
        assert_eq!(body["field_errors"]["email"], "This field is required");
        assert_eq!(body["field_errors"]["password"], "This field is required");

        assert!(require_fields(&json!({"email": "a@b.c", "flag": false}), &["email", "flag"]).is_ok());
    }

    #[test]
    fn ids_must_be_uuids() {
        assert!(parse_id("8d5e7f1c-3b1a-4c9e-9f0a-2b6d1e4c7a10").is_ok());
        assert!(parse_id("42").is_err());
    }

    #[test]
    fn paging_defaults_and_clamps() {
        let api = &crate::config::config().api;
        assert_eq!(page_and_limit(None, None).unwrap(), (1, api.default_page_size));
        assert_eq!(page_and_limit(Some("3"), Some("100000")).unwrap(), (3, api.max_page_size));
        assert!(page_and_limit(Some("0"), None).is_err());
        assert!(page_and_limit(None, Some("ten")).is_err());
    }

    #[test]
    fn paging_rejects_pages_past_the_last_offset() {
        let max_page = i64::MAX.to_string();
        let err = page_and_limit(Some(&max_page), None).unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::BAD_REQUEST);
        assert!(page_and_limit(Some(&max_page), Some("1")).is_ok());
    }
}
