pub mod identity;

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, errors::ErrorKind, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config;
use crate::types::Role;

/// Session token payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// User id (shared with the identity provider)
    pub sub: Uuid,
    pub email: String,
    /// Tenant name as used in the login URL
    pub tenant: String,
    /// Tenant database name
    pub database: String,
    pub role: Role,
    pub exp: i64,
    pub iat: i64,
}

impl Claims {
    pub fn new(sub: Uuid, email: String, tenant: String, database: String, role: Role) -> Self {
        let now = Utc::now();
        let expiry_hours = config::config().security.jwt_expiry_hours;
        let exp = (now + Duration::hours(expiry_hours as i64)).timestamp();

        Self {
            sub,
            email,
            tenant,
            database,
            role,
            exp,
            iat: now.timestamp(),
        }
    }

    /// Whether an expired token is still young enough to be exchanged
    pub fn within_refresh_window(&self, refresh_window_hours: u64) -> bool {
        let cutoff = self.exp + Duration::hours(refresh_window_hours as i64).num_seconds();
        Utc::now().timestamp() <= cutoff
    }
}

#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[error("JWT generation error: {0}")]
    TokenGeneration(String),
    #[error("JWT secret not configured")]
    InvalidSecret,
    #[error("token expired")]
    Expired,
    #[error("{0}")]
    Invalid(String),
}

fn secret() -> Result<&'static str, JwtError> {
    let secret = config::config().security.jwt_secret.as_str();
    if secret.is_empty() {
        return Err(JwtError::InvalidSecret);
    }
    Ok(secret)
}

pub fn generate_jwt(claims: &Claims) -> Result<String, JwtError> {
    let encoding_key = EncodingKey::from_secret(secret()?.as_bytes());
    encode(&Header::default(), claims, &encoding_key)
        .map_err(|e| JwtError::TokenGeneration(e.to_string()))
}

/// Verify the signature and decode claims. `allow_expired` skips the exp
/// check so the refresh endpoint can exchange stale tokens.
pub fn validate_jwt(token: &str, allow_expired: bool) -> Result<Claims, JwtError> {
    let decoding_key = DecodingKey::from_secret(secret()?.as_bytes());
    let mut validation = Validation::default();
    if allow_expired {
        validation.validate_exp = false;
    }

    decode::<Claims>(token, &decoding_key, &validation)
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => JwtError::Expired,
            _ => JwtError::Invalid(e.to_string()),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(role: Role) -> Claims {
        Claims::new(
            Uuid::new_v4(),
            "ops@example.com".to_string(),
            "acme".to_string(),
            "tenant_0123456789abcdef".to_string(),
            role,
        )
    }

    #[test]
    fn issues_and_validates_tokens() {
        let c = claims(Role::Admin);
        let token = generate_jwt(&c).unwrap();
        let decoded = validate_jwt(&token, false).unwrap();
        assert_eq!(decoded, c);
    }

    #[test]
    fn rejects_tampered_tokens() {
        let token = generate_jwt(&claims(Role::Viewer)).unwrap();
        let mut parts: Vec<&str> = token.split('.').collect();
        parts[2] = "AAAA";
        let forged = parts.join(".");
        assert!(matches!(validate_jwt(&forged, false), Err(JwtError::Invalid(_))));
    }

    #[test]
    fn expired_tokens_only_pass_when_allowed() {
        let mut c = claims(Role::Agent);
        c.iat -= 7200;
        c.exp = Utc::now().timestamp() - 3600;
        let token = generate_jwt(&c).unwrap();

        assert!(matches!(validate_jwt(&token, false), Err(JwtError::Expired)));
        let decoded = validate_jwt(&token, true).unwrap();
        assert_eq!(decoded.sub, c.sub);
        assert!(decoded.within_refresh_window(24));
        assert!(!decoded.within_refresh_window(0));
    }
}
