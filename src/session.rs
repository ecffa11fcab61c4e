/*!
 * Sessions and the role gate
 * HS256 access tokens, opaque refresh tokens and the admin/editor check
 */
use axum::http::HeaderMap;
use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand::distr::{Alphanumeric, SampleString};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{
    config::AppConfig,
    error::{ApiError, ApiResult},
};

/// Length of the opaque refresh token handed to clients.
const REFRESH_TOKEN_LENGTH: usize = 64;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    #[default]
    Editor,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Editor => "editor",
        }
    }

    /// Whether a holder of `self` satisfies a route that requires `required`.
    pub fn satisfies(self, required: Role) -> bool {
        match required {
            Role::Admin => self == Role::Admin,
            Role::Editor => matches!(self, Role::Admin | Role::Editor),
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// JWT claims
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub exp: i64,
    pub iat: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SessionUser {
    pub id: String,
    pub email: String,
    pub name: String,
    pub role: Role,
}

/// An authenticated caller, decoded from a bearer token.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Session {
    pub user: SessionUser,
    pub expires: DateTime<Utc>,
}

impl From<Claims> for Session {
    fn from(claims: Claims) -> Self {
        let expires = Utc
            .timestamp_opt(claims.exp, 0)
            .single()
            .unwrap_or_else(Utc::now);
        Self {
            user: SessionUser {
                id: claims.sub,
                email: claims.email,
                name: claims.name,
                role: claims.role,
            },
            expires,
        }
    }
}

/// Role gate. No session never passes; `Admin` admits admins only and
/// `Editor` admits both roles.
pub fn can_access(session: Option<&Session>, required: Role) -> bool {
    session.is_some_and(|s| s.user.role.satisfies(required))
}

pub fn create_access_token(
    config: &AppConfig,
    user: &SessionUser,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = Utc::now();
    let exp = now + Duration::minutes(config.access_token_ttl_minutes);

    let claims = Claims {
        sub: user.id.clone(),
        email: user.email.clone(),
        name: user.name.clone(),
        role: user.role,
        exp: exp.timestamp(),
        iat: now.timestamp(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )
}

pub fn verify_access_token(
    config: &AppConfig,
    token: &str,
) -> Result<Claims, jsonwebtoken::errors::Error> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.jwt_secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(token_data.claims)
}

pub fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Decode the caller's session, if any valid bearer token is present.
pub fn session_from_headers(config: &AppConfig, headers: &HeaderMap) -> Option<Session> {
    let token = extract_bearer_token(headers)?;
    match verify_access_token(config, token) {
        Ok(claims) => Some(claims.into()),
        Err(e) => {
            tracing::debug!(error = %e, "rejected bearer token");
            None
        }
    }
}

/// 401 unless the request carries a valid session.
pub fn require_session(config: &AppConfig, headers: &HeaderMap) -> ApiResult<Session> {
    session_from_headers(config, headers).ok_or(ApiError::Unauthenticated)
}

/// 401 without a session, then 403 when its role is insufficient.
pub fn require_role(config: &AppConfig, headers: &HeaderMap, required: Role) -> ApiResult<Session> {
    let session = require_session(config, headers)?;
    if !can_access(Some(&session), required) {
        tracing::warn!(
            user = %session.user.email,
            role = %session.user.role,
            required = %required,
            "role gate denied request"
        );
        return Err(ApiError::Forbidden);
    }
    Ok(session)
}

pub fn generate_refresh_token() -> String {
    Alphanumeric.sample_string(&mut rand::rng(), REFRESH_TOKEN_LENGTH)
}

/// Refresh tokens are stored only as their SHA-256 digest.
pub fn hash_refresh_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn session(role: Role) -> Session {
        Session {
            user: SessionUser {
                id: "65f1c2a9e4b0a1b2c3d4e5f6".into(),
                email: "someone@example.com".into(),
                name: "Someone".into(),
                role,
            },
            expires: Utc::now() + Duration::hours(1),
        }
    }

    fn bearer(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
        );
        headers
    }

    #[test]
    fn test_can_access_matrix() {
        assert!(!can_access(Some(&session(Role::Editor)), Role::Admin));
        assert!(can_access(Some(&session(Role::Admin)), Role::Editor));
        assert!(can_access(Some(&session(Role::Admin)), Role::Admin));
        assert!(can_access(Some(&session(Role::Editor)), Role::Editor));
        assert!(!can_access(None, Role::Editor));
        assert!(!can_access(None, Role::Admin));
    }

    #[test]
    fn test_role_serde_is_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Admin).unwrap(), "\"admin\"");
        let role: Role = serde_json::from_str("\"editor\"").unwrap();
        assert_eq!(role, Role::Editor);
        assert!(serde_json::from_str::<Role>("\"owner\"").is_err());
    }

    #[test]
    fn test_access_token_round_trip() {
        let config = AppConfig::default();
        let user = session(Role::Admin).user;
        let token = create_access_token(&config, &user).unwrap();
        let claims = verify_access_token(&config, &token).unwrap();
        assert_eq!(claims.sub, user.id);
        assert_eq!(claims.role, Role::Admin);
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn test_token_signed_with_other_secret_is_rejected() {
        let config = AppConfig::default();
        let other = AppConfig {
            jwt_secret: "another-secret".into(),
            ..AppConfig::default()
        };
        let token = create_access_token(&other, &session(Role::Admin).user).unwrap();
        assert!(verify_access_token(&config, &token).is_err());
    }

    #[test]
    fn test_require_role_statuses() {
        let config = AppConfig::default();

        let err = require_role(&config, &HeaderMap::new(), Role::Editor).unwrap_err();
        assert!(matches!(err, ApiError::Unauthenticated));

        let err = require_role(&config, &bearer("garbage"), Role::Editor).unwrap_err();
        assert!(matches!(err, ApiError::Unauthenticated));

        let editor = create_access_token(&config, &session(Role::Editor).user).unwrap();
        let err = require_role(&config, &bearer(&editor), Role::Admin).unwrap_err();
        assert!(matches!(err, ApiError::Forbidden));

        let ok = require_role(&config, &bearer(&editor), Role::Editor).unwrap();
        assert_eq!(ok.user.role, Role::Editor);
    }

    #[test]
    fn test_refresh_token_hash_is_stable_hex() {
        let token = generate_refresh_token();
        assert_eq!(token.len(), REFRESH_TOKEN_LENGTH);
        let hash = hash_refresh_token(&token);
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, hash_refresh_token(&token));
        assert_ne!(hash, hash_refresh_token("different"));
    }
}
