/**
 * Authentication Routes
 * Credential login, session lookup, refresh-token rotation and logout
 */
use axum::{body::Bytes, extract::State, http::HeaderMap, response::IntoResponse, Json};
use chrono::{Duration, Utc};
use mongodb::bson::{doc, DateTime as BsonDateTime};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::{
    db::{
        models::{RefreshToken, User, UserResponse},
        users::{self, normalize_email},
    },
    error::{ApiError, ApiResult},
    routes::{is_valid_email, Ack, ApiJson, DataResponse},
    session::{
        create_access_token, generate_refresh_token, hash_refresh_token, require_session,
        session_from_headers, SessionUser,
    },
    AppState,
};

// ============================================================================
// Configuration
// ============================================================================

/// Failed logins allowed per email inside one window.
const MAX_FAILED_LOGINS: u32 = 5;
const FAILED_LOGIN_WINDOW_SECS: i64 = 15 * 60;

const INVALID_CREDENTIALS: &str = "Invalid credentials";
const INVALID_REFRESH: &str = "Invalid or expired refresh token";

// ============================================================================
// Login throttle
// ============================================================================

#[derive(Debug, Clone, Copy)]
struct FailedLogins {
    count: u32,
    window_start: i64,
}

/// Per-email failed login counter. Entries expire with their window and are
/// evicted on every write so the map only holds active offenders.
#[derive(Debug, Default)]
pub struct LoginThrottle {
    failures: RwLock<HashMap<String, FailedLogins>>,
}

impl LoginThrottle {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn is_locked(&self, email: &str, now: i64) -> bool {
        let failures = self.failures.read().await;
        failures.get(email).is_some_and(|f| {
            f.count >= MAX_FAILED_LOGINS && now - f.window_start < FAILED_LOGIN_WINDOW_SECS
        })
    }

    pub async fn record_failure(&self, email: &str, now: i64) {
        let mut failures = self.failures.write().await;
        failures.retain(|_, f| now - f.window_start < FAILED_LOGIN_WINDOW_SECS);

        let entry = failures.entry(email.to_string()).or_insert(FailedLogins {
            count: 0,
            window_start: now,
        });
        entry.count += 1;
    }

    pub async fn clear(&self, email: &str) {
        self.failures.write().await.remove(email);
    }
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub success: bool,
    pub user: UserResponse,
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    #[serde(default)]
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub success: bool,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogoutRequest {
    #[serde(default)]
    pub refresh_token: Option<String>,
}

// ============================================================================
// Helper Functions
// ============================================================================

struct TokenPair {
    access_token: String,
    refresh_token: String,
}

/// Sign an access token for `user` and persist a fresh refresh token.
async fn issue_tokens(state: &AppState, user: &User) -> ApiResult<TokenPair> {
    let user_id = user
        .id
        .ok_or_else(|| ApiError::Internal("Failed to create session".to_string()))?;

    let session_user = SessionUser {
        id: user_id.to_hex(),
        email: user.email.clone(),
        name: user.name.clone(),
        role: user.role,
    };
    let access_token = create_access_token(&state.config, &session_user).map_err(|e| {
        tracing::error!("Failed to create access token: {}", e);
        ApiError::Internal("Failed to create session".to_string())
    })?;

    let refresh_token = generate_refresh_token();
    let expires_at = Utc::now() + Duration::days(state.config.refresh_token_ttl_days);
    let record = RefreshToken {
        id: None,
        user_id,
        token_hash: hash_refresh_token(&refresh_token),
        expires_at: BsonDateTime::from_chrono(expires_at),
        revoked: false,
        created_at: BsonDateTime::now(),
    };

    state
        .db
        .refresh_tokens()
        .insert_one(&record, None)
        .await
        .map_err(|e| ApiError::database("Failed to create session", e))?;

    Ok(TokenPair {
        access_token,
        refresh_token,
    })
}

fn access_ttl_secs(state: &AppState) -> i64 {
    state.config.access_token_ttl_minutes * 60
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/auth/login
pub async fn login(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<LoginRequest>,
) -> ApiResult<impl IntoResponse> {
    let email = normalize_email(&payload.email);
    if email.is_empty() || payload.password.is_empty() {
        return Err(ApiError::bad_request("Email and password are required"));
    }
    if !is_valid_email(&email) {
        return Err(ApiError::bad_request("Invalid email format"));
    }

    let now = Utc::now().timestamp();
    if state.login_throttle.is_locked(&email, now).await {
        tracing::warn!(email = %email, "login throttled");
        return Err(ApiError::TooManyRequests(
            "Too many login attempts. Please try again later.".to_string(),
        ));
    }

    let Some(record) = users::find_record_by_email(&state.db, &email).await? else {
        state.login_throttle.record_failure(&email, now).await;
        tracing::warn!(email = %email, "login for unknown email");
        return Err(ApiError::InvalidCredentials(INVALID_CREDENTIALS.to_string()));
    };

    if !state
        .hasher
        .verify(&payload.password, &record.password_hash)
        .await
    {
        state.login_throttle.record_failure(&email, now).await;
        tracing::warn!(email = %email, "login with wrong password");
        return Err(ApiError::InvalidCredentials(INVALID_CREDENTIALS.to_string()));
    }

    if !record.is_active {
        tracing::warn!(email = %email, "login on deactivated account");
        return Err(ApiError::Forbidden);
    }

    state.login_throttle.clear(&email).await;

    let mut user = record.profile();
    if let Some(id) = user.id {
        users::touch_last_login(&state.db, id).await?;
        user.last_login = Some(BsonDateTime::now());
    }

    let tokens = issue_tokens(&state, &user).await?;
    tracing::info!(email = %user.email, role = %user.role, "login succeeded");

    Ok(Json(LoginResponse {
        success: true,
        user: UserResponse::from(user),
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token,
        expires_in: access_ttl_secs(&state),
    }))
}

/// GET /api/auth/session
pub async fn session(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<impl IntoResponse> {
    let session = require_session(&state.config, &headers)?;
    Ok(Json(DataResponse::new(session)))
}

/// POST /api/auth/refresh
/// Exchange a refresh token for a new pair. The presented token is revoked
/// in the same operation that validates it, so it can be used only once.
pub async fn refresh(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<RefreshRequest>,
) -> ApiResult<impl IntoResponse> {
    let presented = payload.refresh_token.trim();
    if presented.is_empty() {
        return Err(ApiError::bad_request("Refresh token is required"));
    }

    let consumed = state
        .db
        .refresh_tokens()
        .find_one_and_update(
            doc! {
                "tokenHash": hash_refresh_token(presented),
                "revoked": false,
                "expiresAt": { "$gt": BsonDateTime::now() },
            },
            doc! { "$set": { "revoked": true } },
            None,
        )
        .await
        .map_err(|e| ApiError::database("Failed to refresh session", e))?
        .ok_or_else(|| ApiError::InvalidCredentials(INVALID_REFRESH.to_string()))?;

    let user = users::find_by_id(&state.db, consumed.user_id)
        .await?
        .filter(|u| u.is_active)
        .ok_or_else(|| ApiError::InvalidCredentials(INVALID_REFRESH.to_string()))?;

    let tokens = issue_tokens(&state, &user).await?;
    tracing::debug!(email = %user.email, "refresh token rotated");

    Ok(Json(RefreshResponse {
        success: true,
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token,
        expires_in: access_ttl_secs(&state),
    }))
}

/// POST /api/auth/logout
/// Revoke the presented refresh token and, for a valid bearer token, every
/// refresh token of that user. Always succeeds.
pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let payload: LogoutRequest = serde_json::from_slice(&body).unwrap_or_default();
    let tokens = state.db.refresh_tokens();

    if let Some(refresh_token) = payload.refresh_token.filter(|t| !t.trim().is_empty()) {
        if let Err(e) = tokens
            .update_one(
                doc! { "tokenHash": hash_refresh_token(refresh_token.trim()) },
                doc! { "$set": { "revoked": true } },
                None,
            )
            .await
        {
            tracing::error!("Failed to revoke refresh token: {}", e);
        }
    }

    if let Some(session) = session_from_headers(&state.config, &headers) {
        if let Some(user_id) = crate::db::parse_object_id(&session.user.id) {
            if let Err(e) = tokens
                .update_many(
                    doc! { "userId": user_id, "revoked": false },
                    doc! { "$set": { "revoked": true } },
                    None,
                )
                .await
            {
                tracing::error!("Failed to revoke user sessions: {}", e);
            }
        }
        tracing::info!(email = %session.user.email, "logged out");
    }

    Ack::new("Logged out successfully")
}
