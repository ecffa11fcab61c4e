/**
 * User Routes
 * Admin user management and the signed-in user's own profile
 */
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use mongodb::bson::{oid::ObjectId, Document};

use crate::{
    db::{
        models::{PasswordChange, UserInput, UserResponse},
        parse_object_id,
        users::{self, insert_credentials, normalize_email, NewUser, PasswordChangeOutcome},
    },
    error::{ApiError, ApiResult},
    password::{Credentials, MIN_PASSWORD_LENGTH},
    routes::{is_valid_email, trimmed, Ack, ApiJson, DataResponse, Validator},
    session::{require_role, require_session, Role},
    AppState,
};

const INVALID_ID: &str = "Invalid user ID format";
const NOT_FOUND: &str = "User not found";
const SHORT_PASSWORD: &str = "New password must be at least 8 characters long";

fn user_id(id: &str) -> ApiResult<ObjectId> {
    parse_object_id(id).ok_or_else(|| ApiError::bad_request(INVALID_ID))
}

fn check_password_length(password: &str) -> ApiResult<()> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(ApiError::bad_request(SHORT_PASSWORD));
    }
    Ok(())
}

fn validate(input: &UserInput, v: &mut Validator) {
    v.text(&input.name, false, "Please provide a name");
    if let Some(email) = input.email.as_deref() {
        if !is_valid_email(email.trim()) {
            v.error("Please provide a valid email address");
        }
    }
}

/// Allow-listed profile fields, plus a freshly hashed password when one was
/// supplied. The plain password is never written.
fn update_document(input: &UserInput, credentials: Option<Credentials>) -> Document {
    let mut set = Document::new();
    if let Some(name) = trimmed(input.name.clone()) {
        set.insert("name", name);
    }
    if let Some(email) = input.email.as_deref() {
        set.insert("email", normalize_email(email));
    }
    if let Some(role) = input.role {
        set.insert("role", role.as_str());
    }
    if let Some(avatar) = trimmed(input.avatar.clone()) {
        set.insert("avatar", avatar);
    }
    if let Some(is_active) = input.is_active {
        set.insert("isActive", is_active);
    }
    if let Some(credentials) = credentials {
        insert_credentials(&mut set, credentials);
    }
    set
}

/// GET /api/users
pub async fn list_users(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<impl IntoResponse> {
    require_role(&state.config, &headers, Role::Admin)?;

    let data: Vec<UserResponse> = users::list(&state.db)
        .await?
        .into_iter()
        .map(Into::into)
        .collect();
    Ok(Json(DataResponse::new(data)))
}

/// POST /api/users
pub async fn create_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiJson(input): ApiJson<UserInput>,
) -> ApiResult<impl IntoResponse> {
    let session = require_role(&state.config, &headers, Role::Admin)?;

    let (Some(name), Some(email), Some(password)) = (
        trimmed(input.name.clone()).filter(|n| !n.is_empty()),
        trimmed(input.email.clone()).filter(|e| !e.is_empty()),
        input.password.clone().filter(|p| !p.is_empty()),
    ) else {
        return Err(ApiError::bad_request(
            "Name, email, and password are required",
        ));
    };

    let mut v = Validator::new();
    validate(&input, &mut v);
    v.finish()?;
    check_password_length(&password)?;

    let credentials = state.hasher.hash(&password).await?;
    let user = users::create(
        &state.db,
        NewUser {
            name,
            email,
            role: input.role.unwrap_or_default(),
            avatar: trimmed(input.avatar).filter(|a| !a.is_empty()),
            is_active: input.is_active.unwrap_or(true),
        },
        credentials,
    )
    .await?;

    tracing::info!(email = %user.email, by = %session.user.email, "user created by admin");
    Ok((
        StatusCode::CREATED,
        Json(DataResponse::with_message(
            "User created successfully",
            UserResponse::from(user),
        )),
    ))
}

/// GET /api/users/{id}
pub async fn get_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    require_role(&state.config, &headers, Role::Admin)?;
    let oid = user_id(&id)?;

    let user = users::find_by_id(&state.db, oid)
        .await?
        .ok_or_else(|| ApiError::not_found(NOT_FOUND))?;
    Ok(Json(DataResponse::new(UserResponse::from(user))))
}

/// PUT /api/users/{id}
pub async fn update_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    ApiJson(input): ApiJson<UserInput>,
) -> ApiResult<impl IntoResponse> {
    require_role(&state.config, &headers, Role::Admin)?;
    let oid = user_id(&id)?;

    let mut v = Validator::new();
    validate(&input, &mut v);
    v.finish()?;

    let credentials = match input.password.as_deref().filter(|p| !p.is_empty()) {
        Some(password) => {
            check_password_length(password)?;
            Some(state.hasher.hash(password).await?)
        }
        None => None,
    };
    let password_reset = credentials.is_some();

    let user = users::update(&state.db, oid, update_document(&input, credentials))
        .await?
        .ok_or_else(|| ApiError::not_found(NOT_FOUND))?;

    if password_reset {
        tracing::info!(email = %user.email, "password reset by admin");
    }

    Ok(Json(DataResponse::with_message(
        "User updated successfully",
        UserResponse::from(user),
    )))
}

/// DELETE /api/users/{id}
pub async fn delete_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let session = require_role(&state.config, &headers, Role::Admin)?;
    let oid = user_id(&id)?;

    if !users::delete(&state.db, oid).await? {
        return Err(ApiError::not_found(NOT_FOUND));
    }

    tracing::info!(id = %id, by = %session.user.email, "user deleted");
    Ok(Ack::new("User deleted successfully"))
}

/// GET /api/users/me
pub async fn get_me(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<impl IntoResponse> {
    let session = require_session(&state.config, &headers)?;
    let oid = parse_object_id(&session.user.id).ok_or_else(|| ApiError::not_found(NOT_FOUND))?;

    let user = users::find_by_id(&state.db, oid)
        .await?
        .ok_or_else(|| ApiError::not_found(NOT_FOUND))?;
    Ok(Json(DataResponse::new(UserResponse::from(user))))
}

/// PATCH /api/users/me - change the caller's password
pub async fn update_me(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiJson(input): ApiJson<PasswordChange>,
) -> ApiResult<impl IntoResponse> {
    let session = require_session(&state.config, &headers)?;

    let (Some(current), Some(new)) = (
        input.current_password.filter(|p| !p.is_empty()),
        input.new_password.filter(|p| !p.is_empty()),
    ) else {
        return Err(ApiError::bad_request(
            "Current password and new password are required",
        ));
    };
    check_password_length(&new)?;

    let oid = parse_object_id(&session.user.id).ok_or_else(|| ApiError::not_found(NOT_FOUND))?;

    match users::change_password(&state.db, &state.hasher, oid, &current, &new).await? {
        PasswordChangeOutcome::Changed => Ok(Ack::new("Password changed successfully")),
        PasswordChangeOutcome::IncorrectCurrent => {
            Err(ApiError::bad_request("Current password is incorrect"))
        }
        PasswordChangeOutcome::NotFound => Err(ApiError::not_found(NOT_FOUND)),
    }
}
