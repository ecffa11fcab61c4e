/**
 * Routes Module
 * API route handlers and the pieces they share
 */
pub mod analytics;
pub mod auth;
pub mod blog;
pub mod contact;
pub mod health;
pub mod portfolio;
pub mod testimonials;
pub mod upload;
pub mod users;

use axum::{
    extract::{FromRequest, FromRequestParts, Query, Request},
    http::{request::Parts, StatusCode},
    Json,
};
use futures::TryStreamExt;
use mongodb::{
    bson::{doc, Document},
    options::FindOptions,
    Collection,
};
use regex::Regex;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::{
    error::{ApiError, ApiResult},
    slug::{unique_slug, SlugOptions},
};

pub use crate::error::ErrorResponse;

/// Hard ceiling for any page size.
pub const MAX_PAGE_SIZE: u64 = 100;

// ============================================================================
// Envelopes
// ============================================================================

/// `{ success: true, message?, data }`
#[derive(Debug, Serialize, Deserialize)]
pub struct DataResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub data: T,
}

impl<T> DataResponse<T> {
    pub fn new(data: T) -> Self {
        Self {
            success: true,
            message: None,
            data,
        }
    }

    pub fn with_message(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            data,
        }
    }
}

/// `{ success: true, message }`
#[derive(Debug, Serialize, Deserialize)]
pub struct Ack {
    pub success: bool,
    pub message: String,
}

impl Ack {
    pub fn new(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            success: true,
            message: message.into(),
        })
    }
}

/// Paginated list envelope.
#[derive(Debug, Serialize, Deserialize)]
pub struct ListResponse<T> {
    pub success: bool,
    pub count: usize,
    pub total: u64,
    pub page: u64,
    pub pages: u64,
    pub data: Vec<T>,
}

impl<T> ListResponse<T> {
    pub fn new(data: Vec<T>, pagination: &Pagination) -> Self {
        Self {
            success: true,
            count: data.len(),
            total: pagination.total,
            page: pagination.page,
            pages: pagination.pages,
            data,
        }
    }
}

pub fn created<T: Serialize>(data: T) -> (StatusCode, Json<DataResponse<T>>) {
    (StatusCode::CREATED, Json(DataResponse::new(data)))
}

// ============================================================================
// Extractors
// ============================================================================

/// `Json<T>` whose rejections answer with the error envelope.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = axum::extract::rejection::JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(ApiJson(value))
    }
}

/// `Query<T>` whose rejections answer with the error envelope.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApiQuery<T>(pub T);

impl<S, T> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state).await?;
        Ok(ApiQuery(value))
    }
}

// ============================================================================
// Query parameters
// ============================================================================

/// Raw list query. Values stay strings so that a malformed number falls back
/// to the default instead of rejecting the request.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
    pub category: Option<String>,
    pub tag: Option<String>,
    pub featured: Option<String>,
    pub published: Option<String>,
    pub is_read: Option<String>,
    pub is_archived: Option<String>,
    pub is_spam: Option<String>,
}

/// `Some(true)` only for the literal `"true"`; any other value is `Some(false)`.
pub fn parse_flag(value: Option<&str>) -> Option<bool> {
    value.map(|v| v.trim() == "true")
}

fn parse_positive(value: Option<&str>) -> Option<u64> {
    value
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|v| *v > 0)
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl ListQuery {
    pub fn category(&self) -> Option<&str> {
        non_empty(&self.category)
    }

    pub fn tag(&self) -> Option<&str> {
        non_empty(&self.tag)
    }

    /// Insert `field: bool` into `filter` when the flag was supplied.
    pub fn apply_flag(filter: &mut Document, field: &str, value: &Option<String>) {
        if let Some(flag) = parse_flag(value.as_deref()) {
            filter.insert(field, flag);
        }
    }

    /// Public content defaults to published-only unless the caller says otherwise.
    pub fn apply_published(&self, filter: &mut Document) {
        filter.insert(
            "published",
            parse_flag(self.published.as_deref()).unwrap_or(true),
        );
    }
}

// ============================================================================
// Pagination
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: u64,
    pub limit: u64,
    pub total: u64,
    pub pages: u64,
}

impl Pagination {
    /// Resolve raw `page`/`limit` against a known total. `limit` is clamped
    /// to `1..=MAX_PAGE_SIZE`, `pages` is never below one and `page` is
    /// clamped into `1..=pages`.
    pub fn resolve(page: Option<&str>, limit: Option<&str>, default_limit: u64, total: u64) -> Self {
        let limit = parse_positive(limit)
            .unwrap_or(default_limit)
            .clamp(1, MAX_PAGE_SIZE);
        let pages = total.div_ceil(limit).max(1);
        let page = parse_positive(page).unwrap_or(1).clamp(1, pages);
        Self {
            page,
            limit,
            total,
            pages,
        }
    }

    pub fn skip(&self) -> u64 {
        (self.page - 1) * self.limit
    }
}

/// Count, then fetch one sorted page.
pub async fn paginate<T>(
    collection: &Collection<T>,
    filter: Document,
    sort: Document,
    query: &ListQuery,
    default_limit: u64,
    context: &str,
) -> ApiResult<(Vec<T>, Pagination)>
where
    T: DeserializeOwned + Unpin + Send + Sync,
{
    let total = collection
        .count_documents(filter.clone(), None)
        .await
        .map_err(|e| ApiError::database(context, e))?;

    let pagination = Pagination::resolve(
        query.page.as_deref(),
        query.limit.as_deref(),
        default_limit,
        total,
    );

    let options = FindOptions::builder()
        .sort(sort)
        .skip(pagination.skip())
        .limit(pagination.limit as i64)
        .build();

    let items: Vec<T> = collection
        .find(filter, options)
        .await
        .map_err(|e| ApiError::database(context, e))?
        .try_collect()
        .await
        .map_err(|e| ApiError::database(context, e))?;

    Ok((items, pagination))
}

// ============================================================================
// Validation
// ============================================================================

lazy_static::lazy_static! {
    /// Valid slug pattern: lowercase letters, numbers, and hyphens
    static ref SLUG_REGEX: Regex = Regex::new(r"^[a-z0-9]+(?:-[a-z0-9]+)*$").unwrap();
    static ref EMAIL_REGEX: Regex = Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap();
}

pub fn is_valid_slug(slug: &str) -> bool {
    SLUG_REGEX.is_match(slug)
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_REGEX.is_match(email)
}

/// Collects per-field messages for a `Validation` error.
#[derive(Debug, Default)]
pub struct Validator {
    errors: Vec<String>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    /// On create the field must be present and non-blank; on update it may
    /// be absent but not blank.
    pub fn text(&mut self, value: &Option<String>, required: bool, message: &str) {
        match value.as_deref().map(str::trim) {
            Some("") => self.error(message),
            None if required => self.error(message),
            _ => {}
        }
    }

    pub fn max_chars(&mut self, value: &Option<String>, max: usize, message: &str) {
        if value
            .as_deref()
            .is_some_and(|v| v.trim().chars().count() > max)
        {
            self.error(message);
        }
    }

    pub fn finish(self) -> ApiResult<()> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(ApiError::Validation(self.errors))
        }
    }
}

pub fn trimmed(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string())
}

/// Lowercase and check a caller-supplied slug.
pub fn normalize_slug(provided: &str, validator: &mut Validator) -> Option<String> {
    let slug = provided.trim().to_lowercase();
    if slug.is_empty() {
        validator.error("Please provide a slug");
        return None;
    }
    if !is_valid_slug(&slug) {
        validator.error("Slug may only contain lowercase letters, numbers, and hyphens");
        return None;
    }
    Some(slug)
}

/// Pick the slug for a new document. A supplied slug is normalised and
/// checked; a missing one is derived from `title` and de-duplicated against
/// slugs already in `collection`.
pub async fn resolve_slug<T>(
    collection: &Collection<T>,
    provided: Option<&str>,
    title: Option<&str>,
    validator: &mut Validator,
) -> ApiResult<Option<String>>
where
    T: Send + Sync,
{
    if let Some(provided) = provided {
        return Ok(normalize_slug(provided, validator));
    }

    let options = SlugOptions::default();
    let base = title
        .map(|t| crate::slug::slugify(t, &options))
        .unwrap_or_default();
    if base.is_empty() {
        validator.error("Please provide a slug");
        return Ok(None);
    }

    let pattern = format!("^{}", regex::escape(&base));
    let existing: Vec<String> = collection
        .distinct("slug", doc! { "slug": { "$regex": pattern } }, None)
        .await
        .map_err(|e| ApiError::database("Failed to check existing slugs", e))?
        .into_iter()
        .filter_map(|b| b.as_str().map(str::to_string))
        .collect();

    Ok(Some(unique_slug(&base, &existing, &options)))
}
