/**
 * Testimonial Routes
 * CRUD API endpoints for client testimonials, keyed by id
 */
use axum::{
    extract::{Path, State},
    http::HeaderMap,
    response::IntoResponse,
    Json,
};
use mongodb::{
    bson::{doc, oid::ObjectId, DateTime as BsonDateTime, Document},
    options::{FindOneAndUpdateOptions, ReturnDocument},
};

use crate::{
    db::{
        models::{Testimonial, TestimonialInput, TestimonialResponse},
        parse_object_id,
    },
    error::{ApiError, ApiResult},
    routes::{
        created, paginate, trimmed, Ack, ApiJson, ApiQuery, DataResponse, ListQuery, ListResponse,
        Validator,
    },
    session::{require_role, Role},
    AppState,
};

const DEFAULT_LIMIT: u64 = 100;
const INVALID_ID: &str = "Invalid testimonial ID format";
const NOT_FOUND: &str = "Testimonial not found";

fn testimonial_id(id: &str) -> ApiResult<ObjectId> {
    parse_object_id(id).ok_or_else(|| ApiError::bad_request(INVALID_ID))
}

fn validate(input: &TestimonialInput, creating: bool, v: &mut Validator) {
    v.text(&input.name, creating, "Please provide a name");
    v.text(&input.role, creating, "Please provide a role");
    v.text(&input.location, creating, "Please provide a location");
    v.text(&input.text, creating, "Please provide the testimonial text");
    if let Some(rating) = input.rating {
        if !(Testimonial::MIN_RATING..=Testimonial::MAX_RATING).contains(&rating) {
            v.error("Rating must be between 1 and 5");
        }
    }
}

fn update_document(input: TestimonialInput) -> Document {
    let mut set = Document::new();
    if let Some(name) = trimmed(input.name) {
        set.insert("name", name);
    }
    if let Some(role) = trimmed(input.role) {
        set.insert("role", role);
    }
    if let Some(company) = trimmed(input.company) {
        set.insert("company", company);
    }
    if let Some(location) = trimmed(input.location) {
        set.insert("location", location);
    }
    if let Some(avatar) = trimmed(input.avatar) {
        set.insert("avatar", avatar);
    }
    if let Some(text) = trimmed(input.text) {
        set.insert("text", text);
    }
    if let Some(rating) = input.rating {
        set.insert("rating", rating);
    }
    if let Some(featured) = input.featured {
        set.insert("featured", featured);
    }
    if let Some(date) = input.date {
        set.insert("date", BsonDateTime::from_chrono(date));
    }
    if let Some(order) = input.order {
        set.insert("order", order);
    }
    if let Some(published) = input.published {
        set.insert("published", published);
    }
    set.insert("updatedAt", BsonDateTime::now());
    set
}

/// GET /api/testimonials
pub async fn list_testimonials(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<ListQuery>,
) -> ApiResult<impl IntoResponse> {
    let mut filter = Document::new();
    ListQuery::apply_flag(&mut filter, "featured", &query.featured);
    query.apply_published(&mut filter);

    let (testimonials, pagination) = paginate(
        &state.db.testimonials(),
        filter,
        doc! { "order": 1, "date": -1 },
        &query,
        DEFAULT_LIMIT,
        "Failed to fetch testimonials",
    )
    .await?;

    let data: Vec<TestimonialResponse> = testimonials.into_iter().map(Into::into).collect();
    Ok(Json(ListResponse::new(data, &pagination)))
}

/// GET /api/testimonials/{id}
pub async fn get_testimonial(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let oid = testimonial_id(&id)?;

    let testimonial = state
        .db
        .testimonials()
        .find_one(doc! { "_id": oid }, None)
        .await
        .map_err(|e| ApiError::database("Failed to fetch testimonial", e))?
        .ok_or_else(|| ApiError::not_found(NOT_FOUND))?;

    Ok(Json(DataResponse::new(TestimonialResponse::from(testimonial))))
}

/// POST /api/testimonials
pub async fn create_testimonial(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiJson(input): ApiJson<TestimonialInput>,
) -> ApiResult<impl IntoResponse> {
    let session = require_role(&state.config, &headers, Role::Editor)?;

    let mut v = Validator::new();
    validate(&input, true, &mut v);
    v.finish()?;

    let now = BsonDateTime::now();
    let mut testimonial = Testimonial {
        id: None,
        name: input.name.unwrap_or_default().trim().to_string(),
        role: input.role.unwrap_or_default().trim().to_string(),
        company: trimmed(input.company).filter(|c| !c.is_empty()),
        location: input.location.unwrap_or_default().trim().to_string(),
        avatar: trimmed(input.avatar).filter(|a| !a.is_empty()),
        text: input.text.unwrap_or_default().trim().to_string(),
        rating: input.rating.unwrap_or(Testimonial::MAX_RATING),
        featured: input.featured.unwrap_or(false),
        date: input.date.map(BsonDateTime::from_chrono).unwrap_or(now),
        order: input.order.unwrap_or(0),
        published: input.published.unwrap_or(true),
        created_at: now,
        updated_at: now,
    };

    let result = state
        .db
        .testimonials()
        .insert_one(&testimonial, None)
        .await
        .map_err(|e| ApiError::database("Failed to create testimonial", e))?;
    testimonial.id = result.inserted_id.as_object_id();

    tracing::info!(name = %testimonial.name, by = %session.user.email, "testimonial created");
    Ok(created(TestimonialResponse::from(testimonial)))
}

/// PUT /api/testimonials/{id}
pub async fn update_testimonial(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    ApiJson(input): ApiJson<TestimonialInput>,
) -> ApiResult<impl IntoResponse> {
    require_role(&state.config, &headers, Role::Editor)?;
    let oid = testimonial_id(&id)?;

    let mut v = Validator::new();
    validate(&input, false, &mut v);
    v.finish()?;

    let options = FindOneAndUpdateOptions::builder()
        .return_document(ReturnDocument::After)
        .build();

    let testimonial = state
        .db
        .testimonials()
        .find_one_and_update(
            doc! { "_id": oid },
            doc! { "$set": update_document(input) },
            options,
        )
        .await
        .map_err(|e| ApiError::database("Failed to update testimonial", e))?
        .ok_or_else(|| ApiError::not_found(NOT_FOUND))?;

    Ok(Json(DataResponse::new(TestimonialResponse::from(testimonial))))
}

/// DELETE /api/testimonials/{id}
pub async fn delete_testimonial(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    require_role(&state.config, &headers, Role::Editor)?;
    let oid = testimonial_id(&id)?;

    let result = state
        .db
        .testimonials()
        .delete_one(doc! { "_id": oid }, None)
        .await
        .map_err(|e| ApiError::database("Failed to delete testimonial", e))?;

    if result.deleted_count == 0 {
        return Err(ApiError::not_found(NOT_FOUND));
    }

    tracing::info!(id = %id, "testimonial deleted");
    Ok(Ack::new("Testimonial deleted successfully"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{app, send, token};
    use axum::http::StatusCode;
    use serde_json::json;

    #[test]
    fn test_rating_bounds() {
        for (rating, ok) in [(0, false), (1, true), (5, true), (6, false)] {
            let mut v = Validator::new();
            validate(
                &TestimonialInput {
                    rating: Some(rating),
                    ..Default::default()
                },
                false,
                &mut v,
            );
            assert_eq!(v.finish().is_ok(), ok, "rating {}", rating);
        }
    }

    #[tokio::test]
    async fn test_malformed_id_is_rejected() {
        let (status, body) = send(app().await, "GET", "/api/testimonials/not-an-id", None, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], INVALID_ID);
    }

    #[tokio::test]
    async fn test_create_validates_fields_and_rating() {
        let editor = token(Role::Editor);
        let (status, body) = send(
            app().await,
            "POST",
            "/api/testimonials",
            Some(&editor),
            Some(json!({ "name": "Ada", "rating": 9 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let errors: Vec<String> = serde_json::from_value(body["errors"].clone()).unwrap();
        assert_eq!(errors.len(), 4);
        assert!(errors.contains(&"Rating must be between 1 and 5".to_string()));
    }

    #[tokio::test]
    async fn test_mutations_require_session_before_id_check() {
        let (status, _) = send(
            app().await,
            "PUT",
            "/api/testimonials/not-an-id",
            None,
            Some(json!({ "rating": 4 })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let editor = token(Role::Editor);
        let (status, body) = send(
            app().await,
            "DELETE",
            "/api/testimonials/not-an-id",
            Some(&editor),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], INVALID_ID);
    }
}
