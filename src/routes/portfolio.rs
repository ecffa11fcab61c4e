/**
 * Portfolio Routes
 * CRUD API endpoints for portfolio items
 */
use axum::{
    extract::{Path, State},
    http::HeaderMap,
    response::IntoResponse,
    Json,
};
use mongodb::{
    bson::{doc, DateTime as BsonDateTime, Document},
    options::{FindOneAndUpdateOptions, ReturnDocument},
};

use crate::{
    db::models::{PortfolioItem, PortfolioItemInput, PortfolioItemResponse},
    error::{ApiError, ApiResult},
    routes::{
        created, normalize_slug, paginate, resolve_slug, trimmed, Ack, ApiJson, ApiQuery,
        DataResponse, ListQuery, ListResponse, Validator,
    },
    session::{require_role, Role},
    AppState,
};

const DEFAULT_LIMIT: u64 = 100;
const DUPLICATE_SLUG: &str = "Duplicate entry. A portfolio item with this slug already exists.";
const NOT_FOUND: &str = "Portfolio item not found";

fn validate(input: &PortfolioItemInput, creating: bool, v: &mut Validator) {
    v.text(&input.title, creating, "Please provide a title");
    v.text(&input.description, creating, "Please provide a description");
    v.text(&input.category, creating, "Please provide a category");
    v.text(&input.main_image, creating, "Please provide a main image");
}

fn update_document(input: PortfolioItemInput) -> Document {
    let mut set = Document::new();
    if let Some(title) = trimmed(input.title) {
        set.insert("title", title);
    }
    if let Some(description) = trimmed(input.description) {
        set.insert("description", description);
    }
    if let Some(category) = trimmed(input.category) {
        set.insert("category", category);
    }
    if let Some(tags) = input.tags {
        set.insert("tags", tags);
    }
    if let Some(images) = input.images {
        set.insert("images", images);
    }
    if let Some(main_image) = trimmed(input.main_image) {
        set.insert("mainImage", main_image);
    }
    if let Some(link) = trimmed(input.demo_link) {
        set.insert("demoLink", link);
    }
    if let Some(link) = trimmed(input.code_link) {
        set.insert("codeLink", link);
    }
    if let Some(link) = trimmed(input.behance_link) {
        set.insert("behanceLink", link);
    }
    if let Some(featured) = input.featured {
        set.insert("featured", featured);
    }
    if let Some(date) = input.completion_date {
        set.insert("completionDate", BsonDateTime::from_chrono(date));
    }
    if let Some(client) = trimmed(input.client) {
        set.insert("client", client);
    }
    if let Some(technologies) = input.technologies {
        set.insert("technologies", technologies);
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

fn optional(value: Option<String>) -> Option<String> {
    trimmed(value).filter(|v| !v.is_empty())
}

/// GET /api/portfolio
pub async fn list_items(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<ListQuery>,
) -> ApiResult<impl IntoResponse> {
    let mut filter = Document::new();
    if let Some(category) = query.category() {
        filter.insert("category", category);
    }
    if let Some(tag) = query.tag() {
        filter.insert("tags", doc! { "$in": [tag] });
    }
    ListQuery::apply_flag(&mut filter, "featured", &query.featured);
    query.apply_published(&mut filter);

    let (items, pagination) = paginate(
        &state.db.portfolio_items(),
        filter,
        doc! { "order": 1, "completionDate": -1 },
        &query,
        DEFAULT_LIMIT,
        "Failed to fetch portfolio items",
    )
    .await?;

    let data: Vec<PortfolioItemResponse> = items.into_iter().map(Into::into).collect();
    Ok(Json(ListResponse::new(data, &pagination)))
}

/// GET /api/portfolio/{slug}
pub async fn get_item(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let item = state
        .db
        .portfolio_items()
        .find_one(doc! { "slug": slug.trim().to_lowercase() }, None)
        .await
        .map_err(|e| ApiError::database("Failed to fetch portfolio item", e))?
        .ok_or_else(|| ApiError::not_found(NOT_FOUND))?;

    Ok(Json(DataResponse::new(PortfolioItemResponse::from(item))))
}

/// POST /api/portfolio
pub async fn create_item(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiJson(input): ApiJson<PortfolioItemInput>,
) -> ApiResult<impl IntoResponse> {
    let session = require_role(&state.config, &headers, Role::Editor)?;

    let mut v = Validator::new();
    validate(&input, true, &mut v);
    let slug = resolve_slug(
        &state.db.portfolio_items(),
        input.slug.as_deref(),
        input.title.as_deref(),
        &mut v,
    )
    .await?;
    v.finish()?;

    let now = BsonDateTime::now();
    let mut item = PortfolioItem {
        id: None,
        title: input.title.unwrap_or_default().trim().to_string(),
        slug: slug.unwrap_or_default(),
        description: input.description.unwrap_or_default().trim().to_string(),
        category: input.category.unwrap_or_default().trim().to_string(),
        tags: input.tags.unwrap_or_default(),
        images: input.images.unwrap_or_default(),
        main_image: input.main_image.unwrap_or_default().trim().to_string(),
        demo_link: optional(input.demo_link),
        code_link: optional(input.code_link),
        behance_link: optional(input.behance_link),
        featured: input.featured.unwrap_or(false),
        completion_date: input
            .completion_date
            .map(BsonDateTime::from_chrono)
            .unwrap_or(now),
        client: optional(input.client),
        technologies: input.technologies.unwrap_or_default(),
        order: input.order.unwrap_or(0),
        published: input.published.unwrap_or(true),
        created_at: now,
        updated_at: now,
    };

    let result = state
        .db
        .portfolio_items()
        .insert_one(&item, None)
        .await
        .map_err(|e| ApiError::from_write(e, DUPLICATE_SLUG, "Failed to create portfolio item"))?;
    item.id = result.inserted_id.as_object_id();

    tracing::info!(slug = %item.slug, by = %session.user.email, "portfolio item created");
    Ok(created(PortfolioItemResponse::from(item)))
}

/// PUT /api/portfolio/{slug}
pub async fn update_item(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(slug): Path<String>,
    ApiJson(mut input): ApiJson<PortfolioItemInput>,
) -> ApiResult<impl IntoResponse> {
    require_role(&state.config, &headers, Role::Editor)?;

    let mut v = Validator::new();
    validate(&input, false, &mut v);
    let new_slug = input
        .slug
        .take()
        .and_then(|s| normalize_slug(&s, &mut v));
    v.finish()?;

    let mut set = update_document(input);
    if let Some(new_slug) = new_slug {
        set.insert("slug", new_slug);
    }

    let options = FindOneAndUpdateOptions::builder()
        .return_document(ReturnDocument::After)
        .build();

    let item = state
        .db
        .portfolio_items()
        .find_one_and_update(
            doc! { "slug": slug.trim().to_lowercase() },
            doc! { "$set": set },
            options,
        )
        .await
        .map_err(|e| ApiError::from_write(e, DUPLICATE_SLUG, "Failed to update portfolio item"))?
        .ok_or_else(|| ApiError::not_found(NOT_FOUND))?;

    tracing::info!(slug = %item.slug, "portfolio item updated");
    Ok(Json(DataResponse::new(PortfolioItemResponse::from(item))))
}

/// DELETE /api/portfolio/{slug}
pub async fn delete_item(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(slug): Path<String>,
) -> ApiResult<impl IntoResponse> {
    require_role(&state.config, &headers, Role::Editor)?;

    let result = state
        .db
        .portfolio_items()
        .delete_one(doc! { "slug": slug.trim().to_lowercase() }, None)
        .await
        .map_err(|e| ApiError::database("Failed to delete portfolio item", e))?;

    if result.deleted_count == 0 {
        return Err(ApiError::not_found(NOT_FOUND));
    }

    tracing::info!(slug = %slug, "portfolio item deleted");
    Ok(Ack::new("Portfolio item deleted successfully"))
}
