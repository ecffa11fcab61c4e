/**
 * Blog Routes
 * CRUD API endpoints for blog posts
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
    db::models::{BlogPost, BlogPostInput, BlogPostResponse},
    error::{ApiError, ApiResult},
    routes::{
        created, normalize_slug, paginate, resolve_slug, trimmed, Ack, ApiJson, ApiQuery,
        DataResponse, ListQuery, ListResponse, Validator,
    },
    session::{require_role, Role},
    AppState,
};

const DEFAULT_LIMIT: u64 = 10;
const DUPLICATE_SLUG: &str = "Duplicate entry. A blog post with this slug already exists.";
const NOT_FOUND: &str = "Blog post not found";

const MAX_TITLE_CHARS: usize = 200;
const MAX_EXCERPT_CHARS: usize = 500;

// ============================================================================
// Validation
// ============================================================================

/// Sanitize HTML content using ammonia
fn sanitize_html(html: &str) -> String {
    ammonia::clean(html)
}

fn validate(input: &BlogPostInput, creating: bool, v: &mut Validator) {
    v.text(&input.title, creating, "Please provide a title");
    v.max_chars(
        &input.title,
        MAX_TITLE_CHARS,
        "Title cannot be more than 200 characters",
    );
    v.text(&input.excerpt, creating, "Please provide an excerpt");
    v.max_chars(
        &input.excerpt,
        MAX_EXCERPT_CHARS,
        "Excerpt cannot be more than 500 characters",
    );
    v.text(&input.content, creating, "Please provide content");
    v.text(&input.cover_image, creating, "Please provide a cover image");
    v.text(&input.category, creating, "Please provide a category");
}

/// Allow-listed `$set` for an update. `slug` is handled by the caller.
fn update_document(input: BlogPostInput) -> Document {
    let mut set = Document::new();
    if let Some(title) = trimmed(input.title) {
        set.insert("title", title);
    }
    if let Some(excerpt) = trimmed(input.excerpt) {
        set.insert("excerpt", excerpt);
    }
    if let Some(content) = input.content {
        set.insert("content", sanitize_html(&content));
    }
    if let Some(cover_image) = trimmed(input.cover_image) {
        set.insert("coverImage", cover_image);
    }
    if let Some(author) = trimmed(input.author) {
        set.insert("author", author);
    }
    if let Some(category) = trimmed(input.category) {
        set.insert("category", category);
    }
    if let Some(tags) = input.tags {
        set.insert("tags", tags);
    }
    if let Some(date) = input.date {
        set.insert("date", BsonDateTime::from_chrono(date));
    }
    if let Some(featured) = input.featured {
        set.insert("featured", featured);
    }
    if let Some(published) = input.published {
        set.insert("published", published);
    }
    set.insert("updatedAt", BsonDateTime::now());
    set
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/blog - List blog posts with pagination
pub async fn list_posts(
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

    let (posts, pagination) = paginate(
        &state.db.blog_posts(),
        filter,
        doc! { "date": -1 },
        &query,
        DEFAULT_LIMIT,
        "Failed to fetch blog posts",
    )
    .await?;

    let data: Vec<BlogPostResponse> = posts.into_iter().map(Into::into).collect();
    Ok(Json(ListResponse::new(data, &pagination)))
}

/// GET /api/blog/{slug} - Fetch one post and count the view
pub async fn get_post(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let options = FindOneAndUpdateOptions::builder()
        .return_document(ReturnDocument::After)
        .build();

    let post = state
        .db
        .blog_posts()
        .find_one_and_update(
            doc! { "slug": slug.trim().to_lowercase() },
            doc! { "$inc": { "views": 1_i64 } },
            options,
        )
        .await
        .map_err(|e| ApiError::database("Failed to fetch blog post", e))?
        .ok_or_else(|| ApiError::not_found(NOT_FOUND))?;

    Ok(Json(DataResponse::new(BlogPostResponse::from(post))))
}

/// POST /api/blog - Create a blog post
pub async fn create_post(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiJson(input): ApiJson<BlogPostInput>,
) -> ApiResult<impl IntoResponse> {
    let session = require_role(&state.config, &headers, Role::Editor)?;

    let mut v = Validator::new();
    validate(&input, true, &mut v);
    let slug = resolve_slug(
        &state.db.blog_posts(),
        input.slug.as_deref(),
        input.title.as_deref(),
        &mut v,
    )
    .await?;
    v.finish()?;

    let now = BsonDateTime::now();
    let mut post = BlogPost {
        id: None,
        title: input.title.unwrap_or_default().trim().to_string(),
        slug: slug.unwrap_or_default(),
        excerpt: input.excerpt.unwrap_or_default().trim().to_string(),
        content: sanitize_html(&input.content.unwrap_or_default()),
        cover_image: input.cover_image.unwrap_or_default().trim().to_string(),
        author: trimmed(input.author).filter(|a| !a.is_empty()),
        category: input.category.unwrap_or_default().trim().to_string(),
        tags: input.tags.unwrap_or_default(),
        views: 0,
        date: input.date.map(BsonDateTime::from_chrono).unwrap_or(now),
        featured: input.featured.unwrap_or(false),
        published: input.published.unwrap_or(true),
        created_at: now,
        updated_at: now,
    };

    let result = state
        .db
        .blog_posts()
        .insert_one(&post, None)
        .await
        .map_err(|e| ApiError::from_write(e, DUPLICATE_SLUG, "Failed to create blog post"))?;
    post.id = result.inserted_id.as_object_id();

    tracing::info!(slug = %post.slug, by = %session.user.email, "blog post created");
    Ok(created(BlogPostResponse::from(post)))
}

/// PUT /api/blog/{slug} - Update the supplied fields of a post
pub async fn update_post(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(slug): Path<String>,
    ApiJson(mut input): ApiJson<BlogPostInput>,
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

    let post = state
        .db
        .blog_posts()
        .find_one_and_update(
            doc! { "slug": slug.trim().to_lowercase() },
            doc! { "$set": set },
            options,
        )
        .await
        .map_err(|e| ApiError::from_write(e, DUPLICATE_SLUG, "Failed to update blog post"))?
        .ok_or_else(|| ApiError::not_found(NOT_FOUND))?;

    tracing::info!(slug = %post.slug, "blog post updated");
    Ok(Json(DataResponse::new(BlogPostResponse::from(post))))
}

/// DELETE /api/blog/{slug}
pub async fn delete_post(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(slug): Path<String>,
) -> ApiResult<impl IntoResponse> {
    require_role(&state.config, &headers, Role::Editor)?;

    let result = state
        .db
        .blog_posts()
        .delete_one(doc! { "slug": slug.trim().to_lowercase() }, None)
        .await
        .map_err(|e| ApiError::database("Failed to delete blog post", e))?;

    if result.deleted_count == 0 {
        return Err(ApiError::not_found(NOT_FOUND));
    }

    tracing::info!(slug = %slug, "blog post deleted");
    Ok(Ack::new("Blog post deleted successfully"))
}
