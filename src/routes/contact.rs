/**
 * Contact Routes
 * Public contact form submission and the editor inbox
 */
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use mongodb::{
    bson::{doc, oid::ObjectId, DateTime as BsonDateTime, Document},
    options::{FindOneAndUpdateOptions, ReturnDocument},
};
use serde::Serialize;

use crate::{
    db::{
        models::{ContactSubmission, Message, MessageFlags, MessageResponse},
        parse_object_id,
    },
    error::{ApiError, ApiResult},
    routes::{
        is_valid_email, paginate, trimmed, Ack, ApiJson, ApiQuery, DataResponse, ListQuery,
        ListResponse,
    },
    session::{require_role, Role},
    AppState,
};

const DEFAULT_LIMIT: u64 = 50;
const DEFAULT_SUBJECT: &str = "Contact Form Submission";
const INVALID_ID: &str = "Invalid message ID format";
const NOT_FOUND: &str = "Message not found";

/// Receipt returned to the visitor. The stored message is never echoed back.
#[derive(Debug, Serialize)]
pub struct SubmissionReceipt {
    pub id: String,
    pub timestamp: DateTime<Utc>,
}

fn message_id(id: &str) -> ApiResult<ObjectId> {
    parse_object_id(id).ok_or_else(|| ApiError::bad_request(INVALID_ID))
}

fn non_blank(value: Option<String>) -> Option<String> {
    trimmed(value).filter(|v| !v.is_empty())
}

fn flags_document(flags: MessageFlags) -> Document {
    let mut set = Document::new();
    if let Some(is_read) = flags.is_read {
        set.insert("isRead", is_read);
    }
    if let Some(is_archived) = flags.is_archived {
        set.insert("isArchived", is_archived);
    }
    if let Some(is_spam) = flags.is_spam {
        set.insert("isSpam", is_spam);
    }
    set.insert("updatedAt", BsonDateTime::now());
    set
}

/// GET /api/contact
pub async fn list_messages(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiQuery(query): ApiQuery<ListQuery>,
) -> ApiResult<impl IntoResponse> {
    require_role(&state.config, &headers, Role::Editor)?;

    let mut filter = Document::new();
    ListQuery::apply_flag(&mut filter, "isRead", &query.is_read);
    ListQuery::apply_flag(&mut filter, "isArchived", &query.is_archived);
    ListQuery::apply_flag(&mut filter, "isSpam", &query.is_spam);

    let (messages, pagination) = paginate(
        &state.db.messages(),
        filter,
        doc! { "createdAt": -1 },
        &query,
        DEFAULT_LIMIT,
        "Failed to fetch messages",
    )
    .await?;

    let data: Vec<MessageResponse> = messages.into_iter().map(Into::into).collect();
    Ok(Json(ListResponse::new(data, &pagination)))
}

/// POST /api/contact - public
pub async fn submit_message(
    State(state): State<AppState>,
    ApiJson(input): ApiJson<ContactSubmission>,
) -> ApiResult<impl IntoResponse> {
    let (Some(name), Some(email), Some(body)) = (
        non_blank(input.name),
        non_blank(input.email),
        non_blank(input.message),
    ) else {
        return Err(ApiError::bad_request(
            "Please provide name, email, and message",
        ));
    };

    if !is_valid_email(&email) {
        return Err(ApiError::bad_request("Please provide a valid email address"));
    }

    let now = BsonDateTime::now();
    let message = Message {
        id: None,
        name,
        email: email.to_lowercase(),
        phone: non_blank(input.phone),
        subject: non_blank(input.subject).unwrap_or_else(|| DEFAULT_SUBJECT.to_string()),
        message: body,
        is_read: false,
        is_archived: false,
        is_spam: false,
        created_at: now,
        updated_at: now,
    };

    let result = state
        .db
        .messages()
        .insert_one(&message, None)
        .await
        .map_err(|e| {
            ApiError::database("Failed to submit your message. Please try again later.", e)
        })?;

    let id = result
        .inserted_id
        .as_object_id()
        .map(|oid| oid.to_hex())
        .unwrap_or_default();
    tracing::info!(id = %id, "contact message received");

    Ok((
        StatusCode::CREATED,
        Json(DataResponse::with_message(
            "Your message has been received. We will get back to you soon!",
            SubmissionReceipt {
                id,
                timestamp: now.to_chrono(),
            },
        )),
    ))
}

/// GET /api/contact/{id} - marks the message read
pub async fn get_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    require_role(&state.config, &headers, Role::Editor)?;
    let oid = message_id(&id)?;

    let options = FindOneAndUpdateOptions::builder()
        .return_document(ReturnDocument::After)
        .build();

    let message = state
        .db
        .messages()
        .find_one_and_update(
            doc! { "_id": oid },
            doc! { "$set": { "isRead": true } },
            options,
        )
        .await
        .map_err(|e| ApiError::database("Failed to fetch message", e))?
        .ok_or_else(|| ApiError::not_found(NOT_FOUND))?;

    Ok(Json(DataResponse::new(MessageResponse::from(message))))
}

/// PATCH /api/contact/{id} - only the status flags are writable
pub async fn update_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    ApiJson(flags): ApiJson<MessageFlags>,
) -> ApiResult<impl IntoResponse> {
    require_role(&state.config, &headers, Role::Editor)?;
    let oid = message_id(&id)?;

    let options = FindOneAndUpdateOptions::builder()
        .return_document(ReturnDocument::After)
        .build();

    let message = state
        .db
        .messages()
        .find_one_and_update(
            doc! { "_id": oid },
            doc! { "$set": flags_document(flags) },
            options,
        )
        .await
        .map_err(|e| ApiError::database("Failed to update message", e))?
        .ok_or_else(|| ApiError::not_found(NOT_FOUND))?;

    Ok(Json(DataResponse::new(MessageResponse::from(message))))
}

/// DELETE /api/contact/{id}
pub async fn delete_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    require_role(&state.config, &headers, Role::Editor)?;
    let oid = message_id(&id)?;

    let result = state
        .db
        .messages()
        .delete_one(doc! { "_id": oid }, None)
        .await
        .map_err(|e| ApiError::database("Failed to delete message", e))?;

    if result.deleted_count == 0 {
        return Err(ApiError::not_found(NOT_FOUND));
    }

    tracing::info!(id = %id, "contact message deleted");
    Ok(Ack::new("Message deleted successfully"))
}
