//! Database models: persisted document shapes, the allow-listed request bodies
//! that may write them, and the JSON shapes returned to clients.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use mongodb::bson::{oid::ObjectId, DateTime as BsonDateTime};
use serde::{Deserialize, Serialize};

use crate::session::Role;

fn hex_id(id: &Option<ObjectId>) -> String {
    id.map(|oid| oid.to_hex()).unwrap_or_default()
}

fn default_true() -> bool {
    true
}

// ============================================================================
// Blog
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlogPost {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub title: String,
    pub slug: String,
    pub excerpt: String,
    pub content: String,
    pub cover_image: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    pub category: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub views: i64,
    pub date: BsonDateTime,
    #[serde(default)]
    pub featured: bool,
    #[serde(default = "default_true")]
    pub published: bool,
    pub created_at: BsonDateTime,
    pub updated_at: BsonDateTime,
}

/// Writable blog fields. Shared by create (required fields enforced) and
/// update (only supplied fields are written).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlogPostInput {
    pub title: Option<String>,
    pub slug: Option<String>,
    pub excerpt: Option<String>,
    pub content: Option<String>,
    pub cover_image: Option<String>,
    pub author: Option<String>,
    pub category: Option<String>,
    pub tags: Option<Vec<String>>,
    pub date: Option<DateTime<Utc>>,
    pub featured: Option<bool>,
    pub published: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlogPostResponse {
    pub id: String,
    pub title: String,
    pub slug: String,
    pub excerpt: String,
    pub content: String,
    pub cover_image: String,
    pub author: Option<String>,
    pub category: String,
    pub tags: Vec<String>,
    pub views: i64,
    pub date: DateTime<Utc>,
    pub featured: bool,
    pub published: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<BlogPost> for BlogPostResponse {
    fn from(post: BlogPost) -> Self {
        Self {
            id: hex_id(&post.id),
            title: post.title,
            slug: post.slug,
            excerpt: post.excerpt,
            content: post.content,
            cover_image: post.cover_image,
            author: post.author,
            category: post.category,
            tags: post.tags,
            views: post.views,
            date: post.date.to_chrono(),
            featured: post.featured,
            published: post.published,
            created_at: post.created_at.to_chrono(),
            updated_at: post.updated_at.to_chrono(),
        }
    }
}

// ============================================================================
// Portfolio
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioItem {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub title: String,
    pub slug: String,
    pub description: String,
    pub category: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub images: Vec<String>,
    pub main_image: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub demo_link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub behance_link: Option<String>,
    #[serde(default)]
    pub featured: bool,
    pub completion_date: BsonDateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client: Option<String>,
    #[serde(default)]
    pub technologies: Vec<String>,
    #[serde(default)]
    pub order: i32,
    #[serde(default = "default_true")]
    pub published: bool,
    pub created_at: BsonDateTime,
    pub updated_at: BsonDateTime,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioItemInput {
    pub title: Option<String>,
    pub slug: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub tags: Option<Vec<String>>,
    pub images: Option<Vec<String>>,
    pub main_image: Option<String>,
    pub demo_link: Option<String>,
    pub code_link: Option<String>,
    pub behance_link: Option<String>,
    pub featured: Option<bool>,
    pub completion_date: Option<DateTime<Utc>>,
    pub client: Option<String>,
    pub technologies: Option<Vec<String>>,
    pub order: Option<i32>,
    pub published: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioItemResponse {
    pub id: String,
    pub title: String,
    pub slug: String,
    pub description: String,
    pub category: String,
    pub tags: Vec<String>,
    pub images: Vec<String>,
    pub main_image: String,
    pub demo_link: Option<String>,
    pub code_link: Option<String>,
    pub behance_link: Option<String>,
    pub featured: bool,
    pub completion_date: DateTime<Utc>,
    pub client: Option<String>,
    pub technologies: Vec<String>,
    pub order: i32,
    pub published: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<PortfolioItem> for PortfolioItemResponse {
    fn from(item: PortfolioItem) -> Self {
        Self {
            id: hex_id(&item.id),
            title: item.title,
            slug: item.slug,
            description: item.description,
            category: item.category,
            tags: item.tags,
            images: item.images,
            main_image: item.main_image,
            demo_link: item.demo_link,
            code_link: item.code_link,
            behance_link: item.behance_link,
            featured: item.featured,
            completion_date: item.completion_date.to_chrono(),
            client: item.client,
            technologies: item.technologies,
            order: item.order,
            published: item.published,
            created_at: item.created_at.to_chrono(),
            updated_at: item.updated_at.to_chrono(),
        }
    }
}

// ============================================================================
// Testimonials
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Testimonial {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub name: String,
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    pub location: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    pub text: String,
    #[serde(default = "Testimonial::default_rating")]
    pub rating: i32,
    #[serde(default)]
    pub featured: bool,
    pub date: BsonDateTime,
    #[serde(default)]
    pub order: i32,
    #[serde(default = "default_true")]
    pub published: bool,
    pub created_at: BsonDateTime,
    pub updated_at: BsonDateTime,
}

impl Testimonial {
    pub const MIN_RATING: i32 = 1;
    pub const MAX_RATING: i32 = 5;

    fn default_rating() -> i32 {
        Self::MAX_RATING
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestimonialInput {
    pub name: Option<String>,
    pub role: Option<String>,
    pub company: Option<String>,
    pub location: Option<String>,
    pub avatar: Option<String>,
    pub text: Option<String>,
    pub rating: Option<i32>,
    pub featured: Option<bool>,
    pub date: Option<DateTime<Utc>>,
    pub order: Option<i32>,
    pub published: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestimonialResponse {
    pub id: String,
    pub name: String,
    pub role: String,
    pub company: Option<String>,
    pub location: String,
    pub avatar: Option<String>,
    pub text: String,
    pub rating: i32,
    pub featured: bool,
    pub date: DateTime<Utc>,
    pub order: i32,
    pub published: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Testimonial> for TestimonialResponse {
    fn from(t: Testimonial) -> Self {
        Self {
            id: hex_id(&t.id),
            name: t.name,
            role: t.role,
            company: t.company,
            location: t.location,
            avatar: t.avatar,
            text: t.text,
            rating: t.rating,
            featured: t.featured,
            date: t.date.to_chrono(),
            order: t.order,
            published: t.published,
            created_at: t.created_at.to_chrono(),
            updated_at: t.updated_at.to_chrono(),
        }
    }
}

// ============================================================================
// Contact messages
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub subject: String,
    pub message: String,
    #[serde(default)]
    pub is_read: bool,
    #[serde(default)]
    pub is_archived: bool,
    #[serde(default)]
    pub is_spam: bool,
    pub created_at: BsonDateTime,
    pub updated_at: BsonDateTime,
}

/// Public contact form body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContactSubmission {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub subject: Option<String>,
    pub message: Option<String>,
}

/// The only message fields an editor may change.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageFlags {
    pub is_read: Option<bool>,
    pub is_archived: Option<bool>,
    pub is_spam: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageResponse {
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub subject: String,
    pub message: String,
    pub is_read: bool,
    pub is_archived: bool,
    pub is_spam: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Message> for MessageResponse {
    fn from(m: Message) -> Self {
        Self {
            id: hex_id(&m.id),
            name: m.name,
            email: m.email,
            phone: m.phone,
            subject: m.subject,
            message: m.message,
            is_read: m.is_read,
            is_archived: m.is_archived,
            is_spam: m.is_spam,
            created_at: m.created_at.to_chrono(),
            updated_at: m.updated_at.to_chrono(),
        }
    }
}

// ============================================================================
// Users
// ============================================================================

/// User profile as read through the credential-free projection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_login: Option<BsonDateTime>,
    pub created_at: BsonDateTime,
    pub updated_at: BsonDateTime,
}

/// Full user document including the stored credential pair. Only the
/// login and password-change paths read this shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub salt: String,
    #[serde(default)]
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_login: Option<BsonDateTime>,
    pub created_at: BsonDateTime,
    pub updated_at: BsonDateTime,
}

impl UserRecord {
    pub fn profile(&self) -> User {
        User {
            id: self.id,
            name: self.name.clone(),
            email: self.email.clone(),
            role: self.role,
            avatar: self.avatar.clone(),
            is_active: self.is_active,
            last_login: self.last_login,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Admin-managed user fields. `password` is hashed, never stored as given.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInput {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub role: Option<Role>,
    pub avatar: Option<String>,
    pub is_active: Option<bool>,
}

/// Self-service profile update on `/api/users/me`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordChange {
    pub current_password: Option<String>,
    pub new_password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub avatar: Option<String>,
    pub is_active: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(u: User) -> Self {
        Self {
            id: hex_id(&u.id),
            name: u.name,
            email: u.email,
            role: u.role,
            avatar: u.avatar,
            is_active: u.is_active,
            last_login: u.last_login.map(|d| d.to_chrono()),
            created_at: u.created_at.to_chrono(),
            updated_at: u.updated_at.to_chrono(),
        }
    }
}

// ============================================================================
// Analytics
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageView {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub path: String,
    #[serde(default)]
    pub referrer: String,
    #[serde(default)]
    pub user_agent: String,
    pub ip: String,
    pub country: String,
    pub device: String,
    pub browser: String,
    pub os: String,
    pub timestamp: BsonDateTime,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageViewInput {
    pub path: Option<String>,
    pub referrer: Option<String>,
}

/// Per-day aggregate. Map keys are stored encoded; see
/// [`crate::analytics::encode_key`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyStats {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub date: BsonDateTime,
    #[serde(default)]
    pub total_visits: i64,
    #[serde(default)]
    pub unique_visitors: i64,
    #[serde(default)]
    pub page_views: HashMap<String, i64>,
    #[serde(default)]
    pub referrers: HashMap<String, i64>,
    #[serde(default)]
    pub countries: HashMap<String, i64>,
    #[serde(default)]
    pub devices: HashMap<String, i64>,
    #[serde(default)]
    pub browsers: HashMap<String, i64>,
    #[serde(default)]
    pub operating_systems: HashMap<String, i64>,
}

// ============================================================================
// Auth
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshToken {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub user_id: ObjectId,
    pub token_hash: String,
    pub expires_at: BsonDateTime,
    #[serde(default)]
    pub revoked: bool,
    pub created_at: BsonDateTime,
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson;

    fn now() -> BsonDateTime {
        BsonDateTime::now()
    }

    #[test]
    fn test_blog_post_bson_field_names_are_camel_case() {
        let post = BlogPost {
            id: None,
            title: "Hello".into(),
            slug: "hello".into(),
            excerpt: "e".into(),
            content: "<p>c</p>".into(),
            cover_image: "/uploads/a.png".into(),
            author: None,
            category: "rust".into(),
            tags: vec![],
            views: 0,
            date: now(),
            featured: false,
            published: true,
            created_at: now(),
            updated_at: now(),
        };
        let doc = bson::to_document(&post).unwrap();
        assert!(doc.contains_key("coverImage"));
        assert!(doc.contains_key("createdAt"));
        assert!(!doc.contains_key("_id"));
        assert!(!doc.contains_key("author"));
    }

    #[test]
    fn test_missing_defaults_on_read() {
        let doc = bson::doc! {
            "_id": ObjectId::new(),
            "name": "Ada",
            "role": "CTO",
            "location": "London",
            "text": "Great work",
            "date": now(),
            "createdAt": now(),
            "updatedAt": now(),
        };
        let t: Testimonial = bson::from_document(doc).unwrap();
        assert_eq!(t.rating, 5);
        assert!(t.published);
        assert!(!t.featured);
        assert_eq!(t.order, 0);
    }

    #[test]
    fn test_profile_response_has_no_credentials() {
        let record = UserRecord {
            id: Some(ObjectId::new()),
            name: "Admin".into(),
            email: "admin@example.com".into(),
            password_hash: "hash".into(),
            salt: "salt".into(),
            role: Role::Admin,
            avatar: None,
            is_active: true,
            last_login: None,
            created_at: now(),
            updated_at: now(),
        };
        let json = serde_json::to_value(UserResponse::from(record.profile())).unwrap();
        assert!(json.get("passwordHash").is_none());
        assert!(json.get("salt").is_none());
        assert_eq!(json["role"], "admin");
        assert_eq!(json["id"].as_str().unwrap().len(), 24);
    }

    #[test]
    fn test_daily_stats_reads_int32_counters() {
        let doc = bson::doc! {
            "date": now(),
            "totalVisits": 3_i32,
            "pageViews": { "/": 2_i32, "/blog": 1_i32 },
        };
        let stats: DailyStats = bson::from_document(doc).unwrap();
        assert_eq!(stats.total_visits, 3);
        assert_eq!(stats.unique_visitors, 0);
        assert_eq!(stats.page_views.get("/"), Some(&2));
        assert!(stats.referrers.is_empty());
    }
}
