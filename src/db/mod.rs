pub mod models;
pub mod users;

use std::time::{Duration, Instant};

use mongodb::{
    bson::{doc, oid::ObjectId, Document},
    options::{ClientOptions, IndexOptions},
    Client, Collection, Database, IndexModel,
};

use models::{
    BlogPost, DailyStats, Message, PageView, PortfolioItem, RefreshToken, Testimonial, User,
    UserRecord,
};

// Collection names follow the pluralised model names of the existing data set.
pub const BLOG_POSTS: &str = "blogposts";
pub const PORTFOLIO_ITEMS: &str = "portfolioitems";
pub const TESTIMONIALS: &str = "testimonials";
pub const MESSAGES: &str = "messages";
pub const USERS: &str = "users";
pub const PAGE_VIEWS: &str = "pageviews";
pub const DAILY_STATS: &str = "dailystats";
pub const REFRESH_TOKENS: &str = "refreshtokens";

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub uri: String,
    pub database: String,
    pub max_pool_size: u32,
    pub min_pool_size: u32,
    pub connect_timeout_secs: u64,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            uri: std::env::var("MONGODB_URI")
                .unwrap_or_else(|_| "mongodb://localhost:27017".to_string()),
            database: std::env::var("MONGODB_DB").unwrap_or_else(|_| "portfolio".to_string()),
            max_pool_size: std::env::var("DB_POOL_MAX")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10),
            min_pool_size: std::env::var("DB_POOL_MIN")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(0),
            connect_timeout_secs: std::env::var("DB_CONNECT_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10),
        }
    }
}

/// Handle to the content database. Cheap to clone; all clones share the
/// driver's connection pool.
#[derive(Debug, Clone)]
pub struct Db {
    database: Database,
}

impl Db {
    /// Build the client once at startup. The driver connects lazily, so this
    /// only fails on a malformed URI or options.
    pub async fn connect(config: &DbConfig) -> Result<Self, mongodb::error::Error> {
        tracing::info!("Initializing MongoDB client...");
        tracing::debug!(
            "MongoDB URI: {}",
            config.uri.replace(
                |c: char| !c.is_ascii_alphanumeric() && c != ':' && c != '/' && c != '@' && c != '.',
                "*"
            )
        );

        let mut options = ClientOptions::parse(&config.uri).await?;
        options.app_name = Some("portfolio-cms".to_string());
        options.max_pool_size = Some(config.max_pool_size);
        options.min_pool_size = Some(config.min_pool_size);
        options.connect_timeout = Some(Duration::from_secs(config.connect_timeout_secs));

        let client = Client::with_options(options)?;
        Ok(Self::from_database(client.database(&config.database)))
    }

    pub fn from_database(database: Database) -> Self {
        Self { database }
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    pub fn blog_posts(&self) -> Collection<BlogPost> {
        self.database.collection(BLOG_POSTS)
    }

    pub fn portfolio_items(&self) -> Collection<PortfolioItem> {
        self.database.collection(PORTFOLIO_ITEMS)
    }

    pub fn testimonials(&self) -> Collection<Testimonial> {
        self.database.collection(TESTIMONIALS)
    }

    pub fn messages(&self) -> Collection<Message> {
        self.database.collection(MESSAGES)
    }

    /// User profiles. Reads through this collection must project out the
    /// credential fields; see [`users::profile_projection`].
    pub fn users(&self) -> Collection<User> {
        self.database.collection(USERS)
    }

    pub fn user_records(&self) -> Collection<UserRecord> {
        self.database.collection(USERS)
    }

    pub fn page_views(&self) -> Collection<PageView> {
        self.database.collection(PAGE_VIEWS)
    }

    pub fn daily_stats(&self) -> Collection<DailyStats> {
        self.database.collection(DAILY_STATS)
    }

    pub fn refresh_tokens(&self) -> Collection<RefreshToken> {
        self.database.collection(REFRESH_TOKENS)
    }

    /// Round-trip a `ping` command and report its latency.
    pub async fn ping(&self) -> Result<Duration, mongodb::error::Error> {
        let start = Instant::now();
        self.database.run_command(doc! { "ping": 1 }, None).await?;
        Ok(start.elapsed())
    }

    /// Create the unique and lookup indexes the handlers rely on.
    pub async fn ensure_indexes(&self) -> Result<(), mongodb::error::Error> {
        tracing::info!("Ensuring database indexes...");

        let unique = |keys: Document| {
            IndexModel::builder()
                .keys(keys)
                .options(IndexOptions::builder().unique(true).build())
                .build()
        };
        let plain = |keys: Document| IndexModel::builder().keys(keys).build();

        let blog = self.database.collection::<Document>(BLOG_POSTS);
        blog.create_indexes(
            [
                unique(doc! { "slug": 1 }),
                plain(doc! { "category": 1 }),
                plain(doc! { "tags": 1 }),
                plain(doc! { "published": 1, "date": -1 }),
            ],
            None,
        )
        .await?;

        let portfolio = self.database.collection::<Document>(PORTFOLIO_ITEMS);
        portfolio
            .create_indexes(
                [
                    unique(doc! { "slug": 1 }),
                    plain(doc! { "order": 1, "completionDate": -1 }),
                ],
                None,
            )
            .await?;

        let testimonials = self.database.collection::<Document>(TESTIMONIALS);
        testimonials
            .create_index(plain(doc! { "order": 1, "date": -1 }), None)
            .await?;

        let messages = self.database.collection::<Document>(MESSAGES);
        messages
            .create_index(plain(doc! { "createdAt": -1 }), None)
            .await?;

        let users = self.database.collection::<Document>(USERS);
        users.create_index(unique(doc! { "email": 1 }), None).await?;

        let page_views = self.database.collection::<Document>(PAGE_VIEWS);
        page_views
            .create_indexes(
                [plain(doc! { "timestamp": -1 }), plain(doc! { "ip": 1, "timestamp": -1 })],
                None,
            )
            .await?;

        let daily_stats = self.database.collection::<Document>(DAILY_STATS);
        daily_stats
            .create_index(unique(doc! { "date": 1 }), None)
            .await?;

        let refresh_tokens = self.database.collection::<Document>(REFRESH_TOKENS);
        refresh_tokens
            .create_indexes(
                [unique(doc! { "tokenHash": 1 }), plain(doc! { "userId": 1 })],
                None,
            )
            .await?;

        tracing::info!("Database indexes ready");
        Ok(())
    }
}

/// Parse a path segment into an ObjectId, `None` when malformed.
pub fn parse_object_id(id: &str) -> Option<ObjectId> {
    ObjectId::parse_str(id.trim()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_config_default_uses_env_or_fallback() {
        let config = DbConfig::default();
        assert!(config.max_pool_size >= 1);
        assert!(config.connect_timeout_secs >= 1);
        assert!(!config.uri.is_empty());
        assert!(!config.database.is_empty());
    }

    #[test]
    fn test_parse_object_id() {
        assert!(parse_object_id("65f1c2a9e4b0a1b2c3d4e5f6").is_some());
        assert!(parse_object_id("not-an-id").is_none());
        assert!(parse_object_id("").is_none());
    }

    #[tokio::test]
    async fn test_connect_is_lazy() {
        let config = DbConfig {
            uri: "mongodb://127.0.0.1:1".to_string(),
            database: "lazy".to_string(),
            max_pool_size: 1,
            min_pool_size: 0,
            connect_timeout_secs: 1,
        };
        let db = Db::connect(&config).await.unwrap();
        assert_eq!(db.database().name(), "lazy");
    }
}
