//! Portfolio CMS - library for app logic and testing

pub mod analytics;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod password;
pub mod routes;
pub mod session;
pub mod slug;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    middleware,
    routing::{get, post},
    Router,
};
use std::{net::SocketAddr, sync::Arc};
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer, cors::CorsLayer, limit::RequestBodyLimitLayer,
    services::ServeDir, set_header::SetResponseHeaderLayer, trace::TraceLayer,
};

use config::AppConfig;
use db::Db;
use password::CredentialHasher;

/// Global request body cap. Uploads get their own, larger limit.
const BODY_LIMIT: usize = 2 * 1024 * 1024;
const UPLOAD_BODY_LIMIT: usize = routes::upload::MAX_FILE_SIZE + 64 * 1024;

/// Served uploads may be SVG; they must never run script on the API origin.
const UPLOADS_CSP: &str = "default-src 'none'; img-src 'self' data:; style-src 'unsafe-inline'; sandbox";

/// Shared handler state. Cloned per request; everything inside is cheap to clone.
#[derive(Debug, Clone)]
pub struct AppState {
    pub db: Db,
    pub config: Arc<AppConfig>,
    pub hasher: CredentialHasher,
    pub login_throttle: Arc<routes::auth::LoginThrottle>,
}

impl AppState {
    pub fn new(db: Db, config: AppConfig) -> Self {
        let hasher = CredentialHasher::new(config.bcrypt_cost);
        Self {
            db,
            config: Arc::new(config),
            hasher,
            login_throttle: Arc::new(routes::auth::LoginThrottle::new()),
        }
    }
}

/// CORS for the configured front-end origins.
pub fn configure_cors(config: &AppConfig) -> CorsLayer {
    let mut origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();
    if origins.is_empty() {
        origins.push(HeaderValue::from_static("http://localhost:3000"));
    }

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::header::AUTHORIZATION,
        ])
        .allow_credentials(true)
}

/// Create and configure the application router.
pub fn create_app(state: AppState) -> Router {
    let cors = configure_cors(&state.config);
    tracing::info!("CORS configured");

    let uploads = ServiceBuilder::new()
        .layer(SetResponseHeaderLayer::overriding(
            header::CONTENT_SECURITY_POLICY,
            HeaderValue::from_static(UPLOADS_CSP),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .service(ServeDir::new(&state.config.upload_dir));

    Router::new()
        .route("/api/auth/login", post(routes::auth::login))
        .route("/api/auth/session", get(routes::auth::session))
        .route("/api/auth/refresh", post(routes::auth::refresh))
        .route("/api/auth/logout", post(routes::auth::logout))
        .route(
            "/api/blog",
            get(routes::blog::list_posts).post(routes::blog::create_post),
        )
        .route(
            "/api/blog/{slug}",
            get(routes::blog::get_post)
                .put(routes::blog::update_post)
                .delete(routes::blog::delete_post),
        )
        .route(
            "/api/portfolio",
            get(routes::portfolio::list_items).post(routes::portfolio::create_item),
        )
        .route(
            "/api/portfolio/{slug}",
            get(routes::portfolio::get_item)
                .put(routes::portfolio::update_item)
                .delete(routes::portfolio::delete_item),
        )
        .route(
            "/api/testimonials",
            get(routes::testimonials::list_testimonials)
                .post(routes::testimonials::create_testimonial),
        )
        .route(
            "/api/testimonials/{id}",
            get(routes::testimonials::get_testimonial)
                .put(routes::testimonials::update_testimonial)
                .delete(routes::testimonials::delete_testimonial),
        )
        .route(
            "/api/contact",
            get(routes::contact::list_messages).post(routes::contact::submit_message),
        )
        .route(
            "/api/contact/{id}",
            get(routes::contact::get_message)
                .patch(routes::contact::update_message)
                .delete(routes::contact::delete_message),
        )
        .route(
            "/api/users",
            get(routes::users::list_users).post(routes::users::create_user),
        )
        .route(
            "/api/users/me",
            get(routes::users::get_me).patch(routes::users::update_me),
        )
        .route(
            "/api/users/{id}",
            get(routes::users::get_user)
                .put(routes::users::update_user)
                .delete(routes::users::delete_user),
        )
        .route("/api/analytics", get(routes::analytics::get_analytics))
        .route(
            "/api/analytics/pageview",
            post(routes::analytics::record_pageview),
        )
        .route(
            "/api/uploads",
            post(routes::upload::upload_file).layer(DefaultBodyLimit::max(UPLOAD_BODY_LIMIT)),
        )
        .route("/health", get(routes::health::health_ping))
        .route("/health/database", get(routes::health::health_database))
        .nest_service("/uploads", uploads)
        .with_state(state)
        .layer(logging::middleware::propagate_request_id_layer())
        .layer(middleware::from_fn(logging::middleware::log_request))
        .layer(logging::middleware::request_id_layer())
        .layer(TraceLayer::new_for_http())
        // Compress responses with gzip/br/zstd automatically
        .layer(CompressionLayer::new())
        .layer(RequestBodyLimitLayer::new(UPLOAD_BODY_LIMIT))
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .layer(cors)
}

/// Run the server (used by main).
pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    // Guards MUST be held for the programme's lifetime; dropping them early
    // shuts down background log-writer threads and loses buffered log lines.
    let _log_guards = logging::init(&logging::LogConfig::from_env());

    routes::health::init_start_time();

    let config = AppConfig::from_env();
    if let Err(reason) = config.validate() {
        tracing::error!("Refusing to start: {}", reason);
        return Err(reason.into());
    }

    let db = Db::connect(&config.db).await?;
    if let Err(e) = db.ensure_indexes().await {
        // Indexes back the slug/email/day uniqueness rules; without them the
        // server would accept duplicates.
        tracing::error!("Failed to ensure database indexes: {}", e);
        return Err(e.into());
    }

    tokio::fs::create_dir_all(&config.upload_dir).await?;

    let addr: SocketAddr = config.bind_addr().parse()?;
    let app = create_app(AppState::new(db, config));

    tracing::info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
