//! End-to-end API tests against a real MongoDB.
//!
//! They are ignored by default. Run them with
//! `MONGODB_TEST_URI=mongodb://localhost:27017 cargo test -- --ignored`.
//! Each test works in its own throwaway database.

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use mongodb::bson::doc;
use serde_json::{json, Value};
use tower::ServiceExt;

use portfolio_cms::{
    config::AppConfig,
    create_app,
    db::{
        users::{self, NewUser},
        Db, DbConfig,
    },
    session::{create_access_token, Role, SessionUser},
    AppState,
};

struct TestApp {
    state: AppState,
}

impl TestApp {
    async fn start() -> Self {
        let uri = std::env::var("MONGODB_TEST_URI")
            .expect("MONGODB_TEST_URI must point at a MongoDB server");
        let db_config = DbConfig {
            uri,
            database: format!("portfolio_test_{}", uuid::Uuid::new_v4().simple()),
            max_pool_size: 4,
            min_pool_size: 0,
            connect_timeout_secs: 5,
        };
        let db = Db::connect(&db_config).await.expect("connect");
        db.ensure_indexes().await.expect("indexes");

        let config = AppConfig {
            db: db_config,
            bcrypt_cost: 4,
            upload_dir: std::env::temp_dir().join("portfolio-cms-it-uploads"),
            ..AppConfig::default()
        };
        Self {
            state: AppState::new(db, config),
        }
    }

    fn router(&self) -> Router {
        create_app(self.state.clone())
    }

    fn editor_token(&self) -> String {
        let user = SessionUser {
            id: "65f1c2a9e4b0a1b2c3d4e5f6".to_string(),
            email: "editor@example.com".to_string(),
            name: "Editor".to_string(),
            role: Role::Editor,
        };
        create_access_token(&self.state.config, &user).unwrap()
    }

    async fn request(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
        headers: &[(&str, &str)],
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {}", token));
        }
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let req = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(&json).unwrap()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let res = self.router().oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    async fn send(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        self.request(method, uri, token, body, &[]).await
    }

    async fn seed_user(&self, email: &str, password: &str, role: Role) {
        let credentials = self.state.hasher.hash(password).await.unwrap();
        users::create(
            &self.state.db,
            NewUser {
                name: "Seeded".to_string(),
                email: email.to_string(),
                role,
                avatar: None,
                is_active: true,
            },
            credentials,
        )
        .await
        .unwrap();
    }

    async fn login(&self, email: &str, password: &str) -> (StatusCode, Value) {
        self.send(
            "POST",
            "/api/auth/login",
            None,
            Some(json!({ "email": email, "password": password })),
        )
        .await
    }

    async fn finish(self) {
        let _ = self.state.db.database().drop(None).await;
    }
}

fn blog_body(title: &str) -> Value {
    json!({
        "title": title,
        "excerpt": "A short excerpt",
        "content": "<p>Body</p>",
        "coverImage": "/uploads/cover.png",
        "category": "engineering",
        "tags": ["rust", "mongodb"]
    })
}

#[tokio::test]
#[ignore = "requires MONGODB_TEST_URI"]
async fn test_duplicate_slug_is_rejected() {
    let app = TestApp::start().await;
    let token = app.editor_token();

    let mut body = blog_body("First");
    body["slug"] = json!("same-slug");
    let (status, _) = app.send("POST", "/api/blog", Some(&token), Some(body.clone())).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, res) = app.send("POST", "/api/blog", Some(&token), Some(body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        res["message"],
        "Duplicate entry. A blog post with this slug already exists."
    );

    app.finish().await;
}

#[tokio::test]
#[ignore = "requires MONGODB_TEST_URI"]
async fn test_generated_slugs_are_unique() {
    let app = TestApp::start().await;
    let token = app.editor_token();

    let (_, first) = app
        .send("POST", "/api/blog", Some(&token), Some(blog_body("Hello World")))
        .await;
    let (status, second) = app
        .send("POST", "/api/blog", Some(&token), Some(blog_body("Hello World")))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(first["data"]["slug"], "hello-world");
    assert_ne!(first["data"]["slug"], second["data"]["slug"]);
    assert!(second["data"]["slug"]
        .as_str()
        .unwrap()
        .starts_with("hello-world-"));

    app.finish().await;
}

#[tokio::test]
#[ignore = "requires MONGODB_TEST_URI"]
async fn test_list_defaults_to_published() {
    let app = TestApp::start().await;
    let token = app.editor_token();

    app.send("POST", "/api/blog", Some(&token), Some(blog_body("Live")))
        .await;
    let mut draft = blog_body("Draft");
    draft["published"] = json!(false);
    app.send("POST", "/api/blog", Some(&token), Some(draft)).await;

    let (status, res) = app.send("GET", "/api/blog", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(res["total"], 1);
    assert_eq!(res["data"][0]["slug"], "live");

    let (_, res) = app.send("GET", "/api/blog?published=false", None, None).await;
    assert_eq!(res["total"], 1);
    assert_eq!(res["data"][0]["slug"], "draft");

    let (_, res) = app.send("GET", "/api/blog?tag=rust", None, None).await;
    assert_eq!(res["count"], 1);

    app.finish().await;
}

#[tokio::test]
#[ignore = "requires MONGODB_TEST_URI"]
async fn test_each_fetch_counts_a_view() {
    let app = TestApp::start().await;
    let token = app.editor_token();
    app.send("POST", "/api/blog", Some(&token), Some(blog_body("Counted")))
        .await;

    let (_, first) = app.send("GET", "/api/blog/counted", None, None).await;
    let (_, second) = app.send("GET", "/api/blog/counted", None, None).await;
    assert_eq!(first["data"]["views"], 1);
    assert_eq!(second["data"]["views"], 2);

    let (status, _) = app.send("GET", "/api/blog/missing", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    app.finish().await;
}

#[tokio::test]
#[ignore = "requires MONGODB_TEST_URI"]
async fn test_pagination_clamps_page() {
    let app = TestApp::start().await;
    let token = app.editor_token();

    for name in ["Ada", "Grace", "Linus"] {
        let (status, _) = app
            .send(
                "POST",
                "/api/testimonials",
                Some(&token),
                Some(json!({
                    "name": name,
                    "role": "Engineer",
                    "location": "Remote",
                    "text": "Great collaboration"
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (_, res) = app
        .send("GET", "/api/testimonials?limit=2&page=5", None, None)
        .await;
    assert_eq!(res["total"], 3);
    assert_eq!(res["pages"], 2);
    assert_eq!(res["page"], 2);
    assert_eq!(res["count"], 1);

    app.finish().await;
}

#[tokio::test]
#[ignore = "requires MONGODB_TEST_URI"]
async fn test_contact_message_is_marked_read_on_fetch() {
    let app = TestApp::start().await;
    let token = app.editor_token();

    let (status, res) = app
        .send(
            "POST",
            "/api/contact",
            None,
            Some(json!({ "name": "Ada", "email": "ADA@example.com", "message": "Hello" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = res["data"]["id"].as_str().unwrap().to_string();

    let (_, unread) = app
        .send("GET", "/api/contact?isRead=false", Some(&token), None)
        .await;
    assert_eq!(unread["total"], 1);

    let (_, fetched) = app
        .send("GET", &format!("/api/contact/{}", id), Some(&token), None)
        .await;
    assert_eq!(fetched["data"]["isRead"], true);
    assert_eq!(fetched["data"]["email"], "ada@example.com");
    assert_eq!(fetched["data"]["subject"], "Contact Form Submission");

    app.finish().await;
}

#[tokio::test]
#[ignore = "requires MONGODB_TEST_URI"]
async fn test_page_views_fold_into_one_daily_document() {
    let app = TestApp::start().await;
    let headers = [
        ("x-forwarded-for", "198.51.100.7"),
        ("cf-ipcountry", "DE"),
        (
            "user-agent",
            "Mozilla/5.0 (X11; Linux x86_64; rv:120.0) Gecko/20100101 Firefox/120.0",
        ),
    ];

    for path in ["/", "/blog"] {
        let (status, res) = app
            .request(
                "POST",
                "/api/analytics/pageview",
                None,
                Some(json!({ "path": path, "referrer": "https://example.org" })),
                &headers,
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(res["message"], "Page view recorded");
    }

    let stats = app.state.db.daily_stats();
    assert_eq!(stats.count_documents(doc! {}, None).await.unwrap(), 1);
    let day = stats.find_one(doc! {}, None).await.unwrap().unwrap();
    assert_eq!(day.total_visits, 2);
    assert_eq!(day.unique_visitors, 1);
    assert_eq!(day.countries.get("DE"), Some(&2));
    assert_eq!(day.page_views.get("/blog"), Some(&1));

    app.finish().await;
}

#[tokio::test]
#[ignore = "requires MONGODB_TEST_URI"]
async fn test_password_change_requires_current_password() {
    let app = TestApp::start().await;
    app.seed_user("owner@example.com", "original-pass", Role::Admin)
        .await;

    let (status, res) = app.login("owner@example.com", "original-pass").await;
    assert_eq!(status, StatusCode::OK);
    let token = res["accessToken"].as_str().unwrap().to_string();

    let (status, res) = app
        .send(
            "PATCH",
            "/api/users/me",
            Some(&token),
            Some(json!({ "currentPassword": "wrong-pass", "newPassword": "brand-new-pass" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(res["message"], "Current password is incorrect");
    assert_eq!(app.login("owner@example.com", "original-pass").await.0, StatusCode::OK);

    let (status, _) = app
        .send(
            "PATCH",
            "/api/users/me",
            Some(&token),
            Some(json!({ "currentPassword": "original-pass", "newPassword": "brand-new-pass" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        app.login("owner@example.com", "original-pass").await.0,
        StatusCode::UNAUTHORIZED
    );
    assert_eq!(app.login("owner@example.com", "brand-new-pass").await.0, StatusCode::OK);

    app.finish().await;
}

#[tokio::test]
#[ignore = "requires MONGODB_TEST_URI"]
async fn test_refresh_token_is_single_use() {
    let app = TestApp::start().await;
    app.seed_user("editor@example.com", "editor-pass", Role::Editor)
        .await;

    let (_, res) = app.login("editor@example.com", "editor-pass").await;
    let refresh = res["refreshToken"].as_str().unwrap().to_string();

    let (status, rotated) = app
        .send(
            "POST",
            "/api/auth/refresh",
            None,
            Some(json!({ "refreshToken": refresh })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_ne!(rotated["refreshToken"], json!(refresh));

    let (status, _) = app
        .send(
            "POST",
            "/api/auth/refresh",
            None,
            Some(json!({ "refreshToken": refresh })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    app.finish().await;
}

#[tokio::test]
#[ignore = "requires MONGODB_TEST_URI"]
async fn test_duplicate_user_email_is_rejected() {
    let app = TestApp::start().await;
    app.seed_user("root@example.com", "root-password", Role::Admin)
        .await;
    let (_, res) = app.login("root@example.com", "root-password").await;
    let admin = res["accessToken"].as_str().unwrap().to_string();

    let body = json!({ "name": "Dup", "email": "Root@Example.com", "password": "another-pass" });
    let (status, res) = app.send("POST", "/api/users", Some(&admin), Some(body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(res["message"], "User with this email already exists");

    app.finish().await;
}
