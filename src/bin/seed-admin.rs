//! Creates the initial admin account. Skips when the email is already taken.
//!
//! Usage: seed-admin [EMAIL] [PASSWORD]
//! Falls back to ADMIN_EMAIL / ADMIN_PASSWORD / ADMIN_NAME from the environment.

use std::env;

use portfolio_cms::{
    config::AppConfig,
    db::{
        users::{self, NewUser},
        Db,
    },
    password::{CredentialHasher, MIN_PASSWORD_LENGTH},
    session::Role,
};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("seed_admin=info,portfolio_cms=info")),
        )
        .init();

    let mut args = env::args().skip(1);
    let email = args
        .next()
        .or_else(|| env::var("ADMIN_EMAIL").ok())
        .unwrap_or_else(|| "admin@example.com".to_string());
    let password = args.next().or_else(|| env::var("ADMIN_PASSWORD").ok());
    let name = env::var("ADMIN_NAME").unwrap_or_else(|_| "Admin User".to_string());

    let Some(password) = password else {
        eprintln!("Usage: seed-admin [EMAIL] [PASSWORD]  (or set ADMIN_PASSWORD)");
        std::process::exit(1);
    };
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        eprintln!(
            "Password must be at least {} characters long",
            MIN_PASSWORD_LENGTH
        );
        std::process::exit(1);
    }

    if let Err(e) = seed(&email, &password, &name).await {
        eprintln!("Error seeding admin user: {}", e);
        std::process::exit(1);
    }
}

async fn seed(email: &str, password: &str, name: &str) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::from_env();
    let db = Db::connect(&config.db).await?;
    db.ping().await?;
    db.ensure_indexes().await?;

    if users::find_by_email(&db, email).await?.is_some() {
        println!("Admin user {} already exists. Skipping creation.", email);
        return Ok(());
    }

    let hasher = CredentialHasher::new(config.bcrypt_cost);
    let credentials = hasher.hash(password).await?;
    let user = users::create(
        &db,
        NewUser {
            name: name.to_string(),
            email: email.to_string(),
            role: Role::Admin,
            avatar: None,
            is_active: true,
        },
        credentials,
    )
    .await?;

    println!("Admin user created successfully with email: {}", user.email);
    Ok(())
}
