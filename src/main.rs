use std::sync::Arc;

use axum::{Router, routing::get};
use parlor::{AppState, ChatConfig, cache::MemoryCache, db, rooms};
use sqlx::sqlite::SqlitePoolOptions;
use tower_http::cors::CorsLayer;
use tower_sessions::{Expiry, MemoryStore, SessionManagerLayer, cookie::SameSite};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "parlor=info".into()),
        )
        .init();

    let session_store = MemoryStore::default();
    let session_layer = SessionManagerLayer::new(session_store)
        .with_secure(false)
        .with_same_site(SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(time::Duration::hours(12)));

    let db_pool = SqlitePoolOptions::new()
        .max_connections(16)
        .connect(
            dotenv::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite::memory:".to_owned())
                .as_str(),
        )
        .await
        .unwrap();
    db::apply_schema(&db_pool).await.unwrap();

    let config = ChatConfig {
        echo_to_sender: dotenv::var("ECHO_TO_SENDER")
            .map(|v| v == "1" || v == "true")
            .unwrap_or(false),
    };
    let app_state = AppState::new(db_pool, Arc::new(MemoryCache::default()), config);

    let app = Router::new()
        .route("/ws", get(rooms::ws::connect_ws))
        .nest("/r", rooms::router())
        .layer(CorsLayer::permissive())
        .with_state(app_state)
        .layer(session_layer);

    let addr = dotenv::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_owned());
    let listener = tokio::net::TcpListener::bind(&addr).await.unwrap();
    tracing::info!(%addr, "parlor listening");
    axum::serve(listener, app).await.unwrap();
}
