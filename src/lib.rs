pub mod appresult;
pub mod audit;
pub mod auth;
pub mod codec;
pub mod config;
pub mod db;
pub mod error;
pub mod extract;
pub mod index;
pub mod policy;
pub mod rooms;
pub mod session;

use std::{sync::Arc, time::Duration};

use axum::{
    Router,
    extract::FromRef,
    http::{HeaderValue, Method, header::CONTENT_TYPE},
};
use sqlx::SqlitePool;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tower_sessions::{Expiry, MemoryStore, SessionManagerLayer, cookie::SameSite};

pub use appresult::{AppError, AppResult};
pub use config::Config;

#[derive(Clone, FromRef)]
pub struct AppState {
    pub db_pool: SqlitePool,
    pub config: Arc<Config>,
}

/// The full router with session, tracing and CORS layers applied.
pub fn app(state: AppState) -> Router {
    let config = &state.config;

    let session_layer = SessionManagerLayer::new(MemoryStore::default())
        .with_name(config.session_cookie.clone())
        .with_http_only(true)
        .with_secure(false)
        .with_same_site(SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(config.session_idle));

    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "ignoring unparsable CORS origin");
                None
            }
        })
        .collect();
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([CONTENT_TYPE])
        .allow_credentials(true)
        .max_age(Duration::from_secs(3600));

    Router::new()
        .merge(index::router())
        .merge(auth::router())
        .nest("/r", rooms::router())
        .nest("/m", rooms::message_router())
        .method_not_allowed_fallback(appresult::method_not_allowed)
        .with_state(state)
        .layer(session_layer)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
