use std::sync::Arc;

use axum::{Json, debug_handler, extract::State};
use serde::Deserialize;
use sqlx::SqlitePool;
use tower_sessions::Session;

use crate::{
    AppResult, AppState,
    audit::{self, AuditAction},
    config::Config,
    db::{self, User},
    error::{ChatError, ChatResult},
    extract::ClientIp,
    session,
};

use super::throttle;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Checks the throttle, then the credentials, and records the attempt either
/// way. A throttled address is turned away before its password is looked at.
pub async fn authenticate(
    db_pool: &SqlitePool,
    config: &Config,
    request: &LoginRequest,
    ip: &str,
) -> ChatResult<User> {
    let username = request.username.trim();

    if throttle::is_throttled(db_pool, ip, config.login_max_attempts, config.login_window).await? {
        tracing::warn!(ip, username, "login throttled");
        return Err(ChatError::Throttled);
    }

    let user = super::verify_credentials(db_pool, username, &request.password).await?;
    throttle::record_attempt(db_pool, username, ip, user.is_some()).await?;

    let Some(mut user) = user else {
        tracing::info!(ip, username, "login failed");
        return Err(ChatError::InvalidCredentials);
    };

    super::touch_last_login(db_pool, user.id).await?;
    user.last_login = Some(db::now());

    audit::record(db_pool, Some(user.id), AuditAction::Login, format!("logged in as {username}"), ip).await;
    tracing::info!(user_id = %user.id, username, "logged in");
    Ok(user)
}

#[debug_handler(state = AppState)]
pub(crate) async fn login(
    State(db_pool): State<SqlitePool>,
    State(config): State<Arc<Config>>,
    ClientIp(ip): ClientIp,
    session: Session,
    Json(request): Json<LoginRequest>,
) -> AppResult<Json<User>> {
    let user = authenticate(&db_pool, &config, &request, &ip).await?;
    session::begin(&session, &user).await?;

    Ok(Json(user))
}
