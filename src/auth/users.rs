use std::sync::Arc;

use axum::{
    Json, debug_handler,
    extract::{Path, Query, State},
};
use serde::Deserialize;
use serde_json::{Value, json};
use sqlx::SqlitePool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    AppResult, AppState,
    audit::{self, AuditAction},
    config::Config,
    db::{AuditEntry, LoginAttempt, Permissions, User},
    error::{ChatError, ChatResult, Entity},
    policy::{Action, Caller, Resource},
};

use super::{NewUser, throttle};

async fn target(db_pool: &SqlitePool, id: Uuid) -> ChatResult<User> {
    super::find_user(db_pool, id)
        .await?
        .ok_or(ChatError::NotFound(Entity::User))
}

pub async fn list(db_pool: &SqlitePool, caller: &Caller) -> ChatResult<Vec<User>> {
    caller.require(Resource::Users, Action::Read)?;
    Ok(super::list_users(db_pool).await?)
}

pub async fn register(
    db_pool: &SqlitePool,
    caller: &Caller,
    new_user: &NewUser,
    min_password_len: usize,
) -> ChatResult<User> {
    caller.require(Resource::Users, Action::Create)?;
    let user = super::create_user(db_pool, new_user, min_password_len).await?;

    audit::record(
        db_pool,
        Some(caller.user.id),
        AuditAction::CreateUser,
        format!("created {} account {}", user.role, user.username),
        &caller.ip,
    )
    .await;
    Ok(user)
}

pub async fn reset_password(
    db_pool: &SqlitePool,
    caller: &Caller,
    id: Uuid,
    new_password: &str,
    min_password_len: usize,
) -> ChatResult<()> {
    let user = target(db_pool, id).await?;
    caller.require(Resource::User(&user), Action::Update)?;
    super::set_password(db_pool, id, new_password, min_password_len).await?;

    audit::record(
        db_pool,
        Some(caller.user.id),
        AuditAction::SetPassword,
        format!("reset password of {}", user.username),
        &caller.ip,
    )
    .await;
    Ok(())
}

/// Self service. Needs the current password, not a permission.
pub async fn change_own_password(
    db_pool: &SqlitePool,
    caller: &Caller,
    current_password: &str,
    new_password: &str,
    min_password_len: usize,
) -> ChatResult<()> {
    if !super::verify_current_password(db_pool, caller.user.id, current_password).await? {
        return Err(ChatError::Invalid("current password is incorrect".to_owned()));
    }
    super::set_password(db_pool, caller.user.id, new_password, min_password_len).await?;

    audit::record(
        db_pool,
        Some(caller.user.id),
        AuditAction::ChangePassword,
        "changed own password",
        &caller.ip,
    )
    .await;
    Ok(())
}

pub async fn set_user_permissions(
    db_pool: &SqlitePool,
    caller: &Caller,
    id: Uuid,
    permissions: Permissions,
) -> ChatResult<User> {
    let user = target(db_pool, id).await?;
    caller.require(Resource::User(&user), Action::Update)?;
    let user = super::update_permissions(db_pool, id, permissions).await?;

    audit::record(
        db_pool,
        Some(caller.user.id),
        AuditAction::UpdatePermissions,
        format!("set permissions of {} to {permissions:?}", user.username),
        &caller.ip,
    )
    .await;
    Ok(user)
}

/// `until = None` bans until lifted.
pub async fn ban(
    db_pool: &SqlitePool,
    caller: &Caller,
    id: Uuid,
    until: Option<OffsetDateTime>,
) -> ChatResult<User> {
    let user = target(db_pool, id).await?;
    caller.require(Resource::User(&user), Action::Ban)?;
    let user = super::ban_user(db_pool, id, until).await?;

    let details = match until {
        Some(until) => format!("banned {} until {until}", user.username),
        None => format!("banned {}", user.username),
    };
    audit::record(db_pool, Some(caller.user.id), AuditAction::BanUser, details, &caller.ip).await;
    tracing::info!(user_id = %user.id, by = %caller.user.id, "user banned");
    Ok(user)
}

pub async fn unban(db_pool: &SqlitePool, caller: &Caller, id: Uuid) -> ChatResult<User> {
    let user = target(db_pool, id).await?;
    caller.require(Resource::User(&user), Action::Unban)?;
    let user = super::unban_user(db_pool, id).await?;

    audit::record(
        db_pool,
        Some(caller.user.id),
        AuditAction::UnbanUser,
        format!("unbanned {}", user.username),
        &caller.ip,
    )
    .await;
    Ok(user)
}

/// Every login attempt made against the account's username, oldest first.
pub async fn login_history(
    db_pool: &SqlitePool,
    caller: &Caller,
    id: Uuid,
) -> ChatResult<Vec<LoginAttempt>> {
    caller.require(Resource::Users, Action::Read)?;
    let user = target(db_pool, id).await?;
    Ok(throttle::attempts_for(db_pool, &user.username).await?)
}

#[debug_handler(state = AppState)]
pub(crate) async fn list_users_handler(
    State(db_pool): State<SqlitePool>,
    caller: Caller,
) -> AppResult<Json<Vec<User>>> {
    Ok(Json(list(&db_pool, &caller).await?))
}

#[debug_handler(state = AppState)]
pub(crate) async fn create_user_handler(
    State(db_pool): State<SqlitePool>,
    State(config): State<Arc<Config>>,
    caller: Caller,
    Json(new_user): Json<NewUser>,
) -> AppResult<Json<User>> {
    let user = register(&db_pool, &caller, &new_user, config.min_password_len).await?;
    Ok(Json(user))
}

#[derive(Debug, Deserialize)]
pub(crate) struct SetPasswordBody {
    password: String,
}

#[debug_handler(state = AppState)]
pub(crate) async fn set_password_handler(
    State(db_pool): State<SqlitePool>,
    State(config): State<Arc<Config>>,
    caller: Caller,
    Path(id): Path<Uuid>,
    Json(SetPasswordBody { password }): Json<SetPasswordBody>,
) -> AppResult<Json<Value>> {
    reset_password(&db_pool, &caller, id, &password, config.min_password_len).await?;
    Ok(Json(json!({ "success": true })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ChangePasswordBody {
    current_password: String,
    new_password: String,
}

#[debug_handler(state = AppState)]
pub(crate) async fn change_own_password_handler(
    State(db_pool): State<SqlitePool>,
    State(config): State<Arc<Config>>,
    caller: Caller,
    Json(body): Json<ChangePasswordBody>,
) -> AppResult<Json<Value>> {
    change_own_password(
        &db_pool,
        &caller,
        &body.current_password,
        &body.new_password,
        config.min_password_len,
    )
    .await?;
    Ok(Json(json!({ "success": true })))
}

#[debug_handler(state = AppState)]
pub(crate) async fn set_permissions_handler(
    State(db_pool): State<SqlitePool>,
    caller: Caller,
    Path(id): Path<Uuid>,
    Json(permissions): Json<Permissions>,
) -> AppResult<Json<User>> {
    Ok(Json(set_user_permissions(&db_pool, &caller, id, permissions).await?))
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct BanBody {
    #[serde(default, with = "time::serde::rfc3339::option")]
    until: Option<OffsetDateTime>,
}

#[debug_handler(state = AppState)]
pub(crate) async fn ban_handler(
    State(db_pool): State<SqlitePool>,
    caller: Caller,
    Path(id): Path<Uuid>,
    body: Option<Json<BanBody>>,
) -> AppResult<Json<User>> {
    let BanBody { until } = body.map(|Json(body)| body).unwrap_or_default();
    Ok(Json(ban(&db_pool, &caller, id, until).await?))
}

#[debug_handler(state = AppState)]
pub(crate) async fn unban_handler(
    State(db_pool): State<SqlitePool>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> AppResult<Json<User>> {
    Ok(Json(unban(&db_pool, &caller, id).await?))
}

#[debug_handler(state = AppState)]
pub(crate) async fn login_history_handler(
    State(db_pool): State<SqlitePool>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Vec<LoginAttempt>>> {
    Ok(Json(login_history(&db_pool, &caller, id).await?))
}

#[derive(Debug, Deserialize)]
pub(crate) struct AuditQuery {
    #[serde(default = "default_audit_limit")]
    limit: i64,
}

fn default_audit_limit() -> i64 {
    100
}

#[debug_handler(state = AppState)]
pub(crate) async fn audit_handler(
    State(db_pool): State<SqlitePool>,
    caller: Caller,
    Query(AuditQuery { limit }): Query<AuditQuery>,
) -> AppResult<Json<Vec<AuditEntry>>> {
    caller.require(Resource::Users, Action::Read)?;
    Ok(Json(audit::recent(&db_pool, limit.clamp(1, 1000)).await?))
}
