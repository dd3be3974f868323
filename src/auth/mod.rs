pub mod password;
pub mod throttle;

pub mod users;

mod login;
mod logout;

use axum::{
    Router,
    routing::{get, post, put},
};
use serde::Deserialize;
use sqlx::SqlitePool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    AppState,
    db::{self, Permissions, Role, USER_SELECT, User},
    error::{ChatError, ChatResult, Entity},
};

pub use login::{LoginRequest, authenticate};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/login", post(login::login))
        .route("/logout", post(logout::logout))
        .route("/me/password", put(users::change_own_password_handler))
        .route("/users", get(users::list_users_handler).post(users::create_user_handler))
        .route("/users/{id}/password", put(users::set_password_handler))
        .route("/users/{id}/permissions", put(users::set_permissions_handler))
        .route("/users/{id}/ban", post(users::ban_handler))
        .route("/users/{id}/unban", post(users::unban_handler))
        .route("/users/{id}/logins", get(users::login_history_handler))
        .route("/audit", get(users::audit_handler))
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub permissions: Permissions,
}

/// Inserts the account and its permission row together. An existing username
/// is rejected before anything is written.
pub async fn create_user(
    db_pool: &SqlitePool,
    new_user: &NewUser,
    min_password_len: usize,
) -> ChatResult<User> {
    let username = new_user.username.trim();
    if username.is_empty() {
        return Err(ChatError::Invalid("username is required".to_owned()));
    }
    password::validate_password(&new_user.password, min_password_len)?;

    if find_by_username(db_pool, username).await?.is_some() {
        return Err(ChatError::Duplicate(Entity::User));
    }

    let password_hash = password::hash_password(&new_user.password)?;
    let user = User {
        id: Uuid::now_v7(),
        username: username.to_owned(),
        password_hash,
        role: new_user.role,
        permissions: new_user.permissions,
        active: true,
        banned: false,
        banned_until: None,
        created_at: db::now(),
        last_login: None,
    };

    let mut tx = db_pool.begin().await?;
    sqlx::query(
        "INSERT INTO users (id, username, password_hash, role, active, banned, created_at) VALUES (?, ?, ?, ?, 1, 0, ?)",
    )
    .bind(user.id)
    .bind(&user.username)
    .bind(&user.password_hash)
    .bind(user.role.as_str())
    .bind(db::unix(user.created_at))
    .execute(&mut *tx)
    .await
    .map_err(|e| ChatError::from_write(e, Entity::User))?;

    write_permissions(&mut tx, user.id, &user.permissions).await?;
    tx.commit().await?;

    tracing::info!(user_id = %user.id, username = %user.username, role = %user.role, "created user");
    Ok(user)
}

async fn write_permissions(
    conn: &mut sqlx::SqliteConnection,
    user_id: Uuid,
    permissions: &Permissions,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO permissions (user_id, can_create_room, can_upload_files, can_delete_messages, can_ban_users) \
         VALUES (?, ?, ?, ?, ?) \
         ON CONFLICT (user_id) DO UPDATE SET \
         can_create_room = excluded.can_create_room, \
         can_upload_files = excluded.can_upload_files, \
         can_delete_messages = excluded.can_delete_messages, \
         can_ban_users = excluded.can_ban_users",
    )
    .bind(user_id)
    .bind(permissions.can_create_room)
    .bind(permissions.can_upload_files)
    .bind(permissions.can_delete_messages)
    .bind(permissions.can_ban_users)
    .execute(conn)
    .await?;
    Ok(())
}

/// `None` for an unknown username, a wrong password, a deactivated account,
/// or a ban that is still in force.
pub async fn verify_credentials(
    db_pool: &SqlitePool,
    username: &str,
    password: &str,
) -> ChatResult<Option<User>> {
    let Some(user) = find_by_username(db_pool, username.trim()).await? else {
        return Ok(None);
    };

    if !password::verify_password(password, &user.password_hash)? {
        return Ok(None);
    }

    if !user.active || user.is_banned_at(db::now()) {
        return Ok(None);
    }

    Ok(Some(user))
}

pub async fn verify_current_password(
    db_pool: &SqlitePool,
    id: Uuid,
    password: &str,
) -> ChatResult<bool> {
    let user = find_user(db_pool, id)
        .await?
        .ok_or(ChatError::NotFound(Entity::User))?;
    Ok(password::verify_password(password, &user.password_hash)?)
}

pub async fn set_password(
    db_pool: &SqlitePool,
    id: Uuid,
    new_password: &str,
    min_password_len: usize,
) -> ChatResult<()> {
    password::validate_password(new_password, min_password_len)?;
    let password_hash = password::hash_password(new_password)?;

    let result = sqlx::query("UPDATE users SET password_hash = ? WHERE id = ?")
        .bind(password_hash)
        .bind(id)
        .execute(db_pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(ChatError::NotFound(Entity::User));
    }
    Ok(())
}

/// Admin accounts cannot be banned, whoever asks.
pub async fn ban_user(
    db_pool: &SqlitePool,
    id: Uuid,
    until: Option<OffsetDateTime>,
) -> ChatResult<User> {
    let mut user = find_user(db_pool, id)
        .await?
        .ok_or(ChatError::NotFound(Entity::User))?;
    if user.is_admin() {
        return Err(ChatError::Unauthorized);
    }

    sqlx::query("UPDATE users SET banned = 1, banned_until = ? WHERE id = ?")
        .bind(until.map(db::unix))
        .bind(id)
        .execute(db_pool)
        .await?;

    user.banned = true;
    user.banned_until = until;
    Ok(user)
}

pub async fn unban_user(db_pool: &SqlitePool, id: Uuid) -> ChatResult<User> {
    let result = sqlx::query("UPDATE users SET banned = 0, banned_until = NULL WHERE id = ?")
        .bind(id)
        .execute(db_pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(ChatError::NotFound(Entity::User));
    }

    find_user(db_pool, id)
        .await?
        .ok_or(ChatError::NotFound(Entity::User))
}

pub async fn update_permissions(
    db_pool: &SqlitePool,
    id: Uuid,
    permissions: Permissions,
) -> ChatResult<User> {
    let mut user = find_user(db_pool, id)
        .await?
        .ok_or(ChatError::NotFound(Entity::User))?;

    let mut conn = db_pool.acquire().await?;
    write_permissions(&mut conn, id, &permissions).await?;

    user.permissions = permissions;
    Ok(user)
}

pub async fn find_user(db_pool: &SqlitePool, id: Uuid) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as(&format!("{USER_SELECT} WHERE u.id = ?"))
        .bind(id)
        .fetch_optional(db_pool)
        .await
}

pub async fn find_by_username(
    db_pool: &SqlitePool,
    username: &str,
) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as(&format!("{USER_SELECT} WHERE u.username = ?"))
        .bind(username)
        .fetch_optional(db_pool)
        .await
}

pub async fn list_users(db_pool: &SqlitePool) -> Result<Vec<User>, sqlx::Error> {
    sqlx::query_as(&format!("{USER_SELECT} ORDER BY u.username"))
        .fetch_all(db_pool)
        .await
}

pub async fn touch_last_login(db_pool: &SqlitePool, id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE users SET last_login = ? WHERE id = ?")
        .bind(db::unix(db::now()))
        .bind(id)
        .execute(db_pool)
        .await?;
    Ok(())
}

/// Seeds an admin account when there are no users at all. Returns the new
/// account, or `None` if the table was already populated.
pub async fn ensure_admin(
    db_pool: &SqlitePool,
    username: &str,
    password: &str,
    min_password_len: usize,
) -> ChatResult<Option<User>> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
        .fetch_one(db_pool)
        .await?;
    if count > 0 {
        return Ok(None);
    }

    let admin = NewUser {
        username: username.to_owned(),
        password: password.to_owned(),
        role: Role::Admin,
        permissions: Permissions::all(),
    };
    create_user(db_pool, &admin, min_password_len).await.map(Some)
}
