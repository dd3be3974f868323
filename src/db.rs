use std::{collections::BTreeSet, fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use sqlx::{
    FromRow, Row, SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
};
use time::OffsetDateTime;
use uuid::Uuid;

pub type MessageId = i64;

pub async fn connect(url: &str) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(url)?
        .create_if_missing(true)
        .foreign_keys(true);

    SqlitePoolOptions::new()
        .max_connections(16)
        .connect_with(options)
        .await
}

/// A private in-memory database. One connection only, so every query sees
/// the same database.
pub async fn connect_in_memory() -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

    SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await
}

pub async fn migrate(db_pool: &SqlitePool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!().run(db_pool).await
}

/// Current time truncated to the one-second resolution timestamps are stored at.
pub fn now() -> OffsetDateTime {
    let now = OffsetDateTime::now_utc();
    now - time::Duration::nanoseconds(now.nanosecond().into())
}

pub(crate) fn unix(ts: OffsetDateTime) -> i64 {
    ts.unix_timestamp()
}

pub(crate) fn from_unix(secs: i64) -> Result<OffsetDateTime, sqlx::Error> {
    OffsetDateTime::from_unix_timestamp(secs).map_err(|e| sqlx::Error::Decode(Box::new(e)))
}

fn from_unix_opt(secs: Option<i64>) -> Result<Option<OffsetDateTime>, sqlx::Error> {
    secs.map(from_unix).transpose()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    #[default]
    Client,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Client => "client",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "client" => Ok(Role::Client),
            other => Err(format!("unknown role {other:?}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Permissions {
    pub can_create_room: bool,
    pub can_upload_files: bool,
    pub can_delete_messages: bool,
    pub can_ban_users: bool,
}

impl Permissions {
    pub fn all() -> Self {
        Self {
            can_create_room: true,
            can_upload_files: true,
            can_delete_messages: true,
            can_ban_users: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    pub permissions: Permissions,
    pub active: bool,
    pub banned: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub banned_until: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_login: Option<OffsetDateTime>,

    // unique: id
    // unique: username
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Whether a ban is in force at `now`. Bans with a lapsed `banned_until`
    /// are treated as lifted without anything having to clear them.
    pub fn is_banned_at(&self, now: OffsetDateTime) -> bool {
        match (self.banned, self.banned_until) {
            (false, _) => false,
            (true, None) => true,
            (true, Some(until)) => until > now,
        }
    }
}

pub(crate) const USER_SELECT: &str = "SELECT u.id, u.username, u.password_hash, u.role, \
    u.active, u.banned, u.banned_until, u.created_at, u.last_login, \
    COALESCE(p.can_create_room, 0) AS can_create_room, \
    COALESCE(p.can_upload_files, 0) AS can_upload_files, \
    COALESCE(p.can_delete_messages, 0) AS can_delete_messages, \
    COALESCE(p.can_ban_users, 0) AS can_ban_users \
    FROM users u LEFT JOIN permissions p ON p.user_id = u.id";

impl<'r> FromRow<'r, SqliteRow> for User {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let role: String = row.try_get("role")?;
        Ok(User {
            id: row.try_get("id")?,
            username: row.try_get("username")?,
            password_hash: row.try_get("password_hash")?,
            role: role.parse().map_err(|e: String| sqlx::Error::Decode(e.into()))?,
            permissions: Permissions {
                can_create_room: row.try_get("can_create_room")?,
                can_upload_files: row.try_get("can_upload_files")?,
                can_delete_messages: row.try_get("can_delete_messages")?,
                can_ban_users: row.try_get("can_ban_users")?,
            },
            active: row.try_get("active")?,
            banned: row.try_get("banned")?,
            banned_until: from_unix_opt(row.try_get("banned_until")?)?,
            created_at: from_unix(row.try_get("created_at")?)?,
            last_login: from_unix_opt(row.try_get("last_login")?)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub created_by: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub is_private: bool,
    /// Only meaningful while `is_private` is set.
    pub allowed_users: BTreeSet<Uuid>,

    // unique: id
    // unique: name
}

impl Room {
    pub fn is_member(&self, user_id: Uuid) -> bool {
        self.allowed_users.contains(&user_id)
    }
}

pub(crate) const ROOM_COLUMNS: &str = "id, name, description, created_by, created_at, is_private";

impl<'r> FromRow<'r, SqliteRow> for Room {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Room {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            created_by: row.try_get("created_by")?,
            created_at: from_unix(row.try_get("created_at")?)?,
            is_private: row.try_get("is_private")?,
            allowed_users: BTreeSet::new(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub room_id: Uuid,
    pub sender_id: Uuid,
    /// `None` once the sender's account is gone.
    pub sender_name: Option<String>,
    pub content: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub has_attachment: bool,
    pub attachment_url: Option<String>,

    // unique: id (monotonic)
}

pub(crate) const MESSAGE_SELECT: &str = "SELECT m.id, m.room_id, m.sender_id, \
    u.username AS sender_name, m.content, m.timestamp, m.has_attachment, m.attachment_url \
    FROM messages m LEFT JOIN users u ON u.id = m.sender_id";

impl<'r> FromRow<'r, SqliteRow> for Message {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Message {
            id: row.try_get("id")?,
            room_id: row.try_get("room_id")?,
            sender_id: row.try_get("sender_id")?,
            sender_name: row.try_get("sender_name")?,
            content: row.try_get("content")?,
            timestamp: from_unix(row.try_get("timestamp")?)?,
            has_attachment: row.try_get("has_attachment")?,
            attachment_url: row.try_get("attachment_url")?,
        })
    }
}

/// Entry on a private room's allow-list.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub id: Uuid,
    pub username: String,
    pub role: Role,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_login: Option<OffsetDateTime>,
}

impl<'r> FromRow<'r, SqliteRow> for Member {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let role: String = row.try_get("role")?;
        Ok(Member {
            id: row.try_get("id")?,
            username: row.try_get("username")?,
            role: role.parse().map_err(|e: String| sqlx::Error::Decode(e.into()))?,
            last_login: from_unix_opt(row.try_get("last_login")?)?,
        })
    }
}

/// Someone who posted in a room recently, newest activity first.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveMember {
    pub id: Uuid,
    pub username: String,
    pub role: Role,
    #[serde(with = "time::serde::rfc3339")]
    pub last_activity: OffsetDateTime,
}

impl<'r> FromRow<'r, SqliteRow> for ActiveMember {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let role: String = row.try_get("role")?;
        Ok(ActiveMember {
            id: row.try_get("id")?,
            username: row.try_get("username")?,
            role: role.parse().map_err(|e: String| sqlx::Error::Decode(e.into()))?,
            last_activity: from_unix(row.try_get("last_activity")?)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomStats {
    pub message_count: i64,
    pub active_users: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginAttempt {
    pub username: String,
    pub ip_address: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub success: bool,
}

impl<'r> FromRow<'r, SqliteRow> for LoginAttempt {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(LoginAttempt {
            username: row.try_get("username")?,
            ip_address: row.try_get("ip_address")?,
            timestamp: from_unix(row.try_get("timestamp")?)?,
            success: row.try_get("success")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub user_id: Option<Uuid>,
    pub action: String,
    pub details: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub ip_address: String,
}

impl<'r> FromRow<'r, SqliteRow> for AuditEntry {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(AuditEntry {
            user_id: row.try_get("user_id")?,
            action: row.try_get("action")?,
            details: row.try_get("details")?,
            timestamp: from_unix(row.try_get("timestamp")?)?,
            ip_address: row.try_get("ip_address")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use time::Duration;

    use super::*;

    fn user(banned: bool, banned_until: Option<OffsetDateTime>) -> User {
        User {
            id: Uuid::now_v7(),
            username: "u".to_owned(),
            password_hash: String::new(),
            role: Role::Client,
            permissions: Permissions::default(),
            active: true,
            banned,
            banned_until,
            created_at: now(),
            last_login: None,
        }
    }

    #[test]
    fn ban_expires_lazily() {
        let now = now();
        assert!(!user(false, None).is_banned_at(now));
        assert!(user(true, None).is_banned_at(now));
        assert!(user(true, Some(now + Duration::hours(1))).is_banned_at(now));
        assert!(!user(true, Some(now - Duration::seconds(1))).is_banned_at(now));
    }

    #[test]
    fn role_round_trips_through_text() {
        assert_eq!("admin".parse::<Role>(), Ok(Role::Admin));
        assert_eq!(Role::Client.as_str(), "client");
        assert!("root".parse::<Role>().is_err());
    }

    #[test]
    fn password_hash_is_never_serialized() {
        let mut u = user(false, None);
        u.password_hash = "$argon2id$secret".to_owned();
        let json = serde_json::to_string(&u).unwrap();
        assert!(!json.contains("argon2id"));
        assert!(json.contains("\"canCreateRoom\":false"));
    }
}
