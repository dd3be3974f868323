use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::{self, AuditEntry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    Login,
    Logout,
    ChangePassword,
    CreateUser,
    SetPassword,
    UpdatePermissions,
    BanUser,
    UnbanUser,
    CreateRoom,
    UpdateRoom,
    DeleteRoom,
    AddRoomMember,
    RemoveRoomMember,
    SendMessage,
    DeleteMessage,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        use AuditAction::*;
        match self {
            Login => "login",
            Logout => "logout",
            ChangePassword => "change_password",
            CreateUser => "create_user",
            SetPassword => "set_password",
            UpdatePermissions => "update_permissions",
            BanUser => "ban_user",
            UnbanUser => "unban_user",
            CreateRoom => "create_room",
            UpdateRoom => "update_room",
            DeleteRoom => "delete_room",
            AddRoomMember => "add_room_member",
            RemoveRoomMember => "remove_room_member",
            SendMessage => "send_message",
            DeleteMessage => "delete_message",
        }
    }
}

/// Append to the audit log. Never fails the operation being described: a
/// write error is logged and dropped.
pub async fn record(
    db_pool: &SqlitePool,
    user_id: Option<Uuid>,
    action: AuditAction,
    details: impl AsRef<str>,
    ip_address: &str,
) {
    let result = sqlx::query(
        "INSERT INTO audit_log (user_id, action, details, timestamp, ip_address) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(user_id)
    .bind(action.as_str())
    .bind(details.as_ref())
    .bind(db::unix(db::now()))
    .bind(ip_address)
    .execute(db_pool)
    .await;

    if let Err(err) = result {
        tracing::warn!(
            error = %err,
            action = action.as_str(),
            user_id = ?user_id,
            "failed to write audit entry"
        );
    }
}

/// Most recent entries first.
pub async fn recent(db_pool: &SqlitePool, limit: i64) -> Result<Vec<AuditEntry>, sqlx::Error> {
    sqlx::query_as(
        "SELECT user_id, action, details, timestamp, ip_address FROM audit_log ORDER BY id DESC LIMIT ?",
    )
    .bind(limit)
    .fetch_all(db_pool)
    .await
}
