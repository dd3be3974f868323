use serde::Deserialize;
use sqlx::SqlitePool;
use time::Duration;
use uuid::Uuid;

use crate::{
    audit::{self, AuditAction},
    codec,
    db::{self, ActiveMember, MESSAGE_SELECT, Message, MessageId, User},
    error::{ChatError, ChatResult, Entity},
    policy::{Action, Caller, Resource, can_access},
};

use super::directory;

pub const DEFAULT_LIMIT: u32 = 50;
pub const MAX_LIMIT: u32 = 200;

/// Paging for a room's history. `after_id` is the poll cursor: only messages
/// newer than it are returned. A `limit` of zero lifts the cap entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ListQuery {
    pub limit: u32,
    pub offset: u32,
    pub after_id: Option<MessageId>,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            offset: 0,
            after_id: None,
        }
    }
}

impl ListQuery {
    fn sql_limit(&self) -> i64 {
        match self.limit {
            // sqlite reads a negative limit as none
            0 => -1,
            n => i64::from(n.min(MAX_LIMIT)),
        }
    }
}

/// Nothing is stored unless the sender may join the room. Attachments need
/// their own permission.
pub async fn send(
    db_pool: &SqlitePool,
    caller: &Caller,
    room_id: Uuid,
    content: &str,
    attachment: Option<String>,
) -> ChatResult<Message> {
    let room = directory::load(db_pool, room_id)
        .await?
        .ok_or(ChatError::NotFound(Entity::Room))?;
    caller.require(Resource::Room(&room), Action::Join)?;

    let attachment_url = attachment
        .map(|url| url.trim().to_owned())
        .filter(|url| !url.is_empty());
    if attachment_url.is_some() {
        caller.require(Resource::NewMessage, Action::AttachFile)?;
    }
    if content.trim().is_empty() && attachment_url.is_none() {
        return Err(ChatError::Invalid("message is empty".to_owned()));
    }

    let timestamp = db::now();
    let has_attachment = attachment_url.is_some();
    let id = sqlx::query(
        "INSERT INTO messages (room_id, sender_id, content, timestamp, has_attachment, attachment_url) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(room_id)
    .bind(caller.user.id)
    .bind(codec::encode(content))
    .bind(db::unix(timestamp))
    .bind(has_attachment)
    .bind(attachment_url.as_deref())
    .execute(db_pool)
    .await?
    .last_insert_rowid();

    audit::record(
        db_pool,
        Some(caller.user.id),
        AuditAction::SendMessage,
        format!("message {id} in room {}", room.name),
        &caller.ip,
    )
    .await;

    Ok(Message {
        id,
        room_id,
        sender_id: caller.user.id,
        sender_name: Some(caller.user.username.clone()),
        content: content.to_owned(),
        timestamp,
        has_attachment,
        attachment_url,
    })
}

/// Oldest first, ties broken by insertion order. A room the actor cannot
/// read, or one that does not exist, has no messages.
pub async fn list(
    db_pool: &SqlitePool,
    actor: &User,
    room_id: Uuid,
    query: ListQuery,
) -> Result<Vec<Message>, sqlx::Error> {
    let Some(room) = directory::load(db_pool, room_id).await? else {
        return Ok(Vec::new());
    };
    if !can_access(Some(actor), Resource::Room(&room), Action::Read) {
        return Ok(Vec::new());
    }

    let mut messages: Vec<Message> = sqlx::query_as(&format!(
        "{MESSAGE_SELECT} WHERE m.room_id = ? AND m.id > ? \
         ORDER BY m.timestamp, m.id LIMIT ? OFFSET ?"
    ))
    .bind(room_id)
    .bind(query.after_id.unwrap_or(0))
    .bind(query.sql_limit())
    .bind(i64::from(query.offset))
    .fetch_all(db_pool)
    .await?;

    for message in &mut messages {
        message.content = codec::decode(&message.content);
    }
    Ok(messages)
}

pub async fn find(db_pool: &SqlitePool, id: MessageId) -> Result<Option<Message>, sqlx::Error> {
    let message: Option<Message> =
        sqlx::query_as(&format!("{MESSAGE_SELECT} WHERE m.id = ?"))
            .bind(id)
            .fetch_optional(db_pool)
            .await?;

    Ok(message.map(|mut message| {
        message.content = codec::decode(&message.content);
        message
    }))
}

pub async fn delete(db_pool: &SqlitePool, caller: &Caller, id: MessageId) -> ChatResult<()> {
    let message = find(db_pool, id)
        .await?
        .ok_or(ChatError::NotFound(Entity::Message))?;
    caller.require(Resource::Message(&message), Action::Delete)?;

    sqlx::query("DELETE FROM messages WHERE id = ?")
        .bind(id)
        .execute(db_pool)
        .await?;

    audit::record(
        db_pool,
        Some(caller.user.id),
        AuditAction::DeleteMessage,
        format!("deleted message {id} from room {}", message.room_id),
        &caller.ip,
    )
    .await;
    Ok(())
}

pub async fn count(db_pool: &SqlitePool, room_id: Uuid) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM messages WHERE room_id = ?")
        .bind(room_id)
        .fetch_one(db_pool)
        .await
}

/// Distinct senders within `window` of now.
pub async fn active_users(
    db_pool: &SqlitePool,
    room_id: Uuid,
    window: Duration,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT COUNT(DISTINCT sender_id) FROM messages WHERE room_id = ? AND timestamp > ?",
    )
    .bind(room_id)
    .bind(db::unix(db::now() - window))
    .fetch_one(db_pool)
    .await
}

/// Senders within `window` of now with their latest post in the room,
/// most recent first.
pub async fn active_members(
    db_pool: &SqlitePool,
    room_id: Uuid,
    window: Duration,
) -> Result<Vec<ActiveMember>, sqlx::Error> {
    sqlx::query_as(
        "SELECT u.id, u.username, u.role, MAX(m.timestamp) AS last_activity \
         FROM messages m JOIN users u ON u.id = m.sender_id \
         WHERE m.room_id = ? GROUP BY u.id HAVING MAX(m.timestamp) > ? \
         ORDER BY last_activity DESC, u.username",
    )
    .bind(room_id)
    .bind(db::unix(db::now() - window))
    .fetch_all(db_pool)
    .await
}
