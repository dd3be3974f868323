//! Rooms and private-room allow-lists.

use std::collections::{BTreeSet, HashMap};

use serde::Deserialize;
use sqlx::{SqliteConnection, SqlitePool};
use time::Duration;
use uuid::Uuid;

use crate::{
    audit::{self, AuditAction},
    auth,
    db::{self, ActiveMember, Member, ROOM_COLUMNS, Room, RoomStats, User},
    error::{ChatError, ChatResult, Entity},
    policy::{Action, Caller, Resource, can_access},
};

use super::msg;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRoom {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub is_private: bool,
}

/// Full replacement of a room's editable fields.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomUpdate {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub is_private: bool,
}

fn validate_name(name: &str) -> ChatResult<&str> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ChatError::Invalid("room name is required".to_owned()));
    }
    Ok(name)
}

/// Whether `name` belongs to a room other than `except`.
async fn name_taken(
    db_pool: &SqlitePool,
    name: &str,
    except: Option<Uuid>,
) -> Result<bool, sqlx::Error> {
    let owner: Option<Uuid> = sqlx::query_scalar("SELECT id FROM rooms WHERE name = ?")
        .bind(name)
        .fetch_optional(db_pool)
        .await?;
    Ok(owner.is_some_and(|id| Some(id) != except))
}

/// Room row plus its allow-list, without any access check.
pub async fn load(db_pool: &SqlitePool, room_id: Uuid) -> Result<Option<Room>, sqlx::Error> {
    let Some(mut room): Option<Room> =
        sqlx::query_as(&format!("SELECT {ROOM_COLUMNS} FROM rooms WHERE id = ?"))
            .bind(room_id)
            .fetch_optional(db_pool)
            .await?
    else {
        return Ok(None);
    };

    room.allowed_users = sqlx::query_scalar::<_, Uuid>("SELECT user_id FROM room_users WHERE room_id = ?")
        .bind(room_id)
        .fetch_all(db_pool)
        .await?
        .into_iter()
        .collect();
    Ok(Some(room))
}

pub async fn create(db_pool: &SqlitePool, caller: &Caller, new_room: &NewRoom) -> ChatResult<Room> {
    caller.require(Resource::Rooms, Action::Create)?;
    let name = validate_name(&new_room.name)?;

    if name_taken(db_pool, name, None).await? {
        return Err(ChatError::Duplicate(Entity::Room));
    }

    let mut room = Room {
        id: Uuid::now_v7(),
        name: name.to_owned(),
        description: new_room.description.trim().to_owned(),
        created_by: caller.user.id,
        created_at: db::now(),
        is_private: new_room.is_private,
        allowed_users: BTreeSet::new(),
    };

    let mut tx = db_pool.begin().await?;
    sqlx::query(
        "INSERT INTO rooms (id, name, description, created_by, created_at, is_private) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(room.id)
    .bind(&room.name)
    .bind(&room.description)
    .bind(room.created_by)
    .bind(db::unix(room.created_at))
    .bind(room.is_private)
    .execute(&mut *tx)
    .await
    .map_err(|e| ChatError::from_write(e, Entity::Room))?;

    if room.is_private {
        insert_member(&mut tx, room.id, caller.user.id).await?;
        room.allowed_users.insert(caller.user.id);
    }
    tx.commit().await?;

    audit::record(
        db_pool,
        Some(caller.user.id),
        AuditAction::CreateRoom,
        format!("created room {}", room.name),
        &caller.ip,
    )
    .await;
    tracing::info!(room_id = %room.id, name = %room.name, private = room.is_private, "room created");
    Ok(room)
}

/// Name clashes are reported before anything is written. Making a private
/// room public drops its allow-list in the same transaction.
pub async fn update(
    db_pool: &SqlitePool,
    caller: &Caller,
    room_id: Uuid,
    changes: &RoomUpdate,
) -> ChatResult<Room> {
    let mut room = load(db_pool, room_id)
        .await?
        .ok_or(ChatError::NotFound(Entity::Room))?;
    caller.require(Resource::Room(&room), Action::Update)?;

    let name = validate_name(&changes.name)?;
    if name_taken(db_pool, name, Some(room_id)).await? {
        return Err(ChatError::Duplicate(Entity::Room));
    }

    let clear_members = room.is_private && !changes.is_private;

    let mut tx = db_pool.begin().await?;
    sqlx::query("UPDATE rooms SET name = ?, description = ?, is_private = ? WHERE id = ?")
        .bind(name)
        .bind(changes.description.trim())
        .bind(changes.is_private)
        .bind(room_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| ChatError::from_write(e, Entity::Room))?;

    if clear_members {
        sqlx::query("DELETE FROM room_users WHERE room_id = ?")
            .bind(room_id)
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;

    room.name = name.to_owned();
    room.description = changes.description.trim().to_owned();
    room.is_private = changes.is_private;
    if clear_members {
        room.allowed_users.clear();
    }

    audit::record(
        db_pool,
        Some(caller.user.id),
        AuditAction::UpdateRoom,
        format!("updated room {}", room.name),
        &caller.ip,
    )
    .await;
    Ok(room)
}

async fn remove_room(conn: &mut SqliteConnection, room_id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM messages WHERE room_id = ?")
        .bind(room_id)
        .execute(&mut *conn)
        .await?;
    sqlx::query("DELETE FROM room_users WHERE room_id = ?")
        .bind(room_id)
        .execute(&mut *conn)
        .await?;
    sqlx::query("DELETE FROM rooms WHERE id = ?")
        .bind(room_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Messages, allow-list and room go together or not at all.
pub async fn delete(db_pool: &SqlitePool, caller: &Caller, room_id: Uuid) -> ChatResult<()> {
    let room = load(db_pool, room_id)
        .await?
        .ok_or(ChatError::NotFound(Entity::Room))?;
    caller.require(Resource::Room(&room), Action::Delete)?;

    let mut tx = db_pool.begin().await?;
    if let Err(err) = remove_room(&mut tx, room_id).await {
        if let Err(rollback_err) = tx.rollback().await {
            tracing::error!(error = %rollback_err, %room_id, "rollback of room delete failed");
        }
        tracing::error!(error = %err, %room_id, "room delete failed");
        return Err(err.into());
    }
    tx.commit().await?;

    audit::record(
        db_pool,
        Some(caller.user.id),
        AuditAction::DeleteRoom,
        format!("deleted room {}", room.name),
        &caller.ip,
    )
    .await;
    tracing::info!(%room_id, name = %room.name, "room deleted");
    Ok(())
}

async fn insert_member(
    conn: &mut SqliteConnection,
    room_id: Uuid,
    user_id: Uuid,
) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT OR IGNORE INTO room_users (room_id, user_id) VALUES (?, ?)")
        .bind(room_id)
        .bind(user_id)
        .execute(conn)
        .await?;
    Ok(())
}

/// Loads a private room the caller may manage, and the user being added or
/// removed.
async fn membership_target(
    db_pool: &SqlitePool,
    caller: &Caller,
    room_id: Uuid,
    user_id: Uuid,
) -> ChatResult<(Room, User)> {
    let room = load(db_pool, room_id)
        .await?
        .ok_or(ChatError::NotFound(Entity::Room))?;
    caller.require(Resource::Room(&room), Action::ManageMembers)?;

    if !room.is_private {
        return Err(ChatError::Invalid("public rooms have no member list".to_owned()));
    }

    let user = auth::find_user(db_pool, user_id)
        .await?
        .ok_or(ChatError::NotFound(Entity::User))?;
    Ok((room, user))
}

/// Adding someone already on the list succeeds without change.
pub async fn add_member(
    db_pool: &SqlitePool,
    caller: &Caller,
    room_id: Uuid,
    user_id: Uuid,
) -> ChatResult<Room> {
    let (mut room, user) = membership_target(db_pool, caller, room_id, user_id).await?;

    let mut conn = db_pool.acquire().await?;
    insert_member(&mut conn, room_id, user_id).await?;
    drop(conn);
    room.allowed_users.insert(user_id);

    audit::record(
        db_pool,
        Some(caller.user.id),
        AuditAction::AddRoomMember,
        format!("added {} to room {}", user.username, room.name),
        &caller.ip,
    )
    .await;
    Ok(room)
}

pub async fn remove_member(
    db_pool: &SqlitePool,
    caller: &Caller,
    room_id: Uuid,
    user_id: Uuid,
) -> ChatResult<Room> {
    let (mut room, user) = membership_target(db_pool, caller, room_id, user_id).await?;

    sqlx::query("DELETE FROM room_users WHERE room_id = ? AND user_id = ?")
        .bind(room_id)
        .bind(user_id)
        .execute(db_pool)
        .await?;
    room.allowed_users.remove(&user_id);

    audit::record(
        db_pool,
        Some(caller.user.id),
        AuditAction::RemoveRoomMember,
        format!("removed {} from room {}", user.username, room.name),
        &caller.ip,
    )
    .await;
    Ok(room)
}

/// Every room for an admin. Otherwise public rooms plus the private rooms
/// the actor is on the list of. Ordered by name.
pub async fn list(db_pool: &SqlitePool, actor: Option<&User>) -> Result<Vec<Room>, sqlx::Error> {
    let mut rooms: Vec<Room> =
        sqlx::query_as(&format!("SELECT {ROOM_COLUMNS} FROM rooms ORDER BY name"))
            .fetch_all(db_pool)
            .await?;

    let memberships: Vec<(Uuid, Uuid)> = sqlx::query_as("SELECT room_id, user_id FROM room_users")
        .fetch_all(db_pool)
        .await?;
    let mut by_room: HashMap<Uuid, BTreeSet<Uuid>> = HashMap::new();
    for (room_id, user_id) in memberships {
        by_room.entry(room_id).or_default().insert(user_id);
    }

    for room in &mut rooms {
        room.allowed_users = by_room.remove(&room.id).unwrap_or_default();
    }
    rooms.retain(|room| can_access(actor, Resource::Room(room), Action::Read));
    Ok(rooms)
}

/// A room the actor may read. Missing and hidden rooms are both `NotFound`.
pub async fn get(db_pool: &SqlitePool, actor: Option<&User>, room_id: Uuid) -> ChatResult<Room> {
    match load(db_pool, room_id).await? {
        Some(room) if can_access(actor, Resource::Room(&room), Action::Read) => Ok(room),
        _ => Err(ChatError::NotFound(Entity::Room)),
    }
}

/// The allow-list of a room, ordered by username. Empty for public rooms.
pub async fn members(db_pool: &SqlitePool, actor: &User, room_id: Uuid) -> ChatResult<Vec<Member>> {
    get(db_pool, Some(actor), room_id).await?;

    let members: Vec<Member> = sqlx::query_as(
        "SELECT u.id, u.username, u.role, u.last_login FROM room_users ru \
         JOIN users u ON u.id = ru.user_id WHERE ru.room_id = ? ORDER BY u.username",
    )
    .bind(room_id)
    .fetch_all(db_pool)
    .await?;
    Ok(members)
}

/// Who has posted in a readable room within `window`, newest activity first.
pub async fn active_members(
    db_pool: &SqlitePool,
    actor: &User,
    room_id: Uuid,
    window: Duration,
) -> ChatResult<Vec<ActiveMember>> {
    get(db_pool, Some(actor), room_id).await?;
    Ok(msg::active_members(db_pool, room_id, window).await?)
}

pub async fn stats(
    db_pool: &SqlitePool,
    room_id: Uuid,
    active_window: Duration,
) -> Result<RoomStats, sqlx::Error> {
    Ok(RoomStats {
        message_count: msg::count(db_pool, room_id).await?,
        active_users: msg::active_users(db_pool, room_id, active_window).await?,
    })
}
