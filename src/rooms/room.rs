use std::sync::Arc;

use axum::{
    Json, debug_handler,
    extract::{Path, State},
};
use serde::Serialize;
use serde_json::{Value, json};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{
    AppResult, AppState,
    config::Config,
    db::{Room, RoomStats},
    extract::MaybeUser,
    policy::Caller,
};

use super::directory::{self, RoomUpdate};

#[derive(Debug, Serialize)]
pub(crate) struct RoomView {
    #[serde(flatten)]
    room: Room,
    stats: RoomStats,
}

#[debug_handler(state = AppState)]
pub(crate) async fn room(
    State(db_pool): State<SqlitePool>,
    State(config): State<Arc<Config>>,
    MaybeUser(user): MaybeUser,
    Path(room_id): Path<Uuid>,
) -> AppResult<Json<RoomView>> {
    let room = directory::get(&db_pool, user.as_ref(), room_id).await?;
    let stats = directory::stats(&db_pool, room_id, config.active_window).await?;

    Ok(Json(RoomView { room, stats }))
}

#[debug_handler(state = AppState)]
pub(crate) async fn update_room(
    State(db_pool): State<SqlitePool>,
    caller: Caller,
    Path(room_id): Path<Uuid>,
    Json(changes): Json<RoomUpdate>,
) -> AppResult<Json<Room>> {
    Ok(Json(directory::update(&db_pool, &caller, room_id, &changes).await?))
}

#[debug_handler(state = AppState)]
pub(crate) async fn delete_room(
    State(db_pool): State<SqlitePool>,
    caller: Caller,
    Path(room_id): Path<Uuid>,
) -> AppResult<Json<Value>> {
    directory::delete(&db_pool, &caller, room_id).await?;
    Ok(Json(json!({ "success": true })))
}
