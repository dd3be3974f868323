use std::sync::Arc;

use axum::{
    Json, debug_handler,
    extract::{Path, State},
};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{
    AppResult, AppState,
    config::Config,
    db::{ActiveMember, Member, Room},
    policy::Caller,
};

use super::directory;

#[debug_handler(state = AppState)]
pub(crate) async fn members(
    State(db_pool): State<SqlitePool>,
    caller: Caller,
    Path(room_id): Path<Uuid>,
) -> AppResult<Json<Vec<Member>>> {
    Ok(Json(directory::members(&db_pool, &caller.user, room_id).await?))
}

#[debug_handler(state = AppState)]
pub(crate) async fn active(
    State(db_pool): State<SqlitePool>,
    State(config): State<Arc<Config>>,
    caller: Caller,
    Path(room_id): Path<Uuid>,
) -> AppResult<Json<Vec<ActiveMember>>> {
    let active = directory::active_members(&db_pool, &caller.user, room_id, config.active_window).await?;
    Ok(Json(active))
}

#[debug_handler(state = AppState)]
pub(crate) async fn add_member(
    State(db_pool): State<SqlitePool>,
    caller: Caller,
    Path((room_id, user_id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<Room>> {
    Ok(Json(directory::add_member(&db_pool, &caller, room_id, user_id).await?))
}

#[debug_handler(state = AppState)]
pub(crate) async fn remove_member(
    State(db_pool): State<SqlitePool>,
    caller: Caller,
    Path((room_id, user_id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<Room>> {
    Ok(Json(directory::remove_member(&db_pool, &caller, room_id, user_id).await?))
}
