use axum::{Json, debug_handler, extract::State};
use sqlx::SqlitePool;

use crate::{AppResult, AppState, db::Room, extract::MaybeUser, policy::Caller};

use super::directory::{self, NewRoom};

/// Anyone may list rooms; signed-out visitors only see public ones.
#[debug_handler(state = AppState)]
pub(crate) async fn list_rooms(
    State(db_pool): State<SqlitePool>,
    MaybeUser(user): MaybeUser,
) -> AppResult<Json<Vec<Room>>> {
    Ok(Json(directory::list(&db_pool, user.as_ref()).await?))
}

#[debug_handler(state = AppState)]
pub(crate) async fn new_room(
    State(db_pool): State<SqlitePool>,
    caller: Caller,
    Json(new_room): Json<NewRoom>,
) -> AppResult<Json<Room>> {
    let room = directory::create(&db_pool, &caller, &new_room).await?;
    Ok(Json(room))
}
