use axum::{
    Json, debug_handler,
    extract::{Path, Query, State},
};
use serde::Deserialize;
use serde_json::{Value, json};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{
    AppResult, AppState,
    db::{Message, MessageId},
    policy::Caller,
};

use super::msg::{self, ListQuery};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SendMessageBody {
    #[serde(default)]
    content: String,
    #[serde(default)]
    attachment_url: Option<String>,
}

/// Clients poll this with `afterId` set to the last id they have seen.
#[debug_handler(state = AppState)]
pub(crate) async fn messages(
    State(db_pool): State<SqlitePool>,
    caller: Caller,
    Path(room_id): Path<Uuid>,
    Query(query): Query<ListQuery>,
) -> AppResult<Json<Vec<Message>>> {
    Ok(Json(msg::list(&db_pool, &caller.user, room_id, query).await?))
}

#[debug_handler(state = AppState)]
pub(crate) async fn send_message(
    State(db_pool): State<SqlitePool>,
    caller: Caller,
    Path(room_id): Path<Uuid>,
    Json(SendMessageBody { content, attachment_url }): Json<SendMessageBody>,
) -> AppResult<Json<Message>> {
    let message = msg::send(&db_pool, &caller, room_id, &content, attachment_url).await?;
    Ok(Json(message))
}

#[debug_handler(state = AppState)]
pub(crate) async fn delete_message(
    State(db_pool): State<SqlitePool>,
    caller: Caller,
    Path(id): Path<MessageId>,
) -> AppResult<Json<Value>> {
    msg::delete(&db_pool, &caller, id).await?;
    Ok(Json(json!({ "success": true })))
}
