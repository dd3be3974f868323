use std::sync::Arc;

use axum::{Json, Router, debug_handler, extract::State, routing::get};
use serde::Serialize;
use serde_json::{Value, json};
use sqlx::SqlitePool;

use crate::{
    AppResult, AppState,
    config::Config,
    db::{Room, User},
    extract::MaybeUser,
    policy::Caller,
    rooms::directory,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(index))
        .route("/me", get(me))
}

#[debug_handler(state = AppState)]
async fn index(
    State(config): State<Arc<Config>>,
    MaybeUser(user): MaybeUser,
) -> Json<Value> {
    Json(json!({
        "siteName": config.site_name,
        "timezone": config.timezone,
        "authenticated": user.is_some(),
    }))
}

#[derive(Debug, Serialize)]
struct Me {
    user: User,
    rooms: Vec<Room>,
}

#[debug_handler(state = AppState)]
async fn me(State(db_pool): State<SqlitePool>, caller: Caller) -> AppResult<Json<Me>> {
    let rooms = directory::list(&db_pool, Some(&caller.user)).await?;
    Ok(Json(Me {
        user: caller.user,
        rooms,
    }))
}
