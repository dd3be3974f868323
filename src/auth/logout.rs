use axum::{Json, debug_handler, extract::State};
use serde_json::{Value, json};
use sqlx::SqlitePool;
use tower_sessions::Session;

use crate::{
    AppResult,
    audit::{self, AuditAction},
    extract::ClientIp,
    session,
};

#[debug_handler]
pub(crate) async fn logout(
    State(db_pool): State<SqlitePool>,
    ClientIp(ip): ClientIp,
    session: Session,
) -> AppResult<Json<Value>> {
    if let Some(context) = session::context(&session).await? {
        audit::record(&db_pool, Some(context.user_id), AuditAction::Logout, "logged out", &ip).await;
        tracing::info!(user_id = %context.user_id, "logged out");
    }
    session::end(&session).await?;

    Ok(Json(json!({ "success": true })))
}
