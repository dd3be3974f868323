//! The authenticated actor behind a browser session.
//!
//! The cookie layer also expires idle sessions, but the clock kept here is
//! the one that decides: it is checked and slid forward on every successful
//! lookup of the current user.

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use time::{Duration, OffsetDateTime};
use tower_sessions::Session;
use uuid::Uuid;

use crate::{AppResult, auth, db::{self, User}};

pub const CONTEXT: &str = "context";

pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::seconds(3600);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionContext {
    pub user_id: Uuid,
    #[serde(with = "time::serde::timestamp")]
    pub last_activity: OffsetDateTime,
}

impl SessionContext {
    pub fn new(user_id: Uuid, now: OffsetDateTime) -> Self {
        Self {
            user_id,
            last_activity: now,
        }
    }

    /// Expired once strictly more than `idle_timeout` has passed.
    pub fn is_expired(&self, now: OffsetDateTime, idle_timeout: Duration) -> bool {
        now - self.last_activity > idle_timeout
    }

    pub fn touch(&mut self, now: OffsetDateTime) {
        self.last_activity = now;
    }
}

pub async fn begin(session: &Session, user: &User) -> Result<(), tower_sessions::session::Error> {
    // fresh id on privilege change
    session.cycle_id().await?;
    session
        .insert(CONTEXT, SessionContext::new(user.id, db::now()))
        .await
}

pub async fn end(session: &Session) -> Result<(), tower_sessions::session::Error> {
    session.flush().await
}

pub async fn context(session: &Session) -> Result<Option<SessionContext>, tower_sessions::session::Error> {
    session.get(CONTEXT).await
}

/// Resolves the signed-in user and slides the idle clock.
///
/// The session is dropped when it has been idle too long, or when the account
/// behind it has since been deactivated, banned or removed.
pub async fn current_user(
    session: &Session,
    db_pool: &SqlitePool,
    idle_timeout: Duration,
) -> AppResult<Option<User>> {
    let Some(mut context) = context(session).await? else {
        return Ok(None);
    };

    let now = db::now();
    if context.is_expired(now, idle_timeout) {
        tracing::info!(user_id = %context.user_id, "session expired");
        end(session).await?;
        return Ok(None);
    }

    let Some(user) = auth::find_user(db_pool, context.user_id).await? else {
        end(session).await?;
        return Ok(None);
    };

    if !user.active || user.is_banned_at(now) {
        tracing::info!(user_id = %user.id, "session closed for disabled account");
        end(session).await?;
        return Ok(None);
    }

    context.touch(now);
    session.insert(CONTEXT, context).await?;
    Ok(Some(user))
}
