//! Failed-login throttling by client address.
//!
//! The check is a plain count over a time window. Concurrent attempts from
//! one address can slip past it while in flight; it is a brake, not a lock.

use sqlx::SqlitePool;
use time::Duration;

use crate::db::{self, LoginAttempt};

pub async fn record_attempt(
    db_pool: &SqlitePool,
    username: &str,
    ip_address: &str,
    success: bool,
) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT INTO login_attempts (username, ip_address, timestamp, success) VALUES (?, ?, ?, ?)")
        .bind(username)
        .bind(ip_address)
        .bind(db::unix(db::now()))
        .bind(success)
        .execute(db_pool)
        .await?;
    Ok(())
}

pub async fn failed_attempts(
    db_pool: &SqlitePool,
    ip_address: &str,
    window: Duration,
) -> Result<i64, sqlx::Error> {
    let since = db::unix(db::now() - window);
    sqlx::query_scalar("SELECT COUNT(*) FROM login_attempts WHERE ip_address = ? AND success = 0 AND timestamp > ?")
        .bind(ip_address)
        .bind(since)
        .fetch_one(db_pool)
        .await
}

pub async fn is_throttled(
    db_pool: &SqlitePool,
    ip_address: &str,
    max_attempts: u32,
    window: Duration,
) -> Result<bool, sqlx::Error> {
    Ok(failed_attempts(db_pool, ip_address, window).await? >= i64::from(max_attempts))
}

pub async fn attempts_for(db_pool: &SqlitePool, username: &str) -> Result<Vec<LoginAttempt>, sqlx::Error> {
    sqlx::query_as("SELECT username, ip_address, timestamp, success FROM login_attempts WHERE username = ? ORDER BY id")
        .bind(username)
        .fetch_all(db_pool)
        .await
}
