use std::{collections::HashMap, str::FromStr};

use anyhow::{Context, anyhow};
use time::Duration;

/// Settings read once at startup.
///
/// | Env Var              | Default               |
/// |----------------------|-----------------------|
/// | `DATABASE_URL`       | `sqlite://chat.db`    |
/// | `BIND_ADDR`          | `0.0.0.0:8080`        |
/// | `SITE_NAME`          | `Secure Chat`         |
/// | `TIMEZONE`           | `UTC`                 |
/// | `SESSION_COOKIE`     | `secure_chat_session` |
/// | `SESSION_IDLE_SECS`  | `3600`                |
/// | `LOGIN_MAX_ATTEMPTS` | `5`                   |
/// | `LOGIN_WINDOW_MINS`  | `15`                  |
/// | `MIN_PASSWORD_LEN`   | `6`                   |
/// | `ACTIVE_WINDOW_MINS` | `5`                   |
/// | `CORS_ORIGINS`       | (none)                |
/// | `ADMIN_USERNAME`     | (none)                |
/// | `ADMIN_PASSWORD`     | (none)                |
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: String,
    pub site_name: String,
    pub timezone: String,
    pub session_cookie: String,
    pub session_idle: Duration,
    pub login_max_attempts: u32,
    pub login_window: Duration,
    pub min_password_len: usize,
    /// How far back a sender counts as active in a room.
    pub active_window: Duration,
    pub cors_origins: Vec<String>,
    /// Seeded as an admin account when the user table is empty.
    pub bootstrap_admin: Option<(String, String)>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "sqlite://chat.db".to_owned(),
            bind_addr: "0.0.0.0:8080".to_owned(),
            site_name: "Secure Chat".to_owned(),
            timezone: "UTC".to_owned(),
            session_cookie: "secure_chat_session".to_owned(),
            session_idle: Duration::seconds(3600),
            login_max_attempts: 5,
            login_window: Duration::minutes(15),
            min_password_len: 6,
            active_window: Duration::minutes(5),
            cors_origins: Vec::new(),
            bootstrap_admin: None,
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_vars(std::env::vars().collect())
    }

    pub fn from_vars(vars: HashMap<String, String>) -> anyhow::Result<Self> {
        let defaults = Self::default();
        let text = |key: &str, default: String| vars.get(key).cloned().unwrap_or(default);

        let bootstrap_admin = match (vars.get("ADMIN_USERNAME"), vars.get("ADMIN_PASSWORD")) {
            (Some(username), Some(password)) => Some((username.clone(), password.clone())),
            (None, None) => None,
            _ => return Err(anyhow!("ADMIN_USERNAME and ADMIN_PASSWORD must be set together")),
        };

        Ok(Self {
            database_url: text("DATABASE_URL", defaults.database_url),
            bind_addr: text("BIND_ADDR", defaults.bind_addr),
            site_name: text("SITE_NAME", defaults.site_name),
            timezone: text("TIMEZONE", defaults.timezone),
            session_cookie: text("SESSION_COOKIE", defaults.session_cookie),
            session_idle: Duration::seconds(positive(&vars, "SESSION_IDLE_SECS", 3600)?),
            login_max_attempts: parse(&vars, "LOGIN_MAX_ATTEMPTS", defaults.login_max_attempts)?,
            login_window: Duration::minutes(positive(&vars, "LOGIN_WINDOW_MINS", 15)?),
            min_password_len: parse(&vars, "MIN_PASSWORD_LEN", defaults.min_password_len)?,
            active_window: Duration::minutes(positive(&vars, "ACTIVE_WINDOW_MINS", 5)?),
            cors_origins: vars
                .get("CORS_ORIGINS")
                .map(|origins| {
                    origins
                        .split(',')
                        .map(|s| s.trim().to_owned())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            bootstrap_admin,
        })
    }
}

fn parse<T>(vars: &HashMap<String, String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match vars.get(key) {
        Some(value) => value
            .trim()
            .parse()
            .with_context(|| format!("{key} has invalid value {value:?}")),
        None => Ok(default),
    }
}

/// Durations of zero or less would expire everything on arrival.
fn positive(vars: &HashMap<String, String>, key: &str, default: i64) -> anyhow::Result<i64> {
    let value = parse(vars, key, default)?;
    if value <= 0 {
        return Err(anyhow!("{key} must be greater than zero, got {value}"));
    }
    Ok(value)
}
