use std::{convert::Infallible, net::SocketAddr};

use anyhow::anyhow;
use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::request::Parts,
};
use tower_sessions::Session;

use crate::{AppError, AppState, db::User, policy::Caller, session};

/// Peer address of the request. Falls back to the first `X-Forwarded-For`
/// entry when the server was started without connect info.
#[derive(Debug, Clone)]
pub struct ClientIp(pub String);

impl<S: Send + Sync> FromRequestParts<S> for ClientIp {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(ConnectInfo(addr)) = parts.extensions.get::<ConnectInfo<SocketAddr>>() {
            return Ok(ClientIp(addr.ip().to_string()));
        }

        let forwarded = parts
            .headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());

        Ok(ClientIp(forwarded.unwrap_or("unknown").to_owned()))
    }
}

/// The signed-in user, if any.
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<User>);

impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let session = Session::from_request_parts(parts, state)
            .await
            .map_err(|(_, msg)| AppError::Internal(anyhow!(msg)))?;

        let user = session::current_user(&session, &state.db_pool, state.config.session_idle).await?;
        Ok(MaybeUser(user))
    }
}

/// Rejects with 401 when nobody is signed in.
impl FromRequestParts<AppState> for Caller {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let MaybeUser(user) = MaybeUser::from_request_parts(parts, state).await?;
        let user = user.ok_or(AppError::Unauthenticated)?;
        let Ok(ClientIp(ip)) = ClientIp::from_request_parts(parts, state).await;

        Ok(Caller::new(user, ip))
    }
}
