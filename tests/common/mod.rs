#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Method, Request, header},
    response::Response,
};
use http_body_util::BodyExt;
use serde_json::Value;
use sqlx::SqlitePool;
use tower::ServiceExt;

use securechat::{
    AppState, Config, app,
    auth::{self, NewUser},
    db::{self, Permissions, Role, User},
    policy::Caller,
    rooms::{NewRoom, directory},
};

pub const PASSWORD: &str = "secret123";

/// Fresh in-memory database with the schema applied.
pub async fn test_pool() -> SqlitePool {
    let pool = db::connect_in_memory()
        .await
        .expect("in-memory database should open");
    db::migrate(&pool).await.expect("migrations should apply");
    pool
}

pub async fn create_user(
    pool: &SqlitePool,
    username: &str,
    role: Role,
    permissions: Permissions,
) -> User {
    let new_user = NewUser {
        username: username.to_owned(),
        password: PASSWORD.to_owned(),
        role,
        permissions,
    };
    auth::create_user(pool, &new_user, 6)
        .await
        .expect("user creation should succeed")
}

pub async fn admin(pool: &SqlitePool, username: &str) -> User {
    create_user(pool, username, Role::Admin, Permissions::default()).await
}

pub async fn client(pool: &SqlitePool, username: &str) -> User {
    create_user(pool, username, Role::Client, Permissions::default()).await
}

pub fn caller(user: &User) -> Caller {
    Caller::new(user.clone(), "127.0.0.1")
}

pub async fn room(pool: &SqlitePool, owner: &User, name: &str, is_private: bool) -> securechat::db::Room {
    let new_room = NewRoom {
        name: name.to_owned(),
        description: String::new(),
        is_private,
    };
    directory::create(pool, &caller(owner), &new_room)
        .await
        .expect("room creation should succeed")
}

pub fn test_config() -> Config {
    Config::default()
}

pub fn build_test_app(pool: SqlitePool) -> Router {
    app(AppState {
        db_pool: pool,
        config: Arc::new(test_config()),
    })
}

/// Sends one request through the router. `cookie` is a `name=value` pair as
/// returned by [`session_cookie`].
pub async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    cookie: Option<&str>,
    body: Option<Value>,
) -> Response {
    let mut request = Request::builder()
        .method(method)
        .uri(uri)
        .header("x-forwarded-for", "10.0.0.1");
    if let Some(cookie) = cookie {
        request = request.header(header::COOKIE, cookie);
    }

    let request = match body {
        Some(body) => request
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string())),
        None => request.body(Body::empty()),
    }
    .expect("request should build");

    app.clone()
        .oneshot(request)
        .await
        .expect("router is infallible")
}

pub async fn body_json(response: Response) -> Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body should be readable")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("body should be JSON")
}

/// The session cookie set by a response, as a `name=value` pair.
pub fn session_cookie(response: &Response) -> Option<String> {
    let name = test_config().session_cookie;
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| v.split(';').next())
        .find(|pair| pair.starts_with(&format!("{name}=")))
        .map(str::to_owned)
}

/// Logs in over HTTP and returns the session cookie.
pub async fn login(app: &Router, username: &str, password: &str) -> String {
    let response = send(
        app,
        Method::POST,
        "/login",
        None,
        Some(serde_json::json!({ "username": username, "password": password })),
    )
    .await;
    assert_eq!(response.status(), 200, "login as {username} should succeed");
    session_cookie(&response).expect("login should set the session cookie")
}
