pub mod directory;
pub mod msg;

mod feed;
mod members;
mod new;
mod room;

use axum::{
    Router,
    routing::{delete, get, put},
};

use crate::AppState;

pub use directory::{NewRoom, RoomUpdate};
pub use msg::ListQuery;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(new::list_rooms).post(new::new_room))
        .route("/{uuid}", get(room::room).put(room::update_room).delete(room::delete_room))
        .route("/{uuid}/members", get(members::members))
        .route("/{uuid}/active", get(members::active))
        .route(
            "/{uuid}/members/{user_id}",
            put(members::add_member).delete(members::remove_member),
        )
        .route("/{uuid}/messages", get(feed::messages).post(feed::send_message))
}

/// Routes addressed by message id rather than by room.
pub fn message_router() -> Router<AppState> {
    Router::new().route("/{id}", delete(feed::delete_message))
}
