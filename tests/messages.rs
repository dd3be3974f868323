//! Message log: sending, paging, polling and deletion.

mod common;

use assert_matches::assert_matches;

use common::{admin, caller, client, create_user, room, test_pool};
use securechat::{
    codec,
    db::{Permissions, Role},
    error::{ChatError, Entity},
    rooms::{ListQuery, directory, msg},
};

#[tokio::test]
async fn send_then_list_round_trips_plaintext() {
    let pool = test_pool().await;
    let root = admin(&pool, "root").await;
    let lobby = room(&pool, &root, "lobby", false).await;

    let sent = msg::send(&pool, &caller(&root), lobby.id, "مرحبا, world", None).await.unwrap();
    let listed = msg::list(&pool, &root, lobby.id, ListQuery::default()).await.unwrap();

    assert_eq!(listed, vec![sent]);
    assert_eq!(listed[0].content, "مرحبا, world");
    assert_eq!(listed[0].sender_name.as_deref(), Some("root"));

    let stored: String = sqlx::query_scalar("SELECT content FROM messages")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_ne!(stored, "مرحبا, world");
    assert_eq!(codec::decode(&stored), "مرحبا, world");
}

#[tokio::test]
async fn outsiders_cannot_post_to_private_rooms() {
    let pool = test_pool().await;
    let root = admin(&pool, "root").await;
    let outsider = client(&pool, "outsider").await;
    let secret = room(&pool, &root, "secret", true).await;

    assert_matches!(
        msg::send(&pool, &caller(&outsider), secret.id, "let me in", None).await,
        Err(ChatError::Unauthorized)
    );
    assert_eq!(msg::count(&pool, secret.id).await.unwrap(), 0);
    // and they see nothing when reading
    msg::send(&pool, &caller(&root), secret.id, "members only", None).await.unwrap();
    assert!(msg::list(&pool, &outsider, secret.id, ListQuery::default()).await.unwrap().is_empty());
}

#[tokio::test]
async fn sending_to_missing_room_is_not_found() {
    let pool = test_pool().await;
    let root = admin(&pool, "root").await;
    assert_matches!(
        msg::send(&pool, &caller(&root), uuid::Uuid::now_v7(), "hello?", None).await,
        Err(ChatError::NotFound(Entity::Room))
    );
    assert!(
        msg::list(&pool, &root, uuid::Uuid::now_v7(), ListQuery::default())
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn empty_message_is_invalid() {
    let pool = test_pool().await;
    let root = admin(&pool, "root").await;
    let lobby = room(&pool, &root, "lobby", false).await;
    assert_matches!(
        msg::send(&pool, &caller(&root), lobby.id, "   ", None).await,
        Err(ChatError::Invalid(_))
    );
}

#[tokio::test]
async fn attachments_need_upload_permission() {
    let pool = test_pool().await;
    let root = admin(&pool, "root").await;
    let plain = client(&pool, "plain").await;
    let uploader = create_user(
        &pool,
        "uploader",
        Role::Client,
        Permissions {
            can_upload_files: true,
            ..Default::default()
        },
    )
    .await;
    let lobby = room(&pool, &root, "lobby", false).await;
    let url = Some("https://files.test/cat.png".to_owned());

    assert_matches!(
        msg::send(&pool, &caller(&plain), lobby.id, "look", url.clone()).await,
        Err(ChatError::Unauthorized)
    );
    let sent = msg::send(&pool, &caller(&uploader), lobby.id, "", url).await.unwrap();
    assert!(sent.has_attachment);
    assert_eq!(sent.attachment_url.as_deref(), Some("https://files.test/cat.png"));
}

#[tokio::test]
async fn order_is_by_time_then_insertion() {
    let pool = test_pool().await;
    let root = admin(&pool, "root").await;
    let lobby = room(&pool, &root, "lobby", false).await;

    for text in ["a", "b", "c", "d"] {
        msg::send(&pool, &caller(&root), lobby.id, text, None).await.unwrap();
    }
    // push the first message into the future so time ordering dominates ids
    sqlx::query("UPDATE messages SET timestamp = timestamp + 60 WHERE content = ?")
        .bind(codec::encode("a"))
        .execute(&pool)
        .await
        .unwrap();

    let listed = msg::list(&pool, &root, lobby.id, ListQuery::default()).await.unwrap();
    let contents: Vec<_> = listed.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, ["b", "c", "d", "a"]);
}

#[tokio::test]
async fn paging_and_poll_cursor() {
    let pool = test_pool().await;
    let root = admin(&pool, "root").await;
    let lobby = room(&pool, &root, "lobby", false).await;

    let mut ids = Vec::new();
    for n in 0..5 {
        let sent = msg::send(&pool, &caller(&root), lobby.id, &format!("m{n}"), None).await.unwrap();
        ids.push(sent.id);
    }

    let page = msg::list(
        &pool,
        &root,
        lobby.id,
        ListQuery {
            limit: 2,
            offset: 1,
            after_id: None,
        },
    )
    .await
    .unwrap();
    assert_eq!(page.iter().map(|m| m.id).collect::<Vec<_>>(), &ids[1..3]);

    let newer = msg::list(
        &pool,
        &root,
        lobby.id,
        ListQuery {
            after_id: Some(ids[2]),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(newer.iter().map(|m| m.id).collect::<Vec<_>>(), &ids[3..]);

    let everything = msg::list(
        &pool,
        &root,
        lobby.id,
        ListQuery {
            limit: 0,
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(everything.len(), 5);
}

#[tokio::test]
async fn sender_or_moderator_deletes() {
    let pool = test_pool().await;
    let root = admin(&pool, "root").await;
    let u1 = client(&pool, "u1").await;
    let u3 = client(&pool, "u3").await;
    let moderator = create_user(
        &pool,
        "mod",
        Role::Client,
        Permissions {
            can_delete_messages: true,
            ..Default::default()
        },
    )
    .await;
    let lobby = room(&pool, &root, "lobby", false).await;

    let first = msg::send(&pool, &caller(&u1), lobby.id, "mine", None).await.unwrap();
    let second = msg::send(&pool, &caller(&u1), lobby.id, "also mine", None).await.unwrap();

    assert_matches!(
        msg::delete(&pool, &caller(&u3), first.id).await,
        Err(ChatError::Unauthorized)
    );
    msg::delete(&pool, &caller(&u1), first.id).await.unwrap();
    msg::delete(&pool, &caller(&moderator), second.id).await.unwrap();

    assert_matches!(
        msg::delete(&pool, &caller(&u1), first.id).await,
        Err(ChatError::NotFound(Entity::Message))
    );
    assert_eq!(msg::count(&pool, lobby.id).await.unwrap(), 0);
}

#[tokio::test]
async fn members_of_public_room_is_empty() {
    let pool = test_pool().await;
    let root = admin(&pool, "root").await;
    let lobby = room(&pool, &root, "lobby", false).await;
    assert!(directory::members(&pool, &root, lobby.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn messages_carry_sender_names() {
    let pool = test_pool().await;
    let root = admin(&pool, "root").await;
    let u1 = client(&pool, "u1").await;
    let lobby = room(&pool, &root, "lobby", false).await;

    msg::send(&pool, &caller(&root), lobby.id, "welcome", None).await.unwrap();
    let reply = msg::send(&pool, &caller(&u1), lobby.id, "thanks", None).await.unwrap();

    let listed = msg::list(&pool, &u1, lobby.id, ListQuery::default()).await.unwrap();
    let names: Vec<_> = listed.iter().map(|m| m.sender_name.as_deref()).collect();
    assert_eq!(names, [Some("root"), Some("u1")]);

    let found = msg::find(&pool, reply.id).await.unwrap().unwrap();
    assert_eq!(found.sender_name.as_deref(), Some("u1"));

    let json = serde_json::to_value(&found).unwrap();
    assert_eq!(json["senderName"], "u1");
}

#[tokio::test]
async fn failed_audit_write_does_not_block_sending() {
    let pool = test_pool().await;
    let root = admin(&pool, "root").await;
    let lobby = room(&pool, &root, "lobby", false).await;

    sqlx::query("CREATE TRIGGER block_audit BEFORE INSERT ON audit_log BEGIN SELECT RAISE(ABORT, 'audit offline'); END")
        .execute(&pool)
        .await
        .unwrap();

    let sent = msg::send(&pool, &caller(&root), lobby.id, "still delivered", None).await.unwrap();
    let listed = msg::list(&pool, &root, lobby.id, ListQuery::default()).await.unwrap();
    assert_eq!(listed, vec![sent]);
}
