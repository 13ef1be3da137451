//! E2E tests for the shared inbox
//!
//! Drives the full HTTP pipeline: signed request in, signature
//! verification against a served remote actor document, follower-state
//! mutation, Accept acknowledgment out.

mod common;

use common::{RemoteActor, TestServer, generate_test_keypair};
use convene::data::ActorKind;
use std::sync::atomic::Ordering;

fn follow_activity(remote: &RemoteActor, target_url: &str) -> serde_json::Value {
    serde_json::json!({
        "@context": "https://www.w3.org/ns/activitystreams",
        "type": "Follow",
        "id": format!("{}/follows/1", remote.actor_url),
        "actor": remote.actor_url,
        "object": target_url
    })
}

async fn create_event(server: &TestServer) -> (String, String) {
    let actor = server
        .state
        .actors
        .create_actor(ActorKind::Event, "Street Fair", "All day", None)
        .await
        .unwrap();
    let url = format!("https://events.test.example/events/{}", actor.id);
    (actor.id, url)
}

#[tokio::test]
async fn unsigned_inbox_post_is_unauthorized() {
    let server = TestServer::new().await;

    let response = server
        .client
        .post(server.url("/activitypub/inbox"))
        .header("Content-Type", "application/activity+json")
        .body(r#"{"type":"Follow"}"#)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 401);
}

#[tokio::test]
async fn signed_follow_adds_follower_and_sends_accept() {
    let server = TestServer::new().await;
    let (event_id, event_url) = create_event(&server).await;
    let remote = RemoteActor::spawn("alice").await;

    let activity = follow_activity(&remote, &event_url);
    let private_key = remote.private_key_pem.clone();
    let response = remote
        .post_signed_activity(&server, &activity, &private_key)
        .await;

    assert_eq!(response.status(), 202);

    let followers = server.state.store.followers_of(&event_id).await.unwrap();
    assert_eq!(followers.len(), 1);
    assert_eq!(followers[0].follower_url, remote.actor_url);
    assert_eq!(followers[0].inbox_url, remote.inbox_url);

    // The Accept is sent asynchronously; give it a moment.
    for _ in 0..50 {
        if remote.inbox_hits.load(Ordering::SeqCst) > 0 {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    }
    assert_eq!(remote.inbox_hits.load(Ordering::SeqCst), 1);
    let deliveries = remote.deliveries.lock().await;
    assert_eq!(deliveries[0]["type"], "Accept");
    assert_eq!(deliveries[0]["object"]["type"], "Follow");
}

#[tokio::test]
async fn repeated_follow_keeps_single_follower_entry() {
    let server = TestServer::new().await;
    let (event_id, event_url) = create_event(&server).await;
    let remote = RemoteActor::spawn("alice").await;

    let activity = follow_activity(&remote, &event_url);
    let private_key = remote.private_key_pem.clone();

    for _ in 0..2 {
        let response = remote
            .post_signed_activity(&server, &activity, &private_key)
            .await;
        assert_eq!(response.status(), 202);
    }

    let followers = server.state.store.followers_of(&event_id).await.unwrap();
    assert_eq!(followers.len(), 1);
}

#[tokio::test]
async fn wrong_signature_is_unauthorized_and_mutates_nothing() {
    let server = TestServer::new().await;
    let (event_id, event_url) = create_event(&server).await;
    let remote = RemoteActor::spawn("alice").await;

    // Well-formed signature, produced with a key that does not match the
    // one the actor document advertises.
    let (wrong_private_key, _) = generate_test_keypair();
    let activity = follow_activity(&remote, &event_url);
    let response = remote
        .post_signed_activity(&server, &activity, &wrong_private_key)
        .await;

    assert_eq!(response.status(), 401);
    assert!(
        server
            .state
            .store
            .followers_of(&event_id)
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn unresolvable_actor_is_a_server_error() {
    let server = TestServer::new().await;
    let (_, event_url) = create_event(&server).await;

    // keyId points at a port nothing listens on.
    let ghost_actor = "http://127.0.0.1:9/users/ghost";
    let (private_key, _) = generate_test_keypair();
    let activity = serde_json::json!({
        "type": "Follow",
        "actor": ghost_actor,
        "object": event_url
    });

    let body = serde_json::to_vec(&activity).unwrap();
    let inbox_url = server.url("/activitypub/inbox");
    let signed = convene::federation::sign_request(
        "POST",
        &inbox_url,
        Some(&body),
        &private_key,
        &format!("{}#main-key", ghost_actor),
    )
    .unwrap();

    let mut request = server
        .client
        .post(&inbox_url)
        .header("Content-Type", "application/activity+json")
        .header("Date", signed.date)
        .header("Signature", signed.signature);
    if let Some(digest) = signed.digest {
        request = request.header("Digest", digest);
    }

    let response = request.body(body).send().await.unwrap();
    assert_eq!(response.status(), 500);
}

#[tokio::test]
async fn undo_follow_removes_follower() {
    let server = TestServer::new().await;
    let (event_id, event_url) = create_event(&server).await;
    let remote = RemoteActor::spawn("alice").await;
    let private_key = remote.private_key_pem.clone();

    let follow = follow_activity(&remote, &event_url);
    let response = remote
        .post_signed_activity(&server, &follow, &private_key)
        .await;
    assert_eq!(response.status(), 202);
    assert_eq!(
        server
            .state
            .store
            .followers_of(&event_id)
            .await
            .unwrap()
            .len(),
        1
    );

    let undo = serde_json::json!({
        "@context": "https://www.w3.org/ns/activitystreams",
        "type": "Undo",
        "id": format!("{}/undos/1", remote.actor_url),
        "actor": remote.actor_url,
        "object": follow
    });
    let response = remote
        .post_signed_activity(&server, &undo, &private_key)
        .await;
    assert_eq!(response.status(), 202);

    assert!(
        server
            .state
            .store
            .followers_of(&event_id)
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn unknown_activity_type_is_unprocessable() {
    let server = TestServer::new().await;
    let (_, _event_url) = create_event(&server).await;
    let remote = RemoteActor::spawn("alice").await;
    let private_key = remote.private_key_pem.clone();

    let activity = serde_json::json!({
        "type": "Juggle",
        "actor": remote.actor_url,
        "object": "https://remote.example/balls/3"
    });
    let response = remote
        .post_signed_activity(&server, &activity, &private_key)
        .await;

    assert_eq!(response.status(), 422);
}

#[tokio::test]
async fn ignored_activity_kinds_are_acknowledged() {
    let server = TestServer::new().await;
    let (event_id, _) = create_event(&server).await;
    let remote = RemoteActor::spawn("alice").await;
    let private_key = remote.private_key_pem.clone();

    let activity = serde_json::json!({
        "type": "Like",
        "actor": remote.actor_url,
        "object": "https://events.test.example/events/something"
    });
    let response = remote
        .post_signed_activity(&server, &activity, &private_key)
        .await;

    assert_eq!(response.status(), 202);
    assert!(
        server
            .state
            .store
            .followers_of(&event_id)
            .await
            .unwrap()
            .is_empty()
    );
}
