//! Inbox activity processing
//!
//! Interprets verified inbound activities and mutates follower state.
//! Only reachable after `InboxVerifier` has accepted the request.

use std::sync::Arc;
use std::time::Duration;

use crate::data::{ActorKind, EntityId, Follower, Store};
use crate::error::AppError;

use super::actor::builder;
use super::delivery::Broadcaster;
use super::keys;

/// Activity kinds this inbox understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityType {
    Create,
    Update,
    Delete,
    Follow,
    Accept,
    Reject,
    Undo,
    Like,
    Announce,
}

impl ActivityType {
    /// Parse activity type from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "Create" => Some(Self::Create),
            "Update" => Some(Self::Update),
            "Delete" => Some(Self::Delete),
            "Follow" => Some(Self::Follow),
            "Accept" => Some(Self::Accept),
            "Reject" => Some(Self::Reject),
            "Undo" => Some(Self::Undo),
            "Like" => Some(Self::Like),
            "Announce" => Some(Self::Announce),
            _ => None,
        }
    }
}

/// Follow target: the object being followed, as a URL
fn extract_follow_target(activity: &serde_json::Value) -> Result<String, AppError> {
    let object = activity
        .get("object")
        .ok_or_else(|| AppError::Unprocessable("Missing object in Follow".to_string()))?;

    object
        .as_str()
        .or_else(|| object.get("id").and_then(|id| id.as_str()))
        .map(str::to_string)
        .ok_or_else(|| AppError::Unprocessable("Invalid object in Follow".to_string()))
}

/// Resolve a URL to a local actor id when it points at this instance.
///
/// Accepts `{base}/events/{id}` and `{base}/groups/{id}` with an optional
/// trailing slash; scheme, host and port must match the instance exactly.
fn local_actor_id_from_url(base_url: &str, target: &str) -> Option<(ActorKind, String)> {
    let base = url::Url::parse(base_url).ok()?;
    let parsed = url::Url::parse(target.trim()).ok()?;

    if parsed.scheme() != base.scheme() {
        return None;
    }
    if !parsed
        .host_str()?
        .eq_ignore_ascii_case(base.host_str()?)
    {
        return None;
    }
    if parsed.port_or_known_default() != base.port_or_known_default() {
        return None;
    }

    let mut segments = parsed
        .path()
        .trim_matches('/')
        .split('/')
        .filter(|s| !s.is_empty());
    let kind = match segments.next()? {
        "events" => ActorKind::Event,
        "groups" => ActorKind::Group,
        _ => return None,
    };
    let id = segments.next()?;
    if segments.next().is_some() || id.is_empty() {
        return None;
    }

    Some((kind, id.to_string()))
}

/// Inbound inbox URL for a remote actor document, with URL fallback.
fn remote_inbox_url(actor_document: &serde_json::Value, actor_url: &str) -> String {
    actor_document
        .get("inbox")
        .and_then(|i| i.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| format!("{}/inbox", actor_url.trim_end_matches('/')))
}

/// Processes verified inbound activities.
///
/// Holds the store handle and enough context to send Accept responses for
/// new follows.
pub struct InboxProcessor {
    store: Arc<Store>,
    http_client: Arc<reqwest::Client>,
    base_url: String,
    delivery_timeout: Duration,
}

impl InboxProcessor {
    pub fn new(
        store: Arc<Store>,
        http_client: Arc<reqwest::Client>,
        base_url: String,
        delivery_timeout: Duration,
    ) -> Self {
        Self {
            store,
            http_client,
            base_url,
            delivery_timeout,
        }
    }

    /// Process a verified activity.
    ///
    /// # Arguments
    /// * `activity` - Raw JSON-LD activity (already signature-verified)
    /// * `actor_document` - The verified sender's actor document
    ///
    /// Follow and Undo-Follow mutate follower state; every other known
    /// activity kind is acknowledged and ignored. Unknown or malformed
    /// bodies are rejected without mutating state.
    pub async fn process(
        &self,
        activity: &serde_json::Value,
        actor_document: &serde_json::Value,
    ) -> Result<(), AppError> {
        let activity_type_str = activity
            .get("type")
            .and_then(|t| t.as_str())
            .ok_or_else(|| AppError::Unprocessable("Missing activity type".to_string()))?;

        let activity_type = ActivityType::from_str(activity_type_str).ok_or_else(|| {
            AppError::Unprocessable(format!("Unknown activity type: {}", activity_type_str))
        })?;

        let actor_url = activity
            .get("actor")
            .and_then(|a| a.as_str().or_else(|| a.get("id").and_then(|i| i.as_str())))
            .or_else(|| actor_document.get("id").and_then(|i| i.as_str()))
            .ok_or_else(|| AppError::Unprocessable("Missing actor field".to_string()))?
            .to_string();

        match activity_type {
            ActivityType::Follow => {
                self.handle_follow(activity, &actor_url, actor_document)
                    .await
            }
            ActivityType::Undo => self.handle_undo(activity, &actor_url).await,
            // Everything else is accepted but out of scope for follower state.
            _ => {
                tracing::debug!(
                    activity_type = activity_type_str,
                    actor = %actor_url,
                    "Ignoring activity with no follower-state effect"
                );
                Ok(())
            }
        }
    }

    /// Handle a Follow: add the sender to the target's followers and
    /// acknowledge with an Accept.
    async fn handle_follow(
        &self,
        activity: &serde_json::Value,
        actor_url: &str,
        actor_document: &serde_json::Value,
    ) -> Result<(), AppError> {
        // 1. The object must reference a local event or group.
        let target = extract_follow_target(activity)?;
        let (_, target_id) = local_actor_id_from_url(&self.base_url, &target)
            .ok_or_else(|| {
                AppError::Unprocessable("Follow target is not a local actor".to_string())
            })?;

        let local_actor = self
            .store
            .get_actor(&target_id)
            .await?
            .ok_or_else(|| {
                AppError::Unprocessable("Follow target is not a local actor".to_string())
            })?;

        // 2. Record the follower. Idempotent on re-follow.
        let inbox_url = remote_inbox_url(actor_document, actor_url);
        let follow_activity_uri = activity
            .get("id")
            .and_then(|id| id.as_str())
            .unwrap_or(actor_url)
            .to_string();

        let follower = Follower {
            id: EntityId::new().0,
            actor_id: local_actor.id.clone(),
            follower_url: actor_url.to_string(),
            inbox_url: inbox_url.clone(),
            follow_activity_uri: follow_activity_uri.clone(),
            created_at: chrono::Utc::now(),
        };

        let inserted = self.store.add_follower(&follower).await?;
        if inserted {
            tracing::info!(
                follower = %actor_url,
                target = %local_actor.id,
                "Added follower"
            );
        } else {
            tracing::debug!(
                follower = %actor_url,
                target = %local_actor.id,
                "Follower already present"
            );
        }

        // 3. Acknowledge asynchronously. Losing the Accept never loses the
        // follower row, which is already committed.
        let follow_object = serde_json::json!({
            "type": "Follow",
            "id": follow_activity_uri,
            "actor": actor_url,
            "object": target,
        });
        self.spawn_accept(&local_actor, follow_object, inbox_url);

        Ok(())
    }

    /// Send an Accept for a Follow in the background.
    fn spawn_accept(
        &self,
        local_actor: &crate::data::LocalActor,
        follow_object: serde_json::Value,
        follower_inbox_url: String,
    ) {
        let actor_url = local_actor.url(&self.base_url);
        let accept = builder::accept(&actor_url, follow_object);
        let timeout = self.delivery_timeout;
        let broadcaster = Broadcaster::new(
            self.http_client.clone(),
            keys::key_id_for(&actor_url),
            local_actor.private_key_pem.clone(),
            timeout,
            1,
        );

        tokio::spawn(async move {
            match tokio::time::timeout(
                timeout,
                broadcaster.deliver_to_inbox(&follower_inbox_url, &accept),
            )
            .await
            {
                Ok(Ok(())) => {
                    tracing::info!(inbox = %follower_inbox_url, "Sent Accept");
                }
                Ok(Err(e)) => {
                    tracing::warn!(inbox = %follower_inbox_url, error = %e, "Failed to send Accept");
                }
                Err(_) => {
                    tracing::warn!(inbox = %follower_inbox_url, "Accept delivery timed out");
                }
            }
        });
    }

    /// Handle an Undo wrapping a prior Follow: remove the follower.
    async fn handle_undo(
        &self,
        activity: &serde_json::Value,
        actor_url: &str,
    ) -> Result<(), AppError> {
        let object = activity
            .get("object")
            .ok_or_else(|| AppError::Unprocessable("Missing object in Undo".to_string()))?;

        if let Some(follow_uri) = object.as_str() {
            // Compact form: object is the Follow activity URI.
            let removed = self
                .store
                .remove_follower_by_activity_uri(actor_url, follow_uri)
                .await?;
            if removed {
                tracing::info!(follower = %actor_url, follow_uri, "Removed follower via Undo");
            } else {
                tracing::debug!(follower = %actor_url, follow_uri, "Undo matched no follower");
            }
            return Ok(());
        }

        let object_type = object.get("type").and_then(|t| t.as_str());
        if object_type != Some("Follow") {
            // Undo of something we never tracked. Acknowledge and move on.
            tracing::debug!(?object_type, "Ignoring Undo of non-Follow activity");
            return Ok(());
        }

        let target = extract_follow_target(object)?;
        let Some((_, target_id)) = local_actor_id_from_url(&self.base_url, &target) else {
            tracing::debug!(target = %target, "Undo Follow target is not local, ignoring");
            return Ok(());
        };

        // Idempotent: removing an absent follower is a no-op.
        let removed = self.store.remove_follower(&target_id, actor_url).await?;
        if removed {
            tracing::info!(follower = %actor_url, target = %target_id, "Removed follower");
        } else {
            tracing::debug!(follower = %actor_url, target = %target_id, "Undo for non-follower");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::LocalActor;
    use crate::federation::keys::generate_keypair;
    use chrono::Utc;
    use serde_json::json;
    use tempfile::TempDir;

    const BASE_URL: &str = "https://events.example.com";

    async fn test_processor() -> (InboxProcessor, Arc<Store>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = Arc::new(
            Store::connect(&temp_dir.path().join("inbox_test.db"))
                .await
                .unwrap(),
        );
        let processor = InboxProcessor::new(
            store.clone(),
            Arc::new(reqwest::Client::new()),
            BASE_URL.to_string(),
            Duration::from_secs(5),
        );
        (processor, store, temp_dir)
    }

    async fn insert_event_actor(store: &Store, id: &str) {
        let pair = generate_keypair().expect("keypair");
        store
            .insert_actor(&LocalActor {
                id: id.to_string(),
                kind: "event".to_string(),
                name: "Book Club".to_string(),
                summary: String::new(),
                private_key_pem: pair.private_key_pem,
                public_key_pem: pair.public_key_pem,
                actor_snapshot: None,
                expires_at: None,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            })
            .await
            .unwrap();
    }

    fn remote_actor_document(actor_url: &str) -> serde_json::Value {
        json!({
            "id": actor_url,
            "type": "Person",
            "inbox": format!("{}/inbox", actor_url),
        })
    }

    #[test]
    fn local_actor_id_from_url_accepts_event_and_group_paths() {
        assert_eq!(
            local_actor_id_from_url(BASE_URL, "https://events.example.com/events/evt1"),
            Some((ActorKind::Event, "evt1".to_string()))
        );
        assert_eq!(
            local_actor_id_from_url(BASE_URL, "https://events.example.com/groups/grp1/"),
            Some((ActorKind::Group, "grp1".to_string()))
        );
    }

    #[test]
    fn local_actor_id_from_url_rejects_foreign_or_malformed_targets() {
        assert_eq!(
            local_actor_id_from_url(BASE_URL, "https://evil.example/events/evt1"),
            None
        );
        assert_eq!(
            local_actor_id_from_url(BASE_URL, "http://events.example.com/events/evt1"),
            None
        );
        assert_eq!(
            local_actor_id_from_url(BASE_URL, "https://events.example.com/users/evt1"),
            None
        );
        assert_eq!(
            local_actor_id_from_url(BASE_URL, "https://events.example.com/events/evt1/extra"),
            None
        );
        assert_eq!(local_actor_id_from_url(BASE_URL, "not a url"), None);
    }

    #[tokio::test]
    async fn follow_adds_follower_idempotently() {
        let (processor, store, _temp_dir) = test_processor().await;
        insert_event_actor(&store, "evt1").await;

        let actor_url = "https://remote.example/users/alice";
        let activity = json!({
            "type": "Follow",
            "id": "https://remote.example/follows/1",
            "actor": actor_url,
            "object": "https://events.example.com/events/evt1"
        });
        let document = remote_actor_document(actor_url);

        processor.process(&activity, &document).await.unwrap();
        processor.process(&activity, &document).await.unwrap();

        let followers = store.followers_of("evt1").await.unwrap();
        assert_eq!(followers.len(), 1);
        assert_eq!(followers[0].follower_url, actor_url);
        assert_eq!(
            followers[0].inbox_url,
            "https://remote.example/users/alice/inbox"
        );
    }

    #[tokio::test]
    async fn follow_for_unknown_target_is_unprocessable() {
        let (processor, store, _temp_dir) = test_processor().await;

        let actor_url = "https://remote.example/users/alice";
        let activity = json!({
            "type": "Follow",
            "actor": actor_url,
            "object": "https://events.example.com/events/missing"
        });

        let result = processor
            .process(&activity, &remote_actor_document(actor_url))
            .await;
        assert!(matches!(result, Err(AppError::Unprocessable(_))));
        assert!(store.followers_of("missing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn undo_follow_removes_follower_and_is_idempotent() {
        let (processor, store, _temp_dir) = test_processor().await;
        insert_event_actor(&store, "evt1").await;

        let actor_url = "https://remote.example/users/alice";
        let follow = json!({
            "type": "Follow",
            "id": "https://remote.example/follows/1",
            "actor": actor_url,
            "object": "https://events.example.com/events/evt1"
        });
        let document = remote_actor_document(actor_url);
        processor.process(&follow, &document).await.unwrap();

        let undo = json!({
            "type": "Undo",
            "actor": actor_url,
            "object": {
                "type": "Follow",
                "id": "https://remote.example/follows/1",
                "object": "https://events.example.com/events/evt1"
            }
        });

        processor.process(&undo, &document).await.unwrap();
        assert!(store.followers_of("evt1").await.unwrap().is_empty());

        // Undo for a non-follower is a no-op, not an error.
        processor.process(&undo, &document).await.unwrap();
    }

    #[tokio::test]
    async fn undo_with_follow_uri_object_removes_matching_follower() {
        let (processor, store, _temp_dir) = test_processor().await;
        insert_event_actor(&store, "evt1").await;

        let actor_url = "https://remote.example/users/alice";
        let follow = json!({
            "type": "Follow",
            "id": "https://remote.example/follows/uri-form",
            "actor": actor_url,
            "object": "https://events.example.com/events/evt1"
        });
        let document = remote_actor_document(actor_url);
        processor.process(&follow, &document).await.unwrap();

        let undo = json!({
            "type": "Undo",
            "actor": actor_url,
            "object": "https://remote.example/follows/uri-form"
        });

        processor.process(&undo, &document).await.unwrap();
        assert!(store.followers_of("evt1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn other_known_activities_are_acknowledged_without_state_change() {
        let (processor, store, _temp_dir) = test_processor().await;
        insert_event_actor(&store, "evt1").await;

        let actor_url = "https://remote.example/users/alice";
        let document = remote_actor_document(actor_url);

        for activity_type in ["Create", "Update", "Delete", "Like", "Announce"] {
            let activity = json!({
                "type": activity_type,
                "actor": actor_url,
                "object": "https://remote.example/notes/1"
            });
            processor.process(&activity, &document).await.unwrap();
        }

        assert!(store.followers_of("evt1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_or_malformed_activities_are_unprocessable() {
        let (processor, _store, _temp_dir) = test_processor().await;
        let actor_url = "https://remote.example/users/alice";
        let document = remote_actor_document(actor_url);

        let unknown = json!({"type": "Dance", "actor": actor_url});
        assert!(matches!(
            processor.process(&unknown, &document).await,
            Err(AppError::Unprocessable(_))
        ));

        let missing_type = json!({"actor": actor_url});
        assert!(matches!(
            processor.process(&missing_type, &document).await,
            Err(AppError::Unprocessable(_))
        ));

        let follow_without_object = json!({"type": "Follow", "actor": actor_url});
        assert!(matches!(
            processor.process(&follow_without_object, &document).await,
            Err(AppError::Unprocessable(_))
        ));
    }
}
