//! Actor documents and activity construction
//!
//! Serializes local events and groups as ActivityPub actors and builds
//! the activities broadcast to their followers.

use rand::RngCore;
use serde_json::Value;

use crate::data::LocalActor;

use super::keys::public_key_document;

/// ActivityStreams context used on every document
const ACTIVITYSTREAMS_CONTEXT: &str = "https://www.w3.org/ns/activitystreams";

/// Process-unique activity identifier
///
/// Derived from a 128-bit random value rather than anything sequential, so
/// activity ids do not leak creation order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityId(pub String);

impl ActivityId {
    pub fn random() -> Self {
        let mut rng = rand::thread_rng();
        let mut bytes = [0u8; 16];
        rng.fill_bytes(&mut bytes);
        let mut hex = String::with_capacity(32);
        for byte in bytes {
            hex.push_str(&format!("{:02x}", byte));
        }
        Self(hex)
    }
}

/// Serialize a local actor to its outward-facing ActivityPub document.
///
/// Pure function of the actor row and the instance base URL. Mastodon
/// requires a followable actor type, so events and groups are both served
/// as `Person` with the event semantics in name/summary.
pub fn actor_document(actor: &LocalActor, base_url: &str) -> Value {
    let actor_url = actor.url(base_url);
    let base = base_url.trim_end_matches('/');

    serde_json::json!({
        "@context": [
            ACTIVITYSTREAMS_CONTEXT,
            "https://w3id.org/security/v1"
        ],
        "type": "Person",
        "id": actor_url,
        "preferredUsername": actor.id,
        "name": actor.name,
        "summary": actor.summary,
        "inbox": format!("{}/activitypub/inbox", base),
        "outbox": format!("{}/outbox", actor_url),
        "followers": format!("{}/followers", actor_url),
        "url": actor_url,
        "publicKey": public_key_document(&actor_url, &actor.public_key_pem)
    })
}

/// Build ActivityPub activity JSON
pub mod builder {
    use super::*;
    use chrono::Utc;

    fn activity_uri(actor_url: &str, kind: &str) -> String {
        format!("{}/activity/{}/{}", actor_url, kind, ActivityId::random().0)
    }

    /// Build a Create activity wrapping an object (usually a Note)
    pub fn create(actor_url: &str, object: Value, followers_url: &str) -> Value {
        serde_json::json!({
            "@context": ACTIVITYSTREAMS_CONTEXT,
            "type": "Create",
            "id": activity_uri(actor_url, "create"),
            "actor": actor_url,
            "object": object,
            "to": [followers_url],
            "published": Utc::now().to_rfc3339()
        })
    }

    /// Build an Update activity carrying the refreshed actor document
    pub fn update(actor_url: &str, object: Value, followers_url: &str) -> Value {
        serde_json::json!({
            "@context": ACTIVITYSTREAMS_CONTEXT,
            "type": "Update",
            "id": activity_uri(actor_url, "update"),
            "actor": actor_url,
            "object": object,
            "to": [followers_url],
            "published": Utc::now().to_rfc3339()
        })
    }

    /// Build a Delete activity for an object URI
    ///
    /// The object becomes a Tombstone; the actor URL must come from the
    /// pre-deletion snapshot, not a reconstruction of a removed row.
    pub fn delete(actor_url: &str, object_url: &str, followers_url: &str) -> Value {
        serde_json::json!({
            "@context": ACTIVITYSTREAMS_CONTEXT,
            "type": "Delete",
            "id": activity_uri(actor_url, "delete"),
            "actor": actor_url,
            "object": {
                "type": "Tombstone",
                "id": object_url
            },
            "to": [followers_url]
        })
    }

    /// Build a Note object (event announcement or comment)
    pub fn note(actor_url: &str, content: &str, followers_url: &str) -> Value {
        let note_id = format!("{}/note/{}", actor_url, ActivityId::random().0);
        serde_json::json!({
            "type": "Note",
            "id": note_id,
            "attributedTo": actor_url,
            "content": content,
            "published": Utc::now().to_rfc3339(),
            "to": [followers_url]
        })
    }

    /// Build an Accept activity acknowledging a Follow
    pub fn accept(actor_url: &str, follow_activity: Value) -> Value {
        serde_json::json!({
            "@context": ACTIVITYSTREAMS_CONTEXT,
            "type": "Accept",
            "id": activity_uri(actor_url, "accept"),
            "actor": actor_url,
            "object": follow_activity
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn test_actor() -> LocalActor {
        LocalActor {
            id: "evt1".to_string(),
            kind: "event".to_string(),
            name: "Garden Party".to_string(),
            summary: "Sunday afternoon in the park".to_string(),
            private_key_pem: "private".to_string(),
            public_key_pem: "-----BEGIN PUBLIC KEY-----\nabc\n-----END PUBLIC KEY-----\n"
                .to_string(),
            actor_snapshot: None,
            expires_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn actor_document_exposes_identity_and_endpoints() {
        let doc = actor_document(&test_actor(), "https://events.example.com");

        assert_eq!(doc["type"], "Person");
        assert_eq!(doc["id"], "https://events.example.com/events/evt1");
        assert_eq!(doc["name"], "Garden Party");
        assert_eq!(doc["inbox"], "https://events.example.com/activitypub/inbox");
        assert_eq!(
            doc["followers"],
            "https://events.example.com/events/evt1/followers"
        );
        assert_eq!(
            doc["publicKey"]["id"],
            "https://events.example.com/events/evt1#main-key"
        );
        assert_eq!(
            doc["publicKey"]["owner"],
            "https://events.example.com/events/evt1"
        );
    }

    #[test]
    fn activity_ids_are_unique_hex_tokens() {
        let a = ActivityId::random();
        let b = ActivityId::random();
        assert_ne!(a, b);
        assert_eq!(a.0.len(), 32);
        assert!(a.0.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn delete_builder_wraps_object_in_tombstone() {
        let activity = builder::delete(
            "https://events.example.com/events/evt1",
            "https://events.example.com/events/evt1",
            "https://events.example.com/events/evt1/followers",
        );

        assert_eq!(activity["type"], "Delete");
        assert_eq!(activity["object"]["type"], "Tombstone");
        assert_eq!(
            activity["object"]["id"],
            "https://events.example.com/events/evt1"
        );
        assert_eq!(
            activity["actor"],
            "https://events.example.com/events/evt1"
        );
    }

    #[test]
    fn create_builder_addresses_followers() {
        let note = builder::note(
            "https://events.example.com/events/evt1",
            "<p>Doors open at 6</p>",
            "https://events.example.com/events/evt1/followers",
        );
        let activity = builder::create(
            "https://events.example.com/events/evt1",
            note,
            "https://events.example.com/events/evt1/followers",
        );

        assert_eq!(activity["type"], "Create");
        assert_eq!(activity["object"]["type"], "Note");
        assert_eq!(
            activity["to"][0],
            "https://events.example.com/events/evt1/followers"
        );
    }

    #[test]
    fn accept_builder_echoes_follow_object() {
        let follow = serde_json::json!({
            "type": "Follow",
            "id": "https://remote.example/follows/1"
        });
        let activity =
            builder::accept("https://events.example.com/events/evt1", follow.clone());

        assert_eq!(activity["type"], "Accept");
        assert_eq!(activity["object"], follow);
    }
}
