//! Data models
//!
//! Rust structs representing database entities.
//! All models use ULID for row IDs and chrono for timestamps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// ID Types
// =============================================================================

/// Entity ID wrapper (ULID format, 26 characters)
///
/// Example: "01ARZ3NDEKTSV4RRFFQ69G5FAV"
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub String);

impl EntityId {
    /// Generate a new ULID
    pub fn new() -> Self {
        Self(ulid::Ulid::new().to_string())
    }

    /// Create from existing string
    pub fn from_string(s: String) -> Self {
        Self(s)
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Local actors (events and event groups)
// =============================================================================

/// Kind of federated actor hosted by this instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorKind {
    Event,
    Group,
}

impl ActorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Event => "event",
            Self::Group => "group",
        }
    }

    /// URL path segment under which actors of this kind are served
    pub fn path_segment(&self) -> &'static str {
        match self {
            Self::Event => "events",
            Self::Group => "groups",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "event" => Some(Self::Event),
            "group" => Some(Self::Group),
            _ => None,
        }
    }
}

/// A federated actor row: one per event or event group.
///
/// Holds exactly the fields the federation layer touches. The rest of the
/// event record (times, location, attendee list) lives with the CRUD layer.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct LocalActor {
    pub id: String,
    /// "event" or "group"
    pub kind: String,
    /// Display name (event title / group name)
    pub name: String,
    /// Summary shown in the actor document
    pub summary: String,
    /// RSA private key (PEM format)
    pub private_key_pem: String,
    /// RSA public key (PEM format)
    pub public_key_pem: String,
    /// Last serialized actor document, used for Delete broadcasts
    pub actor_snapshot: Option<String>,
    /// When the scheduled sweep should remove this actor
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LocalActor {
    pub fn actor_kind(&self) -> ActorKind {
        ActorKind::parse(&self.kind).unwrap_or(ActorKind::Event)
    }

    /// Public URL of this actor
    pub fn url(&self, base_url: &str) -> String {
        format!(
            "{}/{}/{}",
            base_url.trim_end_matches('/'),
            self.actor_kind().path_segment(),
            self.id
        )
    }
}

// =============================================================================
// Followers
// =============================================================================

/// A remote actor following a local event or group
///
/// Inbox URL is stored for activity delivery.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Follower {
    pub id: String,
    /// Local actor being followed
    pub actor_id: String,
    /// Remote actor URL
    pub follower_url: String,
    /// Remote inbox URL for delivery
    pub inbox_url: String,
    /// ActivityPub Follow activity URI
    pub follow_activity_uri: String,
    pub created_at: DateTime<Utc>,
}
