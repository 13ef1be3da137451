//! ActivityPub federation module
//!
//! Handles:
//! - Actor documents and activity construction
//! - HTTP Signatures (signing and verification)
//! - Inbox activity processing
//! - Activity broadcast to followers
//! - Content negotiation
//! - Public key caching
//! - WebFinger
//! - Rate limiting

mod actor;
mod delivery;
mod inbox;
mod key_cache;
mod keys;
mod negotiate;
mod rate_limit;
mod signature;
mod verify;
mod webfinger;

pub use actor::{ActivityId, actor_document, builder};
pub use delivery::{Broadcaster, DeliveryOutcome, DeliveryReport};
pub use inbox::{ActivityType, InboxProcessor};
pub use key_cache::PublicKeyCache;
pub use keys::{KeyPair, KeyStore, generate_keypair, key_id_for, public_key_document};
pub use negotiate::{ACTIVITY_JSON, wants_federated_representation};
pub use rate_limit::RateLimiter;
pub use signature::{
    FetchedActor, ensure_public_destination, extract_actor_domain, extract_signature_key_id,
    fetch_actor, generate_digest, key_id_matches_actor, parse_signature_header, sign_request,
    verify_signature,
};
pub use verify::InboxVerifier;
pub use webfinger::{WebFingerLink, WebFingerResponse, generate_webfinger_response};
