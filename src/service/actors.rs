//! Actor lifecycle orchestration
//!
//! The CRUD layer calls into this service on every state-changing action:
//! creation mints keys and the first snapshot, updates and comments are
//! broadcast to followers, and removal follows the
//! "broadcast Delete, then delete the row" contract.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::config::AppConfig;
use crate::data::{ActorKind, EntityId, LocalActor, Store};
use crate::error::AppError;
use crate::federation::{
    Broadcaster, DeliveryReport, KeyStore, actor_document, builder, generate_keypair, key_id_for,
};

/// Orchestrates federation side effects for event/group lifecycles.
#[derive(Clone)]
pub struct ActorService {
    store: Arc<Store>,
    keys: KeyStore,
    http_client: Arc<reqwest::Client>,
    config: Arc<AppConfig>,
}

impl ActorService {
    pub fn new(
        store: Arc<Store>,
        keys: KeyStore,
        http_client: Arc<reqwest::Client>,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            store,
            keys,
            http_client,
            config,
        }
    }

    fn base_url(&self) -> String {
        self.config.server.base_url()
    }

    fn delivery_timeout(&self) -> Duration {
        Duration::from_secs(self.config.federation.delivery_timeout_seconds)
    }

    /// Build a broadcaster signing as the given local actor.
    ///
    /// Fails with `KeyMissing` when the actor has no stored key.
    async fn broadcaster_for(&self, actor: &LocalActor) -> Result<Broadcaster, AppError> {
        let private_key_pem = self.keys.signing_key_pem(&actor.id).await?;
        let actor_url = actor.url(&self.base_url());

        Ok(Broadcaster::new(
            self.http_client.clone(),
            key_id_for(&actor_url),
            private_key_pem,
            self.delivery_timeout(),
            self.config.federation.max_parallel_deliveries,
        ))
    }

    async fn follower_inboxes(&self, actor_id: &str) -> Result<Vec<String>, AppError> {
        Ok(self
            .store
            .followers_of(actor_id)
            .await?
            .into_iter()
            .map(|f| f.inbox_url)
            .collect())
    }

    /// Create a new event or group actor.
    ///
    /// Generates the RSA key pair and stores the first actor-document
    /// snapshot alongside the row.
    pub async fn create_actor(
        &self,
        kind: ActorKind,
        name: &str,
        summary: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<LocalActor, AppError> {
        let pair = generate_keypair()?;
        let now = Utc::now();

        let mut actor = LocalActor {
            id: EntityId::new().0,
            kind: kind.as_str().to_string(),
            name: name.to_string(),
            summary: summary.to_string(),
            private_key_pem: pair.private_key_pem,
            public_key_pem: pair.public_key_pem,
            actor_snapshot: None,
            expires_at,
            created_at: now,
            updated_at: now,
        };

        let snapshot = actor_document(&actor, &self.base_url()).to_string();
        actor.actor_snapshot = Some(snapshot);

        self.store.insert_actor(&actor).await?;

        tracing::info!(actor_id = %actor.id, kind = %actor.kind, "Created federated actor");
        Ok(actor)
    }

    /// Apply a profile change and broadcast an Update to followers.
    ///
    /// The snapshot is refreshed before the broadcast so later Delete
    /// activities reference the current representation.
    pub async fn update_profile(
        &self,
        actor_id: &str,
        name: &str,
        summary: &str,
    ) -> Result<DeliveryReport, AppError> {
        if !self
            .store
            .update_actor_profile(actor_id, name, summary)
            .await?
        {
            return Err(AppError::NotFound);
        }

        let actor = self
            .store
            .get_actor(actor_id)
            .await?
            .ok_or(AppError::NotFound)?;

        let document = actor_document(&actor, &self.base_url());
        self.store
            .update_actor_snapshot(actor_id, &document.to_string())
            .await?;

        let actor_url = actor.url(&self.base_url());
        let followers_url = format!("{}/followers", actor_url);
        let activity = builder::update(&actor_url, document, &followers_url);

        let broadcaster = self.broadcaster_for(&actor).await?;
        let inboxes = self.follower_inboxes(actor_id).await?;
        Ok(broadcaster.broadcast(activity, inboxes).await)
    }

    /// Publish a comment on an event/group as a Note wrapped in Create.
    pub async fn publish_comment(
        &self,
        actor_id: &str,
        content: &str,
    ) -> Result<DeliveryReport, AppError> {
        let actor = self
            .store
            .get_actor(actor_id)
            .await?
            .ok_or(AppError::NotFound)?;

        let actor_url = actor.url(&self.base_url());
        let followers_url = format!("{}/followers", actor_url);
        let note = builder::note(&actor_url, content, &followers_url);
        let activity = builder::create(&actor_url, note, &followers_url);

        let broadcaster = self.broadcaster_for(&actor).await?;
        let inboxes = self.follower_inboxes(actor_id).await?;
        Ok(broadcaster.broadcast(activity, inboxes).await)
    }

    /// Remove an actor: broadcast Delete first, then delete the row.
    ///
    /// The Delete activity is built from the stored snapshot captured
    /// before removal, and the store delete only runs once every delivery
    /// attempt has resolved. Delivery failures never block the removal.
    pub async fn remove_actor(&self, actor_id: &str) -> Result<DeliveryReport, AppError> {
        let actor = self
            .store
            .get_actor(actor_id)
            .await?
            .ok_or(AppError::NotFound)?;

        // Actor URL from the snapshot, not a live reconstruction.
        let snapshot_url = actor
            .actor_snapshot
            .as_deref()
            .and_then(|s| serde_json::from_str::<serde_json::Value>(s).ok())
            .and_then(|doc| doc.get("id").and_then(|id| id.as_str()).map(str::to_string));
        let actor_url = snapshot_url.unwrap_or_else(|| actor.url(&self.base_url()));
        let followers_url = format!("{}/followers", actor_url);

        let activity = builder::delete(&actor_url, &actor_url, &followers_url);

        let broadcaster = self.broadcaster_for(&actor).await?;
        let inboxes = self.follower_inboxes(actor_id).await?;

        // All attempts must resolve before the irreversible store mutation.
        let report = broadcaster.broadcast(activity, inboxes).await;

        self.store.delete_actor(actor_id).await?;
        tracing::info!(
            actor_id = %actor_id,
            delivered = report.succeeded(),
            failed = report.failed(),
            "Actor removed after Delete broadcast"
        );

        Ok(report)
    }

    /// Remove every actor whose expiry has passed.
    ///
    /// # Returns
    /// Number of actors removed.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<usize, AppError> {
        let expired = self.store.expired_actors(now).await?;
        let mut removed = 0;

        for actor in expired {
            match self.remove_actor(&actor.id).await {
                Ok(report) => {
                    removed += 1;
                    tracing::info!(
                        actor_id = %actor.id,
                        delivered = report.succeeded(),
                        failed = report.failed(),
                        "Expired actor removed"
                    );
                }
                Err(e) => {
                    tracing::error!(actor_id = %actor.id, error = %e, "Failed to remove expired actor");
                }
            }
        }

        Ok(removed)
    }
}
