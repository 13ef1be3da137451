//! SQLite database operations
//!
//! All database access goes through this module.
//! Follower add/remove are single atomic statements so that concurrent
//! Follow/Undo messages for the same actor serialize at the store level.

use chrono::{DateTime, Utc};
use sqlx::{Pool, Sqlite, SqlitePool};
use std::path::Path;

use super::models::*;
use crate::error::AppError;

/// Database connection pool wrapper.
pub struct Store {
    pool: Pool<Sqlite>,
}

impl Store {
    /// Connect to the SQLite database and run migrations.
    pub async fn connect(path: &Path) -> Result<Self, AppError> {
        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| AppError::Database(sqlx::Error::Io(e)))?;
        }

        let connection_string = format!("sqlite:{}?mode=rwc", path.display());
        let pool = SqlitePool::connect(&connection_string).await?;

        sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| {
                tracing::error!("Migration failed: {}", e);
                AppError::Internal(anyhow::anyhow!("Migration failed: {}", e))
            })?;

        tracing::info!("Database connected and migrated successfully");

        Ok(Self { pool })
    }

    // =========================================================================
    // Actors
    // =========================================================================

    /// Insert a new local actor row.
    pub async fn insert_actor(&self, actor: &LocalActor) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO actors (
                id, kind, name, summary, private_key_pem, public_key_pem,
                actor_snapshot, expires_at, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&actor.id)
        .bind(&actor.kind)
        .bind(&actor.name)
        .bind(&actor.summary)
        .bind(&actor.private_key_pem)
        .bind(&actor.public_key_pem)
        .bind(&actor.actor_snapshot)
        .bind(actor.expires_at)
        .bind(actor.created_at)
        .bind(actor.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Get a local actor by id.
    pub async fn get_actor(&self, actor_id: &str) -> Result<Option<LocalActor>, AppError> {
        let actor = sqlx::query_as::<_, LocalActor>("SELECT * FROM actors WHERE id = ?")
            .bind(actor_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(actor)
    }

    /// Update an actor's name/summary and refresh its updated_at.
    pub async fn update_actor_profile(
        &self,
        actor_id: &str,
        name: &str,
        summary: &str,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            "UPDATE actors SET name = ?, summary = ?, updated_at = ? WHERE id = ?",
        )
        .bind(name)
        .bind(summary)
        .bind(Utc::now())
        .bind(actor_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Replace the stored actor-document snapshot.
    ///
    /// Called whenever the serialized representation changes; the snapshot
    /// is what Delete broadcasts are built from after the row is gone.
    pub async fn update_actor_snapshot(
        &self,
        actor_id: &str,
        snapshot: &str,
    ) -> Result<(), AppError> {
        sqlx::query("UPDATE actors SET actor_snapshot = ?, updated_at = ? WHERE id = ?")
            .bind(snapshot)
            .bind(Utc::now())
            .bind(actor_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Delete an actor row. Followers cascade.
    pub async fn delete_actor(&self, actor_id: &str) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM actors WHERE id = ?")
            .bind(actor_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// List actors whose expiry has passed.
    pub async fn expired_actors(&self, now: DateTime<Utc>) -> Result<Vec<LocalActor>, AppError> {
        let actors = sqlx::query_as::<_, LocalActor>(
            "SELECT * FROM actors WHERE expires_at IS NOT NULL AND expires_at <= ?",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        Ok(actors)
    }

    // =========================================================================
    // Followers
    // =========================================================================

    /// Add a follower to a local actor.
    ///
    /// Idempotent: re-following is a no-op thanks to the
    /// `UNIQUE(actor_id, follower_url)` constraint.
    ///
    /// # Returns
    /// `true` if a new row was inserted, `false` if the follower existed.
    pub async fn add_follower(&self, follower: &Follower) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            INSERT INTO followers (
                id, actor_id, follower_url, inbox_url, follow_activity_uri, created_at
            ) VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT (actor_id, follower_url) DO NOTHING
            "#,
        )
        .bind(&follower.id)
        .bind(&follower.actor_id)
        .bind(&follower.follower_url)
        .bind(&follower.inbox_url)
        .bind(&follower.follow_activity_uri)
        .bind(follower.created_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Remove a follower from a local actor.
    ///
    /// Idempotent: removing an absent follower is a no-op.
    ///
    /// # Returns
    /// `true` if a row was removed.
    pub async fn remove_follower(
        &self,
        actor_id: &str,
        follower_url: &str,
    ) -> Result<bool, AppError> {
        let result =
            sqlx::query("DELETE FROM followers WHERE actor_id = ? AND follower_url = ?")
                .bind(actor_id)
                .bind(follower_url)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Remove a follower by the Follow activity URI it was created from.
    ///
    /// Used for compact Undo payloads that reference the Follow by URI
    /// instead of wrapping the original object. Idempotent.
    pub async fn remove_follower_by_activity_uri(
        &self,
        follower_url: &str,
        follow_activity_uri: &str,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            "DELETE FROM followers WHERE follower_url = ? AND follow_activity_uri = ?",
        )
        .bind(follower_url)
        .bind(follow_activity_uri)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// List the followers of a local actor.
    pub async fn followers_of(&self, actor_id: &str) -> Result<Vec<Follower>, AppError> {
        let followers = sqlx::query_as::<_, Follower>(
            "SELECT * FROM followers WHERE actor_id = ? ORDER BY created_at",
        )
        .bind(actor_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(followers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn test_store() -> (Store, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = Store::connect(&temp_dir.path().join("store_test.db"))
            .await
            .unwrap();
        (store, temp_dir)
    }

    fn test_actor(id: &str) -> LocalActor {
        LocalActor {
            id: id.to_string(),
            kind: "event".to_string(),
            name: "Spring Picnic".to_string(),
            summary: "Bring a blanket".to_string(),
            private_key_pem: "private".to_string(),
            public_key_pem: "public".to_string(),
            actor_snapshot: None,
            expires_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn test_follower(actor_id: &str, follower_url: &str) -> Follower {
        Follower {
            id: EntityId::new().0,
            actor_id: actor_id.to_string(),
            follower_url: follower_url.to_string(),
            inbox_url: format!("{}/inbox", follower_url),
            follow_activity_uri: format!("{}/follows/1", follower_url),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn add_follower_is_idempotent() {
        let (store, _temp_dir) = test_store().await;
        store.insert_actor(&test_actor("evt1")).await.unwrap();

        let follower = test_follower("evt1", "https://remote.example/users/alice");
        assert!(store.add_follower(&follower).await.unwrap());

        // Same follower URL again, different row id: no duplicate.
        let duplicate = test_follower("evt1", "https://remote.example/users/alice");
        assert!(!store.add_follower(&duplicate).await.unwrap());

        let followers = store.followers_of("evt1").await.unwrap();
        assert_eq!(followers.len(), 1);
    }

    #[tokio::test]
    async fn remove_follower_is_idempotent() {
        let (store, _temp_dir) = test_store().await;
        store.insert_actor(&test_actor("evt1")).await.unwrap();

        let follower = test_follower("evt1", "https://remote.example/users/alice");
        store.add_follower(&follower).await.unwrap();

        assert!(
            store
                .remove_follower("evt1", "https://remote.example/users/alice")
                .await
                .unwrap()
        );
        // Removing an absent follower is a no-op.
        assert!(
            !store
                .remove_follower("evt1", "https://remote.example/users/alice")
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn deleting_actor_cascades_followers() {
        let (store, _temp_dir) = test_store().await;
        store.insert_actor(&test_actor("evt1")).await.unwrap();
        store
            .add_follower(&test_follower("evt1", "https://remote.example/users/alice"))
            .await
            .unwrap();

        assert!(store.delete_actor("evt1").await.unwrap());
        assert!(store.get_actor("evt1").await.unwrap().is_none());
        assert!(store.followers_of("evt1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn expired_actors_returns_only_past_expiries() {
        let (store, _temp_dir) = test_store().await;

        let mut expired = test_actor("evt-old");
        expired.expires_at = Some(Utc::now() - chrono::Duration::hours(1));
        let mut live = test_actor("evt-live");
        live.expires_at = Some(Utc::now() + chrono::Duration::hours(1));
        let unbounded = test_actor("evt-forever");

        store.insert_actor(&expired).await.unwrap();
        store.insert_actor(&live).await.unwrap();
        store.insert_actor(&unbounded).await.unwrap();

        let found = store.expired_actors(Utc::now()).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "evt-old");
    }

    #[tokio::test]
    async fn snapshot_update_round_trips() {
        let (store, _temp_dir) = test_store().await;
        store.insert_actor(&test_actor("evt1")).await.unwrap();

        store
            .update_actor_snapshot("evt1", r#"{"type":"Person"}"#)
            .await
            .unwrap();

        let actor = store.get_actor("evt1").await.unwrap().unwrap();
        assert_eq!(actor.actor_snapshot.as_deref(), Some(r#"{"type":"Person"}"#));
    }
}
