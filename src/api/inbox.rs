//! Shared inbox endpoint
//!
//! Receives incoming ActivityPub activities for every local actor.
//!
//! Pipeline: rate limit -> parse -> keyId/actor consistency -> signature
//! verification -> activity processing. Verification must complete before
//! any payload interpretation.

use axum::body::Bytes;
use axum::{Router, extract::State, routing::post};
use http::{HeaderMap, StatusCode};

use crate::AppState;
use crate::error::AppError;
use crate::federation::{self, InboxProcessor, InboxVerifier};
use crate::metrics::{ACTIVITIES_RECEIVED_TOTAL, FEDERATION_REQUESTS_TOTAL};

/// Create the inbox router
///
/// Routes:
/// - POST /activitypub/inbox - Shared inbox
pub fn inbox_router() -> Router<AppState> {
    Router::new().route("/activitypub/inbox", post(inbox))
}

const INBOX_PATH: &str = "/activitypub/inbox";

fn record_inbound(status: &str) {
    FEDERATION_REQUESTS_TOTAL
        .with_label_values(&["inbound", status])
        .inc();
}

/// POST /activitypub/inbox
///
/// Responses: 401 on missing/invalid signature, 500 on actor-resolution
/// failure, 422 on unprocessable activity, 202 on accepted.
async fn inbox(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, AppError> {
    // Reject unsigned requests immediately.
    if headers.get("signature").is_none() {
        record_inbound("unauthorized");
        return Err(AppError::MissingSignature);
    }

    // Parse the activity to get the actor.
    let activity: serde_json::Value = serde_json::from_slice(&body)
        .map_err(|e| AppError::Validation(format!("Invalid JSON: {}", e)))?;

    let actor_id = activity
        .get("actor")
        .and_then(|a| a.as_str().or_else(|| a.get("id").and_then(|i| i.as_str())))
        .ok_or_else(|| AppError::Validation("Missing actor field".to_string()))?
        .to_string();

    // Ensure keyId points to the same actor before fetching remote key material.
    let signature_key_id = federation::extract_signature_key_id(&headers)?;
    if !federation::key_id_matches_actor(&signature_key_id, &actor_id) {
        record_inbound("unauthorized");
        return Err(AppError::SignatureInvalid);
    }

    // Rate limit per remote domain before spending any verification work.
    let actor_domain = federation::extract_actor_domain(&signature_key_id)?;
    if let Err(e) = state.rate_limiter.check_and_increment(&actor_domain).await {
        record_inbound("rate_limited");
        return Err(e);
    }

    // Verify the HTTP signature against the sender's published key.
    let verifier = InboxVerifier::new(state.key_cache.clone());
    let sender = match verifier
        .verify("POST", INBOX_PATH, &headers, Some(&body))
        .await
    {
        Ok(sender) => sender,
        Err(e) => {
            let status = match &e {
                AppError::ActorUnreachable(_) => "actor_unreachable",
                AppError::Forbidden => "forbidden",
                _ => "unauthorized",
            };
            record_inbound(status);
            return Err(e);
        }
    };

    if let Some(activity_type) = activity.get("type").and_then(|t| t.as_str()) {
        ACTIVITIES_RECEIVED_TOTAL
            .with_label_values(&[activity_type])
            .inc();
    }

    // Process the verified activity.
    let processor = InboxProcessor::new(
        state.store.clone(),
        state.http_client.clone(),
        state.config.server.base_url(),
        std::time::Duration::from_secs(state.config.federation.delivery_timeout_seconds),
    );

    processor.process(&activity, &sender.document).await?;

    record_inbound("success");
    Ok(StatusCode::ACCEPTED)
}
