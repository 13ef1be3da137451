//! Well-known endpoints
//!
//! - /.well-known/webfinger

use axum::{
    Router,
    extract::{Query, State},
    response::Json,
    routing::get,
};
use serde::Deserialize;

use crate::AppState;
use crate::error::AppError;
use crate::federation::generate_webfinger_response;

/// Create the well-known router
///
/// Routes:
/// - GET /.well-known/webfinger
pub fn wellknown_router() -> Router<AppState> {
    Router::new().route("/.well-known/webfinger", get(webfinger))
}

/// WebFinger query parameters
#[derive(Debug, Deserialize)]
struct WebFingerQuery {
    resource: String,
}

/// GET /.well-known/webfinger
///
/// Responds to WebFinger queries for local event/group actors.
///
/// Query: ?resource=acct:actor_id@domain
async fn webfinger(
    State(state): State<AppState>,
    Query(query): Query<WebFingerQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let resource = &query.resource;

    if !resource.starts_with("acct:") {
        return Err(AppError::Validation(
            "Resource must start with 'acct:'".to_string(),
        ));
    }

    let acct = &resource[5..];
    let Some((actor_id, domain)) = acct.split_once('@') else {
        return Err(AppError::Validation("Invalid acct format".to_string()));
    };

    // Verify domain matches local domain
    if domain != state.config.server.domain {
        return Err(AppError::NotFound);
    }

    let actor = state
        .store
        .get_actor(actor_id)
        .await?
        .ok_or(AppError::NotFound)?;

    let actor_url = actor.url(&state.config.server.base_url());
    let response = generate_webfinger_response(&actor.id, domain, &actor_url);

    Ok(Json(serde_json::to_value(response).map_err(|e| {
        AppError::Internal(anyhow::anyhow!("Failed to serialize WebFinger: {}", e))
    })?))
}
