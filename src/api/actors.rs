//! Actor endpoints
//!
//! - Actor document (content-negotiated against the HTML page)
//! - Followers collection
//! - Outbox

use axum::{
    Router,
    extract::{Path, State},
    response::{Html, IntoResponse, Json, Response},
    routing::get,
};
use http::{HeaderMap, header::CONTENT_TYPE};

use crate::AppState;
use crate::data::{ActorKind, LocalActor};
use crate::error::AppError;
use crate::federation::{ACTIVITY_JSON, actor_document, wants_federated_representation};
use crate::metrics::HTTP_REQUESTS_TOTAL;

/// Create the actor router
///
/// Routes:
/// - GET /events/:id, /groups/:id - Actor document or HTML page
/// - GET /events/:id/followers, /groups/:id/followers - Followers collection
/// - GET /events/:id/outbox, /groups/:id/outbox - Outbox
pub fn actors_router() -> Router<AppState> {
    Router::new()
        .route("/events/:id", get(event_actor))
        .route("/events/:id/followers", get(event_followers))
        .route("/events/:id/outbox", get(event_outbox))
        .route("/groups/:id", get(group_actor))
        .route("/groups/:id/followers", get(group_followers))
        .route("/groups/:id/outbox", get(group_outbox))
}

async fn load_actor(state: &AppState, kind: ActorKind, id: &str) -> Result<LocalActor, AppError> {
    let actor = state.store.get_actor(id).await?.ok_or(AppError::NotFound)?;
    if actor.actor_kind() != kind {
        return Err(AppError::NotFound);
    }
    Ok(actor)
}

/// GET /events/:id | /groups/:id
///
/// Federated callers get the ActivityPub document; everyone else gets a
/// minimal HTML page. The branch is chosen by the Accept header alone.
async fn actor(
    state: AppState,
    kind: ActorKind,
    id: String,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let actor = load_actor(&state, kind, &id).await?;
    let base_url = state.config.server.base_url();

    let path_label = match kind {
        ActorKind::Event => "/events/:id",
        ActorKind::Group => "/groups/:id",
    };
    HTTP_REQUESTS_TOTAL
        .with_label_values(&["GET", path_label, "200"])
        .inc();

    if wants_federated_representation(&headers) {
        let document = actor_document(&actor, &base_url);
        return Ok(([(CONTENT_TYPE, ACTIVITY_JSON)], Json(document)).into_response());
    }

    // Human-readable branch. Real templating lives outside this subsystem.
    let page = format!(
        "<!DOCTYPE html>\n<html>\n<head><title>{}</title></head>\n<body>\n<h1>{}</h1>\n<p>{}</p>\n</body>\n</html>\n",
        html_escape::encode_text(&actor.name),
        html_escape::encode_text(&actor.name),
        html_escape::encode_text(&actor.summary),
    );
    Ok(Html(page).into_response())
}

async fn event_actor(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    actor(state, ActorKind::Event, id, headers).await
}

async fn group_actor(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    actor(state, ActorKind::Group, id, headers).await
}

/// GET .../followers
///
/// Returns the followers OrderedCollection.
async fn followers(
    state: AppState,
    kind: ActorKind,
    id: String,
) -> Result<Json<serde_json::Value>, AppError> {
    let actor = load_actor(&state, kind, &id).await?;
    let base_url = state.config.server.base_url();
    let actor_url = actor.url(&base_url);

    let items: Vec<String> = state
        .store
        .followers_of(&actor.id)
        .await?
        .into_iter()
        .map(|f| f.follower_url)
        .collect();

    Ok(Json(serde_json::json!({
        "@context": "https://www.w3.org/ns/activitystreams",
        "type": "OrderedCollection",
        "id": format!("{}/followers", actor_url),
        "totalItems": items.len(),
        "orderedItems": items
    })))
}

async fn event_followers(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    followers(state, ActorKind::Event, id).await
}

async fn group_followers(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    followers(state, ActorKind::Group, id).await
}

/// GET .../outbox
///
/// Activities are built on demand and not journaled, so the outbox is an
/// empty OrderedCollection.
async fn outbox(
    state: AppState,
    kind: ActorKind,
    id: String,
) -> Result<Json<serde_json::Value>, AppError> {
    let actor = load_actor(&state, kind, &id).await?;
    let base_url = state.config.server.base_url();
    let actor_url = actor.url(&base_url);

    Ok(Json(serde_json::json!({
        "@context": "https://www.w3.org/ns/activitystreams",
        "type": "OrderedCollection",
        "id": format!("{}/outbox", actor_url),
        "totalItems": 0,
        "orderedItems": []
    })))
}

async fn event_outbox(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    outbox(state, ActorKind::Event, id).await
}

async fn group_outbox(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    outbox(state, ActorKind::Group, id).await
}
