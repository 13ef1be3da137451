//! Content negotiation between federated and human-readable responses
//!
//! Decides, per inbound request, whether the caller wants the ActivityPub
//! JSON-LD representation of an actor or the HTML page. Pure read of the
//! Accept header; never mutates the request.

use http::HeaderMap;

/// Media type served to federated callers
pub const ACTIVITY_JSON: &str = "application/activity+json";

const ACTIVITYSTREAMS_PROFILE: &str = "https://www.w3.org/ns/activitystreams";

/// One parsed Accept entry: media type plus its q-value
#[derive(Debug, Clone, PartialEq)]
struct AcceptEntry {
    media_type: String,
    params: Vec<String>,
    quality: f32,
}

fn parse_accept(value: &str) -> Vec<AcceptEntry> {
    value
        .split(',')
        .filter_map(|entry| {
            let mut parts = entry.trim().split(';');
            let media_type = parts.next()?.trim().to_ascii_lowercase();
            if media_type.is_empty() {
                return None;
            }

            let mut quality = 1.0f32;
            let mut params = Vec::new();
            for param in parts {
                let param = param.trim();
                if let Some(q) = param.strip_prefix("q=") {
                    quality = q.trim().parse().unwrap_or(0.0);
                } else {
                    params.push(param.to_ascii_lowercase());
                }
            }

            Some(AcceptEntry {
                media_type,
                params,
                quality,
            })
        })
        .collect()
}

fn is_federation_type(entry: &AcceptEntry) -> bool {
    match entry.media_type.as_str() {
        "application/activity+json" => true,
        "application/ld+json" => entry
            .params
            .iter()
            .any(|p| p.starts_with("profile=") && p.contains(ACTIVITYSTREAMS_PROFILE)),
        _ => false,
    }
}

fn is_html_acceptable(entry: &AcceptEntry) -> bool {
    matches!(
        entry.media_type.as_str(),
        "text/html" | "application/xhtml+xml" | "text/*" | "*/*"
    )
}

/// Return true when the request negotiates the federated representation.
///
/// True iff a federation media type appears at a preference rank at or
/// above the best HTML-acceptable type, or no HTML-acceptable type is
/// present at all. A request with no Accept header gets the HTML page.
pub fn wants_federated_representation(headers: &HeaderMap) -> bool {
    let Some(accept) = headers.get("accept").and_then(|v| v.to_str().ok()) else {
        return false;
    };

    let entries = parse_accept(accept);
    if entries.is_empty() {
        return false;
    }

    let federation_rank = entries
        .iter()
        .filter(|e| is_federation_type(e) && e.quality > 0.0)
        .map(|e| e.quality)
        .fold(None::<f32>, |best, q| Some(best.map_or(q, |b| b.max(q))));

    let html_rank = entries
        .iter()
        .filter(|e| is_html_acceptable(e) && e.quality > 0.0)
        .map(|e| e.quality)
        .fold(None::<f32>, |best, q| Some(best.map_or(q, |b| b.max(q))));

    match (federation_rank, html_rank) {
        (Some(fed), Some(html)) => fed >= html,
        (Some(_), None) => true,
        // No explicit federation preference, but nothing HTML-shaped either.
        (None, None) => true,
        (None, Some(_)) => false,
    }
}
