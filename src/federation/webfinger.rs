//! WebFinger protocol support
//!
//! Lets remote servers discover event and group actors from
//! `id@domain` addresses.

use serde::{Deserialize, Serialize};

use super::negotiate::ACTIVITY_JSON;

/// WebFinger JRD response
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WebFingerResponse {
    pub subject: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aliases: Option<Vec<String>>,
    pub links: Vec<WebFingerLink>,
}

/// WebFinger link
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WebFingerLink {
    pub rel: String,
    #[serde(rename = "type")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
}

/// Generate a WebFinger response for a local actor.
///
/// # Arguments
/// * `actor_id` - Local actor id (the acct username part)
/// * `domain` - Instance domain
/// * `actor_url` - Full actor URL
pub fn generate_webfinger_response(
    actor_id: &str,
    domain: &str,
    actor_url: &str,
) -> WebFingerResponse {
    let subject = format!("acct:{}@{}", actor_id, domain);

    WebFingerResponse {
        subject,
        aliases: Some(vec![actor_url.to_string()]),
        links: vec![
            WebFingerLink {
                rel: "self".to_string(),
                link_type: Some(ACTIVITY_JSON.to_string()),
                href: Some(actor_url.to_string()),
            },
            WebFingerLink {
                rel: "http://webfinger.net/rel/profile-page".to_string(),
                link_type: Some("text/html".to_string()),
                href: Some(actor_url.to_string()),
            },
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn webfinger_response_links_actor_url() {
        let response = generate_webfinger_response(
            "evt1",
            "events.example.com",
            "https://events.example.com/events/evt1",
        );

        assert_eq!(response.subject, "acct:evt1@events.example.com");
        let self_link = response
            .links
            .iter()
            .find(|l| l.rel == "self")
            .expect("self link");
        assert_eq!(
            self_link.href.as_deref(),
            Some("https://events.example.com/events/evt1")
        );
        assert_eq!(self_link.link_type.as_deref(), Some(ACTIVITY_JSON));
    }
}
