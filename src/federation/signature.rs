//! HTTP Signatures for ActivityPub
//!
//! Implements signing and verification per:
//! https://docs.joinmastodon.org/spec/security/

use crate::error::AppError;
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use chrono::{DateTime, Utc};
use rsa::pkcs8::DecodePublicKey;
use rsa::signature::Verifier;
use rsa::{RsaPublicKey, pkcs1v15::Signature as Pkcs1v15Signature};
use sha2::{Digest, Sha256};
use std::net::IpAddr;

/// Pseudo-header carrying the request line in the signing string
pub const REQUEST_TARGET: &str = "(request-target)";

/// Maximum clock skew accepted on a signed Date header
const DATE_WINDOW_SECONDS: i64 = 300;

fn is_disallowed_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_multicast()
                || v4.is_unspecified()
        }
        IpAddr::V6(v6) => {
            v6.is_loopback()
                || v6.is_unique_local()
                || v6.is_unicast_link_local()
                || v6.is_multicast()
                || v6.is_unspecified()
        }
    }
}

fn is_disallowed_host(host: &str) -> bool {
    let normalized = host.trim_end_matches('.').to_ascii_lowercase();
    if normalized == "localhost" || normalized.ends_with(".localhost") {
        return true;
    }

    normalized
        .parse::<IpAddr>()
        .map(is_disallowed_ip)
        .unwrap_or(false)
}

/// Extract the remote actor domain from an actor URL or key ID URL.
///
/// This rejects non-HTTP(S) URLs. Whether the host is an acceptable
/// destination is a separate judgment, see [`ensure_public_destination`].
pub fn extract_actor_domain(actor_or_key_id: &str) -> Result<String, AppError> {
    let actor_url = actor_or_key_id.split('#').next().unwrap_or(actor_or_key_id);
    let parsed = url::Url::parse(actor_url)
        .map_err(|e| AppError::Validation(format!("Invalid actor URL: {}", e)))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => {
            return Err(AppError::Validation(format!(
                "Unsupported actor URL scheme: {}",
                scheme
            )));
        }
    }

    let host = parsed
        .host_str()
        .ok_or_else(|| AppError::Validation("Missing host in actor URL".to_string()))?
        .to_ascii_lowercase();

    Ok(host)
}

/// Reject obvious local/private hosts before any outbound request.
pub fn ensure_public_destination(host: &str) -> Result<(), AppError> {
    if is_disallowed_host(host) {
        return Err(AppError::Forbidden);
    }
    Ok(())
}

async fn validate_resolved_host_ips(host: &str, port: u16) -> Result<(), AppError> {
    let normalized = host.trim_end_matches('.').to_ascii_lowercase();

    let mut resolved_any = false;
    let lookup = tokio::net::lookup_host((normalized.as_str(), port))
        .await
        .map_err(|e| AppError::ActorUnreachable(format!("Failed to resolve actor host: {}", e)))?;

    for addr in lookup {
        resolved_any = true;
        if is_disallowed_ip(addr.ip()) {
            return Err(AppError::Forbidden);
        }
    }

    if !resolved_any {
        return Err(AppError::ActorUnreachable(
            "No DNS records for actor host".to_string(),
        ));
    }

    Ok(())
}

/// Headers to add for a signed request
#[derive(Debug, Clone)]
pub struct SignatureHeaders {
    /// Signature header value
    pub signature: String,
    /// Date header value (RFC 2616)
    pub date: String,
    /// Digest header value (if body present)
    pub digest: Option<String>,
}

/// Sign an HTTP request
///
/// Creates the HTTP Signature header set for an outgoing request. The
/// signing string covers `(request-target)`, `host`, `date` and, when a
/// body is present, `digest`, so it must be recomputed per recipient.
///
/// # Arguments
/// * `method` - HTTP method (e.g., "POST")
/// * `url` - Full URL being requested
/// * `body` - Request body (for digest)
/// * `private_key_pem` - RSA private key in PEM format
/// * `key_id` - Full URL to the public key (actor#main-key)
pub fn sign_request(
    method: &str,
    url: &str,
    body: Option<&[u8]>,
    private_key_pem: &str,
    key_id: &str,
) -> Result<SignatureHeaders, AppError> {
    // 1. Parse URL to get host and path
    let parsed_url =
        url::Url::parse(url).map_err(|e| AppError::Validation(format!("Invalid URL: {}", e)))?;

    let host = parsed_url
        .host_str()
        .ok_or_else(|| AppError::Validation("Missing host in URL".to_string()))?;

    let path = parsed_url.path();
    let query = parsed_url.query();
    let path_and_query = if let Some(q) = query {
        format!("{}?{}", path, q)
    } else {
        path.to_string()
    };

    // 2. Generate Date header (RFC 2822 format)
    let date = Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string();

    // 3. Generate Digest if body present
    let digest = body.map(generate_digest);

    // 4. Build signing string
    let request_target = format!("{} {}", method.to_lowercase(), path_and_query);

    let mut signing_parts = vec![
        format!("{}: {}", REQUEST_TARGET, request_target),
        format!("host: {}", host),
        format!("date: {}", date),
    ];

    let mut headers_list = vec![REQUEST_TARGET, "host", "date"];

    if let Some(ref digest_value) = digest {
        signing_parts.push(format!("digest: {}", digest_value));
        headers_list.push("digest");
    }

    let signing_string = signing_parts.join("\n");

    // 5. Sign with RSA-SHA256
    use rsa::pkcs8::DecodePrivateKey;
    use rsa::signature::{RandomizedSigner, SignatureEncoding};

    let private_key = rsa::RsaPrivateKey::from_pkcs8_pem(private_key_pem)
        .map_err(|e| AppError::Validation(format!("Invalid private key: {}", e)))?;

    let signing_key = rsa::pkcs1v15::SigningKey::<Sha256>::new_unprefixed(private_key);
    let mut rng = rand::thread_rng();
    let signature = signing_key.sign_with_rng(&mut rng, signing_string.as_bytes());
    let signature_b64 = BASE64.encode(signature.to_bytes());

    // 6. Build Signature header
    let signature_header = format!(
        "keyId=\"{}\",algorithm=\"rsa-sha256\",headers=\"{}\",signature=\"{}\"",
        key_id,
        headers_list.join(" "),
        signature_b64
    );

    Ok(SignatureHeaders {
        signature: signature_header,
        date,
        digest,
    })
}

/// Parsed Signature header
#[derive(Debug, Clone)]
pub struct ParsedSignature {
    /// Key ID (URL to public key)
    pub key_id: String,
    /// Algorithm, when the sender names one
    pub algorithm: Option<String>,
    /// Signed header names, order preserved
    pub headers: Vec<String>,
    /// Base64-encoded signature
    pub signature: String,
}

/// Parse a Signature header value
///
/// # Format
/// ```text
/// keyId="...",algorithm="...",headers="...",signature="..."
/// ```
///
/// `keyId`, `headers` and `signature` are required; anything else is
/// `MalformedSignature`.
pub fn parse_signature_header(header: &str) -> Result<ParsedSignature, AppError> {
    let mut key_id = None;
    let mut algorithm = None;
    let mut headers = None;
    let mut signature = None;

    // Split by comma and parse key=value pairs
    for part in header.split(',') {
        let part = part.trim();
        if let Some((key, value)) = part.split_once('=') {
            let key = key.trim();
            // Remove quotes from value
            let value = value.trim().trim_matches('"');

            match key {
                "keyId" => key_id = Some(value.to_string()),
                "algorithm" => algorithm = Some(value.to_string()),
                "headers" => {
                    headers = Some(
                        value
                            .split_whitespace()
                            .map(|s| s.to_ascii_lowercase())
                            .collect::<Vec<_>>(),
                    )
                }
                "signature" => signature = Some(value.to_string()),
                _ => {} // Ignore unknown fields
            }
        }
    }

    let parsed = ParsedSignature {
        key_id: key_id
            .ok_or_else(|| AppError::MalformedSignature("Missing keyId".to_string()))?,
        algorithm,
        headers: headers
            .ok_or_else(|| AppError::MalformedSignature("Missing headers".to_string()))?,
        signature: signature
            .ok_or_else(|| AppError::MalformedSignature("Missing signature".to_string()))?,
    };

    if let Some(ref algorithm) = parsed.algorithm {
        if algorithm != "rsa-sha256" && algorithm != "hs2019" {
            return Err(AppError::MalformedSignature(format!(
                "Unsupported signature algorithm: {}",
                algorithm
            )));
        }
    }

    Ok(parsed)
}

/// Reconstruct the canonical signing string for a request.
///
/// One line per name in `signed_headers`, order preserved:
/// the request-target pseudo-header becomes
/// `(request-target): <lowercase method> <path>`, everything else is read
/// from the actual request headers. Must match the sender byte for byte.
fn build_signing_string(
    method: &str,
    path: &str,
    headers: &http::HeaderMap,
    signed_headers: &[String],
) -> Result<String, AppError> {
    let mut signing_parts = Vec::with_capacity(signed_headers.len());

    for header_name in signed_headers {
        let value = if header_name == REQUEST_TARGET {
            format!("{} {}", method.to_lowercase(), path)
        } else {
            headers
                .get(header_name.as_str())
                .and_then(|v| v.to_str().ok())
                .ok_or(AppError::SignatureInvalid)?
                .to_string()
        };

        signing_parts.push(format!("{}: {}", header_name, value));
    }

    Ok(signing_parts.join("\n"))
}

/// Verify an HTTP request signature
///
/// # Arguments
/// * `method` - HTTP method
/// * `path` - Request path
/// * `headers` - All request headers
/// * `body` - Request body (for digest verification)
/// * `public_key_pem` - RSA public key in PEM format
///
/// # Errors
/// - `MissingSignature` when no Signature header is present
/// - `MalformedSignature` when the header does not parse
/// - `SignatureInvalid` for every reconstruction/digest/crypto failure,
///   so the caller always gets a definite reject
pub fn verify_signature(
    method: &str,
    path: &str,
    headers: &http::HeaderMap,
    body: Option<&[u8]>,
    public_key_pem: &str,
) -> Result<(), AppError> {
    // 1. Parse Signature header
    let signature_header = headers
        .get("signature")
        .ok_or(AppError::MissingSignature)?
        .to_str()
        .map_err(|_| AppError::MalformedSignature("Invalid Signature header".to_string()))?;

    let parsed = parse_signature_header(signature_header)?;

    // 2. A body must be bound to the signature through the digest header.
    if body.is_some() && !parsed.headers.iter().any(|h| h == "digest") {
        return Err(AppError::SignatureInvalid);
    }

    // 3. When the sender signed the Date header, reject stale requests.
    if parsed.headers.iter().any(|h| h == "date") {
        let date_str = headers
            .get("date")
            .and_then(|v| v.to_str().ok())
            .ok_or(AppError::SignatureInvalid)?;

        let date = DateTime::parse_from_rfc2822(date_str)
            .map_err(|_| AppError::SignatureInvalid)?;

        let diff = (Utc::now().timestamp() - date.timestamp()).abs();
        if diff > DATE_WINDOW_SECONDS {
            return Err(AppError::SignatureInvalid);
        }
    }

    // 4. If body present, verify Digest.
    if let Some(body_data) = body {
        let digest_str = headers
            .get("digest")
            .and_then(|v| v.to_str().ok())
            .ok_or(AppError::SignatureInvalid)?;

        let expected_digest = generate_digest(body_data);
        if digest_str != expected_digest {
            return Err(AppError::SignatureInvalid);
        }
    }

    // 5. Reconstruct signing string.
    let signing_string = build_signing_string(method, path, headers, &parsed.headers)?;

    // 6. Verify RSA signature.
    let signature_bytes = BASE64
        .decode(&parsed.signature)
        .map_err(|_| AppError::SignatureInvalid)?;

    let public_key =
        RsaPublicKey::from_public_key_pem(public_key_pem).map_err(|_| AppError::SignatureInvalid)?;

    // Use new_unprefixed for compatibility with Mastodon-produced signatures.
    let verifier = rsa::pkcs1v15::VerifyingKey::<Sha256>::new_unprefixed(public_key);

    let signature = Pkcs1v15Signature::try_from(signature_bytes.as_slice())
        .map_err(|_| AppError::SignatureInvalid)?;

    verifier
        .verify(signing_string.as_bytes(), &signature)
        .map_err(|_| AppError::SignatureInvalid)?;

    Ok(())
}

/// Extract keyId from the Signature header.
pub fn extract_signature_key_id(headers: &http::HeaderMap) -> Result<String, AppError> {
    let signature_header = headers
        .get("signature")
        .ok_or(AppError::MissingSignature)?
        .to_str()
        .map_err(|_| AppError::MalformedSignature("Invalid Signature header".to_string()))?;

    let parsed = parse_signature_header(signature_header)?;
    Ok(parsed.key_id)
}

/// Validate that the signature keyId points to the same actor as the activity actor.
pub fn key_id_matches_actor(key_id: &str, actor_id: &str) -> bool {
    let key_actor = key_id.split('#').next().unwrap_or(key_id);
    let actor = actor_id.split('#').next().unwrap_or(actor_id);
    key_actor == actor
}

/// Generate SHA-256 digest for a body
///
/// # Returns
/// `SHA-256=base64(hash)`
pub fn generate_digest(body: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(body);
    let hash = hasher.finalize();
    format!("SHA-256={}", BASE64.encode(hash))
}

/// Actor document and key material fetched from a keyId URL
#[derive(Debug, Clone)]
pub struct FetchedActor {
    /// Remote actor document
    pub document: serde_json::Value,
    /// PEM-encoded public key advertised by the actor
    pub public_key_pem: String,
}

/// Dereference a keyId URL to the remote actor document and its public key.
///
/// The keyId is treated as an actor document URL (fragment stripped). The
/// destination host is SSRF-guarded before any request goes out, unless
/// `allow_private_destinations` is set (local development only).
///
/// # Errors
/// `ActorUnreachable` for every network/parse failure; `Forbidden` when the
/// destination resolves to a local or private address.
pub async fn fetch_actor(
    key_id: &str,
    http_client: &reqwest::Client,
    allow_private_destinations: bool,
) -> Result<FetchedActor, AppError> {
    // Validate actor URL/domain and extract the actor document URL.
    let actor_domain = extract_actor_domain(key_id)?;
    let actor_url = key_id.split('#').next().unwrap_or(key_id);
    let parsed_actor_url = url::Url::parse(actor_url)
        .map_err(|e| AppError::Validation(format!("Invalid actor URL: {}", e)))?;
    let actor_port = parsed_actor_url
        .port_or_known_default()
        .ok_or_else(|| AppError::Validation("Missing port in actor URL".to_string()))?;

    // Resolve DNS before fetching and reject local/private destinations.
    if !allow_private_destinations {
        ensure_public_destination(&actor_domain)?;
        validate_resolved_host_ips(&actor_domain, actor_port).await?;
    }

    // Fetch actor document
    let response = http_client
        .get(actor_url)
        .header("Accept", "application/activity+json")
        .send()
        .await
        .map_err(|e| AppError::ActorUnreachable(format!("Failed to fetch actor: {}", e)))?;

    if !response.status().is_success() {
        return Err(AppError::ActorUnreachable(format!(
            "Failed to fetch actor: HTTP {}",
            response.status()
        )));
    }

    let document: serde_json::Value = response
        .json()
        .await
        .map_err(|e| AppError::ActorUnreachable(format!("Failed to parse actor: {}", e)))?;

    let public_key = document
        .get("publicKey")
        .ok_or_else(|| AppError::ActorUnreachable("Missing publicKey in actor".to_string()))?;

    // If a key fragment is provided, ensure the actor advertises exactly that key id.
    if key_id.contains('#') {
        let advertised_key_id = public_key
            .get("id")
            .and_then(|id| id.as_str())
            .ok_or_else(|| {
                AppError::ActorUnreachable("Missing publicKey.id in actor".to_string())
            })?;

        if advertised_key_id != key_id {
            return Err(AppError::SignatureInvalid);
        }
    }

    let public_key_pem = public_key
        .get("publicKeyPem")
        .and_then(|pem| pem.as_str())
        .ok_or_else(|| AppError::ActorUnreachable("Missing publicKeyPem in actor".to_string()))?
        .to_string();

    Ok(FetchedActor {
        document,
        public_key_pem,
    })
}
