//! Inbound request verification
//!
//! Ties together Signature-header parsing, remote key resolution and
//! cryptographic verification. Nothing downstream may interpret an inbox
//! payload before this succeeds; there is no partial trust.

use std::sync::Arc;

use super::key_cache::PublicKeyCache;
use super::signature::{self, FetchedActor};
use crate::error::AppError;

/// Verifies inbound signed requests against their sender's published key.
pub struct InboxVerifier {
    key_cache: Arc<PublicKeyCache>,
}

impl InboxVerifier {
    pub fn new(key_cache: Arc<PublicKeyCache>) -> Self {
        Self { key_cache }
    }

    /// Verify a signed inbound request.
    ///
    /// # Steps
    /// 1. Extract and parse the Signature header
    /// 2. Dereference the keyId to the sender's actor document (cached)
    /// 3. Reconstruct the signing string and verify the RSA signature
    ///
    /// # Returns
    /// The sender's actor document on success.
    ///
    /// # Errors
    /// `MissingSignature` / `MalformedSignature` / `SignatureInvalid` for
    /// the 401 family, `ActorUnreachable` when the key cannot be resolved,
    /// `Forbidden` when the keyId points at a private destination.
    pub async fn verify(
        &self,
        method: &str,
        path: &str,
        headers: &http::HeaderMap,
        body: Option<&[u8]>,
    ) -> Result<FetchedActor, AppError> {
        let key_id = signature::extract_signature_key_id(headers)?;

        let fetched = self.key_cache.get(&key_id).await?;

        signature::verify_signature(method, path, headers, body, &fetched.public_key_pem)?;

        Ok(fetched)
    }
}
