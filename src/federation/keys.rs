//! Actor signing keys
//!
//! Each event or group actor gets an RSA key pair at creation time.
//! Keys are persisted with the actor row and never rotated.

use std::sync::Arc;

use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;

use crate::data::Store;
use crate::error::AppError;

const RSA_KEY_BITS: usize = 2048;

/// Generated key pair in PEM encoding
#[derive(Debug, Clone)]
pub struct KeyPair {
    /// PKCS#8 private key PEM
    pub private_key_pem: String,
    /// SPKI public key PEM
    pub public_key_pem: String,
}

/// Generate a fresh RSA key pair for a new actor.
pub fn generate_keypair() -> Result<KeyPair, AppError> {
    let mut rng = rand::thread_rng();
    let private_key = RsaPrivateKey::new(&mut rng, RSA_KEY_BITS)
        .map_err(|e| AppError::Internal(e.into()))?;
    let public_key = RsaPublicKey::from(&private_key);

    let private_key_pem = private_key
        .to_pkcs8_pem(LineEnding::LF)
        .map_err(|e| AppError::Internal(e.into()))?
        .to_string();
    let public_key_pem = public_key
        .to_public_key_pem(LineEnding::LF)
        .map_err(|e| AppError::Internal(e.into()))?;

    Ok(KeyPair {
        private_key_pem,
        public_key_pem,
    })
}

/// Key id advertised for an actor URL
pub fn key_id_for(actor_url: &str) -> String {
    format!("{}#main-key", actor_url)
}

/// Public key document embedded in actor documents
pub fn public_key_document(actor_url: &str, public_key_pem: &str) -> serde_json::Value {
    serde_json::json!({
        "id": key_id_for(actor_url),
        "owner": actor_url,
        "publicKeyPem": public_key_pem
    })
}

/// Looks up persisted actor keys and signs payloads with them.
///
/// A missing key is a data-integrity bug, not a transient condition: the
/// caller's broadcast attempt aborts with `KeyMissing`.
#[derive(Clone)]
pub struct KeyStore {
    store: Arc<Store>,
    base_url: String,
}

impl KeyStore {
    pub fn new(store: Arc<Store>, base_url: String) -> Self {
        Self { store, base_url }
    }

    /// Private key PEM for a local actor.
    pub async fn signing_key_pem(&self, actor_id: &str) -> Result<String, AppError> {
        let actor = self
            .store
            .get_actor(actor_id)
            .await?
            .ok_or_else(|| AppError::KeyMissing(actor_id.to_string()))?;

        if actor.private_key_pem.trim().is_empty() {
            return Err(AppError::KeyMissing(actor_id.to_string()));
        }

        Ok(actor.private_key_pem)
    }

    /// Sign a payload with the actor's key (RSA-SHA256, PKCS#1 v1.5).
    pub async fn sign(&self, actor_id: &str, payload: &[u8]) -> Result<Vec<u8>, AppError> {
        use rsa::pkcs8::DecodePrivateKey;
        use rsa::signature::{RandomizedSigner, SignatureEncoding};

        let pem = self.signing_key_pem(actor_id).await?;
        let private_key = rsa::RsaPrivateKey::from_pkcs8_pem(&pem)
            .map_err(|e| AppError::KeyMissing(format!("{}: {}", actor_id, e)))?;

        let signing_key = rsa::pkcs1v15::SigningKey::<Sha256>::new_unprefixed(private_key);
        let mut rng = rand::thread_rng();
        let signature = signing_key.sign_with_rng(&mut rng, payload);

        Ok(signature.to_bytes().to_vec())
    }

    /// Public key document for a local actor.
    pub async fn public_key_document(&self, actor_id: &str) -> Result<serde_json::Value, AppError> {
        let actor = self
            .store
            .get_actor(actor_id)
            .await?
            .ok_or_else(|| AppError::KeyMissing(actor_id.to_string()))?;

        if actor.public_key_pem.trim().is_empty() {
            return Err(AppError::KeyMissing(actor_id.to_string()));
        }

        let actor_url = actor.url(&self.base_url);
        Ok(public_key_document(&actor_url, &actor.public_key_pem))
    }
}
