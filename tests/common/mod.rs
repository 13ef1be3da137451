//! Common test utilities for E2E tests

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::{Json, Router, routing::get, routing::post};
use convene::{AppState, config};
use http::StatusCode;
use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::{RsaPrivateKey, RsaPublicKey};
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::Mutex;

/// Test server instance
pub struct TestServer {
    pub addr: String,
    pub state: AppState,
    pub _temp_dir: TempDir,
    pub client: reqwest::Client,
}

impl TestServer {
    /// Create a new test server instance
    pub async fn new() -> Self {
        // Create temporary directory for test database
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");

        // Create test configuration.
        // Private destinations are allowed so signed flows can run against
        // loopback "remote" instances.
        let config = config::AppConfig {
            server: config::ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0, // Let OS assign port
                domain: "events.test.example".to_string(),
                protocol: "https".to_string(),
            },
            database: config::DatabaseConfig {
                path: db_path.clone(),
            },
            federation: config::FederationConfig {
                delivery_timeout_seconds: 2,
                max_parallel_deliveries: 10,
                key_cache_ttl_seconds: 3600,
                allow_private_destinations: true,
                inbox_rate_limit: 1000,
                inbox_rate_window_seconds: 60,
                expiry_sweep_interval_seconds: 3600,
            },
            instance: config::InstanceConfig {
                title: "Test Instance".to_string(),
                description: "Test Convene Instance".to_string(),
                contact_email: "test@events.test.example".to_string(),
            },
            logging: config::LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        };

        // Initialize app state
        let state = AppState::new(config).await.unwrap();

        // Build router and bind to an ephemeral port
        let app = convene::build_router(state.clone());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        // Create HTTP client
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .unwrap();

        Self {
            addr,
            state,
            _temp_dir: temp_dir,
            client,
        }
    }

    /// Full URL for a path on the test server
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

/// A loopback "remote" federated instance with one actor.
///
/// Serves the actor document (so key fetches resolve) and records every
/// activity delivered to its inbox.
pub struct RemoteActor {
    /// Remote actor URL
    pub actor_url: String,
    /// Remote actor keyId
    pub key_id: String,
    /// Remote actor inbox URL
    pub inbox_url: String,
    /// Private key matching the advertised public key
    pub private_key_pem: String,
    /// Number of inbox deliveries received
    pub inbox_hits: Arc<AtomicUsize>,
    /// Activities delivered to the inbox
    pub deliveries: Arc<Mutex<Vec<serde_json::Value>>>,
}

pub fn generate_test_keypair() -> (String, String) {
    let mut rng = rand::thread_rng();
    let private_key = RsaPrivateKey::new(&mut rng, 1024).expect("key generation should work");
    let public_key = RsaPublicKey::from(&private_key);

    let private_key_pem = private_key
        .to_pkcs8_pem(LineEnding::LF)
        .expect("private key pem")
        .to_string();
    let public_key_pem = public_key
        .to_public_key_pem(LineEnding::LF)
        .expect("public key pem");

    (private_key_pem, public_key_pem)
}

impl RemoteActor {
    /// Spawn a remote instance hosting `/users/{name}` and its inbox.
    pub async fn spawn(name: &str) -> Self {
        let (private_key_pem, public_key_pem) = generate_test_keypair();

        let inbox_hits = Arc::new(AtomicUsize::new(0));
        let deliveries: Arc<Mutex<Vec<serde_json::Value>>> = Arc::new(Mutex::new(Vec::new()));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let actor_url = format!("http://{}/users/{}", addr, name);
        let key_id = format!("{}#main-key", actor_url);
        let inbox_url = format!("{}/inbox", actor_url);

        let actor_document = serde_json::json!({
            "@context": [
                "https://www.w3.org/ns/activitystreams",
                "https://w3id.org/security/v1"
            ],
            "type": "Person",
            "id": actor_url,
            "preferredUsername": name,
            "inbox": inbox_url,
            "publicKey": {
                "id": key_id,
                "owner": actor_url,
                "publicKeyPem": public_key_pem
            }
        });

        let hits_for_route = inbox_hits.clone();
        let deliveries_for_route = deliveries.clone();
        let app = Router::new()
            .route(
                &format!("/users/{}", name),
                get(move || {
                    let doc = actor_document.clone();
                    async move { Json(doc) }
                }),
            )
            .route(
                &format!("/users/{}/inbox", name),
                post(move |Json(activity): Json<serde_json::Value>| {
                    let hits = hits_for_route.clone();
                    let deliveries = deliveries_for_route.clone();
                    async move {
                        hits.fetch_add(1, Ordering::SeqCst);
                        deliveries.lock().await.push(activity);
                        StatusCode::ACCEPTED
                    }
                }),
            );

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            actor_url,
            key_id,
            inbox_url,
            private_key_pem,
            inbox_hits,
            deliveries,
        }
    }

    /// Send a signed activity to the test server's shared inbox.
    ///
    /// Signs with `private_key_pem` (pass a different key to produce a
    /// cryptographically wrong but well-formed signature).
    pub async fn post_signed_activity(
        &self,
        server: &TestServer,
        activity: &serde_json::Value,
        private_key_pem: &str,
    ) -> reqwest::Response {
        let body = serde_json::to_vec(activity).unwrap();
        let inbox_url = server.url("/activitypub/inbox");

        let signed = convene::federation::sign_request(
            "POST",
            &inbox_url,
            Some(&body),
            private_key_pem,
            &self.key_id,
        )
        .expect("signing should succeed");

        let mut request = server
            .client
            .post(&inbox_url)
            .header("Content-Type", "application/activity+json")
            .header("Date", signed.date)
            .header("Signature", signed.signature);

        if let Some(digest) = signed.digest {
            request = request.header("Digest", digest);
        }

        request.body(body).send().await.unwrap()
    }
}
