//! Activity broadcast
//!
//! Fans an activity out to every follower inbox, signing each request
//! individually. Deliveries are independent: one unreachable recipient
//! never blocks the rest, and no retries happen here.

use std::sync::Arc;
use std::time::Duration;

use crate::error::AppError;
use crate::metrics::{ACTIVITIES_SENT_TOTAL, DELIVERIES_TOTAL, DELIVERY_DURATION_SECONDS};

use super::negotiate::ACTIVITY_JSON;

/// Outcome of one delivery attempt
#[derive(Debug, Clone)]
pub struct DeliveryOutcome {
    /// Target inbox URL
    pub inbox_url: String,
    /// Whether delivery succeeded
    pub success: bool,
    /// Error message if failed
    pub error: Option<String>,
}

/// Aggregate result of a broadcast
///
/// Finalized only once every attempt has resolved; callers chaining
/// broadcasts with destructive actions must await the report first.
#[derive(Debug, Clone, Default)]
pub struct DeliveryReport {
    pub attempts: Vec<DeliveryOutcome>,
}

impl DeliveryReport {
    pub fn succeeded(&self) -> usize {
        self.attempts.iter().filter(|a| a.success).count()
    }

    pub fn failed(&self) -> usize {
        self.attempts.len() - self.succeeded()
    }
}

/// Deduplicate identical inbox URLs while keeping distinct personal inboxes.
///
/// This preserves recipients on the same domain that use different inbox paths.
fn unique_inbox_targets(inbox_urls: Vec<String>) -> Vec<String> {
    use std::collections::HashSet;

    let mut seen = HashSet::new();
    let mut targets = Vec::new();

    for inbox_url in inbox_urls {
        if seen.contains(&inbox_url) {
            continue;
        }
        seen.insert(inbox_url.clone());
        targets.push(inbox_url);
    }

    targets
}

/// Broadcasts one actor's activities to remote inboxes.
///
/// Holds the signing identity of a single local actor; the service layer
/// constructs one per operation.
#[derive(Clone)]
pub struct Broadcaster {
    http_client: Arc<reqwest::Client>,
    /// Key ID for signatures (actor URL + #main-key)
    key_id: String,
    /// Private key for signing
    private_key_pem: String,
    /// Per-recipient delivery timeout
    delivery_timeout: Duration,
    /// Concurrent delivery ceiling
    max_parallel: usize,
}

impl Broadcaster {
    pub fn new(
        http_client: Arc<reqwest::Client>,
        key_id: String,
        private_key_pem: String,
        delivery_timeout: Duration,
        max_parallel: usize,
    ) -> Self {
        Self {
            http_client,
            key_id,
            private_key_pem,
            delivery_timeout,
            max_parallel: max_parallel.max(1),
        }
    }

    /// Deliver an activity to a single inbox.
    ///
    /// Builds a fresh signature per call: Host and Digest differ per target.
    pub async fn deliver_to_inbox(
        &self,
        inbox_url: &str,
        activity: &serde_json::Value,
    ) -> Result<(), AppError> {
        // 1. Serialize activity
        let body = serde_json::to_vec(activity)
            .map_err(|e| AppError::Validation(format!("Failed to serialize activity: {}", e)))?;

        // 2. Sign request
        let sig_headers = super::signature::sign_request(
            "POST",
            inbox_url,
            Some(&body),
            &self.private_key_pem,
            &self.key_id,
        )?;

        // 3. POST to inbox with signed headers
        let mut request = self
            .http_client
            .post(inbox_url)
            .header("Content-Type", ACTIVITY_JSON)
            .header("Date", sig_headers.date)
            .header("Signature", sig_headers.signature);

        if let Some(digest) = sig_headers.digest {
            request = request.header("Digest", digest);
        }

        let response = request.body(body).send().await.map_err(|e| {
            AppError::Federation(format!("Failed to deliver to {}: {}", inbox_url, e))
        })?;

        // 4. Handle response
        if !response.status().is_success() {
            return Err(AppError::Federation(format!(
                "Inbox {} rejected activity: HTTP {}",
                inbox_url,
                response.status()
            )));
        }

        tracing::debug!("Delivered activity to {}", inbox_url);
        Ok(())
    }

    /// Broadcast an activity to every follower inbox.
    ///
    /// Scatter/gather behind a semaphore: each target is attempted
    /// independently with a bounded timeout, and the report is returned
    /// only after all attempts resolve. Failed deliveries are recorded and
    /// logged, never raised.
    pub async fn broadcast(
        &self,
        activity: serde_json::Value,
        inbox_urls: Vec<String>,
    ) -> DeliveryReport {
        use tokio::sync::Semaphore;

        if let Some(activity_type) = activity.get("type").and_then(|t| t.as_str()) {
            ACTIVITIES_SENT_TOTAL
                .with_label_values(&[activity_type])
                .inc();
        }

        // Deduplicate exact inbox URLs only.
        // Grouping by domain can drop recipients that have distinct personal inboxes.
        let total_targets = inbox_urls.len();
        let delivery_targets = unique_inbox_targets(inbox_urls);

        tracing::info!(
            "Broadcasting to {} unique inboxes (deduplicated from {} total)",
            delivery_targets.len(),
            total_targets
        );

        let semaphore = Arc::new(Semaphore::new(self.max_parallel));
        let activity = Arc::new(activity);

        let mut tasks = Vec::new();

        for inbox_url in delivery_targets {
            let semaphore = semaphore.clone();
            let activity = activity.clone();
            let broadcaster = self.clone();

            let task = tokio::spawn(async move {
                let _permit = semaphore.acquire().await.expect("semaphore open");

                let timer = std::time::Instant::now();
                let result = tokio::time::timeout(
                    broadcaster.delivery_timeout,
                    broadcaster.deliver_to_inbox(&inbox_url, &activity),
                )
                .await;

                let outcome = match result {
                    Ok(Ok(())) => DeliveryOutcome {
                        inbox_url: inbox_url.clone(),
                        success: true,
                        error: None,
                    },
                    Ok(Err(e)) => DeliveryOutcome {
                        inbox_url: inbox_url.clone(),
                        success: false,
                        error: Some(e.to_string()),
                    },
                    Err(_) => DeliveryOutcome {
                        inbox_url: inbox_url.clone(),
                        success: false,
                        error: Some(format!(
                            "Delivery to {} timed out after {:?}",
                            inbox_url, broadcaster.delivery_timeout
                        )),
                    },
                };

                let label = if outcome.success { "success" } else { "failure" };
                DELIVERIES_TOTAL.with_label_values(&[label]).inc();
                DELIVERY_DURATION_SECONDS
                    .with_label_values(&[label])
                    .observe(timer.elapsed().as_secs_f64());

                if let Some(ref error) = outcome.error {
                    tracing::warn!(inbox_url = %outcome.inbox_url, %error, "Delivery failed");
                }

                outcome
            });

            tasks.push(task);
        }

        // Collect results; the report is final only after every task resolves.
        let mut report = DeliveryReport::default();
        for task in tasks {
            if let Ok(outcome) = task.await {
                report.attempts.push(outcome);
            }
        }

        tracing::info!(
            "Broadcast complete: {} succeeded, {} failed",
            report.succeeded(),
            report.failed()
        );

        report
    }
}
