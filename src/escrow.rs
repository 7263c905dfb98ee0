//! Boundary to the payment/escrow processor that actually moves held funds.

use std::time::Duration;

use async_trait::async_trait;
use backoff::future::retry_notify;
use backoff::Error as BackoffError;
use backoff::ExponentialBackoff;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReleaseInstruction {
    /// The unlock request id. Re-sending the same key must not move funds twice.
    pub idempotency_key: Uuid,
    pub project_id: Uuid,
    pub milestone_id: Uuid,
    pub amount: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReceiptId(pub String);

#[derive(Debug, Clone, Error)]
pub enum EscrowError {
    /// Worth retrying: timeouts, connection failures, 5xx, 429.
    #[error("transient escrow failure: {0}")]
    Transient(String),
    /// The processor refused the release.
    #[error("escrow release rejected: {0}")]
    Rejected(String),
}

#[async_trait]
pub trait EscrowGateway: Send + Sync {
    async fn release(&self, instruction: &ReleaseInstruction) -> Result<ReceiptId, EscrowError>;
}

#[derive(Debug, Clone)]
pub struct EscrowRetryPolicy {
    pub attempt_timeout: Duration,
    pub max_attempts: u32,
    pub initial_interval: Duration,
    pub max_interval: Duration,
    /// Upper bound on the whole release, backoff sleeps included. The
    /// decision transaction stays open for this long at most.
    pub deadline: Duration,
}

impl Default for EscrowRetryPolicy {
    fn default() -> Self {
        Self {
            attempt_timeout: Duration::from_secs(10),
            max_attempts: 3,
            initial_interval: Duration::from_millis(500),
            max_interval: Duration::from_secs(5),
            deadline: Duration::from_secs(20),
        }
    }
}

// --- Backoff notification handler ---
fn escrow_notify_handler(err: EscrowError, duration: Duration) {
    tracing::warn!(
        "Escrow release failed: {}. Retrying in {:.1}s...",
        err,
        duration.as_secs_f32()
    );
}

/// Calls the gateway with a per-attempt timeout and exponential backoff,
/// giving up after `policy.max_attempts` transient failures or once
/// `policy.deadline` has passed, whichever comes first.
#[tracing::instrument(
    skip_all,
    fields(request_id = %instruction.idempotency_key, amount = instruction.amount)
)]
pub async fn release_with_retry(
    gateway: &dyn EscrowGateway,
    instruction: &ReleaseInstruction,
    policy: &EscrowRetryPolicy,
) -> Result<ReceiptId, EscrowError> {
    let max_attempts = policy.max_attempts.max(1);
    let backoff = ExponentialBackoff {
        current_interval: policy.initial_interval,
        initial_interval: policy.initial_interval,
        max_interval: policy.max_interval,
        max_elapsed_time: None,
        ..ExponentialBackoff::default()
    };

    let mut attempts = 0u32;
    let release = retry_notify(
        backoff,
        || {
            attempts += 1;
            let attempt = attempts;
            async move {
                let outcome = match tokio::time::timeout(
                    policy.attempt_timeout,
                    gateway.release(instruction),
                )
                .await
                {
                    Ok(result) => result,
                    Err(_) => Err(EscrowError::Transient(format!(
                        "no response within {:?}",
                        policy.attempt_timeout
                    ))),
                };

                match outcome {
                    Ok(receipt) => Ok(receipt),
                    Err(err @ EscrowError::Transient(_)) if attempt < max_attempts => {
                        Err(BackoffError::transient(err))
                    }
                    Err(err) => Err(BackoffError::permanent(err)),
                }
            }
        },
        escrow_notify_handler,
    );

    match tokio::time::timeout(policy.deadline, release).await {
        Ok(outcome) => outcome,
        Err(_) => Err(EscrowError::Transient(format!(
            "release not confirmed within {:?}",
            policy.deadline
        ))),
    }
}

/// Talks to an escrow processor exposing `POST {base}/releases`.
#[derive(Debug, Clone)]
pub struct HttpEscrowGateway {
    client: Client,
    releases_url: Url,
}

#[derive(Debug, Deserialize)]
struct ReleaseResponse {
    receipt_id: String,
}

impl HttpEscrowGateway {
    pub fn new(base_url: &Url, client: Client) -> Result<Self, url::ParseError> {
        // Keep any path prefix on the base URL.
        let mut base = base_url.clone();
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self {
            client,
            releases_url: base.join("releases")?,
        })
    }
}

#[async_trait]
impl EscrowGateway for HttpEscrowGateway {
    async fn release(&self, instruction: &ReleaseInstruction) -> Result<ReceiptId, EscrowError> {
        let response = self
            .client
            .post(self.releases_url.clone())
            .header("Idempotency-Key", instruction.idempotency_key.to_string())
            .json(instruction)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() || err.is_connect() || err.is_request() {
                    EscrowError::Transient(err.to_string())
                } else {
                    EscrowError::Rejected(err.to_string())
                }
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            return Err(EscrowError::Transient(format!(
                "escrow processor returned {}",
                status
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EscrowError::Rejected(format!("{}: {}", status, body)));
        }

        let body: ReleaseResponse = response
            .json()
            .await
            .map_err(|err| EscrowError::Rejected(format!("unreadable receipt: {}", err)))?;
        Ok(ReceiptId(body.receipt_id))
    }
}
