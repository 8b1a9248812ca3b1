//! Accounting export
//!
//! Every completed payment is reported to the external accounting system.
//! The first attempt happens inline after the payment commits; a failure
//! leaves a durable row in `accounting_queue` that the sweeper retries with
//! exponential backoff until it succeeds or runs out of attempts.

use crate::error::BusinessResult;
use crate::services::ServiceContext;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use fanledger_core::QueueStatus;
use fanledger_persistence::{AccountingQueueRepo, AccountingQueueRow, PaymentRow, PersistenceResult};
use http_body_util::Full;
use hyper::header::{AUTHORIZATION, CONTENT_TYPE};
use hyper::{Method, Request, Uri};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;

/// Lease added on top of the request timeout when an entry is claimed
const LEASE_GRACE_SECS: i64 = 60;

/// Record sent to the accounting endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountingPayload {
    /// Our payment id
    pub external_id: String,
    pub provider: String,
    pub amount_usd: Decimal,
    pub amount_crypto: Option<Decimal>,
    pub crypto_currency: Option<String>,
    pub product_type: String,
    pub status: String,
    pub payment_date: DateTime<Utc>,
    pub user_id: String,
    pub metadata: serde_json::Value,
}

impl AccountingPayload {
    pub fn from_payment(payment: &PaymentRow) -> PersistenceResult<Self> {
        Ok(Self {
            external_id: payment.id.clone(),
            provider: payment.provider.clone(),
            amount_usd: payment.usd()?,
            amount_crypto: payment.crypto()?,
            crypto_currency: payment.crypto_currency.clone(),
            product_type: payment.payment_type.clone(),
            status: payment.status.clone(),
            payment_date: payment.completed_at.unwrap_or(payment.created_at),
            user_id: payment.user_id.clone(),
            metadata: payment.metadata_json()?,
        })
    }
}

/// Error type for export attempts
#[derive(Debug, Clone, Error)]
pub enum ExportError {
    #[error("timeout")]
    Timeout,

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("accounting endpoint returned HTTP {0}")]
    Status(u16),

    #[error("request failed: {0}")]
    Request(String),

    #[error("invalid queued payload: {0}")]
    InvalidPayload(String),
}

/// Destination for accounting records
#[async_trait]
pub trait AccountingClient: Send + Sync {
    async fn submit(&self, payload: &AccountingPayload) -> Result<(), ExportError>;
}

/// JSON-over-HTTP accounting client
#[derive(Clone)]
pub struct HttpAccountingClient {
    client: Client<HttpConnector, Full<Bytes>>,
    endpoint: Uri,
    api_key: Option<String>,
    timeout: Duration,
}

impl HttpAccountingClient {
    pub fn new(endpoint: &str, api_key: Option<String>, timeout: Duration) -> Result<Self, ExportError> {
        let endpoint: Uri = endpoint
            .parse()
            .map_err(|e| ExportError::Request(format!("invalid endpoint '{}': {}", endpoint, e)))?;

        let mut connector = HttpConnector::new();
        connector.set_nodelay(true);
        connector.set_connect_timeout(Some(timeout));

        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(Duration::from_secs(90))
            .build(connector);

        Ok(Self {
            client,
            endpoint,
            api_key,
            timeout,
        })
    }

    pub fn endpoint(&self) -> &Uri {
        &self.endpoint
    }
}

#[async_trait]
impl AccountingClient for HttpAccountingClient {
    async fn submit(&self, payload: &AccountingPayload) -> Result<(), ExportError> {
        let body = serde_json::to_vec(payload).map_err(|e| ExportError::Request(e.to_string()))?;

        let mut builder = Request::builder()
            .method(Method::POST)
            .uri(self.endpoint.clone())
            .header(CONTENT_TYPE, "application/json");
        if let Some(key) = &self.api_key {
            builder = builder.header(AUTHORIZATION, format!("Bearer {}", key));
        }
        let request = builder
            .body(Full::new(Bytes::from(body)))
            .map_err(|e| ExportError::Request(e.to_string()))?;

        let response = tokio::time::timeout(self.timeout, self.client.request(request))
            .await
            .map_err(|_| ExportError::Timeout)?
            .map_err(|e| ExportError::Connection(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ExportError::Status(status.as_u16()));
        }
        Ok(())
    }
}

/// Delay before the next retry once an entry has been tried `attempts` times
pub fn retry_delay(attempts: i64) -> Duration {
    let exponent = attempts.clamp(0, 16) as u32;
    Duration::from_secs(60 * 2u64.pow(exponent))
}

/// Result of the inline export attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportOutcome {
    /// Accepted by the accounting endpoint
    Sent,
    /// Persisted for the sweeper
    Queued { entry_id: String },
    /// No accounting endpoint configured
    Skipped,
}

/// Counters from one sweep
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// PROCESSING entries whose lease expired and went back to PENDING
    pub requeued: u64,
    pub attempted: u32,
    pub completed: u32,
    pub rescheduled: u32,
    pub failed: u32,
    /// Claimed by another sweeper first
    pub skipped: u32,
}

/// Queue size per status
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub pending: i64,
    pub processing: i64,
    pub completed: i64,
    pub failed: i64,
}

/// Accounting export service
pub struct AccountingExporter<'a> {
    ctx: &'a ServiceContext,
}

impl<'a> AccountingExporter<'a> {
    pub fn new(ctx: &'a ServiceContext) -> Self {
        Self { ctx }
    }

    /// Try the export once; on failure persist it for the sweeper.
    pub async fn export_or_enqueue(
        &self,
        payment_id: &str,
        payload: &AccountingPayload,
    ) -> BusinessResult<ExportOutcome> {
        let Some(client) = self.ctx.accounting() else {
            tracing::debug!(payment_id, "accounting export disabled, skipping");
            return Ok(ExportOutcome::Skipped);
        };

        let err = match client.submit(payload).await {
            Ok(()) => {
                tracing::info!(payment_id, "accounting export sent");
                return Ok(ExportOutcome::Sent);
            }
            Err(err) => err,
        };

        let now = Utc::now();
        let entry = AccountingQueueRow {
            id: uuid::Uuid::new_v4().to_string(),
            payment_id: payment_id.to_string(),
            payload: serde_json::to_string(payload).map_err(fanledger_persistence::PersistenceError::from)?,
            status: QueueStatus::Pending.as_str().to_string(),
            attempts: 1,
            last_error: Some(err.to_string()),
            next_retry_at: now.timestamp() + self.ctx.config().accounting.initial_retry_secs as i64,
            created_at: now,
            updated_at: now,
        };
        AccountingQueueRepo::insert(self.ctx.pool(), &entry).await?;

        tracing::warn!(
            payment_id,
            entry_id = %entry.id,
            error = %err,
            "accounting export failed, queued for retry"
        );
        Ok(ExportOutcome::Queued { entry_id: entry.id })
    }

    /// Build the payload from the stored payment and export it
    pub async fn export_payment(&self, payment: &PaymentRow) -> BusinessResult<ExportOutcome> {
        let payload = AccountingPayload::from_payment(payment)?;
        self.export_or_enqueue(&payment.id, &payload).await
    }

    /// Retry every due entry once.
    ///
    /// Entries left PROCESSING by a crashed sweeper are returned to PENDING
    /// first, once their lease has passed.
    pub async fn process_queue(&self, now: DateTime<Utc>) -> BusinessResult<SweepReport> {
        let pool = self.ctx.pool();
        let settings = &self.ctx.config().accounting;
        let now_ts = now.timestamp();

        let mut report = SweepReport {
            requeued: AccountingQueueRepo::requeue_expired(pool, now_ts).await?,
            ..SweepReport::default()
        };

        let Some(client) = self.ctx.accounting() else {
            return Ok(report);
        };

        let max_attempts = i64::from(settings.max_attempts);
        let due = AccountingQueueRepo::get_due(
            pool,
            now_ts,
            max_attempts,
            i64::from(settings.batch_size),
        )
        .await?;

        for entry in due {
            let lease_until = lease_deadline(now_ts, Utc::now().timestamp(), settings.timeout_secs);
            if !AccountingQueueRepo::claim(pool, &entry.id, lease_until).await? {
                report.skipped += 1;
                continue;
            }
            report.attempted += 1;

            let attempts = entry.attempts + 1;
            let result = match serde_json::from_str::<AccountingPayload>(&entry.payload) {
                Ok(payload) => client.submit(&payload).await,
                Err(e) => Err(ExportError::InvalidPayload(e.to_string())),
            };

            match result {
                Ok(()) => {
                    AccountingQueueRepo::mark_completed(pool, &entry.id, attempts).await?;
                    report.completed += 1;
                    tracing::info!(entry_id = %entry.id, payment_id = %entry.payment_id, attempts, "accounting export retried successfully");
                }
                Err(err) if attempts >= max_attempts => {
                    AccountingQueueRepo::record_failure(
                        pool,
                        &entry.id,
                        QueueStatus::Failed,
                        attempts,
                        &err.to_string(),
                        now_ts,
                    )
                    .await?;
                    report.failed += 1;
                    tracing::error!(
                        target: "fanledger::alert",
                        entry_id = %entry.id,
                        payment_id = %entry.payment_id,
                        attempts,
                        error = %err,
                        "accounting export gave up; manual reconciliation required"
                    );
                }
                Err(err) => {
                    let next_retry_at = now_ts + retry_delay(attempts).as_secs() as i64;
                    AccountingQueueRepo::record_failure(
                        pool,
                        &entry.id,
                        QueueStatus::Pending,
                        attempts,
                        &err.to_string(),
                        next_retry_at,
                    )
                    .await?;
                    report.rescheduled += 1;
                    tracing::warn!(entry_id = %entry.id, attempts, next_retry_at, error = %err, "accounting export retry failed");
                }
            }
        }

        Ok(report)
    }

    pub async fn list_by_status(&self, status: QueueStatus) -> BusinessResult<Vec<AccountingQueueRow>> {
        Ok(AccountingQueueRepo::get_by_status(self.ctx.pool(), status).await?)
    }

    pub async fn queue_stats(&self) -> BusinessResult<QueueStats> {
        let mut stats = QueueStats::default();
        for (status, count) in AccountingQueueRepo::count_by_status(self.ctx.pool()).await? {
            match QueueStatus::from_str(&status) {
                Some(QueueStatus::Pending) => stats.pending = count,
                Some(QueueStatus::Processing) => stats.processing = count,
                Some(QueueStatus::Completed) => stats.completed = count,
                Some(QueueStatus::Failed) => stats.failed = count,
                None => tracing::warn!(status = %status, count, "unknown accounting queue status"),
            }
        }
        Ok(stats)
    }
}

/// Lease for an entry claimed now; never earlier than the sweep's own clock
fn lease_deadline(sweep_ts: i64, claim_ts: i64, timeout_secs: u64) -> i64 {
    sweep_ts.max(claim_ts) + timeout_secs as i64 + LEASE_GRACE_SECS
}

/// Sweep the queue on a tokio interval until the task is aborted
pub fn spawn_sweeper(ctx: Arc<ServiceContext>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            match AccountingExporter::new(&ctx).process_queue(Utc::now()).await {
                Ok(report) if report.attempted > 0 || report.requeued > 0 => {
                    tracing::info!(?report, "accounting sweep finished");
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = %e, "accounting sweep failed"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;
    use hyper::body::Incoming;
    use hyper::{Response, StatusCode};
    use hyper_util::rt::TokioIo;
    use rust_decimal_macros::dec;
    use std::sync::Mutex;
    use tokio::sync::oneshot;

    fn payload() -> AccountingPayload {
        AccountingPayload {
            external_id: "pay_1".to_string(),
            provider: "stripe".to_string(),
            amount_usd: dec!(9.99),
            amount_crypto: None,
            crypto_currency: None,
            product_type: "CREDIT_PURCHASE".to_string(),
            status: "COMPLETED".to_string(),
            payment_date: Utc::now(),
            user_id: "fan_1".to_string(),
            metadata: serde_json::json!({ "package": "starter" }),
        }
    }

    /// Accept one connection and answer every request with `status`
    async fn spawn_endpoint(status: StatusCode) -> (String, oneshot::Receiver<Bytes>) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel();
        let tx = Mutex::new(Some(tx));

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let service = hyper::service::service_fn(move |req: Request<Incoming>| {
                let sender = tx.lock().unwrap().take();
                async move {
                    let body = req.into_body().collect().await?.to_bytes();
                    if let Some(sender) = sender {
                        let _ = sender.send(body);
                    }
                    Ok::<_, hyper::Error>(
                        Response::builder()
                            .status(status)
                            .body(Full::new(Bytes::new()))
                            .unwrap(),
                    )
                }
            });
            let _ = hyper::server::conn::http1::Builder::new()
                .serve_connection(TokioIo::new(stream), service)
                .await;
        });

        (format!("http://{}/api/transactions", addr), rx)
    }

    #[test]
    fn test_payload_is_camel_case() {
        let json = serde_json::to_value(payload()).unwrap();
        assert_eq!(json["externalId"], "pay_1");
        assert_eq!(json["amountUsd"], "9.99");
        assert_eq!(json["productType"], "CREDIT_PURCHASE");
        assert!(json.get("paymentDate").is_some());
        assert!(json.get("amount_usd").is_none());
    }

    #[test]
    fn test_lease_counts_from_claim_time() {
        assert_eq!(lease_deadline(1_000, 1_000, 10), 1_000 + 10 + LEASE_GRACE_SECS);
        // A long batch: the claim happens well after the sweep started
        assert_eq!(lease_deadline(1_000, 1_500, 10), 1_500 + 10 + LEASE_GRACE_SECS);
        // Sweeps driven by a later clock keep their own timestamp
        assert_eq!(lease_deadline(2_000, 1_500, 10), 2_000 + 10 + LEASE_GRACE_SECS);
    }

    #[test]
    fn test_retry_delay_doubles() {
        assert_eq!(retry_delay(1), Duration::from_secs(120));
        assert_eq!(retry_delay(2), Duration::from_secs(240));
        assert_eq!(retry_delay(4), Duration::from_secs(960));
    }

    #[tokio::test]
    async fn test_http_client_posts_json() {
        let (endpoint, received) = spawn_endpoint(StatusCode::OK).await;
        let client = HttpAccountingClient::new(&endpoint, Some("secret".into()), Duration::from_secs(5)).unwrap();

        client.submit(&payload()).await.unwrap();

        let body = received.await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["externalId"], "pay_1");
        assert_eq!(json["userId"], "fan_1");
    }

    #[tokio::test]
    async fn test_http_client_non_2xx_is_failure() {
        let (endpoint, _received) = spawn_endpoint(StatusCode::INTERNAL_SERVER_ERROR).await;
        let client = HttpAccountingClient::new(&endpoint, None, Duration::from_secs(5)).unwrap();

        let err = client.submit(&payload()).await.unwrap_err();
        assert!(matches!(err, ExportError::Status(500)));
    }

    #[tokio::test]
    async fn test_http_client_unreachable_is_failure() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = HttpAccountingClient::new(
            &format!("http://{}/api/transactions", addr),
            None,
            Duration::from_secs(2),
        )
        .unwrap();

        let err = client.submit(&payload()).await.unwrap_err();
        assert!(matches!(err, ExportError::Connection(_) | ExportError::Timeout));
    }
}
