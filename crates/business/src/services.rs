//! Service context
//!
//! Shared state for every business service: the pool, configuration, rate
//! limiters and the accounting client. Services borrow it for the length of
//! a call (`LedgerService::new(&ctx)`).

use crate::accounting::{AccountingClient, HttpAccountingClient};
use crate::config::{ConfigLoader, LedgerConfig};
use crate::error::{BusinessError, BusinessResult};
use crate::rate_limit::RateLimiter;
use fanledger_core::CommissionPolicy;
use fanledger_persistence::Database;
use sqlx::{Sqlite, SqlitePool, Transaction};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Context for business operations
pub struct ServiceContext {
    pool: SqlitePool,
    config: Arc<LedgerConfig>,
    spend_limiter: Arc<RateLimiter>,
    registration_limiter: Arc<RateLimiter>,
    accounting: Option<Arc<dyn AccountingClient>>,
}

impl ServiceContext {
    /// Build the context; an HTTP accounting client is created when an
    /// endpoint is configured.
    pub fn new(db: &Database, config: LedgerConfig) -> BusinessResult<Self> {
        ConfigLoader::validate(&config)?;

        let accounting: Option<Arc<dyn AccountingClient>> = match &config.accounting.endpoint {
            Some(endpoint) => Some(Arc::new(HttpAccountingClient::new(
                endpoint,
                config.accounting.api_key.clone(),
                config.accounting.timeout(),
            )?)),
            None => None,
        };

        let limits = &config.rate_limit;
        let spend_limiter = Arc::new(RateLimiter::new(
            limits.spend_limit,
            Duration::from_secs(limits.spend_window_secs),
        ));
        let registration_limiter = Arc::new(RateLimiter::new(
            limits.registration_limit,
            Duration::from_secs(limits.registration_window_secs),
        ));

        Ok(Self {
            pool: db.pool().clone(),
            config: Arc::new(config),
            spend_limiter,
            registration_limiter,
            accounting,
        })
    }

    /// Replace the accounting client (tests, alternative transports)
    pub fn with_accounting_client(mut self, client: Arc<dyn AccountingClient>) -> Self {
        self.accounting = Some(client);
        self
    }

    pub fn without_accounting(mut self) -> Self {
        self.accounting = None;
        self
    }

    /// Get database pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn commission_policy(&self) -> CommissionPolicy {
        self.config.commission_policy()
    }

    /// Limiter for spend-triggering fan actions, keyed by user id
    pub fn spend_limiter(&self) -> &Arc<RateLimiter> {
        &self.spend_limiter
    }

    /// Limiter for registration attempts, keyed by client IP
    pub fn registration_limiter(&self) -> &Arc<RateLimiter> {
        &self.registration_limiter
    }

    pub fn accounting(&self) -> Option<&Arc<dyn AccountingClient>> {
        self.accounting.as_ref()
    }

    /// Check a registration attempt from `ip`
    pub fn check_registration(&self, ip: &str) -> BusinessResult<()> {
        let decision = self.registration_limiter.check(ip);
        if decision.allowed {
            Ok(())
        } else {
            tracing::warn!(ip, "registration rate limited");
            Err(BusinessError::RateLimited {
                key: ip.to_string(),
                reset_in: decision.reset_in,
            })
        }
    }

    /// Run `op` inside a sqlx transaction, re-running it from scratch when it
    /// fails with a retryable error (balance version conflict, SQLite busy).
    ///
    /// `op` receives the open transaction and hands it back together with its
    /// result; the transaction is committed only on `Ok`.
    pub async fn run_in_transaction<T, F, Fut>(&self, mut op: F) -> BusinessResult<T>
    where
        F: FnMut(Transaction<'static, Sqlite>) -> Fut,
        Fut: Future<Output = (Transaction<'static, Sqlite>, BusinessResult<T>)>,
    {
        let max_attempts = self.config.ledger.max_cas_retries.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            let tx = self.pool.begin().await?;
            let (tx, result) = op(tx).await;

            let err = match result {
                Ok(value) => match tx.commit().await {
                    Ok(()) => return Ok(value),
                    Err(e) => BusinessError::from(e),
                },
                Err(e) => {
                    if let Err(rollback_err) = tx.rollback().await {
                        tracing::warn!(error = %rollback_err, "rollback failed");
                    }
                    e
                }
            };

            if err.is_retryable() && attempt < max_attempts {
                tracing::debug!(attempt, error = %err, "retrying transaction");
                tokio::time::sleep(Duration::from_millis(5 * u64::from(attempt))).await;
                continue;
            }
            return Err(err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_context_without_endpoint_has_no_accounting() {
        let db = Database::in_memory().await.unwrap();
        let ctx = ServiceContext::new(&db, LedgerConfig::default()).unwrap();
        assert!(ctx.accounting().is_none());
        assert_eq!(ctx.spend_limiter().limit(), 10);
    }

    #[tokio::test]
    async fn test_context_rejects_zero_sweep_interval() {
        let db = Database::in_memory().await.unwrap();
        let mut config = LedgerConfig::default();
        config.accounting.sweep_interval_secs = 0;

        let err = ServiceContext::new(&db, config).err().unwrap();
        assert!(matches!(err, BusinessError::Config(_)));
    }

    #[tokio::test]
    async fn test_registration_limit_per_ip() {
        let db = Database::in_memory().await.unwrap();
        let config = ConfigLoader::load_str("[rate_limit]\nregistration_limit = 2").unwrap();
        let ctx = ServiceContext::new(&db, config).unwrap();

        assert!(ctx.check_registration("10.0.0.1").is_ok());
        assert!(ctx.check_registration("10.0.0.1").is_ok());
        assert!(matches!(
            ctx.check_registration("10.0.0.1"),
            Err(BusinessError::RateLimited { .. })
        ));
        assert!(ctx.check_registration("10.0.0.2").is_ok());
    }

    #[tokio::test]
    async fn test_transaction_retries_retryable_errors() {
        let db = Database::in_memory().await.unwrap();
        let ctx = ServiceContext::new(&db, LedgerConfig::default()).unwrap();
        let mut calls = 0;

        let result = ctx
            .run_in_transaction(|tx| {
                calls += 1;
                let call = calls;
                async move {
                    if call < 3 {
                        (tx, Err(BusinessError::Contention { user_id: "u".into() }))
                    } else {
                        (tx, Ok(call))
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(result, 3);
    }

    #[tokio::test]
    async fn test_transaction_gives_up_after_max_attempts() {
        let db = Database::in_memory().await.unwrap();
        let ctx = ServiceContext::new(&db, LedgerConfig::default()).unwrap();
        let mut calls = 0;

        let err = ctx
            .run_in_transaction(|tx| {
                calls += 1;
                async move { (tx, Err::<(), _>(BusinessError::Contention { user_id: "u".into() })) }
            })
            .await
            .unwrap_err();

        assert!(matches!(err, BusinessError::Contention { .. }));
        assert_eq!(calls, 5);
    }
}
