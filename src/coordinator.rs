use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use crate::error::{AppError, Result};
use crate::fingerprint::PayloadFingerprint;
use crate::observability::{get_metrics, mask_sensitive, LatencyTimer};
use crate::store::{CachedOutcome, LockAcquisition, LockStore, ResponseStore};

/// The original request, as handed to the wrapped business handler.
#[derive(Debug, Clone)]
pub struct HandlerRequest {
    pub payload: Option<serde_json::Value>,
}

/// Result of a handler execution.
///
/// A `Cacheable` outcome exposes a status code and a serializable body and is
/// memoized for replay. Anything else is `Opaque`: passed through unchanged
/// and never cached, so a retried request will re-execute.
#[derive(Debug, Clone, PartialEq)]
pub enum HandlerOutcome {
    Cacheable {
        status_code: u16,
        body: serde_json::Value,
    },
    Opaque(serde_json::Value),
}

/// The side-effecting business operation guarded by the coordinator.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Handler: Send + Sync {
    async fn execute(&self, request: HandlerRequest) -> Result<HandlerOutcome>;
}

/// What the coordinator hands back to the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum IdempotentResponse {
    /// A previously captured outcome, returned verbatim without invoking
    /// the handler.
    Replayed(CachedOutcome),
    /// A freshly produced handler result.
    Fresh(HandlerOutcome),
}

impl IdempotentResponse {
    pub fn was_replayed(&self) -> bool {
        matches!(self, IdempotentResponse::Replayed(_))
    }
}

/// TTL configuration for the coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// How long a captured outcome is replayable.
    pub response_ttl_seconds: i64,
    /// Failsafe TTL on the execution lock, bounding the blast radius of a
    /// crash mid-execution.
    pub lock_ttl_seconds: i64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            response_ttl_seconds: 900, // 15 minutes
            lock_ttl_seconds: 120,     // 2 minutes
        }
    }
}

/// In-process counters for idempotency handling.
#[derive(Debug, Default)]
pub struct IdempotencyMetrics {
    pub total_requests: AtomicU64,
    pub replayed_requests: AtomicU64,
    pub conflict_requests: AtomicU64,
    pub mismatch_requests: AtomicU64,
    pub executed_requests: AtomicU64,
    pub failed_executions: AtomicU64,
}

impl IdempotencyMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_replay(&self) {
        self.replayed_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_conflict(&self) {
        self.conflict_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_mismatch(&self) {
        self.mismatch_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_execution(&self) {
        self.executed_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed_execution(&self) {
        self.failed_executions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn replay_rate(&self) -> f64 {
        let total = self.total_requests.load(Ordering::Relaxed);
        let replayed = self.replayed_requests.load(Ordering::Relaxed);
        if total == 0 {
            0.0
        } else {
            replayed as f64 / total as f64
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            replayed_requests: self.replayed_requests.load(Ordering::Relaxed),
            conflict_requests: self.conflict_requests.load(Ordering::Relaxed),
            mismatch_requests: self.mismatch_requests.load(Ordering::Relaxed),
            executed_requests: self.executed_requests.load(Ordering::Relaxed),
            failed_executions: self.failed_executions.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub replayed_requests: u64,
    pub conflict_requests: u64,
    pub mismatch_requests: u64,
    pub executed_requests: u64,
    pub failed_executions: u64,
}

/// Scoped release of an execution lock.
///
/// Normal paths call `release` explicitly. If the future is dropped before
/// that (caller cancellation, panic unwind), `Drop` schedules the release on
/// the runtime so a lock is never orphaned until its failsafe TTL.
struct LockReleaseGuard {
    lock_store: Arc<dyn LockStore>,
    key: String,
    released: bool,
}

impl LockReleaseGuard {
    fn new(lock_store: Arc<dyn LockStore>, key: String) -> Self {
        Self {
            lock_store,
            key,
            released: false,
        }
    }

    async fn release(mut self) {
        self.released = true;
        if let Err(e) = self.lock_store.release(&self.key).await {
            tracing::error!(
                key = %mask_sensitive(&self.key, 4),
                "failed to release execution lock: {}",
                e
            );
        }
    }
}

impl Drop for LockReleaseGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let store = Arc::clone(&self.lock_store);
        let key = std::mem::take(&mut self.key);
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                if let Err(e) = store.release(&key).await {
                    tracing::error!("failed to release execution lock on drop: {}", e);
                }
            });
        }
    }
}

/// Orchestrates idempotent execution of a side-effecting handler.
///
/// Per request: validate the idempotency key, fingerprint the payload, replay
/// a cached outcome when one exists, otherwise acquire the execution lock,
/// run the handler exactly once, capture the result, and release the lock on
/// every exit path.
pub struct IdempotencyCoordinator {
    response_store: Arc<dyn ResponseStore>,
    lock_store: Arc<dyn LockStore>,
    handler: Arc<dyn Handler>,
    config: CoordinatorConfig,
    metrics: Arc<IdempotencyMetrics>,
}

impl IdempotencyCoordinator {
    pub fn new(
        response_store: Arc<dyn ResponseStore>,
        lock_store: Arc<dyn LockStore>,
        handler: Arc<dyn Handler>,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            response_store,
            lock_store,
            handler,
            config,
            metrics: Arc::new(IdempotencyMetrics::new()),
        }
    }

    pub fn metrics(&self) -> Arc<IdempotencyMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Runs one request through the idempotency state machine.
    pub async fn execute(
        &self,
        idempotency_key: Option<&str>,
        payload: Option<serde_json::Value>,
    ) -> Result<IdempotentResponse> {
        self.metrics.record_request();
        get_metrics().record_request();

        let key = match idempotency_key.map(str::trim).filter(|k| !k.is_empty()) {
            Some(key) => key,
            None => {
                get_metrics().record_missing_key();
                return Err(AppError::MissingKey);
            }
        };

        let fingerprint = PayloadFingerprint::compute(payload.as_ref());

        if let Some(cached) = self.response_store.get(key).await? {
            if cached.fingerprint == fingerprint {
                self.metrics.record_replay();
                get_metrics().record_replay();
                tracing::debug!(key = %mask_sensitive(key, 4), "replaying cached outcome");
                return Ok(IdempotentResponse::Replayed(cached));
            }
            self.metrics.record_mismatch();
            get_metrics().record_mismatch();
            tracing::warn!(
                key = %mask_sensitive(key, 4),
                "idempotency key reused with a different payload"
            );
            return Err(AppError::PayloadMismatch);
        }

        match self
            .lock_store
            .try_acquire(key, &fingerprint, self.config.lock_ttl_seconds)
            .await?
        {
            LockAcquisition::Acquired => {}
            LockAcquisition::Held {
                fingerprint: holder,
            } => {
                // Reuse with a different payload is a client error whether it
                // meets a cached outcome or an in-flight lock.
                if holder.is_some_and(|h| h != fingerprint) {
                    self.metrics.record_mismatch();
                    get_metrics().record_mismatch();
                    tracing::warn!(
                        key = %mask_sensitive(key, 4),
                        "idempotency key reused with a different payload while execution is in flight"
                    );
                    return Err(AppError::PayloadMismatch);
                }
                self.metrics.record_conflict();
                get_metrics().record_conflict();
                tracing::debug!(
                    key = %mask_sensitive(key, 4),
                    "concurrent execution in flight, rejecting duplicate"
                );
                return Err(AppError::ConcurrentExecution);
            }
        }

        let guard = LockReleaseGuard::new(Arc::clone(&self.lock_store), key.to_string());
        let timer = LatencyTimer::new();

        let result = self.handler.execute(HandlerRequest { payload }).await;
        get_metrics().record_execution_latency(timer.elapsed_ms());

        match result {
            Ok(HandlerOutcome::Cacheable { status_code, body }) => {
                self.metrics.record_execution();
                get_metrics().record_execution(true);

                let outcome =
                    CachedOutcome::new(status_code, body, fingerprint, self.config.response_ttl_seconds);

                // The handler already ran; a store failure here must not turn
                // a successful execution into an error. The outcome is simply
                // not memoized.
                if let Err(e) = self
                    .response_store
                    .set(key, outcome.clone(), self.config.response_ttl_seconds)
                    .await
                {
                    tracing::error!(
                        key = %mask_sensitive(key, 4),
                        "failed to cache handler outcome: {}",
                        e
                    );
                }

                guard.release().await;
                Ok(IdempotentResponse::Fresh(HandlerOutcome::Cacheable {
                    status_code: outcome.status_code,
                    body: outcome.body,
                }))
            }
            Ok(HandlerOutcome::Opaque(value)) => {
                self.metrics.record_execution();
                get_metrics().record_execution(true);
                guard.release().await;
                Ok(IdempotentResponse::Fresh(HandlerOutcome::Opaque(value)))
            }
            Err(e) => {
                self.metrics.record_failed_execution();
                get_metrics().record_execution(false);
                guard.release().await;
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryLockStore, InMemoryResponseStore};
    use serde_json::json;

    fn coordinator_with(handler: MockHandler) -> IdempotencyCoordinator {
        IdempotencyCoordinator::new(
            Arc::new(InMemoryResponseStore::new()),
            Arc::new(InMemoryLockStore::new()),
            Arc::new(handler),
            CoordinatorConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_missing_key_never_invokes_handler() {
        let mut handler = MockHandler::new();
        handler.expect_execute().times(0);
        let coordinator = coordinator_with(handler);

        let err = coordinator
            .execute(None, Some(json!({"amount": "1.00"})))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::MissingKey));
    }

    #[tokio::test]
    async fn test_blank_key_never_invokes_handler() {
        let mut handler = MockHandler::new();
        handler.expect_execute().times(0);
        let coordinator = coordinator_with(handler);

        let err = coordinator
            .execute(Some("   "), Some(json!({"amount": "1.00"})))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::MissingKey));
    }

    #[tokio::test]
    async fn test_fresh_execution_invokes_handler_once() {
        let mut handler = MockHandler::new();
        handler.expect_execute().times(1).returning(|_| {
            Ok(HandlerOutcome::Cacheable {
                status_code: 200,
                body: json!({"order": "X"}),
            })
        });
        let coordinator = coordinator_with(handler);

        let response = coordinator
            .execute(Some("K1"), Some(json!({"amount": "150.00"})))
            .await
            .unwrap();
        assert!(!response.was_replayed());
    }

    #[tokio::test]
    async fn test_key_is_trimmed_before_use() {
        let mut handler = MockHandler::new();
        handler.expect_execute().times(1).returning(|_| {
            Ok(HandlerOutcome::Cacheable {
                status_code: 200,
                body: json!({"order": "X"}),
            })
        });
        let coordinator = coordinator_with(handler);

        let payload = json!({"amount": "150.00"});
        coordinator
            .execute(Some("  K1  "), Some(payload.clone()))
            .await
            .unwrap();

        // Same key with surrounding whitespace resolves to the same cache slot.
        let second = coordinator
            .execute(Some("K1"), Some(payload))
            .await
            .unwrap();
        assert!(second.was_replayed());
    }

    #[test]
    fn test_default_config_ttls() {
        let config = CoordinatorConfig::default();
        assert_eq!(config.response_ttl_seconds, 900);
        assert_eq!(config.lock_ttl_seconds, 120);
    }

    #[test]
    fn test_metrics_snapshot() {
        let metrics = IdempotencyMetrics::new();
        metrics.record_request();
        metrics.record_request();
        metrics.record_replay();
        metrics.record_execution();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_requests, 2);
        assert_eq!(snapshot.replayed_requests, 1);
        assert_eq!(snapshot.executed_requests, 1);
        assert_eq!(metrics.replay_rate(), 0.5);
    }
}
