#![allow(dead_code)]

use async_trait::async_trait;
use idempotency_gateway::coordinator::{
    CoordinatorConfig, Handler, HandlerOutcome, HandlerRequest, IdempotencyCoordinator,
};
use idempotency_gateway::error::{AppError, Result};
use idempotency_gateway::store::{InMemoryLockStore, InMemoryResponseStore};
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use uuid::Uuid;

/// Counts executions and fabricates a fresh order id each time, so a replay
/// is distinguishable from a re-execution by body equality alone.
pub struct CountingHandler {
    calls: AtomicU64,
}

impl CountingHandler {
    pub fn new() -> Self {
        Self {
            calls: AtomicU64::new(0),
        }
    }

    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Handler for CountingHandler {
    async fn execute(&self, request: HandlerRequest) -> Result<HandlerOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(HandlerOutcome::Cacheable {
            status_code: 200,
            body: json!({
                "order_id": Uuid::new_v4(),
                "echo": request.payload,
            }),
        })
    }
}

/// Signals when execution starts and blocks until released, for staging
/// concurrent duplicate submissions.
pub struct BlockingHandler {
    calls: AtomicU64,
    pub started: Notify,
    pub release: Notify,
}

impl BlockingHandler {
    pub fn new() -> Self {
        Self {
            calls: AtomicU64::new(0),
            started: Notify::new(),
            release: Notify::new(),
        }
    }

    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Handler for BlockingHandler {
    async fn execute(&self, _request: HandlerRequest) -> Result<HandlerOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.started.notify_one();
        self.release.notified().await;
        Ok(HandlerOutcome::Cacheable {
            status_code: 200,
            body: json!({"order_id": Uuid::new_v4()}),
        })
    }
}

/// Fails the first `fail_first` executions, then succeeds.
pub struct FlakyHandler {
    calls: AtomicU64,
    fail_first: u64,
}

impl FlakyHandler {
    pub fn new(fail_first: u64) -> Self {
        Self {
            calls: AtomicU64::new(0),
            fail_first,
        }
    }

    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Handler for FlakyHandler {
    async fn execute(&self, _request: HandlerRequest) -> Result<HandlerOutcome> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= self.fail_first {
            return Err(AppError::Handler(anyhow::anyhow!(
                "transient processor failure"
            )));
        }
        Ok(HandlerOutcome::Cacheable {
            status_code: 200,
            body: json!({"order_id": Uuid::new_v4()}),
        })
    }
}

/// Returns a result without a capturable status code and body.
pub struct OpaqueHandler {
    calls: AtomicU64,
}

impl OpaqueHandler {
    pub fn new() -> Self {
        Self {
            calls: AtomicU64::new(0),
        }
    }

    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Handler for OpaqueHandler {
    async fn execute(&self, _request: HandlerRequest) -> Result<HandlerOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(HandlerOutcome::Opaque(json!({"raw": "passthrough"})))
    }
}

pub fn coordinator_with(handler: Arc<dyn Handler>) -> IdempotencyCoordinator {
    coordinator_with_config(handler, CoordinatorConfig::default())
}

pub fn coordinator_with_config(
    handler: Arc<dyn Handler>,
    config: CoordinatorConfig,
) -> IdempotencyCoordinator {
    IdempotencyCoordinator::new(
        Arc::new(InMemoryResponseStore::new()),
        Arc::new(InMemoryLockStore::new()),
        handler,
        config,
    )
}
