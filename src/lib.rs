pub mod api;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod fingerprint;
pub mod observability;
pub mod payments;
pub mod store;

pub use coordinator::{
    CoordinatorConfig, Handler, HandlerOutcome, HandlerRequest, IdempotencyCoordinator,
    IdempotencyMetrics, IdempotentResponse, MetricsSnapshot,
};
pub use error::{AppError, Result};
pub use fingerprint::PayloadFingerprint;
pub use store::{
    CachedOutcome, InMemoryLockStore, InMemoryResponseStore, LockAcquisition, LockStore,
    RedisLockStore, RedisResponseStore, ResponseStore,
};
