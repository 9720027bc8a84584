//! Short URL service.
//!
//! [`UrlService`] ties the pieces together: codes come from the configured
//! strategy through a collision resolver, reads walk L1, L2 and the durable
//! store in order, and every successful read is counted by the
//! [`AccessCountAggregator`], which flushes coalesced deltas through a
//! bounded [`WorkerPool`].

pub mod aggregator;
pub mod error;
pub mod instrument;
pub mod pool;
pub mod service;
pub mod settings;
pub mod stats;

pub use aggregator::{AccessCountAggregator, FlushOutcome, FlushReport};
pub use error::{Result, ServiceError};
pub use instrument::{redact_url, RequestContext};
pub use pool::{JobHandle, PoolStats, WorkerPool};
pub use service::UrlService;
pub use settings::Settings;
pub use stats::{ServiceStats, StatsReporter};
