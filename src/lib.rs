//! Gremlin service: a call handler that fails on purpose.
//!
//! Simulates a downstream service for exercising retries, circuit breakers
//! and service mesh resilience:
//! - Simulated work (configurable latency per call)
//! - Probabilistic failures, slower than successes
//! - Attempt accounting (every call is counted, whatever its outcome)
//! - Cancellation and deadlines honored during simulated work
//!
//! # Safety Controls
//!
//! - Global kill switch
//! - Schedule windows (failures only armed during specified times)
//! - Dry run mode
//! - Hot reload of the failure probability and work time

pub mod config;
pub mod counter;
pub mod error;
pub mod handler;
pub mod identity;
pub mod oracle;
pub mod record;

pub use config::{Config, SharedConfig};
pub use counter::CallCounter;
pub use error::{CallError, CancelCause};
pub use handler::{CallContext, CallHandler, CallStats};
pub use identity::IdentityResolver;
pub use oracle::FailureOracle;
pub use record::{FailureEvent, ResultRecord};
