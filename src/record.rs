//! Data handed back to callers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reason attached to every simulated failure.
pub const FAILURE_REASON: &str = "deliberately caused to fail";

/// Result of a successful call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultRecord {
    /// Identity of the responding instance.
    pub source: String,
    /// Greeting including the response time.
    pub message: String,
    /// Call count observed at the start of the call.
    pub call_count: u64,
    /// Attempts consumed producing this result. Always 1 here.
    pub tries: u32,
    /// When the record was built.
    pub time: DateTime<Utc>,
}

impl ResultRecord {
    pub fn new(service: &str, identity: &str, fail_probability: f64, call_count: u64) -> Self {
        let time = Utc::now();
        Self {
            source: format!(
                "{} on {}, failProbability: {}",
                service, identity, fail_probability
            ),
            message: format!("Hello from {} @ {}", service, time.to_rfc3339()),
            call_count,
            tries: 1,
            time,
        }
    }
}

/// A deliberately injected failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureEvent {
    /// Name of the service that failed.
    pub service: String,
    pub call_count: u64,
    /// Probability in effect when the decision was made.
    pub fail_probability: f64,
    pub reason: String,
}

impl FailureEvent {
    pub fn new(service: &str, call_count: u64, fail_probability: f64) -> Self {
        Self {
            service: service.to_string(),
            call_count,
            fail_probability,
            reason: FAILURE_REASON.to_string(),
        }
    }
}
