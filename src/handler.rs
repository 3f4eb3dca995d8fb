//! The fault-injecting call handler.

use crate::config::SharedConfig;
use crate::counter::CallCounter;
use crate::error::{CallError, CancelCause};
use crate::identity::{self, IdentityResolver};
use crate::oracle::FailureOracle;
use crate::record::{FailureEvent, ResultRecord};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Cancellation scope of a single call.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl CallContext {
    /// A context that is never cancelled and has no deadline.
    pub fn new() -> Self {
        Self::default()
    }

    /// A context cancelled together with `token`.
    pub fn with_cancellation(token: CancellationToken) -> Self {
        Self {
            cancel: token,
            deadline: None,
        }
    }

    /// Give up once `timeout` has elapsed from now.
    ///
    /// A timeout too large to represent as an instant means no deadline.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.with_deadline(deadline),
            None => self,
        }
    }

    /// Give up at `deadline`.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    fn check(&self) -> Option<CancelCause> {
        if self.cancel.is_cancelled() {
            return Some(CancelCause::Requested);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(CancelCause::DeadlineExceeded),
            _ => None,
        }
    }
}

/// Snapshot of the handler's outcome tallies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CallStats {
    /// Calls accounted by the counter.
    pub calls: u64,
    pub succeeded: u64,
    /// Simulated failures returned to callers.
    pub failed: u64,
    pub canceled: u64,
    /// Failures decided but not returned because of dry-run mode.
    pub dry_run_failures: u64,
}

/// Simulates a downstream service that fails on purpose.
pub struct CallHandler {
    config: SharedConfig,
    counter: Arc<CallCounter>,
    oracle: Arc<FailureOracle>,
    identity: Arc<dyn IdentityResolver>,
    succeeded: AtomicU64,
    failed: AtomicU64,
    canceled: AtomicU64,
    dry_run_failures: AtomicU64,
}

impl std::fmt::Debug for CallHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallHandler")
            .field("counter", &self.counter)
            .field("oracle", &self.oracle)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl CallHandler {
    /// Create a handler from its collaborators.
    pub fn new(
        config: SharedConfig,
        counter: Arc<CallCounter>,
        oracle: Arc<FailureOracle>,
        identity: Arc<dyn IdentityResolver>,
    ) -> Self {
        let snapshot = config.load();
        info!(
            service = %snapshot.service.name,
            work_time_ms = snapshot.service.work_time_ms,
            fail_probability = snapshot.service.fail_probability,
            enabled = snapshot.settings.enabled,
            dry_run = snapshot.settings.dry_run,
            "Gremlin call handler initialized"
        );

        Self {
            config,
            counter,
            oracle,
            identity,
            succeeded: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            canceled: AtomicU64::new(0),
            dry_run_failures: AtomicU64::new(0),
        }
    }

    /// Wire a handler with a fresh counter and the collaborators the
    /// configuration describes.
    pub fn from_config(config: SharedConfig) -> Self {
        let snapshot = config.load();
        let identity: Arc<dyn IdentityResolver> = Arc::from(identity::from_config(&snapshot.identity));
        let oracle = Arc::new(FailureOracle::new(config.clone()));
        Self::new(config, Arc::new(CallCounter::new()), oracle, identity)
    }

    pub fn counter(&self) -> &Arc<CallCounter> {
        &self.counter
    }

    pub fn oracle(&self) -> &Arc<FailureOracle> {
        &self.oracle
    }

    /// Perform one call.
    ///
    /// The call is counted before anything else happens, so failed and
    /// canceled calls are accounted too.
    pub async fn call(&self, ctx: &CallContext) -> Result<ResultRecord, CallError> {
        let call_count = self.counter.next();
        let config = self.config.load();
        let work_time = config.service.work_time();

        self.delay(ctx, work_time, call_count).await?;

        let fail_probability = self.oracle.current_probability();
        if !self.oracle.is_armed() {
            debug!(call_count, "Gremlin not armed, skipping failure decision");
        } else if self.oracle.should_fail(fail_probability) {
            if config.settings.dry_run {
                self.dry_run_failures.fetch_add(1, Ordering::Relaxed);
                info!(
                    call_count,
                    fail_probability, "Dry run: simulated failure suppressed"
                );
            } else {
                if config.settings.log_injections {
                    info!(call_count, fail_probability, "Simulating failure");
                }

                // Failing takes longer than succeeding.
                self.delay(ctx, work_time, call_count).await?;

                self.failed.fetch_add(1, Ordering::Relaxed);
                return Err(CallError::SimulatedFailure(FailureEvent::new(
                    &config.service.name,
                    call_count,
                    fail_probability,
                )));
            }
        }

        let identity = self.identity.resolve().await;
        self.succeeded.fetch_add(1, Ordering::Relaxed);

        Ok(ResultRecord::new(
            &config.service.name,
            &identity,
            fail_probability,
            call_count,
        ))
    }

    /// Current outcome tallies.
    pub fn stats(&self) -> CallStats {
        CallStats {
            calls: self.counter.current(),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            canceled: self.canceled.load(Ordering::Relaxed),
            dry_run_failures: self.dry_run_failures.load(Ordering::Relaxed),
        }
    }

    /// Simulated work. Returns early if the context is cancelled.
    async fn delay(
        &self,
        ctx: &CallContext,
        duration: Duration,
        call_count: u64,
    ) -> Result<(), CallError> {
        let outcome = match ctx.check() {
            Some(cause) => Err(cause),
            None if duration.is_zero() => Ok(()),
            None => {
                let deadline = async {
                    match ctx.deadline {
                        Some(deadline) => tokio::time::sleep_until(deadline).await,
                        None => std::future::pending::<()>().await,
                    }
                };

                tokio::select! {
                    biased;
                    _ = ctx.cancel.cancelled() => Err(CancelCause::Requested),
                    _ = deadline => Err(CancelCause::DeadlineExceeded),
                    _ = tokio::time::sleep(duration) => Ok(()),
                }
            }
        };

        outcome.map_err(|cause| {
            self.canceled.fetch_add(1, Ordering::Relaxed);
            debug!(call_count, cause = %cause, "Call canceled");
            CallError::Canceled { call_count, cause }
        })
    }
}
