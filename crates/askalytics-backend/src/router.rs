use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use askalytics_schema::{ExecutionResult, QueryDescriptor};

use crate::{AnalyticsBackend, BackendError, ReportRequest};

/// Global execution mode. `Simulated` forces every descriptor onto the
/// deterministic generator; `Live` pins the direct API; `Auto` picks per
/// descriptor shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    Auto,
    Simulated,
    Live,
}

/// Shape thresholds that push a descriptor to the batch backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingPolicy {
    pub wide_range_days: i64,
    pub high_dimensionality: usize,
}

impl Default for RoutingPolicy {
    fn default() -> Self {
        Self {
            wide_range_days: 90,
            high_dimensionality: 2,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, the first call included.
    pub max_attempts: u32,
    pub base_backoff: Duration,
    /// Overall per-execute deadline, distinct from each backend client's
    /// own transport timeout.
    pub call_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_millis(500),
            call_timeout: Duration::from_secs(30),
        }
    }
}

/// Per-call lifecycle, for logs and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionState {
    Pending,
    Routed,
    Retrying,
    Succeeded,
    Failed,
}

impl fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ExecutionState::Pending => "pending",
            ExecutionState::Routed => "routed",
            ExecutionState::Retrying => "retrying",
            ExecutionState::Succeeded => "succeeded",
            ExecutionState::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Routes a validated descriptor to a backend and drives the call through
/// retry/backoff. The mode flag is hot-swappable; reads are lock-free and
/// reconfiguration goes through `set_mode` only.
pub struct ExecutionRouter {
    live: Arc<dyn AnalyticsBackend>,
    warehouse: Arc<dyn AnalyticsBackend>,
    simulated: Arc<dyn AnalyticsBackend>,
    mode: ArcSwap<ExecutionMode>,
    routing: RoutingPolicy,
    retry: RetryPolicy,
}

impl ExecutionRouter {
    pub fn new(
        live: Arc<dyn AnalyticsBackend>,
        warehouse: Arc<dyn AnalyticsBackend>,
        simulated: Arc<dyn AnalyticsBackend>,
        mode: ExecutionMode,
        routing: RoutingPolicy,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            live,
            warehouse,
            simulated,
            mode: ArcSwap::from_pointee(mode),
            routing,
            retry,
        }
    }

    pub fn mode(&self) -> ExecutionMode {
        **self.mode.load()
    }

    pub fn set_mode(&self, mode: ExecutionMode) {
        tracing::info!(mode = ?mode, "execution mode reconfigured");
        self.mode.store(Arc::new(mode));
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    fn select(&self, request: &ReportRequest) -> Arc<dyn AnalyticsBackend> {
        match self.mode() {
            ExecutionMode::Simulated => self.simulated.clone(),
            ExecutionMode::Live => self.live.clone(),
            ExecutionMode::Auto => {
                let wide = request.primary_range().span_days() > self.routing.wide_range_days;
                let dimensional = request.dimensions.len() >= self.routing.high_dimensionality;
                let multi_range = request.date_ranges.len() > 1;
                if wide || dimensional || multi_range {
                    self.warehouse.clone()
                } else {
                    self.live.clone()
                }
            }
        }
    }

    pub async fn execute(
        &self,
        descriptor: &QueryDescriptor,
    ) -> Result<ExecutionResult, BackendError> {
        self.execute_with_cancel(descriptor, CancellationToken::new())
            .await
    }

    /// Cancellation aborts in-flight attempts and backoff sleeps; the call
    /// never stays in `Retrying` past the token or the deadline.
    pub async fn execute_with_cancel(
        &self,
        descriptor: &QueryDescriptor,
        cancel: CancellationToken,
    ) -> Result<ExecutionResult, BackendError> {
        let deadline = self.retry.call_timeout;
        match tokio::time::timeout(deadline, self.drive(descriptor, &cancel)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(state = %ExecutionState::Failed, "execution deadline exceeded");
                Err(BackendError::Deadline(deadline))
            }
        }
    }

    async fn drive(
        &self,
        descriptor: &QueryDescriptor,
        cancel: &CancellationToken,
    ) -> Result<ExecutionResult, BackendError> {
        let request = ReportRequest::from(descriptor);
        tracing::debug!(state = %ExecutionState::Pending, intent = %descriptor.intent, "execution started");

        let backend = self.select(&request);
        let backend_id = backend.id();
        tracing::debug!(state = %ExecutionState::Routed, backend = %backend_id, "backend selected");

        let started = Instant::now();
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let outcome = tokio::select! {
                _ = cancel.cancelled() => return Err(BackendError::Cancelled),
                outcome = backend.run_report(&request) => outcome,
            };

            match outcome {
                Ok(rows) => {
                    let latency = started.elapsed();
                    tracing::info!(
                        state = %ExecutionState::Succeeded,
                        backend = %backend_id,
                        rows = rows.len(),
                        attempts = attempt,
                        latency_ms = latency.as_millis() as u64,
                        "execution succeeded"
                    );
                    return Ok(ExecutionResult::new(rows, latency, backend_id));
                }
                Err(err) if err.is_transient() && attempt < self.retry.max_attempts => {
                    let delay = backoff_delay(attempt, self.retry.base_backoff, err.retry_after());
                    tracing::warn!(
                        state = %ExecutionState::Retrying,
                        backend = %backend_id,
                        attempt,
                        max_attempts = self.retry.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient failure, backing off"
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(BackendError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                Err(err) => {
                    tracing::warn!(
                        state = %ExecutionState::Failed,
                        backend = %backend_id,
                        attempts = attempt,
                        error = %err,
                        "execution failed"
                    );
                    return Err(err);
                }
            }
        }
    }
}

/// Exponential backoff, overridden by a provider retry-after hint.
fn backoff_delay(attempt: u32, base: Duration, hint: Option<Duration>) -> Duration {
    if let Some(hint) = hint {
        return hint;
    }
    base * 2u32.saturating_pow(attempt.saturating_sub(1))
}
