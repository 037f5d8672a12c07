use std::sync::Arc;
use std::time::Duration;

use tracing::Instrument;

use askalytics_backend::{
    BackendError, ExecutionRouter, Ga4ApiBackend, RetryPolicy, RoutingPolicy, SimulatedBackend,
    WarehouseBackend,
};
use askalytics_schema::{QueryContext, QueryIntent, ResponseObject, Utterance};

use crate::compiler::{self, CompileError, CompilerLimits};
use crate::config::MainConfig;
use crate::{classifier, extractor, synthesizer};

/// The full pipeline: classify and extract over the same text, compile,
/// execute, synthesize. Each call is an independent unit of work; the
/// only shared state is the router's hot-swappable policy.
pub struct AnalyticsEngine {
    router: ExecutionRouter,
    limits: CompilerLimits,
}

impl AnalyticsEngine {
    pub fn new(router: ExecutionRouter, limits: CompilerLimits) -> Self {
        Self { router, limits }
    }

    pub fn from_config(config: &MainConfig) -> Self {
        let live = Arc::new(Ga4ApiBackend::new(
            config.ga4.access_token.clone(),
            config.ga4.api_base.as_deref(),
        ));
        let warehouse = Arc::new(WarehouseBackend::new(
            config.warehouse.api_base.clone(),
            config.warehouse.api_key.clone(),
        ));
        let simulated = Arc::new(SimulatedBackend::new(config.routing.simulation_seed));

        let router = ExecutionRouter::new(
            live,
            warehouse,
            simulated,
            config.routing.mode,
            RoutingPolicy {
                wide_range_days: config.routing.wide_range_days,
                high_dimensionality: config.routing.high_dimensionality,
            },
            RetryPolicy {
                max_attempts: config.routing.max_attempts,
                base_backoff: Duration::from_millis(config.routing.base_backoff_ms),
                call_timeout: Duration::from_secs(config.routing.call_timeout_secs),
            },
        );

        Self::new(router, config.limits.clone())
    }

    pub fn router(&self) -> &ExecutionRouter {
        &self.router
    }

    /// Answer one question. Always yields a response object: pipeline
    /// failures come back as structured zero-confidence responses, never
    /// as bare errors.
    pub async fn answer(&self, text: &str, ctx: &QueryContext) -> ResponseObject {
        let utterance = Utterance::new(text);
        let span = tracing::info_span!("answer", trace_id = %utterance.trace_id);

        async {
            let intent = classifier::classify(&utterance);
            let params = extractor::extract(&utterance, ctx);
            tracing::debug!(
                intent = %intent.intent,
                confidence = intent.confidence,
                range = %params.date_range,
                metrics = params.metrics.len(),
                "utterance analyzed"
            );

            let descriptor = match compiler::compile(&intent, params, ctx, &self.limits) {
                Ok(descriptor) => descriptor,
                Err(err) => {
                    tracing::warn!(error = %err, "compilation rejected the request");
                    return compile_failure(intent.intent, &err);
                }
            };

            let result = match self.router.execute(&descriptor).await {
                Ok(result) => result,
                Err(err) => {
                    tracing::warn!(error = %err, "execution failed");
                    return backend_failure(intent.intent, &err);
                }
            };

            synthesizer::synthesize(&intent, &descriptor, &result)
        }
        .instrument(span)
        .await
    }
}

fn compile_failure(intent: QueryIntent, err: &CompileError) -> ResponseObject {
    ResponseObject::failure(
        intent,
        format!("I couldn't turn that question into a query: {err}."),
    )
}

fn backend_failure(intent: QueryIntent, err: &BackendError) -> ResponseObject {
    let message = match err {
        BackendError::Transient { .. } => format!(
            "The analytics backend kept failing transiently and retries ran out: {err}. Please try again shortly."
        ),
        BackendError::Auth(_) => format!(
            "The analytics backend rejected our credentials: {err}. Check the configured access token."
        ),
        BackendError::QuotaExhausted(_) => format!(
            "The analytics quota is exhausted: {err}. The query can run again once quota resets."
        ),
        BackendError::Rejected(_) => format!("The analytics backend rejected the query: {err}."),
        BackendError::Cancelled => "The query was cancelled before it finished.".to_string(),
        BackendError::Deadline(timeout) => format!(
            "The query did not finish within its {}s deadline.",
            timeout.as_secs()
        ),
    };
    ResponseObject::failure(intent, message)
}
