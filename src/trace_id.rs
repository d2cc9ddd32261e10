//! Helpers for exposing the active trace identifier.

use opentelemetry::trace::TraceContextExt;
use tracing_opentelemetry::OpenTelemetrySpanExt;

/// Extract the current trace id. This can be used to report the trace id to
/// clients so further problems with specific requests can be correlated with
/// the exported trace. Returns [`None`] outside of a sampled span.
pub fn current_trace_id() -> Option<String> {
    let context = tracing::Span::current().context();
    let span = context.span();
    let span_context = span.span_context();
    span_context
        .is_valid()
        .then(|| span_context.trace_id().to_string())
}
