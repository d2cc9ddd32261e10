//! Span adapter for memcached operations.

use opentelemetry::{Context, KeyValue};
use opentelemetry_semantic_conventions::trace::{DB_OPERATION, DB_STATEMENT, DB_SYSTEM};

use crate::{clients, config::TraceOptions, span::SpanGuard};

const SCOPE: &str = "otelware-memcached";
const SYSTEM: &str = "memcached";

/// Starts a client span for a memcached operation. The returned guard ends
/// the span at the end of the operation:
///
/// ```ignore
/// let span = memcached::span(&cx, "set", "user:7", "alice");
/// client.set("user:7", "alice")?;
/// span.end();
/// ```
pub fn span(cx: &Context, operation: &str, key: &str, value: &str) -> SpanGuard {
    span_with_options(&TraceOptions::default(), cx, operation, key, value)
}

/// Same as [`span`], with explicit tracer overrides.
pub fn span_with_options(
    options: &TraceOptions,
    cx: &Context,
    operation: &str,
    key: &str,
    value: &str,
) -> SpanGuard {
    clients::start_client_span(
        options,
        cx,
        SCOPE,
        format!("{SYSTEM} {operation}"),
        vec![
            KeyValue::new(DB_SYSTEM, SYSTEM),
            KeyValue::new(DB_OPERATION, operation.to_string()),
            KeyValue::new(DB_STATEMENT, clients::statement([operation, key, value])),
        ],
    )
}
