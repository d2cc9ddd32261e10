//! Span adapter for document-store operations.

use opentelemetry::{Context, KeyValue};
use opentelemetry_semantic_conventions::trace::{
    DB_MONGODB_COLLECTION, DB_OPERATION, DB_STATEMENT, DB_SYSTEM,
};

use crate::{clients, config::TraceOptions, span::SpanGuard};

const SCOPE: &str = "otelware-mongodb";
const SYSTEM: &str = "mongodb";

/// Starts a client span for a document-store operation against `collection`.
/// `query` is a rendered summary of the query payload; it becomes the span's
/// statement attribute. The returned guard ends the span at the end of the
/// operation.
pub fn span(cx: &Context, operation: &str, collection: &str, query: &str) -> SpanGuard {
    span_with_options(&TraceOptions::default(), cx, operation, collection, query)
}

/// Same as [`span`], with explicit tracer overrides.
pub fn span_with_options(
    options: &TraceOptions,
    cx: &Context,
    operation: &str,
    collection: &str,
    query: &str,
) -> SpanGuard {
    clients::start_client_span(
        options,
        cx,
        SCOPE,
        format!("{SYSTEM} {operation}"),
        vec![
            KeyValue::new(DB_SYSTEM, SYSTEM),
            KeyValue::new(DB_OPERATION, operation.to_string()),
            KeyValue::new(DB_MONGODB_COLLECTION, collection.to_string()),
            KeyValue::new(DB_STATEMENT, clients::statement([operation, query])),
        ],
    )
}

#[cfg(test)]
mod tests {
    use opentelemetry::trace::{SpanKind, Status};
    use opentelemetry::{Context, Value};

    use super::*;
    use crate::testing;

    #[test]
    fn span_carries_collection_and_query() {
        let (capture, options) = testing::capture();

        let span = span_with_options(
            &options,
            &Context::new(),
            "find",
            "users",
            r#"{"role":"admin"}"#,
        );
        span.end();

        let spans = capture.spans();
        let span = &spans[0];
        assert_eq!(span.name, "mongodb find");
        assert_eq!(span.span_kind, SpanKind::Client);
        assert_eq!(
            testing::attribute(span, "db.mongodb.collection"),
            Some(&Value::from("users"))
        );
        assert_eq!(
            testing::attribute(span, "db.statement"),
            Some(&Value::from(r#"find {"role":"admin"}"#))
        );
    }

    #[test]
    fn failed_operation_is_recorded_and_returned_unchanged() {
        let (capture, options) = testing::capture();

        let err = std::io::Error::new(std::io::ErrorKind::TimedOut, "timed out");
        let span = span_with_options(
            &options,
            &Context::new(),
            "insert",
            "users",
            r#"{"name":"alice"}"#,
        );
        span.record_error(&err);
        span.end();

        let spans = capture.spans();
        let span = &spans[0];
        assert_eq!(span.name, "mongodb insert");
        assert_eq!(
            span.status,
            Status::Error {
                description: "timed out".into()
            }
        );
        assert_eq!(err.kind(), std::io::ErrorKind::TimedOut);
    }
}
