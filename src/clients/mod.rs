//! Client-side span adapters for backend calls.
//!
//! Each backend module exposes a `span` function that opens a client-kind
//! span for one operation and hands back a [`SpanGuard`](crate::span::SpanGuard).
//! The span starts before the underlying call executes and ends when the
//! guard is dropped, so deferred calls simply carry the guard along until
//! they complete.

use opentelemetry::{
    trace::{SpanKind, TraceContextExt, Tracer},
    Context, KeyValue,
};

use crate::{config::TraceOptions, span::SpanGuard};

pub mod memcached;
pub mod mongodb;
pub mod redis;

/// Builds a `"<verb> <key> <value>"`-style statement, skipping empty parts.
pub(crate) fn statement<'a>(parts: impl IntoIterator<Item = &'a str>) -> String {
    parts
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

pub(crate) fn start_client_span(
    options: &TraceOptions,
    cx: &Context,
    scope: &'static str,
    name: String,
    attributes: Vec<KeyValue>,
) -> SpanGuard {
    let tracer = options.tracer(scope);
    let span = tracer
        .span_builder(name)
        .with_kind(SpanKind::Client)
        .with_attributes(attributes)
        .start_with_context(&*tracer, cx);
    SpanGuard::new(cx.with_span(span))
}
