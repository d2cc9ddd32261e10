use http::{HeaderMap, HeaderName, Request};
use opentelemetry::{
    propagation::{Extractor, Injector},
    Context,
};

use crate::config::TraceOptions;

/// Constructs a [`Context`] from the trace headers of `request`.
///
/// A missing or malformed `traceparent` header yields a fresh root context;
/// it is never an error.
pub fn extract_context<T>(request: &Request<T>) -> Context {
    extract_context_with_options(&TraceOptions::default(), request)
}

/// Same as [`extract_context`], with explicit propagator overrides.
pub fn extract_context_with_options<T>(options: &TraceOptions, request: &Request<T>) -> Context {
    options.extract(&HeaderExtractor::new(request.headers()))
}

/// Injects `cx` into the headers of `request` to allow propagation
/// downstream.
pub fn inject_context<T>(cx: &Context, request: &mut Request<T>) {
    inject_context_with_options(&TraceOptions::default(), cx, request);
}

/// Same as [`inject_context`], with explicit propagator overrides.
pub fn inject_context_with_options<T>(
    options: &TraceOptions,
    cx: &Context,
    request: &mut Request<T>,
) {
    options.inject(cx, &mut HeaderInjector::new(request.headers_mut()));
}

/// Carries the trace context of `inbound` over to `outbound`, as when
/// proxying a request pair: whatever a producer injected upstream becomes
/// extractable again downstream.
pub fn inject_trace<A, B>(inbound: &Request<A>, outbound: &mut Request<B>) {
    inject_trace_with_options(&TraceOptions::default(), inbound, outbound);
}

/// Same as [`inject_trace`], with explicit propagator overrides.
pub fn inject_trace_with_options<A, B>(
    options: &TraceOptions,
    inbound: &Request<A>,
    outbound: &mut Request<B>,
) {
    let cx = extract_context_with_options(options, inbound);
    inject_context_with_options(options, &cx, outbound);
}

// "traceparent" => https://www.w3.org/TR/trace-context/#trace-context-http-headers-format

/// Injector used via opentelemetry propagator to tell the extractor how to
/// insert the "traceparent" header value. This will allow the propagator to
/// inject opentelemetry context into a standard data structure. Will basically
/// insert a "traceparent" string value
/// "{version}-{trace_id}-{span_id}-{trace_flags}" of the spans context into the
/// headers. Listeners can then re-hydrate the context to add additional spans
/// to the same trace.
pub(crate) struct HeaderInjector<'a> {
    headers: &'a mut HeaderMap,
}

impl<'a> HeaderInjector<'a> {
    pub(crate) fn new(headers: &'a mut HeaderMap) -> Self {
        HeaderInjector { headers }
    }
}

impl<'a> Injector for HeaderInjector<'a> {
    fn set(&mut self, key: &str, value: String) {
        let Ok(key) = key.parse::<HeaderName>() else {
            tracing::debug!(%key, "failed to parse header name");
            return;
        };
        let Ok(value) = value.parse() else {
            tracing::debug!(%value, "failed to parse header value");
            return;
        };
        self.headers.insert(key, value);
    }
}

pub(crate) struct HeaderExtractor<'a> {
    headers: &'a HeaderMap,
}

impl<'a> HeaderExtractor<'a> {
    pub(crate) fn new(headers: &'a HeaderMap) -> Self {
        HeaderExtractor { headers }
    }
}

impl<'a> Extractor for HeaderExtractor<'a> {
    fn get(&self, key: &str) -> Option<&str> {
        self.headers.get(key).and_then(|h| h.to_str().ok())
    }

    fn keys(&self) -> Vec<&str> {
        self.headers.keys().map(|s| s.as_str()).collect()
    }
}
