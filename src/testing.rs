//! Shared helpers for capturing spans in tests without global state.

use opentelemetry::Value;
use opentelemetry_sdk::{
    export::trace::SpanData, propagation::TraceContextPropagator,
    testing::trace::InMemorySpanExporter, trace::TracerProvider,
};

use crate::config::TraceOptions;

/// Holds an in-memory exporter and the provider feeding it.
pub(crate) struct Capture {
    exporter: InMemorySpanExporter,
    provider: TracerProvider,
}

impl Capture {
    /// Flushes the provider and returns every finished span so far.
    pub(crate) fn spans(&self) -> Vec<SpanData> {
        for result in self.provider.force_flush() {
            result.expect("flush");
        }
        self.exporter.get_finished_spans().expect("spans")
    }
}

/// An in-memory capture plus options wired to it, so adapters under test
/// resolve a capturing tracer instead of the global one.
pub(crate) fn capture() -> (Capture, TraceOptions) {
    let exporter = InMemorySpanExporter::default();
    let provider = TracerProvider::builder()
        .with_simple_exporter(exporter.clone())
        .build();
    let options = TraceOptions::default()
        .with_tracer_provider(&provider)
        .with_propagator(TraceContextPropagator::new());
    (Capture { exporter, provider }, options)
}

pub(crate) fn attribute<'a>(span: &'a SpanData, key: &str) -> Option<&'a Value> {
    span.attributes
        .iter()
        .find(|kv| kv.key.as_str() == key)
        .map(|kv| &kv.value)
}
