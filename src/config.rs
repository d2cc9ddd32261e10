use std::sync::Arc;

use opentelemetry::{
    global::{self, BoxedTracer},
    propagation::{Extractor, Injector, TextMapPropagator},
    trace::{Span, Tracer, TracerProvider},
    Context,
};

/// Instrumentation scope recorded on tracers resolved from an explicit
/// provider override.
const SCOPE: &str = env!("CARGO_PKG_NAME");

/// Per-adapter overrides for the tracer and propagator.
///
/// Every adapter in this crate resolves a tracer and a propagator at the
/// point of use: overrides held here win, otherwise the process-wide
/// globals registered by [`setup::init`](crate::setup::init) are consulted.
/// With no setup at all, resolution falls back to the no-op tracer, so span
/// handling never becomes a failure path for the wrapped operation.
///
/// Overrides exist mainly so tests can capture spans without touching
/// global state:
///
/// ```ignore
/// let options = TraceOptions::default()
///     .with_tracer_provider(&provider)
///     .with_propagator(TraceContextPropagator::new());
/// let layer = TraceLayer::with_options(options);
/// ```
#[derive(Clone, Default)]
pub struct TraceOptions {
    tracer: Option<Arc<BoxedTracer>>,
    propagator: Option<Arc<dyn TextMapPropagator + Send + Sync>>,
}

impl TraceOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses `tracer` for every span opened through these options instead of
    /// the global tracer provider.
    pub fn with_tracer<T>(mut self, tracer: T) -> Self
    where
        T: Tracer + Send + Sync + 'static,
        T::Span: Span + Send + Sync + 'static,
    {
        self.tracer = Some(Arc::new(BoxedTracer::new(Box::new(tracer))));
        self
    }

    /// Resolves a tracer from `provider` and uses it for every span opened
    /// through these options.
    pub fn with_tracer_provider<P>(self, provider: &P) -> Self
    where
        P: TracerProvider,
        P::Tracer: Tracer + Send + Sync + 'static,
        <P::Tracer as Tracer>::Span: Span + Send + Sync + 'static,
    {
        self.with_tracer(provider.tracer(SCOPE))
    }

    /// Uses `propagator` for header extraction and injection instead of the
    /// globally registered one.
    pub fn with_propagator<P>(mut self, propagator: P) -> Self
    where
        P: TextMapPropagator + Send + Sync + 'static,
    {
        self.propagator = Some(Arc::new(propagator));
        self
    }

    /// The tracer for `scope`, or the explicit override if one was set.
    pub(crate) fn tracer(&self, scope: &'static str) -> Arc<BoxedTracer> {
        match &self.tracer {
            Some(tracer) => Arc::clone(tracer),
            None => Arc::new(global::tracer(scope)),
        }
    }

    /// Extracts a context from `carrier`. The base context is empty, so a
    /// missing or malformed header yields a fresh root context rather than
    /// chaining onto whatever happens to be current.
    pub(crate) fn extract(&self, carrier: &dyn Extractor) -> Context {
        match &self.propagator {
            Some(propagator) => propagator.extract_with_context(&Context::new(), carrier),
            None => global::get_text_map_propagator(|propagator| {
                propagator.extract_with_context(&Context::new(), carrier)
            }),
        }
    }

    pub(crate) fn inject(&self, cx: &Context, carrier: &mut dyn Injector) {
        match &self.propagator {
            Some(propagator) => propagator.inject_context(cx, carrier),
            None => global::get_text_map_propagator(|propagator| {
                propagator.inject_context(cx, carrier)
            }),
        }
    }
}
