use std::{
    fmt,
    future::Future,
    pin::Pin,
    task::{self, ready, Poll},
};

use http::{Request, Response};
use opentelemetry::{
    trace::{SpanKind, Status, TraceContextExt, Tracer},
    KeyValue,
};
use opentelemetry_semantic_conventions::trace::{
    EXCEPTION_MESSAGE, HTTP_REQUEST_METHOD, HTTP_RESPONSE_STATUS_CODE, HTTP_ROUTE,
    NETWORK_TRANSPORT, URL_PATH, USER_AGENT_ORIGINAL,
};
use pin_project_lite::pin_project;
use tower::Service;
use tower_layer::Layer;

use crate::{
    config::TraceOptions,
    propagation::{HeaderExtractor, HeaderInjector},
    span::SpanGuard,
};

const SCOPE: &str = "otelware-http";

/// Opens a server span for every request reaching a route handler.
///
/// Generally, the middleware should be used on every http route, this usually
/// means that it can be registered globally and in the last position, to be
/// the first to run, even before general logging layers.
///
/// The span is named after the request path and parented on the trace context
/// extracted from the inbound `traceparent` header; the resulting context is
/// injected back into the request headers and stored in the request
/// extensions so handlers can parent client spans on it. Once the response
/// resolves, the status code is attached and the span ends.
///
/// The `TraceLayer` will not log http requests. For that, another solution
/// needs to be added additionally.
///
/// ```ignore
/// let app = Router::new()
///     .route("/foo", get(|| async {}))
///     .route("/bar", get(|| async {}))
///     .layer(TraceLayer::new());
/// ```
pub struct TraceLayer {
    options: TraceOptions,
}

impl TraceLayer {
    pub fn new() -> Self {
        Self {
            options: TraceOptions::default(),
        }
    }

    pub fn with_options(options: TraceOptions) -> Self {
        Self { options }
    }
}

impl Default for TraceLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> Layer<S> for TraceLayer {
    type Service = TraceService<S>;

    fn layer(&self, service: S) -> Self::Service {
        TraceService {
            service,
            options: self.options.clone(),
        }
    }
}

/// This service implements the Trace behavior
pub struct TraceService<S> {
    service: S,
    options: TraceOptions,
}

impl<S, Body, ResBody> Service<Request<Body>> for TraceService<S>
where
    S: Service<Request<Body>, Response = Response<ResBody>>,
    S::Error: fmt::Display,
{
    type Error = S::Error;
    type Future = ResponseFuture<S::Future>;
    type Response = S::Response;

    fn poll_ready(&mut self, cx: &mut task::Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request<Body>) -> Self::Future {
        let parent = self
            .options
            .extract(&HeaderExtractor::new(request.headers()));

        let path = request.uri().path().to_string();
        let mut attributes = vec![
            KeyValue::new(NETWORK_TRANSPORT, "tcp"),
            KeyValue::new(HTTP_REQUEST_METHOD, request.method().to_string()),
            KeyValue::new(URL_PATH, path.clone()),
            KeyValue::new(HTTP_ROUTE, path.clone()),
        ];
        if let Some(agent) = request
            .headers()
            .get(http::header::USER_AGENT)
            .and_then(|agent| agent.to_str().ok())
        {
            attributes.push(KeyValue::new(USER_AGENT_ORIGINAL, agent.to_string()));
        }

        let tracer = self.options.tracer(SCOPE);
        let span = tracer
            .span_builder(path)
            .with_kind(SpanKind::Server)
            .with_attributes(attributes)
            .start_with_context(&*tracer, &parent);
        let cx = parent.with_span(span);

        // propagate the new context to anything forwarding these headers
        self.options
            .inject(&cx, &mut HeaderInjector::new(request.headers_mut()));
        request.extensions_mut().insert(cx.clone());

        ResponseFuture {
            inner: self.service.call(request),
            guard: Some(SpanGuard::new(cx)),
        }
    }
}

pin_project! {
    /// Closes the server span when the inner service resolves, or on drop
    /// when the request is cancelled before that.
    pub struct ResponseFuture<F> {
        #[pin]
        inner: F,
        guard: Option<SpanGuard>,
    }
}

impl<F, ResBody, E> Future for ResponseFuture<F>
where
    F: Future<Output = Result<Response<ResBody>, E>>,
    E: fmt::Display,
{
    type Output = Result<Response<ResBody>, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut task::Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let result = ready!(this.inner.poll(cx));
        if let Some(guard) = this.guard.take() {
            match &result {
                Ok(response) => {
                    let status = response.status();
                    guard.set_attribute(KeyValue::new(
                        HTTP_RESPONSE_STATUS_CODE,
                        i64::from(status.as_u16()),
                    ));
                    if status.as_u16() < 400 {
                        guard.set_status(Status::Ok);
                    } else {
                        guard.set_status(Status::error(
                            status.canonical_reason().unwrap_or_default().to_string(),
                        ));
                    }
                }
                Err(err) => {
                    guard.set_attribute(KeyValue::new(EXCEPTION_MESSAGE, err.to_string()));
                    guard.fail(err.to_string());
                }
            }
            guard.end();
        }
        Poll::Ready(result)
    }
}
