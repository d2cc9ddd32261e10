use std::future::{ready, Ready};

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::{HeaderMap, HeaderName},
    Error, HttpMessage,
};
use futures_util::future::LocalBoxFuture;
use opentelemetry::{
    propagation::{Extractor, Injector},
    trace::{SpanKind, Status, TraceContextExt, Tracer},
    KeyValue,
};
use opentelemetry_semantic_conventions::trace::{
    EXCEPTION_MESSAGE, HTTP_REQUEST_METHOD, HTTP_RESPONSE_STATUS_CODE, HTTP_ROUTE,
    NETWORK_TRANSPORT, URL_PATH,
};

use crate::{config::TraceOptions, span::SpanGuard};

const SCOPE: &str = "otelware-http";

/// Opens a server span for every request reaching a route handler.
///
/// Generally, the middleware should be used on every http route, this usually
/// means that it can be registered globally and in the last position, to be
/// the first to run, even before general logging layers.
///
/// The span is named after the matched route pattern; a request that matches
/// no route gets a descriptive `"HTTP <method> route not found"` name. Once
/// the response resolves, the status code is attached and the span ends.
///
/// The `TraceLayer` will not log http requests. For that, another solution
/// needs to be added additionally.
///
/// ```ignore
/// let app = App::new()
///     .wrap(TraceLayer::new())
///     .route("/items/{id}", web::get().to(get_item));
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

impl<S, B> Transform<S, ServiceRequest> for TraceLayer
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;
    type InitError = ();
    type Response = ServiceResponse<B>;
    type Transform = TraceService<S>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(TraceService {
            service,
            options: self.options.clone(),
        }))
    }
}

/// This service implements the Trace behavior
pub struct TraceService<S> {
    service: S,
    options: TraceOptions,
}

impl<S, B> Service<ServiceRequest> for TraceService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;
    type Response = ServiceResponse<B>;

    // This service is ready when its next service is ready
    forward_ready!(service);

    fn call(&self, mut request: ServiceRequest) -> Self::Future {
        let parent = self
            .options
            .extract(&RequestExtractor::new(request.headers()));

        let span_name = request
            .match_pattern()
            .unwrap_or_else(|| format!("HTTP {} route not found", request.method()));

        let mut attributes = vec![
            KeyValue::new(NETWORK_TRANSPORT, "tcp"),
            KeyValue::new(HTTP_REQUEST_METHOD, request.method().to_string()),
            KeyValue::new(URL_PATH, request.path().to_string()),
        ];
        if let Some(pattern) = request.match_pattern() {
            attributes.push(KeyValue::new(HTTP_ROUTE, pattern));
        }

        let tracer = self.options.tracer(SCOPE);
        let span = tracer
            .span_builder(span_name)
            .with_kind(SpanKind::Server)
            .with_attributes(attributes)
            .start_with_context(&*tracer, &parent);
        let cx = parent.with_span(span);

        // propagate the new context to anything forwarding these headers
        self.options
            .inject(&cx, &mut RequestInjector::new(request.headers_mut()));
        request.extensions_mut().insert(cx.clone());

        let guard = SpanGuard::new(cx);
        let fut = self.service.call(request);
        Box::pin(async move {
            match fut.await {
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
                    guard.end();
                    Ok(response)
                }
                Err(err) => {
                    guard.set_attribute(KeyValue::new(EXCEPTION_MESSAGE, err.to_string()));
                    guard.fail(err.to_string());
                    guard.end();
                    Err(err)
                }
            }
        })
    }
}

struct RequestExtractor<'a> {
    headers: &'a HeaderMap,
}

impl<'a> RequestExtractor<'a> {
    fn new(headers: &'a HeaderMap) -> Self {
        RequestExtractor { headers }
    }
}

impl<'a> Extractor for RequestExtractor<'a> {
    fn get(&self, key: &str) -> Option<&str> {
        self.headers.get(key).and_then(|h| h.to_str().ok())
    }

    fn keys(&self) -> Vec<&str> {
        self.headers.keys().map(|s| s.as_str()).collect()
    }
}

struct RequestInjector<'a> {
    headers: &'a mut HeaderMap,
}

impl<'a> RequestInjector<'a> {
    fn new(headers: &'a mut HeaderMap) -> Self {
        RequestInjector { headers }
    }
}

impl<'a> Injector for RequestInjector<'a> {
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

#[cfg(test)]
mod tests {
    use actix_web::{test, web, App, HttpResponse};
    use opentelemetry::trace::{SpanKind, Status};
    use opentelemetry::Value;

    use super::*;
    use crate::testing;

    #[actix_web::test]
    async fn names_span_after_matched_route() {
        let (capture, options) = testing::capture();
        let app = test::init_service(
            App::new()
                .wrap(TraceLayer::with_options(options))
                .route("/items/{id}", web::get().to(HttpResponse::Ok)),
        )
        .await;

        let request = test::TestRequest::get().uri("/items/42").to_request();
        let response = test::call_service(&app, request).await;
        assert!(response.status().is_success());

        let spans = capture.spans();
        assert_eq!(spans.len(), 1);
        let span = &spans[0];
        assert_eq!(span.name, "/items/{id}");
        assert_eq!(span.span_kind, SpanKind::Server);
        assert_eq!(span.status, Status::Ok);
        assert_eq!(
            testing::attribute(span, "http.route"),
            Some(&Value::from("/items/{id}"))
        );
        assert_eq!(
            testing::attribute(span, "url.path"),
            Some(&Value::from("/items/42"))
        );
    }

    #[actix_web::test]
    async fn unmatched_route_gets_descriptive_name() {
        let (capture, options) = testing::capture();
        let app =
            test::init_service(App::new().wrap(TraceLayer::with_options(options))).await;

        let request = test::TestRequest::get().uri("/missing").to_request();
        let response = test::call_service(&app, request).await;
        assert_eq!(response.status().as_u16(), 404);

        let spans = capture.spans();
        let span = &spans[0];
        assert_eq!(span.name, "HTTP GET route not found");
        assert!(matches!(span.status, Status::Error { .. }));
        assert_eq!(
            testing::attribute(span, "http.response.status_code"),
            Some(&Value::I64(404))
        );
    }

    #[actix_web::test]
    async fn handler_error_is_recorded_and_returned_unchanged() {
        let (capture, options) = testing::capture();
        let app = test::init_service(
            App::new()
                .wrap(TraceLayer::with_options(options))
                .route(
                    "/items/{id}",
                    web::get().to(|| async {
                        Err::<HttpResponse, _>(actix_web::error::ErrorInternalServerError("boom"))
                    }),
                ),
        )
        .await;

        let request = test::TestRequest::get().uri("/items/42").to_request();
        let err = app.call(request).await.unwrap_err();
        assert_eq!(err.to_string(), "boom");

        let spans = capture.spans();
        assert_eq!(spans.len(), 1);
        let span = &spans[0];
        assert_eq!(span.name, "/items/{id}");
        assert_eq!(
            span.status,
            Status::Error {
                description: "boom".into()
            }
        );
        assert_eq!(
            testing::attribute(span, "exception.message"),
            Some(&Value::from("boom"))
        );
    }
}
