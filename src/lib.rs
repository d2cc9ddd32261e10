//! # Observability adapters
//! This crate wires OpenTelemetry span creation into http middleware stacks
//! and into calls made against backend clients.
//!
//! ## Setup
//! The process-wide tracer is installed with [`setup::init`]. This should be
//! the first call of any server binary.
//!
//! ## Http Trace Propagation
//! [`propagation`] provides functions for injecting and extracting trace
//! context into/from [`http::Request`]s.
//!
//! When using [`tower`] based http frameworks like [`axum`](https://docs.rs/axum/latest/axum), the middleware [`middleware::tower::TraceLayer`] can
//! be used to handle the extraction parts of http requests, correlating traces
//! across different services. An equivalent [`middleware::actix::TraceLayer`]
//! exists for actix-web.
//!
//! Generally, the middleware should be used on every http route, this usually
//! means that it can be registered globally and in the last position, to be the
//! first to run.
//!
//! ## Backend Clients
//! [`clients`] opens client spans around memcached, document-store and
//! key-value-store calls. One-off operations use the per-backend `span`
//! functions; [`clients::redis::TracedClient`] wraps a whole client so every
//! dispatched command is reported as its own span.

pub mod clients;
pub mod config;
pub mod middleware;
pub mod propagation;
pub mod setup;
pub mod span;
pub mod trace_id;

#[cfg(test)]
pub(crate) mod testing;
