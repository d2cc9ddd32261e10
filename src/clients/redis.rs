//! Span adapters for redis-style key-value stores.
//!
//! Two surfaces: [`span`] for tracing a single hand-written operation, and
//! [`TracedClient`], a facade that intercepts every command dispatched
//! through a pooled, cluster or ring client and reports it as one client
//! span per command.

use std::error::Error;
use std::iter;

use opentelemetry::{Context, KeyValue};
use opentelemetry_semantic_conventions::trace::{DB_STATEMENT, DB_SYSTEM};

use crate::{clients, config::TraceOptions, span::SpanGuard};

const SCOPE: &str = "otelware-redis";
const SYSTEM: &str = "redis";

/// Starts a client span for a key-value operation, named `"<operation> <key>"`.
/// The returned guard ends the span at the end of the operation.
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
        format!("{operation} {key}"),
        vec![
            KeyValue::new(DB_SYSTEM, SYSTEM),
            KeyValue::new(DB_STATEMENT, clients::statement([operation, key, value])),
        ],
    )
}

/// Client topology selected when wrapping, mirroring the pooled, cluster and
/// ring client shapes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Topology {
    Pooled,
    Cluster,
    Ring,
}

/// A command dispatched through a key-value client: a name plus the
/// arguments used to build the span's statement attribute.
pub trait Command {
    fn name(&self) -> &str;
    fn args(&self) -> Vec<String>;
}

/// The underlying client call. Implemented over the concrete driver so the
/// facade stays independent of any single client crate.
pub trait Dispatcher {
    type Command: Command;
    type Output;
    type Error: Error;

    fn dispatch(&mut self, command: &Self::Command) -> Result<Self::Output, Self::Error>;
}

/// Wraps a client so every dispatched command is reported as a client span
/// named after the command.
pub struct TracedClient<D> {
    inner: D,
    topology: Topology,
    options: TraceOptions,
}

impl<D: Dispatcher> TracedClient<D> {
    pub fn wrap(inner: D, topology: Topology) -> Self {
        Self {
            inner,
            topology,
            options: TraceOptions::default(),
        }
    }

    pub fn with_options(mut self, options: TraceOptions) -> Self {
        self.options = options;
        self
    }

    pub fn topology(&self) -> Topology {
        self.topology
    }

    pub fn inner(&self) -> &D {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut D {
        &mut self.inner
    }

    pub fn into_inner(self) -> D {
        self.inner
    }

    /// Dispatches `command`, reporting it as a client span parented on `cx`.
    /// The result is returned unchanged; a failed dispatch flips the span
    /// status to error before the span ends.
    pub fn dispatch(
        &mut self,
        cx: &Context,
        command: &D::Command,
    ) -> Result<D::Output, D::Error> {
        let args = command.args();
        let statement = clients::statement(
            iter::once(command.name()).chain(args.iter().map(String::as_str)),
        );
        let span = clients::start_client_span(
            &self.options,
            cx,
            SCOPE,
            command.name().to_string(),
            vec![
                KeyValue::new(DB_SYSTEM, SYSTEM),
                KeyValue::new(DB_STATEMENT, statement),
            ],
        );

        let result = self.inner.dispatch(command);
        if let Err(err) = &result {
            span.record_error(err);
        }
        span.end();
        result
    }
}
