use std::env;

use opentelemetry::{global, trace::TraceError, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{propagation::TraceContextPropagator, runtime, trace::Sampler, Resource};
use thiserror::Error;
use tonic::metadata::{errors::InvalidMetadataValue, MetadataMap};
use tracing_core::LevelFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

const DEFAULT_ENDPOINT: &str = "http://localhost:4317";
const DEFAULT_SAMPLER_RATIO: f64 = 0.25;
const DEFAULT_SERVICE_VERSION: &str = "0.0.0";

/// Errors raised while installing the process-wide tracer.
///
/// Initialization failure is treated as fatal: [`init`] returns the error to
/// the caller instead of leaving the process running with tracing
/// half-configured. A deployment that prefers to degrade can still match on
/// the error and continue; this crate never swallows it.
#[derive(Debug, Error)]
pub enum SetupError {
    /// The otlp trace pipeline could not be installed.
    #[error("failed to install trace pipeline: {0}")]
    Trace(#[from] TraceError),
    /// The configured access token is not valid gRPC metadata.
    #[error("invalid access token: {0}")]
    AccessToken(#[from] InvalidMetadataValue),
    /// A tracing subscriber was already registered for this process.
    #[error("failed to set tracing subscriber: {0}")]
    Subscriber(#[from] tracing_subscriber::util::TryInitError),
}

/// Process-wide tracer configuration.
///
/// The sampler ratio is kept as the raw string so that an unparsable value
/// degrades to the default ratio instead of failing initialization.
#[derive(Clone, Debug)]
pub struct TracerConfig {
    pub service_name: String,
    pub service_version: Option<String>,
    pub collector_endpoint: String,
    pub access_token: Option<String>,
    pub sampler_ratio: Option<String>,
    pub enabled: bool,
}

impl TracerConfig {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            service_version: None,
            collector_endpoint: DEFAULT_ENDPOINT.to_string(),
            access_token: None,
            sampler_ratio: None,
            enabled: true,
        }
    }

    /// Reads the configuration from the environment. The service name can be
    /// configured using the env var `SERVICE_NAME`, otherwise the cargo name
    /// will be used. By default, everything is exported to
    /// `http://localhost:4317`; this can be changed via env var
    /// `OTEL_EXPORTER_OTLP_ENDPOINT`. Also recognized: `OTEL_SERVICE_VERSION`,
    /// `OTEL_ACCESS_TOKEN`, `OTEL_SAMPLER_RATIO` and `OTEL_SDK_DISABLED`.
    pub fn from_env() -> Self {
        let service_name =
            env::var("SERVICE_NAME").unwrap_or_else(|_| env!("CARGO_PKG_NAME").to_string());
        let mut config = Self::new(service_name);
        if let Ok(version) = env::var("OTEL_SERVICE_VERSION") {
            config.service_version = Some(version);
        }
        if let Ok(endpoint) = env::var("OTEL_EXPORTER_OTLP_ENDPOINT") {
            config.collector_endpoint = endpoint;
        }
        if let Ok(token) = env::var("OTEL_ACCESS_TOKEN") {
            config.access_token = Some(token);
        }
        if let Ok(ratio) = env::var("OTEL_SAMPLER_RATIO") {
            config.sampler_ratio = Some(ratio);
        }
        if let Ok(disabled) = env::var("OTEL_SDK_DISABLED") {
            config.enabled = !matches!(disabled.as_str(), "true" | "1");
        }
        config
    }
}

/// Sets up span export via otlp and registers the W3C `traceparent`
/// propagator and the tracer provider as the process-wide defaults.
///
/// This should generally be the first statement of any server binary's main
/// function. With `enabled` set to false only the log subscriber is
/// installed and spans are not exported.
pub fn init(config: TracerConfig) -> Result<(), SetupError> {
    global::set_text_map_propagator(TraceContextPropagator::new());

    if !config.enabled {
        Registry::default().with(env_filter()).try_init()?;
        tracing::info!("tracing disabled, spans will not be exported");
        return Ok(());
    }

    let mut invalid_ratio = None;
    let ratio = match config.sampler_ratio.as_deref() {
        None => DEFAULT_SAMPLER_RATIO,
        Some(raw) => sampler_ratio(raw).unwrap_or_else(|| {
            invalid_ratio = Some(raw.to_string());
            DEFAULT_SAMPLER_RATIO
        }),
    };

    let mut metadata = MetadataMap::new();
    if let Some(token) = &config.access_token {
        metadata.insert("access-token", token.parse()?);
    }

    let version = config
        .service_version
        .clone()
        .unwrap_or_else(|| DEFAULT_SERVICE_VERSION.to_string());

    let tracer = opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_exporter(
            opentelemetry_otlp::new_exporter()
                .tonic()
                .with_endpoint(config.collector_endpoint.clone())
                .with_metadata(metadata),
        )
        .with_trace_config(
            opentelemetry_sdk::trace::config()
                .with_sampler(Sampler::ParentBased(Box::new(Sampler::TraceIdRatioBased(
                    ratio,
                ))))
                .with_resource(Resource::new(vec![
                    KeyValue::new(
                        opentelemetry_semantic_conventions::resource::SERVICE_NAME,
                        config.service_name.clone(),
                    ),
                    KeyValue::new(
                        opentelemetry_semantic_conventions::resource::SERVICE_VERSION,
                        version,
                    ),
                ])),
        )
        .install_batch(runtime::Tokio)?;

    let telemetry = tracing_opentelemetry::layer().with_tracer(tracer);
    Registry::default()
        .with(env_filter())
        .with(telemetry)
        .try_init()?;

    if let Some(raw) = invalid_ratio {
        tracing::warn!(
            ratio = %raw,
            "invalid sampler ratio, using default {DEFAULT_SAMPLER_RATIO}"
        );
    }
    tracing::info!(service = %config.service_name, "tracing initialised");
    Ok(())
}

pub fn teardown() {
    global::shutdown_tracer_provider();
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::builder()
            .with_default_directive(LevelFilter::INFO.into())
            .from_env_lossy()
    })
}

fn sampler_ratio(raw: &str) -> Option<f64> {
    raw.parse::<f64>()
        .ok()
        .filter(|ratio| (0.0..=1.0).contains(ratio))
}
