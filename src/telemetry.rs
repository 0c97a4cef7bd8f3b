//! OpenTelemetry tracing export
//!
//! The exporter reads its endpoint from `OTEL_EXPORTER_OTLP_ENDPOINT`.

use opentelemetry::KeyValue;
use opentelemetry_sdk::{runtime, trace as sdktrace, Resource};
use tracing::Subscriber;
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::registry::LookupSpan;

/// Service name reported on every exported span
pub const SERVICE_NAME: &str = "guestbook-operator";

/// Build an OTLP tracing layer for `subscriber`
///
/// Returns `None` when the exporter pipeline cannot be installed, in which
/// case logging continues without trace export.
pub fn init_telemetry<S>(_subscriber: &S) -> Option<OpenTelemetryLayer<S, sdktrace::Tracer>>
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    let tracer = opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_exporter(opentelemetry_otlp::new_exporter().tonic())
        .with_trace_config(sdktrace::config().with_resource(Resource::new(vec![
            KeyValue::new("service.name", SERVICE_NAME),
            KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
        ])))
        .install_batch(runtime::Tokio);

    match tracer {
        Ok(tracer) => Some(tracing_opentelemetry::layer().with_tracer(tracer)),
        Err(e) => {
            eprintln!("Failed to install OTLP exporter: {}", e);
            None
        }
    }
}

/// Flush pending spans and stop the exporter
pub fn shutdown_telemetry() {
    opentelemetry::global::shutdown_tracer_provider();
}
