// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use opentelemetry::{KeyValue, trace::TracerProvider};
use opentelemetry_appender_tracing::layer::OpenTelemetryTracingBridge;
use opentelemetry_otlp::{LogExporter as OtlpLogExporter, Protocol, WithExportConfig};
use opentelemetry_sdk::logs::SdkLoggerProvider;
use opentelemetry_semantic_conventions::attribute::{SERVICE_NAME, SERVICE_VERSION};
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

use opentelemetry_sdk::{
    Resource,
    trace::{Sampler, SdkTracerProvider},
};

const SERVICE: &str = "extension-gatekeeper";
const DEFAULT_OTLP_ENDPOINT: &str = "http://localhost:4318";

/// Which exporter receives log records when OpenTelemetry log export is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogExporterKind {
    Otlp,
    Console,
}

impl LogExporterKind {
    /// Reads `OTEL_LOGS_EXPORTER`, defaulting to OTLP.
    pub fn from_env() -> Result<Self, String> {
        let value = std::env::var("OTEL_LOGS_EXPORTER").unwrap_or_else(|_| "otlp".to_string());
        Self::parse(&value)
    }

    pub fn parse(value: &str) -> Result<Self, String> {
        match value.trim().to_lowercase().as_str() {
            "otlp" => Ok(LogExporterKind::Otlp),
            "console" => Ok(LogExporterKind::Console),
            other => Err(format!("Unsupported OTEL_LOGS_EXPORTER value: {other}")),
        }
    }
}

fn env_filter(debug: bool) -> EnvFilter {
    let level = if debug { "debug" } else { "info" };
    EnvFilter::new(format!("opentelemetry_sdk=info,{level}"))
}

fn resource() -> Resource {
    Resource::builder()
        .with_attributes([
            KeyValue::new(SERVICE_NAME, SERVICE),
            KeyValue::new(SERVICE_VERSION, env!("CARGO_PKG_VERSION")),
        ])
        .build()
}

fn log_provider(kind: LogExporterKind, resource: Resource) -> Result<SdkLoggerProvider, String> {
    let builder = SdkLoggerProvider::builder().with_resource(resource);
    let provider = match kind {
        LogExporterKind::Console => builder
            .with_simple_exporter(opentelemetry_stdout::LogExporter::default())
            .build(),
        LogExporterKind::Otlp => {
            let endpoint = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
                .unwrap_or_else(|_| DEFAULT_OTLP_ENDPOINT.to_string());
            builder
                .with_batch_exporter(
                    OtlpLogExporter::builder()
                        .with_tonic()
                        .with_endpoint(endpoint)
                        .build()
                        .map_err(|err| err.to_string())?,
                )
                .build()
        }
    };
    Ok(provider)
}

pub fn init_tracing(
    enable_otel_logs: bool,
    debug: bool,
) -> Result<SdkTracerProvider, Box<dyn std::error::Error>> {
    let filter = env_filter(debug);
    let otlp_span_exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_protocol(Protocol::HttpBinary)
        .with_timeout(Duration::from_secs(5))
        .build()
        .map_err(|err| err.to_string())?;

    let resource = resource();
    let trace_provider = SdkTracerProvider::builder()
        .with_batch_exporter(otlp_span_exporter)
        .with_sampler(Sampler::AlwaysOn)
        .with_resource(resource.clone())
        .build();
    let registry = tracing_subscriber::registry()
        .with(filter.clone())
        .with(tracing_opentelemetry::layer().with_tracer(trace_provider.tracer(SERVICE)));

    if enable_otel_logs {
        let provider = log_provider(LogExporterKind::from_env()?, resource)?;
        let otel_log_layer = OpenTelemetryTracingBridge::new(&provider).with_filter(filter);
        registry.with(otel_log_layer).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
    Ok(trace_provider)
}

pub fn log_startup(debug: bool) {
    info!("Starting {SERVICE} v{}", env!("CARGO_PKG_VERSION"));
    if debug {
        info!("Debug mode enabled");
    }
}
