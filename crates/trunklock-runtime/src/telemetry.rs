//! Tracing setup for trunklock processes.
//!
//! [`init_tracing`] installs one global subscriber: an [`EnvFilter`], a
//! console formatter and, when a collector is configured, an OpenTelemetry
//! layer.  Every set-state request opens a `set_target_state` span and its
//! detached actuation runs in a child `actuation` span, both tagged with the
//! compartment subtype.  An exported trace therefore shows the confirmation
//! and the wake / telemetry / command calls of one request together, even
//! though they finish on different tasks.
//!
//! | Variable | Effect |
//! |---|---|
//! | `RUST_LOG` | Filter directives (default `info`). |
//! | `TRUNKLOCK_LOG_FORMAT` | `json` for newline-delimited JSON, anything else for compact lines. |
//! | `OTEL_EXPORTER_OTLP_ENDPOINT` | Collector base URL; enables OTLP/HTTP span export. |

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{Resource, trace::SdkTracerProvider};
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

/// Instrumentation scope reported with every exported span.
const TRACER_NAME: &str = "trunklock-runtime";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

impl LogFormat {
    fn from_env_value(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some(v) if v.eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Compact,
        }
    }
}

/// Everything [`init_tracing_with`] needs, resolved up front so the
/// subscriber wiring itself never touches the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracingSettings {
    pub filter: String,
    pub format: LogFormat,
    pub otlp_endpoint: Option<String>,
}

impl Default for TracingSettings {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            format: LogFormat::Compact,
            otlp_endpoint: None,
        }
    }
}

impl TracingSettings {
    pub fn from_env() -> Self {
        Self {
            filter: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            format: LogFormat::from_env_value(std::env::var("TRUNKLOCK_LOG_FORMAT").ok().as_deref()),
            otlp_endpoint: std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
                .ok()
                .filter(|endpoint| !endpoint.trim().is_empty()),
        }
    }
}

/// Initialise the global subscriber from the environment.
///
/// Hold the returned guard for the lifetime of the process.
pub fn init_tracing(service_name: &str) -> TracerProviderGuard {
    init_tracing_with(service_name, TracingSettings::from_env())
}

/// Initialise the global subscriber from explicit settings.
///
/// An invalid filter falls back to `info`.  If a global subscriber is already
/// installed the call leaves it in place.
pub fn init_tracing_with(service_name: &str, settings: TracingSettings) -> TracerProviderGuard {
    let env_filter = EnvFilter::try_new(&settings.filter).unwrap_or_else(|e| {
        eprintln!("[trunklock] invalid log filter {:?}: {e}", settings.filter);
        EnvFilter::new("info")
    });

    let provider = settings
        .otlp_endpoint
        .as_deref()
        .and_then(|endpoint| build_provider(service_name, endpoint));
    let otel_layer = provider
        .as_ref()
        .map(|p| tracing_opentelemetry::layer().with_tracer(p.tracer(TRACER_NAME)));

    let fmt_layer = match settings.format {
        LogFormat::Json => tracing_subscriber::fmt::layer().json().boxed(),
        LogFormat::Compact => tracing_subscriber::fmt::layer().compact().boxed(),
    };

    if let Err(e) = tracing_subscriber::registry()
        .with(env_filter)
        .with(otel_layer)
        .with(fmt_layer)
        .try_init()
    {
        eprintln!("[trunklock] tracing already initialised: {e}");
    }

    TracerProviderGuard(provider)
}

/// Shuts the OTLP provider down on drop, flushing pending spans.
pub struct TracerProviderGuard(Option<SdkTracerProvider>);

impl TracerProviderGuard {
    pub fn is_exporting(&self) -> bool {
        self.0.is_some()
    }
}

impl Drop for TracerProviderGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.0.take()
            && let Err(e) = provider.shutdown()
        {
            eprintln!("[trunklock] OpenTelemetry provider shutdown error: {e}");
        }
    }
}

fn build_provider(service_name: &str, endpoint: &str) -> Option<SdkTracerProvider> {
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| eprintln!("[trunklock] OTLP exporter init failed: {e}"))
        .ok()?;

    let resource = Resource::builder()
        .with_service_name(service_name.to_string())
        .build();

    Some(
        SdkTracerProvider::builder()
            .with_resource(resource)
            // Synchronous: the CLI starts its Tokio runtime after this call.
            .with_simple_exporter(exporter)
            .build(),
    )
}
