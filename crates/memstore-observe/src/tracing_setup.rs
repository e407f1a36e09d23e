//! Subscriber construction with structured logging and optional
//! OpenTelemetry trace export.
//!
//! Storage components take an explicit `tracing::Dispatch`; [`build_dispatch`]
//! produces one without touching global state. Binaries that want a
//! process-wide subscriber call [`init_tracing`] instead.
//!
//! # Usage
//!
//! ```no_run
//! use memstore_observe::tracing_setup::{build_dispatch, TracingOptions};
//!
//! // Dispatch to hand to a storage backend
//! let dispatch = build_dispatch(&TracingOptions::default());
//!
//! // JSON lines with OpenTelemetry export to stdout, installed globally
//! let options = TracingOptions { json: true, enable_otel: true, ..TracingOptions::default() };
//! memstore_observe::tracing_setup::init_tracing(&options).unwrap();
//! ```

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_sdk::trace::SdkTracerProvider;
use tracing::Dispatch;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Layer};

use std::sync::OnceLock;

/// Stores the OTel tracer provider so it can be shut down cleanly on exit.
static TRACER_PROVIDER: OnceLock<SdkTracerProvider> = OnceLock::new();

/// How the subscriber renders and exports events.
#[derive(Debug, Clone)]
pub struct TracingOptions {
    /// Filter used when `RUST_LOG` is unset or unparsable.
    pub default_filter: String,
    /// Emit JSON lines instead of the human-readable format.
    pub json: bool,
    /// Bridge spans to OpenTelemetry with a stdout exporter.
    pub enable_otel: bool,
}

impl Default for TracingOptions {
    fn default() -> Self {
        Self {
            default_filter: "info".to_string(),
            json: false,
            enable_otel: false,
        }
    }
}

/// Build a subscriber and wrap it in a `Dispatch`. Installs nothing globally
/// except the OTel tracer provider when `enable_otel` is set.
///
/// - `EnvFilter` honors `RUST_LOG`, falling back to `default_filter`.
/// - The `fmt` layer shows targets and span close timing, or writes JSON.
pub fn build_dispatch(options: &TracingOptions) -> Dispatch {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&options.default_filter));

    let fmt_layer = if options.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_span_events(FmtSpan::CLOSE)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_span_events(FmtSpan::CLOSE)
            .boxed()
    };

    let otel_layer = options.enable_otel.then(|| {
        let provider = TRACER_PROVIDER
            .get_or_init(|| {
                let provider = SdkTracerProvider::builder()
                    .with_simple_exporter(opentelemetry_stdout::SpanExporter::default())
                    .build();
                opentelemetry::global::set_tracer_provider(provider.clone());
                provider
            })
            .clone();
        tracing_opentelemetry::layer().with_tracer(provider.tracer("memstore"))
    });

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .with(otel_layer);

    Dispatch::new(subscriber)
}

/// Install [`build_dispatch`]'s subscriber as the global default.
///
/// # Errors
///
/// Returns an error if a global subscriber has already been set.
pub fn init_tracing(options: &TracingOptions) -> Result<(), Box<dyn std::error::Error>> {
    tracing::dispatcher::set_global_default(build_dispatch(options))?;
    Ok(())
}

/// Flush pending traces and shut down the OpenTelemetry tracer provider.
///
/// Safe to call even when OTel was not enabled (no-op in that case).
pub fn shutdown_tracing() {
    if let Some(provider) = TRACER_PROVIDER.get() {
        if let Err(e) = provider.shutdown() {
            eprintln!("Warning: OTel tracer provider shutdown error: {e}");
        }
    }
}
