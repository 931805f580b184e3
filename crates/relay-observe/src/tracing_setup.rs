//! Tracing subscriber initialization with structured logging, a daily log
//! file, and optional OpenTelemetry trace export.
//!
//! # Usage
//!
//! ```no_run
//! use relay_observe::tracing_setup::{TracingOptions, init_tracing, shutdown_tracing};
//!
//! let _guard = init_tracing(&TracingOptions {
//!     log_dir: Some("/var/log/magnet-relay".into()),
//!     ..TracingOptions::default()
//! })
//! .unwrap();
//! // ... run ...
//! shutdown_tracing();
//! ```

use std::path::PathBuf;
use std::sync::OnceLock;

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_sdk::trace::SdkTracerProvider;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// File name prefix of the daily log file (`relay.log.YYYY-MM-DD`).
pub const LOG_FILE_PREFIX: &str = "relay.log";

/// Stores the OTel tracer provider so it can be shut down cleanly on exit.
static TRACER_PROVIDER: OnceLock<SdkTracerProvider> = OnceLock::new();

#[derive(Debug, Clone, Default)]
pub struct TracingOptions {
    /// `-v` count: 0 = info, 1 = debug, 2+ = trace.
    pub verbosity: u8,
    /// Only warnings and errors on the console filter.
    pub quiet: bool,
    /// JSON lines on the console instead of human-readable output.
    pub json: bool,
    /// Directory for the daily-rotated log file; `None` disables it.
    pub log_dir: Option<PathBuf>,
    /// Bridge spans to OpenTelemetry with a stdout exporter.
    pub enable_otel: bool,
}

/// Keeps the background log-file writer alive. Dropping it flushes and
/// closes the file.
#[must_use = "dropping the guard stops file logging"]
pub struct TracingGuard {
    _file: Option<WorkerGuard>,
}

/// Default filter directive when `RUST_LOG` is unset.
pub fn default_directive(options: &TracingOptions) -> &'static str {
    if options.quiet {
        return "warn";
    }
    match options.verbosity {
        0 => "info,hyper=warn,reqwest=warn",
        1 => "debug,hyper=info,reqwest=info",
        _ => "trace",
    }
}

/// Initialize the global tracing subscriber.
///
/// - Always installs a console `fmt` layer on stderr (human or JSON).
/// - With a log directory, adds a non-blocking daily-rotated file layer.
/// - When `enable_otel` is true, additionally bridges tracing spans to
///   OpenTelemetry using a stdout exporter.
/// - Respects `RUST_LOG`; otherwise the level follows the verbosity flags.
///
/// # Errors
///
/// Returns an error if the global subscriber has already been set.
pub fn init_tracing(options: &TracingOptions) -> Result<TracingGuard, Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(options)));

    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true);
    let console_layer = if options.json {
        console_layer.json().boxed()
    } else {
        console_layer.boxed()
    };

    let mut file_guard = None;
    let file_layer = match &options.log_dir {
        Some(log_dir) => match std::fs::create_dir_all(log_dir) {
            Ok(()) => {
                let appender = RollingFileAppender::new(Rotation::DAILY, log_dir, LOG_FILE_PREFIX);
                let (writer, guard) = tracing_appender::non_blocking(appender);
                file_guard = Some(guard);
                Some(
                    tracing_subscriber::fmt::layer()
                        .with_writer(writer)
                        .with_ansi(false)
                        .with_target(true)
                        .with_span_events(FmtSpan::CLOSE)
                        .boxed(),
                )
            }
            Err(e) => {
                eprintln!(
                    "Warning: failed to create log directory {}: {e}",
                    log_dir.display()
                );
                None
            }
        },
        None => None,
    };

    let otel_layer = if options.enable_otel {
        let provider = SdkTracerProvider::builder()
            .with_simple_exporter(opentelemetry_stdout::SpanExporter::default())
            .build();
        let tracer = provider.tracer("magnet-relay");

        let _ = TRACER_PROVIDER.set(provider.clone());
        opentelemetry::global::set_tracer_provider(provider);
        Some(tracing_opentelemetry::layer().with_tracer(tracer).boxed())
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .with(otel_layer)
        .try_init()?;

    tracing::debug!(
        log_dir = ?options.log_dir,
        otel = options.enable_otel,
        "tracing initialized"
    );

    Ok(TracingGuard { _file: file_guard })
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
