//! # Structured Logging Module
//!
//! Environment-aware structured logging that outputs to both console and a
//! JSON log file, for debugging the session manager and the monitoring loops.

use chrono::Utc;
use std::fs;
use std::path::PathBuf;
use std::process;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging with environment-specific configuration
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let log_level = get_log_level(&environment);

        let console_layer = fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_level(true)
            .with_ansi(true)
            .with_filter(env_filter(&log_level));

        let log_dir = PathBuf::from("log");
        if let Err(error) = fs::create_dir_all(&log_dir) {
            // Console only when the log directory is not writable
            let _ = tracing_subscriber::registry().with(console_layer).try_init();
            tracing::warn!(
                error = %error,
                log_dir = %log_dir.display(),
                "🔧 STRUCTURED LOGGING: Log directory unavailable, console only"
            );
            return;
        }

        // log/<env>.<pid>.<timestamp>.log
        let pid = process::id();
        let timestamp = Utc::now().format("%Y%m%d_%H%M%S").to_string();
        let log_filename = format!("{environment}.{pid}.{timestamp}.log");
        let log_path = log_dir.join(&log_filename);

        let file_appender = tracing_appender::rolling::never(&log_dir, &log_filename);
        let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

        let subscriber = tracing_subscriber::registry().with(console_layer).with(
            fmt::layer()
                .with_writer(file_writer)
                .with_target(true)
                .with_thread_ids(true)
                .with_level(true)
                .with_ansi(false)
                .json()
                .with_filter(env_filter(&log_level)),
        );

        // Embedding applications may already own the global subscriber
        if subscriber.try_init().is_err() {
            tracing::debug!("Global tracing subscriber already initialized - continuing with existing subscriber");
        }

        tracing::info!(
            pid = pid,
            environment = %environment,
            log_file = %log_path.display(),
            "🔧 STRUCTURED LOGGING: Initialized with file output"
        );

        // The writer must outlive the process
        std::mem::forget(guard);
    });
}

/// `RUST_LOG` wins over the environment default
fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Get current environment from environment variables
fn get_environment() -> String {
    std::env::var("SENTINEL_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

/// Get log level based on environment
fn get_log_level(environment: &str) -> String {
    match environment {
        "production" => "info".to_string(),
        _ => "debug".to_string(),
    }
}

/// Log structured data for session lifecycle events
pub fn log_session_operation(
    operation: &str,
    priority: &str,
    attempt: u32,
    status: &str,
    duration_ms: Option<u64>,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        priority = %priority,
        attempt = attempt,
        status = %status,
        duration_ms = duration_ms,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "💾 SESSION_OPERATION"
    );
}

/// Log structured data for alert lifecycle events
pub fn log_alert_operation(
    operation: &str,
    alert_id: &str,
    level: &str,
    metric: &str,
    value: f64,
    details: Option<&str>,
) {
    tracing::warn!(
        operation = %operation,
        alert_id = %alert_id,
        level = %level,
        metric = %metric,
        value = value,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "🚨 ALERT_OPERATION"
    );
}

/// Log a collector that failed during a tick
pub fn log_collector_failure(collector: &str, error: &str) {
    tracing::warn!(
        collector = %collector,
        error = %error,
        timestamp = %Utc::now().to_rfc3339(),
        "📊 COLLECTOR_FAILURE"
    );
}

/// Log error with full context
pub fn log_error(component: &str, operation: &str, error: &str, context: Option<&str>) {
    tracing::error!(
        component = %component,
        operation = %operation,
        error = %error,
        context = context,
        timestamp = %Utc::now().to_rfc3339(),
        "❌ ERROR"
    );
}
