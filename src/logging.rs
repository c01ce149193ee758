//! # Structured Logging Module
//!
//! Subscriber setup for the `testdrive` binary plus structured helpers the
//! orchestration layer uses for runtime commands and phase changes.
//!
//! The library itself never installs a subscriber; embedding applications
//! and tests bring their own.

use chrono::Utc;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Environment variable selecting `json` output instead of compact text
pub const LOG_FORMAT_ENV: &str = "TESTDRIVE_LOG_FORMAT";

/// Initialize stderr logging for the binary.
///
/// `RUST_LOG` wins when set; otherwise the level is `info`, or `debug` when
/// `verbose` is true. Safe to call more than once.
pub fn init_logging(verbose: bool) {
    LOGGER_INITIALIZED.get_or_init(|| {
        let directive = default_directive(verbose);
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));

        let layer = if json_requested() {
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .json()
                .boxed()
        } else {
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .compact()
                .boxed()
        };

        // try_init: an embedding process may already own the global subscriber
        if tracing_subscriber::registry()
            .with(layer.with_filter(filter))
            .try_init()
            .is_err()
        {
            tracing::debug!("Global tracing subscriber already initialized");
        }
    });
}

fn default_directive(verbose: bool) -> &'static str {
    if verbose {
        "debug"
    } else {
        "info"
    }
}

fn json_requested() -> bool {
    std::env::var(LOG_FORMAT_ENV)
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}

/// Log a runtime command issued for a container
pub fn log_container_operation(
    operation: &str,
    container: &str,
    runtime_id: Option<&str>,
    status: &str,
    details: Option<&str>,
) {
    tracing::debug!(
        operation = %operation,
        container = %container,
        runtime_id = runtime_id,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "🐳 CONTAINER_OPERATION"
    );
}

/// Log a phase change of the session
pub fn log_phase_transition(from: &str, to: &str, reason: &str) {
    tracing::info!(
        from = %from,
        to = %to,
        reason = %reason,
        timestamp = %Utc::now().to_rfc3339(),
        "🔄 PHASE_TRANSITION"
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
