//! Logging setup for sqlweave.
//!
//! All crates log through `tracing`. An application that has no subscriber of
//! its own can call [`init`], which installs one driven by environment
//! variables:
//!
//! - `SQLWEAVE_DEBUG=true|1|yes` - enable debug logging
//! - `SQLWEAVE_LOG_LEVEL=trace|debug|info|warn|error` - explicit level
//! - `SQLWEAVE_LOG_FORMAT=json|pretty|compact` - output format (default: json)
//!
//! Installing the subscriber needs the `tracing-subscriber` feature; without
//! it [`init`] only decides the settings.

use std::env;
use std::sync::Once;

static INIT: Once = Once::new();

/// Check if debug logging is enabled via `SQLWEAVE_DEBUG`.
#[inline]
pub fn is_debug_enabled() -> bool {
    env::var("SQLWEAVE_DEBUG")
        .map(|v| parse_flag(&v))
        .unwrap_or(false)
}

/// Get the configured log level.
///
/// Defaults to "debug" if `SQLWEAVE_DEBUG` is set, otherwise "warn".
pub fn get_log_level() -> &'static str {
    resolve_level(env::var("SQLWEAVE_LOG_LEVEL").ok().as_deref(), is_debug_enabled())
}

/// Get the configured log format. Defaults to "json".
pub fn get_log_format() -> &'static str {
    resolve_format(env::var("SQLWEAVE_LOG_FORMAT").ok().as_deref())
}

/// Initialize logging once. Later calls are no-ops.
pub fn init() {
    INIT.call_once(|| {
        if !is_debug_enabled() && env::var("SQLWEAVE_LOG_LEVEL").is_err() {
            return;
        }

        #[cfg(feature = "tracing-subscriber")]
        {
            use tracing_subscriber::{EnvFilter, fmt, prelude::*};

            let level = get_log_level();
            let filter = EnvFilter::try_new(format!(
                "sqlweave={},sqlweave_core={},sqlweave_mssql={}",
                level, level, level
            ))
            .unwrap_or_else(|_| EnvFilter::new("warn"));

            match get_log_format() {
                "json" => {
                    tracing_subscriber::registry()
                        .with(filter)
                        .with(fmt::layer().json())
                        .init();
                }
                "compact" => {
                    tracing_subscriber::registry()
                        .with(filter)
                        .with(fmt::layer().compact())
                        .init();
                }
                _ => {
                    tracing_subscriber::registry()
                        .with(filter)
                        .with(fmt::layer().pretty())
                        .init();
                }
            }

            tracing::info!(
                level = level,
                format = get_log_format(),
                "sqlweave logging initialized"
            );
        }
    });
}

fn parse_flag(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "true" | "1" | "yes")
}

fn resolve_level(requested: Option<&str>, debug: bool) -> &'static str {
    let fallback = if debug { "debug" } else { "warn" };
    match requested.map(str::to_lowercase).as_deref() {
        Some("trace") => "trace",
        Some("debug") => "debug",
        Some("info") => "info",
        Some("warn") => "warn",
        Some("error") => "error",
        _ => fallback,
    }
}

fn resolve_format(requested: Option<&str>) -> &'static str {
    match requested.map(str::to_lowercase).as_deref() {
        Some("pretty") => "pretty",
        Some("compact") => "compact",
        _ => "json",
    }
}
