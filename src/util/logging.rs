//! Structured logging setup for hosts embedding hearth
//!
//! The library only emits `tracing` events; a host installs a subscriber once
//! through one of the functions here. `RUST_LOG` is respected, and without it
//! the chatty inference dependencies are capped at `warn`.
//!
//! # Example
//!
//! ```no_run
//! use hearth::util::logging;
//!
//! // With environment: HEARTH_LOG_LEVEL=debug HEARTH_LOG_JSON=true
//! logging::init_from_env();
//!
//! tracing::info!(model = "llama-3.2-1b", "Loading model");
//! ```

use std::env;
use std::sync::Once;
use tracing::Level;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

/// Dependencies capped at `warn` unless `RUST_LOG` says otherwise
const QUIET_TARGETS: [&str; 4] = [
    "candle_core",
    "candle_nn",
    "candle_transformers",
    "tokenizers",
];

/// Subscriber settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Threshold for events from hearth itself
    pub level: Level,
    /// One JSON object per event instead of human-readable lines
    pub use_json: bool,
    /// Show the emitting module, e.g. `hearth::inference::text`
    pub include_target: bool,
    /// Show file and line
    pub include_location: bool,
    /// Show thread ids and names
    pub include_thread_ids: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            use_json: false,
            include_target: true,
            include_location: false,
            include_thread_ids: false,
        }
    }
}

impl LoggingConfig {
    pub fn with_level(level: Level) -> Self {
        Self {
            level,
            ..Default::default()
        }
    }

    /// JSON output with full metadata, for log shippers
    pub fn production() -> Self {
        Self {
            level: Level::INFO,
            use_json: true,
            include_target: true,
            include_location: true,
            include_thread_ids: true,
        }
    }

    /// Debug level, plain output
    pub fn development() -> Self {
        Self::with_level(Level::DEBUG)
    }
}

/// Parses a level name case-insensitively; unknown names fall back to INFO
///
/// ```
/// use hearth::util::logging::parse_level;
/// use tracing::Level;
///
/// assert_eq!(parse_level("Debug"), Level::DEBUG);
/// assert_eq!(parse_level("loud"), Level::INFO);
/// ```
pub fn parse_level(level_str: &str) -> Level {
    match level_str.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => {
            // No subscriber exists yet to report this through.
            eprintln!(
                "Invalid log level '{}', defaulting to INFO. Valid levels: trace, debug, info, warn, error",
                level_str
            );
            Level::INFO
        }
    }
}

fn build_filter(level: Level, rust_log_set: bool) -> EnvFilter {
    let mut filter = EnvFilter::from_default_env();
    let mut directives = vec![format!("hearth={}", level)];
    if !rust_log_set {
        directives.extend(QUIET_TARGETS.iter().map(|target| format!("{}=warn", target)));
    }
    for directive in directives {
        if let Ok(directive) = directive.parse::<Directive>() {
            filter = filter.add_directive(directive);
        }
    }
    filter
}

/// Installs the global subscriber. Only the first call in a process has any
/// effect.
///
/// ```no_run
/// use hearth::util::{init_logging, LoggingConfig};
///
/// init_logging(LoggingConfig::development());
/// ```
pub fn init_logging(config: LoggingConfig) {
    INIT.call_once(|| {
        let filter = build_filter(config.level, env::var("RUST_LOG").is_ok());
        let registry = tracing_subscriber::registry().with(filter);

        if config.use_json {
            registry
                .with(
                    fmt::layer()
                        .json()
                        .with_target(config.include_target)
                        .with_file(config.include_location)
                        .with_line_number(config.include_location)
                        .with_thread_ids(config.include_thread_ids)
                        .with_thread_names(config.include_thread_ids),
                )
                .init();
        } else {
            registry
                .with(
                    fmt::layer()
                        .with_target(config.include_target)
                        .with_file(config.include_location)
                        .with_line_number(config.include_location)
                        .with_thread_ids(config.include_thread_ids)
                        .with_thread_names(config.include_thread_ids),
                )
                .init();
        }
    });
}

pub fn init_default() {
    init_logging(LoggingConfig::default());
}

/// Reads `HEARTH_LOG_LEVEL` (default `info`) and `HEARTH_LOG_JSON`
/// (default `false`)
pub fn init_from_env() {
    let level = env::var("HEARTH_LOG_LEVEL")
        .map(|value| parse_level(&value))
        .unwrap_or(Level::INFO);
    let use_json = env::var("HEARTH_LOG_JSON")
        .ok()
        .and_then(|value| value.parse::<bool>().ok())
        .unwrap_or(false);

    init_logging(LoggingConfig {
        level,
        use_json,
        ..Default::default()
    });
}

pub fn with_level(level_str: &str) {
    init_logging(LoggingConfig::with_level(parse_level(level_str)));
}
