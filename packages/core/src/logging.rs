use std::env;
use std::str::FromStr;

use clap::ValueEnum;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

/// Output format for log lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Compact human-readable lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("Invalid LOG_FORMAT: {} (expected text or json)", other)),
        }
    }
}

const DEFAULT_LEVEL: &str = "info";
const QUIET_DEPENDENCIES: &str = "hyper=warn,reqwest=warn";

/// `RUST_LOG` wins when set; otherwise `LOG_LEVEL` picks the base level.
fn filter_directives(rust_log: Option<String>, log_level: Option<String>) -> String {
    if let Some(directives) = rust_log.filter(|v| !v.trim().is_empty()) {
        return directives;
    }

    let level = match log_level.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
        Some(level @ ("trace" | "debug" | "info" | "warn" | "error" | "off")) => level.to_string(),
        Some("warning") => "warn".to_string(),
        Some("critical") => "error".to_string(),
        _ => DEFAULT_LEVEL.to_string(),
    };
    format!("{},{}", level, QUIET_DEPENDENCIES)
}

fn env_filter() -> EnvFilter {
    let directives = filter_directives(env::var("RUST_LOG").ok(), env::var("LOG_LEVEL").ok());
    EnvFilter::try_new(directives)
        .unwrap_or_else(|_| EnvFilter::new(format!("{},{}", DEFAULT_LEVEL, QUIET_DEPENDENCIES)))
}

/// Initialize structured logging for the application.
///
/// This must be called once at startup (in main.rs).
pub fn init_logging(format: LogFormat) {
    let builder = fmt().with_env_filter(env_filter()).with_target(false);

    match format {
        LogFormat::Text => builder.compact().init(),
        LogFormat::Json => builder.json().flatten_event(true).with_current_span(true).init(),
    }

    info!(?format, "Logging initialized");
}
