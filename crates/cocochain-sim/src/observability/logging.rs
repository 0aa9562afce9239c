//! Structured logging initialization.

use crate::error::{Result, SimError};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable pretty format.
    Pretty,
    /// JSON format for log aggregation.
    Json,
}

impl LogFormat {
    fn as_str(self) -> &'static str {
        match self {
            LogFormat::Json => "json",
            LogFormat::Pretty => "pretty",
        }
    }
}

/// Initialize the logging system.
///
/// `RUST_LOG` takes precedence; otherwise every `cocochain*` target logs at
/// `level`.
///
/// # Example
///
/// ```rust,no_run
/// use cocochain_sim::observability::{init_logging, LogFormat};
///
/// init_logging("info", LogFormat::Json).unwrap();
/// ```
pub fn init_logging(level: &str, format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("cocochain={level}").into());

    let registry = tracing_subscriber::registry().with(env_filter);

    let installed = match format {
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(false)
                    .with_file(true)
                    .with_line_number(true)
                    .with_target(true),
            )
            .try_init(),
        LogFormat::Pretty => registry.with(fmt::layer().pretty()).try_init(),
    };
    installed.map_err(|e| SimError::Logging(e.to_string()))?;

    tracing::info!(
        level = %level,
        format = format.as_str(),
        "Logging initialized"
    );
    Ok(())
}
