//! Tracing subscriber setup.

use anyhow::{anyhow, Result};
use tracing_subscriber::EnvFilter;
use unicam_core::config::LogSettings;

/// Filter directive when `RUST_LOG` is unset.
///
/// Each `-v` raises the configured level by one step, up to `trace`.
pub fn default_directive(settings: &LogSettings, verbose: u8) -> String {
    const LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];
    let configured = LEVELS
        .iter()
        .position(|l| l.eq_ignore_ascii_case(&settings.level))
        .unwrap_or(2);
    let index = (configured + usize::from(verbose)).min(LEVELS.len() - 1);
    LEVELS[index].to_string()
}

/// Install the global subscriber.
///
/// `RUST_LOG` wins over the configured level. Logs go to stderr so tool
/// output on stdout stays clean.
pub fn init(settings: &LogSettings, verbose: u8) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(settings, verbose)));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    let installed = match settings.format.as_str() {
        "json" => builder.json().try_init(),
        "compact" => builder.compact().try_init(),
        _ => builder.pretty().try_init(),
    };
    installed.map_err(|e| anyhow!("failed to install tracing subscriber: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(level: &str) -> LogSettings {
        LogSettings {
            level: level.to_string(),
            ..LogSettings::default()
        }
    }

    #[test]
    fn test_verbosity_raises_configured_level() {
        assert_eq!(default_directive(&settings("info"), 0), "info");
        assert_eq!(default_directive(&settings("warn"), 1), "info");
        assert_eq!(default_directive(&settings("INFO"), 2), "trace");
        assert_eq!(default_directive(&settings("debug"), 9), "trace");
    }
}
