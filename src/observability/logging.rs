//! Logging initialization.
//!
//! Structured logging via `tracing`, written to stderr so the stdio wire
//! protocol keeps stdout to itself. Verbosity maps to a default filter
//! directive; `REDARENA_LOG_LEVEL` overrides it when set.

use std::io::IsTerminal;
use tracing_subscriber::EnvFilter;

use crate::cli::args::ColorChoice;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable format with optional ANSI colors.
    #[default]
    Human,
    /// Newline-delimited JSON for machine consumption.
    Json,
}

const DIRECTIVES: [&str; 4] = ["warn", "info", "debug", "trace"];

/// Maps a `-v` count to a tracing directive, saturating at `trace`.
#[must_use]
pub const fn verbosity_to_directive(verbosity: u8) -> &'static str {
    let idx = if verbosity as usize >= DIRECTIVES.len() {
        DIRECTIVES.len() - 1
    } else {
        verbosity as usize
    };
    DIRECTIVES[idx]
}

fn ansi_enabled(color: ColorChoice) -> bool {
    match color {
        ColorChoice::Auto => {
            std::io::stderr().is_terminal() && std::env::var_os("NO_COLOR").is_none()
        }
        ColorChoice::Always => true,
        ColorChoice::Never => false,
    }
}

/// Initializes the global tracing subscriber.
///
/// Uses `try_init()` so repeated calls (tests, embedders that already
/// installed a subscriber) are harmless.
pub fn init_logging(format: LogFormat, verbosity: u8, color: ColorChoice) {
    let filter = EnvFilter::try_from_env("REDARENA_LOG_LEVEL")
        .unwrap_or_else(|_| EnvFilter::new(verbosity_to_directive(verbosity)));

    // Module targets only matter once you are debugging.
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbosity >= 2)
        .with_writer(std::io::stderr);

    let _ = match format {
        LogFormat::Human => builder.with_ansi(ansi_enabled(color)).try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directive_mapping_saturates() {
        let expected = [(0, "warn"), (1, "info"), (2, "debug"), (3, "trace")];
        for (v, directive) in expected {
            assert_eq!(verbosity_to_directive(v), directive);
        }
        assert_eq!(verbosity_to_directive(200), "trace");
    }

    #[test]
    fn repeated_init_is_harmless() {
        init_logging(LogFormat::Human, 0, ColorChoice::Never);
        init_logging(LogFormat::Json, 3, ColorChoice::Never);
    }

    #[test]
    fn never_disables_ansi() {
        assert!(!ansi_enabled(ColorChoice::Never));
        assert!(ansi_enabled(ColorChoice::Always));
    }
}
