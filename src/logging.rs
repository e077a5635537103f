//! Logging setup
//!
//! Logging goes through `tracing`. The settings live in a [`LogConfig`]
//! owned by whoever builds the process (the binary's `main`), which calls
//! [`init`] once.

use std::borrow::Cow;
use std::io;

use serde::{Deserialize, Serialize};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::{ScanError, ScanResult};

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Filter directives used when `RUST_LOG` is not set
    pub filter: String,
    /// Prefix lines with a timestamp (turn off when the sink adds its own)
    pub timestamps: bool,
    /// Replace control characters in logged stream data
    pub sanitize: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "warn".to_string(),
            timestamps: true,
            sanitize: true,
        }
    }
}

impl LogConfig {
    /// Make stream data safe to log, if sanitizing is enabled
    pub fn scrub<'a>(&self, text: &'a str) -> Cow<'a, str> {
        if self.sanitize {
            sanitize(text)
        } else {
            Cow::Borrowed(text)
        }
    }
}

/// Install the global subscriber, writing to stderr
pub fn init(config: &LogConfig) -> ScanResult<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.filter)
            .map_err(|e| ScanError::Logging(format!("bad filter {:?}: {e}", config.filter)))?,
    };

    let timed = config
        .timestamps
        .then(|| tracing_subscriber::fmt::layer().with_writer(io::stderr));
    let untimed = (!config.timestamps).then(|| {
        tracing_subscriber::fmt::layer()
            .without_time()
            .with_writer(io::stderr)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(timed)
        .with(untimed)
        .try_init()
        .map_err(|e| ScanError::Logging(e.to_string()))
}

/// Replace C0 controls other than newline and tab with their Unicode
/// control pictures (U+2400 block), so child output cannot inject escape
/// sequences into a log.
pub fn sanitize(text: &str) -> Cow<'_, str> {
    if !text.chars().any(needs_picture) {
        return Cow::Borrowed(text);
    }
    Cow::Owned(
        text.chars()
            .map(|c| {
                if needs_picture(c) {
                    char::from_u32(0x2400 + c as u32).unwrap_or(char::REPLACEMENT_CHARACTER)
                } else {
                    c
                }
            })
            .collect(),
    )
}

fn needs_picture(c: char) -> bool {
    c < ' ' && c != '\n' && c != '\t'
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_plain_is_borrowed() {
        assert!(matches!(sanitize("hello world"), Cow::Borrowed(_)));
    }

    #[test]
    fn test_sanitize_escape() {
        assert_eq!(sanitize("\x1b[31mred"), "\u{241B}[31mred");
    }

    #[test]
    fn test_sanitize_keeps_newline_and_tab() {
        assert_eq!(sanitize("a\tb\nc\r"), "a\tb\nc\u{240D}");
        assert_eq!(sanitize("\0"), "\u{2400}");
    }

    #[test]
    fn test_scrub_respects_config() {
        let mut config = LogConfig::default();
        assert_eq!(config.scrub("\x07"), "\u{2407}");
        config.sanitize = false;
        assert_eq!(config.scrub("\x07"), "\x07");
    }
}
