//! Logging setup
//!
//! Installs the global tracing subscriber. `RUST_LOG` still wins over the
//! configured level when set.

use crate::config::LoggingConfig;
use anyhow::Result;
use tracing::{Level, Subscriber};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

/// Output format for log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
    Compact,
}

impl LogFormat {
    pub fn parse(format: &str) -> Result<Self> {
        match format.to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            other => anyhow::bail!("Invalid log format: {}", other),
        }
    }
}

/// Level to use: DEBUG when verbose, otherwise the configured one
pub fn effective_level(config: &LoggingConfig, verbose: bool) -> Result<Level> {
    if verbose {
        return Ok(Level::DEBUG);
    }
    config
        .level
        .to_lowercase()
        .parse()
        .map_err(|e| anyhow::anyhow!("Failed to parse log level: {}", e))
}

/// Build the subscriber for the configured level and format
pub fn build_subscriber<W>(
    config: &LoggingConfig,
    verbose: bool,
    writer: W,
) -> Result<Box<dyn Subscriber + Send + Sync>>
where
    W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    let level = effective_level(config, verbose)?;
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer);

    Ok(match LogFormat::parse(&config.format)? {
        LogFormat::Json => Box::new(builder.json().finish()),
        LogFormat::Pretty => Box::new(builder.pretty().finish()),
        LogFormat::Compact => Box::new(builder.compact().finish()),
    })
}

/// Install the global subscriber
///
/// Logs go to stderr so stdout carries only response bodies.
pub fn init(config: &LoggingConfig, verbose: bool) -> Result<()> {
    let subscriber = build_subscriber(config, verbose, std::io::stderr)?;
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to install tracing subscriber: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{self, Write};
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_log_format_parsing() {
        assert_eq!(LogFormat::parse("json").unwrap(), LogFormat::Json);
        assert_eq!(LogFormat::parse("Pretty").unwrap(), LogFormat::Pretty);
        assert_eq!(LogFormat::parse("compact").unwrap(), LogFormat::Compact);
        assert!(LogFormat::parse("xml").is_err());
    }

    #[test]
    fn test_verbose_forces_debug() {
        let config = LoggingConfig {
            level: "error".to_string(),
            ..Default::default()
        };
        assert_eq!(effective_level(&config, true).unwrap(), Level::DEBUG);
        assert_eq!(effective_level(&config, false).unwrap(), Level::ERROR);
    }

    #[test]
    fn test_invalid_level_rejected() {
        let config = LoggingConfig {
            level: "loud".to_string(),
            ..Default::default()
        };
        assert!(effective_level(&config, false).is_err());
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_json_format_emits_json_lines() {
        let config = LoggingConfig {
            level: "info".to_string(),
            format: "json".to_string(),
        };
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = build_subscriber(&config, false, move || writer.clone()).unwrap();

        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!(status = 403, "Webhook rejected");
        });

        let output = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        let line: serde_json::Value = serde_json::from_str(output.trim()).unwrap();
        assert_eq!(line["level"], "WARN");
        assert_eq!(line["fields"]["message"], "Webhook rejected");
        assert_eq!(line["fields"]["status"], 403);
    }

    #[test]
    fn test_build_subscriber_rejects_unknown_format() {
        let config = LoggingConfig {
            level: "info".to_string(),
            format: "xml".to_string(),
        };
        assert!(build_subscriber(&config, false, std::io::sink).is_err());
    }
}
