use std::fs::OpenOptions;
use std::sync::Arc;

use tracing::Level;
use tracing_subscriber::{
    fmt::{self, writer::BoxMakeWriter},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

use crate::config::LoggingConfig;

/// Install the global `tracing` subscriber
///
/// `RUST_LOG` wins over `config.level` when set. Without it only this crate
/// logs at the configured level; HTTP dependencies are held at `warn`.
/// Tokens and client secrets are never recorded as event fields.
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_directives(&config.level)?)?,
    };

    let writer = match &config.file_path {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            BoxMakeWriter::new(Arc::new(file))
        }
        None => BoxMakeWriter::new(std::io::stdout),
    };

    let layer = match config.format.as_str() {
        "json" => fmt::layer()
            .json()
            .with_current_span(true)
            .with_target(true)
            .with_writer(writer)
            .boxed(),
        "pretty" => fmt::layer()
            .pretty()
            .with_target(true)
            .with_file(false)
            .with_writer(writer)
            .boxed(),
        other => anyhow::bail!("Invalid log format: {other}"),
    };

    tracing_subscriber::registry().with(layer).with(filter).try_init()?;
    Ok(())
}

fn default_directives(level: &str) -> anyhow::Result<String> {
    let level = parse_log_level(level)?;
    Ok(format!(
        "warn,repoauth_core={}",
        level.as_str().to_ascii_lowercase()
    ))
}

fn parse_log_level(level: &str) -> anyhow::Result<Level> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" | "warning" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => Err(anyhow::anyhow!("Invalid log level: {level}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_log_level() {
        assert_eq!(parse_log_level("DEBUG").unwrap(), Level::DEBUG);
        assert_eq!(parse_log_level("warning").unwrap(), Level::WARN);
        assert!(parse_log_level("loud").is_err());
    }

    #[test]
    fn test_default_directives_scope_this_crate() {
        assert_eq!(default_directives("debug").unwrap(), "warn,repoauth_core=debug");
        assert!(EnvFilter::try_new(default_directives("Info").unwrap()).is_ok());
    }

    #[test]
    fn test_init_logging_rejects_bad_settings() {
        let bad_level = LoggingConfig {
            level: "loud".to_string(),
            ..LoggingConfig::default()
        };
        let bad_format = LoggingConfig {
            format: "xml".to_string(),
            ..LoggingConfig::default()
        };
        if std::env::var_os("RUST_LOG").is_none() {
            assert!(init_logging(&bad_level).is_err());
        }
        assert!(init_logging(&bad_format).is_err());
    }
}
