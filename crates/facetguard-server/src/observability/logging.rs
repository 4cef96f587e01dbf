//! Structured logging configuration.
//!
//! Log entries from the resolver and the evaluators (skipped domains,
//! missing node state, invalidations) go through `tracing`. This module
//! installs the subscriber.
//!
//! # Log Format
//!
//! When JSON formatting is enabled, log entries are output as JSON objects:
//!
//! ```json
//! {"timestamp":"2024-01-15T10:30:00.000Z","level":"WARN","target":"facetguard_domain::resolver","fields":{"message":"skipping domain outside configured locations","domain":"/content/rogue"}}
//! ```

use std::str::FromStr;

use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    prelude::*,
    EnvFilter,
};

use crate::config::LoggingSettings;

/// Crates whose events are filtered at the configured level; everything else
/// logs at WARN.
const ENGINE_TARGETS: [&str; 3] = ["facetguard_domain", "facetguard_storage", "facetguard_server"];

/// Output format and verbosity of the engine's logs.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub json_format: bool,
    /// Level for the engine crates when RUST_LOG is not set
    pub default_level: Level,
    /// Emit span enter/exit events (session opening is instrumented)
    pub include_spans: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self::from(&LoggingSettings::default())
    }
}

impl LoggingConfig {
    pub fn with_level(mut self, level: Level) -> Self {
        self.default_level = level;
        self
    }

    pub fn with_spans(mut self) -> Self {
        self.include_spans = true;
        self
    }

    /// Filter directives used when RUST_LOG is absent.
    pub fn directives(&self) -> String {
        let level = self.default_level.to_string().to_lowercase();
        let mut directives = vec!["warn".to_string()];
        directives.extend(ENGINE_TARGETS.iter().map(|target| format!("{target}={level}")));
        directives.join(",")
    }

    fn span_events(&self) -> FmtSpan {
        if self.include_spans {
            FmtSpan::NEW | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        }
    }
}

impl From<&LoggingSettings> for LoggingConfig {
    /// Unknown levels fall back to INFO; `FacetGuardConfig::validate` rejects them earlier.
    fn from(settings: &LoggingSettings) -> Self {
        Self {
            json_format: settings.json,
            default_level: Level::from_str(&settings.level).unwrap_or(Level::INFO),
            include_spans: false,
        }
    }
}

/// Installs the global subscriber.
///
/// Returns false when a subscriber was already installed; the existing one
/// stays in place.
pub fn init_logging(config: &LoggingConfig) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.directives()));
    let registry = tracing_subscriber::registry().with(filter);

    let installed = if config.json_format {
        let layer = fmt::layer()
            .json()
            .with_span_events(config.span_events())
            .with_current_span(true)
            .with_file(false)
            .with_line_number(false);
        tracing::subscriber::set_global_default(registry.with(layer))
    } else {
        let layer = fmt::layer()
            .compact()
            .with_span_events(config.span_events());
        tracing::subscriber::set_global_default(registry.with(layer))
    };
    installed.is_ok()
}

/// JSON subscriber over `writer` with every engine event enabled.
pub fn create_json_layer<W>(writer: W) -> impl tracing::Subscriber + Send + Sync
where
    W: for<'writer> tracing_subscriber::fmt::MakeWriter<'writer> + Send + Sync + 'static,
{
    let config = LoggingConfig::default().with_level(Level::TRACE);
    tracing_subscriber::registry()
        .with(EnvFilter::new(config.directives()))
        .with(
            fmt::layer()
                .json()
                .with_writer(writer)
                .with_current_span(true),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use facetguard_storage::{MemoryRoleStore, RoleDefinition};
    use std::sync::{Arc, Mutex};

    #[derive(Clone)]
    struct CaptureWriter {
        buffer: Arc<Mutex<Vec<u8>>>,
    }

    impl CaptureWriter {
        fn new() -> Self {
            Self {
                buffer: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn get_output(&self) -> String {
            let buffer = self.buffer.lock().unwrap();
            String::from_utf8_lossy(&buffer).to_string()
        }
    }

    impl std::io::Write for CaptureWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            let mut buffer = self.buffer.lock().unwrap();
            buffer.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for CaptureWriter {
        type Writer = CaptureWriter;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[test]
    fn test_logging_config_from_settings() {
        let settings = LoggingSettings {
            level: "debug".to_string(),
            json: true,
        };
        let config = LoggingConfig::from(&settings);
        assert!(config.json_format);
        assert_eq!(config.default_level, Level::DEBUG);

        let fallback = LoggingConfig::from(&LoggingSettings {
            level: "loud".to_string(),
            json: false,
        });
        assert_eq!(fallback.default_level, Level::INFO);
    }

    #[test]
    fn test_directives_scope_level_to_engine_crates() {
        let config = LoggingConfig::default().with_level(Level::DEBUG).with_spans();
        assert_eq!(
            config.directives(),
            "warn,facetguard_domain=debug,facetguard_storage=debug,facetguard_server=debug"
        );
        assert!(config.include_spans);
        assert!(!config.json_format);
    }

    #[test]
    fn test_engine_warnings_are_json_formatted() {
        // Arrange
        let writer = CaptureWriter::new();
        let subscriber = create_json_layer(writer.clone());
        let roles = MemoryRoleStore::default();
        roles.put_role(RoleDefinition::new("editor", ["jcr:write"]).including("ghost"));

        // Act
        tracing::subscriber::with_default(subscriber, || {
            roles.effective_privileges("editor");
        });

        // Assert
        let output = writer.get_output();
        let line = output
            .lines()
            .find(|line| line.contains("included role is not defined"))
            .expect("warning should be logged");
        let json: serde_json::Value = serde_json::from_str(line).unwrap();
        assert_eq!(json["level"], "WARN");
        assert_eq!(json["fields"]["role"], "ghost");
        assert!(json.get("target").is_some());
    }
}
