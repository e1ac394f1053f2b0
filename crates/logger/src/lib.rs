//! Hierarchical logger factory (spec §4.6).
//!
//! A root logger carries process-scope fields (instance id, version,
//! commit, build date). Per-name child loggers are resolved by: exact
//! match in a literal table, then the first matching pattern in an
//! ordered regex list, then the root level. Both tables are built once
//! at construction; a bad level string or an invalid regex fails
//! construction rather than degrading silently at runtime.

use std::collections::HashMap;

use regex::Regex;
use thiserror::Error;
use tracing::Level;

/// Process-scope fields attached to every log line the root logger (and
/// by inheritance every child) emits.
#[derive(Debug, Clone)]
pub struct RootFields {
    pub instance_id: String,
    pub version: String,
    pub commit: String,
    pub build_date: String,
}

/// Declarative construction input: level strings, not `tracing::Level`,
/// so this can be built directly from a config file without this crate
/// depending on the config crate.
#[derive(Debug, Clone, Default)]
pub struct LoggerFactoryConfig {
    pub root_level: String,
    /// Exact logger name -> level string.
    pub literal: HashMap<String, String>,
    /// Ordered (regex pattern, level string) rules; first match wins.
    pub patterns: Vec<(String, String)>,
}

#[derive(Debug, Error)]
pub enum LoggerFactoryError {
    #[error("unknown log level '{0}'")]
    UnknownLevel(String),

    #[error("invalid level pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

fn parse_level(raw: &str) -> Result<Level, LoggerFactoryError> {
    match raw.to_ascii_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" | "warning" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        other => Err(LoggerFactoryError::UnknownLevel(other.to_string())),
    }
}

/// Resolves a level for any logger name and can be installed directly as
/// a `tracing_subscriber` per-layer filter.
#[derive(Debug, Clone)]
pub struct LoggerFactory {
    root: RootFields,
    root_level: Level,
    literal: HashMap<String, Level>,
    patterns: Vec<(Regex, Level)>,
}

impl LoggerFactory {
    /// Build the factory, compiling every pattern and parsing every level
    /// string up front. Construction fails fast on the first bad entry.
    pub fn new(root: RootFields, config: LoggerFactoryConfig) -> Result<Self, LoggerFactoryError> {
        let root_level = parse_level(&config.root_level)?;

        let mut literal = HashMap::with_capacity(config.literal.len());
        for (name, level) in config.literal {
            literal.insert(name, parse_level(&level)?);
        }

        let mut patterns = Vec::with_capacity(config.patterns.len());
        for (pattern, level) in config.patterns {
            let level = parse_level(&level)?;
            let regex = Regex::new(&pattern).map_err(|source| LoggerFactoryError::InvalidPattern {
                pattern: pattern.clone(),
                source,
            })?;
            patterns.push((regex, level));
        }

        Ok(Self {
            root,
            root_level,
            literal,
            patterns,
        })
    }

    /// The root logger's process-scope fields.
    pub fn root_fields(&self) -> &RootFields {
        &self.root
    }

    /// Resolve the effective level for a logger name: literal, then
    /// first-matching pattern in order, then the root level.
    pub fn level_for(&self, name: &str) -> Level {
        if let Some(level) = self.literal.get(name) {
            return *level;
        }
        for (pattern, level) in &self.patterns {
            if pattern.is_match(name) {
                return *level;
            }
        }
        self.root_level
    }

    /// Whether an event at `level` from logger `name` should be emitted.
    ///
    /// `tracing::Level` is ordered most-severe-first (`ERROR < TRACE`), so
    /// an event is enabled when it is at least as severe as the resolved
    /// threshold.
    pub fn is_enabled(&self, name: &str, level: Level) -> bool {
        level <= self.level_for(name)
    }
}

impl<S> tracing_subscriber::layer::Filter<S> for LoggerFactory {
    fn enabled(
        &self,
        meta: &tracing::Metadata<'_>,
        _ctx: &tracing_subscriber::layer::Context<'_, S>,
    ) -> bool {
        self.is_enabled(meta.target(), *meta.level())
    }
}

/// Install this factory as the process's global tracing subscriber: the
/// `fmt` layer does the rendering (JSON for production, compact
/// otherwise), the factory itself does the per-logger-name level
/// resolution in place of a plain `EnvFilter`.
pub fn install(factory: LoggerFactory, json: bool) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::Layer;

    if json {
        tracing_subscriber::registry()
            .with(chatcore_common::json_fmt_layer().with_filter(factory))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(chatcore_common::compact_fmt_layer().with_filter(factory))
            .init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root() -> RootFields {
        RootFields {
            instance_id: "inst-1".into(),
            version: "0.1.0".into(),
            commit: "deadbeef".into(),
            build_date: "2026-01-01".into(),
        }
    }

    #[test]
    fn falls_back_to_root_level() {
        let factory = LoggerFactory::new(
            root(),
            LoggerFactoryConfig {
                root_level: "info".into(),
                ..Default::default()
            },
        )
        .unwrap();

        assert_eq!(factory.level_for("presence::heartbeat"), Level::INFO);
    }

    #[test]
    fn literal_match_wins_over_root() {
        let mut literal = HashMap::new();
        literal.insert("presence".to_string(), "debug".to_string());

        let factory = LoggerFactory::new(
            root(),
            LoggerFactoryConfig {
                root_level: "warn".into(),
                literal,
                patterns: vec![],
            },
        )
        .unwrap();

        assert_eq!(factory.level_for("presence"), Level::DEBUG);
        assert_eq!(factory.level_for("email"), Level::WARN);
    }

    #[test]
    fn first_matching_pattern_wins() {
        let factory = LoggerFactory::new(
            root(),
            LoggerFactoryConfig {
                root_level: "info".into(),
                literal: HashMap::new(),
                patterns: vec![
                    ("^health::.*".to_string(), "trace".to_string()),
                    ("^health::deep$".to_string(), "error".to_string()),
                ],
            },
        )
        .unwrap();

        // First pattern in order wins even though the second is a more
        // specific match for "health::deep".
        assert_eq!(factory.level_for("health::deep"), Level::TRACE);
        assert_eq!(factory.level_for("health::shallow"), Level::TRACE);
        assert_eq!(factory.level_for("presence"), Level::INFO);
    }

    #[test]
    fn literal_takes_precedence_over_pattern() {
        let mut literal = HashMap::new();
        literal.insert("health::deep".to_string(), "error".to_string());

        let factory = LoggerFactory::new(
            root(),
            LoggerFactoryConfig {
                root_level: "info".into(),
                literal,
                patterns: vec![("^health::.*".to_string(), "trace".to_string())],
            },
        )
        .unwrap();

        assert_eq!(factory.level_for("health::deep"), Level::ERROR);
        assert_eq!(factory.level_for("health::shallow"), Level::TRACE);
    }

    #[test]
    fn unknown_level_string_fails_construction() {
        let result = LoggerFactory::new(
            root(),
            LoggerFactoryConfig {
                root_level: "verbose".into(),
                ..Default::default()
            },
        );
        assert!(matches!(result, Err(LoggerFactoryError::UnknownLevel(_))));
    }

    #[test]
    fn invalid_regex_fails_construction() {
        let result = LoggerFactory::new(
            root(),
            LoggerFactoryConfig {
                root_level: "info".into(),
                literal: HashMap::new(),
                patterns: vec![("(unterminated".to_string(), "debug".to_string())],
            },
        );
        assert!(matches!(
            result,
            Err(LoggerFactoryError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn is_enabled_respects_severity_ordering() {
        let factory = LoggerFactory::new(
            root(),
            LoggerFactoryConfig {
                root_level: "warn".into(),
                ..Default::default()
            },
        )
        .unwrap();

        assert!(factory.is_enabled("anything", Level::ERROR));
        assert!(factory.is_enabled("anything", Level::WARN));
        assert!(!factory.is_enabled("anything", Level::INFO));
        assert!(!factory.is_enabled("anything", Level::DEBUG));
    }
}
