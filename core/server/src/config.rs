use anyhow::{Context, Result};
use journal_composer::ContextLimits;
use std::path::PathBuf;

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:21960";

/// Server settings read from the environment
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub db_path: PathBuf,
    /// `None` allows any origin
    pub cors_origin: Option<String>,
    pub limits: ContextLimits,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    pub fn from_vars<F>(var: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let db_path = match var("JOURNAL_DB_PATH") {
            Some(path) => PathBuf::from(path),
            None => {
                let home = var("HOME").context("HOME not set and JOURNAL_DB_PATH not given")?;
                PathBuf::from(home).join(".local/share/journal-insight/journal.db")
            }
        };

        let defaults = ContextLimits::default();
        let limit = |key: &str, default: usize| -> Result<usize> {
            match var(key) {
                Some(raw) => raw
                    .trim()
                    .parse()
                    .with_context(|| format!("{} must be a number, got '{}'", key, raw)),
                None => Ok(default),
            }
        };

        let limits = ContextLimits {
            entries: limit("JOURNAL_CONTEXT_ENTRIES", defaults.entries)?,
            question_entries: limit("JOURNAL_QUESTION_ENTRIES", defaults.question_entries)?,
            entities: limit("JOURNAL_CONTEXT_ENTITIES", defaults.entities)?,
            relationships: limit("JOURNAL_CONTEXT_RELATIONSHIPS", defaults.relationships)?,
            answered_questions: limit("JOURNAL_CONTEXT_ANSWERS", defaults.answered_questions)?,
        };

        Ok(Self {
            bind_addr: var("JOURNAL_BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            db_path,
            cors_origin: var("JOURNAL_CORS_ORIGIN").filter(|origin| !origin.trim().is_empty()),
            limits,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ServerConfig::from_vars(vars(&[("HOME", "/home/alice")])).unwrap();

        assert_eq!(config.bind_addr, DEFAULT_BIND_ADDR);
        assert_eq!(
            config.db_path,
            PathBuf::from("/home/alice/.local/share/journal-insight/journal.db")
        );
        assert!(config.cors_origin.is_none());
        assert_eq!(config.limits, ContextLimits::default());
    }

    #[test]
    fn test_overrides() {
        let config = ServerConfig::from_vars(vars(&[
            ("JOURNAL_DB_PATH", "/tmp/journal.db"),
            ("JOURNAL_BIND_ADDR", "0.0.0.0:8080"),
            ("JOURNAL_CORS_ORIGIN", "http://localhost:5173"),
            ("JOURNAL_CONTEXT_ENTITIES", "50"),
        ]))
        .unwrap();

        assert_eq!(config.db_path, PathBuf::from("/tmp/journal.db"));
        assert_eq!(config.bind_addr, "0.0.0.0:8080");
        assert_eq!(config.cors_origin.as_deref(), Some("http://localhost:5173"));
        assert_eq!(config.limits.entities, 50);
        assert_eq!(config.limits.entries, 5);
    }

    #[test]
    fn test_bad_limit_is_rejected() {
        let result = ServerConfig::from_vars(vars(&[
            ("JOURNAL_DB_PATH", "/tmp/journal.db"),
            ("JOURNAL_CONTEXT_ENTRIES", "lots"),
        ]));
        assert!(result.is_err());
    }
}
