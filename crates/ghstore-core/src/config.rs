use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Result, StoreError};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub store: StoreSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreSection {
    #[serde(default = "default_base_label")]
    pub base_label: String,
    #[serde(default = "default_uid_prefix")]
    pub uid_prefix: String,
    #[serde(default = "default_alias_prefix")]
    pub alias_prefix: String,
    #[serde(default = "default_merged_prefix")]
    pub merged_prefix: String,
    #[serde(default = "default_deprecated_by_prefix")]
    pub deprecated_by_prefix: String,
    #[serde(default = "default_deprecated_label")]
    pub deprecated_label: String,
    #[serde(default = "default_archived_label")]
    pub archived_label: String,
    #[serde(default)]
    pub reactions: ReactionConfig,
    #[serde(default)]
    pub retries: RetryConfig,
    #[serde(default)]
    pub aliases: AliasConfig,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            base_label: default_base_label(),
            uid_prefix: default_uid_prefix(),
            alias_prefix: default_alias_prefix(),
            merged_prefix: default_merged_prefix(),
            deprecated_by_prefix: default_deprecated_by_prefix(),
            deprecated_label: default_deprecated_label(),
            archived_label: default_archived_label(),
            reactions: ReactionConfig::default(),
            retries: RetryConfig::default(),
            aliases: AliasConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionConfig {
    #[serde(default = "default_processed_reaction")]
    pub processed: String,
    #[serde(default = "default_initial_state_reaction")]
    pub initial_state: String,
}

impl Default for ReactionConfig {
    fn default() -> Self {
        Self {
            processed: default_processed_reaction(),
            initial_state: default_initial_state_reaction(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_factor: default_backoff_factor(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasConfig {
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,
}

impl Default for AliasConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
        }
    }
}

impl StoreConfig {
    /// Check the invariants the store relies on.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Configuration`] naming the first offending key.
    pub fn validate(&self) -> Result<()> {
        let s = &self.store;
        let required = [
            ("store.base_label", &s.base_label),
            ("store.uid_prefix", &s.uid_prefix),
            ("store.alias_prefix", &s.alias_prefix),
            ("store.merged_prefix", &s.merged_prefix),
            ("store.deprecated_by_prefix", &s.deprecated_by_prefix),
            ("store.deprecated_label", &s.deprecated_label),
            ("store.archived_label", &s.archived_label),
            ("store.reactions.processed", &s.reactions.processed),
            ("store.reactions.initial_state", &s.reactions.initial_state),
        ];
        for (key, value) in required {
            if value.trim().is_empty() {
                return Err(StoreError::config(None, format!("{key} must not be empty")));
            }
        }

        let prefixes = [
            &s.uid_prefix,
            &s.alias_prefix,
            &s.merged_prefix,
            &s.deprecated_by_prefix,
        ];
        for (i, a) in prefixes.iter().enumerate() {
            for b in &prefixes[i + 1..] {
                if a.starts_with(b.as_str()) || b.starts_with(a.as_str()) {
                    return Err(StoreError::config(
                        None,
                        format!("label prefixes '{a}' and '{b}' overlap"),
                    ));
                }
            }
        }

        if s.reactions.processed == s.reactions.initial_state {
            return Err(StoreError::config(
                None,
                "store.reactions.processed and store.reactions.initial_state must differ",
            ));
        }
        if s.retries.max_attempts == 0 {
            return Err(StoreError::config(
                None,
                "store.retries.max_attempts must be at least 1",
            ));
        }
        if !s.retries.backoff_factor.is_finite() || s.retries.backoff_factor < 1.0 {
            return Err(StoreError::config(
                None,
                "store.retries.backoff_factor must be a finite number >= 1.0",
            ));
        }
        Ok(())
    }
}

/// Location of the per-user config file, if the platform has a config dir.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("ghstore/config.toml"))
}

/// Load configuration.
///
/// With an explicit `path` the file must exist. Without one, the per-user
/// default location is tried and silently skipped when absent.
///
/// # Errors
///
/// Returns [`StoreError::Configuration`] if the file cannot be read, parsed,
/// or validated.
pub fn load_config(path: Option<&Path>) -> Result<StoreConfig> {
    let (path, required) = match path {
        Some(p) => (p.to_path_buf(), true),
        None => match default_config_path() {
            Some(p) => (p, false),
            None => return Ok(StoreConfig::default()),
        },
    };

    if !path.exists() {
        if required {
            return Err(StoreError::config(Some(path), "file does not exist"));
        }
        return Ok(StoreConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .map_err(|e| StoreError::config(Some(path.clone()), format!("failed to read: {e}")))?;
    parse_config(&content).map_err(|err| match err {
        StoreError::Configuration { reason, .. } => StoreError::config(Some(path), reason),
        other => other,
    })
}

/// Parse and validate configuration from TOML text.
///
/// # Errors
///
/// Returns [`StoreError::Configuration`] on syntax or validation failure.
pub fn parse_config(content: &str) -> Result<StoreConfig> {
    let config = toml::from_str::<StoreConfig>(content)
        .map_err(|e| StoreError::config(None, e.to_string()))?;
    config.validate()?;
    Ok(config)
}

fn default_base_label() -> String {
    "stored-object".to_string()
}

fn default_uid_prefix() -> String {
    "UID:".to_string()
}

fn default_alias_prefix() -> String {
    "ALIAS-TO:".to_string()
}

fn default_merged_prefix() -> String {
    "MERGED-INTO:".to_string()
}

fn default_deprecated_by_prefix() -> String {
    "DEPRECATED-BY:".to_string()
}

fn default_deprecated_label() -> String {
    "deprecated-object".to_string()
}

fn default_archived_label() -> String {
    "archived".to_string()
}

fn default_processed_reaction() -> String {
    "+1".to_string()
}

fn default_initial_state_reaction() -> String {
    "rocket".to_string()
}

const fn default_max_attempts() -> u32 {
    3
}

const fn default_backoff_factor() -> f64 {
    2.0
}

const fn default_base_delay_ms() -> u64 {
    1000
}

const fn default_max_depth() -> u32 {
    5
}
