//! Reloader configuration
//!
//! Plain options live in [`ReloaderConfig`] and can be read from TOML:
//!
//! ```toml
//! cooldown = 0.5
//! subclasses = ["App", "Api::Base"]
//! ```
//!
//! Collaborators that cannot be serialized (logger, clock, load
//! capability) are handed to [`crate::ReloaderBuilder`] instead.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Deserializer};

use crate::error::{ReloadError, ReloadErrorContext, ReloadResult};

/// Default seconds between staleness checks of the same file
pub const DEFAULT_COOLDOWN_SECS: f64 = 1.0;

/// Scope-restriction roots: a single name or a list of names
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "OneOrMany")]
pub struct SubclassRoots(Vec<String>);

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl From<OneOrMany> for SubclassRoots {
    fn from(value: OneOrMany) -> Self {
        match value {
            OneOrMany::One(name) => SubclassRoots(vec![name]),
            OneOrMany::Many(names) => SubclassRoots(names),
        }
    }
}

impl SubclassRoots {
    pub fn names(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for SubclassRoots {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        SubclassRoots(iter.into_iter().map(Into::into).collect())
    }
}

/// Reloader configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReloaderConfig {
    /// Minimum time between two staleness checks of the same file
    #[serde(deserialize_with = "deserialize_secs")]
    pub cooldown: Duration,

    /// Check for changed files at all
    pub reload: bool,

    /// Restrict unloading to these roots and their live descendants
    pub subclasses: SubclassRoots,

    /// Use a filesystem watcher to avoid re-reading unchanged timestamps
    pub watch: bool,
}

impl Default for ReloaderConfig {
    fn default() -> Self {
        Self {
            cooldown: Duration::from_secs_f64(DEFAULT_COOLDOWN_SECS),
            reload: true,
            subclasses: SubclassRoots::default(),
            watch: false,
        }
    }
}

impl ReloaderConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(raw: &str) -> ReloadResult<Self> {
        toml::from_str(raw).map_err(|e| ReloadError::Config(e.to_string()))
    }

    /// Read and parse a TOML configuration file
    pub fn from_file(path: impl AsRef<Path>) -> ReloadResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).reload_context(path)?;
        Self::from_toml_str(&raw)
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn with_subclasses<I, S>(mut self, roots: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.subclasses = roots.into_iter().collect();
        self
    }

    /// Disable staleness checks; files load once and are never reloaded
    pub fn without_reload(mut self) -> Self {
        self.reload = false;
        self
    }
}

fn deserialize_secs<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let secs = f64::deserialize(deserializer)?;
    Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = ReloaderConfig::default();
        assert_eq!(config.cooldown, Duration::from_secs(1));
        assert!(config.reload);
        assert!(config.subclasses.is_empty());
        assert!(!config.watch);
    }

    #[test]
    fn test_subclasses_accepts_one_or_many() {
        let one = ReloaderConfig::from_toml_str(r#"subclasses = "App""#).unwrap();
        assert_eq!(one.subclasses.names(), ["App"]);

        let many = ReloaderConfig::from_toml_str(r#"subclasses = ["1", "Object"]"#).unwrap();
        assert_eq!(many.subclasses.names(), ["1", "Object"]);
    }

    #[test]
    fn test_cooldown_in_fractional_seconds() {
        let config = ReloaderConfig::from_toml_str("cooldown = 0.25\nreload = false").unwrap();
        assert_eq!(config.cooldown, Duration::from_millis(250));
        assert!(!config.reload);

        assert!(ReloaderConfig::from_toml_str("cooldown = -1.0").is_err());
        assert!(ReloaderConfig::from_toml_str("cooldwn = 1.0").is_err());
    }

    #[test]
    fn test_from_file() {
        let dir = TempDir::new().expect("Failed to create temp directory for config test");
        let path = dir.path().join("unreloader.toml");
        std::fs::write(&path, "cooldown = 0.0\nsubclasses = \"Api\"\n").unwrap();

        let config = ReloaderConfig::from_file(&path).unwrap();
        assert_eq!(config.cooldown, Duration::ZERO);
        assert_eq!(config.subclasses.names(), ["Api"]);

        let missing = ReloaderConfig::from_file(dir.path().join("missing.toml"));
        assert!(matches!(missing, Err(ReloadError::NotFound { .. })));
    }
}
