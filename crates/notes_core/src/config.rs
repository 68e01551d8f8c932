//! Store and repository configuration.
//!
//! Defaults suit tests (in-memory store); `from_env` reads the deployment
//! overrides:
//! - `NOTES_DB_PATH`: store file path, unset for in-memory.
//! - `NOTES_TTL_SWEEP_SECS`: expiry sweep interval, `0` disables the sweeper.
//! - `NOTES_COLLECTION`: collection holding notes.

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_COLLECTION: &str = "notes";
const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

const ENV_DB_PATH: &str = "NOTES_DB_PATH";
const ENV_SWEEP_SECS: &str = "NOTES_TTL_SWEEP_SECS";
const ENV_COLLECTION: &str = "NOTES_COLLECTION";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError {
    pub key: &'static str,
    pub message: String,
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid `{}`: {}", self.key, self.message)
    }
}

impl Error for ConfigError {}

/// Connection-level settings for [`crate::store::Database::open`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub path: Option<PathBuf>,
    /// SQLite busy timeout for file-backed stores shared across processes.
    pub busy_timeout: Duration,
    /// Background expiry sweep interval; `None` disables the sweeper.
    pub expiry_sweep_interval: Option<Duration>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: None,
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
            expiry_sweep_interval: Some(DEFAULT_SWEEP_INTERVAL),
        }
    }
}

impl StoreConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(path) = lookup(ENV_DB_PATH).filter(|value| !value.trim().is_empty()) {
            config.path = Some(PathBuf::from(path.trim()));
        }

        if let Some(raw) = lookup(ENV_SWEEP_SECS) {
            let secs = raw.trim().parse::<u64>().map_err(|err| ConfigError {
                key: ENV_SWEEP_SECS,
                message: format!("expected whole seconds, got `{raw}`: {err}"),
            })?;
            config.expiry_sweep_interval = (secs > 0).then(|| Duration::from_secs(secs));
        }

        Ok(config)
    }
}

/// Repository-level settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoConfig {
    pub collection: String,
}

impl Default for RepoConfig {
    fn default() -> Self {
        Self {
            collection: DEFAULT_COLLECTION.to_string(),
        }
    }
}

impl RepoConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        match lookup(ENV_COLLECTION).filter(|value| !value.trim().is_empty()) {
            Some(collection) => Self {
                collection: collection.trim().to_string(),
            },
            None => Self::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{RepoConfig, StoreConfig};
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::time::Duration;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn empty_environment_yields_defaults() {
        let config = StoreConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, StoreConfig::default());
        assert_eq!(RepoConfig::from_lookup(lookup(&[])).collection, "notes");
    }

    #[test]
    fn overrides_are_applied() {
        let config = StoreConfig::from_lookup(lookup(&[
            ("NOTES_DB_PATH", " /var/lib/notes.db "),
            ("NOTES_TTL_SWEEP_SECS", "5"),
        ]))
        .unwrap();
        assert_eq!(config.path, Some(PathBuf::from("/var/lib/notes.db")));
        assert_eq!(config.expiry_sweep_interval, Some(Duration::from_secs(5)));

        let repo = RepoConfig::from_lookup(lookup(&[("NOTES_COLLECTION", "archive")]));
        assert_eq!(repo.collection, "archive");
    }

    #[test]
    fn zero_sweep_interval_disables_sweeper_and_garbage_is_rejected() {
        let config = StoreConfig::from_lookup(lookup(&[("NOTES_TTL_SWEEP_SECS", "0")])).unwrap();
        assert_eq!(config.expiry_sweep_interval, None);

        let err = StoreConfig::from_lookup(lookup(&[("NOTES_TTL_SWEEP_SECS", "soon")]))
            .unwrap_err();
        assert_eq!(err.key, "NOTES_TTL_SWEEP_SECS");
    }
}
