//! Configuration loading
//!
//! Configuration is read from a RON file, then selected fields may be
//! overridden from `HERALD_*` environment variables. The file is located with
//! the following precedence:
//! 1. an explicit path (the `--config` flag)
//! 2. the `HERALD_CONFIG` environment variable
//! 3. `./herald.config.ron`
//! 4. `/etc/herald/herald.config.ron`
//!
//! If none exists the built-in defaults are used.

use std::{
    path::{Path, PathBuf},
    str::FromStr,
};

use herald_dispatch::{DispatchConfig, SystemError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::transport::SimulatedTransportConfig;

pub const CONFIG_ENV: &str = "HERALD_CONFIG";

const DEFAULT_PATHS: [&str; 2] = ["./herald.config.ron", "/etc/herald/herald.config.ron"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("HERALD_CONFIG points to non-existent file: {}", .0.display())]
    MissingFile(PathBuf),

    #[error("Failed to read config from {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config{}: {source}", origin(.path.as_deref()))]
    Parse {
        path: Option<PathBuf>,
        source: ron::error::SpannedError,
    },

    #[error("Invalid value {value:?} for {var}")]
    InvalidOverride { var: &'static str, value: String },

    #[error(transparent)]
    Invalid(#[from] SystemError),
}

fn origin(path: Option<&Path>) -> String {
    path.map_or_else(String::new, |p| format!(" from {}", p.display()))
}

/// Everything the herald binary is configured with
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HeraldConfig {
    #[serde(default)]
    pub dispatch: DispatchConfig,

    #[serde(default)]
    pub transport: SimulatedTransportConfig,
}

impl HeraldConfig {
    /// Parse a RON document; missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if the document is not valid RON for
    /// this structure.
    pub fn from_ron(raw: &str) -> Result<Self, ConfigError> {
        ron::from_str(raw).map_err(|source| ConfigError::Parse { path: None, source })
    }

    /// Read the configuration from `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        ron::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: Some(path.to_path_buf()),
            source,
        })
    }

    /// Locate, read, override and validate the configuration.
    ///
    /// `lookup` resolves environment variables. Returns the configuration and
    /// the file it came from, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if a located file cannot be used, an override does
    /// not parse, or the result fails validation.
    pub fn load(
        explicit: Option<&Path>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(Self, Option<PathBuf>), ConfigError> {
        let path = find_config_file(explicit, lookup(CONFIG_ENV))?;
        let mut config = match &path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        config.apply_env_overrides(lookup)?;
        config.dispatch.validate()?;

        Ok((config, path))
    }

    /// Apply the `HERALD_*` environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidOverride`] naming the first variable
    /// whose value does not parse.
    pub fn apply_env_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        let dispatch = &mut self.dispatch;

        override_from(
            &lookup,
            "HERALD_MAX_REQUESTS_PER_MINUTE",
            &mut dispatch.rate_limit.max_requests_per_minute,
        )?;
        override_from(
            &lookup,
            "HERALD_MAX_REQUESTS_PER_HOUR",
            &mut dispatch.rate_limit.max_requests_per_hour,
        )?;
        override_from(&lookup, "HERALD_COOLDOWN_SECS", &mut dispatch.rate_limit.cooldown_secs)?;
        override_from(&lookup, "HERALD_MAX_RETRIES", &mut dispatch.retry.max_retries)?;
        override_from(&lookup, "HERALD_RETRY_DELAY_MS", &mut dispatch.retry.base_retry_delay_ms)?;
        override_from(&lookup, "HERALD_MAX_CONCURRENT", &mut dispatch.max_concurrent)?;

        Ok(())
    }

    /// Render the configuration as pretty RON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_ron(&self) -> Result<String, ron::Error> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
    }
}

fn override_from<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    slot: &mut T,
) -> Result<(), ConfigError> {
    if let Some(value) = lookup(var) {
        *slot = value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidOverride { var, value })?;
    }

    Ok(())
}

/// Find the configuration file to use, if any.
///
/// # Errors
///
/// Returns [`ConfigError::MissingFile`] if `HERALD_CONFIG` names a file that
/// does not exist; an explicit path is checked when it is read.
pub fn find_config_file(
    explicit: Option<&Path>,
    env_path: Option<String>,
) -> Result<Option<PathBuf>, ConfigError> {
    if let Some(path) = explicit {
        return Ok(Some(path.to_path_buf()));
    }

    if let Some(env_path) = env_path {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return Ok(Some(path));
        }
        return Err(ConfigError::MissingFile(path));
    }

    Ok(DEFAULT_PATHS
        .iter()
        .map(PathBuf::from)
        .find(|path| path.exists()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::collections::HashMap;

    use herald_dispatch::{Backoff, CooldownMode};
    use pretty_assertions::assert_eq;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_empty_document_gives_defaults() {
        assert_eq!(HeraldConfig::from_ron("()").unwrap(), HeraldConfig::default());
    }

    #[test]
    fn test_partial_document() {
        let config = HeraldConfig::from_ron(
            r"(
                dispatch: (
                    rate_limit: (max_requests_per_minute: 10, cooldown_mode: Extend),
                    retry: (max_retries: 1, backoff: Linear, backoff_factor: 0.5),
                    max_concurrent: 3,
                ),
            )",
        )
        .unwrap();

        let dispatch = &config.dispatch;
        assert_eq!(dispatch.rate_limit.max_requests_per_minute, 10);
        assert_eq!(dispatch.rate_limit.max_requests_per_hour, 500);
        assert_eq!(dispatch.rate_limit.cooldown_mode, CooldownMode::Extend);
        assert_eq!(dispatch.retry.max_retries, 1);
        assert_eq!(dispatch.retry.backoff, Backoff::Linear);
        assert_eq!(dispatch.retry.base_retry_delay_ms, 5000);
        assert_eq!(dispatch.max_concurrent, 3);
    }

    #[test]
    fn test_parse_error() {
        let error = HeraldConfig::from_ron("(dispatch: 7)").unwrap_err();
        assert!(matches!(error, ConfigError::Parse { path: None, .. }));
    }

    #[test]
    fn test_round_trip_through_ron() {
        let mut config = HeraldConfig::default();
        config.dispatch.retry.jitter_factor = 0.25;
        let rendered = config.to_ron().unwrap();
        assert_eq!(HeraldConfig::from_ron(&rendered).unwrap(), config);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = HeraldConfig::default();
        config
            .apply_env_overrides(env(&[
                ("HERALD_MAX_REQUESTS_PER_MINUTE", "12"),
                ("HERALD_MAX_REQUESTS_PER_HOUR", "120"),
                ("HERALD_COOLDOWN_SECS", " 15 "),
                ("HERALD_MAX_RETRIES", "0"),
                ("HERALD_RETRY_DELAY_MS", "250"),
                ("HERALD_MAX_CONCURRENT", "9"),
            ]))
            .unwrap();

        let dispatch = &config.dispatch;
        assert_eq!(dispatch.rate_limit.max_requests_per_minute, 12);
        assert_eq!(dispatch.rate_limit.max_requests_per_hour, 120);
        assert_eq!(dispatch.rate_limit.cooldown_secs, 15);
        assert_eq!(dispatch.retry.max_retries, 0);
        assert_eq!(dispatch.retry.base_retry_delay_ms, 250);
        assert_eq!(dispatch.max_concurrent, 9);
    }

    #[test]
    fn test_bad_env_override_names_variable() {
        let mut config = HeraldConfig::default();
        let error = config
            .apply_env_overrides(env(&[("HERALD_MAX_CONCURRENT", "lots")]))
            .unwrap_err();
        assert_eq!(
            error.to_string(),
            "Invalid value \"lots\" for HERALD_MAX_CONCURRENT"
        );
    }

    #[test]
    fn test_load_from_file_with_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("herald.config.ron");
        std::fs::write(&path, "(dispatch: (max_concurrent: 4))").unwrap();

        let (config, used) =
            HeraldConfig::load(Some(&path), env(&[("HERALD_MAX_RETRIES", "7")])).unwrap();
        assert_eq!(used.as_deref(), Some(path.as_path()));
        assert_eq!(config.dispatch.max_concurrent, 4);
        assert_eq!(config.dispatch.retry.max_retries, 7);
    }

    #[test]
    fn test_load_rejects_invalid_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("herald.config.ron");
        std::fs::write(&path, "(dispatch: (max_concurrent: 0))").unwrap();

        let error = HeraldConfig::load(Some(&path), env(&[])).unwrap_err();
        assert!(matches!(error, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_env_path_must_exist() {
        let error = find_config_file(None, Some("/nonexistent/herald.ron".to_string())).unwrap_err();
        assert!(matches!(error, ConfigError::MissingFile(_)));
    }

    #[test]
    fn test_env_path_is_used() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let path = file.path().to_string_lossy().into_owned();
        assert_eq!(
            find_config_file(None, Some(path)).unwrap().as_deref(),
            Some(file.path())
        );
    }

    #[test]
    fn test_explicit_path_wins() {
        let explicit = Path::new("/explicit/herald.ron");
        assert_eq!(
            find_config_file(Some(explicit), Some("/nonexistent".to_string())).unwrap(),
            Some(explicit.to_path_buf())
        );
    }
}
