//! Configuration for startgate.
//!
//! Settings are layered with figment: built-in defaults, then an optional
//! TOML file, then `STARTGATE_` environment variables.

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const CONFIG_FILE_NAME: &str = "config.toml";
const APP_DIR_NAME: &str = "startgate";
const PREFERENCES_EXTENSION: &str = "db";

/// A single plain file name: no separators, no leading dot.
const STORE_NAME_PATTERN: &str = r"^[A-Za-z0-9][A-Za-z0-9_.-]*$";

/// Startgate settings.
///
/// Later sources win:
/// 1. defaults
/// 2. `<config_dir>/startgate/config.toml`, or the file given with `--config`
/// 3. environment variables such as `STARTGATE_RESOLVER__GRACE_PERIOD_MS`,
///    where `__` separates the section from the key
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Preferences storage configuration.
    pub preferences: PreferencesConfig,
    /// Start-destination resolver configuration.
    pub resolver: ResolverConfig,
}

/// Preferences storage configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreferencesConfig {
    /// Directory holding the preferences file; see [`Config::default_data_dir`].
    pub data_dir: Option<PathBuf>,
    /// Name of the preferences store; the file is `<store_name>.db`.
    pub store_name: String,
}

/// Resolver configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// How long the flag subscription outlives its last consumer, in
    /// milliseconds.
    pub grace_period_ms: u64,
}

impl Default for PreferencesConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            store_name: "startgate_settings".to_string(),
        }
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            grace_period_ms: 5_000,
        }
    }
}

impl Config {
    /// Load from the default file location and the environment.
    ///
    /// # Errors
    ///
    /// See [`Config::load_from`].
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load using `config_path` instead of the default file. A missing file
    /// contributes nothing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigLoad`] if a source cannot be parsed and
    /// [`Error::ConfigValidation`] if the merged values are invalid.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let file = config_path.unwrap_or_else(Self::default_config_path);

        let config: Config = Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(&file))
            .merge(Env::prefixed("STARTGATE_").split("__"))
            .extract()?;

        config.validate()?;
        Ok(config)
    }

    /// `<config_dir>/startgate/config.toml`.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(APP_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// `<data_local_dir>/startgate`.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(APP_DIR_NAME)
    }

    /// Check values that serde cannot.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigValidation`] for a store name that is not a
    /// plain file name.
    pub fn validate(&self) -> Result<()> {
        let pattern = regex::Regex::new(STORE_NAME_PATTERN)
            .map_err(|e| Error::internal(format!("bad store name pattern: {e}")))?;
        if !pattern.is_match(&self.preferences.store_name) {
            return Err(Error::ConfigValidation {
                message: format!(
                    "invalid store_name '{}': use letters, digits, '_', '.' or '-'",
                    self.preferences.store_name
                ),
            });
        }

        Ok(())
    }

    /// `<data_dir>/<store_name>.db`.
    #[must_use]
    pub fn preferences_path(&self) -> PathBuf {
        self.preferences
            .data_dir
            .clone()
            .unwrap_or_else(Self::default_data_dir)
            .join(format!(
                "{}.{PREFERENCES_EXTENSION}",
                self.preferences.store_name
            ))
    }

    /// The resolver grace period.
    #[must_use]
    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.resolver.grace_period_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert!(config.preferences.data_dir.is_none());
        assert_eq!(config.preferences.store_name, "startgate_settings");
        assert_eq!(config.resolver.grace_period_ms, 5_000);
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_path_in_store_name() {
        let mut config = Config::default();
        config.preferences.store_name = "../elsewhere".to_string();

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("invalid store_name"));
    }

    #[test]
    fn test_validate_rejects_empty_store_name() {
        let mut config = Config::default();
        config.preferences.store_name = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_preferences_path_default() {
        let path = Config::default().preferences_path();
        assert!(path.to_string_lossy().contains("startgate"));
        assert!(path.to_string_lossy().ends_with("startgate_settings.db"));
    }

    #[test]
    fn test_preferences_path_custom() {
        let mut config = Config::default();
        config.preferences.data_dir = Some(PathBuf::from("/custom/dir"));
        config.preferences.store_name = "prefs".to_string();

        assert_eq!(
            config.preferences_path(),
            PathBuf::from("/custom/dir/prefs.db")
        );
    }

    #[test]
    fn test_grace_period() {
        let config = Config::default();
        assert_eq!(config.grace_period(), Duration::from_secs(5));
    }

    #[test]
    fn test_default_config_path_ends_in_app_dir() {
        let path = Config::default_config_path();
        assert!(path.ends_with("startgate/config.toml"));
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let config = Config::load_from(Some(PathBuf::from("/nonexistent/config.toml"))).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_from_toml_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[preferences]
data_dir = "/srv/startgate"
store_name = "waiotech_settings"

[resolver]
grace_period_ms = 250
"#,
        )
        .unwrap();

        let config = Config::load_from(Some(path)).unwrap();
        assert_eq!(
            config.preferences_path(),
            PathBuf::from("/srv/startgate/waiotech_settings.db")
        );
        assert_eq!(config.grace_period(), Duration::from_millis(250));
    }

    #[test]
    fn test_load_rejects_invalid_store_name() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "[preferences]\nstore_name = \"a/b\"\n").unwrap();

        let result = Config::load_from(Some(path));
        assert!(matches!(result, Err(Error::ConfigValidation { .. })));
    }

    #[test]
    fn test_config_serialize() {
        let json = serde_json::to_string(&Config::default()).unwrap();
        assert!(json.contains("store_name"));
        assert!(json.contains("grace_period_ms"));
    }

    #[test]
    fn test_resolver_config_deserialize_partial() {
        let resolver: ResolverConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(resolver, ResolverConfig::default());
    }
}
