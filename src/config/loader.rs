//! Configuration Loader
//!
//! Environment-aware configuration loading. Handles file discovery, environment
//! detection, layering and validation.

use super::error::ConfigResult;
use super::BankConfig;
use ::config::{Config, Environment, File};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Loaded configuration plus the context it was loaded in
#[derive(Debug)]
pub struct ConfigManager {
    config: BankConfig,
    environment: String,
    config_directory: PathBuf,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from_directory(None)
    }

    /// Load configuration from a specific directory
    pub fn load_from_directory(config_dir: Option<PathBuf>) -> ConfigResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load configuration from a specific directory with explicit environment.
    /// Useful for testing without modifying global environment variables.
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let config_directory = config_dir.unwrap_or_else(Self::default_config_directory);

        debug!(
            "Loading configuration for environment '{}' from directory: {}",
            environment,
            config_directory.display()
        );

        let config = Self::load_layers(&config_directory, environment)?;
        config.validate()?;

        debug!(
            "Configuration loaded: {}",
            serde_json::to_string(&Self::sanitize_config_for_logging(&config))
                .unwrap_or_else(|_| "[serialization error]".to_string())
        );

        info!(
            environment = environment,
            rpc_address = %config.server.rpc_address,
            http_address = %config.server.http_address,
            workers = config.processor.concurrency,
            "⚙️ CONFIG: Configuration loaded successfully"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory,
        }))
    }

    /// Wrap an already-built configuration (tests, embedding)
    pub fn from_config(config: BankConfig, environment: &str) -> ConfigResult<Arc<ConfigManager>> {
        config.validate()?;
        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory: Self::default_config_directory(),
        }))
    }

    pub fn config(&self) -> &BankConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }

    /// Configuration with secrets masked, for diagnostics
    pub fn debug_config(&self) -> serde_json::Value {
        Self::sanitize_config_for_logging(&self.config)
    }

    /// Detect the environment from `SIMPLEBANK_ENV`, then `APP_ENV`
    pub fn detect_environment() -> String {
        crate::logging::get_environment()
    }

    fn default_config_directory() -> PathBuf {
        env::var("SIMPLEBANK_CONFIG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config"))
    }

    fn load_layers(config_directory: &Path, environment: &str) -> ConfigResult<BankConfig> {
        let base = config_directory.join("base.toml");
        let env_specific = config_directory.join(format!("{environment}.toml"));

        let settings = Config::builder()
            .add_source(File::from(base).required(false))
            .add_source(File::from(env_specific).required(false))
            .add_source(
                Environment::with_prefix("SIMPLEBANK")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("processor.queues"),
            )
            .build()?;

        Ok(settings.try_deserialize::<BankConfig>()?)
    }

    fn sanitize_config_for_logging(config: &BankConfig) -> serde_json::Value {
        let mut config_json = serde_json::json!(config);
        let sensitive_patterns = ["password", "secret", "key", "token", "url"];
        Self::sanitize_json_recursive(&mut config_json, &sensitive_patterns);
        config_json
    }

    fn sanitize_json_recursive(value: &mut serde_json::Value, sensitive_patterns: &[&str]) {
        match value {
            serde_json::Value::Object(map) => {
                for (key, val) in map.iter_mut() {
                    let key_lower = key.to_lowercase();
                    let is_sensitive = sensitive_patterns
                        .iter()
                        .any(|pattern| key_lower.contains(pattern));

                    if is_sensitive && val.is_string() {
                        *val = serde_json::Value::String("[MASKED]".to_string());
                    } else {
                        Self::sanitize_json_recursive(val, sensitive_patterns);
                    }
                }
            }
            serde_json::Value::Array(items) => {
                for item in items {
                    Self::sanitize_json_recursive(item, sensitive_patterns);
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_from_directory_layers_environment_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut base = std::fs::File::create(dir.path().join("base.toml")).unwrap();
        writeln!(base, "[processor]\nconcurrency = 3\n").unwrap();
        let mut env_file = std::fs::File::create(dir.path().join("staging.toml")).unwrap();
        writeln!(
            env_file,
            "[server]\nrpc_address = \"127.0.0.1:7000\"\n[processor]\nconcurrency = 4\n"
        )
        .unwrap();

        let manager =
            ConfigManager::load_from_directory_with_env(Some(dir.path().to_path_buf()), "staging")
                .unwrap();

        assert_eq!(manager.environment(), "staging");
        assert_eq!(manager.config().processor.concurrency, 4);
        assert_eq!(manager.config().server.rpc_address, "127.0.0.1:7000");
        // untouched sections keep their defaults
        assert_eq!(manager.config().server.http_address, "0.0.0.0:8080");
    }

    #[test]
    fn test_missing_directory_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ConfigManager::load_from_directory_with_env(
            Some(dir.path().join("does-not-exist")),
            "test",
        )
        .unwrap();
        assert_eq!(manager.config().processor.concurrency, 10);
    }

    #[test]
    fn test_invalid_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut base = std::fs::File::create(dir.path().join("base.toml")).unwrap();
        writeln!(base, "[auth]\ntoken_symmetric_key = \"short\"\n").unwrap();

        let result =
            ConfigManager::load_from_directory_with_env(Some(dir.path().to_path_buf()), "test");
        assert!(result.is_err());
    }

    #[test]
    fn test_debug_config_masks_secrets() {
        let manager = ConfigManager::from_config(BankConfig::default(), "test").unwrap();
        let debug = manager.debug_config();
        assert_eq!(debug["auth"]["token_symmetric_key"], "[MASKED]");
        assert_eq!(debug["database"]["url"], "[MASKED]");
        assert_eq!(debug["processor"]["concurrency"], 10);
    }
}
