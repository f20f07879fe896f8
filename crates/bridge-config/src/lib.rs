//! Configuration loading for the bridge service.
//!
//! Loads TOML configuration with `${VAR}` environment substitution,
//! applies `BRIDGE_`-prefixed overrides, and validates the result before
//! anything else starts.

use std::env;
use std::path::Path;
use thiserror::Error;

mod types;
pub use types::*;

/// Polling interval bounds, in seconds.
pub const MIN_POLLING_INTERVAL_SECS: u64 = 10;
pub const MAX_POLLING_INTERVAL_SECS: u64 = 300;

#[derive(Error, Debug)]
pub enum ConfigError {
	#[error("File not found: {0}")]
	FileNotFound(String),

	#[error("Parse error: {0}")]
	ParseError(String),

	#[error("Validation error: {0}")]
	ValidationError(String),

	#[error("Environment variable not found: {0}")]
	EnvVarNotFound(String),

	#[error("IO error: {0}")]
	IoError(#[from] std::io::Error),
}

/// Configuration loader with environment variable substitution.
#[derive(Default)]
pub struct ConfigLoader {
	file_path: Option<String>,
	env_prefix: String,
}

impl ConfigLoader {
	pub fn new() -> Self {
		Self {
			file_path: None,
			env_prefix: "BRIDGE_".to_string(),
		}
	}

	pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
		self.file_path = Some(path.as_ref().to_string_lossy().to_string());
		self
	}

	pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
		self.env_prefix = prefix.into();
		self
	}

	pub async fn load(&self) -> Result<Config, ConfigError> {
		let mut config = if let Some(file_path) = &self.file_path {
			self.load_from_file(file_path).await?
		} else {
			return Err(ConfigError::FileNotFound(
				"No configuration file specified".to_string(),
			));
		};

		self.apply_env_overrides(&mut config)?;
		validate(&config)?;

		Ok(config)
	}

	async fn load_from_file(&self, file_path: &str) -> Result<Config, ConfigError> {
		let content = tokio::fs::read_to_string(file_path).await.map_err(|e| {
			if e.kind() == std::io::ErrorKind::NotFound {
				ConfigError::FileNotFound(file_path.to_string())
			} else {
				ConfigError::IoError(e)
			}
		})?;

		let substituted_content = self.substitute_env_vars(&content)?;

		let config: Config = toml::from_str(&substituted_content)
			.map_err(|e| ConfigError::ParseError(e.to_string()))?;

		Ok(config)
	}

	fn substitute_env_vars(&self, content: &str) -> Result<String, ConfigError> {
		let mut result = content.to_string();

		// Find and replace ${VAR_NAME} patterns
		let re = regex::Regex::new(r"\$\{([^}]+)\}").unwrap();

		for cap in re.captures_iter(content) {
			let full_match = &cap[0];
			let var_name = &cap[1];

			let env_value = env::var(var_name)
				.map_err(|_| ConfigError::EnvVarNotFound(var_name.to_string()))?;

			result = result.replace(full_match, &env_value);
		}

		Ok(result)
	}

	fn apply_env_overrides(&self, config: &mut Config) -> Result<(), ConfigError> {
		if let Ok(log_level) = env::var(format!("{}LOG_LEVEL", self.env_prefix)) {
			config.service.log_level = log_level;
		}

		if let Ok(http_port) = env::var(format!("{}HTTP_PORT", self.env_prefix)) {
			config.service.http_port = http_port
				.parse()
				.map_err(|e| ConfigError::ValidationError(format!("Invalid HTTP port: {}", e)))?;
		}

		if let Ok(base_url) = env::var(format!("{}PLATFORM_BASE_URL", self.env_prefix)) {
			config.platform.base_url = base_url;
		}

		Ok(())
	}
}

/// Validates a loaded configuration.
pub fn validate(config: &Config) -> Result<(), ConfigError> {
	if config.platform.base_url.is_empty() {
		return Err(ConfigError::ValidationError(
			"platform.base_url must not be empty".to_string(),
		));
	}

	let interval = config.sync.polling_interval_seconds;
	if !(MIN_POLLING_INTERVAL_SECS..=MAX_POLLING_INTERVAL_SECS).contains(&interval) {
		return Err(ConfigError::ValidationError(format!(
			"sync.polling_interval_seconds must be between {} and {}, got {}",
			MIN_POLLING_INTERVAL_SECS, MAX_POLLING_INTERVAL_SECS, interval
		)));
	}

	match config.storage.backend.as_str() {
		"memory" => {}
		"file" => {
			if config.storage.path.is_none() {
				return Err(ConfigError::ValidationError(
					"storage.path is required for the file backend".to_string(),
				));
			}
		}
		other => {
			return Err(ConfigError::ValidationError(format!(
				"unknown storage backend: {}",
				other
			)));
		}
	}

	if config.webhook.enabled && config.webhook.secret.is_none() {
		return Err(ConfigError::ValidationError(
			"webhook.secret is required when the webhook is enabled".to_string(),
		));
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Write;

	const BASE: &str = r#"
[service]
name = "bridge-test"
http_port = 8090

[storage]
backend = "memory"

[platform]
base_url = "https://merchant-api.example.com"

[auth]
secret_key = "c2VjcmV0LWtleS1mb3ItdGVzdHMtMzItYnl0ZXMhIQ=="
"#;

	fn write_config(content: &str) -> tempfile::NamedTempFile {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		file.write_all(content.as_bytes()).unwrap();
		file
	}

	#[tokio::test]
	async fn loads_defaults() {
		let file = write_config(BASE);
		let config = ConfigLoader::new()
			.with_file(file.path())
			.load()
			.await
			.unwrap();

		assert_eq!(config.platform.timeout_seconds, 30);
		assert_eq!(config.platform.retry_max_attempts, 3);
		assert_eq!(config.platform.retry_delay_ms, 1000);
		assert_eq!(config.sync.polling_interval_seconds, 30);
		assert!(!config.webhook.enabled);
	}

	#[tokio::test]
	async fn rejects_out_of_bounds_polling_interval() {
		let content = format!("{}\n[sync]\npolling_interval_seconds = 5\n", BASE);
		let file = write_config(&content);
		let result = ConfigLoader::new().with_file(file.path()).load().await;
		assert!(matches!(result, Err(ConfigError::ValidationError(_))));

		let content = format!("{}\n[sync]\npolling_interval_seconds = 301\n", BASE);
		let file = write_config(&content);
		let result = ConfigLoader::new().with_file(file.path()).load().await;
		assert!(matches!(result, Err(ConfigError::ValidationError(_))));
	}

	#[tokio::test]
	async fn file_backend_requires_path() {
		let content = BASE.replace("backend = \"memory\"", "backend = \"file\"");
		let file = write_config(&content);
		let result = ConfigLoader::new().with_file(file.path()).load().await;
		assert!(matches!(result, Err(ConfigError::ValidationError(_))));
	}

	#[tokio::test]
	async fn substitutes_environment_variables() {
		env::set_var("BRIDGE_TEST_BASE_URL", "https://sandbox.example.com");
		let content = BASE.replace(
			"https://merchant-api.example.com",
			"${BRIDGE_TEST_BASE_URL}",
		);
		let file = write_config(&content);
		let config = ConfigLoader::new()
			.with_file(file.path())
			.load()
			.await
			.unwrap();
		assert_eq!(config.platform.base_url, "https://sandbox.example.com");
	}

	#[tokio::test]
	async fn webhook_enabled_requires_secret() {
		let content = format!("{}\n[webhook]\nenabled = true\n", BASE);
		let file = write_config(&content);
		let result = ConfigLoader::new().with_file(file.path()).load().await;
		assert!(matches!(result, Err(ConfigError::ValidationError(_))));
	}
}
