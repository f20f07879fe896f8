//! Configuration types for the bridge service.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Complete bridge configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	/// Service identity and HTTP settings
	pub service: ServiceSettings,
	/// Storage backend settings
	pub storage: StorageConfig,
	/// Delivery platform endpoint and retry settings
	pub platform: PlatformConfig,
	/// Polling and reconciliation settings
	#[serde(default)]
	pub sync: SyncConfig,
	/// Secret sealing settings
	pub auth: AuthConfig,
	/// Inbound webhook settings
	#[serde(default)]
	pub webhook: WebhookConfig,
}

/// Service identity and HTTP settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceSettings {
	/// Service name used in logs
	pub name: String,
	/// Port for the collaborator HTTP API
	pub http_port: u16,
	/// Default log level, overridable via BRIDGE_LOG_LEVEL
	#[serde(default = "default_log_level")]
	pub log_level: String,
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
	/// Storage backend: "memory" or "file"
	pub backend: String,
	/// Base directory for the file backend
	pub path: Option<PathBuf>,
}

/// Delivery platform endpoint and retry settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PlatformConfig {
	/// Base URL of the platform's merchant API
	pub base_url: String,
	/// Per-request timeout in seconds
	#[serde(default = "default_timeout_seconds")]
	pub timeout_seconds: u64,
	/// Maximum attempts for transient failures (timeout / 5xx)
	#[serde(default = "default_retry_max_attempts")]
	pub retry_max_attempts: u32,
	/// Fixed delay between attempts, in milliseconds
	#[serde(default = "default_retry_delay_ms")]
	pub retry_delay_ms: u64,
}

/// Polling and reconciliation settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SyncConfig {
	/// Default polling interval; merchant config may override, always
	/// clamped to 10-300 seconds
	#[serde(default = "default_polling_interval")]
	pub polling_interval_seconds: u64,
	/// How long an async-acknowledged action may stay unconfirmed before
	/// it is surfaced for manual retry
	#[serde(default = "default_action_confirm_timeout")]
	pub action_confirm_timeout_seconds: u64,
}

impl Default for SyncConfig {
	fn default() -> Self {
		Self {
			polling_interval_seconds: default_polling_interval(),
			action_confirm_timeout_seconds: default_action_confirm_timeout(),
		}
	}
}

/// Secret sealing settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
	/// Base64-encoded 32-byte key used to seal the platform client secret
	pub secret_key: String,
}

/// Inbound webhook settings.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct WebhookConfig {
	/// Whether the webhook endpoint accepts notifications
	#[serde(default)]
	pub enabled: bool,
	/// Shared secret for HMAC-SHA256 signature verification
	pub secret: Option<String>,
}

fn default_log_level() -> String {
	"info".to_string()
}

fn default_timeout_seconds() -> u64 {
	30
}

fn default_retry_max_attempts() -> u32 {
	3
}

fn default_retry_delay_ms() -> u64 {
	1000
}

fn default_polling_interval() -> u64 {
	30
}

fn default_action_confirm_timeout() -> u64 {
	120
}
