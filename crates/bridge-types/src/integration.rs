//! Integration configuration and status types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-merchant integration record.
///
/// The client secret is stored sealed (AES-256-GCM, base64 envelope) and is
/// only decrypted in memory for the duration of an authentication call.
/// Token fields are mutated by the token manager on every successful
/// authentication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrationConfig {
	pub merchant_id: String,
	pub client_id: String,
	/// Sealed client secret; never persisted or transmitted in plaintext.
	pub client_secret_sealed: Option<String>,
	pub authorization_code: Option<String>,
	pub access_token: Option<String>,
	pub token_expires_at: Option<DateTime<Utc>>,
	pub refresh_token: Option<String>,
	pub polling_interval_seconds: u64,
	pub is_active: bool,
	pub last_sync_at: Option<DateTime<Utc>>,
}

impl IntegrationConfig {
	pub fn new(merchant_id: impl Into<String>, client_id: impl Into<String>) -> Self {
		Self {
			merchant_id: merchant_id.into(),
			client_id: client_id.into(),
			client_secret_sealed: None,
			authorization_code: None,
			access_token: None,
			token_expires_at: None,
			refresh_token: None,
			polling_interval_seconds: 30,
			is_active: true,
			last_sync_at: None,
		}
	}

	/// Whether credentials are complete enough to attempt authentication.
	pub fn has_credentials(&self) -> bool {
		!self.merchant_id.is_empty()
			&& !self.client_id.is_empty()
			&& self.client_secret_sealed.is_some()
	}
}

/// Integration status reported to collaborators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrationStatus {
	pub configured: bool,
	pub active: bool,
	pub authenticated: bool,
	pub auth_error: Option<String>,
	pub last_sync_at: Option<DateTime<Utc>>,
	pub polling_interval_seconds: u64,
}

/// Redacted view of the integration config returned by the API.
///
/// The secret is write-only: reads only reveal whether one is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrationView {
	pub merchant_id: String,
	pub client_id: String,
	pub has_client_secret: bool,
	pub polling_interval_seconds: u64,
	pub is_active: bool,
	pub last_sync_at: Option<DateTime<Utc>>,
}

impl From<&IntegrationConfig> for IntegrationView {
	fn from(config: &IntegrationConfig) -> Self {
		Self {
			merchant_id: config.merchant_id.clone(),
			client_id: config.client_id.clone(),
			has_client_secret: config.client_secret_sealed.is_some(),
			polling_interval_seconds: config.polling_interval_seconds,
			is_active: config.is_active,
			last_sync_at: config.last_sync_at,
		}
	}
}
