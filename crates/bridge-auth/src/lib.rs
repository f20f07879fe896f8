//! Token management for the delivery platform's OAuth-protected API.
//!
//! The [`AuthService`] owns the client-credentials flow: it loads the
//! merchant's integration config, decides whether the cached access token is
//! still usable, and performs serialized refreshes so that concurrent
//! callers never trigger more than one authentication request.

use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use bridge_storage::StorageError;
use bridge_types::{AuthEvent, BridgeEvent, EventBus};

mod cipher;
mod credentials;

pub use cipher::SecretCipher;
pub use credentials::CredentialStore;

/// A cached token is considered valid only if its expiry is more than this
/// many seconds in the future. The buffer absorbs clock skew and in-flight
/// request latency so a call never starts with a token that expires
/// mid-request.
pub const TOKEN_EXPIRY_BUFFER_SECS: i64 = 300;

#[derive(Debug, Error)]
pub enum AuthError {
	#[error("integration not configured: {0}")]
	NotConfigured(String),
	#[error("authentication failed: {0}")]
	Failed(String),
	#[error("secret cipher error: {0}")]
	Cipher(String),
	#[error("storage error: {0}")]
	Storage(#[from] StorageError),
}

/// Token endpoint response.
#[derive(Debug, Clone)]
pub struct TokenResponse {
	pub access_token: String,
	pub refresh_token: Option<String>,
	pub expires_in: u64,
}

/// Wire-level token acquisition, implemented by the HTTP client crate.
#[async_trait]
pub trait TokenProvider: Send + Sync {
	async fn request_token(
		&self,
		client_id: &str,
		client_secret: &str,
	) -> Result<TokenResponse, AuthError>;
}

/// Token manager with a single-flight refresh guard.
pub struct AuthService {
	credentials: CredentialStore,
	provider: Box<dyn TokenProvider>,
	cipher: SecretCipher,
	refresh_lock: Mutex<()>,
	last_error: RwLock<Option<String>>,
	events: Option<EventBus>,
}

impl AuthService {
	pub fn new(
		credentials: CredentialStore,
		provider: Box<dyn TokenProvider>,
		cipher: SecretCipher,
	) -> Self {
		Self {
			credentials,
			provider,
			cipher,
			refresh_lock: Mutex::new(()),
			last_error: RwLock::new(None),
			events: None,
		}
	}

	/// Publishes authentication outcomes on the bus.
	pub fn with_events(mut self, events: EventBus) -> Self {
		self.events = Some(events);
		self
	}

	/// Returns a bearer token valid for at least the expiry buffer,
	/// authenticating first if necessary.
	pub async fn ensure_authenticated(&self) -> Result<String, AuthError> {
		if let Some(token) = self.cached_valid_token().await? {
			return Ok(token);
		}

		let _guard = self.refresh_lock.lock().await;
		// Another caller may have refreshed while we queued on the lock.
		if let Some(token) = self.cached_valid_token().await? {
			debug!("reusing token refreshed by a concurrent caller");
			return Ok(token);
		}
		self.authenticate_locked().await
	}

	/// Discards the cached token and authenticates again. Used by the HTTP
	/// client after a 401 response.
	pub async fn force_refresh(&self) -> Result<String, AuthError> {
		let _guard = self.refresh_lock.lock().await;
		self.authenticate_locked().await
	}

	/// Records a fatal authentication failure and drops the cached token,
	/// so the integration reports unauthenticated until a later refresh
	/// succeeds.
	pub async fn invalidate(&self, reason: &str) -> Result<(), AuthError> {
		let _guard = self.refresh_lock.lock().await;
		*self.last_error.write().await = Some(reason.to_string());
		if let Some(mut config) = self.credentials.load().await? {
			config.access_token = None;
			config.token_expires_at = None;
			self.credentials.save(&config).await?;
		}
		self.publish(AuthEvent::Failed {
			error: reason.to_string(),
		});
		Ok(())
	}

	/// Last authentication failure, if the integration is currently
	/// unauthenticated.
	pub async fn last_error(&self) -> Option<String> {
		self.last_error.read().await.clone()
	}

	/// Whether a usable token is currently cached.
	pub async fn is_authenticated(&self) -> bool {
		matches!(self.cached_valid_token().await, Ok(Some(_)))
	}

	async fn cached_valid_token(&self) -> Result<Option<String>, AuthError> {
		let config = self
			.credentials
			.load()
			.await?
			.ok_or_else(|| AuthError::NotConfigured("no integration configured".to_string()))?;

		if !config.has_credentials() {
			return Err(AuthError::NotConfigured(
				"missing merchant or client credentials".to_string(),
			));
		}

		if let (Some(token), Some(expires_at)) = (&config.access_token, config.token_expires_at) {
			let remaining = expires_at - Utc::now();
			if remaining > chrono::Duration::seconds(TOKEN_EXPIRY_BUFFER_SECS) {
				return Ok(Some(token.clone()));
			}
			debug!(
				remaining_secs = remaining.num_seconds(),
				"cached token within expiry buffer, refreshing"
			);
		}

		Ok(None)
	}

	/// Performs the client-credentials authentication. Must be called with
	/// the refresh lock held. On failure the previous token state is left
	/// untouched.
	async fn authenticate_locked(&self) -> Result<String, AuthError> {
		let mut config = self
			.credentials
			.load()
			.await?
			.ok_or_else(|| AuthError::NotConfigured("no integration configured".to_string()))?;

		let sealed = config.client_secret_sealed.clone().ok_or_else(|| {
			AuthError::NotConfigured("client secret not configured".to_string())
		})?;
		let secret = self.cipher.open(&sealed)?;

		info!(merchant_id = %config.merchant_id, "authenticating against platform");

		match self.provider.request_token(&config.client_id, &secret).await {
			Ok(response) => {
				config.access_token = Some(response.access_token.clone());
				config.token_expires_at =
					Some(Utc::now() + chrono::Duration::seconds(response.expires_in as i64));
				if let Some(refresh_token) = response.refresh_token {
					config.refresh_token = Some(refresh_token);
				}
				self.credentials.save(&config).await?;
				*self.last_error.write().await = None;
				self.publish(AuthEvent::Authenticated);
				info!("authentication succeeded");
				Ok(response.access_token)
			}
			Err(e) => {
				warn!(error = %e, "authentication failed, previous token state kept");
				*self.last_error.write().await = Some(e.to_string());
				self.publish(AuthEvent::Failed {
					error: e.to_string(),
				});
				Err(e)
			}
		}
	}

	fn publish(&self, event: AuthEvent) {
		if let Some(events) = &self.events {
			let _ = events.publish(BridgeEvent::Auth(event));
		}
	}
}
