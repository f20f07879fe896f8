//! Authenticated HTTP client for the delivery platform.
//!
//! This crate is the sole network egress point of the bridge. Every call
//! goes through [`PlatformClient`], which attaches a bearer token from the
//! token manager, retries transient failures under an explicit
//! [`RetryPolicy`], and handles a 401 with a single re-authentication
//! followed by exactly one retry.

use reqwest::Method;
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

use bridge_auth::{AuthError, AuthService, TokenProvider, TokenResponse};
use bridge_types::{OrderAction, RemoteOrder, RemoteOrderSummary, RemoteStatus};

mod retry;
mod transport;

pub use retry::RetryPolicy;
pub use transport::{PlatformRequest, PlatformResponse, PlatformTransport, ReqwestTransport};

#[derive(Debug, Error)]
pub enum ClientError {
	#[error("request timed out")]
	Timeout,
	#[error("network error: {0}")]
	Network(String),
	#[error("platform error ({status}): {message}")]
	Platform { status: u16, message: String },
	#[error("transient platform error ({status}): {message}")]
	Transient { status: u16, message: String },
	#[error("authentication rejected: {0}")]
	Auth(String),
	#[error("integration not configured: {0}")]
	NotConfigured(String),
	#[error("unknown remote status: {0}")]
	UnknownStatus(String),
	#[error("unexpected response body: {0}")]
	Deserialize(String),
}

impl ClientError {
	/// Timeouts, connection failures, and 5xx responses are retryable;
	/// everything else fails fast.
	pub fn is_retryable(&self) -> bool {
		matches!(
			self,
			Self::Timeout | Self::Network(_) | Self::Transient { .. }
		)
	}
}

impl From<AuthError> for ClientError {
	fn from(e: AuthError) -> Self {
		match e {
			AuthError::NotConfigured(message) => Self::NotConfigured(message),
			other => Self::Auth(other.to_string()),
		}
	}
}

/// Platform acknowledgement of an order action.
///
/// `is_async` reflects an HTTP 202: the status change is not guaranteed yet
/// and must be confirmed by the next poll or webhook.
#[derive(Debug, Clone, Copy)]
pub struct ActionAck {
	pub is_async: bool,
}

/// Authenticated client for the platform's order and catalog endpoints.
pub struct PlatformClient {
	transport: Arc<dyn PlatformTransport>,
	auth: Arc<AuthService>,
	retry: RetryPolicy,
}

impl PlatformClient {
	pub fn new(
		transport: Arc<dyn PlatformTransport>,
		auth: Arc<AuthService>,
		retry: RetryPolicy,
	) -> Self {
		Self {
			transport,
			auth,
			retry,
		}
	}

	/// Lists order summaries currently in any of the given remote statuses.
	pub async fn list_orders(
		&self,
		statuses: &[RemoteStatus],
	) -> Result<Vec<RemoteOrderSummary>, ClientError> {
		let filter = statuses
			.iter()
			.map(|s| s.as_wire())
			.collect::<Vec<_>>()
			.join(",");
		let path = format!("orders?status={}", filter);
		let response = self.call(Method::GET, &path, None).await?;

		let value: serde_json::Value = response.json()?;
		// The list endpoint returns either a bare array or {"orders": [...]}.
		let entries = match value.get("orders") {
			Some(inner) => inner.clone(),
			None => value,
		};
		let entries = entries
			.as_array()
			.cloned()
			.ok_or_else(|| ClientError::Deserialize("expected an order array".to_string()))?;

		let mut summaries = Vec::with_capacity(entries.len());
		for entry in entries {
			check_status_field(&entry)?;
			let summary: RemoteOrderSummary = serde_json::from_value(entry)
				.map_err(|e| ClientError::Deserialize(e.to_string()))?;
			summaries.push(summary);
		}
		Ok(summaries)
	}

	/// Fetches the full detail of a single order.
	pub async fn get_order(&self, order_id: &str) -> Result<RemoteOrder, ClientError> {
		let path = format!("orders/{}", order_id);
		let response = self.call(Method::GET, &path, None).await?;
		let value: serde_json::Value = response.json()?;
		check_status_field(&value)?;
		serde_json::from_value(value).map_err(|e| ClientError::Deserialize(e.to_string()))
	}

	/// Issues a state-changing action against an order.
	pub async fn send_action(
		&self,
		order_id: &str,
		action: OrderAction,
	) -> Result<ActionAck, ClientError> {
		let path = format!("orders/{}/{}", order_id, action.endpoint());
		let response = self.call(Method::POST, &path, None).await?;
		Ok(ActionAck {
			is_async: response.status == 202,
		})
	}

	async fn call(
		&self,
		method: Method,
		path: &str,
		json: Option<serde_json::Value>,
	) -> Result<PlatformResponse, ClientError> {
		let response = self.send_with_retry(&method, path, &json).await?;
		if response.status != 401 {
			return check(response);
		}

		// Exactly one re-authentication and one retry; a second 401 is fatal.
		warn!(path, "received 401, re-authenticating");
		self.auth.force_refresh().await.map_err(ClientError::from)?;

		let response = self.send_with_retry(&method, path, &json).await?;
		if response.status == 401 {
			let message = response.error_message();
			self.auth
				.invalidate(&message)
				.await
				.map_err(ClientError::from)?;
			return Err(ClientError::Auth(message));
		}
		check(response)
	}

	async fn send_with_retry(
		&self,
		method: &Method,
		path: &str,
		json: &Option<serde_json::Value>,
	) -> Result<PlatformResponse, ClientError> {
		self.retry
			.run(|_attempt| async move {
				let bearer = self
					.auth
					.ensure_authenticated()
					.await
					.map_err(ClientError::from)?;

				let request = PlatformRequest {
					method: method.clone(),
					path: path.to_string(),
					bearer: Some(bearer),
					json: json.clone(),
					form: None,
				};

				let response = self.transport.execute(&request).await?;
				if response.status >= 500 {
					return Err(ClientError::Transient {
						status: response.status,
						message: response.error_message(),
					});
				}
				Ok(response)
			})
			.await
	}
}

fn check(response: PlatformResponse) -> Result<PlatformResponse, ClientError> {
	if response.is_success() {
		Ok(response)
	} else {
		Err(ClientError::Platform {
			status: response.status,
			message: response.error_message(),
		})
	}
}

fn check_status_field(value: &serde_json::Value) -> Result<(), ClientError> {
	if let Some(status) = value.get("status").and_then(|v| v.as_str()) {
		RemoteStatus::parse(status).map_err(|e| ClientError::UnknownStatus(e.0))?;
	}
	Ok(())
}

/// Token acquisition over the shared transport.
///
/// The token endpoint is the one unauthenticated call the bridge makes; it
/// still goes through the transport so the timeout applies.
pub struct HttpTokenProvider {
	transport: Arc<dyn PlatformTransport>,
}

impl HttpTokenProvider {
	pub fn new(transport: Arc<dyn PlatformTransport>) -> Self {
		Self { transport }
	}
}

#[async_trait::async_trait]
impl TokenProvider for HttpTokenProvider {
	async fn request_token(
		&self,
		client_id: &str,
		client_secret: &str,
	) -> Result<TokenResponse, AuthError> {
		let request = PlatformRequest::post("authentication/token").with_form(vec![
			("grant_type".to_string(), "client_credentials".to_string()),
			("client_id".to_string(), client_id.to_string()),
			("client_secret".to_string(), client_secret.to_string()),
		]);

		let response = self
			.transport
			.execute(&request)
			.await
			.map_err(|e| AuthError::Failed(e.to_string()))?;

		if !response.is_success() {
			return Err(AuthError::Failed(response.error_message()));
		}

		#[derive(serde::Deserialize)]
		struct Wire {
			access_token: String,
			refresh_token: Option<String>,
			expires_in: u64,
		}

		let wire: Wire = response
			.json()
			.map_err(|e| AuthError::Failed(e.to_string()))?;
		Ok(TokenResponse {
			access_token: wire.access_token,
			refresh_token: wire.refresh_token,
			expires_in: wire.expires_in,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use async_trait::async_trait;
	use bridge_auth::{CredentialStore, SecretCipher};
	use bridge_storage::implementations::memory::MemoryStorage;
	use bridge_storage::StorageService;
	use bridge_types::IntegrationConfig;
	use std::collections::VecDeque;
	use std::sync::atomic::{AtomicU32, Ordering};
	use std::sync::Mutex;
	use std::time::Duration;

	struct ScriptedTransport {
		responses: Mutex<VecDeque<Result<PlatformResponse, ClientError>>>,
		attempts: Arc<AtomicU32>,
	}

	#[async_trait]
	impl PlatformTransport for ScriptedTransport {
		async fn execute(
			&self,
			_request: &PlatformRequest,
		) -> Result<PlatformResponse, ClientError> {
			self.attempts.fetch_add(1, Ordering::SeqCst);
			self.responses
				.lock()
				.unwrap()
				.pop_front()
				.expect("transport script exhausted")
		}
	}

	struct StaticTokenProvider {
		refreshes: Arc<AtomicU32>,
	}

	#[async_trait]
	impl bridge_auth::TokenProvider for StaticTokenProvider {
		async fn request_token(
			&self,
			_client_id: &str,
			_client_secret: &str,
		) -> Result<TokenResponse, AuthError> {
			self.refreshes.fetch_add(1, Ordering::SeqCst);
			Ok(TokenResponse {
				access_token: "token".to_string(),
				refresh_token: None,
				expires_in: 3600,
			})
		}
	}

	async fn auth_service(refreshes: Arc<AtomicU32>) -> Arc<AuthService> {
		let cipher = SecretCipher::from_key([2u8; 32]);
		let storage = Arc::new(StorageService::new(Box::new(MemoryStorage::new())));
		let store = CredentialStore::new(storage.clone());

		let mut config = IntegrationConfig::new("merchant-1", "client-1");
		config.client_secret_sealed = Some(cipher.seal("secret").unwrap());
		config.access_token = Some("token".to_string());
		config.token_expires_at = Some(chrono::Utc::now() + chrono::Duration::hours(1));
		store.save(&config).await.unwrap();

		Arc::new(AuthService::new(
			CredentialStore::new(storage),
			Box::new(StaticTokenProvider { refreshes }),
			cipher,
		))
	}

	async fn client(
		script: Vec<Result<PlatformResponse, ClientError>>,
	) -> (PlatformClient, Arc<AtomicU32>, Arc<AtomicU32>) {
		let attempts = Arc::new(AtomicU32::new(0));
		let refreshes = Arc::new(AtomicU32::new(0));
		let transport = Arc::new(ScriptedTransport {
			responses: Mutex::new(script.into_iter().collect()),
			attempts: attempts.clone(),
		});
		let auth = auth_service(refreshes.clone()).await;
		let client = PlatformClient::new(
			transport,
			auth,
			RetryPolicy::new(3, Duration::from_secs(1)),
		);
		(client, attempts, refreshes)
	}

	#[tokio::test(start_paused = true)]
	async fn two_5xx_then_success_makes_three_attempts() {
		let (client, attempts, _) = client(vec![
			Ok(PlatformResponse::new(503, r#"{"message":"down"}"#)),
			Ok(PlatformResponse::new(500, "")),
			Ok(PlatformResponse::new(200, "[]")),
		])
		.await;

		let started = tokio::time::Instant::now();
		let orders = client.list_orders(&[RemoteStatus::Placed]).await.unwrap();
		assert!(orders.is_empty());
		assert_eq!(attempts.load(Ordering::SeqCst), 3);
		// Attempts are spaced by the fixed 1s delay.
		assert_eq!(started.elapsed(), Duration::from_secs(2));
	}

	#[tokio::test]
	async fn timeouts_are_retried() {
		let (client, attempts, _) = client(vec![
			Err(ClientError::Timeout),
			Ok(PlatformResponse::new(200, "[]")),
		])
		.await;

		client.list_orders(&[RemoteStatus::Placed]).await.unwrap();
		assert_eq!(attempts.load(Ordering::SeqCst), 2);
	}

	#[tokio::test]
	async fn exhausted_retries_surface_transient_error() {
		let (client, attempts, _) = client(vec![
			Ok(PlatformResponse::new(500, "")),
			Ok(PlatformResponse::new(500, "")),
			Ok(PlatformResponse::new(500, "")),
		])
		.await;

		let result = client.list_orders(&[RemoteStatus::Placed]).await;
		assert!(matches!(result, Err(ClientError::Transient { .. })));
		assert_eq!(attempts.load(Ordering::SeqCst), 3);
	}

	#[tokio::test]
	async fn non_401_client_errors_are_not_retried() {
		let (client, attempts, _) = client(vec![Ok(PlatformResponse::new(
			404,
			r#"{"error":{"message":"order not found"}}"#,
		))])
		.await;

		let result = client.get_order("o-1").await;
		match result {
			Err(ClientError::Platform { status, message }) => {
				assert_eq!(status, 404);
				assert_eq!(message, "order not found");
			}
			other => panic!("unexpected result: {:?}", other.map(|_| ())),
		}
		assert_eq!(attempts.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn single_401_triggers_one_reauth_and_one_retry() {
		let (client, attempts, refreshes) = client(vec![
			Ok(PlatformResponse::new(401, "")),
			Ok(PlatformResponse::new(200, "[]")),
		])
		.await;

		client.list_orders(&[RemoteStatus::Placed]).await.unwrap();
		assert_eq!(attempts.load(Ordering::SeqCst), 2);
		assert_eq!(refreshes.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn second_401_is_fatal_without_further_retry() {
		let (client, attempts, refreshes) = client(vec![
			Ok(PlatformResponse::new(401, "")),
			Ok(PlatformResponse::new(401, r#"{"message":"token revoked"}"#)),
		])
		.await;

		let result = client.list_orders(&[RemoteStatus::Placed]).await;
		assert!(matches!(result, Err(ClientError::Auth(_))));
		assert_eq!(attempts.load(Ordering::SeqCst), 2);
		assert_eq!(refreshes.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn unknown_status_is_a_distinct_error() {
		let (client, _, _) = client(vec![Ok(PlatformResponse::new(
			200,
			r#"[{"id":"o-1","display_id":"1001","created_at":"2026-08-23T12:00:00Z","status":"TELEPORTED"}]"#,
		))])
		.await;

		let result = client.list_orders(&[RemoteStatus::Placed]).await;
		match result {
			Err(ClientError::UnknownStatus(status)) => assert_eq!(status, "TELEPORTED"),
			other => panic!("unexpected result: {:?}", other.map(|_| ())),
		}
	}

	#[tokio::test]
	async fn send_action_reports_async_acknowledgement() {
		let (client, _, _) = client(vec![
			Ok(PlatformResponse::new(202, "")),
			Ok(PlatformResponse::new(200, "")),
		])
		.await;

		let ack = client
			.send_action("o-1", OrderAction::Confirm)
			.await
			.unwrap();
		assert!(ack.is_async);

		let ack = client
			.send_action("o-1", OrderAction::Dispatch)
			.await
			.unwrap();
		assert!(!ack.is_async);
	}
}
