//! The bridge engine and the operations it exposes.

use serde::Deserialize;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tracing::{info, warn};

use bridge_auth::{AuthService, CredentialStore, SecretCipher};
use bridge_config::{Config, MAX_POLLING_INTERVAL_SECS, MIN_POLLING_INTERVAL_SECS};
use bridge_orders::{
	ActionExecutor, ActionOutcome, MappingResolver, MergeOutcome, OrderStore,
};
use bridge_sync::{Scheduler, WebhookProcessor};
use bridge_types::{
	BridgeEvent, EventBus, IntegrationConfig, IntegrationStatus, IntegrationView, LocalOrder,
	OrderAction, OrderBucket, ProductMapping, RemoteOrder,
};

use crate::BridgeError;

/// Write request for the integration config.
///
/// The client secret is write-only: it is sealed on arrival and never
/// returned. Omitting it keeps the stored secret.
#[derive(Debug, Clone, Deserialize)]
pub struct SaveConfigRequest {
	pub merchant_id: String,
	pub client_id: String,
	pub client_secret: Option<String>,
	pub polling_interval_seconds: Option<u64>,
	pub is_active: Option<bool>,
}

/// Orchestrates all bridge services and serves the collaborator operations.
pub struct BridgeEngine {
	config: Config,
	credentials: CredentialStore,
	auth: Arc<AuthService>,
	store: Arc<OrderStore>,
	resolver: Arc<MappingResolver>,
	executor: ActionExecutor,
	scheduler: Arc<Scheduler>,
	webhook: WebhookProcessor,
	events: EventBus,
	cipher: SecretCipher,
}

impl BridgeEngine {
	#[allow(clippy::too_many_arguments)]
	pub(crate) fn new(
		config: Config,
		credentials: CredentialStore,
		auth: Arc<AuthService>,
		store: Arc<OrderStore>,
		resolver: Arc<MappingResolver>,
		executor: ActionExecutor,
		scheduler: Arc<Scheduler>,
		webhook: WebhookProcessor,
		events: EventBus,
		cipher: SecretCipher,
	) -> Self {
		Self {
			config,
			credentials,
			auth,
			store,
			resolver,
			executor,
			scheduler,
			webhook,
			events,
			cipher,
		}
	}

	pub fn config(&self) -> &Config {
		&self.config
	}

	pub fn events(&self) -> EventBus {
		self.events.clone()
	}

	/// Runs the poll loop and the event log until `shutdown` resolves.
	pub async fn run(&self, shutdown: impl Future<Output = ()>) -> Result<(), BridgeError> {
		let (stop_tx, stop_rx) = watch::channel(false);
		let scheduler = self.scheduler.clone();
		let scheduler_handle = tokio::spawn(scheduler.run(stop_rx));

		let mut events = self.events.subscribe();
		info!(service = %self.config.service.name, "bridge engine running");

		tokio::pin!(shutdown);
		loop {
			tokio::select! {
				event = events.recv() => match event {
					Ok(event) => log_event(&event),
					Err(broadcast::error::RecvError::Lagged(skipped)) => {
						warn!(skipped, "event consumer lagged");
					}
					Err(broadcast::error::RecvError::Closed) => break,
				},
				_ = &mut shutdown => {
					info!("shutdown signal received");
					break;
				}
			}
		}

		let _ = stop_tx.send(true);
		let _ = scheduler_handle.await;
		info!("bridge engine stopped");
		Ok(())
	}

	/// Redacted view of the integration config, if one is set.
	pub async fn get_config(&self) -> Result<Option<IntegrationView>, BridgeError> {
		Ok(self
			.credentials
			.load()
			.await?
			.as_ref()
			.map(IntegrationView::from))
	}

	/// Creates or updates the integration config.
	///
	/// Changing the client id or supplying a new secret invalidates any
	/// cached tokens; the next call re-authenticates.
	pub async fn save_config(
		&self,
		request: SaveConfigRequest,
	) -> Result<IntegrationView, BridgeError> {
		if request.merchant_id.is_empty() || request.client_id.is_empty() {
			return Err(BridgeError::Validation(
				"merchant_id and client_id must not be empty".to_string(),
			));
		}
		if let Some(interval) = request.polling_interval_seconds {
			if !(MIN_POLLING_INTERVAL_SECS..=MAX_POLLING_INTERVAL_SECS).contains(&interval) {
				return Err(BridgeError::Validation(format!(
					"polling_interval_seconds must be between {} and {}",
					MIN_POLLING_INTERVAL_SECS, MAX_POLLING_INTERVAL_SECS
				)));
			}
		}

		let mut config = match self.credentials.load().await? {
			Some(existing) => existing,
			None => IntegrationConfig::new(&request.merchant_id, &request.client_id),
		};

		let credentials_changed =
			config.client_id != request.client_id || request.client_secret.is_some();

		config.merchant_id = request.merchant_id;
		config.client_id = request.client_id;
		if let Some(secret) = &request.client_secret {
			config.client_secret_sealed = Some(self.cipher.seal(secret)?);
		}
		if let Some(interval) = request.polling_interval_seconds {
			config.polling_interval_seconds = interval;
		}
		if let Some(is_active) = request.is_active {
			config.is_active = is_active;
		}

		if credentials_changed {
			info!("integration credentials changed, cached tokens dropped");
			config.access_token = None;
			config.token_expires_at = None;
			config.refresh_token = None;
		}

		self.credentials.save(&config).await?;
		Ok(IntegrationView::from(&config))
	}

	pub async fn get_status(&self) -> Result<IntegrationStatus, BridgeError> {
		let config = self.credentials.load().await?;
		Ok(IntegrationStatus {
			configured: config
				.as_ref()
				.map(|c| c.has_credentials())
				.unwrap_or(false),
			active: config.as_ref().map(|c| c.is_active).unwrap_or(false),
			authenticated: self.auth.is_authenticated().await,
			auth_error: self.auth.last_error().await,
			last_sync_at: config.as_ref().and_then(|c| c.last_sync_at),
			polling_interval_seconds: config
				.as_ref()
				.map(|c| c.polling_interval_seconds)
				.unwrap_or(self.config.sync.polling_interval_seconds),
		})
	}

	/// Lists locally known orders in a display bucket, newest first.
	pub async fn list_orders(&self, bucket: OrderBucket) -> Result<Vec<LocalOrder>, BridgeError> {
		Ok(self.store.list_bucket(bucket).await?)
	}

	/// Fetches full order detail with resolved line items.
	pub async fn get_order(&self, order_id: &str) -> Result<RemoteOrder, BridgeError> {
		Ok(self.scheduler.get_order_details(order_id).await?)
	}

	/// Submits an order action through the executor.
	pub async fn perform_action(
		&self,
		order_id: &str,
		action: OrderAction,
	) -> Result<ActionOutcome, BridgeError> {
		Ok(self.executor.perform(order_id, action).await?)
	}

	/// Advances an order one step through the state machine.
	pub async fn advance_order(&self, order_id: &str) -> Result<ActionOutcome, BridgeError> {
		Ok(self.executor.advance(order_id).await?)
	}

	/// Triggers one sync cycle outside the schedule.
	pub async fn sync_now(&self) -> Result<usize, BridgeError> {
		Ok(self.scheduler.sync_once().await?)
	}

	pub async fn product_mappings(&self) -> Result<Vec<ProductMapping>, BridgeError> {
		Ok(self.resolver.list().await?)
	}

	pub async fn create_mapping(
		&self,
		remote_product_id: &str,
		sku: Option<&str>,
		local_product_id: &str,
	) -> Result<ProductMapping, BridgeError> {
		if remote_product_id.is_empty() || local_product_id.is_empty() {
			return Err(BridgeError::Validation(
				"remote_product_id and local_product_id must not be empty".to_string(),
			));
		}
		Ok(self
			.resolver
			.create_mapping(remote_product_id, sku, local_product_id)
			.await?)
	}

	/// Ingests a webhook notification body.
	pub async fn ingest_webhook(
		&self,
		body: &[u8],
		signature: Option<&str>,
	) -> Result<MergeOutcome, BridgeError> {
		if !self.config.webhook.enabled {
			return Err(BridgeError::WebhookDisabled);
		}
		Ok(self.webhook.ingest(body, signature).await?)
	}
}

fn log_event(event: &BridgeEvent) {
	match event {
		BridgeEvent::Order(e) => info!(event = ?e, "order event"),
		BridgeEvent::Action(e) => info!(event = ?e, "action event"),
		BridgeEvent::Sync(e) => info!(event = ?e, "sync event"),
		BridgeEvent::Auth(e) => info!(event = ?e, "auth event"),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::BridgeBuilder;
	use async_trait::async_trait;
	use base64::Engine as _;
	use bridge_client::{ClientError, PlatformRequest, PlatformResponse, PlatformTransport};
	use bridge_config::{
		AuthConfig, PlatformConfig, ServiceSettings, StorageConfig, SyncConfig, WebhookConfig,
	};
	use bridge_orders::ProductCatalog;
	use bridge_storage::StorageError;
	use bridge_types::{LocalProduct, RemoteStatus};
	use bridge_sync::WebhookVerifier;
	use std::collections::VecDeque;
	use std::sync::Mutex;

	struct ScriptedTransport {
		responses: Mutex<VecDeque<PlatformResponse>>,
	}

	#[async_trait]
	impl PlatformTransport for ScriptedTransport {
		async fn execute(
			&self,
			_request: &PlatformRequest,
		) -> Result<PlatformResponse, ClientError> {
			self.responses
				.lock()
				.unwrap()
				.pop_front()
				.ok_or_else(|| ClientError::Network("transport script exhausted".to_string()))
		}
	}

	struct EmptyCatalog;

	#[async_trait]
	impl ProductCatalog for EmptyCatalog {
		async fn find_by_sku(&self, _sku: &str) -> Result<Option<LocalProduct>, StorageError> {
			Ok(None)
		}
	}

	fn test_config(webhook_secret: Option<&str>) -> Config {
		Config {
			service: ServiceSettings {
				name: "bridge-test".to_string(),
				http_port: 0,
				log_level: "debug".to_string(),
			},
			storage: StorageConfig {
				backend: "memory".to_string(),
				path: None,
			},
			platform: PlatformConfig {
				base_url: "https://merchant-api.example.com".to_string(),
				timeout_seconds: 30,
				retry_max_attempts: 3,
				retry_delay_ms: 1000,
			},
			sync: SyncConfig::default(),
			auth: AuthConfig {
				secret_key: base64::engine::general_purpose::STANDARD.encode([9u8; 32]),
			},
			webhook: WebhookConfig {
				enabled: webhook_secret.is_some(),
				secret: webhook_secret.map(|s| s.to_string()),
			},
		}
	}

	fn engine(
		config: Config,
		script: Vec<PlatformResponse>,
	) -> BridgeEngine {
		BridgeBuilder::new(config)
			.with_catalog_factory(|_| Box::new(EmptyCatalog))
			.with_transport(Arc::new(ScriptedTransport {
				responses: Mutex::new(script.into_iter().collect()),
			}))
			.build()
			.unwrap()
	}

	fn save_request(secret: Option<&str>) -> SaveConfigRequest {
		SaveConfigRequest {
			merchant_id: "merchant-1".to_string(),
			client_id: "client-1".to_string(),
			client_secret: secret.map(|s| s.to_string()),
			polling_interval_seconds: Some(60),
			is_active: Some(true),
		}
	}

	#[tokio::test]
	async fn saved_config_is_redacted_on_read() {
		let engine = engine(test_config(None), vec![]);

		let view = engine
			.save_config(save_request(Some("super-secret")))
			.await
			.unwrap();
		assert!(view.has_client_secret);
		assert_eq!(view.polling_interval_seconds, 60);

		let loaded = engine.get_config().await.unwrap().unwrap();
		assert!(loaded.has_client_secret);
		// Nothing in the view carries the plaintext secret.
		assert_eq!(
			serde_json::to_string(&loaded)
				.unwrap()
				.contains("super-secret"),
			false
		);
	}

	#[tokio::test]
	async fn secret_is_sealed_at_rest() {
		let engine = engine(test_config(None), vec![]);
		engine
			.save_config(save_request(Some("super-secret")))
			.await
			.unwrap();

		let stored = engine.credentials.load().await.unwrap().unwrap();
		let sealed = stored.client_secret_sealed.unwrap();
		assert_ne!(sealed, "super-secret");
		assert!(!sealed.contains("super-secret"));
	}

	#[tokio::test]
	async fn changing_credentials_drops_cached_tokens() {
		let engine = engine(test_config(None), vec![]);
		engine
			.save_config(save_request(Some("secret-a")))
			.await
			.unwrap();

		// Simulate a successful authentication.
		let mut stored = engine.credentials.load().await.unwrap().unwrap();
		stored.access_token = Some("token".to_string());
		stored.token_expires_at = Some(chrono::Utc::now() + chrono::Duration::hours(1));
		engine.credentials.save(&stored).await.unwrap();

		engine
			.save_config(save_request(Some("secret-b")))
			.await
			.unwrap();
		let stored = engine.credentials.load().await.unwrap().unwrap();
		assert!(stored.access_token.is_none());
		assert!(stored.token_expires_at.is_none());
	}

	#[tokio::test]
	async fn omitting_the_secret_keeps_the_stored_one() {
		let engine = engine(test_config(None), vec![]);
		engine
			.save_config(save_request(Some("super-secret")))
			.await
			.unwrap();

		let view = engine.save_config(save_request(None)).await.unwrap();
		assert!(view.has_client_secret);
	}

	#[tokio::test]
	async fn out_of_bounds_polling_interval_is_rejected() {
		let engine = engine(test_config(None), vec![]);
		let mut request = save_request(None);
		request.polling_interval_seconds = Some(5);

		let result = engine.save_config(request).await;
		assert!(matches!(result, Err(BridgeError::Validation(_))));
	}

	#[tokio::test]
	async fn status_reflects_configuration() {
		let engine = engine(test_config(None), vec![]);

		let status = engine.get_status().await.unwrap();
		assert!(!status.configured);
		assert!(!status.authenticated);

		engine
			.save_config(save_request(Some("super-secret")))
			.await
			.unwrap();
		let status = engine.get_status().await.unwrap();
		assert!(status.configured);
		assert_eq!(status.polling_interval_seconds, 60);
	}

	#[tokio::test]
	async fn webhook_disabled_refuses_ingestion() {
		let engine = engine(test_config(None), vec![]);
		let result = engine.ingest_webhook(b"{}", None).await;
		assert!(matches!(result, Err(BridgeError::WebhookDisabled)));
	}

	#[tokio::test]
	async fn webhook_round_trip_updates_the_local_record() {
		let engine = engine(test_config(Some("hook-secret")), vec![]);
		let verifier = WebhookVerifier::new("hook-secret");

		let body = br#"{"order_id":"o-1","status":"PLACED","timestamp":null}"#;
		let signature = verifier.sign(body).unwrap();
		engine
			.ingest_webhook(body, Some(&signature))
			.await
			.unwrap();

		let pending = engine.list_orders(OrderBucket::Pending).await.unwrap();
		assert_eq!(pending.len(), 1);
		assert_eq!(pending[0].remote_status, RemoteStatus::Placed);
	}

	#[tokio::test]
	async fn mapping_requests_are_validated() {
		let engine = engine(test_config(None), vec![]);
		let result = engine.create_mapping("", None, "p-1").await;
		assert!(matches!(result, Err(BridgeError::Validation(_))));

		let mapping = engine
			.create_mapping("r-1", Some("ABC"), "p-1")
			.await
			.unwrap();
		assert_eq!(mapping.local_product_id, "p-1");
		assert_eq!(engine.product_mappings().await.unwrap().len(), 1);
	}

	#[tokio::test]
	async fn builder_requires_a_catalog() {
		let result = BridgeBuilder::new(test_config(None)).build();
		assert!(matches!(result, Err(crate::BridgeError::Builder(_))));
	}
}
