//! Engine construction from validated configuration.

use std::sync::Arc;
use std::time::Duration;

use bridge_auth::{AuthService, CredentialStore, SecretCipher};
use bridge_client::{
	HttpTokenProvider, PlatformClient, PlatformTransport, ReqwestTransport, RetryPolicy,
};
use bridge_config::Config;
use bridge_orders::{ActionExecutor, MappingResolver, OrderStore, ProductCatalog};
use bridge_storage::implementations::{file::FileStorage, memory::MemoryStorage};
use bridge_storage::{StorageInterface, StorageService};
use bridge_sync::{Scheduler, WebhookProcessor, WebhookVerifier};
use bridge_types::EventBus;

use crate::engine::BridgeEngine;
use crate::BridgeError;

/// Factory for the host's product catalog, given access to storage.
pub type CatalogFactory = Box<dyn FnOnce(Arc<StorageService>) -> Box<dyn ProductCatalog>>;

/// Builds a [`BridgeEngine`] from configuration plus host-provided pieces.
pub struct BridgeBuilder {
	config: Config,
	catalog_factory: Option<CatalogFactory>,
	transport: Option<Arc<dyn PlatformTransport>>,
}

impl BridgeBuilder {
	pub fn new(config: Config) -> Self {
		Self {
			config,
			catalog_factory: None,
			transport: None,
		}
	}

	/// Supplies the local product catalog. Required.
	pub fn with_catalog_factory(
		mut self,
		factory: impl FnOnce(Arc<StorageService>) -> Box<dyn ProductCatalog> + 'static,
	) -> Self {
		self.catalog_factory = Some(Box::new(factory));
		self
	}

	/// Overrides the platform transport. Used by tests to avoid the network.
	pub fn with_transport(mut self, transport: Arc<dyn PlatformTransport>) -> Self {
		self.transport = Some(transport);
		self
	}

	pub fn build(self) -> Result<BridgeEngine, BridgeError> {
		let config = self.config;

		let backend: Box<dyn StorageInterface> = match config.storage.backend.as_str() {
			"memory" => Box::new(MemoryStorage::new()),
			"file" => {
				let path = config.storage.path.clone().ok_or_else(|| {
					BridgeError::Builder("file backend requires storage.path".to_string())
				})?;
				Box::new(FileStorage::new(path))
			}
			other => {
				return Err(BridgeError::Builder(format!(
					"unknown storage backend: {}",
					other
				)))
			}
		};
		let storage = Arc::new(StorageService::new(backend));

		let cipher = SecretCipher::from_base64(&config.auth.secret_key)
			.map_err(|e| BridgeError::Builder(format!("auth.secret_key: {}", e)))?;

		let transport: Arc<dyn PlatformTransport> = match self.transport {
			Some(transport) => transport,
			None => Arc::new(
				ReqwestTransport::new(
					&config.platform.base_url,
					Duration::from_secs(config.platform.timeout_seconds),
				)
				.map_err(|e| BridgeError::Builder(e.to_string()))?,
			),
		};

		let events = EventBus::new(1024);
		let auth = Arc::new(
			AuthService::new(
				CredentialStore::new(storage.clone()),
				Box::new(HttpTokenProvider::new(transport.clone())),
				cipher.clone(),
			)
			.with_events(events.clone()),
		);
		let retry = RetryPolicy::new(
			config.platform.retry_max_attempts,
			Duration::from_millis(config.platform.retry_delay_ms),
		);
		let client = Arc::new(PlatformClient::new(transport, auth.clone(), retry));

		let store = Arc::new(OrderStore::new(storage.clone()));
		let catalog_factory = self.catalog_factory.ok_or_else(|| {
			BridgeError::Builder("product catalog not provided".to_string())
		})?;
		let resolver = Arc::new(MappingResolver::new(
			storage.clone(),
			catalog_factory(storage.clone()),
		));

		let executor = ActionExecutor::new(
			client.clone(),
			store.clone(),
			events.clone(),
			config.sync.action_confirm_timeout_seconds,
		);
		let scheduler = Arc::new(Scheduler::new(
			client.clone(),
			store.clone(),
			resolver.clone(),
			CredentialStore::new(storage.clone()),
			events.clone(),
			config.sync.polling_interval_seconds,
		));

		let verifier = match (config.webhook.enabled, &config.webhook.secret) {
			(true, Some(secret)) => Some(WebhookVerifier::new(secret.as_str())),
			_ => None,
		};
		let webhook = WebhookProcessor::new(verifier, store.clone(), events.clone());

		Ok(BridgeEngine::new(
			config,
			CredentialStore::new(storage),
			auth,
			store,
			resolver,
			executor,
			scheduler,
			webhook,
			events,
			cipher,
		))
	}
}
