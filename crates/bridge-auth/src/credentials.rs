//! Credential store over the typed storage service.

use std::sync::Arc;

use bridge_storage::{namespaces, StorageError, StorageService};
use bridge_types::IntegrationConfig;

/// Typed access to the persisted integration config.
///
/// The bridge operates one merchant at a time; `load` returns the single
/// configured row, if any.
pub struct CredentialStore {
	storage: Arc<StorageService>,
}

impl CredentialStore {
	pub fn new(storage: Arc<StorageService>) -> Self {
		Self { storage }
	}

	/// Loads the configured integration, if one exists.
	pub async fn load(&self) -> Result<Option<IntegrationConfig>, StorageError> {
		let mut configs: Vec<IntegrationConfig> = self
			.storage
			.retrieve_all(namespaces::INTEGRATION_CONFIG)
			.await?;
		Ok(if configs.is_empty() {
			None
		} else {
			Some(configs.remove(0))
		})
	}

	/// Persists the integration config, keyed by merchant id.
	pub async fn save(&self, config: &IntegrationConfig) -> Result<(), StorageError> {
		self.storage
			.store(
				namespaces::INTEGRATION_CONFIG,
				&config.merchant_id,
				config,
			)
			.await
	}
}
