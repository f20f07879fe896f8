//! Product mapping between platform products and the local catalog.
//!
//! Resolution order: an explicit stored mapping wins, then an exact SKU
//! match against the local catalog (persisted as a new mapping), and
//! otherwise the item is reported unmapped. Orders are never rejected for
//! unmapped items.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info};

use bridge_storage::{namespaces, StorageError, StorageService};
use bridge_types::{LocalProduct, ProductMapping};

use crate::OrderError;

/// Lookup into the local product catalog, implemented by the host.
#[async_trait]
pub trait ProductCatalog: Send + Sync {
	async fn find_by_sku(&self, sku: &str) -> Result<Option<LocalProduct>, StorageError>;
}

/// Resolves remote products to local ones.
pub struct MappingResolver {
	storage: Arc<StorageService>,
	catalog: Box<dyn ProductCatalog>,
}

impl MappingResolver {
	pub fn new(storage: Arc<StorageService>, catalog: Box<dyn ProductCatalog>) -> Self {
		Self { storage, catalog }
	}

	/// Resolves a remote product to a local product id, if possible.
	///
	/// A successful SKU match is persisted so subsequent orders resolve
	/// without touching the catalog.
	pub async fn resolve(
		&self,
		remote_product_id: &str,
		sku: Option<&str>,
	) -> Result<Option<String>, OrderError> {
		let existing: Option<ProductMapping> = self
			.storage
			.retrieve_optional(namespaces::PRODUCT_MAPPING, remote_product_id)
			.await?;
		if let Some(mapping) = existing {
			return Ok(Some(mapping.local_product_id));
		}

		let Some(sku) = sku else {
			debug!(remote_product_id, "no mapping and no sku to match");
			return Ok(None);
		};

		match self.catalog.find_by_sku(sku).await? {
			Some(product) => {
				let mapping = self
					.create_mapping(remote_product_id, Some(sku), &product.id)
					.await?;
				info!(remote_product_id, sku, local_product_id = %product.id, "mapped by sku");
				Ok(Some(mapping.local_product_id))
			}
			None => {
				debug!(remote_product_id, sku, "no catalog product for sku");
				Ok(None)
			}
		}
	}

	/// Creates or replaces the mapping for a remote product. Idempotent:
	/// re-creating an identical mapping is not an error.
	pub async fn create_mapping(
		&self,
		remote_product_id: &str,
		sku: Option<&str>,
		local_product_id: &str,
	) -> Result<ProductMapping, OrderError> {
		let mapping = ProductMapping {
			remote_product_id: remote_product_id.to_string(),
			sku: sku.map(|s| s.to_string()),
			local_product_id: local_product_id.to_string(),
			created_at: Utc::now(),
		};
		self.storage
			.store(namespaces::PRODUCT_MAPPING, remote_product_id, &mapping)
			.await?;
		Ok(mapping)
	}

	pub async fn list(&self) -> Result<Vec<ProductMapping>, OrderError> {
		Ok(self
			.storage
			.retrieve_all(namespaces::PRODUCT_MAPPING)
			.await?)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use bridge_storage::implementations::memory::MemoryStorage;
	use std::collections::HashMap;

	struct StaticCatalog {
		by_sku: HashMap<String, LocalProduct>,
	}

	#[async_trait]
	impl ProductCatalog for StaticCatalog {
		async fn find_by_sku(&self, sku: &str) -> Result<Option<LocalProduct>, StorageError> {
			Ok(self.by_sku.get(sku).cloned())
		}
	}

	fn resolver(products: Vec<LocalProduct>) -> MappingResolver {
		let by_sku = products
			.into_iter()
			.filter_map(|p| p.sku.clone().map(|sku| (sku, p)))
			.collect();
		MappingResolver::new(
			Arc::new(StorageService::new(Box::new(MemoryStorage::new()))),
			Box::new(StaticCatalog { by_sku }),
		)
	}

	fn product(id: &str, sku: &str) -> LocalProduct {
		LocalProduct {
			id: id.to_string(),
			sku: Some(sku.to_string()),
			name: format!("Product {}", id),
		}
	}

	#[tokio::test]
	async fn explicit_mapping_wins_over_sku() {
		let resolver = resolver(vec![product("p-sku", "ABC")]);
		resolver
			.create_mapping("r-1", None, "p-explicit")
			.await
			.unwrap();

		let resolved = resolver.resolve("r-1", Some("ABC")).await.unwrap();
		assert_eq!(resolved.as_deref(), Some("p-explicit"));
	}

	#[tokio::test]
	async fn sku_match_is_persisted_as_mapping() {
		let resolver = resolver(vec![product("p-1", "ABC")]);

		let resolved = resolver.resolve("r-1", Some("ABC")).await.unwrap();
		assert_eq!(resolved.as_deref(), Some("p-1"));

		let mappings = resolver.list().await.unwrap();
		assert_eq!(mappings.len(), 1);
		assert_eq!(mappings[0].remote_product_id, "r-1");
		assert_eq!(mappings[0].local_product_id, "p-1");
	}

	#[tokio::test]
	async fn unmatched_product_resolves_to_none() {
		let resolver = resolver(vec![]);
		assert!(resolver.resolve("r-1", Some("ABC")).await.unwrap().is_none());
		assert!(resolver.resolve("r-2", None).await.unwrap().is_none());
		assert!(resolver.list().await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn recreating_a_mapping_is_idempotent() {
		let resolver = resolver(vec![]);
		resolver.create_mapping("r-1", None, "p-1").await.unwrap();
		resolver.create_mapping("r-1", None, "p-1").await.unwrap();

		let mappings = resolver.list().await.unwrap();
		assert_eq!(mappings.len(), 1);
	}
}
