//! Product catalog backed by the bridge's own storage.
//!
//! Local products are loaded into the `local_product` namespace (by an
//! import job or by hand) and looked up by SKU during order resolution.

use async_trait::async_trait;
use std::sync::Arc;

use bridge_orders::ProductCatalog;
use bridge_storage::{namespaces, StorageError, StorageService};
use bridge_types::LocalProduct;

pub struct StorageCatalog {
	storage: Arc<StorageService>,
}

impl StorageCatalog {
	pub fn new(storage: Arc<StorageService>) -> Self {
		Self { storage }
	}

	/// Adds or replaces a product, keyed by its id.
	pub async fn upsert(&self, product: &LocalProduct) -> Result<(), StorageError> {
		self.storage
			.store(namespaces::LOCAL_PRODUCT, &product.id, product)
			.await
	}
}

#[async_trait]
impl ProductCatalog for StorageCatalog {
	async fn find_by_sku(&self, sku: &str) -> Result<Option<LocalProduct>, StorageError> {
		let products: Vec<LocalProduct> = self
			.storage
			.retrieve_all(namespaces::LOCAL_PRODUCT)
			.await?;
		Ok(products.into_iter().find(|p| p.sku.as_deref() == Some(sku)))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use bridge_storage::implementations::memory::MemoryStorage;

	#[tokio::test]
	async fn finds_products_by_sku() {
		let storage = Arc::new(StorageService::new(Box::new(MemoryStorage::new())));
		let catalog = StorageCatalog::new(storage);
		catalog
			.upsert(&LocalProduct {
				id: "p-1".to_string(),
				sku: Some("ABC".to_string()),
				name: "Burger".to_string(),
			})
			.await
			.unwrap();

		let found = catalog.find_by_sku("ABC").await.unwrap();
		assert_eq!(found.unwrap().id, "p-1");
		assert!(catalog.find_by_sku("XYZ").await.unwrap().is_none());
	}
}
