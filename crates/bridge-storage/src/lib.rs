//! Storage module for the order bridge.
//!
//! Provides abstractions for persisting integration config, cached orders,
//! and product mappings behind simple namespaced get/put/scan operations,
//! with in-memory and file-based backends.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod file;
	pub mod memory;
}

/// Logical table names used by the bridge.
pub mod namespaces {
	pub const INTEGRATION_CONFIG: &str = "integration_config";
	pub const REMOTE_ORDER_CACHE: &str = "remote_order_cache";
	pub const LOCAL_ORDER: &str = "local_order";
	pub const PRODUCT_MAPPING: &str = "product_mapping";
	pub const LOCAL_PRODUCT: &str = "local_product";
	pub const PENDING_ACTION: &str = "pending_action";
}

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
	/// Error that occurs when a requested item is not found.
	#[error("Not found")]
	NotFound,
	/// Error that occurs during serialization/deserialization.
	#[error("Serialization error: {0}")]
	Serialization(String),
	/// Error that occurs in the storage backend.
	#[error("Backend error: {0}")]
	Backend(String),
}

/// Trait defining the low-level interface for storage backends.
///
/// Keys are flat strings; the typed [`StorageService`] builds them as
/// `namespace:id` and lists a namespace through `scan_prefix`.
#[async_trait]
pub trait StorageInterface: Send + Sync {
	/// Retrieves raw bytes for the given key.
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError>;

	/// Stores raw bytes under the given key, replacing any previous value.
	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError>;

	/// Deletes the value associated with the given key.
	async fn delete(&self, key: &str) -> Result<(), StorageError>;

	/// Checks if a key exists in storage.
	async fn exists(&self, key: &str) -> Result<bool, StorageError>;

	/// Returns the raw values of every key starting with `prefix`.
	async fn scan_prefix(&self, prefix: &str) -> Result<Vec<Vec<u8>>, StorageError>;
}

/// High-level storage service that provides typed operations.
///
/// Wraps a low-level backend and adds JSON serialization and the
/// `namespace:id` key scheme.
pub struct StorageService {
	backend: Box<dyn StorageInterface>,
}

impl StorageService {
	/// Creates a new StorageService with the specified backend.
	pub fn new(backend: Box<dyn StorageInterface>) -> Self {
		Self { backend }
	}

	fn key(namespace: &str, id: &str) -> String {
		format!("{}:{}", namespace, id)
	}

	/// Stores a serializable value under `namespace:id`.
	pub async fn store<T: Serialize>(
		&self,
		namespace: &str,
		id: &str,
		data: &T,
	) -> Result<(), StorageError> {
		let bytes =
			serde_json::to_vec(data).map_err(|e| StorageError::Serialization(e.to_string()))?;
		self.backend.set_bytes(&Self::key(namespace, id), bytes).await
	}

	/// Retrieves and deserializes a value from storage.
	pub async fn retrieve<T: DeserializeOwned>(
		&self,
		namespace: &str,
		id: &str,
	) -> Result<T, StorageError> {
		let bytes = self.backend.get_bytes(&Self::key(namespace, id)).await?;
		serde_json::from_slice(&bytes).map_err(|e| StorageError::Serialization(e.to_string()))
	}

	/// Retrieves a value, mapping NotFound to `None`.
	pub async fn retrieve_optional<T: DeserializeOwned>(
		&self,
		namespace: &str,
		id: &str,
	) -> Result<Option<T>, StorageError> {
		match self.retrieve(namespace, id).await {
			Ok(value) => Ok(Some(value)),
			Err(StorageError::NotFound) => Ok(None),
			Err(e) => Err(e),
		}
	}

	/// Retrieves every value stored under the given namespace.
	pub async fn retrieve_all<T: DeserializeOwned>(
		&self,
		namespace: &str,
	) -> Result<Vec<T>, StorageError> {
		let prefix = format!("{}:", namespace);
		let raw = self.backend.scan_prefix(&prefix).await?;
		raw.into_iter()
			.map(|bytes| {
				serde_json::from_slice(&bytes)
					.map_err(|e| StorageError::Serialization(e.to_string()))
			})
			.collect()
	}

	/// Removes a value from storage. Removing a missing value is not an error.
	pub async fn remove(&self, namespace: &str, id: &str) -> Result<(), StorageError> {
		self.backend.delete(&Self::key(namespace, id)).await
	}

	/// Checks whether `namespace:id` exists.
	pub async fn exists(&self, namespace: &str, id: &str) -> Result<bool, StorageError> {
		self.backend.exists(&Self::key(namespace, id)).await
	}
}

#[cfg(test)]
mod tests {
	use super::implementations::memory::MemoryStorage;
	use super::*;
	use serde::Deserialize;

	#[derive(Debug, Serialize, Deserialize, PartialEq)]
	struct Record {
		id: String,
		value: u32,
	}

	fn service() -> StorageService {
		StorageService::new(Box::new(MemoryStorage::new()))
	}

	#[tokio::test]
	async fn store_and_retrieve_round_trip() {
		let storage = service();
		let record = Record {
			id: "a".into(),
			value: 7,
		};
		storage.store("records", "a", &record).await.unwrap();

		let loaded: Record = storage.retrieve("records", "a").await.unwrap();
		assert_eq!(loaded, record);
	}

	#[tokio::test]
	async fn retrieve_missing_is_not_found() {
		let storage = service();
		let result = storage.retrieve::<Record>("records", "missing").await;
		assert!(matches!(result, Err(StorageError::NotFound)));

		let optional = storage
			.retrieve_optional::<Record>("records", "missing")
			.await
			.unwrap();
		assert!(optional.is_none());
	}

	#[tokio::test]
	async fn retrieve_all_only_sees_its_namespace() {
		let storage = service();
		for (ns, id, value) in [("a", "1", 1), ("a", "2", 2), ("b", "1", 3)] {
			storage
				.store(
					ns,
					id,
					&Record {
						id: id.into(),
						value,
					},
				)
				.await
				.unwrap();
		}

		let records: Vec<Record> = storage.retrieve_all("a").await.unwrap();
		assert_eq!(records.len(), 2);
	}
}
