//! Local order records and the forward-only merge.
//!
//! Every remote observation, whether it comes from the poll loop, a webhook,
//! or an action acknowledgement, goes through [`OrderStore::merge`]. The
//! merge is the single place that decides whether an observation advances a
//! record, so out-of-order delivery can never regress state.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{debug, info};

use bridge_storage::{namespaces, StorageService};
use bridge_types::{LocalOrder, OrderBucket, OrderType, RemoteOrder, RemoteStatus};
use std::sync::Arc;

use crate::OrderError;

/// A remote observation to merge into the local store.
#[derive(Debug, Clone)]
pub struct RemoteUpdate {
	pub order_id: String,
	pub status: RemoteStatus,
	pub display_id: Option<String>,
	pub created_at: Option<DateTime<Utc>>,
	pub order_type: Option<OrderType>,
	pub total: Option<Decimal>,
}

impl RemoteUpdate {
	pub fn new(order_id: impl Into<String>, status: RemoteStatus) -> Self {
		Self {
			order_id: order_id.into(),
			status,
			display_id: None,
			created_at: None,
			order_type: None,
			total: None,
		}
	}

	pub fn from_order(order: &RemoteOrder) -> Self {
		Self {
			order_id: order.id.clone(),
			status: order.status,
			display_id: Some(order.display_id.clone()),
			created_at: Some(order.created_at),
			order_type: Some(order.order_type),
			total: Some(order.total),
		}
	}
}

/// What a merge did to the local record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
	/// First observation of this order.
	Inserted,
	/// A known order moved forward.
	Advanced {
		from: RemoteStatus,
		to: RemoteStatus,
	},
	/// Same or equivalent status; nothing to do.
	Unchanged,
	/// The observation is older than the record (or the record is terminal)
	/// and was dropped.
	Ignored,
}

/// Persistent store of local order records and cached remote snapshots.
pub struct OrderStore {
	storage: Arc<StorageService>,
}

impl OrderStore {
	pub fn new(storage: Arc<StorageService>) -> Self {
		Self { storage }
	}

	/// Merges a remote observation into the local record, forward-only.
	pub async fn merge(&self, update: RemoteUpdate) -> Result<MergeOutcome, OrderError> {
		let existing: Option<LocalOrder> = self
			.storage
			.retrieve_optional(namespaces::LOCAL_ORDER, &update.order_id)
			.await?;

		let Some(mut record) = existing else {
			let now = Utc::now();
			let record = LocalOrder {
				remote_order_id: update.order_id.clone(),
				display_id: update.display_id.unwrap_or_else(|| update.order_id.clone()),
				local_status: update.status.local_status(),
				remote_status: update.status,
				created_at: update.created_at.unwrap_or(now),
				updated_at: now,
				order_type: update.order_type,
				total: update.total,
				unmapped_products: Vec::new(),
			};
			self.storage
				.store(namespaces::LOCAL_ORDER, &record.remote_order_id, &record)
				.await?;
			info!(order_id = %record.remote_order_id, status = ?record.remote_status, "order discovered");
			return Ok(MergeOutcome::Inserted);
		};

		if update.status == record.remote_status {
			return Ok(MergeOutcome::Unchanged);
		}
		if !update.status.supersedes(record.remote_status) {
			debug!(
				order_id = %update.order_id,
				have = ?record.remote_status,
				got = ?update.status,
				"stale observation ignored"
			);
			return Ok(MergeOutcome::Ignored);
		}

		let from = record.remote_status;
		record.remote_status = update.status;
		record.local_status = update.status.local_status();
		record.updated_at = Utc::now();
		if let Some(order_type) = update.order_type {
			record.order_type = Some(order_type);
		}
		if let Some(total) = update.total {
			record.total = Some(total);
		}
		self.storage
			.store(namespaces::LOCAL_ORDER, &record.remote_order_id, &record)
			.await?;
		info!(order_id = %record.remote_order_id, from = ?from, to = ?update.status, "order advanced");
		Ok(MergeOutcome::Advanced {
			from,
			to: update.status,
		})
	}

	pub async fn get_local(&self, order_id: &str) -> Result<Option<LocalOrder>, OrderError> {
		Ok(self
			.storage
			.retrieve_optional(namespaces::LOCAL_ORDER, order_id)
			.await?)
	}

	/// Lists local records whose remote status falls into the bucket,
	/// newest first.
	pub async fn list_bucket(&self, bucket: OrderBucket) -> Result<Vec<LocalOrder>, OrderError> {
		let all: Vec<LocalOrder> = self.storage.retrieve_all(namespaces::LOCAL_ORDER).await?;
		let statuses = bucket.remote_statuses();
		let mut matching: Vec<LocalOrder> = all
			.into_iter()
			.filter(|order| statuses.contains(&order.remote_status))
			.collect();
		matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
		Ok(matching)
	}

	/// Caches a full remote snapshot alongside the local record.
	pub async fn cache_order(&self, order: &RemoteOrder) -> Result<(), OrderError> {
		self.storage
			.store(namespaces::REMOTE_ORDER_CACHE, &order.id, order)
			.await?;
		Ok(())
	}

	pub async fn cached_order(&self, order_id: &str) -> Result<Option<RemoteOrder>, OrderError> {
		Ok(self
			.storage
			.retrieve_optional(namespaces::REMOTE_ORDER_CACHE, order_id)
			.await?)
	}

	/// Records an action awaiting asynchronous confirmation. One pending
	/// action per order; actions are serialized per order by the executor.
	pub async fn set_pending(&self, pending: &crate::PendingAction) -> Result<(), OrderError> {
		self.storage
			.store(namespaces::PENDING_ACTION, &pending.order_id, pending)
			.await?;
		Ok(())
	}

	pub async fn pending_actions(&self) -> Result<Vec<crate::PendingAction>, OrderError> {
		Ok(self.storage.retrieve_all(namespaces::PENDING_ACTION).await?)
	}

	pub async fn clear_pending(&self, order_id: &str) -> Result<(), OrderError> {
		self.storage
			.remove(namespaces::PENDING_ACTION, order_id)
			.await?;
		Ok(())
	}

	/// Records which line items of an order failed product resolution.
	pub async fn set_unmapped_products(
		&self,
		order_id: &str,
		remote_product_ids: Vec<String>,
	) -> Result<(), OrderError> {
		let Some(mut record) = self.get_local(order_id).await? else {
			return Err(OrderError::NotFound(order_id.to_string()));
		};
		record.unmapped_products = remote_product_ids;
		record.updated_at = Utc::now();
		self.storage
			.store(namespaces::LOCAL_ORDER, order_id, &record)
			.await?;
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use bridge_storage::implementations::memory::MemoryStorage;
	use bridge_types::LocalStatus;

	fn store() -> OrderStore {
		OrderStore::new(Arc::new(StorageService::new(Box::new(
			MemoryStorage::new(),
		))))
	}

	#[tokio::test]
	async fn first_observation_inserts() {
		let store = store();
		let outcome = store
			.merge(RemoteUpdate::new("o-1", RemoteStatus::Placed))
			.await
			.unwrap();
		assert_eq!(outcome, MergeOutcome::Inserted);

		let record = store.get_local("o-1").await.unwrap().unwrap();
		assert_eq!(record.remote_status, RemoteStatus::Placed);
		assert_eq!(record.local_status, LocalStatus::Pending);
	}

	#[tokio::test]
	async fn forward_observation_advances() {
		let store = store();
		store
			.merge(RemoteUpdate::new("o-1", RemoteStatus::Placed))
			.await
			.unwrap();
		let outcome = store
			.merge(RemoteUpdate::new("o-1", RemoteStatus::Confirmed))
			.await
			.unwrap();
		assert_eq!(
			outcome,
			MergeOutcome::Advanced {
				from: RemoteStatus::Placed,
				to: RemoteStatus::Confirmed,
			}
		);

		let record = store.get_local("o-1").await.unwrap().unwrap();
		assert_eq!(record.local_status, LocalStatus::Preparing);
	}

	#[tokio::test]
	async fn stale_observation_is_ignored() {
		let store = store();
		store
			.merge(RemoteUpdate::new("o-1", RemoteStatus::Dispatched))
			.await
			.unwrap();
		let outcome = store
			.merge(RemoteUpdate::new("o-1", RemoteStatus::Confirmed))
			.await
			.unwrap();
		assert_eq!(outcome, MergeOutcome::Ignored);

		let record = store.get_local("o-1").await.unwrap().unwrap();
		assert_eq!(record.remote_status, RemoteStatus::Dispatched);
	}

	#[tokio::test]
	async fn repeated_observation_is_unchanged() {
		let store = store();
		store
			.merge(RemoteUpdate::new("o-1", RemoteStatus::Confirmed))
			.await
			.unwrap();
		let outcome = store
			.merge(RemoteUpdate::new("o-1", RemoteStatus::Confirmed))
			.await
			.unwrap();
		assert_eq!(outcome, MergeOutcome::Unchanged);
	}

	#[tokio::test]
	async fn cancellation_overrides_any_non_terminal_state() {
		let store = store();
		store
			.merge(RemoteUpdate::new("o-1", RemoteStatus::Dispatched))
			.await
			.unwrap();
		let outcome = store
			.merge(RemoteUpdate::new("o-1", RemoteStatus::Cancelled))
			.await
			.unwrap();
		assert!(matches!(outcome, MergeOutcome::Advanced { .. }));

		// Terminal records are frozen.
		let outcome = store
			.merge(RemoteUpdate::new("o-1", RemoteStatus::Concluded))
			.await
			.unwrap();
		assert_eq!(outcome, MergeOutcome::Ignored);
	}

	#[tokio::test]
	async fn buckets_list_matching_records_newest_first() {
		let store = store();
		for (id, status) in [
			("o-1", RemoteStatus::Placed),
			("o-2", RemoteStatus::Confirmed),
			("o-3", RemoteStatus::PreparationStarted),
			("o-4", RemoteStatus::Cancelled),
		] {
			store.merge(RemoteUpdate::new(id, status)).await.unwrap();
		}

		let pending = store.list_bucket(OrderBucket::Pending).await.unwrap();
		assert_eq!(pending.len(), 1);
		assert_eq!(pending[0].remote_order_id, "o-1");

		let active = store.list_bucket(OrderBucket::Active).await.unwrap();
		assert_eq!(active.len(), 2);

		let concluded = store.list_bucket(OrderBucket::Concluded).await.unwrap();
		assert_eq!(concluded.len(), 1);
	}
}
