//! Polling scheduler.
//!
//! One sync cycle lists the orders the platform currently holds in any
//! tracked status and merges them into the local store. Cycles never
//! overlap: if a cycle is still running when the next tick fires, the tick
//! is skipped rather than queued.

use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use bridge_auth::CredentialStore;
use bridge_client::PlatformClient;
use bridge_config::{MAX_POLLING_INTERVAL_SECS, MIN_POLLING_INTERVAL_SECS};
use bridge_orders::{MappingResolver, MergeOutcome, OrderStore, RemoteUpdate};
use bridge_types::{BridgeEvent, EventBus, OrderEvent, RemoteOrder, RemoteStatus, SyncEvent};

use crate::SyncError;

/// Orders older than this are no longer synchronized; the platform itself
/// expires them and detail fetches would return inconsistent data. Matches
/// the executor's actionable window.
pub const STALE_ORDER_MAX_AGE_HOURS: i64 = bridge_orders::ACTIONABLE_WINDOW_HOURS;

/// Statuses the poll loop asks the platform for. Terminal statuses are
/// included: the merge is upsert-only, so a CONCLUDED or CANCELLED listing
/// is the only way polling closes out a local record (and confirms a
/// pending cancel or late dispatch).
const POLL_STATUSES: [RemoteStatus; 7] = [
	RemoteStatus::Placed,
	RemoteStatus::Confirmed,
	RemoteStatus::PreparationStarted,
	RemoteStatus::ReadyToPickup,
	RemoteStatus::Dispatched,
	RemoteStatus::Concluded,
	RemoteStatus::Cancelled,
];

pub struct Scheduler {
	client: Arc<PlatformClient>,
	store: Arc<OrderStore>,
	resolver: Arc<MappingResolver>,
	credentials: CredentialStore,
	events: EventBus,
	in_flight: AtomicBool,
	default_interval_seconds: u64,
}

impl Scheduler {
	pub fn new(
		client: Arc<PlatformClient>,
		store: Arc<OrderStore>,
		resolver: Arc<MappingResolver>,
		credentials: CredentialStore,
		events: EventBus,
		default_interval_seconds: u64,
	) -> Self {
		Self {
			client,
			store,
			resolver,
			credentials,
			events,
			in_flight: AtomicBool::new(false),
			default_interval_seconds,
		}
	}

	/// Runs the poll loop until the shutdown signal flips.
	pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
		info!("scheduler started");
		loop {
			let interval = self.poll_interval().await;
			tokio::select! {
				_ = tokio::time::sleep(interval) => {
					if !self.integration_active().await {
						debug!("integration inactive, skipping sync");
						continue;
					}
					match self.sync_once().await {
						Ok(merged) => debug!(merged, "sync cycle completed"),
						Err(SyncError::AlreadyRunning) => {
							debug!("previous sync cycle still in flight, tick skipped")
						}
						Err(e) => warn!(error = %e, "sync cycle failed"),
					}
				}
				_ = shutdown.changed() => {
					info!("scheduler stopping");
					break;
				}
			}
		}
	}

	/// Runs one sync cycle, guarded against overlap.
	pub async fn sync_once(&self) -> Result<usize, SyncError> {
		if self.in_flight.swap(true, Ordering::SeqCst) {
			return Err(SyncError::AlreadyRunning);
		}
		let result = self.sync_cycle().await;
		self.in_flight.store(false, Ordering::SeqCst);

		match &result {
			Ok(merged) => {
				let _ = self
					.events
					.publish(BridgeEvent::Sync(SyncEvent::Completed { merged: *merged }));
			}
			Err(e) => {
				let _ = self.events.publish(BridgeEvent::Sync(SyncEvent::Failed {
					error: e.to_string(),
				}));
			}
		}
		result
	}

	/// Fetches the full detail of an order, resolving its line items against
	/// the product catalog and ingesting the result.
	///
	/// Orders past the staleness window are refused before any network call.
	pub async fn get_order_details(&self, order_id: &str) -> Result<RemoteOrder, SyncError> {
		if let Some(record) = self.store.get_local(order_id).await? {
			self.check_age(record.created_at)?;
		}

		let mut order = self.client.get_order(order_id).await?;
		// An order first seen through a detail fetch can already be stale.
		self.check_age(order.created_at)?;

		let mut unmapped = Vec::new();
		for item in &mut order.items {
			match self
				.resolver
				.resolve(&item.remote_product_id, item.sku.as_deref())
				.await?
			{
				Some(local_product_id) => {
					item.local_product_id = Some(local_product_id);
					item.unmapped = false;
				}
				None => {
					item.unmapped = true;
					unmapped.push(item.remote_product_id.clone());
					let _ = self
						.events
						.publish(BridgeEvent::Order(OrderEvent::UnmappedProduct {
							order_id: order.id.clone(),
							remote_product_id: item.remote_product_id.clone(),
							sku: item.sku.clone(),
						}));
				}
			}
		}

		self.store.cache_order(&order).await?;
		let outcome = self.store.merge(RemoteUpdate::from_order(&order)).await?;
		self.publish_merge(&order.id, outcome);
		self.store
			.set_unmapped_products(&order.id, unmapped)
			.await?;
		Ok(order)
	}

	async fn sync_cycle(&self) -> Result<usize, SyncError> {
		let summaries = self.client.list_orders(&POLL_STATUSES).await?;
		debug!(count = summaries.len(), "poll returned order summaries");

		let mut merged = 0;
		for summary in summaries {
			let update = RemoteUpdate {
				order_id: summary.id.clone(),
				status: summary.status,
				display_id: Some(summary.display_id),
				created_at: Some(summary.created_at),
				order_type: None,
				total: None,
			};
			match self.store.merge(update).await? {
				MergeOutcome::Inserted => {
					merged += 1;
					let _ = self
						.events
						.publish(BridgeEvent::Order(OrderEvent::Discovered {
							order_id: summary.id,
							status: summary.status,
						}));
				}
				MergeOutcome::Advanced { from, to } => {
					merged += 1;
					let _ = self.events.publish(BridgeEvent::Order(OrderEvent::Advanced {
						order_id: summary.id,
						from,
						to,
					}));
				}
				MergeOutcome::Unchanged | MergeOutcome::Ignored => {}
			}
		}

		self.check_pending_actions().await?;

		if let Some(mut config) = self.credentials.load().await? {
			config.last_sync_at = Some(Utc::now());
			self.credentials.save(&config).await?;
		}
		Ok(merged)
	}

	/// Resolves actions the platform acknowledged asynchronously: clears the
	/// ones whose status change has shown up, surfaces the ones past their
	/// confirmation deadline.
	async fn check_pending_actions(&self) -> Result<(), SyncError> {
		for pending in self.store.pending_actions().await? {
			let Some(record) = self.store.get_local(&pending.order_id).await? else {
				continue;
			};
			let expected = pending.action.expected_status();
			let reached =
				record.remote_status == expected || record.remote_status.supersedes(expected);
			if reached {
				debug!(order_id = %pending.order_id, action = ?pending.action, "pending action confirmed");
				self.store.clear_pending(&pending.order_id).await?;
			} else if Utc::now() > pending.deadline {
				warn!(order_id = %pending.order_id, action = ?pending.action, "pending action unconfirmed past deadline");
				let _ = self
					.events
					.publish(BridgeEvent::Action(bridge_types::ActionEvent::Unconfirmed {
						order_id: pending.order_id.clone(),
						action: pending.action,
					}));
				self.store.clear_pending(&pending.order_id).await?;
			}
		}
		Ok(())
	}

	async fn poll_interval(&self) -> Duration {
		let configured = match self.credentials.load().await {
			Ok(Some(config)) => config.polling_interval_seconds,
			_ => self.default_interval_seconds,
		};
		let clamped = configured.clamp(MIN_POLLING_INTERVAL_SECS, MAX_POLLING_INTERVAL_SECS);
		Duration::from_secs(clamped)
	}

	async fn integration_active(&self) -> bool {
		matches!(
			self.credentials.load().await,
			Ok(Some(config)) if config.is_active && config.has_credentials()
		)
	}

	fn check_age(&self, created_at: chrono::DateTime<Utc>) -> Result<(), SyncError> {
		let age = Utc::now() - created_at;
		if age > chrono::Duration::hours(STALE_ORDER_MAX_AGE_HOURS) {
			return Err(SyncError::StaleOrder);
		}
		Ok(())
	}

	fn publish_merge(&self, order_id: &str, outcome: MergeOutcome) {
		if let MergeOutcome::Advanced { from, to } = outcome {
			let _ = self.events.publish(BridgeEvent::Order(OrderEvent::Advanced {
				order_id: order_id.to_string(),
				from,
				to,
			}));
		}
	}
}
