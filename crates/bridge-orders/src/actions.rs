//! Action execution against the platform.
//!
//! The executor serializes actions per order, re-reads the remote status
//! under the lock before validating, and only advances the local record on
//! a synchronous (200) acknowledgement. A 202 acknowledgement is recorded
//! as a pending action and confirmed later by poll or webhook.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use bridge_client::PlatformClient;
use bridge_types::{ActionEvent, BridgeEvent, EventBus, OrderAction, OrderEvent};

use crate::state::{next_transition, validate_action, ActionCheck};
use crate::store::{MergeOutcome, OrderStore, RemoteUpdate};
use crate::OrderError;

/// Orders older than this no longer accept actions; the platform itself
/// expires them.
pub const ACTIONABLE_WINDOW_HOURS: i64 = 8;

/// Result of a successfully submitted action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionOutcome {
	/// The platform acknowledged with 202; the status change is pending.
	pub is_async: bool,
	/// The order was already in the target status, nothing was sent.
	pub noop: bool,
}

/// An action the platform acknowledged asynchronously, awaiting its status
/// change to show up. Past `deadline` it is surfaced as unconfirmed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingAction {
	pub order_id: String,
	pub action: OrderAction,
	pub issued_at: DateTime<Utc>,
	pub deadline: DateTime<Utc>,
}

/// Drives orders through the platform's action endpoints.
pub struct ActionExecutor {
	client: Arc<PlatformClient>,
	store: Arc<OrderStore>,
	events: EventBus,
	locks: DashMap<String, Arc<Mutex<()>>>,
	confirm_timeout: Duration,
}

impl ActionExecutor {
	pub fn new(
		client: Arc<PlatformClient>,
		store: Arc<OrderStore>,
		events: EventBus,
		confirm_timeout_seconds: u64,
	) -> Self {
		Self {
			client,
			store,
			events,
			locks: DashMap::new(),
			confirm_timeout: Duration::seconds(confirm_timeout_seconds as i64),
		}
	}

	/// Submits `action` for `order_id`.
	///
	/// The remote status is re-read under the per-order lock, so a
	/// cancellation that landed on the platform first is seen here and the
	/// action is rejected before anything is sent.
	pub async fn perform(
		&self,
		order_id: &str,
		action: OrderAction,
	) -> Result<ActionOutcome, OrderError> {
		let lock = self
			.locks
			.entry(order_id.to_string())
			.or_insert_with(|| Arc::new(Mutex::new(())))
			.value()
			.clone();
		let result = {
			let _guard = lock.lock().await;
			self.perform_locked(order_id, action).await
		};
		drop(lock);
		self.prune_lock(order_id).await;
		result
	}

	async fn perform_locked(
		&self,
		order_id: &str,
		action: OrderAction,
	) -> Result<ActionOutcome, OrderError> {
		let order = self.client.get_order(order_id).await?;
		self.store.cache_order(&order).await?;
		let outcome = self.store.merge(RemoteUpdate::from_order(&order)).await?;
		self.publish_merge(order_id, outcome);

		if Utc::now() - order.created_at > Duration::hours(ACTIONABLE_WINDOW_HOURS) {
			warn!(order_id, ?action, "order outside the actionable window");
			return Err(OrderError::StaleOrder);
		}

		match validate_action(action, order.status)? {
			ActionCheck::NoopSuccess => {
				info!(order_id, ?action, "order already in target status");
				return Ok(ActionOutcome {
					is_async: false,
					noop: true,
				});
			}
			ActionCheck::Proceed => {}
		}

		let ack = self.client.send_action(order_id, action).await?;
		let _ = self.events.publish(BridgeEvent::Action(ActionEvent::Acknowledged {
			order_id: order_id.to_string(),
			action,
			is_async: ack.is_async,
		}));

		if ack.is_async {
			let issued_at = Utc::now();
			let pending = PendingAction {
				order_id: order_id.to_string(),
				action,
				issued_at,
				deadline: issued_at + self.confirm_timeout,
			};
			self.store.set_pending(&pending).await?;
			warn!(order_id, ?action, "action acknowledged asynchronously, awaiting confirmation");
			return Ok(ActionOutcome {
				is_async: true,
				noop: false,
			});
		}

		// Synchronous acknowledgement: the platform already applied the
		// transition, advance the local record to match.
		let outcome = self
			.store
			.merge(RemoteUpdate::new(order_id, action.expected_status()))
			.await?;
		self.publish_merge(order_id, outcome);
		Ok(ActionOutcome {
			is_async: false,
			noop: false,
		})
	}

	/// Advances an order one step, deriving the required action from its
	/// current position in the chain.
	///
	/// From DISPATCHED onward no remote call is needed; the local record is
	/// closed by the merge when the platform reports CONCLUDED.
	pub async fn advance(&self, order_id: &str) -> Result<ActionOutcome, OrderError> {
		let order = self.client.get_order(order_id).await?;
		let local = match self.store.get_local(order_id).await? {
			Some(record) => record.local_status,
			None => order.status.local_status(),
		};

		let transition = next_transition(local, order.status)?;
		match transition.action {
			// perform() re-reads and re-validates under the per-order lock,
			// so a concurrent cancellation still wins.
			Some(action) => self.perform(order_id, action).await,
			None => {
				self.store.cache_order(&order).await?;
				let outcome = self.store.merge(RemoteUpdate::from_order(&order)).await?;
				self.publish_merge(order_id, outcome);
				Ok(ActionOutcome {
					is_async: false,
					noop: true,
				})
			}
		}
	}

	/// Drops the per-order lock entry once the order is terminal and no other
	/// task holds the lock. Terminal orders take no further actions, so the
	/// map stays bounded by the set of open orders.
	async fn prune_lock(&self, order_id: &str) {
		let terminal = matches!(
			self.store.get_local(order_id).await,
			Ok(Some(record)) if record.remote_status.is_terminal()
		);
		if terminal {
			self.locks
				.remove_if(order_id, |_, lock| Arc::strong_count(lock) == 1);
		}
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
