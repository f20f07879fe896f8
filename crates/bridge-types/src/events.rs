//! Bridge events and the broadcast event bus.
//!
//! Consumers subscribe to confirmed state changes instead of polling after
//! an arbitrary delay; the scheduler, executor, and webhook path all publish
//! here.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::{OrderAction, RemoteStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum BridgeEvent {
	Order(OrderEvent),
	Action(ActionEvent),
	Sync(SyncEvent),
	Auth(AuthEvent),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OrderEvent {
	/// A remote order was observed for the first time.
	Discovered {
		order_id: String,
		status: RemoteStatus,
	},
	/// A known order advanced in the forward ordering.
	Advanced {
		order_id: String,
		from: RemoteStatus,
		to: RemoteStatus,
	},
	/// A line item could not be resolved to a local product.
	UnmappedProduct {
		order_id: String,
		remote_product_id: String,
		sku: Option<String>,
	},
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ActionEvent {
	/// The platform acknowledged an action. `is_async` means the status
	/// change is not guaranteed yet and will be confirmed by poll or webhook.
	Acknowledged {
		order_id: String,
		action: OrderAction,
		is_async: bool,
	},
	/// An async-acknowledged action was not confirmed before its deadline
	/// and is surfaced for manual retry.
	Unconfirmed {
		order_id: String,
		action: OrderAction,
	},
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SyncEvent {
	Completed { merged: usize },
	Failed { error: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AuthEvent {
	Authenticated,
	Failed { error: String },
}

/// Broadcast-based event bus shared by all bridge services.
pub struct EventBus {
	sender: broadcast::Sender<BridgeEvent>,
}

impl EventBus {
	pub fn new(capacity: usize) -> Self {
		let (sender, _) = broadcast::channel(capacity);
		Self { sender }
	}

	pub fn subscribe(&self) -> broadcast::Receiver<BridgeEvent> {
		self.sender.subscribe()
	}

	pub fn publish(
		&self,
		event: BridgeEvent,
	) -> Result<(), broadcast::error::SendError<BridgeEvent>> {
		self.sender.send(event)?;
		Ok(())
	}
}

impl Clone for EventBus {
	fn clone(&self) -> Self {
		Self {
			sender: self.sender.clone(),
		}
	}
}
