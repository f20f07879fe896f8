//! Order types shared across the bridge.
//!
//! This module defines the canonical remote and local order statuses,
//! the actions that can be issued against the delivery platform, and the
//! order snapshots exchanged between the platform client, the state
//! machine, and storage.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error returned when the platform reports a status value outside the
/// closed set the bridge understands.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown remote status: {0}")]
pub struct UnknownStatus(pub String);

/// Order status as reported by the delivery platform.
///
/// The set is closed: wire values outside it are rejected with
/// [`UnknownStatus`] instead of falling through to a default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RemoteStatus {
	Placed,
	Confirmed,
	PreparationStarted,
	ReadyToPickup,
	Dispatched,
	Concluded,
	Cancelled,
}

impl RemoteStatus {
	/// Parses a wire status value, rejecting anything outside the closed set.
	pub fn parse(value: &str) -> Result<Self, UnknownStatus> {
		match value {
			"PLACED" => Ok(Self::Placed),
			"CONFIRMED" => Ok(Self::Confirmed),
			"PREPARATION_STARTED" => Ok(Self::PreparationStarted),
			"READY_TO_PICKUP" => Ok(Self::ReadyToPickup),
			"DISPATCHED" => Ok(Self::Dispatched),
			"CONCLUDED" => Ok(Self::Concluded),
			"CANCELLED" => Ok(Self::Cancelled),
			other => Err(UnknownStatus(other.to_string())),
		}
	}

	/// Wire representation of this status.
	pub fn as_wire(&self) -> &'static str {
		match self {
			Self::Placed => "PLACED",
			Self::Confirmed => "CONFIRMED",
			Self::PreparationStarted => "PREPARATION_STARTED",
			Self::ReadyToPickup => "READY_TO_PICKUP",
			Self::Dispatched => "DISPATCHED",
			Self::Concluded => "CONCLUDED",
			Self::Cancelled => "CANCELLED",
		}
	}

	/// Position in the forward ordering. Cancelled sits outside the chain
	/// and is handled separately by [`RemoteStatus::supersedes`].
	pub fn rank(&self) -> u8 {
		match self {
			Self::Placed => 0,
			Self::Confirmed => 1,
			Self::PreparationStarted => 2,
			Self::ReadyToPickup => 3,
			Self::Dispatched => 4,
			Self::Concluded => 5,
			Self::Cancelled => 6,
		}
	}

	/// Terminal statuses admit no further transitions.
	pub fn is_terminal(&self) -> bool {
		matches!(self, Self::Concluded | Self::Cancelled)
	}

	/// Canonical mapping from remote to local status.
	pub fn local_status(&self) -> LocalStatus {
		match self {
			Self::Placed => LocalStatus::Pending,
			Self::Confirmed | Self::PreparationStarted => LocalStatus::Preparing,
			Self::ReadyToPickup => LocalStatus::Ready,
			Self::Dispatched => LocalStatus::Delivered,
			Self::Concluded => LocalStatus::Closed,
			Self::Cancelled => LocalStatus::Cancelled,
		}
	}

	/// Whether an observation of `self` represents a later point in the
	/// forward-only ordering than `previous`.
	///
	/// Used by the merge path so that a stale update (for example a webhook
	/// delivered after a newer poll result) never regresses local state.
	pub fn supersedes(&self, previous: RemoteStatus) -> bool {
		if previous.is_terminal() {
			return false;
		}
		if *self == Self::Cancelled {
			return true;
		}
		self.rank() > previous.rank()
	}
}

/// The bridge's own order status, derived from the remote status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LocalStatus {
	Pending,
	Preparing,
	Ready,
	Delivered,
	Closed,
	Cancelled,
}

/// State-changing action issued against the platform for a single order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderAction {
	Confirm,
	StartPreparation,
	ReadyToPickup,
	Dispatch,
	Cancel,
}

impl OrderAction {
	/// Path segment of the platform's action endpoint.
	pub fn endpoint(&self) -> &'static str {
		match self {
			Self::Confirm => "confirm",
			Self::StartPreparation => "start-preparation",
			Self::ReadyToPickup => "ready-to-pickup",
			Self::Dispatch => "dispatch",
			Self::Cancel => "cancel",
		}
	}

	/// Remote status the platform reaches once this action is applied.
	pub fn expected_status(&self) -> RemoteStatus {
		match self {
			Self::Confirm => RemoteStatus::Confirmed,
			Self::StartPreparation => RemoteStatus::PreparationStarted,
			Self::ReadyToPickup => RemoteStatus::ReadyToPickup,
			Self::Dispatch => RemoteStatus::Dispatched,
			Self::Cancel => RemoteStatus::Cancelled,
		}
	}
}

impl std::str::FromStr for OrderAction {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"confirm" => Ok(Self::Confirm),
			"start_preparation" | "start-preparation" => Ok(Self::StartPreparation),
			"ready_to_pickup" | "ready-to-pickup" => Ok(Self::ReadyToPickup),
			"dispatch" => Ok(Self::Dispatch),
			"cancel" => Ok(Self::Cancel),
			other => Err(format!("unknown order action: {}", other)),
		}
	}
}

/// Display buckets the collaborator API lists orders by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderBucket {
	Pending,
	Active,
	Dispatched,
	Concluded,
}

impl OrderBucket {
	/// Remote statuses that fall into this bucket.
	pub fn remote_statuses(&self) -> &'static [RemoteStatus] {
		match self {
			Self::Pending => &[RemoteStatus::Placed],
			Self::Active => &[
				RemoteStatus::Confirmed,
				RemoteStatus::PreparationStarted,
				RemoteStatus::ReadyToPickup,
			],
			Self::Dispatched => &[RemoteStatus::Dispatched],
			Self::Concluded => &[RemoteStatus::Concluded, RemoteStatus::Cancelled],
		}
	}

	/// All buckets, in the order the scheduler polls them.
	pub fn all() -> [OrderBucket; 4] {
		[
			Self::Pending,
			Self::Active,
			Self::Dispatched,
			Self::Concluded,
		]
	}
}

impl std::str::FromStr for OrderBucket {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"pending" => Ok(Self::Pending),
			"active" => Ok(Self::Active),
			"dispatched" => Ok(Self::Dispatched),
			"concluded" => Ok(Self::Concluded),
			other => Err(format!("unknown order bucket: {}", other)),
		}
	}
}

/// How the customer receives the order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
	Delivery,
	Takeout,
	DineIn,
	Indoor,
}

/// Customer details attached to a remote order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
	pub id: Option<String>,
	pub name: String,
	pub phone: Option<String>,
}

/// Delivery or takeout address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryAddress {
	pub street: String,
	pub number: Option<String>,
	pub city: String,
	pub state: Option<String>,
	pub postal_code: Option<String>,
	pub complement: Option<String>,
}

/// A customization option nested under a line item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemOption {
	pub id: String,
	pub group: Option<String>,
	pub name: String,
	pub quantity: u32,
	pub price: Decimal,
}

/// A single line item of a remote order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItem {
	pub id: String,
	pub remote_product_id: String,
	pub sku: Option<String>,
	pub name: String,
	pub quantity: u32,
	pub unit_price: Decimal,
	#[serde(default)]
	pub options: Vec<ItemOption>,
	/// Local product this item resolved to, if any.
	#[serde(default)]
	pub local_product_id: Option<String>,
	/// Set when no mapping or SKU match was found; the order is still
	/// ingested and the item is flagged for manual reconciliation.
	#[serde(default)]
	pub unmapped: bool,
}

/// One payment entry of the order's payment breakdown.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentMethod {
	pub method: String,
	pub amount: Decimal,
	pub prepaid: bool,
}

/// Payment breakdown of a remote order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaymentSummary {
	pub prepaid: Decimal,
	pub pending: Decimal,
	#[serde(default)]
	pub methods: Vec<PaymentMethod>,
}

/// Snapshot of an order as reported by the delivery platform.
///
/// Immutable once fetched except for `status`, which only advances through
/// the forward ordering. Superseded by later fetches, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteOrder {
	pub id: String,
	pub display_id: String,
	pub created_at: DateTime<Utc>,
	pub order_type: OrderType,
	pub customer: Customer,
	pub delivery_address: Option<DeliveryAddress>,
	pub items: Vec<OrderItem>,
	#[serde(default)]
	pub payments: PaymentSummary,
	pub total: Decimal,
	pub status: RemoteStatus,
}

/// Lightweight order entry returned by the platform's list endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteOrderSummary {
	pub id: String,
	pub display_id: String,
	pub created_at: DateTime<Utc>,
	pub status: RemoteStatus,
}

/// The bridge's own order record, linked 1:1 to a remote order.
///
/// `local_status` is a strict forward-only function of the remote status;
/// it is never written directly by UI actions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalOrder {
	pub remote_order_id: String,
	pub display_id: String,
	pub local_status: LocalStatus,
	pub remote_status: RemoteStatus,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
	#[serde(default)]
	pub order_type: Option<OrderType>,
	#[serde(default)]
	pub total: Option<Decimal>,
	/// Remote product ids of line items that could not be mapped locally.
	#[serde(default)]
	pub unmapped_products: Vec<String>,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parse_rejects_unknown_status() {
		assert_eq!(
			RemoteStatus::parse("PLACED"),
			Ok(RemoteStatus::Placed)
		);
		let err = RemoteStatus::parse("SOMETHING_ELSE").unwrap_err();
		assert_eq!(err.0, "SOMETHING_ELSE");
	}

	#[test]
	fn local_mapping_matches_table() {
		assert_eq!(RemoteStatus::Placed.local_status(), LocalStatus::Pending);
		assert_eq!(
			RemoteStatus::Confirmed.local_status(),
			LocalStatus::Preparing
		);
		assert_eq!(
			RemoteStatus::PreparationStarted.local_status(),
			LocalStatus::Preparing
		);
		assert_eq!(
			RemoteStatus::ReadyToPickup.local_status(),
			LocalStatus::Ready
		);
		assert_eq!(
			RemoteStatus::Dispatched.local_status(),
			LocalStatus::Delivered
		);
		assert_eq!(RemoteStatus::Concluded.local_status(), LocalStatus::Closed);
		assert_eq!(
			RemoteStatus::Cancelled.local_status(),
			LocalStatus::Cancelled
		);
	}

	#[test]
	fn supersedes_is_forward_only() {
		assert!(RemoteStatus::Confirmed.supersedes(RemoteStatus::Placed));
		assert!(!RemoteStatus::Placed.supersedes(RemoteStatus::Confirmed));
		assert!(!RemoteStatus::Placed.supersedes(RemoteStatus::Placed));
		assert!(RemoteStatus::Concluded.supersedes(RemoteStatus::Dispatched));
	}

	#[test]
	fn cancelled_supersedes_any_non_terminal() {
		for status in [
			RemoteStatus::Placed,
			RemoteStatus::Confirmed,
			RemoteStatus::PreparationStarted,
			RemoteStatus::ReadyToPickup,
			RemoteStatus::Dispatched,
		] {
			assert!(RemoteStatus::Cancelled.supersedes(status));
		}
		assert!(!RemoteStatus::Cancelled.supersedes(RemoteStatus::Concluded));
		assert!(!RemoteStatus::Cancelled.supersedes(RemoteStatus::Cancelled));
	}

	#[test]
	fn terminal_statuses_never_superseded() {
		assert!(!RemoteStatus::Placed.supersedes(RemoteStatus::Cancelled));
		assert!(!RemoteStatus::Dispatched.supersedes(RemoteStatus::Concluded));
	}

	#[test]
	fn buckets_cover_all_statuses() {
		let mut covered = Vec::new();
		for bucket in OrderBucket::all() {
			covered.extend_from_slice(bucket.remote_statuses());
		}
		assert_eq!(covered.len(), 7);
	}
}
