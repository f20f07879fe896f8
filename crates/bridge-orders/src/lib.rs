//! Order lifecycle management.
//!
//! Owns the closed order state machine, the local order store with its
//! forward-only merge, the action executor that drives orders through the
//! platform, and the product mapping resolver for line items.

use thiserror::Error;

use bridge_client::ClientError;
use bridge_storage::StorageError;
use bridge_types::RemoteStatus;

mod actions;
mod mapping;
mod state;
mod store;

pub use actions::{ActionExecutor, ActionOutcome, PendingAction, ACTIONABLE_WINDOW_HOURS};
pub use mapping::{MappingResolver, ProductCatalog};
pub use state::{next_transition, validate_action, ActionCheck, Transition};
pub use store::{MergeOutcome, OrderStore, RemoteUpdate};

#[derive(Debug, Error)]
pub enum OrderError {
	#[error("invalid transition from {from:?}: {reason}")]
	InvalidTransition { from: RemoteStatus, reason: String },
	#[error("order not found: {0}")]
	NotFound(String),
	#[error("order is outside the actionable window")]
	StaleOrder,
	#[error(transparent)]
	Client(#[from] ClientError),
	#[error(transparent)]
	Storage(#[from] StorageError),
}

impl OrderError {
	fn invalid(from: RemoteStatus, reason: impl Into<String>) -> Self {
		Self::InvalidTransition {
			from,
			reason: reason.into(),
		}
	}
}
