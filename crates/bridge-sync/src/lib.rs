//! Synchronization between the delivery platform and the local store.
//!
//! The scheduler polls the platform on the configured interval and merges
//! what it sees; the webhook path ingests pushed notifications through the
//! same forward-only merge. Both are reconciliation mechanisms over the
//! same state, so a lost webhook is only a latency problem.

use thiserror::Error;

use bridge_client::ClientError;
use bridge_orders::OrderError;
use bridge_storage::StorageError;

mod scheduler;
mod webhook;

pub use scheduler::{Scheduler, STALE_ORDER_MAX_AGE_HOURS};
pub use webhook::{WebhookNotification, WebhookProcessor, WebhookVerifier};

#[derive(Debug, Error)]
pub enum SyncError {
	#[error("order is older than the staleness window and is no longer synchronized")]
	StaleOrder,
	#[error("a sync cycle is already in flight")]
	AlreadyRunning,
	#[error("webhook signature verification failed")]
	InvalidSignature,
	#[error("invalid webhook payload: {0}")]
	Payload(String),
	#[error("unknown remote status: {0}")]
	UnknownStatus(String),
	#[error(transparent)]
	Client(#[from] ClientError),
	#[error(transparent)]
	Order(#[from] OrderError),
	#[error(transparent)]
	Storage(#[from] StorageError),
}
