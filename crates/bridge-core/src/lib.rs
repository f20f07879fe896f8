//! Engine orchestration for the order bridge.
//!
//! [`BridgeEngine`] wires the token manager, platform client, order store,
//! action executor, scheduler, and webhook processor together and exposes
//! the operations the collaborator API serves. [`BridgeBuilder`] constructs
//! an engine from validated configuration.

use thiserror::Error;

use bridge_auth::AuthError;
use bridge_client::ClientError;
use bridge_config::ConfigError;
use bridge_orders::OrderError;
use bridge_storage::StorageError;
use bridge_sync::SyncError;

mod builder;
mod engine;

pub use builder::BridgeBuilder;
pub use engine::{BridgeEngine, SaveConfigRequest};

#[derive(Debug, Error)]
pub enum BridgeError {
	#[error("invalid request: {0}")]
	Validation(String),
	#[error("webhook ingestion is disabled")]
	WebhookDisabled,
	#[error("engine construction failed: {0}")]
	Builder(String),
	#[error(transparent)]
	Config(#[from] ConfigError),
	#[error(transparent)]
	Auth(#[from] AuthError),
	#[error(transparent)]
	Client(#[from] ClientError),
	#[error(transparent)]
	Order(#[from] OrderError),
	#[error(transparent)]
	Sync(#[from] SyncError),
	#[error(transparent)]
	Storage(#[from] StorageError),
}
