//! Webhook ingestion.
//!
//! Notifications are verified against an HMAC-SHA256 signature over the raw
//! request body, then fed through the same forward-only merge as the poll
//! loop. A webhook arriving after a newer poll result is simply ignored;
//! a webhook that never arrives is caught by the next poll.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::Arc;
use tracing::{info, warn};

use bridge_orders::{MergeOutcome, OrderStore, RemoteUpdate};
use bridge_types::{BridgeEvent, EventBus, OrderEvent, RemoteStatus};

use crate::SyncError;

type HmacSha256 = Hmac<Sha256>;

/// Status notification pushed by the platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookNotification {
	pub order_id: String,
	pub status: String,
	pub timestamp: Option<DateTime<Utc>>,
}

/// Verifies the hex-encoded HMAC-SHA256 signature of a webhook body.
#[derive(Clone)]
pub struct WebhookVerifier {
	secret: Vec<u8>,
}

impl WebhookVerifier {
	pub fn new(secret: impl Into<Vec<u8>>) -> Self {
		Self {
			secret: secret.into(),
		}
	}

	/// Constant-time verification of `signature` (hex) against `body`.
	pub fn verify(&self, body: &[u8], signature: &str) -> Result<(), SyncError> {
		let expected = hex::decode(signature).map_err(|_| SyncError::InvalidSignature)?;
		let mut mac = HmacSha256::new_from_slice(&self.secret)
			.map_err(|_| SyncError::InvalidSignature)?;
		mac.update(body);
		mac.verify_slice(&expected)
			.map_err(|_| SyncError::InvalidSignature)
	}

	/// Signs a body; used by tests and by collaborators exercising the
	/// endpoint.
	pub fn sign(&self, body: &[u8]) -> Result<String, SyncError> {
		let mut mac = HmacSha256::new_from_slice(&self.secret)
			.map_err(|_| SyncError::InvalidSignature)?;
		mac.update(body);
		Ok(hex::encode(mac.finalize().into_bytes()))
	}
}

/// Ingests verified webhook notifications into the order store.
pub struct WebhookProcessor {
	verifier: Option<WebhookVerifier>,
	store: Arc<OrderStore>,
	events: EventBus,
}

impl WebhookProcessor {
	pub fn new(verifier: Option<WebhookVerifier>, store: Arc<OrderStore>, events: EventBus) -> Self {
		Self {
			verifier,
			store,
			events,
		}
	}

	/// Verifies and merges one notification. Returns what the merge did so
	/// the caller can acknowledge accordingly.
	pub async fn ingest(
		&self,
		body: &[u8],
		signature: Option<&str>,
	) -> Result<MergeOutcome, SyncError> {
		if let Some(verifier) = &self.verifier {
			let signature = signature.ok_or(SyncError::InvalidSignature)?;
			verifier.verify(body, signature)?;
		}

		let notification: WebhookNotification =
			serde_json::from_slice(body).map_err(|e| SyncError::Payload(e.to_string()))?;
		let status = RemoteStatus::parse(&notification.status)
			.map_err(|e| SyncError::UnknownStatus(e.0))?;

		info!(order_id = %notification.order_id, status = ?status, "webhook notification received");
		let outcome = self
			.store
			.merge(RemoteUpdate::new(notification.order_id.clone(), status))
			.await?;

		match outcome {
			MergeOutcome::Inserted => {
				let _ = self
					.events
					.publish(BridgeEvent::Order(OrderEvent::Discovered {
						order_id: notification.order_id,
						status,
					}));
			}
			MergeOutcome::Advanced { from, to } => {
				let _ = self.events.publish(BridgeEvent::Order(OrderEvent::Advanced {
					order_id: notification.order_id,
					from,
					to,
				}));
			}
			MergeOutcome::Ignored => {
				warn!(order_id = %notification.order_id, "stale webhook ignored");
			}
			MergeOutcome::Unchanged => {}
		}
		Ok(outcome)
	}
}
