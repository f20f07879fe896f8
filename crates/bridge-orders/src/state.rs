//! The closed order state machine.
//!
//! Transitions only move forward through the remote ordering; cancellation
//! is reachable from every non-terminal status and terminal statuses admit
//! nothing further. All action validation funnels through here so the
//! executor and the collaborator API agree on what is legal.

use bridge_types::{LocalStatus, OrderAction, RemoteStatus};

use crate::OrderError;

/// The next step an order should take from its current position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
	/// Local status the order lands in once the step completes.
	pub next_local: LocalStatus,
	/// Platform action required to make the step, if the platform is the
	/// one that has to move. `None` means the bridge only advances its own
	/// record.
	pub action: Option<OrderAction>,
}

/// Computes the forward transition for an order observed at `remote`.
///
/// Errors when the order is already terminal or when `local` is ahead of
/// `remote`, which indicates a stale remote observation.
pub fn next_transition(
	local: LocalStatus,
	remote: RemoteStatus,
) -> Result<Transition, OrderError> {
	if remote == RemoteStatus::Cancelled {
		return Err(OrderError::invalid(remote, "order is cancelled"));
	}
	if local_rank(local) > remote.rank() {
		return Err(OrderError::invalid(
			remote,
			"local record is ahead of the remote status",
		));
	}

	let transition = match remote {
		RemoteStatus::Placed => Transition {
			next_local: LocalStatus::Preparing,
			action: Some(OrderAction::Confirm),
		},
		RemoteStatus::Confirmed => Transition {
			next_local: LocalStatus::Preparing,
			action: Some(OrderAction::StartPreparation),
		},
		RemoteStatus::PreparationStarted => Transition {
			next_local: LocalStatus::Ready,
			action: Some(OrderAction::ReadyToPickup),
		},
		RemoteStatus::ReadyToPickup => Transition {
			next_local: LocalStatus::Delivered,
			action: Some(OrderAction::Dispatch),
		},
		// The platform concludes dispatched orders on its own; the bridge
		// only closes its record.
		RemoteStatus::Dispatched | RemoteStatus::Concluded => Transition {
			next_local: LocalStatus::Closed,
			action: None,
		},
		RemoteStatus::Cancelled => unreachable!("rejected above"),
	};
	Ok(transition)
}

/// Outcome of validating an action against the order's remote status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionCheck {
	/// The action is legal from this status and should be sent.
	Proceed,
	/// The order is already in the status this action produces; report
	/// success without touching the platform.
	NoopSuccess,
}

/// Validates `action` against the remote status the order was just observed
/// in. Duplicate submissions of an already-applied action succeed as no-ops;
/// everything else outside the state machine is rejected.
pub fn validate_action(action: OrderAction, remote: RemoteStatus) -> Result<ActionCheck, OrderError> {
	if action == OrderAction::Cancel {
		if remote.is_terminal() {
			return Err(OrderError::invalid(remote, "order is already terminal"));
		}
		return Ok(ActionCheck::Proceed);
	}

	if remote == action.expected_status() {
		return Ok(ActionCheck::NoopSuccess);
	}

	let expected = match remote {
		RemoteStatus::Placed => Some(OrderAction::Confirm),
		RemoteStatus::Confirmed => Some(OrderAction::StartPreparation),
		RemoteStatus::PreparationStarted => Some(OrderAction::ReadyToPickup),
		RemoteStatus::ReadyToPickup => Some(OrderAction::Dispatch),
		_ => None,
	};
	if expected == Some(action) {
		return Ok(ActionCheck::Proceed);
	}
	Err(OrderError::invalid(
		remote,
		format!("action {:?} is not legal from this status", action),
	))
}

/// Earliest remote rank a local status can correspond to. Preparing covers
/// both CONFIRMED and PREPARATION_STARTED, so it takes the lower rank.
fn local_rank(local: LocalStatus) -> u8 {
	match local {
		LocalStatus::Pending => 0,
		LocalStatus::Preparing => 1,
		LocalStatus::Ready => 3,
		LocalStatus::Delivered => 4,
		LocalStatus::Closed => 5,
		LocalStatus::Cancelled => 6,
	}
}
