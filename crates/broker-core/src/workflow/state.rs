//! State machine for one asynchronous evidence retrieval.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Lifecycle of a (requestor, evidence code) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AsyncEvidenceState {
	#[default]
	NotStarted,
	Pending,
	Available,
	Cancelled,
}

/// Something that happened to a retrieval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowEvent {
	/// The source accepted an Initialize call.
	Initialized,
	/// A status check reported that the source is still working.
	StillPending,
	/// A status check reported that the evidence can be harvested.
	BecameAvailable,
	/// The final value was delivered.
	Harvested,
	/// The source accepted a Cancel call.
	Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Cannot apply {event:?} to a retrieval that is {from}")]
pub struct InvalidTransition {
	pub from: AsyncEvidenceState,
	pub event: WorkflowEvent,
}

impl AsyncEvidenceState {
	/// Next state after `event`.
	///
	/// Harvesting ends the retrieval and returns the pair to `NotStarted`,
	/// so the next value needs a fresh Initialize. A cancelled retrieval can
	/// only be restarted.
	pub fn apply(self, event: WorkflowEvent) -> Result<Self, InvalidTransition> {
		use AsyncEvidenceState as S;
		use WorkflowEvent as E;

		match (self, event) {
			(S::NotStarted | S::Cancelled, E::Initialized) => Ok(S::Pending),
			(S::Pending, E::StillPending) => Ok(S::Pending),
			(S::Pending | S::Available, E::BecameAvailable) => Ok(S::Available),
			(S::Available, E::Harvested) => Ok(S::NotStarted),
			(S::Pending, E::Cancelled) => Ok(S::Cancelled),
			(from, event) => Err(InvalidTransition { from, event }),
		}
	}
}

impl fmt::Display for AsyncEvidenceState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			AsyncEvidenceState::NotStarted => "not started",
			AsyncEvidenceState::Pending => "pending",
			AsyncEvidenceState::Available => "available",
			AsyncEvidenceState::Cancelled => "cancelled",
		};
		f.write_str(name)
	}
}
