//! Persistence of async retrieval state.
//!
//! Storage is an external collaborator; the broker only needs reads, writes
//! and a compare-and-set keyed by requestor and evidence code.

use super::state::AsyncEvidenceState;
use async_trait::async_trait;
use dashmap::{mapref::entry::Entry, DashMap};
use std::fmt;
use thiserror::Error;

/// Identifies one retrieval.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AsyncKey {
	pub requestor: String,
	pub evidence_code: String,
}

impl AsyncKey {
	pub fn new(requestor: impl Into<String>, evidence_code: impl Into<String>) -> Self {
		Self {
			requestor: requestor.into(),
			evidence_code: evidence_code.into(),
		}
	}
}

impl fmt::Display for AsyncKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}/{}", self.requestor, self.evidence_code)
	}
}

#[derive(Debug, Error)]
pub enum StoreError {
	#[error("Backend error: {0}")]
	Backend(String),
}

#[async_trait]
pub trait AsyncStateStore: Send + Sync {
	/// Current state; `NotStarted` when nothing is recorded.
	async fn get(&self, key: &AsyncKey) -> Result<AsyncEvidenceState, StoreError>;

	async fn put(&self, key: &AsyncKey, state: AsyncEvidenceState) -> Result<(), StoreError>;

	/// Moves `key` from `expected` to `next` atomically. Returns `false`,
	/// leaving the state untouched, when the current state is not `expected`.
	async fn transition(
		&self,
		key: &AsyncKey,
		expected: AsyncEvidenceState,
		next: AsyncEvidenceState,
	) -> Result<bool, StoreError>;
}

/// In-process store.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
	states: DashMap<AsyncKey, AsyncEvidenceState>,
}

impl MemoryStateStore {
	pub fn new() -> Self {
		Self::default()
	}
}

#[async_trait]
impl AsyncStateStore for MemoryStateStore {
	async fn get(&self, key: &AsyncKey) -> Result<AsyncEvidenceState, StoreError> {
		Ok(self.states.get(key).map(|s| *s).unwrap_or_default())
	}

	async fn put(&self, key: &AsyncKey, state: AsyncEvidenceState) -> Result<(), StoreError> {
		if state == AsyncEvidenceState::NotStarted {
			self.states.remove(key);
		} else {
			self.states.insert(key.clone(), state);
		}
		Ok(())
	}

	async fn transition(
		&self,
		key: &AsyncKey,
		expected: AsyncEvidenceState,
		next: AsyncEvidenceState,
	) -> Result<bool, StoreError> {
		match self.states.entry(key.clone()) {
			Entry::Occupied(mut entry) => {
				if *entry.get() != expected {
					return Ok(false);
				}
				if next == AsyncEvidenceState::NotStarted {
					entry.remove();
				} else {
					entry.insert(next);
				}
			}
			Entry::Vacant(entry) => {
				if expected != AsyncEvidenceState::NotStarted {
					return Ok(false);
				}
				if next != AsyncEvidenceState::NotStarted {
					entry.insert(next);
				}
			}
		}
		Ok(true)
	}
}
