//! Asynchronous evidence retrieval.
//!
//! Some sources need time to compute evidence. The caller first initializes
//! the retrieval, polls its status, and finally harvests the value or
//! cancels. State lives in an [`AsyncStateStore`]; pending status results
//! are reused for a short while from a [`StatusCache`].

pub mod cache;
pub mod state;
pub mod store;

pub use cache::StatusCache;
pub use state::{AsyncEvidenceState, InvalidTransition, WorkflowEvent};
pub use store::{AsyncKey, AsyncStateStore, MemoryStateStore, StoreError};

use crate::executor::RequestExecutor;
use crate::registry::SourceEndpoint;
use crate::transport::{SourceRequest, SourceTransport};
use broker_types::{
	AsyncEvidencePhase, AsyncStatusResponse, EvidenceHarvesterRequest, EvidenceSourceError,
};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, instrument};

#[derive(Debug, Error)]
pub enum WorkflowError {
	#[error(transparent)]
	Source(#[from] EvidenceSourceError),

	#[error("Evidence for {key} is not available yet")]
	StillWaiting {
		key: AsyncKey,
		retry_after_seconds: Option<u64>,
	},

	#[error("Asynchronous retrieval of {0} has not been initialized")]
	NotInitialized(AsyncKey),

	#[error(transparent)]
	InvalidTransition(#[from] InvalidTransition),

	#[error("State store error: {0}")]
	Store(#[from] StoreError),

	#[error("Failed to encode request: {0}")]
	Encode(#[from] serde_json::Error),
}

pub struct AsyncEvidenceWorkflow {
	executor: RequestExecutor,
	transport: Arc<dyn SourceTransport>,
	store: Arc<dyn AsyncStateStore>,
	cache: StatusCache,
}

impl AsyncEvidenceWorkflow {
	pub fn new(
		executor: RequestExecutor,
		transport: Arc<dyn SourceTransport>,
		store: Arc<dyn AsyncStateStore>,
		status_cache_ttl: Duration,
	) -> Self {
		Self {
			executor,
			transport,
			store,
			cache: StatusCache::new(status_cache_ttl),
		}
	}

	/// Asks the source to start computing. Never sent twice for a pending
	/// retrieval: the source does not promise Initialize is idempotent.
	#[instrument(skip_all, fields(source = %endpoint.source_name, code = %endpoint.evidence_code))]
	pub async fn initialize(
		&self,
		endpoint: &SourceEndpoint,
		request: &EvidenceHarvesterRequest,
	) -> Result<(), WorkflowError> {
		let key = key_for(request);
		let reserved = self.reserve(&key, WorkflowEvent::Initialized).await?;

		let sent = self
			.call::<serde_json::Value>(endpoint, request, AsyncEvidencePhase::Initialize)
			.await;
		self.settle(&key, reserved, sent).await?;

		self.cache.invalidate(&key);
		info!("Initialized asynchronous retrieval of {}", key);
		Ok(())
	}

	/// Polls the source. A still-pending answer is a normal result.
	#[instrument(skip_all, fields(source = %endpoint.source_name, code = %endpoint.evidence_code))]
	pub async fn check_status(
		&self,
		endpoint: &SourceEndpoint,
		request: &EvidenceHarvesterRequest,
	) -> Result<AsyncStatusResponse, WorkflowError> {
		let key = key_for(request);
		let current = self.store.get(&key).await?;
		if current == AsyncEvidenceState::Available {
			return Ok(AsyncStatusResponse::available());
		}
		transition(&key, current, WorkflowEvent::StillPending)?;

		if let Some(cached) = self.cache.get(&key) {
			debug!("Using cached status for {}", key);
			return Ok(cached);
		}

		let status: AsyncStatusResponse = self
			.call(endpoint, request, AsyncEvidencePhase::CheckStatus)
			.await?;

		if status.is_still_waiting() {
			self.cache.insert(key, status.clone());
		} else {
			let next = transition(&key, current, WorkflowEvent::BecameAvailable)?;
			self.cache.invalidate(&key);
			if self.store.transition(&key, current, next).await? {
				info!("Evidence for {} is available", key);
			} else {
				debug!("State of {} changed while polling, keeping it", key);
			}
		}
		Ok(status)
	}

	/// Fetches the final value. Ends the retrieval.
	#[instrument(skip_all, fields(source = %endpoint.source_name, code = %endpoint.evidence_code))]
	pub async fn harvest<T>(
		&self,
		endpoint: &SourceEndpoint,
		request: &EvidenceHarvesterRequest,
	) -> Result<T, WorkflowError>
	where
		T: DeserializeOwned + Default,
	{
		let key = key_for(request);
		if self.store.get(&key).await? == AsyncEvidenceState::Pending {
			let status = self.check_status(endpoint, request).await?;
			if status.is_still_waiting() {
				return Err(WorkflowError::StillWaiting {
					key,
					retry_after_seconds: status.retry_after_seconds,
				});
			}
		}
		let reserved = self.reserve(&key, WorkflowEvent::Harvested).await?;

		let fetched = self
			.call(endpoint, request, AsyncEvidencePhase::Harvest)
			.await;
		let value = self.settle(&key, reserved, fetched).await?;

		info!("Harvested asynchronous evidence for {}", key);
		Ok(value)
	}

	#[instrument(skip_all, fields(source = %endpoint.source_name, code = %endpoint.evidence_code))]
	pub async fn cancel(
		&self,
		endpoint: &SourceEndpoint,
		request: &EvidenceHarvesterRequest,
	) -> Result<(), WorkflowError> {
		let key = key_for(request);
		let reserved = self.reserve(&key, WorkflowEvent::Cancelled).await?;

		let sent = self
			.call::<serde_json::Value>(endpoint, request, AsyncEvidencePhase::Cancel)
			.await;
		self.settle(&key, reserved, sent).await?;

		self.cache.invalidate(&key);
		info!("Cancelled asynchronous retrieval of {}", key);
		Ok(())
	}

	pub async fn state(
		&self,
		request: &EvidenceHarvesterRequest,
	) -> Result<AsyncEvidenceState, WorkflowError> {
		Ok(self.store.get(&key_for(request)).await?)
	}

	/// Claims the transition for `event` before the source is called, so
	/// concurrent callers for the same key cannot both reach the source.
	async fn reserve(
		&self,
		key: &AsyncKey,
		event: WorkflowEvent,
	) -> Result<Reserved, WorkflowError> {
		loop {
			let from = self.store.get(key).await?;
			let to = transition(key, from, event)?;
			if self.store.transition(key, from, to).await? {
				return Ok(Reserved { from, to });
			}
			debug!("State of {} changed concurrently, retrying {:?}", key, event);
		}
	}

	/// Keeps a reserved transition when the call succeeded and undoes it
	/// otherwise.
	async fn settle<T>(
		&self,
		key: &AsyncKey,
		reserved: Reserved,
		outcome: Result<T, WorkflowError>,
	) -> Result<T, WorkflowError> {
		if outcome.is_err() && !self.store.transition(key, reserved.to, reserved.from).await? {
			debug!("State of {} changed during a failed call, not rolling back", key);
		}
		outcome
	}

	async fn call<T>(
		&self,
		endpoint: &SourceEndpoint,
		request: &EvidenceHarvesterRequest,
		phase: AsyncEvidencePhase,
	) -> Result<T, WorkflowError>
	where
		T: DeserializeOwned + Default,
	{
		let envelope = request.clone().with_phase(phase);
		let source_request = SourceRequest::evidence(endpoint.url.clone(), &envelope)?;
		let value = self
			.executor
			.execute(source_request, |r| self.transport.send(r))
			.await?;
		Ok(value)
	}
}

#[derive(Debug, Clone, Copy)]
struct Reserved {
	from: AsyncEvidenceState,
	to: AsyncEvidenceState,
}

fn key_for(request: &EvidenceHarvesterRequest) -> AsyncKey {
	AsyncKey::new(&request.requestor, &request.evidence_code_name)
}

fn transition(
	key: &AsyncKey,
	current: AsyncEvidenceState,
	event: WorkflowEvent,
) -> Result<AsyncEvidenceState, WorkflowError> {
	current.apply(event).map_err(|err| {
		if err.from == AsyncEvidenceState::NotStarted {
			WorkflowError::NotInitialized(key.clone())
		} else {
			WorkflowError::InvalidTransition(err)
		}
	})
}
