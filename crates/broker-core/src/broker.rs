//! Entry point the service uses to reach evidence sources.

use crate::executor::RequestExecutor;
use crate::provenance::ProvenanceResolver;
use crate::registry::{SourceEndpoint, SourceRegistry};
use crate::transport::{SourceRequest, SourceTransport};
use crate::workflow::{AsyncEvidenceWorkflow, AsyncStateStore, WorkflowError};
use broker_config::BrokerConfig;
use broker_types::{AsyncStatusResponse, EvidenceHarvesterRequest, EvidenceSourceError};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use thiserror::Error;
use tracing::instrument;

#[derive(Debug, Error)]
pub enum BrokerError {
	#[error("Configuration error: {0}")]
	Config(String),

	#[error("Unknown evidence code: {0}")]
	UnknownEvidenceCode(String),

	#[error(transparent)]
	Source(#[from] EvidenceSourceError),

	#[error(transparent)]
	Workflow(#[from] WorkflowError),

	#[error("Failed to encode request: {0}")]
	Encode(#[from] serde_json::Error),
}

/// Routes evidence requests to the source that serves the evidence code.
pub struct EvidenceBroker {
	registry: SourceRegistry,
	executor: RequestExecutor,
	transport: Arc<dyn SourceTransport>,
	workflow: AsyncEvidenceWorkflow,
}

impl EvidenceBroker {
	pub fn new(
		config: &BrokerConfig,
		transport: Arc<dyn SourceTransport>,
		store: Arc<dyn AsyncStateStore>,
	) -> Result<Self, BrokerError> {
		let provenance = ProvenanceResolver::from_config(&config.provenance)
			.map_err(|e| BrokerError::Config(e.to_string()))?;
		let registry =
			SourceRegistry::from_config(config).map_err(|e| BrokerError::Config(e.to_string()))?;
		let executor = RequestExecutor::new(provenance);
		let workflow = AsyncEvidenceWorkflow::new(
			executor.clone(),
			transport.clone(),
			store,
			config.async_evidence.status_cache_ttl(),
		);

		Ok(Self {
			registry,
			executor,
			transport,
			workflow,
		})
	}

	pub fn registry(&self) -> &SourceRegistry {
		&self.registry
	}

	pub fn endpoint(&self, evidence_code: &str) -> Result<&SourceEndpoint, BrokerError> {
		self.registry
			.get(evidence_code)
			.ok_or_else(|| BrokerError::UnknownEvidenceCode(evidence_code.to_string()))
	}

	/// Synchronous harvest: one call, one answer.
	#[instrument(skip_all, fields(code = %request.evidence_code_name))]
	pub async fn harvest<T>(&self, request: &EvidenceHarvesterRequest) -> Result<T, BrokerError>
	where
		T: DeserializeOwned + Default,
	{
		let endpoint = self.endpoint(&request.evidence_code_name)?;
		let source_request = SourceRequest::evidence(endpoint.url.clone(), request)?;
		let value = self
			.executor
			.execute(source_request, |r| self.transport.send(r))
			.await?;
		Ok(value)
	}

	pub async fn initialize(&self, request: &EvidenceHarvesterRequest) -> Result<(), BrokerError> {
		let endpoint = self.endpoint(&request.evidence_code_name)?;
		Ok(self.workflow.initialize(endpoint, request).await?)
	}

	pub async fn check_status(
		&self,
		request: &EvidenceHarvesterRequest,
	) -> Result<AsyncStatusResponse, BrokerError> {
		let endpoint = self.endpoint(&request.evidence_code_name)?;
		Ok(self.workflow.check_status(endpoint, request).await?)
	}

	pub async fn harvest_async<T>(&self, request: &EvidenceHarvesterRequest) -> Result<T, BrokerError>
	where
		T: DeserializeOwned + Default,
	{
		let endpoint = self.endpoint(&request.evidence_code_name)?;
		Ok(self.workflow.harvest(endpoint, request).await?)
	}

	pub async fn cancel(&self, request: &EvidenceHarvesterRequest) -> Result<(), BrokerError> {
		let endpoint = self.endpoint(&request.evidence_code_name)?;
		Ok(self.workflow.cancel(endpoint, request).await?)
	}
}
