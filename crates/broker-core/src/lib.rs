//! Broker side of the evidence source protocol.
//!
//! Requests are sent through a [`SourceTransport`], decoded by the
//! [`RequestExecutor`] into either the expected payload or a classified
//! [`broker_types::EvidenceSourceError`], and attributed to a source by the
//! [`ProvenanceResolver`]. Sources that compute evidence over time are
//! driven by the [`AsyncEvidenceWorkflow`].

pub mod broker;
pub mod executor;
pub mod provenance;
pub mod registry;
pub mod strict;
pub mod transport;
pub mod workflow;

pub use broker::{BrokerError, EvidenceBroker};
pub use executor::RequestExecutor;
pub use provenance::{ProvenanceError, ProvenanceResolver};
pub use registry::{RegistryError, SourceEndpoint, SourceRegistry};
pub use transport::{
	BreakerObserver, HttpTransport, NoopBreakerObserver, RequestOptions, SourceRequest,
	SourceResponse, SourceTransport, TransportError, NON_FATAL_STATUSES,
};
pub use workflow::{
	AsyncEvidenceState, AsyncEvidenceWorkflow, AsyncKey, AsyncStateStore, MemoryStateStore,
	WorkflowError,
};
