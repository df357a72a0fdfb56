//! Broker-side request executor.
//!
//! [`RequestExecutor::execute`] sends a prepared request through a caller
//! supplied delegate and turns whatever comes back into either the typed
//! payload or an [`EvidenceSourceError`]. Parse failures never escape raw.

use crate::provenance::ProvenanceResolver;
use crate::strict;
use crate::transport::{SourceRequest, SourceResponse, TransportError, NON_FATAL_STATUSES};
use broker_types::{
	CrashEnvelope, ErrorModel, EvidenceSourceError, InnerError, SourceErrorKind, CIRCUIT_OPEN,
	EMPTY_RESPONSE, GENERIC_FAULT_STATUS, TRANSPORT_FAILURE, TRANSPORT_TIMEOUT,
	UNABLE_TO_DESERIALIZE, UNHANDLED_INTERNAL_ERROR,
};
use serde::de::DeserializeOwned;
use std::future::Future;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct RequestExecutor {
	provenance: ProvenanceResolver,
}

impl RequestExecutor {
	pub fn new(provenance: ProvenanceResolver) -> Self {
		Self { provenance }
	}

	/// Sends `request` through `send` and decodes the result.
	///
	/// An empty 2xx body yields `T::default()`. Every other exit is either a
	/// decoded `T` or a classified error attributed to the source that the
	/// request URL points at.
	pub async fn execute<T, F, Fut>(
		&self,
		mut request: SourceRequest,
		send: F,
	) -> Result<T, EvidenceSourceError>
	where
		T: DeserializeOwned + Default,
		F: FnOnce(SourceRequest) -> Fut,
		Fut: Future<Output = Result<SourceResponse, TransportError>>,
	{
		request.options.allow_statuses(&NON_FATAL_STATUSES);
		let source = self.provenance.resolve(&request.url);
		let url = request.url.clone();

		let result = match send(request).await {
			Ok(response) => decode(response),
			Err(err) => Err(transport_error(err)),
		};

		result.map_err(|err| {
			let err = match source {
				Some(source) => err.with_detail_source(source),
				None => err,
			};
			warn!(
				code = err.error_code().code(),
				detail_code = err.detail_code().unwrap_or_default(),
				detail_source = err.detail_source().unwrap_or_default(),
				retryable = err.kind().is_retryable(),
				"Evidence source call to {} failed: {}",
				url,
				err
			);
			err
		})
	}
}

fn decode<T>(response: SourceResponse) -> Result<T, EvidenceSourceError>
where
	T: DeserializeOwned + Default,
{
	let status = response.status;

	if response.is_body_empty() {
		if status.is_success() {
			debug!("Empty {} response, using default value", status);
			return Ok(T::default());
		}
		return Err(EvidenceSourceError::permanent_server()
			.with_message(format!("Empty non-successful response ({})", status))
			.with_detail_code(EMPTY_RESPONSE));
	}

	if status.as_u16() == GENERIC_FAULT_STATUS {
		if let Ok(crash) = serde_json::from_slice::<CrashEnvelope>(&response.body) {
			return Err(EvidenceSourceError::permanent_server()
				.with_message("Unhandled error in evidence source")
				.with_detail_code(UNHANDLED_INTERNAL_ERROR)
				.with_inner(InnerError::new(crash.message())));
		}
	}

	// The payload is only tried on 2xx. A non-2xx body that happens to fit
	// `T` is still read as an error envelope, never as a success.
	let payload_error = if status.is_success() {
		match strict::from_slice::<T>(&response.body) {
			Ok(value) => return Ok(value),
			Err(e) => Some(e),
		}
	} else {
		None
	};

	match serde_json::from_slice::<ErrorModel>(&response.body) {
		Ok(model) => Err(reclassify(model)),
		Err(model_error) => {
			let cause = match payload_error {
				Some(e) => InnerError::from_error(&e),
				None => InnerError::from_error(&model_error),
			};
			Err(EvidenceSourceError::permanent_server()
				.with_message(format!("Unable to deserialize {} response", status))
				.with_detail_code(UNABLE_TO_DESERIALIZE)
				.with_inner(cause))
		}
	}
}

/// Rebuilds the classified error from an envelope. The envelope's code is
/// authoritative; the HTTP status is not consulted.
fn reclassify(model: ErrorModel) -> EvidenceSourceError {
	let mut err = EvidenceSourceError::new(SourceErrorKind::from_wire_code(model.code));
	if let Some(message) = model.custom_message() {
		err = err.with_message(message);
	}
	if let Some(inner) = model.inner() {
		err = err.with_inner(inner);
	}
	match model.detail_code {
		Some(detail_code) => err.with_detail_code(detail_code),
		None => err,
	}
}

fn transport_error(err: TransportError) -> EvidenceSourceError {
	let cause = InnerError::from_error(&err);
	let classified = match &err {
		TransportError::Timeout { .. } => {
			EvidenceSourceError::permanent_server().with_detail_code(TRANSPORT_TIMEOUT)
		}
		TransportError::CircuitOpen { .. } => {
			EvidenceSourceError::transient().with_detail_code(CIRCUIT_OPEN)
		}
		TransportError::Connection { .. } | TransportError::Client(_) => {
			EvidenceSourceError::permanent_server().with_detail_code(TRANSPORT_FAILURE)
		}
	};
	classified.with_message(err.to_string()).with_inner(cause)
}
