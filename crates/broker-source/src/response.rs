//! Turns the outcome of an evidence handler into an HTTP response.
//!
//! Only [`EvidenceSourceError`] is translated here. Anything else a handler
//! does wrong (a panic) is left to the host's fault handler, which answers
//! with a [`broker_types::CrashEnvelope`] instead of an [`ErrorModel`]. The
//! broker relies on that difference to tell a classified failure from a
//! crash.

use axum::{
	http::{HeaderValue, StatusCode},
	response::{IntoResponse, Json, Response},
};
use broker_types::{
	DebugFields, ErrorModel, EvidenceSourceError, SourceErrorKind, INVOCATION_ID_HEADER,
};
use serde::Serialize;
use std::future::Future;
use uuid::Uuid;

/// Wraps evidence handlers for one source deployment.
#[derive(Debug, Clone, Copy)]
pub struct SourceResponder {
	debug: DebugFields,
}

impl SourceResponder {
	pub fn new(debug: DebugFields) -> Self {
		Self { debug }
	}

	/// Responder that never emits debug fields.
	pub fn production() -> Self {
		Self::new(DebugFields::Omit)
	}

	pub fn development() -> Self {
		Self::new(DebugFields::Include)
	}

	/// Runs `handler`; success becomes `200` with the serialized payload.
	pub async fn respond<T, Fut>(&self, handler: Fut) -> Response
	where
		T: Serialize,
		Fut: Future<Output = Result<T, EvidenceSourceError>>,
	{
		match handler.await {
			Ok(payload) => (StatusCode::OK, Json(payload)).into_response(),
			Err(err) => self.error_response(&err),
		}
	}

	/// Runs a handler that has nothing to return yet; success becomes an
	/// empty `202 Accepted`.
	pub async fn respond_accepted<Fut>(&self, handler: Fut) -> Response
	where
		Fut: Future<Output = Result<(), EvidenceSourceError>>,
	{
		match handler.await {
			Ok(()) => StatusCode::ACCEPTED.into_response(),
			Err(err) => self.error_response(&err),
		}
	}

	pub fn error_response(&self, err: &EvidenceSourceError) -> Response {
		let invocation_id = Uuid::new_v4().to_string();
		let model = ErrorModel::from_source_error(err, self.debug).with_invocation_id(&invocation_id);

		let mut response = (status_for(err.kind()), Json(model)).into_response();
		if let Ok(value) = HeaderValue::from_str(&invocation_id) {
			response.headers_mut().insert(INVOCATION_ID_HEADER, value);
		}
		response
	}
}

pub fn status_for(kind: SourceErrorKind) -> StatusCode {
	match kind {
		SourceErrorKind::Transient => StatusCode::SERVICE_UNAVAILABLE,
		SourceErrorKind::PermanentClient => StatusCode::BAD_REQUEST,
		SourceErrorKind::PermanentServer => StatusCode::BAD_GATEWAY,
	}
}
