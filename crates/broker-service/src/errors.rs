//! Outward error mapping.
//!
//! Every failure the API can report, whether raised by the broker itself or
//! relayed from an evidence source, is an [`ApiError`]. Its [`ErrorCode`]
//! decides the HTTP status through [`ErrorCode::http_status`].

use crate::policy::PolicyError;
use axum::{
	http::{header, HeaderValue, StatusCode},
	response::{IntoResponse, Json, Response},
};
use broker_core::{BrokerError, WorkflowError};
use broker_types::{
	DebugFields, ErrorCode, ErrorModel, EvidenceSourceError, INVOCATION_ID_HEADER,
};
use thiserror::Error;
use tracing::{debug, error};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ApiError {
	#[error("{0}")]
	InvalidRequest(String),

	#[error("{0}")]
	InvalidSubject(String),

	#[error("{0}")]
	InvalidParameter(String),

	#[error("Unknown evidence code: {0}")]
	NonExistentEvidenceCode(String),

	#[error("{0}")]
	InvalidAsyncAction(String),

	#[error("{0}")]
	AsyncNotInitialized(String),

	#[error("Evidence is not available yet")]
	StillWaiting { retry_after_seconds: Option<u64> },

	#[error(transparent)]
	Policy(#[from] PolicyError),

	#[error(transparent)]
	Source(#[from] EvidenceSourceError),

	#[error("{0}")]
	Unavailable(String),

	#[error("{0}")]
	Internal(String),
}

impl ApiError {
	pub fn error_code(&self) -> ErrorCode {
		match self {
			ApiError::InvalidRequest(_) => ErrorCode::InvalidRequest,
			ApiError::InvalidSubject(_) => ErrorCode::InvalidSubject,
			ApiError::InvalidParameter(_) => ErrorCode::InvalidEvidenceRequestParameter,
			ApiError::NonExistentEvidenceCode(_) => ErrorCode::NonExistentEvidenceCode,
			ApiError::InvalidAsyncAction(_) => ErrorCode::InvalidAsyncAction,
			ApiError::AsyncNotInitialized(_) => ErrorCode::AsyncEvidenceNotInitialized,
			ApiError::StillWaiting { .. } => ErrorCode::AsyncEvidenceStillWaiting,
			ApiError::Policy(err) => err.error_code(),
			ApiError::Source(err) => err.error_code(),
			ApiError::Unavailable(_) => ErrorCode::ServiceNotAvailable,
			ApiError::Internal(_) => ErrorCode::InternalServerError,
		}
	}

	pub fn status(&self) -> StatusCode {
		StatusCode::from_u16(self.error_code().http_status())
			.unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
	}

	/// Outward envelope. Source errors keep their attributed detail code.
	pub fn to_model(&self, debug: DebugFields) -> ErrorModel {
		match self {
			ApiError::Source(err) => ErrorModel::from_source_error(err, debug)
				.with_detail_code(err.composed_detail_code()),
			ApiError::StillWaiting { .. } => ErrorModel::new(self.error_code()),
			other => {
				let message = other.to_string();
				let mut model = ErrorModel::new(other.error_code()).with_message(Some(message.as_str()));
				if debug.included() {
					model.stacktrace = Some(format!("{:?}", other));
				}
				model
			}
		}
	}

	/// Attaches the deployment's debug policy so the error can be rendered.
	pub fn with_debug(self, debug: DebugFields) -> ErrorResponse {
		ErrorResponse { error: self, debug }
	}
}

impl From<BrokerError> for ApiError {
	fn from(err: BrokerError) -> Self {
		match err {
			BrokerError::UnknownEvidenceCode(code) => ApiError::NonExistentEvidenceCode(code),
			BrokerError::Source(err) => ApiError::Source(err),
			BrokerError::Workflow(err) => err.into(),
			BrokerError::Config(message) => ApiError::Internal(message),
			BrokerError::Encode(err) => ApiError::Internal(err.to_string()),
		}
	}
}

impl From<WorkflowError> for ApiError {
	fn from(err: WorkflowError) -> Self {
		match err {
			WorkflowError::Source(err) => ApiError::Source(err),
			WorkflowError::StillWaiting {
				retry_after_seconds,
				..
			} => ApiError::StillWaiting {
				retry_after_seconds,
			},
			err @ WorkflowError::NotInitialized(_) => ApiError::AsyncNotInitialized(err.to_string()),
			WorkflowError::InvalidTransition(err) => ApiError::InvalidAsyncAction(err.to_string()),
			WorkflowError::Store(err) => ApiError::Unavailable(err.to_string()),
			WorkflowError::Encode(err) => ApiError::Internal(err.to_string()),
		}
	}
}

/// An [`ApiError`] ready to be written out.
#[derive(Debug)]
pub struct ErrorResponse {
	error: ApiError,
	debug: DebugFields,
}

impl ErrorResponse {
	pub fn error(&self) -> &ApiError {
		&self.error
	}
}

impl IntoResponse for ErrorResponse {
	fn into_response(self) -> Response {
		let status = self.error.status();
		let invocation_id = Uuid::new_v4().to_string();
		let model = self
			.error
			.to_model(self.debug)
			.with_invocation_id(&invocation_id);

		if status.is_server_error() {
			error!(
				invocation_id = %invocation_id,
				code = model.code,
				detail_code = model.detail_code.as_deref().unwrap_or_default(),
				"Request failed: {}",
				self.error
			);
		} else {
			debug!(invocation_id = %invocation_id, code = model.code, "Request rejected: {}", self.error);
		}

		let mut response = (status, Json(model)).into_response();
		let headers = response.headers_mut();
		if let Ok(value) = HeaderValue::from_str(&invocation_id) {
			headers.insert(INVOCATION_ID_HEADER, value);
		}
		if let ApiError::StillWaiting {
			retry_after_seconds: Some(seconds),
		} = self.error
		{
			headers.insert(header::RETRY_AFTER, HeaderValue::from(seconds));
		}
		response
	}
}
