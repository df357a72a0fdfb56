//! Error taxonomy shared by the broker and its evidence sources.
//!
//! Every application-level failure is described by exactly one [`ErrorCode`].
//! Codes are part of the wire contract: they are never renumbered, and each
//! one has a fixed default description and a single outward HTTP status.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Detail code for a source that crashed outside its own error handling.
pub const UNHANDLED_INTERNAL_ERROR: &str = "UNHANDLED_INTERNAL_ERROR";
/// Detail code for a response that parsed as neither the payload nor an error envelope.
pub const UNABLE_TO_DESERIALIZE: &str = "UNABLE_TO_DESERIALIZE";
/// Detail code for a non-successful response without a body.
pub const EMPTY_RESPONSE: &str = "EMPTY_RESPONSE";
/// Detail code for an outbound call that exceeded its deadline.
pub const TRANSPORT_TIMEOUT: &str = "TRANSPORT_TIMEOUT";
/// Detail code for an outbound call that never produced a response.
pub const TRANSPORT_FAILURE: &str = "TRANSPORT_FAILURE";
/// Detail code for a call refused because the host's breaker is open.
pub const CIRCUIT_OPEN: &str = "CIRCUIT_OPEN";

/// Stable numeric error codes carried in `ErrorModel.code`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ErrorCode {
	InternalServerError = 1001,
	ServiceNotAvailable = 1002,
	InvalidRequest = 1003,
	InvalidSubject = 1004,
	InvalidEvidenceRequestParameter = 1005,
	NonExistentEvidenceCode = 1006,
	MissingAuthentication = 1007,
	AuthorizationFailed = 1008,
	RequiresConsent = 1009,
	AccreditationNotFound = 1010,
	EvidenceSourceTransient = 1011,
	EvidenceSourcePermanentClient = 1012,
	EvidenceSourcePermanentServer = 1013,
	AsyncEvidenceStillWaiting = 1014,
	AsyncEvidenceNotInitialized = 1015,
	InvalidAsyncAction = 1016,
}

impl ErrorCode {
	/// Every code, in numeric order.
	pub const ALL: [ErrorCode; 16] = [
		ErrorCode::InternalServerError,
		ErrorCode::ServiceNotAvailable,
		ErrorCode::InvalidRequest,
		ErrorCode::InvalidSubject,
		ErrorCode::InvalidEvidenceRequestParameter,
		ErrorCode::NonExistentEvidenceCode,
		ErrorCode::MissingAuthentication,
		ErrorCode::AuthorizationFailed,
		ErrorCode::RequiresConsent,
		ErrorCode::AccreditationNotFound,
		ErrorCode::EvidenceSourceTransient,
		ErrorCode::EvidenceSourcePermanentClient,
		ErrorCode::EvidenceSourcePermanentServer,
		ErrorCode::AsyncEvidenceStillWaiting,
		ErrorCode::AsyncEvidenceNotInitialized,
		ErrorCode::InvalidAsyncAction,
	];

	pub fn code(self) -> i32 {
		self as i32
	}

	pub fn from_code(code: i32) -> Option<Self> {
		Self::ALL.into_iter().find(|c| c.code() == code)
	}

	/// Default human-readable description for this code.
	pub fn default_description(self) -> &'static str {
		match self {
			ErrorCode::InternalServerError => "An internal error occurred",
			ErrorCode::ServiceNotAvailable => "The service is currently not available",
			ErrorCode::InvalidRequest => "The request was invalid",
			ErrorCode::InvalidSubject => "The supplied subject is invalid",
			ErrorCode::InvalidEvidenceRequestParameter => {
				"One or more evidence request parameters were invalid"
			}
			ErrorCode::NonExistentEvidenceCode => "The requested evidence code does not exist",
			ErrorCode::MissingAuthentication => "Authentication is required",
			ErrorCode::AuthorizationFailed => "The caller is not authorized for this request",
			ErrorCode::RequiresConsent => "The requested evidence requires consent",
			ErrorCode::AccreditationNotFound => "The accreditation was not found",
			ErrorCode::EvidenceSourceTransient => {
				"The evidence source is temporarily unavailable"
			}
			ErrorCode::EvidenceSourcePermanentClient => {
				"The evidence source rejected the request"
			}
			ErrorCode::EvidenceSourcePermanentServer => {
				"The evidence source failed to process the request"
			}
			ErrorCode::AsyncEvidenceStillWaiting => {
				"The evidence is not yet available, try again later"
			}
			ErrorCode::AsyncEvidenceNotInitialized => {
				"Asynchronous evidence retrieval has not been initialized"
			}
			ErrorCode::InvalidAsyncAction => "The asynchronous evidence action is not valid now",
		}
	}

	/// Outward HTTP status returned to the broker's own callers.
	///
	/// Adding a code without extending this match fails to compile.
	pub fn http_status(self) -> u16 {
		match self {
			ErrorCode::InternalServerError => 500,
			ErrorCode::ServiceNotAvailable => 503,
			ErrorCode::InvalidRequest => 400,
			ErrorCode::InvalidSubject => 400,
			ErrorCode::InvalidEvidenceRequestParameter => 400,
			ErrorCode::NonExistentEvidenceCode => 404,
			ErrorCode::MissingAuthentication => 401,
			ErrorCode::AuthorizationFailed => 403,
			ErrorCode::RequiresConsent => 403,
			ErrorCode::AccreditationNotFound => 404,
			ErrorCode::EvidenceSourceTransient => 503,
			ErrorCode::EvidenceSourcePermanentClient => 400,
			ErrorCode::EvidenceSourcePermanentServer => 502,
			ErrorCode::AsyncEvidenceStillWaiting => 503,
			ErrorCode::AsyncEvidenceNotInitialized => 400,
			ErrorCode::InvalidAsyncAction => 400,
		}
	}
}

impl fmt::Display for ErrorCode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{:?}({})", self, self.code())
	}
}

/// The three failure classes an evidence source may deliberately report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceErrorKind {
	/// Source temporarily overloaded or down; safe to retry later.
	Transient,
	/// The request itself is invalid for this source; never retry unmodified.
	PermanentClient,
	/// The source is misconfigured or buggy; do not retry.
	PermanentServer,
}

impl SourceErrorKind {
	pub fn error_code(self) -> ErrorCode {
		match self {
			SourceErrorKind::Transient => ErrorCode::EvidenceSourceTransient,
			SourceErrorKind::PermanentClient => ErrorCode::EvidenceSourcePermanentClient,
			SourceErrorKind::PermanentServer => ErrorCode::EvidenceSourcePermanentServer,
		}
	}

	/// Reconstructs the kind from a wire code. Anything that is not one of
	/// the two explicitly recoverable kinds is treated as a server fault.
	pub fn from_wire_code(code: i32) -> Self {
		match ErrorCode::from_code(code) {
			Some(ErrorCode::EvidenceSourceTransient) => SourceErrorKind::Transient,
			Some(ErrorCode::EvidenceSourcePermanentClient) => SourceErrorKind::PermanentClient,
			_ => SourceErrorKind::PermanentServer,
		}
	}

	/// HTTP status a source emits for this kind.
	pub fn source_status(self) -> u16 {
		match self {
			SourceErrorKind::Transient => 503,
			SourceErrorKind::PermanentClient => 400,
			SourceErrorKind::PermanentServer => 502,
		}
	}

	pub fn is_retryable(self) -> bool {
		matches!(self, SourceErrorKind::Transient)
	}
}

/// Inner cause carried across the wire as plain text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct InnerError {
	pub message: String,
	pub stack_trace: Option<String>,
}

impl InnerError {
	pub fn new(message: impl Into<String>) -> Self {
		Self {
			message: message.into(),
			stack_trace: None,
		}
	}

	pub fn with_stack_trace(mut self, stack_trace: impl Into<String>) -> Self {
		self.stack_trace = Some(stack_trace.into());
		self
	}

	/// Captures an error and its source chain.
	pub fn from_error(err: &(dyn std::error::Error + 'static)) -> Self {
		let mut chain = Vec::new();
		let mut current = err.source();
		while let Some(cause) = current {
			chain.push(cause.to_string());
			current = cause.source();
		}
		let inner = Self::new(err.to_string());
		if chain.is_empty() {
			inner
		} else {
			inner.with_stack_trace(chain.join("\n  caused by: "))
		}
	}
}

/// A classified failure reported by, or attributed to, an evidence source.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", self.description())]
pub struct EvidenceSourceError {
	kind: SourceErrorKind,
	message: Option<String>,
	detail_code: Option<String>,
	detail_source: Option<String>,
	#[source]
	inner: Option<InnerError>,
}

impl EvidenceSourceError {
	pub fn new(kind: SourceErrorKind) -> Self {
		Self {
			kind,
			message: None,
			detail_code: None,
			detail_source: None,
			inner: None,
		}
	}

	pub fn transient() -> Self {
		Self::new(SourceErrorKind::Transient)
	}

	pub fn permanent_client() -> Self {
		Self::new(SourceErrorKind::PermanentClient)
	}

	pub fn permanent_server() -> Self {
		Self::new(SourceErrorKind::PermanentServer)
	}

	/// Attaches custom text. A text that already repeats the default
	/// description is stored without that prefix.
	pub fn with_message(mut self, message: impl Into<String>) -> Self {
		let message = message.into();
		let stripped = strip_default_prefix(self.kind.error_code(), &message);
		self.message = (!stripped.is_empty()).then(|| stripped.to_string());
		self
	}

	pub fn with_detail_code(mut self, detail_code: impl Into<String>) -> Self {
		self.detail_code = Some(detail_code.into());
		self
	}

	pub fn with_detail_source(mut self, detail_source: impl Into<String>) -> Self {
		self.detail_source = Some(detail_source.into());
		self
	}

	pub fn with_inner(mut self, inner: InnerError) -> Self {
		self.inner = Some(inner);
		self
	}

	pub fn kind(&self) -> SourceErrorKind {
		self.kind
	}

	pub fn error_code(&self) -> ErrorCode {
		self.kind.error_code()
	}

	pub fn message(&self) -> Option<&str> {
		self.message.as_deref()
	}

	pub fn detail_code(&self) -> Option<&str> {
		self.detail_code.as_deref()
	}

	pub fn detail_source(&self) -> Option<&str> {
		self.detail_source.as_deref()
	}

	pub fn inner(&self) -> Option<&InnerError> {
		self.inner.as_ref()
	}

	/// Default description, suffixed with `": " + message` when present.
	pub fn description(&self) -> String {
		describe(self.error_code(), self.message.as_deref())
	}

	/// `"{source}-{code}"` when the source is known, otherwise the bare code.
	pub fn composed_detail_code(&self) -> Option<String> {
		compose_detail_code(self.detail_source.as_deref(), self.detail_code.as_deref())
	}
}

/// Default description for `code`, optionally suffixed with custom text.
pub fn describe(code: ErrorCode, message: Option<&str>) -> String {
	match message {
		Some(message) if !message.is_empty() => {
			format!("{}: {}", code.default_description(), message)
		}
		_ => code.default_description().to_string(),
	}
}

/// Removes a leading copy of the default description (and its `": "`
/// separator) from `text`.
pub fn strip_default_prefix(code: ErrorCode, text: &str) -> &str {
	let default = code.default_description();
	match text.strip_prefix(default) {
		Some(rest) => rest.trim_start_matches(':').trim_start(),
		None => text,
	}
}

pub fn compose_detail_code(source: Option<&str>, code: Option<&str>) -> Option<String> {
	match (source, code) {
		(Some(source), Some(code)) => Some(format!("{}-{}", source, code)),
		(None, Some(code)) => Some(code.to_string()),
		(_, None) => None,
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::collections::HashSet;

	#[test]
	fn test_codes_are_unique_and_round_trip() {
		let codes: HashSet<i32> = ErrorCode::ALL.iter().map(|c| c.code()).collect();
		assert_eq!(codes.len(), ErrorCode::ALL.len());

		for code in ErrorCode::ALL {
			assert_eq!(ErrorCode::from_code(code.code()), Some(code));
		}
		assert_eq!(ErrorCode::from_code(42), None);
	}

	#[test]
	fn test_every_code_has_an_outward_status() {
		for code in ErrorCode::ALL {
			let status = code.http_status();
			assert!((400..600).contains(&status), "{} -> {}", code, status);
			if code != ErrorCode::InternalServerError {
				assert_ne!(status, 500, "{} falls back to internal server error", code);
			}
			assert!(!code.default_description().is_empty());
		}
	}

	#[test]
	fn test_source_kinds_match_outward_statuses() {
		for kind in [
			SourceErrorKind::Transient,
			SourceErrorKind::PermanentClient,
			SourceErrorKind::PermanentServer,
		] {
			assert_eq!(kind.source_status(), kind.error_code().http_status());
			assert_eq!(SourceErrorKind::from_wire_code(kind.error_code().code()), kind);
		}
	}

	#[test]
	fn test_unknown_wire_code_is_permanent_server() {
		assert_eq!(
			SourceErrorKind::from_wire_code(ErrorCode::InvalidSubject.code()),
			SourceErrorKind::PermanentServer
		);
		assert_eq!(
			SourceErrorKind::from_wire_code(-7),
			SourceErrorKind::PermanentServer
		);
	}

	#[test]
	fn test_description_with_and_without_message() {
		let plain = EvidenceSourceError::transient();
		assert_eq!(
			plain.description(),
			"The evidence source is temporarily unavailable"
		);

		let custom = EvidenceSourceError::transient().with_message("upstream register is down");
		assert_eq!(
			custom.to_string(),
			"The evidence source is temporarily unavailable: upstream register is down"
		);
		assert_eq!(custom.message(), Some("upstream register is down"));
	}

	#[test]
	fn test_message_strips_duplicated_default() {
		let err = EvidenceSourceError::permanent_client()
			.with_message("The evidence source rejected the request: bad org number");
		assert_eq!(err.message(), Some("bad org number"));
		assert_eq!(
			err.description(),
			"The evidence source rejected the request: bad org number"
		);

		let only_default = EvidenceSourceError::permanent_client()
			.with_message("The evidence source rejected the request");
		assert_eq!(only_default.message(), None);
	}

	#[test]
	fn test_composed_detail_code() {
		let err = EvidenceSourceError::permanent_server()
			.with_detail_code("42")
			.with_detail_source("REGISTRY");
		assert_eq!(err.composed_detail_code().as_deref(), Some("REGISTRY-42"));

		let unattributed = EvidenceSourceError::permanent_server().with_detail_code("42");
		assert_eq!(unattributed.composed_detail_code().as_deref(), Some("42"));

		assert_eq!(EvidenceSourceError::transient().composed_detail_code(), None);
	}

	#[test]
	fn test_inner_error_keeps_source_chain() {
		let io = std::io::Error::new(std::io::ErrorKind::Other, "disk on fire");
		let wrapped = EvidenceSourceError::permanent_server()
			.with_inner(InnerError::new("lookup failed").with_stack_trace("at lookup"));
		let source = std::error::Error::source(&wrapped).map(|s| s.to_string());
		assert_eq!(source.as_deref(), Some("lookup failed"));

		let captured = InnerError::from_error(&io);
		assert_eq!(captured.message, "disk on fire");
		assert_eq!(captured.stack_trace, None);
	}
}
