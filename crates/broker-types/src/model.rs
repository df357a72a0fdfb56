//! Wire envelopes for failed calls.

use crate::errors::{describe, strip_default_prefix, ErrorCode, EvidenceSourceError, InnerError};
use serde::{Deserialize, Serialize};

/// Status a hosting runtime uses for faults nobody handled.
pub const GENERIC_FAULT_STATUS: u16 = 500;

/// Header carrying the id the answering host assigned to an invocation.
/// Mirrors `ErrorModel::invocation_id`.
pub const INVOCATION_ID_HEADER: &str = "x-invocation-id";

/// Error envelope emitted by evidence sources and by the broker itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorModel {
	/// Stable [`ErrorCode`] value.
	pub code: i32,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub detail_code: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub description: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub detail_description: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub stacktrace: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub inner_exception_message: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub inner_exception_stack_trace: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub invocation_id: Option<String>,
}

/// Whether debug-only fields may be written into an [`ErrorModel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugFields {
	Include,
	Omit,
}

impl DebugFields {
	pub fn included(self) -> bool {
		matches!(self, DebugFields::Include)
	}
}

impl ErrorModel {
	pub fn new(code: ErrorCode) -> Self {
		Self {
			code: code.code(),
			detail_code: None,
			description: Some(code.default_description().to_string()),
			detail_description: None,
			stacktrace: None,
			inner_exception_message: None,
			inner_exception_stack_trace: None,
			invocation_id: None,
		}
	}

	/// Envelope a source emits for one of its own classified failures.
	///
	/// Only the source-private detail code goes on the wire; attribution is
	/// added by whoever receives it.
	pub fn from_source_error(err: &EvidenceSourceError, debug: DebugFields) -> Self {
		let mut model = Self::new(err.error_code());
		model.detail_code = err.detail_code().map(str::to_string);
		model.description = Some(err.description());
		model.detail_description = err.message().map(str::to_string);
		if debug.included() {
			model.stacktrace = Some(format!("{:?}", err));
			if let Some(inner) = err.inner() {
				model.inner_exception_message = Some(inner.message.clone());
				model.inner_exception_stack_trace = inner.stack_trace.clone();
			}
		}
		model
	}

	pub fn with_detail_code(mut self, detail_code: Option<String>) -> Self {
		self.detail_code = detail_code;
		self
	}

	pub fn with_message(mut self, message: Option<&str>) -> Self {
		if let Some(code) = self.error_code() {
			self.description = Some(describe(code, message));
		}
		self.detail_description = message.map(str::to_string);
		self
	}

	pub fn with_invocation_id(mut self, invocation_id: impl Into<String>) -> Self {
		self.invocation_id = Some(invocation_id.into());
		self
	}

	pub fn error_code(&self) -> Option<ErrorCode> {
		ErrorCode::from_code(self.code)
	}

	/// Plugin-supplied text: the detail description, or failing that the
	/// description minus its default prefix.
	pub fn custom_message(&self) -> Option<String> {
		if let Some(detail) = self.detail_description.as_deref().filter(|d| !d.is_empty()) {
			return Some(detail.to_string());
		}
		let description = self.description.as_deref()?;
		let stripped = match self.error_code() {
			Some(code) => strip_default_prefix(code, description),
			None => description,
		};
		(!stripped.is_empty()).then(|| stripped.to_string())
	}

	/// Inner cause carried by the envelope, if any.
	pub fn inner(&self) -> Option<InnerError> {
		let message = self.inner_exception_message.clone()?;
		let inner = InnerError::new(message);
		Some(match self.inner_exception_stack_trace.clone() {
			Some(trace) => inner.with_stack_trace(trace),
			None => inner,
		})
	}
}

/// Envelope a hosting runtime writes when a handler fails outside its own
/// error handling. Deliberately shaped differently from [`ErrorModel`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrashEnvelope {
	#[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
	pub problem_type: Option<String>,
	pub title: String,
	pub status: u16,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub detail: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub trace_id: Option<String>,
}

impl CrashEnvelope {
	pub fn new(detail: impl Into<String>) -> Self {
		Self {
			problem_type: Some("https://tools.ietf.org/html/rfc7231#section-6.6.1".to_string()),
			title: "Internal Server Error".to_string(),
			status: GENERIC_FAULT_STATUS,
			detail: Some(detail.into()),
			trace_id: None,
		}
	}

	pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
		self.trace_id = Some(trace_id.into());
		self
	}

	/// Best available description of the crash.
	pub fn message(&self) -> &str {
		self.detail.as_deref().unwrap_or(&self.title)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn test_model_from_source_error_without_debug() {
		let err = EvidenceSourceError::transient()
			.with_message("register offline")
			.with_detail_code("17")
			.with_detail_source("REGISTRY")
			.with_inner(InnerError::new("connection reset"));

		let model = ErrorModel::from_source_error(&err, DebugFields::Omit);
		assert_eq!(model.code, ErrorCode::EvidenceSourceTransient.code());
		assert_eq!(model.detail_code.as_deref(), Some("17"));
		assert_eq!(
			model.description.as_deref(),
			Some("The evidence source is temporarily unavailable: register offline")
		);
		assert_eq!(model.detail_description.as_deref(), Some("register offline"));
		assert!(model.stacktrace.is_none());
		assert!(model.inner_exception_message.is_none());

		let value = serde_json::to_value(&model).unwrap();
		assert!(value.get("stacktrace").is_none());
		assert_eq!(value["detailCode"], json!("17"));
	}

	#[test]
	fn test_model_from_source_error_with_debug() {
		let err = EvidenceSourceError::permanent_server()
			.with_inner(InnerError::new("null reference").with_stack_trace("at compute"));
		let model = ErrorModel::from_source_error(&err, DebugFields::Include);
		assert!(model.stacktrace.is_some());
		assert_eq!(model.inner_exception_message.as_deref(), Some("null reference"));
		assert_eq!(model.inner_exception_stack_trace.as_deref(), Some("at compute"));
		assert_eq!(model.inner(), err.inner().cloned());
	}

	#[test]
	fn test_custom_message_falls_back_to_stripped_description() {
		let model: ErrorModel = serde_json::from_value(json!({
			"code": 1012,
			"description": "The evidence source rejected the request: unknown subject"
		}))
		.unwrap();
		assert_eq!(model.custom_message().as_deref(), Some("unknown subject"));

		let bare: ErrorModel = serde_json::from_value(json!({
			"code": 1012,
			"description": "The evidence source rejected the request"
		}))
		.unwrap();
		assert_eq!(bare.custom_message(), None);
	}

	#[test]
	fn test_model_requires_code() {
		let parsed = serde_json::from_value::<ErrorModel>(json!({ "description": "oops" }));
		assert!(parsed.is_err());
	}

	#[test]
	fn test_crash_envelope_is_not_an_error_model() {
		let crash = serde_json::to_value(CrashEnvelope::new("boom")).unwrap();
		assert!(serde_json::from_value::<ErrorModel>(crash.clone()).is_err());
		assert_eq!(crash["status"], json!(500));

		let model = serde_json::to_value(ErrorModel::new(ErrorCode::InvalidRequest)).unwrap();
		assert!(serde_json::from_value::<CrashEnvelope>(model).is_err());
	}
}
