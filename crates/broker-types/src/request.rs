//! Request envelope sent from the broker to an evidence source, and the
//! asynchronous evidence tags that travel with it.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Phase of an asynchronous evidence retrieval.
///
/// A source without asynchronous support ignores the tag and always behaves
/// as [`AsyncEvidencePhase::Harvest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AsyncEvidencePhase {
	Initialize,
	CheckStatus,
	Harvest,
	Cancel,
}

impl AsyncEvidencePhase {
	/// Whether an external retry layer may replay this phase.
	pub fn is_replay_safe(self) -> bool {
		!matches!(self, AsyncEvidencePhase::Initialize)
	}
}

impl fmt::Display for AsyncEvidencePhase {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			AsyncEvidencePhase::Initialize => "initialize",
			AsyncEvidencePhase::CheckStatus => "status",
			AsyncEvidencePhase::Harvest => "harvest",
			AsyncEvidencePhase::Cancel => "cancel",
		};
		f.write_str(name)
	}
}

impl std::str::FromStr for AsyncEvidencePhase {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_ascii_lowercase().as_str() {
			"initialize" => Ok(AsyncEvidencePhase::Initialize),
			"status" | "checkstatus" => Ok(AsyncEvidencePhase::CheckStatus),
			"harvest" => Ok(AsyncEvidencePhase::Harvest),
			"cancel" => Ok(AsyncEvidencePhase::Cancel),
			other => Err(format!("Unknown async evidence action: {}", other)),
		}
	}
}

/// Named parameter forwarded verbatim to the evidence source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceParameter {
	pub evidence_param_name: String,
	#[serde(default)]
	pub value: serde_json::Value,
}

/// Request envelope posted to an evidence source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceHarvesterRequest {
	pub requestor: String,
	pub subject: String,
	pub evidence_code_name: String,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub parameters: Vec<EvidenceParameter>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub accreditation_id: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub async_evidence_code_action: Option<AsyncEvidencePhase>,
}

impl EvidenceHarvesterRequest {
	pub fn new(
		requestor: impl Into<String>,
		subject: impl Into<String>,
		evidence_code_name: impl Into<String>,
	) -> Self {
		Self {
			requestor: requestor.into(),
			subject: subject.into(),
			evidence_code_name: evidence_code_name.into(),
			parameters: Vec::new(),
			accreditation_id: None,
			async_evidence_code_action: None,
		}
	}

	pub fn with_parameters(mut self, parameters: Vec<EvidenceParameter>) -> Self {
		self.parameters = parameters;
		self
	}

	pub fn with_phase(mut self, phase: AsyncEvidencePhase) -> Self {
		self.async_evidence_code_action = Some(phase);
		self
	}

	/// Effective phase; untagged requests are plain harvests.
	pub fn phase(&self) -> AsyncEvidencePhase {
		self.async_evidence_code_action
			.unwrap_or(AsyncEvidencePhase::Harvest)
	}

	pub fn parameter(&self, name: &str) -> Option<&serde_json::Value> {
		self.parameters
			.iter()
			.find(|p| p.evidence_param_name.eq_ignore_ascii_case(name))
			.map(|p| &p.value)
	}
}

/// Progress reported by a `CheckStatus` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AsyncEvidenceStatus {
	/// Still computing. A normal result, not a failure.
	#[default]
	Pending,
	Available,
}

/// Body of a successful `CheckStatus` call. An empty 2xx body reads as
/// [`AsyncEvidenceStatus::Pending`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AsyncStatusResponse {
	pub status: AsyncEvidenceStatus,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub retry_after_seconds: Option<u64>,
}

impl AsyncStatusResponse {
	pub fn pending(retry_after_seconds: Option<u64>) -> Self {
		Self {
			status: AsyncEvidenceStatus::Pending,
			retry_after_seconds,
		}
	}

	pub fn available() -> Self {
		Self {
			status: AsyncEvidenceStatus::Available,
			retry_after_seconds: None,
		}
	}

	pub fn is_still_waiting(&self) -> bool {
		self.status == AsyncEvidenceStatus::Pending
	}
}
