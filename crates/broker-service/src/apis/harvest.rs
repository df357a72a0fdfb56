//! Evidence harvesting endpoints.
//!
//! `POST /evidence/harvest` fetches evidence in one call. Sources that need
//! time are driven through `POST /evidence/async/{action}` where the action
//! is one of `initialize`, `status`, `harvest` or `cancel`.

use crate::api::AppState;
use crate::errors::{ApiError, ErrorResponse};
use axum::{
	extract::{rejection::JsonRejection, Path, State},
	http::StatusCode,
	response::{IntoResponse, Json, Response},
};
use broker_types::{AsyncEvidencePhase, EvidenceHarvesterRequest, EvidenceParameter};
use serde::Deserialize;
use serde_json::Value;
use tracing::instrument;

/// Body accepted by both harvesting endpoints.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceRequestBody {
	#[serde(default)]
	pub requestor: String,
	#[serde(default)]
	pub subject: String,
	#[serde(default)]
	pub evidence_code: String,
	#[serde(default)]
	pub parameters: Vec<EvidenceParameter>,
	#[serde(default)]
	pub accreditation_id: Option<String>,
}

impl EvidenceRequestBody {
	/// Validates the body and builds the envelope sent to the source.
	pub fn into_envelope(self) -> Result<EvidenceHarvesterRequest, ApiError> {
		if self.requestor.trim().is_empty() {
			return Err(ApiError::InvalidRequest("requestor is required".to_string()));
		}
		if self.evidence_code.trim().is_empty() {
			return Err(ApiError::InvalidRequest(
				"evidenceCode is required".to_string(),
			));
		}
		if self.subject.trim().is_empty() {
			return Err(ApiError::InvalidSubject("subject is required".to_string()));
		}
		if let Some(unnamed) = self
			.parameters
			.iter()
			.position(|p| p.evidence_param_name.trim().is_empty())
		{
			return Err(ApiError::InvalidParameter(format!(
				"parameter {} has no name",
				unnamed
			)));
		}

		let mut envelope =
			EvidenceHarvesterRequest::new(self.requestor, self.subject, self.evidence_code)
				.with_parameters(self.parameters);
		envelope.accreditation_id = self.accreditation_id;
		Ok(envelope)
	}
}

#[instrument(skip_all)]
pub async fn harvest(
	State(state): State<AppState>,
	payload: Result<Json<EvidenceRequestBody>, JsonRejection>,
) -> Result<Json<Value>, ErrorResponse> {
	let request = prepare(&state, payload).await?;
	let evidence = state
		.broker
		.harvest::<Value>(&request)
		.await
		.map_err(|e| state.reject(e))?;
	Ok(Json(evidence))
}

#[instrument(skip_all)]
pub async fn async_action(
	State(state): State<AppState>,
	Path(action): Path<String>,
	payload: Result<Json<EvidenceRequestBody>, JsonRejection>,
) -> Result<Response, ErrorResponse> {
	let phase: AsyncEvidencePhase = action
		.parse()
		.map_err(|e: String| state.reject(ApiError::InvalidAsyncAction(e)))?;
	let request = prepare(&state, payload).await?.with_phase(phase);
	let broker = &state.broker;

	let response = match phase {
		AsyncEvidencePhase::Initialize => broker
			.initialize(&request)
			.await
			.map(|()| StatusCode::ACCEPTED.into_response()),
		AsyncEvidencePhase::CheckStatus => broker
			.check_status(&request)
			.await
			.map(|status| Json(status).into_response()),
		AsyncEvidencePhase::Harvest => broker
			.harvest_async::<Value>(&request)
			.await
			.map(|evidence| Json(evidence).into_response()),
		AsyncEvidencePhase::Cancel => broker
			.cancel(&request)
			.await
			.map(|()| StatusCode::NO_CONTENT.into_response()),
	};
	response.map_err(|e| state.reject(e))
}

/// Validation shared by every harvesting endpoint. Checks run cheapest
/// first: shape, evidence code, then the policy collaborator.
async fn prepare(
	state: &AppState,
	payload: Result<Json<EvidenceRequestBody>, JsonRejection>,
) -> Result<EvidenceHarvesterRequest, ErrorResponse> {
	let Json(body) = payload.map_err(|e| state.reject(ApiError::InvalidRequest(e.body_text())))?;
	let request = body.into_envelope().map_err(|e| state.reject(e))?;
	state
		.broker
		.endpoint(&request.evidence_code_name)
		.map_err(|e| state.reject(e))?;
	state
		.policy
		.authorize(&request)
		.await
		.map_err(|e| state.reject(e))?;
	Ok(request)
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	fn body(value: Value) -> EvidenceRequestBody {
		serde_json::from_value(value).unwrap()
	}

	#[test]
	fn test_valid_body() {
		let envelope = body(json!({
			"requestor": "910000001",
			"subject": "910000002",
			"evidenceCode": "Roles",
			"parameters": [{ "evidenceParamName": "year", "value": 2024 }],
			"accreditationId": "acc-1"
		}))
		.into_envelope()
		.unwrap();

		assert_eq!(envelope.evidence_code_name, "Roles");
		assert_eq!(envelope.parameter("YEAR"), Some(&json!(2024)));
		assert_eq!(envelope.accreditation_id.as_deref(), Some("acc-1"));
		assert_eq!(envelope.phase(), AsyncEvidencePhase::Harvest);
	}

	#[test]
	fn test_validation_codes() {
		let missing_requestor = body(json!({ "subject": "s", "evidenceCode": "Roles" }));
		assert!(matches!(
			missing_requestor.into_envelope(),
			Err(ApiError::InvalidRequest(_))
		));

		let missing_subject = body(json!({ "requestor": "r", "evidenceCode": "Roles" }));
		assert!(matches!(
			missing_subject.into_envelope(),
			Err(ApiError::InvalidSubject(_))
		));

		let unnamed = body(json!({
			"requestor": "r",
			"subject": "s",
			"evidenceCode": "Roles",
			"parameters": [{ "evidenceParamName": " ", "value": 1 }]
		}));
		assert!(matches!(
			unnamed.into_envelope(),
			Err(ApiError::InvalidParameter(_))
		));
	}
}
