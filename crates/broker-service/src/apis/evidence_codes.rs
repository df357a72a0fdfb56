//! Lists the evidence codes the broker can harvest.

use crate::api::AppState;
use axum::{extract::State, response::Json};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceCodeInfo {
	pub evidence_code: String,
	pub source: String,
}

pub async fn list_evidence_codes(State(state): State<AppState>) -> Json<Vec<EvidenceCodeInfo>> {
	let codes = state
		.broker
		.registry()
		.endpoints()
		.map(|endpoint| EvidenceCodeInfo {
			evidence_code: endpoint.evidence_code.clone(),
			source: endpoint.source_name.to_ascii_uppercase(),
		})
		.collect();
	Json(codes)
}
