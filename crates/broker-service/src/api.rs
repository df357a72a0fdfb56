//! HTTP API server for broker callers.

use crate::apis::{evidence_codes, harvest};
use crate::errors::{ApiError, ErrorResponse};
use crate::policy::RequestPolicy;
use axum::{
	extract::State,
	response::Json,
	routing::{get, post},
	Router,
};
use broker_core::EvidenceBroker;
use broker_types::DebugFields;
use std::future::Future;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

/// Shared application state for the API server.
#[derive(Clone)]
pub struct AppState {
	pub broker: Arc<EvidenceBroker>,
	pub policy: Arc<dyn RequestPolicy>,
	/// Whether error envelopes may carry stack traces and inner messages
	pub debug: DebugFields,
	pub name: String,
}

impl AppState {
	pub fn reject(&self, err: impl Into<ApiError>) -> ErrorResponse {
		err.into().with_debug(self.debug)
	}
}

pub fn router(state: AppState) -> Router {
	Router::new()
		.route("/health", get(health_check))
		.route("/evidencecodes", get(evidence_codes::list_evidence_codes))
		.route("/evidence/harvest", post(harvest::harvest))
		.route("/evidence/async/{action}", post(harvest::async_action))
		.with_state(state)
		.layer(TraceLayer::new_for_http())
		.layer(CorsLayer::permissive())
}

/// Serves the API until `shutdown` resolves.
pub async fn start_http_server(
	state: AppState,
	port: u16,
	shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
	let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
	info!("API server listening on port {}", port);

	axum::serve(listener, router(state))
		.with_graceful_shutdown(shutdown)
		.await?;

	Ok(())
}

async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
	Json(serde_json::json!({
		"status": "ok",
		"name": state.name,
		"evidenceCodes": state.broker.registry().len(),
		"timestamp": chrono::Utc::now().timestamp()
	}))
}
