//! Hosting runtime for evidence sources.
//!
//! The host installs the generic fault handler: a panic anywhere in a
//! handler is answered with status 500 and a [`CrashEnvelope`].

use axum::{
	http::{HeaderValue, StatusCode},
	response::{IntoResponse, Json, Response},
	Router,
};
use broker_types::{CrashEnvelope, INVOCATION_ID_HEADER};
use std::any::Any;
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};
use tracing::error;
use uuid::Uuid;

/// Wraps source routes with the host's fault handler and request tracing.
pub fn source_host(routes: Router) -> Router {
	routes
		.layer(CatchPanicLayer::custom(crash_response))
		.layer(TraceLayer::new_for_http())
}

/// Generic fault response for an unhandled panic.
pub fn crash_response(panic: Box<dyn Any + Send + 'static>) -> Response {
	let detail = panic_message(panic.as_ref());
	let trace_id = Uuid::new_v4().to_string();
	error!(trace_id = %trace_id, "Unhandled fault in evidence handler: {}", detail);

	let envelope = CrashEnvelope::new(detail).with_trace_id(&trace_id);
	let mut response = (StatusCode::INTERNAL_SERVER_ERROR, Json(envelope)).into_response();
	if let Ok(value) = HeaderValue::from_str(&trace_id) {
		response.headers_mut().insert(INVOCATION_ID_HEADER, value);
	}
	response
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
	if let Some(message) = panic.downcast_ref::<String>() {
		message.clone()
	} else if let Some(message) = panic.downcast_ref::<&str>() {
		(*message).to_string()
	} else {
		"Unhandled exception".to_string()
	}
}
