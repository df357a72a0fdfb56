//! Evidence source responses produced by `broker-source` and decoded by the
//! broker executor, end to end.

use async_trait::async_trait;
use axum::{
	body::{to_bytes, Body},
	http::Request,
	response::{IntoResponse, Response},
	routing::post,
	Json, Router,
};
use broker_config::TransportConfig;
use broker_core::{
	AsyncEvidenceWorkflow, BreakerObserver, HttpTransport, MemoryStateStore, ProvenanceResolver,
	RequestExecutor, SourceEndpoint, SourceRequest, SourceResponse, SourceTransport,
	TransportError,
};
use broker_source::{source_host, SourceResponder};
use broker_types::{
	AsyncEvidencePhase, AsyncStatusResponse, EvidenceHarvesterRequest, EvidenceSourceError,
	SourceErrorKind, UNHANDLED_INTERNAL_ERROR,
};
use reqwest::{Method, Url};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::ServiceExt;
use wiremock::matchers::{body_partial_json, method};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UnitInfo {
	organization_number: String,
	employees: u32,
}

const TEMPLATE: &str = "http://{X}.local/api/evidencecodes";

async fn unit_info() -> Response {
	SourceResponder::development()
		.respond(async {
			Ok::<_, EvidenceSourceError>(UnitInfo {
				organization_number: "910000002".to_string(),
				employees: 12,
			})
		})
		.await
}

async fn fails_with(kind: SourceErrorKind) -> Response {
	SourceResponder::production()
		.respond(async move {
			Err::<UnitInfo, _>(
				EvidenceSourceError::new(kind)
					.with_message("lookup failed")
					.with_detail_code("E7"),
			)
		})
		.await
}

async fn crashes() -> Response {
	let employees: Vec<u32> = Vec::new();
	let first = employees[0];
	Json(first).into_response()
}

/// Async source that is still working on every status check.
async fn slow_source(Json(envelope): Json<EvidenceHarvesterRequest>) -> Response {
	let responder = SourceResponder::production();
	match envelope.phase() {
		AsyncEvidencePhase::Initialize | AsyncEvidencePhase::Cancel => {
			responder.respond_accepted(async { Ok(()) }).await
		}
		AsyncEvidencePhase::CheckStatus => {
			responder
				.respond(async { Ok(AsyncStatusResponse::pending(Some(1))) })
				.await
		}
		AsyncEvidencePhase::Harvest => {
			responder
				.respond(async {
					Err::<UnitInfo, _>(EvidenceSourceError::permanent_client().with_detail_code("NOT_READY"))
				})
				.await
		}
	}
}

fn source_app() -> Router {
	source_host(
		Router::new()
			.route("/api/evidencecodes/UnitInfo", post(unit_info))
			.route(
				"/api/evidencecodes/Transient",
				post(|| fails_with(SourceErrorKind::Transient)),
			)
			.route(
				"/api/evidencecodes/Client",
				post(|| fails_with(SourceErrorKind::PermanentClient)),
			)
			.route(
				"/api/evidencecodes/Server",
				post(|| fails_with(SourceErrorKind::PermanentServer)),
			)
			.route("/api/evidencecodes/Crash", post(crashes))
			.route("/api/evidencecodes/Slow", post(slow_source)),
	)
}

/// Calls the source router in-process.
struct RouterTransport {
	router: Router,
	calls: AtomicUsize,
}

impl RouterTransport {
	fn new() -> Arc<Self> {
		Arc::new(Self {
			router: source_app(),
			calls: AtomicUsize::new(0),
		})
	}
}

#[async_trait]
impl SourceTransport for RouterTransport {
	async fn send(&self, request: SourceRequest) -> Result<SourceResponse, TransportError> {
		self.calls.fetch_add(1, Ordering::SeqCst);
		let http_request = Request::builder()
			.method(request.method.clone())
			.uri(request.url.path())
			.header("content-type", "application/json")
			.body(Body::from(request.body.clone().unwrap_or_default()))
			.map_err(|e| TransportError::Client(e.to_string()))?;

		let response = self.router.clone().oneshot(http_request).await.unwrap();
		let status = response.status();
		let body = to_bytes(response.into_body(), usize::MAX)
			.await
			.map_err(|e| TransportError::Client(e.to_string()))?;
		Ok(SourceResponse::new(status, body))
	}
}

fn executor() -> RequestExecutor {
	RequestExecutor::new(ProvenanceResolver::new(TEMPLATE, "{X}").unwrap())
}

fn evidence_request(code: &str) -> SourceRequest {
	let url = Url::parse(&format!("http://registry.local/api/evidencecodes/{}", code)).unwrap();
	SourceRequest::evidence(url, &EvidenceHarvesterRequest::new("910000001", "910000002", code))
		.unwrap()
}

async fn harvest(code: &str) -> Result<UnitInfo, EvidenceSourceError> {
	let transport = RouterTransport::new();
	executor()
		.execute(evidence_request(code), |r| async move { transport.send(r).await })
		.await
}

#[tokio::test]
async fn test_success_round_trips() {
	let unit = harvest("UnitInfo").await.unwrap();
	assert_eq!(unit.employees, 12);
}

#[tokio::test]
async fn test_classified_errors_round_trip() {
	for (code, kind) in [
		("Transient", SourceErrorKind::Transient),
		("Client", SourceErrorKind::PermanentClient),
		("Server", SourceErrorKind::PermanentServer),
	] {
		let err = harvest(code).await.unwrap_err();
		assert_eq!(err.kind(), kind);
		assert_eq!(err.detail_code(), Some("E7"));
		assert_eq!(err.message(), Some("lookup failed"));
		assert_eq!(err.detail_source(), Some("REGISTRY"));
		assert_eq!(err.composed_detail_code().as_deref(), Some("REGISTRY-E7"));
	}
}

#[tokio::test]
async fn test_crash_is_told_apart_from_classified_failure() {
	let err = harvest("Crash").await.unwrap_err();
	assert_eq!(err.kind(), SourceErrorKind::PermanentServer);
	assert_eq!(err.detail_code(), Some(UNHANDLED_INTERNAL_ERROR));
	assert!(err.inner().unwrap().message.contains("index out of bounds"));
}

#[tokio::test]
async fn test_unknown_route_is_not_a_false_success() {
	let err = harvest("Missing").await.unwrap_err();
	assert_eq!(err.kind(), SourceErrorKind::PermanentServer);
	assert_eq!(err.detail_code(), Some(broker_types::EMPTY_RESPONSE));
}

#[tokio::test]
async fn test_async_workflow_against_source_host() {
	let transport = RouterTransport::new();
	let workflow = AsyncEvidenceWorkflow::new(
		executor(),
		transport.clone(),
		Arc::new(MemoryStateStore::new()),
		Duration::from_secs(60),
	);
	let endpoint = SourceEndpoint {
		source_name: "registry".to_string(),
		evidence_code: "Slow".to_string(),
		url: Url::parse("http://registry.local/api/evidencecodes/Slow").unwrap(),
	};
	let request = EvidenceHarvesterRequest::new("910000001", "910000002", "Slow");

	workflow.initialize(&endpoint, &request).await.unwrap();
	for _ in 0..3 {
		let status = workflow.check_status(&endpoint, &request).await.unwrap();
		assert!(status.is_still_waiting());
		assert_eq!(status.retry_after_seconds, Some(1));
	}
	// One Initialize, one status call; the rest were served from cache.
	assert_eq!(transport.calls.load(Ordering::SeqCst), 2);

	workflow.cancel(&endpoint, &request).await.unwrap();
	assert_eq!(transport.calls.load(Ordering::SeqCst), 3);
}

#[derive(Default)]
struct RecordingObserver {
	successes: Mutex<u32>,
	failures: Mutex<u32>,
}

impl BreakerObserver for RecordingObserver {
	fn record_success(&self, _host: &str) {
		*self.successes.lock().unwrap() += 1;
	}

	fn record_failure(&self, _host: &str) {
		*self.failures.lock().unwrap() += 1;
	}
}

#[tokio::test]
async fn test_still_waiting_never_trips_the_breaker() {
	let server = MockServer::start().await;
	Mock::given(method("POST"))
		.and(body_partial_json(
			serde_json::json!({ "asyncEvidenceCodeAction": "Initialize" }),
		))
		.respond_with(ResponseTemplate::new(202))
		.expect(1)
		.mount(&server)
		.await;
	Mock::given(method("POST"))
		.and(body_partial_json(
			serde_json::json!({ "asyncEvidenceCodeAction": "CheckStatus" }),
		))
		.respond_with(ResponseTemplate::new(200).set_body_json(AsyncStatusResponse::pending(None)))
		.expect(1)
		.mount(&server)
		.await;

	let observer = Arc::new(RecordingObserver::default());
	let transport = HttpTransport::new(&TransportConfig::default())
		.unwrap()
		.with_observer(observer.clone());
	let workflow = AsyncEvidenceWorkflow::new(
		executor(),
		Arc::new(transport),
		Arc::new(MemoryStateStore::new()),
		Duration::from_secs(60),
	);
	let endpoint = SourceEndpoint {
		source_name: "registry".to_string(),
		evidence_code: "Slow".to_string(),
		url: Url::parse(&format!("{}/api/evidencecodes/Slow", server.uri())).unwrap(),
	};
	let request = EvidenceHarvesterRequest::new("910000001", "910000002", "Slow");

	workflow.initialize(&endpoint, &request).await.unwrap();
	for _ in 0..4 {
		assert!(workflow
			.check_status(&endpoint, &request)
			.await
			.unwrap()
			.is_still_waiting());
	}

	assert_eq!(*observer.failures.lock().unwrap(), 0);
	assert_eq!(*observer.successes.lock().unwrap(), 2);
}

#[tokio::test]
async fn test_classified_error_status_counts_as_breaker_success() {
	let server = MockServer::start().await;
	Mock::given(method("POST"))
		.respond_with(
			ResponseTemplate::new(502).set_body_json(serde_json::json!({ "code": 1013 })),
		)
		.mount(&server)
		.await;

	let observer = Arc::new(RecordingObserver::default());
	let transport = HttpTransport::new(&TransportConfig::default())
		.unwrap()
		.with_observer(observer.clone());
	let mut request = SourceRequest::new(
		Method::POST,
		Url::parse(&format!("{}/api/evidencecodes/Roles", server.uri())).unwrap(),
	);
	request.body = Some(bytes_of(&EvidenceHarvesterRequest::new("a", "b", "Roles")));

	let err = executor()
		.execute::<UnitInfo, _, _>(request, |r| transport.send(r))
		.await
		.unwrap_err();
	assert_eq!(err.kind(), SourceErrorKind::PermanentServer);
	assert_eq!(*observer.failures.lock().unwrap(), 0);
}

fn bytes_of<T: Serialize>(value: &T) -> bytes::Bytes {
	bytes::Bytes::from(serde_json::to_vec(value).unwrap())
}
