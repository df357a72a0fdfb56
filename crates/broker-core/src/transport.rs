//! Outbound HTTP to evidence sources.
//!
//! The transport owns deadlines and reports per-host outcomes to a
//! [`BreakerObserver`]. It never retries and never interprets bodies; that
//! is the executor's job.

use async_trait::async_trait;
use broker_config::TransportConfig;
use broker_types::EvidenceHarvesterRequest;
use bytes::Bytes;
use reqwest::{header, Method, StatusCode, Url};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument, warn};

/// Statuses that carry a body the executor must read, and which therefore
/// must never count as transport failures.
pub const NON_FATAL_STATUSES: [StatusCode; 4] = [
	StatusCode::BAD_REQUEST,
	StatusCode::INTERNAL_SERVER_ERROR,
	StatusCode::BAD_GATEWAY,
	StatusCode::SERVICE_UNAVAILABLE,
];

#[derive(Debug, Error)]
pub enum TransportError {
	#[error("Request to {host} timed out after {timeout_ms}ms")]
	Timeout { host: String, timeout_ms: u64 },

	#[error("Request to {host} failed: {message}")]
	Connection { host: String, message: String },

	#[error("Circuit for {host} is open")]
	CircuitOpen { host: String },

	#[error("Failed to build HTTP client: {0}")]
	Client(String),
}

/// Per-request transport settings.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
	non_fatal: Vec<StatusCode>,
	/// Whether an external retry layer may send this request again.
	pub replay_safe: bool,
	/// Overrides the transport's default deadline.
	pub timeout: Option<Duration>,
}

impl RequestOptions {
	pub fn allow_statuses(&mut self, statuses: &[StatusCode]) {
		for status in statuses {
			if !self.non_fatal.contains(status) {
				self.non_fatal.push(*status);
			}
		}
	}

	pub fn is_non_fatal(&self, status: StatusCode) -> bool {
		self.non_fatal.contains(&status)
	}
}

/// A prepared call to one evidence source endpoint.
#[derive(Debug, Clone)]
pub struct SourceRequest {
	pub method: Method,
	pub url: Url,
	pub body: Option<Bytes>,
	pub options: RequestOptions,
}

impl SourceRequest {
	pub fn new(method: Method, url: Url) -> Self {
		Self {
			method,
			url,
			body: None,
			options: RequestOptions::default(),
		}
	}

	/// POSTs the request envelope. Replay safety follows the envelope's phase.
	pub fn evidence(url: Url, envelope: &EvidenceHarvesterRequest) -> Result<Self, serde_json::Error> {
		let body = serde_json::to_vec(envelope)?;
		let mut request = Self::new(Method::POST, url);
		request.body = Some(Bytes::from(body));
		request.options.replay_safe = envelope.phase().is_replay_safe();
		Ok(request)
	}

	pub fn with_timeout(mut self, timeout: Duration) -> Self {
		self.options.timeout = Some(timeout);
		self
	}

	pub fn host(&self) -> String {
		self.url.host_str().unwrap_or_default().to_string()
	}
}

/// Status and raw body of a completed call.
#[derive(Debug, Clone)]
pub struct SourceResponse {
	pub status: StatusCode,
	pub body: Bytes,
}

impl SourceResponse {
	pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
		Self {
			status,
			body: body.into(),
		}
	}

	pub fn is_body_empty(&self) -> bool {
		self.body.iter().all(u8::is_ascii_whitespace)
	}
}

/// Hook for the external per-host circuit breaker.
pub trait BreakerObserver: Send + Sync {
	/// Whether calls to `host` may currently be made.
	fn allows(&self, _host: &str) -> bool {
		true
	}

	fn record_success(&self, host: &str);

	fn record_failure(&self, host: &str);
}

/// Observer for deployments without a breaker.
#[derive(Debug, Default)]
pub struct NoopBreakerObserver;

impl BreakerObserver for NoopBreakerObserver {
	fn record_success(&self, _host: &str) {}

	fn record_failure(&self, _host: &str) {}
}

/// Whether a received status counts against the host's breaker.
pub fn counts_as_failure(status: StatusCode, options: &RequestOptions) -> bool {
	status.is_server_error() && !options.is_non_fatal(status)
}

#[async_trait]
pub trait SourceTransport: Send + Sync {
	async fn send(&self, request: SourceRequest) -> Result<SourceResponse, TransportError>;
}

/// reqwest-backed transport.
pub struct HttpTransport {
	client: reqwest::Client,
	timeout: Duration,
	observer: Arc<dyn BreakerObserver>,
}

impl HttpTransport {
	pub fn new(config: &TransportConfig) -> Result<Self, TransportError> {
		let client = reqwest::Client::builder()
			.user_agent(config.user_agent.clone())
			.build()
			.map_err(|e| TransportError::Client(e.to_string()))?;

		Ok(Self {
			client,
			timeout: config.timeout(),
			observer: Arc::new(NoopBreakerObserver),
		})
	}

	pub fn with_observer(mut self, observer: Arc<dyn BreakerObserver>) -> Self {
		self.observer = observer;
		self
	}

	fn transport_failure(&self, host: &str, timeout: Duration, err: reqwest::Error) -> TransportError {
		self.observer.record_failure(host);
		if err.is_timeout() {
			TransportError::Timeout {
				host: host.to_string(),
				timeout_ms: timeout.as_millis() as u64,
			}
		} else {
			TransportError::Connection {
				host: host.to_string(),
				message: err.to_string(),
			}
		}
	}
}

#[async_trait]
impl SourceTransport for HttpTransport {
	#[instrument(skip(self, request), fields(method = %request.method, url = %request.url))]
	async fn send(&self, request: SourceRequest) -> Result<SourceResponse, TransportError> {
		let host = request.host();
		if !self.observer.allows(&host) {
			warn!("Refusing call to {}: circuit open", host);
			return Err(TransportError::CircuitOpen { host });
		}

		let timeout = request.options.timeout.unwrap_or(self.timeout);
		let mut builder = self
			.client
			.request(request.method.clone(), request.url.clone())
			.timeout(timeout)
			.header(header::ACCEPT, "application/json");
		if let Some(body) = request.body.clone() {
			builder = builder
				.header(header::CONTENT_TYPE, "application/json")
				.body(body);
		}

		let response = builder
			.send()
			.await
			.map_err(|e| self.transport_failure(&host, timeout, e))?;
		let status = response.status();
		let body = response
			.bytes()
			.await
			.map_err(|e| self.transport_failure(&host, timeout, e))?;

		if counts_as_failure(status, &request.options) {
			self.observer.record_failure(&host);
		} else {
			self.observer.record_success(&host);
		}

		debug!("{} responded {} ({} bytes)", host, status, body.len());
		Ok(SourceResponse { status, body })
	}
}
