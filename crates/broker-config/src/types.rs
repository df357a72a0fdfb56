//! Configuration types for the broker.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Complete broker configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BrokerConfig {
	/// Broker identity and HTTP settings
	pub broker: BrokerSettings,
	/// Outbound call settings
	#[serde(default)]
	pub transport: TransportConfig,
	/// How source identities are derived from request URLs
	pub provenance: ProvenanceConfig,
	/// Asynchronous evidence settings
	#[serde(default)]
	pub async_evidence: AsyncEvidenceConfig,
	/// Evidence sources keyed by source name
	#[serde(default)]
	pub sources: BTreeMap<String, SourceConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BrokerSettings {
	pub name: String,
	#[serde(default = "default_http_port")]
	pub http_port: u16,
	#[serde(default)]
	pub environment: Environment,
	#[serde(default = "default_log_level")]
	pub log_level: String,
}

/// Deployment environment. Decides whether debug fields leave the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
	#[default]
	Development,
	Test,
	Staging,
	Production,
}

impl Environment {
	pub fn exposes_debug_details(self) -> bool {
		matches!(self, Environment::Development | Environment::Test)
	}

	pub fn is_production(self) -> bool {
		matches!(self, Environment::Production)
	}
}

impl fmt::Display for Environment {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			Environment::Development => "development",
			Environment::Test => "test",
			Environment::Staging => "staging",
			Environment::Production => "production",
		};
		f.write_str(name)
	}
}

impl FromStr for Environment {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_ascii_lowercase().as_str() {
			"development" | "dev" => Ok(Environment::Development),
			"test" => Ok(Environment::Test),
			"staging" => Ok(Environment::Staging),
			"production" | "prod" => Ok(Environment::Production),
			other => Err(format!("Unknown environment: {}", other)),
		}
	}
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TransportConfig {
	/// Deadline for a single outbound call
	#[serde(default = "default_timeout_ms")]
	pub timeout_ms: u64,
	#[serde(default = "default_user_agent")]
	pub user_agent: String,
}

impl Default for TransportConfig {
	fn default() -> Self {
		Self {
			timeout_ms: default_timeout_ms(),
			user_agent: default_user_agent(),
		}
	}
}

impl TransportConfig {
	pub fn timeout(&self) -> Duration {
		Duration::from_millis(self.timeout_ms)
	}
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProvenanceConfig {
	/// Source URL template, e.g. `https://svc-{X}-env.example/api/evidencecodes`
	pub url_template: String,
	#[serde(default = "default_placeholder")]
	pub placeholder: String,
}

impl ProvenanceConfig {
	/// Base URL for a source: the template with the placeholder replaced by
	/// the lowercase source name.
	pub fn base_url_for(&self, source_name: &str) -> String {
		self.url_template
			.replace(&self.placeholder, &source_name.to_ascii_lowercase())
	}
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AsyncEvidenceConfig {
	/// How long a "still pending" status result is reused
	#[serde(default = "default_status_cache_ttl_secs")]
	pub status_cache_ttl_secs: u64,
}

impl Default for AsyncEvidenceConfig {
	fn default() -> Self {
		Self {
			status_cache_ttl_secs: default_status_cache_ttl_secs(),
		}
	}
}

impl AsyncEvidenceConfig {
	pub fn status_cache_ttl(&self) -> Duration {
		Duration::from_secs(self.status_cache_ttl_secs)
	}
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourceConfig {
	#[serde(default = "default_enabled")]
	pub enabled: bool,
	/// Evidence codes this source serves
	pub evidence_codes: Vec<String>,
	/// Overrides the templated base URL
	#[serde(default)]
	pub base_url: Option<String>,
}

fn default_http_port() -> u16 {
	8080
}

fn default_log_level() -> String {
	"info".to_string()
}

fn default_timeout_ms() -> u64 {
	30_000
}

fn default_user_agent() -> String {
	concat!("evidence-broker/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_placeholder() -> String {
	"{X}".to_string()
}

fn default_status_cache_ttl_secs() -> u64 {
	5
}

fn default_enabled() -> bool {
	true
}
