//! Configuration loading for the evidence broker.
//!
//! The configuration is read once at startup, validated, and then shared
//! read-only by every component.

use regex::Regex;
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

pub mod types;

pub use types::*;

#[derive(Error, Debug)]
pub enum ConfigError {
	#[error("File not found: {0}")]
	FileNotFound(String),

	#[error("Parse error: {0}")]
	ParseError(String),

	#[error("Validation error: {0}")]
	ValidationError(String),

	#[error("Environment variable not found: {0}")]
	EnvVarNotFound(String),

	#[error("IO error: {0}")]
	IoError(#[from] std::io::Error),
}

/// Configuration loader with environment variable substitution
pub struct ConfigLoader {
	file_path: Option<PathBuf>,
	env_prefix: String,
}

impl Default for ConfigLoader {
	fn default() -> Self {
		Self::new()
	}
}

impl ConfigLoader {
	pub fn new() -> Self {
		Self {
			file_path: None,
			env_prefix: "BROKER_".to_string(),
		}
	}

	pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
		self.file_path = Some(path.as_ref().to_path_buf());
		self
	}

	pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
		self.env_prefix = prefix.into();
		self
	}

	pub async fn load(&self) -> Result<BrokerConfig, ConfigError> {
		let file_path = self.file_path.as_ref().ok_or_else(|| {
			ConfigError::FileNotFound("No configuration file specified".to_string())
		})?;
		info!("Loading configuration from {:?}", file_path);

		let mut config = self.load_from_file(file_path).await?;

		self.apply_env_overrides(&mut config)?;
		validate_config(&config)?;

		Ok(config)
	}

	async fn load_from_file(&self, file_path: &Path) -> Result<BrokerConfig, ConfigError> {
		if !file_path.exists() {
			return Err(ConfigError::FileNotFound(file_path.display().to_string()));
		}
		let content = tokio::fs::read_to_string(file_path).await?;
		let substituted = substitute_env_vars(&content)?;

		match file_path.extension().and_then(|s| s.to_str()) {
			Some("toml") => from_toml(&substituted),
			Some("json") => from_json(&substituted),
			Some("yaml") | Some("yml") => from_yaml(&substituted),
			_ => Err(ConfigError::ParseError(format!(
				"Unsupported config format: {}",
				file_path.display()
			))),
		}
	}

	fn apply_env_overrides(&self, config: &mut BrokerConfig) -> Result<(), ConfigError> {
		let vars: HashMap<String, String> = env::vars().collect();
		apply_overrides(config, &self.env_prefix, &vars)
	}
}

/// Parse a TOML document
pub fn from_toml(contents: &str) -> Result<BrokerConfig, ConfigError> {
	toml::from_str(contents).map_err(|e| ConfigError::ParseError(e.to_string()))
}

/// Parse a JSON document
pub fn from_json(contents: &str) -> Result<BrokerConfig, ConfigError> {
	serde_json::from_str(contents).map_err(|e| ConfigError::ParseError(e.to_string()))
}

/// Parse a YAML document
pub fn from_yaml(contents: &str) -> Result<BrokerConfig, ConfigError> {
	serde_yaml::from_str(contents).map_err(|e| ConfigError::ParseError(e.to_string()))
}

/// Replaces every `${VAR_NAME}` with the value of that environment variable.
pub fn substitute_env_vars(content: &str) -> Result<String, ConfigError> {
	let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| ConfigError::ParseError(e.to_string()))?;
	let mut result = content.to_string();

	for cap in re.captures_iter(content) {
		let full_match = &cap[0];
		let var_name = &cap[1];

		let env_value =
			env::var(var_name).map_err(|_| ConfigError::EnvVarNotFound(var_name.to_string()))?;

		result = result.replace(full_match, &env_value);
	}

	Ok(result)
}

fn apply_overrides(
	config: &mut BrokerConfig,
	prefix: &str,
	vars: &HashMap<String, String>,
) -> Result<(), ConfigError> {
	if let Some(log_level) = vars.get(&format!("{}LOG_LEVEL", prefix)) {
		debug!("Overriding log level from environment");
		config.broker.log_level = log_level.clone();
	}

	if let Some(http_port) = vars.get(&format!("{}HTTP_PORT", prefix)) {
		config.broker.http_port = http_port
			.parse()
			.map_err(|e| ConfigError::ValidationError(format!("Invalid HTTP port: {}", e)))?;
	}

	if let Some(environment) = vars.get(&format!("{}ENVIRONMENT", prefix)) {
		config.broker.environment = environment
			.parse()
			.map_err(ConfigError::ValidationError)?;
	}

	Ok(())
}

/// Checks cross-field invariants that serde cannot express.
pub fn validate_config(config: &BrokerConfig) -> Result<(), ConfigError> {
	if config.broker.name.trim().is_empty() {
		return Err(ConfigError::ValidationError(
			"Broker name must not be empty".to_string(),
		));
	}

	if config.transport.timeout_ms == 0 {
		return Err(ConfigError::ValidationError(
			"transport.timeout_ms must be positive".to_string(),
		));
	}

	if config.async_evidence.status_cache_ttl_secs == 0 {
		return Err(ConfigError::ValidationError(
			"async_evidence.status_cache_ttl_secs must be positive".to_string(),
		));
	}

	validate_template(&config.provenance)?;

	let mut served_by: HashMap<&str, &str> = HashMap::new();
	for (name, source) in config.sources.iter().filter(|(_, s)| s.enabled) {
		if source.evidence_codes.is_empty() {
			return Err(ConfigError::ValidationError(format!(
				"Source '{}' is enabled but serves no evidence codes",
				name
			)));
		}
		for code in &source.evidence_codes {
			if let Some(other) = served_by.insert(code.as_str(), name.as_str()) {
				return Err(ConfigError::ValidationError(format!(
					"Evidence code '{}' is served by both '{}' and '{}'",
					code, other, name
				)));
			}
		}
	}

	Ok(())
}

fn validate_template(provenance: &ProvenanceConfig) -> Result<(), ConfigError> {
	let template = &provenance.url_template;
	let placeholder = &provenance.placeholder;

	if placeholder.is_empty() || template.matches(placeholder.as_str()).count() != 1 {
		return Err(ConfigError::ValidationError(format!(
			"URL template '{}' must contain the placeholder '{}' exactly once",
			template, placeholder
		)));
	}

	let host_start = template.find("://").map(|i| i + 3).ok_or_else(|| {
		ConfigError::ValidationError(format!("URL template '{}' has no scheme", template))
	})?;
	let host_end = template[host_start..]
		.find('/')
		.map(|i| host_start + i)
		.unwrap_or(template.len());
	if !template[host_start..host_end].contains(placeholder.as_str()) {
		return Err(ConfigError::ValidationError(format!(
			"Placeholder '{}' must be part of the host in '{}'",
			placeholder, template
		)));
	}

	Ok(())
}
