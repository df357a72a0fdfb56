//! Evidence code to source endpoint lookup.

use broker_config::BrokerConfig;
use reqwest::Url;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
	#[error("Evidence code {code} is served by both {first} and {second}")]
	DuplicateCode {
		code: String,
		first: String,
		second: String,
	},

	#[error("Invalid URL for source {source_name}: {message}")]
	InvalidUrl { source_name: String, message: String },
}

/// Where one evidence code is harvested from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceEndpoint {
	pub source_name: String,
	pub evidence_code: String,
	pub url: Url,
}

/// Registry of enabled evidence codes
#[derive(Debug, Clone, Default)]
pub struct SourceRegistry {
	endpoints: BTreeMap<String, SourceEndpoint>,
}

impl SourceRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Builds the registry from every enabled source in `config`.
	pub fn from_config(config: &BrokerConfig) -> Result<Self, RegistryError> {
		let mut registry = Self::new();
		for (name, source) in config.sources.iter().filter(|(_, s)| s.enabled) {
			let base = source
				.base_url
				.clone()
				.unwrap_or_else(|| config.provenance.base_url_for(name));
			for code in &source.evidence_codes {
				registry.register(name, code, &base)?;
			}
		}
		Ok(registry)
	}

	/// Register an evidence code served under `base_url`
	pub fn register(
		&mut self,
		source_name: &str,
		evidence_code: &str,
		base_url: &str,
	) -> Result<(), RegistryError> {
		if let Some(existing) = self.endpoints.get(evidence_code) {
			return Err(RegistryError::DuplicateCode {
				code: evidence_code.to_string(),
				first: existing.source_name.clone(),
				second: source_name.to_string(),
			});
		}

		let url = Url::parse(&format!(
			"{}/{}",
			base_url.trim_end_matches('/'),
			evidence_code
		))
		.map_err(|e| RegistryError::InvalidUrl {
			source_name: source_name.to_string(),
			message: e.to_string(),
		})?;

		self.endpoints.insert(
			evidence_code.to_string(),
			SourceEndpoint {
				source_name: source_name.to_string(),
				evidence_code: evidence_code.to_string(),
				url,
			},
		);
		Ok(())
	}

	pub fn get(&self, evidence_code: &str) -> Option<&SourceEndpoint> {
		self.endpoints.get(evidence_code)
	}

	/// All endpoints ordered by evidence code.
	pub fn endpoints(&self) -> impl Iterator<Item = &SourceEndpoint> {
		self.endpoints.values()
	}

	pub fn len(&self) -> usize {
		self.endpoints.len()
	}

	pub fn is_empty(&self) -> bool {
		self.endpoints.is_empty()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn config() -> BrokerConfig {
		broker_config::from_toml(
			r#"
			[broker]
			name = "broker"

			[provenance]
			url_template = "https://svc-{X}-env.example/api/evidencecodes"

			[sources.registry]
			evidence_codes = ["UnitBasicInformation", "Roles"]

			[sources.tax]
			evidence_codes = ["TaxReturn"]
			base_url = "http://localhost:9000/api/"

			[sources.retired]
			enabled = false
			evidence_codes = ["Roles"]
			"#,
		)
		.unwrap()
	}

	#[test]
	fn test_registry_from_config() {
		let registry = SourceRegistry::from_config(&config()).unwrap();
		assert_eq!(registry.len(), 3);

		let roles = registry.get("Roles").unwrap();
		assert_eq!(roles.source_name, "registry");
		assert_eq!(
			roles.url.as_str(),
			"https://svc-registry-env.example/api/evidencecodes/Roles"
		);

		let tax = registry.get("TaxReturn").unwrap();
		assert_eq!(tax.url.as_str(), "http://localhost:9000/api/TaxReturn");

		assert!(registry.get("Unknown").is_none());
	}

	#[test]
	fn test_duplicate_code_is_rejected() {
		let mut registry = SourceRegistry::new();
		registry.register("a", "Roles", "https://a.example").unwrap();
		let err = registry.register("b", "Roles", "https://b.example").unwrap_err();
		assert!(matches!(err, RegistryError::DuplicateCode { .. }));
	}

	#[test]
	fn test_invalid_base_url() {
		let mut registry = SourceRegistry::new();
		assert!(matches!(
			registry.register("a", "Roles", "not a url"),
			Err(RegistryError::InvalidUrl { .. })
		));
	}
}
