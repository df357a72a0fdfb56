//! Attributes a response to the source that produced it.
//!
//! Sources are deployed under a common URL template such as
//! `https://svc-{X}-env.example/api/evidencecodes`. The source identity is
//! whatever the resolved host has in place of the placeholder.

use broker_config::ProvenanceConfig;
use reqwest::Url;
use thiserror::Error;

const MARKER: &str = "sourceidentitymarker";

#[derive(Debug, Error)]
pub enum ProvenanceError {
	#[error("Invalid URL template '{template}': {message}")]
	InvalidTemplate { template: String, message: String },
}

/// Extracts source identities from request URLs.
#[derive(Debug, Clone)]
pub struct ProvenanceResolver {
	prefix: String,
	suffix: String,
}

impl ProvenanceResolver {
	pub fn new(template: &str, placeholder: &str) -> Result<Self, ProvenanceError> {
		let invalid = |message: &str| ProvenanceError::InvalidTemplate {
			template: template.to_string(),
			message: message.to_string(),
		};

		if placeholder.is_empty() || !template.contains(placeholder) {
			return Err(invalid("placeholder not found"));
		}

		let url = Url::parse(&template.replace(placeholder, MARKER))
			.map_err(|e| invalid(&e.to_string()))?;
		let host = url.host_str().ok_or_else(|| invalid("template has no host"))?;
		let (prefix, suffix) = host
			.split_once(MARKER)
			.ok_or_else(|| invalid("placeholder is not part of the host"))?;

		Ok(Self {
			prefix: prefix.to_string(),
			suffix: suffix.to_string(),
		})
	}

	pub fn from_config(config: &ProvenanceConfig) -> Result<Self, ProvenanceError> {
		Self::new(&config.url_template, &config.placeholder)
	}

	/// Uppercase source identity embedded in `url`'s host, if it matches
	/// the template.
	pub fn resolve(&self, url: &Url) -> Option<String> {
		let host = url.host_str()?.to_ascii_lowercase();
		let identity = host
			.strip_prefix(&self.prefix)?
			.strip_suffix(&self.suffix)?;
		(!identity.is_empty()).then(|| identity.to_ascii_uppercase())
	}
}
