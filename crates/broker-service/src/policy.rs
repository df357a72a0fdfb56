//! Authorization hook for inbound evidence requests.
//!
//! Authentication, accreditation lookup and consent are handled by an
//! external collaborator. The broker only needs a yes or a classified no.

use async_trait::async_trait;
use broker_types::{ErrorCode, EvidenceHarvesterRequest};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyError {
	#[error("No credentials were presented")]
	MissingAuthentication,

	#[error("{0}")]
	AuthorizationFailed(String),

	#[error("{0}")]
	RequiresConsent(String),

	#[error("Accreditation {0} was not found")]
	AccreditationNotFound(String),
}

impl PolicyError {
	pub fn error_code(&self) -> ErrorCode {
		match self {
			PolicyError::MissingAuthentication => ErrorCode::MissingAuthentication,
			PolicyError::AuthorizationFailed(_) => ErrorCode::AuthorizationFailed,
			PolicyError::RequiresConsent(_) => ErrorCode::RequiresConsent,
			PolicyError::AccreditationNotFound(_) => ErrorCode::AccreditationNotFound,
		}
	}
}

#[async_trait]
pub trait RequestPolicy: Send + Sync {
	async fn authorize(&self, request: &EvidenceHarvesterRequest) -> Result<(), PolicyError>;
}

/// Lets every request through.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

#[async_trait]
impl RequestPolicy for AllowAll {
	async fn authorize(&self, _request: &EvidenceHarvesterRequest) -> Result<(), PolicyError> {
		Ok(())
	}
}
