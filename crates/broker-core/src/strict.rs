//! Strict JSON decoding.
//!
//! `serde` ignores unknown fields unless a type opts out. A response that
//! merely resembles the expected payload must not be accepted, so decoding
//! here records every member the deserializer skipped and rejects the input
//! if there was one.

use serde::de::DeserializeOwned;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StrictError {
	#[error("Invalid JSON: {0}")]
	Json(#[from] serde_json::Error),

	#[error("Unknown field '{0}'")]
	UnknownField(String),
}

/// Decodes `bytes` into `T`, failing on members `T` does not know.
pub fn from_slice<T>(bytes: &[u8]) -> Result<T, StrictError>
where
	T: DeserializeOwned,
{
	let mut de = serde_json::Deserializer::from_slice(bytes);
	let mut unknown = None;
	let value: T = serde_ignored::deserialize(&mut de, |path| {
		unknown.get_or_insert_with(|| path.to_string());
	})?;
	de.end()?;

	match unknown {
		Some(field) => Err(StrictError::UnknownField(field)),
		None => Ok(value),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde::{Deserialize, Serialize};
	use serde_json::Value;

	#[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
	#[serde(rename_all = "camelCase")]
	struct Unit {
		organization_number: String,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		name: Option<String>,
		#[serde(default, skip_serializing_if = "Vec::is_empty")]
		roles: Vec<Role>,
		#[serde(default, alias = "orgForm")]
		organization_form: Option<String>,
	}

	#[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
	struct Role {
		code: String,
	}

	#[test]
	fn test_exact_shape_is_accepted() {
		let unit: Unit = from_slice(
			br#"{"organizationNumber":"910000002","name":"ACME","roles":[{"code":"DAGL"}]}"#,
		)
		.unwrap();
		assert_eq!(unit.organization_number, "910000002");
		assert_eq!(unit.roles.len(), 1);
	}

	#[test]
	fn test_null_optional_is_accepted() {
		let unit: Unit = from_slice(br#"{"organizationNumber":"1","name":null}"#).unwrap();
		assert_eq!(unit.name, None);
	}

	#[test]
	fn test_unknown_top_level_field_is_rejected() {
		let err = from_slice::<Unit>(br#"{"organizationNumber":"1","code":1011}"#).unwrap_err();
		assert!(matches!(err, StrictError::UnknownField(field) if field == "code"));
	}

	#[test]
	fn test_unknown_nested_field_is_rejected() {
		let err = from_slice::<Unit>(
			br#"{"organizationNumber":"1","roles":[{"code":"DAGL","extra":true}]}"#,
		)
		.unwrap_err();
		assert!(matches!(err, StrictError::UnknownField(field) if field == "roles.0.extra"));
	}

	#[test]
	fn test_fields_skipped_on_output_are_still_known() {
		let unit: Unit =
			from_slice(br#"{"organizationNumber":"1","name":"ACME","roles":[]}"#).unwrap();
		assert!(unit.roles.is_empty());
		assert_eq!(unit.name.as_deref(), Some("ACME"));
	}

	#[test]
	fn test_alias_is_accepted() {
		let unit: Unit = from_slice(br#"{"organizationNumber":"1","orgForm":"AS"}"#).unwrap();
		assert_eq!(unit.organization_form.as_deref(), Some("AS"));
	}

	#[test]
	fn test_trailing_garbage_is_rejected() {
		assert!(matches!(
			from_slice::<Unit>(br#"{"organizationNumber":"1"} x"#),
			Err(StrictError::Json(_))
		));
	}

	#[test]
	fn test_missing_required_field_is_rejected() {
		assert!(matches!(
			from_slice::<Unit>(br#"{"name":"ACME"}"#),
			Err(StrictError::Json(_))
		));
	}

	#[test]
	fn test_error_model_is_not_a_false_success() {
		let body = br#"{"code":1011,"description":"The evidence source is temporarily unavailable"}"#;
		assert!(from_slice::<Unit>(body).is_err());
	}

	#[test]
	fn test_untyped_value_accepts_anything() {
		let value: Value = from_slice(br#"{"anything":[1,2,{"x":null}]}"#).unwrap();
		assert_eq!(value["anything"][0], 1);
	}
}
