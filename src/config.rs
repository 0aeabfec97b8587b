//! Gateway configuration, API definitions, and the swappable API registry.

pub mod api;
pub mod registry;

pub use api::*;
pub use registry::*;

// crates.io
use serde::{Deserializer, Serializer};
// self
use crate::{_prelude::*, auth::KeyRecord, error::ConfigError};

/// Header management tooling sends the shared secret in.
pub const DEFAULT_MANAGEMENT_HEADER: &str = "x-tyk-authorization";

/// Process-wide gateway settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
	/// Shared secret expected on trusted management calls; empty disables them.
	#[serde(default)]
	pub secret: String,
	/// Header carrying the management credential.
	#[serde(default = "GatewayConfig::default_management_header")]
	pub management_header: String,
	/// Token lifetimes and issuance defaults.
	#[serde(default)]
	pub oauth: OAuthSettings,
}
impl GatewayConfig {
	/// Creates a configuration trusting `secret` with default lifetimes.
	pub fn new(secret: impl Into<String>) -> Self {
		Self {
			secret: secret.into(),
			management_header: Self::default_management_header(),
			oauth: OAuthSettings::default(),
		}
	}

	/// Parses a JSON document, naming the failing field on error.
	pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
		let config: Self =
			serde_path_to_error::deserialize(&mut serde_json::Deserializer::from_str(json))
				.map_err(ConfigError::malformed)?;

		config.oauth.validate()?;

		Ok(config)
	}

	fn default_management_header() -> String {
		DEFAULT_MANAGEMENT_HEADER.into()
	}
}
impl Debug for GatewayConfig {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("GatewayConfig")
			.field("secret_set", &!self.secret.is_empty())
			.field("management_header", &self.management_header)
			.field("oauth", &self.oauth)
			.finish()
	}
}

/// Lifetimes and defaults applied by the grant engine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuthSettings {
	/// Lifetime of authorization codes, in seconds on the wire.
	#[serde(with = "seconds")]
	pub auth_code_ttl: Duration,
	/// Lifetime of access tokens and their key records.
	#[serde(with = "seconds")]
	pub access_token_ttl: Duration,
	/// Lifetime of refresh tokens.
	#[serde(with = "seconds")]
	pub refresh_token_ttl: Duration,
	/// Key template used when a grant carries no key rules.
	pub default_key_rules: KeyRecord,
}
impl OAuthSettings {
	/// Rejects non-positive lifetimes.
	pub fn validate(&self) -> Result<(), ConfigError> {
		for (field, ttl) in [
			("oauth.auth_code_ttl", self.auth_code_ttl),
			("oauth.access_token_ttl", self.access_token_ttl),
			("oauth.refresh_token_ttl", self.refresh_token_ttl),
		] {
			if !ttl.is_positive() {
				return Err(ConfigError::Malformed {
					path: field.into(),
					message: "lifetime must be positive".into(),
				});
			}
		}

		Ok(())
	}
}
impl Default for OAuthSettings {
	fn default() -> Self {
		Self {
			auth_code_ttl: Duration::seconds(60),
			access_token_ttl: Duration::hours(1),
			refresh_token_ttl: Duration::days(14),
			default_key_rules: KeyRecord::default(),
		}
	}
}

mod seconds {
	// self
	use super::*;

	pub fn serialize<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_i64(value.whole_seconds())
	}

	pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
	where
		D: Deserializer<'de>,
	{
		i64::deserialize(deserializer).map(Duration::seconds)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn defaults_fill_missing_fields() {
		let config = GatewayConfig::from_json_str(r#"{"secret": "s3cret"}"#)
			.expect("Minimal config should parse.");

		assert_eq!(config.management_header, "x-tyk-authorization");
		assert_eq!(config.oauth.auth_code_ttl, Duration::seconds(60));
		assert_eq!(config.oauth.access_token_ttl, Duration::seconds(3_600));
		assert_eq!(config.oauth.refresh_token_ttl, Duration::days(14));
	}

	#[test]
	fn lifetimes_parse_as_seconds() {
		let config = GatewayConfig::from_json_str(
			r#"{"secret": "s", "oauth": {"auth_code_ttl": 30, "default_key_rules": {"rate": 5}}}"#,
		)
		.expect("Config with overrides should parse.");

		assert_eq!(config.oauth.auth_code_ttl, Duration::seconds(30));
		assert_eq!(config.oauth.default_key_rules.rate, 5.);
	}

	#[test]
	fn malformed_fields_report_their_path() {
		let err = GatewayConfig::from_json_str(r#"{"oauth": {"access_token_ttl": "soon"}}"#)
			.expect_err("Non-numeric lifetime should fail.");

		assert!(
			matches!(&err, ConfigError::Malformed { path, .. } if path == "oauth.access_token_ttl")
		);

		let err = GatewayConfig::from_json_str(r#"{"oauth": {"auth_code_ttl": 0}}"#)
			.expect_err("Zero lifetime should fail.");

		assert!(matches!(&err, ConfigError::Malformed { path, .. } if path == "oauth.auth_code_ttl"));
	}

	#[test]
	fn debug_output_hides_secret() {
		let rendered = format!("{:?}", GatewayConfig::new("hunter2"));

		assert!(!rendered.contains("hunter2"));
		assert!(rendered.contains("secret_set: true"));
	}
}
