//! API definitions: listen paths, version tables, auth header, and OAuth settings.

// crates.io
use time::{PrimitiveDateTime, format_description::BorrowedFormatItem, macros::format_description};
// self
use crate::{
	_prelude::*,
	auth::{ApiId, ClientApplication, ClientId, GrantType, OrgId, ResponseType},
	error::ConfigError,
};

const VERSION_EXPIRY_FORMAT: &[BorrowedFormatItem<'static>] =
	format_description!("[year]-[month]-[day] [hour]:[minute]");

/// Name of the version unversioned APIs resolve to.
pub const DEFAULT_VERSION: &str = "Default";

/// A proxied API as loaded from its JSON definition.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiSpec {
	/// Display name.
	#[serde(default)]
	pub name: String,
	/// API identifier.
	pub api_id: ApiId,
	/// Organization owning the API and every key issued for it.
	pub org_id: OrgId,
	/// Bearer credential location.
	#[serde(default)]
	pub auth: AuthConfig,
	/// Where callers state the API version.
	#[serde(default)]
	pub definition: VersionDefinition,
	/// Version table.
	pub version_data: VersionData,
	/// Enables the OAuth endpoints under the listen path.
	#[serde(default)]
	pub use_oauth2: bool,
	/// OAuth allow-lists and login redirect.
	#[serde(default)]
	pub oauth_meta: OAuthMeta,
	/// Listen path and upstream.
	pub proxy: ProxyConfig,
	/// Client applications registered against the API.
	#[serde(default)]
	pub oauth_clients: Vec<ClientApplication>,
}
impl ApiSpec {
	/// Parses and validates a JSON definition, naming the failing field on error.
	pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
		let spec: Self =
			serde_path_to_error::deserialize(&mut serde_json::Deserializer::from_str(json))
				.map_err(ConfigError::malformed)?;

		spec.validate()?;

		Ok(spec)
	}

	/// Checks listen-path shape, version table, and OAuth prerequisites.
	pub fn validate(&self) -> Result<(), ConfigError> {
		let listen_path = self.listen_path();

		if !listen_path.starts_with('/') || !listen_path.ends_with('/') {
			return Err(ConfigError::InvalidListenPath {
				api_id: self.api_id.to_string(),
				listen_path: listen_path.to_owned(),
			});
		}
		if self.version_data.versions.is_empty() {
			return Err(ConfigError::NoVersions { api_id: self.api_id.to_string() });
		}

		for version in self.version_data.versions.values() {
			version.expires_at()?;
		}

		if self.use_oauth2 && self.allows_authorize(ResponseType::Code) {
			self.login_redirect()?;
		}

		Ok(())
	}

	/// Path prefix the API is served under; always starts and ends with `/`.
	pub fn listen_path(&self) -> &str {
		&self.proxy.listen_path
	}

	/// Looks up a registered client.
	pub fn client(&self, client_id: &str) -> Option<&ClientApplication> {
		self.oauth_clients.iter().find(|client| client.client_id.as_ref() == client_id)
	}

	/// Returns `true` if the authorize endpoints accept `response_type`.
	pub fn allows_authorize(&self, response_type: ResponseType) -> bool {
		self.oauth_meta.allowed_authorize_types.contains(&response_type)
	}

	/// Returns `true` if the token endpoint accepts `grant`.
	pub fn allows_access(&self, grant: GrantType) -> bool {
		self.oauth_meta.allowed_access_types.contains(&grant)
	}

	/// Parsed login redirect for the end-user authorize flow.
	pub fn login_redirect(&self) -> Result<Url, ConfigError> {
		let raw = self
			.oauth_meta
			.auth_login_redirect
			.as_deref()
			.filter(|raw| !raw.is_empty())
			.ok_or_else(|| ConfigError::MissingLoginRedirect { api_id: self.api_id.to_string() })?;

		Url::parse(raw).map_err(|source| ConfigError::InvalidLoginRedirect { source })
	}

	/// Registers (or replaces) a client application.
	pub fn with_client(mut self, client: ClientApplication) -> Self {
		self.oauth_clients.retain(|existing| existing.client_id != client.client_id);
		self.oauth_clients.push(client);

		self
	}

	/// Removes a client, returning it if present.
	pub fn remove_client(&mut self, client_id: &ClientId) -> Option<ClientApplication> {
		let index = self.oauth_clients.iter().position(|client| &client.client_id == client_id)?;

		Some(self.oauth_clients.remove(index))
	}
}

/// Header carrying the bearer credential on proxied calls.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthConfig {
	/// Header name, matched case-insensitively.
	#[serde(default = "AuthConfig::default_header")]
	pub auth_header_name: String,
}
impl AuthConfig {
	fn default_header() -> String {
		"authorization".into()
	}
}
impl Default for AuthConfig {
	fn default() -> Self {
		Self { auth_header_name: Self::default_header() }
	}
}

/// Where the version name travels on a request.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum VersionLocation {
	/// Request header named by [`VersionDefinition::key`].
	#[default]
	#[serde(rename = "header")]
	Header,
	/// Query parameter named by [`VersionDefinition::key`].
	#[serde(rename = "url-param")]
	UrlParam,
	/// First path segment after the listen path.
	#[serde(rename = "url")]
	Url,
}

/// Version lookup settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionDefinition {
	/// Location of the version name.
	#[serde(default)]
	pub location: VersionLocation,
	/// Header or query parameter name.
	#[serde(default = "VersionDefinition::default_key")]
	pub key: String,
}
impl VersionDefinition {
	fn default_key() -> String {
		"version".into()
	}
}
impl Default for VersionDefinition {
	fn default() -> Self {
		Self { location: VersionLocation::default(), key: Self::default_key() }
	}
}

/// Version table of an API.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionData {
	/// When set, every request resolves to the default version regardless of its metadata.
	#[serde(default)]
	pub not_versioned: bool,
	/// Versions keyed by name.
	#[serde(default)]
	pub versions: BTreeMap<String, VersionInfo>,
}
impl VersionData {
	/// Version used when `not_versioned` is set: `Default` if declared, otherwise the first one.
	pub fn default_version(&self) -> Option<&VersionInfo> {
		self.versions.get(DEFAULT_VERSION).or_else(|| self.versions.values().next())
	}
}

/// A single API version.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
	/// Version name.
	pub name: String,
	/// Expiry as `YYYY-MM-DD HH:MM` (UTC); empty or `-1` never expires.
	#[serde(default)]
	pub expires: String,
}
impl VersionInfo {
	/// Parsed expiry instant; `None` never expires.
	pub fn expires_at(&self) -> Result<Option<OffsetDateTime>, ConfigError> {
		let raw = self.expires.trim();

		if raw.is_empty() || raw == "-1" {
			return Ok(None);
		}

		PrimitiveDateTime::parse(raw, VERSION_EXPIRY_FORMAT)
			.map(|expiry| Some(expiry.assume_utc()))
			.map_err(|_| ConfigError::InvalidVersionExpiry {
				version: self.name.clone(),
				expires: self.expires.clone(),
			})
	}

	/// Returns `true` once the version expiry has passed.
	pub fn is_expired_at(&self, instant: OffsetDateTime) -> Result<bool, ConfigError> {
		Ok(self.expires_at()?.is_some_and(|expiry| instant >= expiry))
	}
}

/// OAuth settings of an API.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthMeta {
	/// Grants accepted at the token endpoint.
	#[serde(default)]
	pub allowed_access_types: BTreeSet<GrantType>,
	/// Response types accepted at the authorize endpoints.
	#[serde(default)]
	pub allowed_authorize_types: BTreeSet<ResponseType>,
	/// Login page end users are redirected to with a fresh code.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub auth_login_redirect: Option<String>,
}

/// Proxy settings; only the listen path matters to authorization.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyConfig {
	/// Path prefix the API is served under.
	pub listen_path: String,
	/// Upstream base URL, handed to the dispatcher.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub target_url: Option<String>,
	/// Whether the dispatcher strips the listen path before forwarding.
	#[serde(default)]
	pub strip_listen_path: bool,
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;
	use crate::_preludet::{TEST_API_DEFINITION, test_client};

	#[test]
	fn tyk_definition_parses() {
		let spec =
			ApiSpec::from_json_str(TEST_API_DEFINITION).expect("Fixture definition should parse.");

		assert_eq!(spec.api_id.as_ref(), "999999");
		assert_eq!(spec.listen_path(), "/APIID/");
		assert_eq!(spec.auth.auth_header_name, "authorization");
		assert_eq!(spec.definition.location, VersionLocation::Header);
		assert!(spec.version_data.not_versioned);
		assert!(spec.allows_authorize(ResponseType::Token));
		assert!(spec.allows_access(GrantType::RefreshToken));
		assert!(!spec.allows_access(GrantType::Implicit));
		assert_eq!(
			spec.login_redirect().expect("Login redirect should parse.").as_str(),
			"http://login.example.com/authorize"
		);
	}

	#[test]
	fn version_expiry_uses_minute_precision_utc() {
		let version = VersionInfo { name: "v1".into(), expires: "3000-01-02 15:04".into() };

		assert_eq!(
			version.expires_at().expect("Expiry should parse."),
			Some(macros::datetime!(3000-01-02 15:04 UTC))
		);
		assert!(
			!version
				.is_expired_at(macros::datetime!(2999-12-31 00:00 UTC))
				.expect("Expiry should parse.")
		);

		let never = VersionInfo { name: "v2".into(), expires: "-1".into() };

		assert_eq!(never.expires_at().expect("Sentinel expiry should parse."), None);

		let broken = VersionInfo { name: "v3".into(), expires: "next tuesday".into() };

		assert!(matches!(broken.expires_at(), Err(ConfigError::InvalidVersionExpiry { .. })));
	}

	#[test]
	fn validation_rejects_bad_shapes() {
		let mut value: serde_json::Value =
			serde_json::from_str(TEST_API_DEFINITION).expect("Fixture should be JSON.");

		value["proxy"]["listen_path"] = "/no-trailing-slash".into();

		assert!(matches!(
			ApiSpec::from_json_str(&value.to_string()),
			Err(ConfigError::InvalidListenPath { .. })
		));

		value["proxy"]["listen_path"] = "/APIID/".into();
		value["oauth_meta"]["auth_login_redirect"] = serde_json::Value::Null;

		assert!(matches!(
			ApiSpec::from_json_str(&value.to_string()),
			Err(ConfigError::MissingLoginRedirect { .. })
		));

		value["version_data"]["versions"] = serde_json::json!({});

		assert!(matches!(
			ApiSpec::from_json_str(&value.to_string()),
			Err(ConfigError::NoVersions { .. })
		));

		let err = ApiSpec::from_json_str(r#"{"api_id": "", "org_id": "o"}"#)
			.expect_err("Empty identifiers should fail.");

		assert!(matches!(err, ConfigError::Malformed { path, .. } if path == "api_id"));
	}

	#[test]
	fn clients_are_looked_up_by_id() {
		let spec = ApiSpec::from_json_str(TEST_API_DEFINITION)
			.expect("Fixture definition should parse.")
			.with_client(test_client());

		assert!(spec.client("1234").is_some());
		assert!(spec.client("4321").is_none());

		let mut spec = spec.with_client(test_client());

		assert_eq!(spec.oauth_clients.len(), 1);
		assert!(spec.remove_client(&test_client().client_id).is_some());
		assert!(spec.client("1234").is_none());
	}
}
