//! Registered OAuth client applications and the grant/response vocabularies they are allowed.

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
// self
use crate::{
	_prelude::*,
	auth::{ClientId, PolicyId},
};

/// OAuth 2.0 grant types the gateway issues tokens for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
	/// Authorization code exchanged at the token endpoint.
	AuthorizationCode,
	/// Refresh token rotation.
	RefreshToken,
	/// Implicit grant (`response_type=token`).
	Implicit,
}
impl GrantType {
	/// Returns the RFC 6749 identifier for the grant type.
	pub fn as_str(self) -> &'static str {
		match self {
			GrantType::AuthorizationCode => "authorization_code",
			GrantType::RefreshToken => "refresh_token",
			GrantType::Implicit => "implicit",
		}
	}
}
impl Display for GrantType {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
impl FromStr for GrantType {
	type Err = Error;

	fn from_str(s: &str) -> Result<Self> {
		match s {
			"authorization_code" => Ok(Self::AuthorizationCode),
			"refresh_token" => Ok(Self::RefreshToken),
			"implicit" => Ok(Self::Implicit),
			other => Err(Error::UnsupportedGrantType { grant: other.to_owned() }),
		}
	}
}

/// `response_type` values accepted by the authorize endpoints.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseType {
	/// Mint an authorization code.
	Code,
	/// Issue tokens directly (implicit grant).
	Token,
}
impl ResponseType {
	/// Returns the wire identifier.
	pub fn as_str(self) -> &'static str {
		match self {
			ResponseType::Code => "code",
			ResponseType::Token => "token",
		}
	}

	/// Grant a client must be allowed to request this response type.
	pub fn grant(self) -> GrantType {
		match self {
			ResponseType::Code => GrantType::AuthorizationCode,
			ResponseType::Token => GrantType::Implicit,
		}
	}
}
impl FromStr for ResponseType {
	type Err = Error;

	fn from_str(s: &str) -> Result<Self> {
		match s {
			"code" => Ok(Self::Code),
			"token" => Ok(Self::Token),
			other => Err(Error::invalid_request(format!("unsupported response_type `{other}`"))),
		}
	}
}

/// Client application registered against an API. Immutable after registration.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientApplication {
	/// Public client identifier.
	pub client_id: ClientId,
	/// Base64 (URL-safe, no padding) SHA-256 digest of the client secret.
	pub client_secret_hash: String,
	/// The single redirect URI accepted for this client (exact match).
	pub redirect_uri: String,
	/// Grants the client may use.
	#[serde(default)]
	pub allowed_grant_types: BTreeSet<GrantType>,
	/// Policy applied to keys issued without explicit key rules.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub policy_id: Option<PolicyId>,
}
impl ClientApplication {
	/// Registers a client from its plain-text secret; only the digest is retained.
	pub fn new(client_id: ClientId, secret: &str, redirect_uri: impl Into<String>) -> Self {
		Self {
			client_id,
			client_secret_hash: Self::hash_secret(secret),
			redirect_uri: redirect_uri.into(),
			allowed_grant_types: BTreeSet::new(),
			policy_id: None,
		}
	}

	/// Replaces the allowed grant set.
	pub fn with_grant_types<I>(mut self, grants: I) -> Self
	where
		I: IntoIterator<Item = GrantType>,
	{
		self.allowed_grant_types = grants.into_iter().collect();

		self
	}

	/// Binds a policy applied to keys issued without key rules.
	pub fn with_policy(mut self, policy: PolicyId) -> Self {
		self.policy_id = Some(policy);

		self
	}

	/// Digest stored in [`ClientApplication::client_secret_hash`].
	pub fn hash_secret(secret: &str) -> String {
		let mut hasher = Sha256::new();

		hasher.update(secret.as_bytes());

		URL_SAFE_NO_PAD.encode(hasher.finalize())
	}

	/// Compares `presented` against the stored digest in constant time.
	pub fn verify_secret(&self, presented: &str) -> bool {
		let presented = Self::hash_secret(presented);

		presented.as_bytes().ct_eq(self.client_secret_hash.as_bytes()).into()
	}

	/// Returns `true` if `redirect_uri` is exactly the registered one.
	pub fn redirect_matches(&self, redirect_uri: &str) -> bool {
		self.redirect_uri == redirect_uri
	}

	/// Returns `true` if the client may use `grant`.
	pub fn allows(&self, grant: GrantType) -> bool {
		self.allowed_grant_types.contains(&grant)
	}
}
impl Debug for ClientApplication {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ClientApplication")
			.field("client_id", &self.client_id)
			.field("client_secret_hash", &"<redacted>")
			.field("redirect_uri", &self.redirect_uri)
			.field("allowed_grant_types", &self.allowed_grant_types)
			.field("policy_id", &self.policy_id)
			.finish()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn client() -> ClientApplication {
		ClientApplication::new(
			ClientId::new("1234").expect("Client fixture should be valid."),
			"aabbccdd",
			"http://client.oauth.com",
		)
		.with_grant_types([GrantType::AuthorizationCode])
	}

	#[test]
	fn secret_verification_uses_digest() {
		let client = client();

		assert_ne!(client.client_secret_hash, "aabbccdd");
		assert!(client.verify_secret("aabbccdd"));
		assert!(!client.verify_secret("aabbccde"));
		assert!(!client.verify_secret(""));
	}

	#[test]
	fn redirect_and_grant_checks_are_exact() {
		let client = client();

		assert!(client.redirect_matches("http://client.oauth.com"));
		assert!(!client.redirect_matches("http://client.oauth.com/"));
		assert!(client.allows(GrantType::AuthorizationCode));
		assert!(!client.allows(GrantType::Implicit));
	}

	#[test]
	fn vocabularies_parse_wire_values() {
		assert_eq!(ResponseType::from_str("token").ok(), Some(ResponseType::Token));
		assert!(matches!(ResponseType::from_str("id_token"), Err(Error::InvalidRequest { .. })));
		assert_eq!(GrantType::from_str("refresh_token").ok(), Some(GrantType::RefreshToken));
		assert!(matches!(
			GrantType::from_str("password"),
			Err(Error::UnsupportedGrantType { grant }) if grant == "password"
		));
		assert_eq!(ResponseType::Token.grant(), GrantType::Implicit);
	}
}
