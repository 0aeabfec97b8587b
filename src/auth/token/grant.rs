//! One-time authorization codes minted by the authorize endpoints.

// self
use crate::{
	_prelude::*,
	auth::{ApiId, ClientId, KeyRecord, OrgId, ScopeSet, TokenSecret},
};

/// Authorization code awaiting exchange at the token endpoint.
///
/// `used` flips from `false` to `true` exactly once; the flip is performed as a store-level
/// compare-and-swap so concurrent exchanges of the same code race on a single write.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorizationGrant {
	/// Code value handed to the client.
	pub code: TokenSecret,
	/// API the code was minted for.
	pub api_id: ApiId,
	/// Client the code is bound to.
	pub client_id: ClientId,
	/// Redirect URI presented at authorize time; must be repeated at exchange time.
	pub redirect_uri: String,
	/// Requested scope.
	#[serde(default)]
	pub scope: ScopeSet,
	/// Organization owning the API.
	pub org_id: OrgId,
	/// Mint instant.
	#[serde(with = "time::serde::timestamp")]
	pub issued_at: OffsetDateTime,
	/// Lifetime in seconds.
	pub ttl: i64,
	/// Whether the code was already exchanged.
	pub used: bool,
	/// Key template supplied over the trusted channel, seeding the eventual key record.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub key_rules: Option<KeyRecord>,
}
impl AuthorizationGrant {
	/// Instant after which the code can no longer be exchanged.
	pub fn expires_at(&self) -> OffsetDateTime {
		self.issued_at + Duration::seconds(self.ttl)
	}

	/// Returns `true` once the code lifetime has elapsed.
	pub fn is_expired_at(&self, instant: OffsetDateTime) -> bool {
		instant >= self.expires_at()
	}

	/// Returns a copy flagged as consumed.
	pub fn consumed(&self) -> Self {
		Self { used: true, ..self.clone() }
	}
}
impl Debug for AuthorizationGrant {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AuthorizationGrant")
			.field("api_id", &self.api_id)
			.field("client_id", &self.client_id)
			.field("redirect_uri", &self.redirect_uri)
			.field("scope", &self.scope)
			.field("org_id", &self.org_id)
			.field("issued_at", &self.issued_at)
			.field("ttl", &self.ttl)
			.field("used", &self.used)
			.field("key_rules", &self.key_rules.is_some())
			.finish()
	}
}
