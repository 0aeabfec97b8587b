//! Access/refresh token pairs produced by exchanges, implicit grants, and rotations.

// std
use std::time::Duration as StdDuration;
// crates.io
use oauth2::{
	AccessToken as WireAccessToken, EmptyExtraTokenFields, RefreshToken as WireRefreshToken, Scope,
	basic::{BasicTokenResponse, BasicTokenType},
};
// self
use crate::{
	_prelude::*,
	auth::{ApiId, ClientId, OrgId, PolicyId, ScopeSet, TokenSecret},
};

/// Bearer credential; its value is the lookup key of the backing key record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken {
	/// Bearer value presented by API callers.
	pub value: TokenSecret,
	/// Client the token was issued to.
	pub client_id: ClientId,
	/// Organization owning the key.
	pub org_id: OrgId,
	/// Policy bound to the key at issuance.
	pub policy_id: Option<PolicyId>,
	/// Expiry instant of the stored key record.
	#[serde(with = "time::serde::timestamp")]
	pub expires_at: OffsetDateTime,
	/// Store key of the key record.
	pub linked_key_id: String,
}

/// Single-use credential that mints a new token pair.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshToken {
	/// Refresh value presented at the token endpoint.
	pub value: TokenSecret,
	/// API the lineage belongs to.
	pub api_id: ApiId,
	/// Client the token was issued to.
	pub client_id: ClientId,
	/// Organization owning the key.
	pub org_id: OrgId,
	/// Access token minted alongside this refresh token.
	pub linked_access_token: TokenSecret,
	/// Scope carried across rotations.
	#[serde(default)]
	pub scope: ScopeSet,
	/// Policy re-applied if the linked key record is gone when the token is rotated.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub policy_id: Option<PolicyId>,
	/// Mint instant.
	#[serde(with = "time::serde::timestamp")]
	pub issued_at: OffsetDateTime,
}

/// Freshly issued credentials returned to the caller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IssuedTokens {
	/// New access token.
	pub access: AccessToken,
	/// New refresh token; absent for implicit grants on the end-user path.
	pub refresh: Option<RefreshToken>,
	/// Granted scope.
	pub scope: ScopeSet,
	/// Lifetime of the access token.
	pub expires_in: Duration,
}
impl IssuedTokens {
	/// Converts the pair into the RFC 6749 token endpoint payload.
	pub fn to_response(&self) -> BasicTokenResponse {
		let mut response = BasicTokenResponse::new(
			WireAccessToken::new(self.access.value.expose().to_owned()),
			BasicTokenType::Bearer,
			EmptyExtraTokenFields {},
		);
		let expires_in = StdDuration::from_secs(self.expires_in.whole_seconds().max(0).unsigned_abs());

		response.set_expires_in(Some(&expires_in));
		response.set_refresh_token(
			self.refresh.as_ref().map(|r| WireRefreshToken::new(r.value.expose().to_owned())),
		);

		if !self.scope.is_empty() {
			response.set_scopes(Some(self.scope.iter().cloned().map(Scope::new).collect()));
		}

		response
	}
}
