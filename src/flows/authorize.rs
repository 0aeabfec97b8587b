//! Authorize endpoints: the end-user redirect flow and the trusted management flow.

// crates.io
use http::StatusCode;
use url::form_urlencoded;
// self
use crate::{
	_prelude::*,
	auth::{
		AuthorizationGrant, ClientApplication, GrantType, IssuedTokens, KeyRecord, ResponseType,
		ScopeSet, TokenSecret, TrustedCaller,
	},
	config::ApiSpec,
	flows::{
		GrantEngine, Issuance,
		common::{
			ensure_client_grant, ensure_oauth_enabled, parse_response_type, parse_scope,
			registered_client,
		},
	},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	store::StoreKey,
};

/// Form parameters shared by both authorize endpoints.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizeRequest {
	/// `code` or `token`.
	#[serde(default)]
	pub response_type: String,
	/// Client identifier.
	#[serde(default)]
	pub client_id: String,
	/// Redirect URI; must equal the registered one.
	#[serde(default)]
	pub redirect_uri: String,
	/// Optional space-delimited scope.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub scope: Option<String>,
	/// Opaque client state echoed on redirects.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub state: Option<String>,
}
impl AuthorizeRequest {
	/// Builds a request without scope or state.
	pub fn new(
		response_type: impl Into<String>,
		client_id: impl Into<String>,
		redirect_uri: impl Into<String>,
	) -> Self {
		Self {
			response_type: response_type.into(),
			client_id: client_id.into(),
			redirect_uri: redirect_uri.into(),
			scope: None,
			state: None,
		}
	}
}

/// What an authorize call produced.
#[derive(Clone, Debug, PartialEq)]
pub enum AuthorizeOutcome {
	/// A fresh authorization code.
	Code(AuthorizationGrant),
	/// Tokens issued directly.
	Tokens(IssuedTokens),
}

/// Redirect the end-user authorize endpoint answers with.
#[derive(Clone, Debug, PartialEq)]
pub struct RedirectInstruction {
	/// Target of the redirect.
	pub location: Url,
	/// Code or tokens carried by the redirect.
	pub outcome: AuthorizeOutcome,
}
impl RedirectInstruction {
	/// Status the redirect is sent with.
	pub const STATUS: StatusCode = StatusCode::TEMPORARY_REDIRECT;
}

/// Parses a serialized key template posted as `key_rules`.
pub fn parse_key_rules(raw: &str) -> Result<KeyRecord> {
	serde_path_to_error::deserialize(&mut serde_json::Deserializer::from_str(raw)).map_err(|e| {
		Error::invalid_request(format!("key_rules is malformed at `{}`: {}", e.path(), e.inner()))
	})
}

impl GrantEngine {
	/// Handles the end-user authorize endpoint.
	///
	/// `response_type=code` mints a code and redirects to the API's login page with it;
	/// `response_type=token` issues an access token (no refresh token) and redirects to the
	/// client's redirect URI with the token in the fragment.
	pub async fn initiate_authorize(
		&self,
		spec: &ApiSpec,
		request: AuthorizeRequest,
	) -> Result<RedirectInstruction> {
		const KIND: FlowKind = FlowKind::Authorize;

		let span = FlowSpan::new(KIND, "initiate_authorize");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async move {
				ensure_oauth_enabled(spec)?;

				let response_type = parse_response_type(spec, &request.response_type)?;
				let client = registered_client(spec, &request.client_id, &request.redirect_uri)?;

				ensure_client_grant(client, response_type.grant())?;

				let scope = parse_scope(request.scope.as_deref())?;
				let now = OffsetDateTime::now_utc();

				match response_type {
					ResponseType::Code => {
						let mut location = spec.login_redirect()?;
						let grant = self.mint_grant(spec, client, scope, None, now).await?;

						{
							let mut query = location.query_pairs_mut();

							query
								.append_pair("response_type", ResponseType::Code.as_str())
								.append_pair("client_id", client.client_id.as_ref())
								.append_pair("redirect_uri", &client.redirect_uri)
								.append_pair("code", grant.code.expose());

							if let Some(state) = &request.state {
								query.append_pair("state", state);
							}
						}

						Ok(RedirectInstruction { location, outcome: AuthorizeOutcome::Code(grant) })
					},
					ResponseType::Token => {
						let mut location = Url::parse(&client.redirect_uri).map_err(|_| {
							Error::invalid_client("registered redirect_uri is not an absolute URL")
						})?;
						let record = self.seed_key_record(spec, client, None);
						let tokens = self
							.issue_tokens(
								Issuance { spec, client, record, scope, with_refresh: false },
								now,
							)
							.await?;
						let mut fragment = form_urlencoded::Serializer::new(String::new());

						fragment
							.append_pair("access_token", tokens.access.value.expose())
							.append_pair("token_type", "bearer")
							.append_pair("expires_in", &tokens.expires_in.whole_seconds().to_string());

						if !tokens.scope.is_empty() {
							fragment.append_pair("scope", &tokens.scope.normalized());
						}
						if let Some(state) = &request.state {
							fragment.append_pair("state", state);
						}

						location.set_fragment(Some(&fragment.finish()));

						Ok(RedirectInstruction { location, outcome: AuthorizeOutcome::Tokens(tokens) })
					},
				}
			})
			.await;

		obs::finish_flow(KIND, &result);

		result
	}

	/// Handles the trusted authorize endpoint.
	///
	/// `key_rules`, when present, seeds the issued key record; otherwise the configured defaults
	/// apply with the client's policy. `response_type=code` returns a code, `response_type=token`
	/// issues tokens (with a refresh token when the API and client allow refresh).
	pub async fn authorize_trusted(
		&self,
		_caller: &TrustedCaller,
		spec: &ApiSpec,
		request: AuthorizeRequest,
		key_rules: Option<KeyRecord>,
	) -> Result<AuthorizeOutcome> {
		const KIND: FlowKind = FlowKind::AuthorizeTrusted;

		let span = FlowSpan::new(KIND, "authorize_trusted");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async move {
				ensure_oauth_enabled(spec)?;

				let response_type = parse_response_type(spec, &request.response_type)?;
				let client = registered_client(spec, &request.client_id, &request.redirect_uri)?;

				ensure_client_grant(client, response_type.grant())?;

				let scope = parse_scope(request.scope.as_deref())?;
				let now = OffsetDateTime::now_utc();

				match response_type {
					ResponseType::Code => self
						.mint_grant(spec, client, scope, key_rules, now)
						.await
						.map(AuthorizeOutcome::Code),
					ResponseType::Token => {
						let record = self.seed_key_record(spec, client, key_rules);
						let with_refresh = spec.allows_access(GrantType::RefreshToken)
							&& client.allows(GrantType::RefreshToken);

						self.issue_tokens(Issuance { spec, client, record, scope, with_refresh }, now)
							.await
							.map(AuthorizeOutcome::Tokens)
					},
				}
			})
			.await;

		obs::finish_flow(KIND, &result);

		result
	}

	async fn mint_grant(
		&self,
		spec: &ApiSpec,
		client: &ClientApplication,
		scope: ScopeSet,
		key_rules: Option<KeyRecord>,
		now: OffsetDateTime,
	) -> Result<AuthorizationGrant> {
		let grant = AuthorizationGrant {
			code: TokenSecret::generate(),
			api_id: spec.api_id.clone(),
			client_id: client.client_id.clone(),
			redirect_uri: client.redirect_uri.clone(),
			scope,
			org_id: spec.org_id.clone(),
			issued_at: now,
			ttl: self.settings.auth_code_ttl.whole_seconds(),
			used: false,
			key_rules,
		};
		let key = StoreKey::Grant(grant.code.expose()).to_string();

		self.store.set_json(&key, &grant, Some(self.settings.auth_code_ttl)).await?;

		Ok(grant)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::_preludet::*;

	#[tokio::test]
	async fn code_redirect_targets_login_page() {
		let (engine, backend) = build_test_engine();
		let spec = test_api_spec();
		let request = AuthorizeRequest {
			state: Some("xyz".into()),
			..AuthorizeRequest::new("code", TEST_CLIENT_ID, TEST_REDIRECT_URI)
		};
		let redirect = engine
			.initiate_authorize(&spec, request)
			.await
			.expect("Valid authorize request should redirect.");
		let AuthorizeOutcome::Code(grant) = &redirect.outcome else {
			panic!("Code response type should mint a code.");
		};
		let query: HashMap<_, _> = redirect.location.query_pairs().into_owned().collect();

		assert_eq!(redirect.location.host_str(), Some("login.example.com"));
		assert_eq!(query.get("code").map(String::as_str), Some(grant.code.expose()));
		assert_eq!(query.get("state").map(String::as_str), Some("xyz"));
		assert!(backend.contains_key(&StoreKey::Grant(grant.code.expose()).to_string()));
	}

	#[tokio::test]
	async fn implicit_redirect_carries_token_in_fragment() {
		let (engine, _) = build_test_engine();
		let spec = test_api_spec();
		let redirect = engine
			.initiate_authorize(&spec, AuthorizeRequest::new("token", TEST_CLIENT_ID, TEST_REDIRECT_URI))
			.await
			.expect("Implicit request should redirect.");
		let AuthorizeOutcome::Tokens(tokens) = &redirect.outcome else {
			panic!("Token response type should issue tokens.");
		};
		let fragment = redirect.location.fragment().expect("Fragment should carry the token.");

		assert!(tokens.refresh.is_none());
		assert!(redirect.location.as_str().starts_with(TEST_REDIRECT_URI));
		assert!(fragment.contains(&format!("access_token={}", tokens.access.value.expose())));
		assert!(fragment.contains("expires_in=3600"));
	}

	#[tokio::test]
	async fn mismatched_requests_are_rejected() {
		let (engine, backend) = build_test_engine();
		let spec = test_api_spec();

		for (request, expect_client_error) in [
			(AuthorizeRequest::new("code", "4321", TEST_REDIRECT_URI), true),
			(AuthorizeRequest::new("code", TEST_CLIENT_ID, "http://evil.example.com"), true),
			(AuthorizeRequest::new("password", TEST_CLIENT_ID, TEST_REDIRECT_URI), false),
		] {
			let err = engine
				.initiate_authorize(&spec, request)
				.await
				.expect_err("Mismatched request should fail.");

			if expect_client_error {
				assert!(matches!(err, Error::InvalidClient { .. }));
			} else {
				assert!(matches!(err, Error::InvalidRequest { .. }));
			}
		}

		assert!(backend.is_empty());
	}

	#[tokio::test]
	async fn trusted_code_keeps_key_rules_for_exchange() {
		let (engine, _) = build_test_engine();
		let spec = test_api_spec();
		let outcome = engine
			.authorize_trusted(
				&TrustedCaller::for_tests(),
				&spec,
				AuthorizeRequest::new("code", TEST_CLIENT_ID, TEST_REDIRECT_URI),
				Some(test_key_rules()),
			)
			.await
			.expect("Trusted code request should succeed.");
		let AuthorizeOutcome::Code(grant) = outcome else {
			panic!("Code response type should mint a code.");
		};
		let stored = engine
			.store
			.get_json::<AuthorizationGrant>(&StoreKey::Grant(grant.code.expose()).to_string())
			.await
			.expect("Store read should succeed.")
			.expect("Grant should be stored.");

		assert_eq!(stored.key_rules, Some(test_key_rules()));
		assert!(!stored.used);
		assert_eq!(stored.ttl, 60);
	}

	#[test]
	fn key_rules_errors_name_the_field() {
		assert!(parse_key_rules(TEST_KEY_RULES).is_ok());
		assert!(matches!(
			parse_key_rules(r#"{"rate": "fast"}"#),
			Err(Error::InvalidRequest { reason }) if reason.contains("rate")
		));
	}
}
