//! Shared helpers for grant flows: client authentication, request checks, and token issuance.

// self
use crate::{
	_prelude::*,
	auth::{
		AccessDefinition, AccessToken, ClientApplication, GrantType, IssuedTokens, KeyRecord,
		RefreshToken, ResponseType, ScopeSet, TokenSecret,
	},
	config::ApiSpec,
	flows::GrantEngine,
	store::StoreKey,
};

/// Client credentials presented at the token endpoint.
#[derive(Clone, PartialEq, Eq)]
pub struct ClientCredentials {
	/// Client identifier.
	pub client_id: String,
	/// Plain-text client secret.
	pub client_secret: String,
}
impl ClientCredentials {
	/// Creates a credential pair.
	pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
		Self { client_id: client_id.into(), client_secret: client_secret.into() }
	}
}
impl Debug for ClientCredentials {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ClientCredentials")
			.field("client_id", &self.client_id)
			.field("client_secret", &"<redacted>")
			.finish()
	}
}

/// Parses an optional space-delimited scope parameter.
pub(crate) fn parse_scope(raw: Option<&str>) -> Result<ScopeSet> {
	raw.unwrap_or_default().parse().map_err(|e| Error::invalid_request(format!("{e}")))
}

/// Ensures the API serves OAuth endpoints at all.
pub(crate) fn ensure_oauth_enabled(spec: &ApiSpec) -> Result<()> {
	if spec.use_oauth2 {
		Ok(())
	} else {
		Err(Error::not_found(format!("OAuth is not enabled for API `{}`", spec.api_id)))
	}
}

/// Parses `response_type` and checks it against the API allow-list.
pub(crate) fn parse_response_type(spec: &ApiSpec, raw: &str) -> Result<ResponseType> {
	let response_type = raw.parse::<ResponseType>()?;

	if !spec.allows_authorize(response_type) {
		return Err(Error::invalid_request(format!(
			"response_type `{}` is not allowed for this API",
			response_type.as_str()
		)));
	}

	Ok(response_type)
}

/// Checks `grant` against the API allow-list.
pub(crate) fn ensure_access_type(spec: &ApiSpec, grant: GrantType) -> Result<()> {
	if spec.allows_access(grant) {
		Ok(())
	} else {
		Err(Error::UnsupportedGrantType { grant: grant.as_str().into() })
	}
}

/// Resolves a client by id and checks the redirect URI it presented.
pub(crate) fn registered_client<'a>(
	spec: &'a ApiSpec,
	client_id: &str,
	redirect_uri: &str,
) -> Result<&'a ClientApplication> {
	let client = spec.client(client_id).ok_or_else(|| Error::invalid_client("unknown client"))?;

	if !client.redirect_matches(redirect_uri) {
		return Err(Error::invalid_client("redirect_uri does not match the registered one"));
	}

	Ok(client)
}

/// Resolves a client and verifies its secret.
pub(crate) fn authenticate_client<'a>(
	spec: &'a ApiSpec,
	credentials: &ClientCredentials,
) -> Result<&'a ClientApplication> {
	let client = spec
		.client(&credentials.client_id)
		.filter(|client| client.verify_secret(&credentials.client_secret))
		.ok_or_else(|| Error::invalid_client("client authentication failed"))?;

	Ok(client)
}

/// Checks a client may use `grant`.
pub(crate) fn ensure_client_grant(client: &ClientApplication, grant: GrantType) -> Result<()> {
	if client.allows(grant) {
		Ok(())
	} else {
		Err(Error::UnsupportedGrantType { grant: grant.as_str().into() })
	}
}

/// Seconds left of a lifetime started at `issued_at`, never below one.
pub(crate) fn remaining_ttl(
	issued_at: OffsetDateTime,
	ttl: Duration,
	now: OffsetDateTime,
) -> Duration {
	(issued_at + ttl - now).max(Duration::SECOND)
}

/// Everything needed to mint a token pair.
#[derive(Debug)]
pub(crate) struct Issuance<'a> {
	pub spec: &'a ApiSpec,
	pub client: &'a ClientApplication,
	pub record: KeyRecord,
	pub scope: ScopeSet,
	pub with_refresh: bool,
}

impl GrantEngine {
	/// Seeds a key record from `template` (or the configured defaults) for a new token.
	pub(crate) fn seed_key_record(
		&self,
		spec: &ApiSpec,
		client: &ClientApplication,
		template: Option<KeyRecord>,
	) -> KeyRecord {
		let template = template.unwrap_or_else(|| self.settings.default_key_rules.clone());
		let mut record = KeyRecord::issue(
			template,
			spec.org_id.clone(),
			client.client_id.clone(),
			client.policy_id.clone(),
		);

		if record.access_rights.is_empty() && record.apply_policy_id.is_none() {
			record.access_rights.insert(spec.api_id.clone(), AccessDefinition {
				api_name: spec.name.clone(),
				api_id: spec.api_id.clone(),
				versions: Vec::new(),
			});
		}

		record
	}

	/// Writes the key record and, when requested, the refresh token of a new token pair.
	///
	/// Either both writes land or neither is left behind.
	pub(crate) async fn issue_tokens(
		&self,
		issuance: Issuance<'_>,
		now: OffsetDateTime,
	) -> Result<IssuedTokens> {
		let Issuance { spec, client, record, scope, with_refresh } = issuance;
		let settings = &self.settings;
		let store = self.store.as_ref();
		let access_value = TokenSecret::generate();
		let key_record_key = StoreKey::KeyRecord(access_value.expose()).to_string();
		let access = AccessToken {
			value: access_value.clone(),
			client_id: client.client_id.clone(),
			org_id: spec.org_id.clone(),
			policy_id: record.apply_policy_id.clone(),
			expires_at: now + settings.access_token_ttl,
			linked_key_id: key_record_key.clone(),
		};

		store.set_json(&key_record_key, &record, Some(settings.access_token_ttl)).await?;

		let refresh = if with_refresh {
			let refresh = RefreshToken {
				value: TokenSecret::generate(),
				api_id: spec.api_id.clone(),
				client_id: client.client_id.clone(),
				org_id: spec.org_id.clone(),
				linked_access_token: access_value,
				scope: scope.clone(),
				policy_id: record.apply_policy_id.clone(),
				issued_at: now,
			};
			let refresh_key = StoreKey::Refresh(refresh.value.expose()).to_string();

			if let Err(e) =
				store.set_json(&refresh_key, &refresh, Some(settings.refresh_token_ttl)).await
			{
				if let Err(_rollback) = store.delete(&key_record_key).await {
					#[cfg(feature = "tracing")]
					tracing::warn!(
						error = %_rollback,
						key = %refresh.linked_access_token,
						"Failed to delete the key record of an aborted issuance."
					);
				}

				return Err(e.into());
			}

			Some(refresh)
		} else {
			None
		};

		Ok(IssuedTokens { access, refresh, scope, expires_in: settings.access_token_ttl })
	}

	/// Puts a taken refresh token back for the rest of its lifetime.
	pub(crate) async fn restore_refresh(
		&self,
		key: &str,
		presented: &RefreshToken,
		now: OffsetDateTime,
	) {
		let ttl = remaining_ttl(presented.issued_at, self.settings.refresh_token_ttl, now);

		if let Err(_e) = self.store.set_json(key, presented, Some(ttl)).await {
			#[cfg(feature = "tracing")]
			tracing::warn!(
				error = %_e,
				token = %presented.value,
				"Failed to restore a refresh token after an aborted operation."
			);
		}
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{_preludet::*, store::FlakyStore};

	#[test]
	fn client_checks_map_to_invalid_client() {
		let spec = test_api_spec();

		assert!(registered_client(&spec, TEST_CLIENT_ID, TEST_REDIRECT_URI).is_ok());
		assert!(matches!(
			registered_client(&spec, "4321", TEST_REDIRECT_URI),
			Err(Error::InvalidClient { .. })
		));
		assert!(matches!(
			registered_client(&spec, TEST_CLIENT_ID, "http://evil.example.com"),
			Err(Error::InvalidClient { .. })
		));
		assert!(
			authenticate_client(&spec, &ClientCredentials::new(TEST_CLIENT_ID, TEST_CLIENT_SECRET))
				.is_ok()
		);
		assert!(matches!(
			authenticate_client(&spec, &ClientCredentials::new(TEST_CLIENT_ID, "wrong")),
			Err(Error::InvalidClient { .. })
		));
	}

	#[test]
	fn allow_lists_gate_response_and_grant_types() {
		let spec = test_api_spec();

		assert_eq!(parse_response_type(&spec, "code").ok(), Some(ResponseType::Code));
		assert!(matches!(parse_response_type(&spec, "id_token"), Err(Error::InvalidRequest { .. })));
		assert!(ensure_access_type(&spec, GrantType::AuthorizationCode).is_ok());
		assert!(matches!(
			ensure_access_type(&spec, GrantType::Implicit),
			Err(Error::UnsupportedGrantType { .. })
		));
	}

	#[test]
	fn seeded_records_fall_back_to_client_policy_and_issuing_api() {
		let (engine, _) = build_test_engine();
		let spec = test_api_spec();
		let client = test_client();
		let record = engine.seed_key_record(&spec, &client, None);

		assert_eq!(record.apply_policy_id.as_deref(), Some(TEST_CLIENT_POLICY));
		assert_eq!(record.org_id, Some(spec.org_id.clone()));
		// A policy governs access rights, so none are stamped.
		assert!(record.access_rights.is_empty());

		let client = ClientApplication { policy_id: None, ..test_client() };
		let record = engine.seed_key_record(&spec, &client, Some(test_key_rules()));

		assert_eq!(record.org_id, Some(spec.org_id.clone()));
		assert!(record.access_rights.contains_key("999999"));
	}

	#[tokio::test]
	async fn issuance_writes_key_record_and_refresh_token() {
		let (engine, backend) = build_test_engine();
		let spec = test_api_spec();
		let client = test_client();
		let record = engine.seed_key_record(&spec, &client, None);
		let issued = engine
			.issue_tokens(
				Issuance {
					spec: &spec,
					client: &client,
					record,
					scope: ScopeSet::default(),
					with_refresh: true,
				},
				OffsetDateTime::now_utc(),
			)
			.await
			.expect("Issuance against the memory store should succeed.");
		let refresh = issued.refresh.expect("Refresh token should be issued.");

		assert!(backend.contains_key(&issued.access.linked_key_id));
		assert!(backend.contains_key(&StoreKey::Refresh(refresh.value.expose()).to_string()));
		assert_eq!(issued.expires_in, Duration::hours(1));
	}

	#[tokio::test]
	async fn failed_refresh_write_rolls_back_the_key_record() {
		let (engine, store) = build_flaky_engine(FlakyStore::default().failing_sets(1, 1));
		let spec = test_api_spec();
		let client = test_client();
		let record = engine.seed_key_record(&spec, &client, None);
		let issuance = Issuance {
			spec: &spec,
			client: &client,
			record,
			scope: ScopeSet::default(),
			with_refresh: true,
		};
		let err = engine
			.issue_tokens(issuance, OffsetDateTime::now_utc())
			.await
			.expect_err("A failed refresh write should abort issuance.");

		assert!(matches!(err, Error::Storage(_)));
		assert!(store.memory().is_empty());
	}

	#[tokio::test]
	async fn failed_rollback_still_reports_the_write_failure() {
		let (engine, store) =
			build_flaky_engine(FlakyStore::default().failing_sets(1, 1).failing_deletes(0, 1));
		let spec = test_api_spec();
		let client = test_client();
		let record = engine.seed_key_record(&spec, &client, None);
		let issuance = Issuance {
			spec: &spec,
			client: &client,
			record,
			scope: ScopeSet::default(),
			with_refresh: true,
		};
		let err = engine
			.issue_tokens(issuance, OffsetDateTime::now_utc())
			.await
			.expect_err("A failed refresh write should abort issuance.");

		assert!(matches!(err, Error::Storage(_)));
		// The orphaned record is left to its TTL.
		assert_eq!(store.memory().len(), 1);
	}
}
