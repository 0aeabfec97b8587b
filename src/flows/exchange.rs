//! Authorization code exchange at the token endpoint.

// self
use crate::{
	_prelude::*,
	auth::{AuthorizationGrant, GrantType, IssuedTokens},
	config::ApiSpec,
	flows::{
		ClientCredentials, GrantEngine, Issuance,
		common::{authenticate_client, ensure_access_type, ensure_client_grant, ensure_oauth_enabled},
	},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	store::{self, CompareAndSwapOutcome, StoreKey},
};

impl GrantEngine {
	/// Exchanges an authorization code for a token pair.
	///
	/// The code is consumed by a compare-and-swap on its stored form, so of any number of
	/// concurrent exchanges at most one succeeds. Client and redirect checks run before the swap,
	/// so a mismatched caller cannot burn a code it does not own.
	pub async fn exchange_code(
		&self,
		spec: &ApiSpec,
		code: &str,
		credentials: &ClientCredentials,
		redirect_uri: &str,
	) -> Result<IssuedTokens> {
		const KIND: FlowKind = FlowKind::CodeExchange;

		let span = FlowSpan::new(KIND, "exchange_code");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async move {
				ensure_oauth_enabled(spec)?;
				ensure_access_type(spec, GrantType::AuthorizationCode)?;

				let client = authenticate_client(spec, credentials)?;

				ensure_client_grant(client, GrantType::AuthorizationCode)?;

				if code.is_empty() {
					return Err(Error::invalid_request("code is required"));
				}

				let key = StoreKey::Grant(code).to_string();
				let raw = self
					.store
					.get(&key)
					.await?
					.ok_or_else(|| Error::invalid_grant("authorization code is unknown or expired"))?;
				let grant: AuthorizationGrant = store::decode(&raw)?;
				let now = OffsetDateTime::now_utc();

				if grant.used {
					return Err(Error::invalid_grant("authorization code was already used"));
				}
				if grant.is_expired_at(now) {
					return Err(Error::invalid_grant("authorization code is unknown or expired"));
				}
				if grant.api_id != spec.api_id
					|| grant.client_id != client.client_id
					|| grant.redirect_uri != redirect_uri
				{
					return Err(Error::invalid_grant(
						"authorization code was issued to another client or redirect_uri",
					));
				}

				let consumed = store::encode(&grant.consumed())?;

				match self.store.compare_and_swap(&key, &raw, consumed.clone()).await? {
					CompareAndSwapOutcome::Updated => (),
					CompareAndSwapOutcome::Mismatch | CompareAndSwapOutcome::Missing =>
						return Err(Error::invalid_grant("authorization code was already used")),
				}

				let record = self.seed_key_record(spec, client, grant.key_rules.clone());
				let with_refresh = spec.allows_access(GrantType::RefreshToken)
					&& client.allows(GrantType::RefreshToken);
				let issued = self
					.issue_tokens(
						Issuance { spec, client, record, scope: grant.scope.clone(), with_refresh },
						now,
					)
					.await;

				if issued.is_err() {
					// Re-arm the code; nothing was issued for it.
					match self.store.compare_and_swap(&key, &consumed, raw).await {
						Ok(CompareAndSwapOutcome::Updated) => (),
						Ok(_outcome) => {
							#[cfg(feature = "tracing")]
							tracing::warn!(
								outcome = ?_outcome,
								code = %grant.code,
								"Authorization code changed before it could be re-armed."
							);
						},
						Err(_e) => {
							#[cfg(feature = "tracing")]
							tracing::warn!(
								error = %_e,
								code = %grant.code,
								"Failed to re-arm an authorization code after an aborted exchange."
							);
						},
					}
				}

				issued
			})
			.await;

		obs::finish_flow(KIND, &result);

		result
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{
		_preludet::*,
		auth::{AuthorizationGrant, TrustedCaller},
		flows::{AuthorizeOutcome, AuthorizeRequest},
		store::FlakyStore,
	};

	async fn mint_code(engine: &GrantEngine, spec: &ApiSpec) -> AuthorizationGrant {
		let outcome = engine
			.authorize_trusted(
				&TrustedCaller::for_tests(),
				spec,
				AuthorizeRequest::new("code", TEST_CLIENT_ID, TEST_REDIRECT_URI),
				None,
			)
			.await
			.expect("Trusted code request should succeed.");

		match outcome {
			AuthorizeOutcome::Code(grant) => grant,
			AuthorizeOutcome::Tokens(_) => panic!("Code response type should mint a code."),
		}
	}

	fn credentials() -> ClientCredentials {
		ClientCredentials::new(TEST_CLIENT_ID, TEST_CLIENT_SECRET)
	}

	#[tokio::test]
	async fn code_is_single_use() {
		let (engine, backend) = build_test_engine();
		let spec = test_api_spec();
		let grant = mint_code(&engine, &spec).await;
		let tokens = engine
			.exchange_code(&spec, grant.code.expose(), &credentials(), TEST_REDIRECT_URI)
			.await
			.expect("First exchange should succeed.");

		assert!(tokens.refresh.is_some());
		assert!(backend.contains_key(&tokens.access.linked_key_id));

		let err = engine
			.exchange_code(&spec, grant.code.expose(), &credentials(), TEST_REDIRECT_URI)
			.await
			.expect_err("Replayed code should fail.");

		assert!(matches!(err, Error::InvalidGrant { .. }));
	}

	#[tokio::test]
	async fn wrong_redirect_does_not_burn_the_code() {
		let (engine, _) = build_test_engine();
		let spec = test_api_spec();
		let grant = mint_code(&engine, &spec).await;
		let err = engine
			.exchange_code(&spec, grant.code.expose(), &credentials(), "http://other.example.com")
			.await
			.expect_err("Mismatched redirect should fail.");

		assert!(matches!(err, Error::InvalidGrant { .. }));
		assert!(
			engine
				.exchange_code(&spec, grant.code.expose(), &credentials(), TEST_REDIRECT_URI)
				.await
				.is_ok()
		);
	}

	#[tokio::test]
	async fn failed_issuance_re_arms_the_code() {
		// The mint passes, then the key record write fails once.
		let (engine, _) = build_flaky_engine(FlakyStore::default().failing_sets(1, 1));
		let spec = test_api_spec();
		let grant = mint_code(&engine, &spec).await;
		let err = engine
			.exchange_code(&spec, grant.code.expose(), &credentials(), TEST_REDIRECT_URI)
			.await
			.expect_err("Exchange should fail while the store rejects writes.");

		assert!(matches!(err, Error::Storage(_)));
		assert!(
			engine
				.exchange_code(&spec, grant.code.expose(), &credentials(), TEST_REDIRECT_URI)
				.await
				.is_ok()
		);
	}

	#[tokio::test]
	async fn failed_re_arm_still_reports_the_issuance_failure() {
		let (engine, _) =
			build_flaky_engine(FlakyStore::default().failing_sets(1, 1).failing_swaps(1, 1));
		let spec = test_api_spec();
		let grant = mint_code(&engine, &spec).await;
		let err = engine
			.exchange_code(&spec, grant.code.expose(), &credentials(), TEST_REDIRECT_URI)
			.await
			.expect_err("Exchange should fail while the store rejects writes.");

		assert!(matches!(err, Error::Storage(_)));
		// The code stays consumed; the client has to restart the authorize flow.
		assert!(matches!(
			engine
				.exchange_code(&spec, grant.code.expose(), &credentials(), TEST_REDIRECT_URI)
				.await,
			Err(Error::InvalidGrant { .. })
		));
	}

	#[tokio::test]
	async fn bad_secret_and_unknown_codes_fail() {
		let (engine, _) = build_test_engine();
		let spec = test_api_spec();
		let grant = mint_code(&engine, &spec).await;

		assert!(matches!(
			engine
				.exchange_code(
					&spec,
					grant.code.expose(),
					&ClientCredentials::new(TEST_CLIENT_ID, "nope"),
					TEST_REDIRECT_URI,
				)
				.await,
			Err(Error::InvalidClient { .. })
		));
		assert!(matches!(
			engine.exchange_code(&spec, "missing", &credentials(), TEST_REDIRECT_URI).await,
			Err(Error::InvalidGrant { .. })
		));
	}

	#[tokio::test]
	async fn expired_codes_fail() {
		let (engine, _) = build_test_engine();
		let spec = test_api_spec();
		let grant = mint_code(&engine, &spec).await;
		let stale = AuthorizationGrant {
			issued_at: OffsetDateTime::now_utc() - Duration::minutes(5),
			..grant.clone()
		};
		let key = StoreKey::Grant(grant.code.expose()).to_string();

		engine.store.set_json(&key, &stale, None).await.expect("Store write should succeed.");

		assert!(matches!(
			engine
				.exchange_code(&spec, grant.code.expose(), &credentials(), TEST_REDIRECT_URI)
				.await,
			Err(Error::InvalidGrant { .. })
		));
	}

	#[tokio::test]
	async fn concurrent_exchanges_have_one_winner() {
		let (engine, _) = build_test_engine();
		let spec = Arc::new(test_api_spec());
		let grant = mint_code(&engine, &spec).await;
		let mut handles = Vec::new();

		for _ in 0..8 {
			let engine = engine.clone();
			let spec = spec.clone();
			let code = grant.code.expose().to_owned();

			handles.push(tokio::spawn(async move {
				engine.exchange_code(&spec, &code, &credentials(), TEST_REDIRECT_URI).await.is_ok()
			}));
		}

		let mut winners = 0;

		for handle in handles {
			if handle.await.expect("Exchange task should not panic.") {
				winners += 1;
			}
		}

		assert_eq!(winners, 1);
	}
}
