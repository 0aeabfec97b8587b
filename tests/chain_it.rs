// crates.io
use http::{HeaderMap, HeaderValue, StatusCode, Uri};
use time::macros;
// self
use gateway_auth::{
	_preludet::*,
	auth::{KeyRecord, TrustedCaller},
	chain::{Abort, AuthorizationChain, Gate, GateContext, GateOutcome, Policy, StaticPolicies},
	flows::{AuthorizeOutcome, AuthorizeRequest, GrantEngine},
	limit::RateQuotaEnforcer,
	store::{FailingStore, TokenStore},
};

const NOW: OffsetDateTime = macros::datetime!(2025-06-01 12:00 UTC);

async fn issue_access_token(engine: &GrantEngine, rules: KeyRecord) -> String {
	let outcome = engine
		.authorize_trusted(
			&TrustedCaller::for_tests(),
			&test_api_spec(),
			AuthorizeRequest::new("token", TEST_CLIENT_ID, TEST_REDIRECT_URI),
			Some(rules),
		)
		.await
		.expect("Trusted token issuance should succeed.");
	let AuthorizeOutcome::Tokens(tokens) = outcome else {
		panic!("Trusted token issuance should return tokens.");
	};

	tokens.access.value.expose().to_owned()
}

fn request(token: Option<&str>, now: OffsetDateTime) -> GateContext {
	let mut headers = HeaderMap::new();

	if let Some(token) = token {
		headers.insert(
			"authorization",
			HeaderValue::from_str(&format!("Bearer {token}"))
				.expect("Bearer header fixture should be valid."),
		);
	}

	GateContext::new(Arc::new(test_api_spec()), headers, &Uri::from_static("/APIID/users/1"))
		.at(now)
}

fn expect_abort(outcome: GateOutcome) -> Abort {
	match outcome {
		GateOutcome::Abort(abort) => abort,
		GateOutcome::Continue(ctx) => panic!("Chain should abort, but continued with {ctx:?}."),
	}
}

fn expect_continue(outcome: GateOutcome) -> GateContext {
	match outcome {
		GateOutcome::Continue(ctx) => ctx,
		GateOutcome::Abort(abort) => panic!("Chain should continue, but aborted with {abort:?}."),
	}
}

#[tokio::test]
async fn missing_and_unknown_keys_are_unauthorized() {
	let (engine, _) = build_test_engine();
	let chain = build_test_chain(&engine);
	let abort = expect_abort(chain.run(request(None, NOW)).await);

	assert_eq!(abort.gate, Gate::KeyExists);
	assert_eq!(abort.status, StatusCode::UNAUTHORIZED);
	assert_eq!(abort.message, "Authorization field missing");

	let abort = expect_abort(chain.run(request(Some("not-a-key"), NOW)).await);

	assert_eq!(abort.status, StatusCode::UNAUTHORIZED);
	assert_eq!(abort.message, "Key not authorised");
}

#[tokio::test]
async fn passing_requests_carry_version_and_charged_key() {
	let (engine, _) = build_test_engine();
	let chain = build_test_chain(&engine);
	let rules = KeyRecord {
		quota_max: 10,
		quota_remaining: 10,
		quota_renewal_rate: 300,
		..test_key_rules()
	};
	let token = issue_access_token(&engine, rules).await;
	let ctx = expect_continue(chain.run(request(Some(&token), NOW)).await);
	let key = ctx.key.expect("Passed context should carry the key record.");

	assert_eq!(ctx.version.as_deref(), Some("Default"));
	assert_eq!(ctx.access_token.as_deref(), Some(token.as_str()));
	assert_eq!(ctx.path, "users/1");
	assert_eq!(key.quota_remaining, 9);
	assert_eq!(key.apply_policy_id.map(|id| id.to_string()).as_deref(), Some(TEST_CLIENT_POLICY));
}

#[tokio::test]
async fn one_request_per_second_limits_the_second_call() {
	let (engine, _) = build_test_engine();
	let chain = build_test_chain(&engine);
	let token = issue_access_token(&engine, test_key_rules()).await;

	expect_continue(chain.run(request(Some(&token), NOW)).await);

	let abort = expect_abort(chain.run(request(Some(&token), NOW)).await);

	assert_eq!(abort.gate, Gate::RateLimitAndQuota);
	assert_eq!(abort.status, StatusCode::TOO_MANY_REQUESTS);
	assert!(abort.retry_after.is_some_and(|retry_after| retry_after > Duration::ZERO));

	expect_continue(chain.run(request(Some(&token), NOW + Duration::seconds(1))).await);
}

#[tokio::test]
async fn exhausted_quota_is_forbidden_until_renewal() {
	let (engine, _) = build_test_engine();
	let chain = build_test_chain(&engine);
	let renews = NOW + Duration::seconds(300);
	let rules = KeyRecord {
		allowance: 100.,
		rate: 100.,
		per: 1.,
		quota_max: 10,
		quota_remaining: 10,
		quota_renews: renews.unix_timestamp(),
		quota_renewal_rate: 300,
		..KeyRecord::default()
	};
	let token = issue_access_token(&engine, rules).await;

	for _ in 0..10 {
		expect_continue(chain.run(request(Some(&token), NOW)).await);
	}

	let abort = expect_abort(chain.run(request(Some(&token), NOW)).await);

	assert_eq!(abort.gate, Gate::RateLimitAndQuota);
	assert_eq!(abort.status, StatusCode::FORBIDDEN);
	assert_eq!(abort.message, "Quota exceeded");

	let ctx = expect_continue(chain.run(request(Some(&token), renews)).await);

	assert_eq!(ctx.key.map(|key| key.quota_remaining), Some(9));
}

#[tokio::test]
async fn expired_keys_are_rejected() {
	let (engine, _) = build_test_engine();
	let chain = build_test_chain(&engine);
	let rules =
		KeyRecord { expires: (NOW - Duration::minutes(1)).unix_timestamp(), ..test_key_rules() };
	let token = issue_access_token(&engine, rules).await;
	let abort = expect_abort(chain.run(request(Some(&token), NOW)).await);

	assert_eq!(abort.gate, Gate::KeyExpired);
	assert_eq!(abort.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn policies_bound_to_other_versions_or_unknown_ids_are_forbidden() {
	let (engine, _) = build_test_engine();
	let narrow = StaticPolicies::from_policies([Policy::new(
		TEST_CLIENT_POLICY.parse().expect("Client policy fixture should be valid."),
	)
	.allow_api(test_api_spec().api_id, ["v2"])]);
	let chain = AuthorizationChain::standard(
		engine.clone(),
		RateQuotaEnforcer::new(engine.store.clone()),
		Arc::new(narrow),
	);
	let token = issue_access_token(&engine, test_key_rules()).await;
	let abort = expect_abort(chain.run(request(Some(&token), NOW)).await);

	assert_eq!(abort.gate, Gate::AccessRights);
	assert_eq!(abort.status, StatusCode::FORBIDDEN);

	let chain = build_test_chain(&engine);
	let rules = KeyRecord {
		apply_policy_id: Some("missing-policy".parse().expect("Policy fixture should be valid.")),
		..test_key_rules()
	};
	let token = issue_access_token(&engine, rules).await;
	let abort = expect_abort(chain.run(request(Some(&token), NOW)).await);

	assert_eq!(abort.gate, Gate::AccessRights);
	assert_eq!(abort.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn rejected_requests_leave_counters_untouched() {
	let (engine, _) = build_test_engine();
	let chain = build_test_chain(&engine);
	let token = issue_access_token(&engine, test_key_rules()).await;

	expect_continue(chain.run(request(Some(&token), NOW)).await);

	let before = engine.validate_access_token(&token).await.expect("Key should still exist.");

	expect_abort(chain.run(request(Some(&token), NOW)).await);

	let after = engine.validate_access_token(&token).await.expect("Key should still exist.");

	assert_eq!(before, after);
}

#[tokio::test]
async fn storage_outages_fail_closed() {
	let store: Arc<dyn TokenStore> = Arc::new(FailingStore);
	let engine = GrantEngine::new(store, test_gateway_config().oauth);
	let chain = build_test_chain(&engine);
	let abort = expect_abort(chain.run(request(Some("any-token"), NOW)).await);

	assert_eq!(abort.gate, Gate::KeyExists);
	assert!(abort.status.is_server_error());
	assert_eq!(abort.message, "Internal server error.");
}
