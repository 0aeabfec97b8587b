//! Request-authorization core for API gateways: an OAuth 2.0 grant engine with single-use codes and
//! refresh rotation, plus the ordered gate chain that decides whether each proxied call may reach
//! its upstream.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]
#![cfg_attr(test, allow(unused_crate_dependencies))]

pub mod auth;
pub mod chain;
pub mod config;
pub mod error;
pub mod flows;
pub mod limit;
pub mod obs;
#[cfg(feature = "axum")] pub mod server;
pub mod store;
#[cfg(any(test, feature = "test"))]
pub mod _preludet {
	//! Convenience re-exports and fixtures for integration tests; enabled via `cfg(test)` or the
	//! `test` crate feature.

	pub use crate::_prelude::*;

	// self
	use crate::{
		auth::{ClientApplication, ClientId, GrantType, KeyRecord},
		chain::{AuthorizationChain, Policy, StaticPolicies},
		config::{ApiRegistry, ApiSpec, GatewayConfig, RegistryHandle},
		flows::GrantEngine,
		limit::RateQuotaEnforcer,
		store::{FlakyStore, MemoryStore, TokenStore},
	};

	/// Client identifier registered on [`test_api_spec`].
	pub const TEST_CLIENT_ID: &str = "1234";
	/// Plain-text secret of [`TEST_CLIENT_ID`].
	pub const TEST_CLIENT_SECRET: &str = "aabbccdd";
	/// Redirect URI registered for [`TEST_CLIENT_ID`].
	pub const TEST_REDIRECT_URI: &str = "http://client.oauth.com";
	/// Policy bound to [`TEST_CLIENT_ID`].
	pub const TEST_CLIENT_POLICY: &str = "TEST-4321";
	/// Shared management secret used by [`test_gateway_config`].
	pub const TEST_MANAGEMENT_SECRET: &str = "352d20ee67be67f6340b4c0605b044b7";

	/// Tyk-style API definition with OAuth enabled, used across tests.
	pub const TEST_API_DEFINITION: &str = r#"{
		"name": "OAUTH Test API",
		"api_id": "999999",
		"org_id": "default",
		"definition": { "location": "header", "key": "version" },
		"auth": { "auth_header_name": "authorization" },
		"use_oauth2": true,
		"oauth_meta": {
			"allowed_access_types": ["authorization_code", "refresh_token"],
			"allowed_authorize_types": ["code", "token"],
			"auth_login_redirect": "http://login.example.com/authorize"
		},
		"version_data": {
			"not_versioned": true,
			"versions": {
				"Default": { "name": "Default", "expires": "3000-01-02 15:04" }
			}
		},
		"proxy": {
			"listen_path": "/APIID/",
			"target_url": "http://upstream.example.com",
			"strip_listen_path": false
		}
	}"#;

	/// Key rules matching the template posted by management tooling: one request per second,
	/// quota disabled.
	pub const TEST_KEY_RULES: &str = r#"{
		"last_check": 1402492859,
		"org_id": "53ac07777cbb8c2d53000002",
		"allowance": 0,
		"rate": 1,
		"per": 1,
		"expires": 0,
		"quota_max": -1,
		"quota_renews": 1399567002,
		"quota_remaining": 10,
		"quota_renewal_rate": 300
	}"#;

	/// Builds the confidential client registered on the test API.
	pub fn test_client() -> ClientApplication {
		ClientApplication::new(
			ClientId::new(TEST_CLIENT_ID).expect("Client fixture identifier should be valid."),
			TEST_CLIENT_SECRET,
			TEST_REDIRECT_URI,
		)
		.with_grant_types([GrantType::AuthorizationCode, GrantType::Implicit, GrantType::RefreshToken])
		.with_policy(TEST_CLIENT_POLICY.parse().expect("Client policy fixture should be valid."))
	}

	/// Parses [`TEST_API_DEFINITION`] and registers [`test_client`] on it.
	pub fn test_api_spec() -> ApiSpec {
		let mut spec = ApiSpec::from_json_str(TEST_API_DEFINITION)
			.expect("Test API definition should parse successfully.");

		spec.oauth_clients.push(test_client());

		spec
	}

	/// Parses [`TEST_KEY_RULES`].
	pub fn test_key_rules() -> KeyRecord {
		serde_json::from_str(TEST_KEY_RULES).expect("Key rules fixture should parse successfully.")
	}

	/// Gateway configuration that trusts [`TEST_MANAGEMENT_SECRET`].
	pub fn test_gateway_config() -> GatewayConfig {
		GatewayConfig::new(TEST_MANAGEMENT_SECRET)
	}

	/// Registry handle holding only [`test_api_spec`].
	pub fn test_registry() -> RegistryHandle {
		RegistryHandle::new(
			ApiRegistry::build([test_api_spec()]).expect("Test registry should build successfully."),
		)
	}

	/// Constructs a [`GrantEngine`] over a fresh in-memory store.
	pub fn build_test_engine() -> (GrantEngine, Arc<MemoryStore>) {
		let store_backend = Arc::new(MemoryStore::default());
		let store: Arc<dyn TokenStore> = store_backend.clone();
		let engine = GrantEngine::new(store, test_gateway_config().oauth);

		(engine, store_backend)
	}

	/// Constructs a [`GrantEngine`] over `store`, returning the store for inspection.
	pub fn build_flaky_engine(store: FlakyStore) -> (GrantEngine, Arc<FlakyStore>) {
		let store_backend = Arc::new(store);
		let store: Arc<dyn TokenStore> = store_backend.clone();
		let engine = GrantEngine::new(store, test_gateway_config().oauth);

		(engine, store_backend)
	}

	/// Policy table granting [`TEST_CLIENT_POLICY`] the default version of the test API.
	pub fn test_policies() -> StaticPolicies {
		StaticPolicies::from_policies([Policy::new(
			TEST_CLIENT_POLICY.parse().expect("Client policy fixture should be valid."),
		)
		.allow_api(test_api_spec().api_id, ["Default"])])
	}

	/// Constructs the standard chain bound to `engine`'s store and [`test_policies`].
	pub fn build_test_chain(engine: &GrantEngine) -> AuthorizationChain {
		AuthorizationChain::standard(
			engine.clone(),
			RateQuotaEnforcer::new(engine.store.clone()),
			Arc::new(test_policies()),
		)
	}

	/// Router state over a fresh in-memory store, answering passed requests with
	/// [`EchoDispatcher`](crate::server::EchoDispatcher).
	#[cfg(feature = "axum")]
	pub fn build_test_state() -> (crate::server::GatewayState, Arc<MemoryStore>) {
		let (engine, store) = build_test_engine();
		let chain = build_test_chain(&engine);
		let state = crate::server::GatewayState {
			engine,
			chain,
			registry: test_registry(),
			config: Arc::new(test_gateway_config()),
			dispatcher: Arc::new(crate::server::EchoDispatcher),
		};

		(state, store)
	}
}

mod _prelude {
	pub use std::{
		collections::{BTreeMap, BTreeSet, HashMap},
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use parking_lot::RwLock;
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

pub use oauth2;
pub use url;
