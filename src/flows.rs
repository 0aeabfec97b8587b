//! OAuth 2.0 grant engine: authorize, code exchange, refresh rotation, revocation, and token
//! validation.
//!
//! Every single-use transition (code consumption, refresh rotation, revocation) is a conditional
//! store operation, never an in-process lock, so the guarantees hold when several gateway
//! processes share one [`TokenStore`].

pub mod authorize;
pub mod common;
pub mod exchange;
pub mod refresh;
pub mod revoke;

pub use authorize::*;
pub use common::*;
pub use refresh::*;
pub use revoke::*;

// self
use crate::{
	_prelude::*,
	auth::KeyRecord,
	config::OAuthSettings,
	store::{StoreKey, TokenStore},
};

/// Coordinates grant flows against one token store.
///
/// Cloning is cheap; clones share the store, settings, and refresh counters.
#[derive(Clone)]
pub struct GrantEngine {
	/// Store holding codes, refresh tokens, and key records.
	pub store: Arc<dyn TokenStore>,
	/// Lifetimes and issuance defaults.
	pub settings: Arc<OAuthSettings>,
	/// Shared counters for refresh outcomes.
	pub refresh_metrics: Arc<RefreshMetrics>,
}
impl GrantEngine {
	/// Creates an engine over `store`.
	pub fn new(store: Arc<dyn TokenStore>, settings: OAuthSettings) -> Self {
		Self { store, settings: Arc::new(settings), refresh_metrics: Default::default() }
	}

	/// Resolves the key record backing `access_token`.
	///
	/// Read-only; unknown, expired-by-TTL, and revoked tokens all fail [`Error::NotFound`].
	pub async fn validate_access_token(&self, access_token: &str) -> Result<KeyRecord> {
		if access_token.is_empty() {
			return Err(Error::not_found("Key not authorised"));
		}

		let key = StoreKey::KeyRecord(access_token).to_string();

		self.store
			.get_json::<KeyRecord>(&key)
			.await?
			.ok_or_else(|| Error::not_found("Key not authorised"))
	}
}
impl Debug for GrantEngine {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("GrantEngine")
			.field("settings", &self.settings)
			.field("refresh_metrics", &self.refresh_metrics)
			.finish_non_exhaustive()
	}
}
