//! Revocation of a refresh token together with its access token and key record.

// self
use crate::{
	_prelude::*,
	auth::{RefreshToken, TrustedCaller},
	config::ApiSpec,
	flows::GrantEngine,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	store::StoreKey,
};

/// Result of [`GrantEngine::revoke_refresh`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevokeOutcome {
	/// The refresh token and its linked key record were removed.
	Deleted,
	/// Nothing live was stored under the token for this API.
	NotFound,
}

impl GrantEngine {
	/// Revokes `refresh_token` for the API, destroying its linked access token and key record.
	///
	/// Idempotent: revoking an unknown, rotated, or already revoked token reports
	/// [`RevokeOutcome::NotFound`]. If the key record cannot be deleted the refresh token is put
	/// back, so a failed revocation can be retried.
	pub async fn revoke_refresh(
		&self,
		_caller: &TrustedCaller,
		spec: &ApiSpec,
		refresh_token: &str,
	) -> Result<RevokeOutcome> {
		const KIND: FlowKind = FlowKind::Revoke;

		let span = FlowSpan::new(KIND, "revoke_refresh");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async move {
				let refresh_key = StoreKey::Refresh(refresh_token).to_string();
				let Some(presented) = self.store.get_json::<RefreshToken>(&refresh_key).await?
				else {
					return Ok(RevokeOutcome::NotFound);
				};

				if presented.api_id != spec.api_id {
					return Ok(RevokeOutcome::NotFound);
				}
				// Removal settles races with concurrent rotations and revocations.
				if self.store.take(&refresh_key).await?.is_none() {
					return Ok(RevokeOutcome::NotFound);
				}

				let key = StoreKey::KeyRecord(presented.linked_access_token.expose()).to_string();

				if let Err(e) = self.store.delete(&key).await {
					self.restore_refresh(&refresh_key, &presented, OffsetDateTime::now_utc()).await;

					return Err(e.into());
				}

				Ok(RevokeOutcome::Deleted)
			})
			.await;

		obs::finish_flow(KIND, &result);

		result
	}
}
