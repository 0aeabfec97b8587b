//! Refresh token rotation.
//!
//! The presented token is read and checked against the calling client, then removed with
//! [`TokenStore::take`](crate::store::TokenStore::take) before anything is issued: the first
//! caller to remove it wins and every concurrent or later presentation of the same value fails
//! `invalid_grant`. A foreign client never removes it. The replacement key record inherits the
//! predecessor's bindings and quota counters, the predecessor's record is deleted, and the new
//! refresh token is itself refreshable.

mod metrics;

pub use metrics::{RefreshCounts, RefreshMetrics};

// self
use crate::{
	_prelude::*,
	auth::{ClientApplication, GrantType, IssuedTokens, KeyRecord, RefreshToken},
	config::ApiSpec,
	flows::{
		ClientCredentials, GrantEngine, Issuance,
		common::{
			authenticate_client, ensure_access_type, ensure_client_grant, ensure_oauth_enabled,
		},
	},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	store::StoreKey,
};

impl GrantEngine {
	/// Rotates `refresh_token` into a new access/refresh pair.
	pub async fn refresh_token(
		&self,
		spec: &ApiSpec,
		refresh_token: &str,
		credentials: &ClientCredentials,
	) -> Result<IssuedTokens> {
		const KIND: FlowKind = FlowKind::Refresh;

		let span = FlowSpan::new(KIND, "refresh_token");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async move {
				self.refresh_metrics.record_attempt();

				let result = self.rotate(spec, refresh_token, credentials).await;

				self.refresh_metrics.record_outcome(&result);

				result
			})
			.await;

		obs::finish_flow(KIND, &result);

		result
	}

	async fn rotate(
		&self,
		spec: &ApiSpec,
		refresh_token: &str,
		credentials: &ClientCredentials,
	) -> Result<IssuedTokens> {
		ensure_oauth_enabled(spec)?;
		ensure_access_type(spec, GrantType::RefreshToken)?;

		let client = authenticate_client(spec, credentials)?;

		ensure_client_grant(client, GrantType::RefreshToken)?;

		if refresh_token.is_empty() {
			return Err(Error::invalid_request("refresh_token is required"));
		}

		let store = self.store.as_ref();
		let refresh_key = StoreKey::Refresh(refresh_token).to_string();
		let Some(presented) = store.get_json::<RefreshToken>(&refresh_key).await? else {
			return Err(self.replayed());
		};

		if presented.api_id != spec.api_id || presented.client_id != client.client_id {
			return Err(Error::invalid_grant("refresh token was issued to another client"));
		}
		if store.take(&refresh_key).await?.is_none() {
			return Err(self.replayed());
		}

		let now = OffsetDateTime::now_utc();
		let old_key = StoreKey::KeyRecord(presented.linked_access_token.expose()).to_string();
		let record = match store.get_json::<KeyRecord>(&old_key).await {
			Ok(record) => record,
			Err(e) => {
				self.restore_refresh(&refresh_key, &presented, now).await;

				return Err(e.into());
			},
		};
		let record = self.successor_record(spec, client, &presented, record, now);
		let issued = self
			.issue_tokens(
				Issuance {
					spec,
					client,
					record,
					scope: presented.scope.clone(),
					with_refresh: true,
				},
				now,
			)
			.await;

		match issued {
			Ok(issued) => {
				// The rotation is committed; a stale record left behind still expires by TTL.
				if let Err(_e) = store.delete(&old_key).await {
					#[cfg(feature = "tracing")]
					tracing::warn!(
						error = %_e,
						key = %presented.linked_access_token,
						"Failed to delete the rotated key record."
					);
				}

				Ok(issued)
			},
			Err(e) => {
				self.restore_refresh(&refresh_key, &presented, now).await;

				Err(e)
			},
		}
	}

	fn successor_record(
		&self,
		spec: &ApiSpec,
		client: &ClientApplication,
		presented: &RefreshToken,
		previous: Option<KeyRecord>,
		now: OffsetDateTime,
	) -> KeyRecord {
		match previous {
			Some(previous) => previous.rotated(now),
			None => {
				// The access token outlived its key record; re-seed with the original policy.
				let mut record = self.seed_key_record(spec, client, None);

				if presented.policy_id.is_some() {
					record.apply_policy_id = presented.policy_id.clone();
				}

				record
			},
		}
	}

	fn replayed(&self) -> Error {
		self.refresh_metrics.record_replay();

		Error::invalid_grant("refresh token is unknown, rotated, or revoked")
	}
}
