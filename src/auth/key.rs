//! Per-token key records carrying rate, quota, expiry, and policy state.

// self
use crate::{
	_prelude::*,
	auth::{ApiId, ClientId, OrgId, PolicyId},
};

/// API a key may reach, optionally narrowed to a set of versions.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessDefinition {
	/// Display name of the API.
	#[serde(default)]
	pub api_name: String,
	/// API identifier.
	pub api_id: ApiId,
	/// Allowed version names; empty allows every version.
	#[serde(default)]
	pub versions: Vec<String>,
}
impl AccessDefinition {
	/// Returns `true` if `version` is reachable under this definition.
	pub fn allows_version(&self, version: &str) -> bool {
		self.versions.is_empty() || self.versions.iter().any(|v| v == version)
	}
}

/// Key state mutated on every gated request.
///
/// The same shape doubles as the `key_rules` template posted over the trusted management
/// channel; missing fields fall back to [`KeyRecord::default`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyRecord {
	/// Organization owning the key.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub org_id: Option<OrgId>,
	/// Remaining token-bucket allowance; within `0..=rate`.
	pub allowance: f64,
	/// Requests admitted per `per` seconds.
	pub rate: f64,
	/// Rate window in seconds.
	pub per: f64,
	/// Unix time (fractional seconds) of the last admitted request.
	pub last_check: f64,
	/// Unix expiry; `0` never expires.
	pub expires: i64,
	/// Requests per quota window; `-1` disables quota enforcement.
	pub quota_max: i64,
	/// Requests left in the current quota window; never negative.
	pub quota_remaining: i64,
	/// Unix time at which the quota window renews.
	pub quota_renews: i64,
	/// Quota window length in seconds.
	pub quota_renewal_rate: i64,
	/// Policy bound to the key.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub apply_policy_id: Option<PolicyId>,
	/// APIs reachable with the key; empty allows every API.
	#[serde(skip_serializing_if = "BTreeMap::is_empty")]
	pub access_rights: BTreeMap<ApiId, AccessDefinition>,
	/// Client the key was issued to.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub oauth_client_id: Option<ClientId>,
}
impl KeyRecord {
	/// Sentinel for [`KeyRecord::quota_max`] disabling quota enforcement.
	pub const UNLIMITED_QUOTA: i64 = -1;

	/// Seeds a fresh record for a newly issued access token.
	///
	/// `template` supplies rate/quota/policy fields; its org and client bindings are replaced
	/// with the issuing ones, and `fallback_policy` applies only when the template names none.
	pub fn issue(
		template: KeyRecord,
		org_id: OrgId,
		client_id: ClientId,
		fallback_policy: Option<PolicyId>,
	) -> Self {
		let mut record = template;

		record.org_id = Some(org_id);
		record.oauth_client_id = Some(client_id);

		if record.apply_policy_id.is_none() {
			record.apply_policy_id = fallback_policy;
		}

		record.allowance = record.allowance.clamp(0., record.rate.max(0.));

		if record.quota_enabled() {
			record.quota_remaining = record.quota_remaining.max(0);
		}

		record
	}

	/// Carries bindings and quota counters into the record backing a rotated token; the rate
	/// bucket restarts full at `now`.
	pub fn rotated(&self, now: OffsetDateTime) -> Self {
		Self { allowance: self.rate.max(0.), last_check: unix_seconds(now), ..self.clone() }
	}

	/// Returns `true` when quota enforcement applies.
	pub fn quota_enabled(&self) -> bool {
		self.quota_max >= 0
	}

	/// Returns `true` if the key has a non-zero expiry that has passed.
	pub fn is_expired_at(&self, instant: OffsetDateTime) -> bool {
		self.expires != 0 && instant.unix_timestamp() >= self.expires
	}
}
impl Default for KeyRecord {
	fn default() -> Self {
		Self {
			org_id: None,
			allowance: 1_000.,
			rate: 1_000.,
			per: 1.,
			last_check: 0.,
			expires: 0,
			quota_max: Self::UNLIMITED_QUOTA,
			quota_remaining: 0,
			quota_renews: 0,
			quota_renewal_rate: 0,
			apply_policy_id: None,
			access_rights: BTreeMap::new(),
			oauth_client_id: None,
		}
	}
}

/// Unix time of `instant` with sub-second precision.
pub fn unix_seconds(instant: OffsetDateTime) -> f64 {
	instant.unix_timestamp() as f64 + f64::from(instant.nanosecond()) / 1_000_000_000.
}
