//! Rate-limit and quota enforcement over the counters embedded in a key record.
//!
//! Each check is a read-modify-write committed with [`TokenStore::compare_and_swap`]: a lost
//! race re-reads and re-evaluates, so concurrent requests against one key never admit more than
//! the bucket or quota allows. A rejected request commits nothing.

// self
use crate::{
	_prelude::*,
	auth::{KeyRecord, unix_seconds},
	store::{self, CompareAndSwapOutcome, StoreError, StoreKey, TokenStore},
};

/// Verdict of evaluating one request against a key record.
#[derive(Clone, Debug, PartialEq)]
pub enum LimitDecision {
	/// Admitted; carries the record to commit.
	Admit(KeyRecord),
	/// Token bucket is empty.
	RateLimited {
		/// Time until one unit of allowance refills.
		retry_after: Duration,
	},
	/// Quota window is used up.
	QuotaExhausted,
}

/// Evaluates rate then quota for one request at `now` without touching storage.
pub fn evaluate(record: &KeyRecord, now: OffsetDateTime) -> LimitDecision {
	let now_secs = unix_seconds(now);
	let elapsed = (now_secs - record.last_check).max(0.);
	let rate = record.rate.max(0.);
	let refill = if record.per > 0. { elapsed * rate / record.per } else { rate };
	let allowance = (record.allowance + refill).min(rate).max(0.);

	if allowance < 1. {
		// Hints beyond `Duration::MAX` saturate.
		let retry_after = if rate > 0. && record.per > 0. {
			Duration::saturating_seconds_f64((1. - allowance) * record.per / rate)
		} else {
			Duration::saturating_seconds_f64(record.per.max(1.))
		};

		return LimitDecision::RateLimited { retry_after };
	}

	let mut admitted = KeyRecord { allowance: allowance - 1., last_check: now_secs, ..record.clone() };

	if record.quota_enabled() {
		let now_unix = now.unix_timestamp();

		if now_unix >= admitted.quota_renews {
			admitted.quota_remaining = admitted.quota_max;
			admitted.quota_renews = now_unix + admitted.quota_renewal_rate;
		}
		if admitted.quota_remaining <= 0 {
			return LimitDecision::QuotaExhausted;
		}

		admitted.quota_remaining -= 1;
	}

	LimitDecision::Admit(admitted)
}

/// Applies [`evaluate`] atomically against stored key records.
#[derive(Clone)]
pub struct RateQuotaEnforcer {
	store: Arc<dyn TokenStore>,
}
impl RateQuotaEnforcer {
	/// Compare-and-swap attempts before a check gives up with [`StoreError::Contention`].
	pub const MAX_ATTEMPTS: u32 = 64;

	/// Creates an enforcer over `store`.
	pub fn new(store: Arc<dyn TokenStore>) -> Self {
		Self { store }
	}

	/// Checks and charges one request for `access_token` at the current time.
	pub async fn check(&self, access_token: &str) -> Result<KeyRecord> {
		self.check_at(access_token, OffsetDateTime::now_utc()).await
	}

	/// Checks and charges one request for `access_token` at `now`.
	///
	/// Fails [`Error::TooManyRequests`] on rate exhaustion, [`Error::Forbidden`] on quota
	/// exhaustion, and [`Error::NotFound`] if the key record is gone.
	pub async fn check_at(&self, access_token: &str, now: OffsetDateTime) -> Result<KeyRecord> {
		let key = StoreKey::KeyRecord(access_token).to_string();

		for _ in 0..Self::MAX_ATTEMPTS {
			let raw =
				self.store.get(&key).await?.ok_or_else(|| Error::not_found("Key not authorised"))?;
			let record: KeyRecord = store::decode(&raw)?;
			let admitted = match evaluate(&record, now) {
				LimitDecision::Admit(admitted) => admitted,
				LimitDecision::RateLimited { retry_after } =>
					return Err(Error::TooManyRequests { retry_after }),
				LimitDecision::QuotaExhausted => return Err(Error::forbidden("Quota exceeded")),
			};

			match self.store.compare_and_swap(&key, &raw, store::encode(&admitted)?).await? {
				CompareAndSwapOutcome::Updated => return Ok(admitted),
				CompareAndSwapOutcome::Mismatch => continue,
				CompareAndSwapOutcome::Missing => return Err(Error::not_found("Key not authorised")),
			}
		}

		Err(StoreError::Contention { key, attempts: Self::MAX_ATTEMPTS }.into())
	}
}
impl Debug for RateQuotaEnforcer {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RateQuotaEnforcer").finish_non_exhaustive()
	}
}
