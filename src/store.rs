//! Storage contract shared by grant flows and the rate/quota enforcer, plus built-in backends.
//!
//! Every cross-request invariant (single-use codes, single-use refresh tokens, non-negative
//! counters) is expressed through [`TokenStore::take`] and [`TokenStore::compare_and_swap`]
//! so the guarantees hold when several gateway processes share one backend.

pub mod memory;
#[cfg(feature = "redis")] pub mod redis;

pub use memory::MemoryStore;
#[cfg(any(test, feature = "test"))] pub use memory::{FailingStore, FlakyStore};
#[cfg(feature = "redis")] pub use redis::RedisStore;

// crates.io
use serde::de::DeserializeOwned;
// self
use crate::_prelude::*;

/// Boxed future returned by [`TokenStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Key-value backend with per-key TTL and single-key atomic primitives.
pub trait TokenStore
where
	Self: Send + Sync,
{
	/// Fetches the value stored under `key`, if present and unexpired.
	fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>>;

	/// Stores `value` under `key`, replacing any previous value; `ttl` of `None` never expires.
	fn set<'a>(
		&'a self,
		key: &'a str,
		value: String,
		ttl: Option<Duration>,
	) -> StoreFuture<'a, ()>;

	/// Removes `key`, returning `true` if a live value was deleted.
	fn delete<'a>(&'a self, key: &'a str) -> StoreFuture<'a, bool>;

	/// Atomically reads and removes `key`; of concurrent callers at most one observes the value.
	fn take<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>>;

	/// Replaces the value under `key` only if it still equals `expected`; the remaining TTL is
	/// preserved.
	fn compare_and_swap<'a>(
		&'a self,
		key: &'a str,
		expected: &'a str,
		replacement: String,
	) -> StoreFuture<'a, CompareAndSwapOutcome>;
}
impl dyn TokenStore {
	/// Fetches and decodes a JSON value.
	pub async fn get_json<T>(&self, key: &str) -> Result<Option<T>, StoreError>
	where
		T: DeserializeOwned,
	{
		match self.get(key).await? {
			Some(raw) => decode(&raw).map(Some),
			None => Ok(None),
		}
	}

	/// Encodes `value` as JSON and stores it.
	pub fn set_json<'a, T>(
		&'a self,
		key: &'a str,
		value: &T,
		ttl: Option<Duration>,
	) -> StoreFuture<'a, ()>
	where
		T: Serialize,
	{
		match encode(value) {
			Ok(raw) => self.set(key, raw, ttl),
			Err(e) => Box::pin(async move { Err(e) }),
		}
	}
}

/// Result of a [`TokenStore::compare_and_swap`] attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareAndSwapOutcome {
	/// The stored value matched and was replaced.
	Updated,
	/// The key exists but holds a different value.
	Mismatch,
	/// No live value is stored under the key.
	Missing,
}

/// Error type produced by [`TokenStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Stored payload could not be encoded or decoded.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
	/// A conditional update kept losing races and gave up.
	#[error("Conditional update on `{key}` did not settle after {attempts} attempts.")]
	Contention {
		/// Store key under contention.
		key: String,
		/// Attempts made before giving up.
		attempts: u32,
	},
}

/// Namespaced key under which a record is stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StoreKey<'a> {
	/// Key record backing an access token.
	KeyRecord(&'a str),
	/// Authorization code.
	Grant(&'a str),
	/// Refresh token.
	Refresh(&'a str),
}
impl Display for StoreKey<'_> {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		match self {
			StoreKey::KeyRecord(token) => write!(f, "apikey-{token}"),
			StoreKey::Grant(code) => write!(f, "oauth-authcode.{code}"),
			StoreKey::Refresh(token) => write!(f, "oauth-refresh.{token}"),
		}
	}
}

pub(crate) fn encode<T>(value: &T) -> Result<String, StoreError>
where
	T: ?Sized + Serialize,
{
	serde_json::to_string(value).map_err(|e| StoreError::Serialization { message: e.to_string() })
}

pub(crate) fn decode<T>(raw: &str) -> Result<T, StoreError>
where
	T: DeserializeOwned,
{
	serde_json::from_str(raw).map_err(|e| StoreError::Serialization { message: e.to_string() })
}

#[cfg(test)]
mod tests {
	// std
	use std::error::Error as StdError;
	// self
	use super::*;

	#[test]
	fn store_error_converts_into_gateway_error_with_source() {
		let store_error = StoreError::Backend { message: "database unreachable".into() };
		let gateway_error: Error = store_error.clone().into();

		assert!(matches!(gateway_error, Error::Storage(_)));
		assert!(gateway_error.to_string().contains("database unreachable"));

		let source = StdError::source(&gateway_error)
			.expect("Gateway error should expose the original store error as its source.");

		assert_eq!(source.to_string(), store_error.to_string());
	}

	#[test]
	fn store_keys_use_namespaced_prefixes() {
		assert_eq!(StoreKey::KeyRecord("abc").to_string(), "apikey-abc");
		assert_eq!(StoreKey::Grant("abc").to_string(), "oauth-authcode.abc");
		assert_eq!(StoreKey::Refresh("abc").to_string(), "oauth-refresh.abc");
	}

	#[test]
	fn decode_failures_surface_as_serialization_errors() {
		let err = decode::<BTreeMap<String, i64>>("not json")
			.expect_err("Garbage payload should fail to decode.");

		assert!(matches!(err, StoreError::Serialization { .. }));
	}
}
