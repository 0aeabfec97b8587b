//! Redis-backed [`TokenStore`] shared by every gateway process pointing at the same server.

// crates.io
use redis::{AsyncCommands, Client, RedisError, Script, aio::ConnectionManager};
// self
use crate::{
	_prelude::*,
	store::{CompareAndSwapOutcome, StoreError, StoreFuture, TokenStore},
};

// Returns 0 when the key is missing, 1 on mismatch, 2 after swapping.
const COMPARE_AND_SWAP: &str = r#"
local current = redis.call('GET', KEYS[1])
if not current then
	return 0
end
if current ~= ARGV[1] then
	return 1
end
redis.call('SET', KEYS[1], ARGV[2], 'KEEPTTL')
return 2
"#;

/// Store speaking to Redis through a multiplexed, auto-reconnecting connection.
#[derive(Clone)]
pub struct RedisStore {
	conn: ConnectionManager,
	compare_and_swap: Arc<Script>,
}
impl RedisStore {
	/// Opens a connection manager for `redis_url` and verifies it with `PING`.
	pub async fn connect(redis_url: &str) -> Result<Self, StoreError> {
		let client = Client::open(redis_url).map_err(backend)?;
		let mut conn = ConnectionManager::new(client).await.map_err(backend)?;

		redis::cmd("PING").query_async::<String>(&mut conn).await.map_err(backend)?;

		Ok(Self::new(conn))
	}

	/// Wraps an existing connection manager.
	pub fn new(conn: ConnectionManager) -> Self {
		Self { conn, compare_and_swap: Arc::new(Script::new(COMPARE_AND_SWAP)) }
	}
}
impl Debug for RedisStore {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RedisStore").finish_non_exhaustive()
	}
}
impl TokenStore for RedisStore {
	fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>> {
		let mut conn = self.conn.clone();

		Box::pin(async move { conn.get::<_, Option<String>>(key).await.map_err(backend) })
	}

	fn set<'a>(
		&'a self,
		key: &'a str,
		value: String,
		ttl: Option<Duration>,
	) -> StoreFuture<'a, ()> {
		let mut conn = self.conn.clone();

		Box::pin(async move {
			match ttl {
				// Redis rejects non-positive expirations.
				Some(ttl) => conn
					.set_ex::<_, _, ()>(key, value, ttl.whole_seconds().max(1).unsigned_abs())
					.await
					.map_err(backend),
				None => conn.set::<_, _, ()>(key, value).await.map_err(backend),
			}
		})
	}

	fn delete<'a>(&'a self, key: &'a str) -> StoreFuture<'a, bool> {
		let mut conn = self.conn.clone();

		Box::pin(async move {
			let removed: i64 = conn.del(key).await.map_err(backend)?;

			Ok(removed > 0)
		})
	}

	fn take<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>> {
		let mut conn = self.conn.clone();

		Box::pin(async move {
			redis::cmd("GETDEL").arg(key).query_async::<Option<String>>(&mut conn).await.map_err(backend)
		})
	}

	fn compare_and_swap<'a>(
		&'a self,
		key: &'a str,
		expected: &'a str,
		replacement: String,
	) -> StoreFuture<'a, CompareAndSwapOutcome> {
		let mut conn = self.conn.clone();
		let script = self.compare_and_swap.clone();

		Box::pin(async move {
			let code: i64 = script
				.key(key)
				.arg(expected)
				.arg(replacement)
				.invoke_async(&mut conn)
				.await
				.map_err(backend)?;

			match code {
				2 => Ok(CompareAndSwapOutcome::Updated),
				1 => Ok(CompareAndSwapOutcome::Mismatch),
				0 => Ok(CompareAndSwapOutcome::Missing),
				other => Err(StoreError::Backend {
					message: format!("compare-and-swap script returned unexpected code {other}"),
				}),
			}
		})
	}
}

fn backend(e: RedisError) -> StoreError {
	#[cfg(feature = "tracing")]
	tracing::warn!(error = %e, "Redis call failed.");

	StoreError::Backend { message: e.to_string() }
}
