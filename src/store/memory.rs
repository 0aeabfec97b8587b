//! Thread-safe in-memory [`TokenStore`] implementation for single-process gateways and tests.

// std
#[cfg(any(test, feature = "test"))] use std::sync::atomic::{AtomicUsize, Ordering};
// self
use crate::{
	_prelude::*,
	store::{CompareAndSwapOutcome, StoreFuture, TokenStore},
};

type StoreMap = Arc<RwLock<HashMap<String, Entry>>>;

#[derive(Clone, Debug)]
struct Entry {
	value: String,
	expires_at: Option<OffsetDateTime>,
}
impl Entry {
	fn is_live_at(&self, instant: OffsetDateTime) -> bool {
		self.expires_at.is_none_or(|expires_at| instant < expires_at)
	}
}

/// Storage backend that keeps values in-process; expired entries are purged lazily.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore(StoreMap);
impl MemoryStore {
	/// Number of live entries.
	pub fn len(&self) -> usize {
		let now = OffsetDateTime::now_utc();

		self.0.read().values().filter(|entry| entry.is_live_at(now)).count()
	}

	/// Returns `true` when no live entries remain.
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Returns `true` if a live value is stored under `key`.
	pub fn contains_key(&self, key: &str) -> bool {
		Self::get_now(&self.0, key).is_some()
	}

	fn get_now(map: &StoreMap, key: &str) -> Option<String> {
		let now = OffsetDateTime::now_utc();

		map.read().get(key).filter(|entry| entry.is_live_at(now)).map(|entry| entry.value.clone())
	}

	fn set_now(map: &StoreMap, key: &str, value: String, ttl: Option<Duration>) {
		let expires_at = ttl.map(|ttl| OffsetDateTime::now_utc() + ttl);

		map.write().insert(key.to_owned(), Entry { value, expires_at });
	}

	fn take_now(map: &StoreMap, key: &str) -> Option<String> {
		let now = OffsetDateTime::now_utc();

		map.write().remove(key).filter(|entry| entry.is_live_at(now)).map(|entry| entry.value)
	}

	fn cas_now(
		map: &StoreMap,
		key: &str,
		expected: &str,
		replacement: String,
	) -> CompareAndSwapOutcome {
		let now = OffsetDateTime::now_utc();
		let mut guard = map.write();

		if guard.get(key).is_some_and(|entry| !entry.is_live_at(now)) {
			guard.remove(key);
		}

		match guard.get_mut(key) {
			Some(entry) if entry.value == expected => {
				entry.value = replacement;

				CompareAndSwapOutcome::Updated
			},
			Some(_) => CompareAndSwapOutcome::Mismatch,
			None => CompareAndSwapOutcome::Missing,
		}
	}
}
impl TokenStore for MemoryStore {
	fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>> {
		Box::pin(async move { Ok(Self::get_now(&self.0, key)) })
	}

	fn set<'a>(
		&'a self,
		key: &'a str,
		value: String,
		ttl: Option<Duration>,
	) -> StoreFuture<'a, ()> {
		Box::pin(async move {
			Self::set_now(&self.0, key, value, ttl);

			Ok(())
		})
	}

	fn delete<'a>(&'a self, key: &'a str) -> StoreFuture<'a, bool> {
		Box::pin(async move { Ok(Self::take_now(&self.0, key).is_some()) })
	}

	fn take<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>> {
		Box::pin(async move { Ok(Self::take_now(&self.0, key)) })
	}

	fn compare_and_swap<'a>(
		&'a self,
		key: &'a str,
		expected: &'a str,
		replacement: String,
	) -> StoreFuture<'a, CompareAndSwapOutcome> {
		Box::pin(async move { Ok(Self::cas_now(&self.0, key, expected, replacement)) })
	}
}

/// Store that fails every call; exercises fail-closed paths.
#[cfg(any(test, feature = "test"))]
#[derive(Clone, Copy, Debug, Default)]
pub struct FailingStore;
#[cfg(any(test, feature = "test"))]
impl FailingStore {
	fn fail<'a, T>() -> StoreFuture<'a, T>
	where
		T: 'a + Send,
	{
		Box::pin(async {
			Err(crate::store::StoreError::Backend { message: "store offline".into() })
		})
	}
}
#[cfg(any(test, feature = "test"))]
impl TokenStore for FailingStore {
	fn get<'a>(&'a self, _: &'a str) -> StoreFuture<'a, Option<String>> {
		Self::fail()
	}

	fn set<'a>(&'a self, _: &'a str, _: String, _: Option<Duration>) -> StoreFuture<'a, ()> {
		Self::fail()
	}

	fn delete<'a>(&'a self, _: &'a str) -> StoreFuture<'a, bool> {
		Self::fail()
	}

	fn take<'a>(&'a self, _: &'a str) -> StoreFuture<'a, Option<String>> {
		Self::fail()
	}

	fn compare_and_swap<'a>(
		&'a self,
		_: &'a str,
		_: &'a str,
		_: String,
	) -> StoreFuture<'a, CompareAndSwapOutcome> {
		Self::fail()
	}
}

/// In-memory store whose writes fail on demand; exercises rollback paths.
///
/// Each write kind lets a number of calls through, then fails a number of calls, then behaves
/// normally again. Reads always succeed.
#[cfg(any(test, feature = "test"))]
#[derive(Debug, Default)]
pub struct FlakyStore {
	inner: MemoryStore,
	sets: Faults,
	deletes: Faults,
	takes: Faults,
	swaps: Faults,
}
#[cfg(any(test, feature = "test"))]
impl FlakyStore {
	/// Backing store, for inspecting what survived.
	pub fn memory(&self) -> &MemoryStore {
		&self.inner
	}

	/// Lets `pass` sets through, then fails the next `fail`.
	pub fn failing_sets(self, pass: usize, fail: usize) -> Self {
		self.sets.arm(pass, fail);

		self
	}

	/// Lets `pass` deletes through, then fails the next `fail`.
	pub fn failing_deletes(self, pass: usize, fail: usize) -> Self {
		self.deletes.arm(pass, fail);

		self
	}

	/// Lets `pass` takes through, then fails the next `fail`.
	pub fn failing_takes(self, pass: usize, fail: usize) -> Self {
		self.takes.arm(pass, fail);

		self
	}

	/// Lets `pass` compare-and-swaps through, then fails the next `fail`.
	pub fn failing_swaps(self, pass: usize, fail: usize) -> Self {
		self.swaps.arm(pass, fail);

		self
	}
}
#[cfg(any(test, feature = "test"))]
impl TokenStore for FlakyStore {
	fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>> {
		self.inner.get(key)
	}

	fn set<'a>(
		&'a self,
		key: &'a str,
		value: String,
		ttl: Option<Duration>,
	) -> StoreFuture<'a, ()> {
		if self.sets.trip() { FailingStore::fail() } else { self.inner.set(key, value, ttl) }
	}

	fn delete<'a>(&'a self, key: &'a str) -> StoreFuture<'a, bool> {
		if self.deletes.trip() { FailingStore::fail() } else { self.inner.delete(key) }
	}

	fn take<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>> {
		if self.takes.trip() { FailingStore::fail() } else { self.inner.take(key) }
	}

	fn compare_and_swap<'a>(
		&'a self,
		key: &'a str,
		expected: &'a str,
		replacement: String,
	) -> StoreFuture<'a, CompareAndSwapOutcome> {
		if self.swaps.trip() {
			FailingStore::fail()
		} else {
			self.inner.compare_and_swap(key, expected, replacement)
		}
	}
}

#[cfg(any(test, feature = "test"))]
#[derive(Debug, Default)]
struct Faults {
	pass: AtomicUsize,
	fail: AtomicUsize,
}
#[cfg(any(test, feature = "test"))]
impl Faults {
	fn arm(&self, pass: usize, fail: usize) {
		self.pass.store(pass, Ordering::SeqCst);
		self.fail.store(fail, Ordering::SeqCst);
	}

	// `true` when this call should fail.
	fn trip(&self) -> bool {
		if self.pass.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1)).is_ok() {
			return false;
		}

		self.fail.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1)).is_ok()
	}
}
