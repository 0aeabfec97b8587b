// std
use std::sync::atomic::{AtomicU64, Ordering::Relaxed};
// self
use crate::_prelude::*;

/// Point-in-time copy of [`RefreshMetrics`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RefreshCounts {
	/// Refresh calls received.
	pub attempts: u64,
	/// Calls that rotated the token into a new pair.
	pub rotated: u64,
	/// Calls that failed for any reason.
	pub failed: u64,
	/// Calls presenting a token that was unknown, already rotated, or revoked.
	pub replayed: u64,
}

/// Rotation outcome counters shared by every clone of a grant engine.
#[derive(Debug, Default)]
pub struct RefreshMetrics {
	attempts: AtomicU64,
	rotated: AtomicU64,
	failed: AtomicU64,
	replayed: AtomicU64,
}
impl RefreshMetrics {
	/// Reads every counter.
	pub fn snapshot(&self) -> RefreshCounts {
		RefreshCounts {
			attempts: self.attempts.load(Relaxed),
			rotated: self.rotated.load(Relaxed),
			failed: self.failed.load(Relaxed),
			replayed: self.replayed.load(Relaxed),
		}
	}

	pub(crate) fn record_attempt(&self) {
		self.attempts.fetch_add(1, Relaxed);
	}

	pub(crate) fn record_outcome<T>(&self, result: &Result<T>) {
		let counter = if result.is_ok() { &self.rotated } else { &self.failed };

		counter.fetch_add(1, Relaxed);
	}

	pub(crate) fn record_replay(&self) {
		self.replayed.fetch_add(1, Relaxed);
	}
}
