//! Optional observability helpers for grant flows and chain gates.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit structured spans named `gateway_auth.flow` (fields `flow` and
//!   `stage`) around grant operations and `gateway_auth.gate` (field `gate`) around chain gates.
//! - Enable `metrics` to increment `gateway_auth_flow_total{flow,outcome}` for every grant
//!   attempt/success/failure and `gateway_auth_gate_total{gate,outcome}` for every gate verdict.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Grant operations observed by the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowKind {
	/// End-user authorize redirect.
	Authorize,
	/// Trusted authorize over the management channel.
	AuthorizeTrusted,
	/// Authorization code exchange.
	CodeExchange,
	/// Refresh token rotation.
	Refresh,
	/// Refresh token revocation.
	Revoke,
}
impl FlowKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowKind::Authorize => "authorize",
			FlowKind::AuthorizeTrusted => "authorize_trusted",
			FlowKind::CodeExchange => "code_exchange",
			FlowKind::Refresh => "refresh",
			FlowKind::Revoke => "revoke",
		}
	}
}
impl Display for FlowKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowOutcome {
	/// Entry to a grant operation.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
}
impl FlowOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowOutcome::Attempt => "attempt",
			FlowOutcome::Success => "success",
			FlowOutcome::Failure => "failure",
		}
	}
}
impl Display for FlowOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Records the terminal outcome of an instrumented grant operation.
pub(crate) fn finish_flow<T>(kind: FlowKind, result: &Result<T>) {
	match result {
		Ok(_) => record_flow_outcome(kind, FlowOutcome::Success),
		Err(e) => {
			#[cfg(feature = "tracing")]
			{
				if e.is_internal() {
					::tracing::warn!(flow = kind.as_str(), error = %e, "Grant operation failed.");
				} else {
					::tracing::debug!(flow = kind.as_str(), error = %e, "Grant operation rejected.");
				}
			}
			#[cfg(not(feature = "tracing"))]
			let _ = e;

			record_flow_outcome(kind, FlowOutcome::Failure);
		},
	}
}
