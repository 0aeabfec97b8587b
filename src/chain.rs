//! Ordered, short-circuiting authorization chain run in front of every proxied request.
//!
//! Gates run in a fixed order: version, key existence, key expiry, access rights, then rate and
//! quota. The first gate that aborts decides the response; later gates never run.

pub mod context;
pub mod policy;
pub mod version;

pub use context::*;
pub use policy::*;
pub use version::*;

// crates.io
use http::StatusCode;
// self
use crate::{
	_prelude::*,
	flows::GrantEngine,
	limit::RateQuotaEnforcer,
	obs::{self, FlowSpan},
};

/// One stage of the chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Gate {
	/// Resolves the API version; 404 if unknown or expired.
	VersionCheck,
	/// Resolves the bearer credential to a key record; 401 if missing or unknown.
	KeyExists,
	/// Rejects keys past their expiry; 401.
	KeyExpired,
	/// Checks the API and version are reachable under the key or its policy; 403.
	AccessRights,
	/// Charges rate and quota; 429 on rate, 403 on quota.
	RateLimitAndQuota,
}
impl Gate {
	/// Gates in evaluation order.
	pub const STANDARD: [Gate; 5] = [
		Gate::VersionCheck,
		Gate::KeyExists,
		Gate::KeyExpired,
		Gate::AccessRights,
		Gate::RateLimitAndQuota,
	];

	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Gate::VersionCheck => "version_check",
			Gate::KeyExists => "key_exists",
			Gate::KeyExpired => "key_expired",
			Gate::AccessRights => "access_rights",
			Gate::RateLimitAndQuota => "rate_limit_and_quota",
		}
	}
}
impl Display for Gate {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Response a gate aborts the chain with.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Abort {
	/// Gate that aborted.
	pub gate: Gate,
	/// HTTP status of the response.
	pub status: StatusCode,
	/// Message written as `{"error": message}`.
	pub message: String,
	/// Time until the request may be retried, for rate-limit aborts.
	pub retry_after: Option<Duration>,
}
impl Abort {
	/// Builds the abort for `error` raised by `gate`; internal details never reach the body.
	pub fn from_error(gate: Gate, error: &Error) -> Self {
		let message = if error.is_internal() {
			"Internal server error.".to_owned()
		} else {
			match error {
				Error::Unauthorized { reason }
				| Error::Forbidden { reason }
				| Error::NotFound { reason }
				| Error::InvalidRequest { reason } => reason.clone(),
				other => other.to_string(),
			}
		};
		let retry_after = match error {
			Error::TooManyRequests { retry_after } => Some(*retry_after),
			_ => None,
		};

		Self { gate, status: error.status(), message, retry_after }
	}

	/// JSON body of the abort response.
	pub fn body(&self) -> serde_json::Value {
		serde_json::json!({ "error": self.message })
	}
}

/// Verdict of a gate or of the whole chain.
#[derive(Clone, Debug)]
pub enum GateOutcome {
	/// Request may proceed with the enriched context.
	Continue(GateContext),
	/// Request is answered with the abort response.
	Abort(Abort),
}

/// The gate sequence bound to its collaborators.
#[derive(Clone)]
pub struct AuthorizationChain {
	engine: GrantEngine,
	enforcer: RateQuotaEnforcer,
	policies: Arc<dyn PolicySource>,
	gates: Arc<[Gate]>,
}
impl AuthorizationChain {
	/// Builds the chain with [`Gate::STANDARD`] order.
	pub fn standard(
		engine: GrantEngine,
		enforcer: RateQuotaEnforcer,
		policies: Arc<dyn PolicySource>,
	) -> Self {
		Self { engine, enforcer, policies, gates: Arc::new(Gate::STANDARD) }
	}

	/// Runs every gate in order, stopping at the first abort.
	pub async fn run(&self, mut ctx: GateContext) -> GateOutcome {
		for &gate in self.gates.iter() {
			match self.evaluate(gate, ctx).await {
				GateOutcome::Continue(next) => ctx = next,
				abort @ GateOutcome::Abort(_) => return abort,
			}
		}

		GateOutcome::Continue(ctx)
	}

	/// Evaluates a single gate.
	pub async fn evaluate(&self, gate: Gate, ctx: GateContext) -> GateOutcome {
		let result = FlowSpan::gate(gate.as_str()).instrument(self.apply(gate, ctx)).await;

		match result {
			Ok(ctx) => {
				obs::record_gate_outcome(gate.as_str(), "continue");

				GateOutcome::Continue(ctx)
			},
			Err(e) => {
				#[cfg(feature = "tracing")]
				{
					if e.is_internal() {
						tracing::warn!(gate = gate.as_str(), error = %e, "Gate failed closed.");
					} else {
						tracing::debug!(gate = gate.as_str(), error = %e, "Gate aborted the request.");
					}
				}

				obs::record_gate_outcome(gate.as_str(), "abort");

				GateOutcome::Abort(Abort::from_error(gate, &e))
			},
		}
	}

	async fn apply(&self, gate: Gate, mut ctx: GateContext) -> Result<GateContext> {
		match gate {
			Gate::VersionCheck => {
				let name = resolve_version(&ctx)?.name.clone();

				ctx.version = Some(name);
			},
			Gate::KeyExists => {
				let token = bearer_token(&ctx)
					.ok_or_else(|| Error::unauthorized("Authorization field missing"))?;
				let key = match self.engine.validate_access_token(&token).await {
					Ok(key) => key,
					Err(Error::NotFound { .. }) => return Err(Error::unauthorized("Key not authorised")),
					Err(e) => return Err(e),
				};

				ctx.access_token = Some(token);
				ctx.key = Some(key);
			},
			Gate::KeyExpired => {
				let key = ctx.key.as_ref().ok_or_else(|| Error::unauthorized("Key not authorised"))?;

				if key.is_expired_at(ctx.now) {
					return Err(Error::unauthorized("Key has expired, please renew"));
				}
			},
			Gate::AccessRights => self.check_access_rights(&ctx).await?,
			Gate::RateLimitAndQuota => {
				let token =
					ctx.access_token.as_deref().ok_or_else(|| Error::unauthorized("Key not authorised"))?;
				let key = match self.enforcer.check_at(token, ctx.now).await {
					Ok(key) => key,
					Err(Error::NotFound { .. }) => return Err(Error::unauthorized("Key not authorised")),
					Err(e) => return Err(e),
				};

				ctx.key = Some(key);
			},
		}

		Ok(ctx)
	}

	async fn check_access_rights(&self, ctx: &GateContext) -> Result<()> {
		let key = ctx.key.as_ref().ok_or_else(|| Error::unauthorized("Key not authorised"))?;
		let rights = match &key.apply_policy_id {
			Some(policy_id) => self
				.policies
				.policy(policy_id)
				.await?
				.ok_or_else(|| Error::forbidden("Key is bound to an unknown policy"))?
				.access_rights,
			None => key.access_rights.clone(),
		};

		if rights.is_empty() {
			return Ok(());
		}

		let definition = rights
			.get(&ctx.spec.api_id)
			.ok_or_else(|| Error::forbidden("Attempted access to disallowed version / path."))?;

		match &ctx.version {
			Some(version) if !definition.allows_version(version) =>
				Err(Error::forbidden("Attempted access to disallowed version / path.")),
			_ => Ok(()),
		}
	}
}
impl Debug for AuthorizationChain {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AuthorizationChain")
			.field("gates", &self.gates)
			.field("enforcer", &self.enforcer)
			.finish_non_exhaustive()
	}
}

/// Extracts the bearer credential from the API's auth header; a `Bearer ` prefix is optional.
pub fn bearer_token(ctx: &GateContext) -> Option<String> {
	let raw = ctx.header(&ctx.spec.auth.auth_header_name)?.trim();
	let token = match raw.split_once(' ') {
		Some((scheme, rest)) if scheme.eq_ignore_ascii_case("bearer") => rest.trim(),
		_ => raw,
	};

	if token.is_empty() { None } else { Some(token.to_owned()) }
}

#[cfg(test)]
mod tests {
	// crates.io
	use http::{HeaderMap, HeaderValue, Uri};
	// self
	use super::*;
	use crate::{_preludet::test_api_spec, store::StoreError};

	fn ctx_with_auth(value: &'static str) -> GateContext {
		let mut headers = HeaderMap::new();

		headers.insert("authorization", HeaderValue::from_static(value));

		let uri: Uri = "/APIID/".parse().expect("URI fixture should parse.");

		GateContext::new(Arc::new(test_api_spec()), headers, &uri)
	}

	#[test]
	fn bearer_prefix_is_optional() {
		assert_eq!(bearer_token(&ctx_with_auth("Bearer abc")).as_deref(), Some("abc"));
		assert_eq!(bearer_token(&ctx_with_auth("bearer  abc ")).as_deref(), Some("abc"));
		assert_eq!(bearer_token(&ctx_with_auth("abc")).as_deref(), Some("abc"));
		assert_eq!(bearer_token(&ctx_with_auth("Bearer ")), None);
	}

	#[test]
	fn aborts_carry_status_message_and_retry_hint() {
		let rate = Abort::from_error(Gate::RateLimitAndQuota, &Error::TooManyRequests {
			retry_after: Duration::milliseconds(500),
		});

		assert_eq!(rate.status, StatusCode::TOO_MANY_REQUESTS);
		assert_eq!(rate.retry_after, Some(Duration::milliseconds(500)));

		let missing = Abort::from_error(Gate::KeyExists, &Error::unauthorized("Key not authorised"));

		assert_eq!(missing.body(), serde_json::json!({ "error": "Key not authorised" }));

		let internal = Abort::from_error(
			Gate::KeyExists,
			&Error::from(StoreError::Backend { message: "redis://10.0.0.7 refused".into() }),
		);

		assert!(internal.status.is_server_error());
		assert_eq!(internal.message, "Internal server error.");
	}

	#[test]
	fn standard_order_is_fixed() {
		assert_eq!(Gate::STANDARD.map(Gate::as_str), [
			"version_check",
			"key_exists",
			"key_expired",
			"access_rights",
			"rate_limit_and_quota",
		]);
	}
}
