//! Hand-off point for requests that passed the chain.

// crates.io
use axum::{extract::Request, response::Response};
// self
use crate::{_prelude::*, chain::GateContext};

/// Boxed future returned by [`RequestDispatcher::dispatch`].
pub type DispatchFuture = Pin<Box<dyn Future<Output = Response> + Send>>;

/// Forwards authorized requests upstream.
pub trait RequestDispatcher
where
	Self: Send + Sync,
{
	/// Forwards `request`; `ctx` carries the resolved API, version, and key record.
	fn dispatch(&self, ctx: GateContext, request: Request) -> DispatchFuture;
}

/// Dispatcher answering `200` with the resolved API, version, and path instead of proxying.
#[cfg(any(test, feature = "test"))]
#[derive(Clone, Copy, Debug, Default)]
pub struct EchoDispatcher;
#[cfg(any(test, feature = "test"))]
impl RequestDispatcher for EchoDispatcher {
	fn dispatch(&self, ctx: GateContext, _request: Request) -> DispatchFuture {
		use axum::{Json, response::IntoResponse};

		let body = serde_json::json!({
			"api_id": ctx.spec.api_id.to_string(),
			"version": ctx.version,
			"path": ctx.path,
			"quota_remaining": ctx.key.as_ref().map(|key| key.quota_remaining),
		});

		Box::pin(async move { Json(body).into_response() })
	}
}
