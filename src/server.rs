//! Axum adapter exposing the OAuth endpoints and running the chain in front of proxied traffic.
//!
//! Routes, relative to each API's listen path:
//!
//! - `POST {listen_path}oauth/authorize/`: end-user authorize, answered with a 307 redirect.
//! - `POST {listen_path}tyk/oauth/authorize-client/`: trusted authorize (management secret).
//! - `POST {listen_path}oauth/token/`: token endpoint, HTTP Basic client authentication.
//! - everything else under the listen path runs the [`AuthorizationChain`] and, when it passes,
//!   goes to the [`RequestDispatcher`].
//!
//! Plus `DELETE /tyk/oauth/refresh/{refresh_token}?api_id=…` for trusted revocation.

pub mod dispatch;

mod handlers;
mod response;

pub use dispatch::*;

// crates.io
use axum::{Router, routing::delete};
// self
use crate::{
	_prelude::*,
	chain::AuthorizationChain,
	config::{GatewayConfig, RegistryHandle},
	flows::GrantEngine,
};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct GatewayState {
	/// Grant engine serving the OAuth endpoints.
	pub engine: GrantEngine,
	/// Chain run in front of proxied traffic.
	pub chain: AuthorizationChain,
	/// Current API registry.
	pub registry: RegistryHandle,
	/// Gateway settings.
	pub config: Arc<GatewayConfig>,
	/// Receives requests that passed the chain.
	pub dispatcher: Arc<dyn RequestDispatcher>,
}
impl Debug for GatewayState {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("GatewayState")
			.field("engine", &self.engine)
			.field("chain", &self.chain)
			.field("config", &self.config)
			.finish_non_exhaustive()
	}
}

/// Builds the gateway router over `state`.
pub fn build_router(state: GatewayState) -> Router {
	Router::new()
		.route("/tyk/oauth/refresh/{refresh_token}", delete(handlers::revoke_refresh))
		.fallback(handlers::gateway)
		.with_state(state)
}
