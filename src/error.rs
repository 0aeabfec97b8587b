//! Gateway-level error types shared across grant flows, chain gates, and stores.

// crates.io
use http::StatusCode;
use oauth2::{
	StandardErrorResponse,
	basic::{BasicErrorResponse, BasicErrorResponseType},
};
// self
use crate::_prelude::*;

/// Gateway-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Canonical gateway error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Storage-layer failure; callers must fail closed.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),

	/// Request parameters are missing or malformed.
	#[error("Malformed request: {reason}.")]
	InvalidRequest {
		/// Human-readable reason string.
		reason: String,
	},
	/// The requested grant type is not enabled for the API or client.
	#[error("Grant type `{grant}` is not supported.")]
	UnsupportedGrantType {
		/// Grant label as received.
		grant: String,
	},
	/// Client is unknown, its secret is wrong, or its redirect URI does not match.
	#[error("Client authentication failed: {reason}.")]
	InvalidClient {
		/// Human-readable reason string.
		reason: String,
	},
	/// Authorization code or refresh token is unknown, expired, mismatched, or already used.
	#[error("The grant is invalid: {reason}.")]
	InvalidGrant {
		/// Human-readable reason string.
		reason: String,
	},
	/// Bearer credential is missing, unknown, or expired.
	#[error("{reason}.")]
	Unauthorized {
		/// Human-readable reason string.
		reason: String,
	},
	/// Access rights or quota violation, or an invalid management credential.
	#[error("{reason}.")]
	Forbidden {
		/// Human-readable reason string.
		reason: String,
	},
	/// Rate limit exhausted for the key.
	#[error("Rate limit exceeded.")]
	TooManyRequests {
		/// Time until one unit of allowance refills.
		retry_after: Duration,
	},
	/// API, version, or token lineage does not exist (or was revoked).
	#[error("{reason}.")]
	NotFound {
		/// Human-readable reason string.
		reason: String,
	},
}
impl Error {
	pub(crate) fn invalid_request(reason: impl Into<String>) -> Self {
		Self::InvalidRequest { reason: reason.into() }
	}

	pub(crate) fn invalid_client(reason: impl Into<String>) -> Self {
		Self::InvalidClient { reason: reason.into() }
	}

	pub(crate) fn invalid_grant(reason: impl Into<String>) -> Self {
		Self::InvalidGrant { reason: reason.into() }
	}

	pub(crate) fn unauthorized(reason: impl Into<String>) -> Self {
		Self::Unauthorized { reason: reason.into() }
	}

	pub(crate) fn forbidden(reason: impl Into<String>) -> Self {
		Self::Forbidden { reason: reason.into() }
	}

	pub(crate) fn not_found(reason: impl Into<String>) -> Self {
		Self::NotFound { reason: reason.into() }
	}

	/// HTTP status surfaced to the caller for this error.
	pub fn status(&self) -> StatusCode {
		match self {
			Self::InvalidRequest { .. } | Self::UnsupportedGrantType { .. } => StatusCode::BAD_REQUEST,
			Self::InvalidGrant { .. } => StatusCode::BAD_REQUEST,
			Self::InvalidClient { .. } | Self::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
			Self::Forbidden { .. } => StatusCode::FORBIDDEN,
			Self::TooManyRequests { .. } => StatusCode::TOO_MANY_REQUESTS,
			Self::NotFound { .. } => StatusCode::NOT_FOUND,
			Self::Storage(_) => StatusCode::SERVICE_UNAVAILABLE,
			Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
		}
	}

	/// Returns `true` for failures caused by the gateway itself rather than the caller.
	pub fn is_internal(&self) -> bool {
		matches!(self, Self::Storage(_) | Self::Config(_))
	}

	/// Builds the RFC 6749 `{error, error_description}` body for OAuth endpoints.
	pub fn oauth_error(&self) -> BasicErrorResponse {
		let kind = match self {
			Self::InvalidRequest { .. } => BasicErrorResponseType::InvalidRequest,
			Self::UnsupportedGrantType { .. } => BasicErrorResponseType::UnsupportedGrantType,
			Self::InvalidClient { .. } => BasicErrorResponseType::InvalidClient,
			Self::InvalidGrant { .. } => BasicErrorResponseType::InvalidGrant,
			Self::Unauthorized { .. } => BasicErrorResponseType::UnauthorizedClient,
			Self::Forbidden { .. } => BasicErrorResponseType::Extension("access_denied".into()),
			Self::TooManyRequests { .. } =>
				BasicErrorResponseType::Extension("temporarily_unavailable".into()),
			Self::NotFound { .. } => BasicErrorResponseType::Extension("not_found".into()),
			Self::Storage(_) | Self::Config(_) =>
				BasicErrorResponseType::Extension("server_error".into()),
		};
		// Internal details stay in logs.
		let description =
			if self.is_internal() { "Internal server error.".to_owned() } else { self.to_string() };

		StandardErrorResponse::new(kind, Some(description), None)
	}
}

/// Configuration and definition-loading failures.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// JSON document failed to deserialize; `path` names the offending field.
	#[error("Definition is malformed at `{path}`: {message}.")]
	Malformed {
		/// JSON path of the failing field.
		path: String,
		/// Underlying parser message.
		message: String,
	},
	/// Listen path must start and end with `/`.
	#[error("API `{api_id}` has an invalid listen path `{listen_path}`.")]
	InvalidListenPath {
		/// Offending API identifier.
		api_id: String,
		/// Listen path as configured.
		listen_path: String,
	},
	/// Two definitions share an identifier.
	#[error("API `{api_id}` is defined more than once.")]
	DuplicateApi {
		/// Duplicated API identifier.
		api_id: String,
	},
	/// Two definitions share a listen path.
	#[error("Listen path `{listen_path}` is claimed by more than one API.")]
	DuplicateListenPath {
		/// Duplicated listen path.
		listen_path: String,
	},
	/// Version table is empty.
	#[error("API `{api_id}` declares no versions.")]
	NoVersions {
		/// Offending API identifier.
		api_id: String,
	},
	/// Version expiry is not `YYYY-MM-DD HH:MM`.
	#[error("Version `{version}` has an invalid expiry `{expires}`.")]
	InvalidVersionExpiry {
		/// Version name.
		version: String,
		/// Raw expiry string.
		expires: String,
	},
	/// The end-user authorize flow needs a login redirect.
	#[error("API `{api_id}` has no auth_login_redirect configured.")]
	MissingLoginRedirect {
		/// Offending API identifier.
		api_id: String,
	},
	/// Login redirect cannot be parsed.
	#[error("Login redirect is invalid.")]
	InvalidLoginRedirect {
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
}
impl ConfigError {
	/// Wraps a [`serde_path_to_error`] failure, preserving the JSON path.
	pub fn malformed(e: serde_path_to_error::Error<serde_json::Error>) -> Self {
		Self::Malformed { path: e.path().to_string(), message: e.inner().to_string() }
	}
}
