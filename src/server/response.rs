// crates.io
use axum::{
	Json,
	response::{IntoResponse, Response},
};
use http::{HeaderValue, StatusCode, header};
// self
use crate::{_prelude::*, auth::IssuedTokens, chain::Abort, flows::RedirectInstruction};

const INTERNAL_MESSAGE: &str = "Internal server error.";

/// RFC 6749 error body; `invalid_client` also carries a Basic challenge.
pub(super) fn oauth_error(error: &Error) -> Response {
	let mut response = (error.status(), Json(error.oauth_error())).into_response();
	let headers = response.headers_mut();

	headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));

	if matches!(error, Error::InvalidClient { .. }) {
		headers.insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Basic"));
	}

	response
}

pub(super) fn tokens(tokens: &IssuedTokens) -> Response {
	let mut response = Json(tokens.to_response()).into_response();

	response.headers_mut().insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));

	response
}

pub(super) fn redirect(instruction: &RedirectInstruction) -> Response {
	match HeaderValue::from_str(instruction.location.as_str()) {
		Ok(location) => (RedirectInstruction::STATUS, [(header::LOCATION, location)]).into_response(),
		Err(_) => error_message(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_MESSAGE),
	}
}

/// `{"error": message}` with the abort status, plus `Retry-After` for rate-limit aborts.
pub(super) fn abort(abort: &Abort) -> Response {
	let mut response = (abort.status, Json(abort.body())).into_response();

	if let Some(retry_after) = abort.retry_after {
		let seconds = retry_after.as_seconds_f64().ceil().max(1.) as u64;

		response.headers_mut().insert(header::RETRY_AFTER, HeaderValue::from(seconds));
	}

	response
}

pub(super) fn error_message(status: StatusCode, message: &str) -> Response {
	(status, Json(serde_json::json!({ "error": message }))).into_response()
}

/// Management API failure: `{"status": "error", "message": …}`.
pub(super) fn management_error(error: &Error) -> Response {
	let message = if error.is_internal() { INTERNAL_MESSAGE.to_owned() } else { error.to_string() };

	(error.status(), Json(serde_json::json!({ "status": "error", "message": message })))
		.into_response()
}

pub(super) fn revoked(refresh_token: &str) -> Response {
	Json(serde_json::json!({ "status": "ok", "action": "deleted", "key": refresh_token }))
		.into_response()
}
