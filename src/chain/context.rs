//! Per-request state threaded through the gates.

// crates.io
use http::{HeaderMap, Uri};
// self
use crate::{_prelude::*, auth::KeyRecord, config::ApiSpec};

/// Request view plus everything the gates resolved so far.
#[derive(Clone, Debug)]
pub struct GateContext {
	/// API the request is addressed to.
	pub spec: Arc<ApiSpec>,
	/// Request headers.
	pub headers: HeaderMap,
	/// Path remainder after the listen path.
	pub path: String,
	/// Raw query string.
	pub query: Option<String>,
	/// Evaluation instant shared by every gate.
	pub now: OffsetDateTime,
	/// Version resolved by the version gate.
	pub version: Option<String>,
	/// Bearer credential extracted by the key gate.
	pub access_token: Option<String>,
	/// Key record resolved by the key gate and updated by the rate/quota gate.
	pub key: Option<KeyRecord>,
}
impl GateContext {
	/// Builds a context for a request to `uri` addressed to `spec`.
	pub fn new(spec: Arc<ApiSpec>, headers: HeaderMap, uri: &Uri) -> Self {
		let path = uri.path();
		let path = path
			.strip_prefix(spec.listen_path())
			.or_else(|| path.strip_prefix(spec.listen_path().trim_end_matches('/')))
			.unwrap_or(path)
			.trim_start_matches('/')
			.to_owned();

		Self {
			spec,
			headers,
			path,
			query: uri.query().map(str::to_owned),
			now: OffsetDateTime::now_utc(),
			version: None,
			access_token: None,
			key: None,
		}
	}

	/// Pins the evaluation instant.
	pub fn at(mut self, now: OffsetDateTime) -> Self {
		self.now = now;

		self
	}

	/// Returns a header value as text, if present and valid UTF-8.
	pub fn header(&self, name: &str) -> Option<&str> {
		self.headers.get(name).and_then(|value| value.to_str().ok())
	}

	/// Returns the first value of a query parameter.
	pub fn query_param(&self, name: &str) -> Option<String> {
		let query = self.query.as_deref()?;

		url::form_urlencoded::parse(query.as_bytes())
			.find(|(key, _)| key == name)
			.map(|(_, value)| value.into_owned())
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::_preludet::test_api_spec;

	#[test]
	fn path_and_query_are_split_from_the_listen_path() {
		let uri: Uri = "/APIID/users/7?version=v2&x=1".parse().expect("URI fixture should parse.");
		let ctx = GateContext::new(Arc::new(test_api_spec()), HeaderMap::new(), &uri);

		assert_eq!(ctx.path, "users/7");
		assert_eq!(ctx.query_param("version").as_deref(), Some("v2"));
		assert_eq!(ctx.query_param("missing"), None);

		let uri: Uri = "/APIID".parse().expect("URI fixture should parse.");

		assert_eq!(GateContext::new(Arc::new(test_api_spec()), HeaderMap::new(), &uri).path, "");
	}
}
