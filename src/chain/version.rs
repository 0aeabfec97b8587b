//! Version resolution against an API's version table.

// self
use crate::{
	_prelude::*,
	chain::GateContext,
	config::{VersionInfo, VersionLocation},
};

/// Resolves the version a request addresses; expired or unknown versions fail
/// [`Error::NotFound`].
pub fn resolve_version(ctx: &GateContext) -> Result<&VersionInfo> {
	let data = &ctx.spec.version_data;
	let version = if data.not_versioned {
		data.default_version()
	} else {
		let definition = &ctx.spec.definition;
		let name = match definition.location {
			VersionLocation::Header => ctx.header(&definition.key).map(str::to_owned),
			VersionLocation::UrlParam => ctx.query_param(&definition.key),
			VersionLocation::Url =>
				ctx.path.split('/').next().filter(|segment| !segment.is_empty()).map(str::to_owned),
		}
		.ok_or_else(|| Error::not_found("Version information not found"))?;

		data.versions.get(&name)
	};
	let version =
		version.ok_or_else(|| Error::not_found("This API version does not seem to exist"))?;

	if version.is_expired_at(ctx.now)? {
		return Err(Error::not_found(
			"Api Version has expired, please check documentation or contact administrator",
		));
	}

	Ok(version)
}

#[cfg(test)]
mod tests {
	// crates.io
	use http::{HeaderMap, HeaderValue, Uri};
	use time::macros;
	// self
	use super::*;
	use crate::{_preludet::TEST_API_DEFINITION, config::ApiSpec};

	fn versioned(location: &str) -> Arc<ApiSpec> {
		let mut value: serde_json::Value =
			serde_json::from_str(TEST_API_DEFINITION).expect("Fixture should be JSON.");

		value["definition"]["location"] = location.into();
		value["version_data"] = serde_json::json!({
			"not_versioned": false,
			"versions": {
				"v1": { "name": "v1", "expires": "2020-01-01 00:00" },
				"v2": { "name": "v2", "expires": "" }
			}
		});

		Arc::new(ApiSpec::from_json_str(&value.to_string()).expect("Versioned definition should parse."))
	}

	fn ctx(spec: Arc<ApiSpec>, uri: &str, headers: HeaderMap) -> GateContext {
		let uri: Uri = uri.parse().expect("URI fixture should parse.");

		GateContext::new(spec, headers, &uri).at(macros::datetime!(2025-01-01 00:00 UTC))
	}

	#[test]
	fn unversioned_apis_use_the_default_version() {
		let ctx = ctx(Arc::new(crate::_preludet::test_api_spec()), "/APIID/x", HeaderMap::new());

		assert_eq!(resolve_version(&ctx).expect("Default version should resolve.").name, "Default");
	}

	#[test]
	fn versions_resolve_from_each_location() {
		let mut headers = HeaderMap::new();

		headers.insert("version", HeaderValue::from_static("v2"));

		let by_header = ctx(versioned("header"), "/APIID/x", headers);
		let by_param = ctx(versioned("url-param"), "/APIID/x?version=v2", HeaderMap::new());
		let by_url = ctx(versioned("url"), "/APIID/v2/x", HeaderMap::new());

		for ctx in [by_header, by_param, by_url] {
			assert_eq!(resolve_version(&ctx).expect("Version should resolve.").name, "v2");
		}
	}

	#[test]
	fn missing_unknown_and_expired_versions_are_not_found() {
		let missing = ctx(versioned("header"), "/APIID/x", HeaderMap::new());
		let unknown = ctx(versioned("url"), "/APIID/v9/x", HeaderMap::new());
		let expired = ctx(versioned("url"), "/APIID/v1/x", HeaderMap::new());

		for ctx in [missing, unknown, expired] {
			assert!(matches!(resolve_version(&ctx), Err(Error::NotFound { .. })));
		}
	}
}
