// crates.io
use axum::{
	Form, Json,
	extract::{FromRequest, Path, Query, Request, State},
	response::{IntoResponse, Response},
};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use http::{HeaderMap, Method, StatusCode, header};
// self
use crate::{
	_prelude::*,
	auth::{GrantType, IssuedTokens, TrustedCaller, verify_trusted_credential},
	chain::{GateContext, GateOutcome},
	config::ApiSpec,
	flows::{
		AuthorizeOutcome, AuthorizeRequest, ClientCredentials, RevokeOutcome, parse_key_rules,
	},
	server::{GatewayState, response},
};

/// OAuth endpoints mounted under each listen path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Endpoint {
	Authorize,
	AuthorizeClient,
	Token,
	Proxy,
}
impl Endpoint {
	fn classify(spec: &ApiSpec, method: &Method, rest: &str) -> Self {
		if !spec.use_oauth2 {
			return Self::Proxy;
		}

		match (method, rest.trim_end_matches('/')) {
			(&Method::GET | &Method::POST, "oauth/authorize") => Self::Authorize,
			(&Method::POST, "tyk/oauth/authorize-client") => Self::AuthorizeClient,
			(&Method::POST, "oauth/token") => Self::Token,
			_ => Self::Proxy,
		}
	}
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct RevokeQuery {
	#[serde(default)]
	api_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct TrustedAuthorizeForm {
	#[serde(default)]
	response_type: String,
	#[serde(default)]
	client_id: String,
	#[serde(default)]
	redirect_uri: String,
	#[serde(default)]
	scope: Option<String>,
	#[serde(default)]
	state: Option<String>,
	#[serde(default)]
	key_rules: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct TokenForm {
	#[serde(default)]
	grant_type: String,
	#[serde(default)]
	code: Option<String>,
	#[serde(default)]
	redirect_uri: Option<String>,
	#[serde(default)]
	refresh_token: Option<String>,
	#[serde(default)]
	client_id: Option<String>,
}

/// `DELETE /tyk/oauth/refresh/{refresh_token}?api_id=…`
pub(crate) async fn revoke_refresh(
	State(state): State<GatewayState>,
	Path(refresh_token): Path<String>,
	Query(query): Query<RevokeQuery>,
	headers: HeaderMap,
) -> Response {
	let caller = match trusted_caller(&state, &headers) {
		Ok(caller) => caller,
		Err(e) => return response::management_error(&e),
	};
	let Some(api_id) = query.api_id.filter(|id| !id.is_empty()) else {
		return response::management_error(&Error::invalid_request("api_id is required"));
	};
	let Some(spec) = state.registry.snapshot().get(&api_id) else {
		return response::management_error(&Error::not_found("API not found"));
	};

	match state.engine.revoke_refresh(&caller, &spec, &refresh_token).await {
		Ok(RevokeOutcome::Deleted) => response::revoked(&refresh_token),
		Ok(RevokeOutcome::NotFound) =>
			response::management_error(&Error::not_found("Refresh token not found")),
		Err(e) => response::management_error(&e),
	}
}

/// Everything under a listen path.
pub(crate) async fn gateway(State(state): State<GatewayState>, request: Request) -> Response {
	let registry = state.registry.snapshot();
	let Some((spec, rest)) = registry.resolve(request.uri().path()) else {
		return response::error_message(StatusCode::NOT_FOUND, "API not found");
	};
	let endpoint = Endpoint::classify(&spec, request.method(), rest);

	match endpoint {
		Endpoint::Authorize => authorize(&state, &spec, request).await,
		Endpoint::AuthorizeClient => authorize_client(&state, &spec, request).await,
		Endpoint::Token => token(&state, &spec, request).await,
		Endpoint::Proxy => proxy(&state, spec, request).await,
	}
}

async fn authorize(state: &GatewayState, spec: &ApiSpec, request: Request) -> Response {
	let form = match Form::<AuthorizeRequest>::from_request(request, state).await {
		Ok(Form(form)) => form,
		Err(rejection) => return response::oauth_error(&Error::invalid_request(rejection.body_text())),
	};

	match state.engine.initiate_authorize(spec, form).await {
		Ok(instruction) => response::redirect(&instruction),
		Err(e) => response::oauth_error(&e),
	}
}

async fn authorize_client(state: &GatewayState, spec: &ApiSpec, request: Request) -> Response {
	let caller = match trusted_caller(state, request.headers()) {
		Ok(caller) => caller,
		Err(e) => return response::management_error(&e),
	};
	let form = match Form::<TrustedAuthorizeForm>::from_request(request, state).await {
		Ok(Form(form)) => form,
		Err(rejection) => return response::oauth_error(&Error::invalid_request(rejection.body_text())),
	};
	let key_rules = match form.key_rules.as_deref().filter(|raw| !raw.trim().is_empty()) {
		Some(raw) => match parse_key_rules(raw) {
			Ok(record) => Some(record),
			Err(e) => return response::oauth_error(&e),
		},
		None => None,
	};
	let request = AuthorizeRequest {
		response_type: form.response_type,
		client_id: form.client_id,
		redirect_uri: form.redirect_uri,
		scope: form.scope,
		state: form.state,
	};

	match state.engine.authorize_trusted(&caller, spec, request, key_rules).await {
		Ok(AuthorizeOutcome::Code(grant)) => Json(serde_json::json!({
			"code": grant.code.expose(),
			"redirect_uri": grant.redirect_uri,
		}))
		.into_response(),
		Ok(AuthorizeOutcome::Tokens(tokens)) => response::tokens(&tokens),
		Err(e) => response::oauth_error(&e),
	}
}

async fn token(state: &GatewayState, spec: &ApiSpec, request: Request) -> Response {
	let basic = basic_credentials(request.headers());
	let form = match Form::<TokenForm>::from_request(request, state).await {
		Ok(Form(form)) => form,
		Err(rejection) => return response::oauth_error(&Error::invalid_request(rejection.body_text())),
	};
	let result = match client_credentials(basic, form.client_id.as_deref()) {
		Ok(credentials) => exchange(state, spec, &form, &credentials).await,
		Err(e) => Err(e),
	};

	match result {
		Ok(tokens) => response::tokens(&tokens),
		Err(e) => response::oauth_error(&e),
	}
}

async fn exchange(
	state: &GatewayState,
	spec: &ApiSpec,
	form: &TokenForm,
	credentials: &ClientCredentials,
) -> Result<IssuedTokens> {
	if form.grant_type.is_empty() {
		return Err(Error::invalid_request("grant_type is required"));
	}

	match form.grant_type.parse::<GrantType>()? {
		GrantType::AuthorizationCode => {
			let (Some(code), Some(redirect_uri)) = (&form.code, &form.redirect_uri) else {
				return Err(Error::invalid_request("code and redirect_uri are required"));
			};

			state.engine.exchange_code(spec, code, credentials, redirect_uri).await
		},
		GrantType::RefreshToken => {
			let Some(refresh_token) = &form.refresh_token else {
				return Err(Error::invalid_request("refresh_token is required"));
			};

			state.engine.refresh_token(spec, refresh_token, credentials).await
		},
		GrantType::Implicit =>
			Err(Error::UnsupportedGrantType { grant: GrantType::Implicit.to_string() }),
	}
}

async fn proxy(state: &GatewayState, spec: Arc<ApiSpec>, request: Request) -> Response {
	let ctx = GateContext::new(spec, request.headers().clone(), request.uri());

	match state.chain.run(ctx).await {
		GateOutcome::Continue(ctx) => state.dispatcher.dispatch(ctx, request).await,
		GateOutcome::Abort(abort) => response::abort(&abort),
	}
}

fn trusted_caller(state: &GatewayState, headers: &HeaderMap) -> Result<TrustedCaller> {
	let presented = headers
		.get(state.config.management_header.as_str())
		.and_then(|value| value.to_str().ok());

	verify_trusted_credential(presented, &state.config.secret)
}

/// Decodes `Authorization: Basic base64(client_id:client_secret)`.
fn basic_credentials(headers: &HeaderMap) -> Option<ClientCredentials> {
	let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
	let (scheme, encoded) = value.trim().split_once(' ')?;

	if !scheme.eq_ignore_ascii_case("basic") {
		return None;
	}

	let decoded = String::from_utf8(STANDARD.decode(encoded.trim()).ok()?).ok()?;
	let (client_id, client_secret) = decoded.split_once(':')?;

	Some(ClientCredentials::new(client_id, client_secret))
}

fn client_credentials(
	basic: Option<ClientCredentials>,
	form_client_id: Option<&str>,
) -> Result<ClientCredentials> {
	let credentials =
		basic.ok_or_else(|| Error::invalid_client("HTTP Basic client authentication is required"))?;

	match form_client_id {
		Some(client_id) if !client_id.is_empty() && client_id != credentials.client_id =>
			Err(Error::invalid_client("client_id does not match the authenticated client")),
		_ => Ok(credentials),
	}
}
