//! Handshake flow: the three-step trust protocol from the Service
//! Provider's point of view
//!
//! `begin_login` covers step one (obtain a request token bound to the
//! callback URL and redirect the user to the Identity Provider);
//! `complete_login` covers steps two and three (verify the returned
//! access token, exchange it for identity data, materialize the local
//! user). Both are plain functions of the incoming request data plus
//! explicitly injected collaborators; no state is held between them, so
//! concurrent login attempts cannot interfere.

use url::Url;

use crate::client::SsoClient;
use crate::error::SsoError;
use crate::redirect::safe_redirect_target;
use crate::users::{IdentityResolver, LocalUser, UserStore};

/// Scheme of the incoming request, used to rebuild the callback URL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
	Http,
	Https,
}

impl Scheme {
	fn as_str(self) -> &'static str {
		match self {
			Scheme::Http => "http",
			Scheme::Https => "https",
		}
	}
}

/// Data extracted from the incoming login request
#[derive(Debug, Clone)]
pub struct LoginRequest {
	pub scheme: Scheme,
	/// Host (and optional port) the user's browser addressed
	pub host: String,
	/// Caller-supplied post-login destination, validated before use
	pub next: Option<String>,
}

/// Where to send the user's browser to authenticate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginRedirect {
	pub authorize_url: Url,
}

/// Data extracted from the callback request after remote login
#[derive(Debug, Clone)]
pub struct CallbackRequest {
	/// Host (and optional port) the user's browser addressed
	pub host: String,
	/// Raw signed access token from the query string
	pub access_token: String,
	/// Caller-supplied post-login destination, validated before use
	pub next: Option<String>,
}

/// Outcome of a completed handshake
///
/// Establishing the long-lived session for `user` and issuing the
/// redirect are the caller's job; the handshake itself is over.
#[derive(Debug, Clone)]
pub struct AuthenticatedLogin {
	pub user: LocalUser,
	pub redirect_to: String,
}

pub(crate) fn build_callback_url(
	client: &SsoClient,
	request: &LoginRequest,
) -> Result<Url, SsoError> {
	let next = safe_redirect_target(request.next.as_deref(), &request.host);
	let mut callback = Url::parse(&format!(
		"{}://{}",
		request.scheme.as_str(),
		request.host
	))
	.map_err(|e| SsoError::Configuration(format!("request host {:?}: {e}", request.host)))?;
	callback.set_path(&client.config().callback_path);
	callback.query_pairs_mut().append_pair("next", &next);
	Ok(callback)
}

/// Starts a login: obtains a request token bound to the callback URL and
/// returns the authorize URL to redirect the user's browser to
///
/// Network and remote failures propagate unchanged; whether to retry is
/// the caller's policy.
pub async fn begin_login(
	client: &SsoClient,
	request: &LoginRequest,
) -> Result<LoginRedirect, SsoError> {
	let callback = build_callback_url(client, request)?;
	let request_token = client.get_request_token(callback.as_str()).await?;
	let authorize_url = client.authorize_url(&request_token)?;

	tracing::info!(host = %request.host, "Redirecting user to Identity Provider");
	Ok(LoginRedirect { authorize_url })
}

/// Completes a login from the callback request
///
/// Verifies the access token, exchanges it for identity data, and
/// materializes the local user. Token rejections (signature, expiry,
/// malformed) surface as their distinct error kinds; callers should map
/// all of them to the same "restart login" response (see
/// [`SsoError::is_token_rejection`]).
pub async fn complete_login<S: UserStore>(
	client: &SsoClient,
	resolver: &IdentityResolver<S>,
	request: &CallbackRequest,
) -> Result<AuthenticatedLogin, SsoError> {
	let payload = client
		.verify_access_token(&request.access_token)
		.await
		.inspect_err(|err| {
			if err.is_token_rejection() {
				tracing::warn!(host = %request.host, "Access token rejected; login must restart");
			}
		})?;

	let user = resolver.resolve(&payload).await?;
	let redirect_to = safe_redirect_target(request.next.as_deref(), &request.host);

	tracing::info!(username = %user.username, host = %request.host, "SSO handshake completed");
	Ok(AuthenticatedLogin { user, redirect_to })
}
