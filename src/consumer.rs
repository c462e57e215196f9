//! Signed server-to-server calls to the Identity Provider
//!
//! Implements the consumer half of the key-pair protocol: every outbound
//! request body is signed with the Service Provider's private key and
//! sent together with the public key identifier, and the Identity
//! Provider validates the signature with its copy of the keys before
//! processing. Independent of the access-token codec.
//!
//! Wire scheme (the documented scheme of this crate, see the crate docs):
//! JSON request body, `X-Sso-Public-Key` carrying the public key, and
//! `X-Sso-Signature` carrying `b64url(HMAC-SHA256(private_key, body))`.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use reqwest::StatusCode;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde::Serialize;
use sha2::Sha256;
use url::Url;

use crate::error::SsoError;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the Service Provider's public key identifier
pub const PUBLIC_KEY_HEADER: &str = "x-sso-public-key";

/// Header carrying the request body signature
pub const SIGNATURE_HEADER: &str = "x-sso-signature";

/// Default bound on each outbound call; the consumer never hangs
/// indefinitely.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Signs a request body with a private key
///
/// The same function serves both sides of the channel: the consumer signs
/// outbound bodies with it, and the Identity Provider recomputes it to
/// validate what it received.
pub fn sign_body(private_key: &[u8], body: &[u8]) -> String {
	let mut mac =
		HmacSha256::new_from_slice(private_key).expect("HMAC accepts keys of any length");
	mac.update(body);
	URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes())
}

/// Basic-auth credentials for deployments that put the Identity Provider
/// behind an HTTP auth gateway
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpAuth {
	pub username: String,
	pub password: Option<String>,
}

/// Transport options applied to every outbound call
#[derive(Debug, Clone)]
pub struct ConsumerOptions {
	/// Verify the Identity Provider's TLS certificate (disable only
	/// against test fixtures)
	pub verify_tls: bool,
	/// Bound on connect and overall request time; surfaces as
	/// [`SsoError::Network`] when exceeded
	pub timeout: Duration,
	/// Extra headers merged into every outbound request; they do not
	/// participate in signing
	pub extra_headers: Vec<(String, String)>,
	/// Optional basic-auth credentials
	pub http_auth: Option<HttpAuth>,
}

impl Default for ConsumerOptions {
	fn default() -> Self {
		Self {
			verify_tls: true,
			timeout: DEFAULT_TIMEOUT,
			extra_headers: Vec::new(),
			http_auth: None,
		}
	}
}

/// Authenticated channel from the Service Provider to the Identity
/// Provider
///
/// Stateless across calls; no retries are performed internally. Transient
/// failures surface as [`SsoError::Network`] and retry policy belongs to
/// the caller.
pub struct Consumer {
	base_url: Url,
	public_key: String,
	private_key: Vec<u8>,
	http: reqwest::Client,
	http_auth: Option<HttpAuth>,
}

impl Consumer {
	/// Creates a consumer for the given Identity Provider and key pair
	pub fn new(
		base_url: Url,
		public_key: impl Into<String>,
		private_key: impl AsRef<[u8]>,
		options: ConsumerOptions,
	) -> Result<Self, SsoError> {
		let mut default_headers = HeaderMap::new();
		for (name, value) in &options.extra_headers {
			let name = HeaderName::from_bytes(name.as_bytes())
				.map_err(|e| SsoError::Configuration(format!("extra header {name:?}: {e}")))?;
			let value = HeaderValue::from_str(value)
				.map_err(|e| SsoError::Configuration(format!("extra header {name:?}: {e}")))?;
			default_headers.insert(name, value);
		}

		let http = reqwest::Client::builder()
			.timeout(options.timeout)
			.connect_timeout(options.timeout)
			.danger_accept_invalid_certs(!options.verify_tls)
			.default_headers(default_headers)
			.build()
			.map_err(|e| SsoError::Configuration(e.to_string()))?;

		Ok(Self {
			base_url,
			public_key: public_key.into(),
			private_key: private_key.as_ref().to_vec(),
			http,
			http_auth: options.http_auth,
		})
	}

	/// Issues a signed POST to `path` (resolved against the base URL) and
	/// returns the decoded JSON response
	pub async fn consume<B: Serialize>(
		&self,
		path: &str,
		body: &B,
	) -> Result<serde_json::Value, SsoError> {
		let url = self
			.base_url
			.join(path)
			.map_err(|e| SsoError::Configuration(format!("endpoint {path:?}: {e}")))?;
		let raw = serde_json::to_vec(body)?;
		let signature = sign_body(&self.private_key, &raw);

		let mut request = self
			.http
			.post(url.clone())
			.header(CONTENT_TYPE, "application/json")
			.header(PUBLIC_KEY_HEADER, &self.public_key)
			.header(SIGNATURE_HEADER, signature)
			.body(raw);
		if let Some(auth) = &self.http_auth {
			request = request.basic_auth(&auth.username, auth.password.as_deref());
		}

		tracing::debug!(url = %url, "Calling Identity Provider");
		let response = request
			.send()
			.await
			.map_err(|e| SsoError::Network(e.to_string()))?;

		let status = response.status();
		if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
			let detail = response.text().await.unwrap_or_default();
			tracing::warn!(
				url = %url,
				status = status.as_u16(),
				"Identity Provider rejected the request signature"
			);
			return Err(SsoError::AuthRejected(detail));
		}
		if !status.is_success() {
			let detail = response
				.text()
				.await
				.unwrap_or_else(|_| "unreadable response body".to_string());
			tracing::warn!(url = %url, status = status.as_u16(), "Identity Provider call failed");
			return Err(SsoError::Remote {
				status: status.as_u16(),
				detail,
			});
		}

		response.json().await.map_err(|e| SsoError::Remote {
			status: status.as_u16(),
			detail: format!("unparsable response body: {e}"),
		})
	}
}
