//! SSO error types

use thiserror::Error;

/// Errors produced by the SSO handshake
///
/// The taxonomy separates transport failures (retryable by the caller's
/// policy), application-level rejections from the Identity Provider, and
/// local access-token verification failures.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SsoError {
	/// Transport failure or timeout while calling the Identity Provider
	#[error("Network error: {0}")]
	Network(String),

	/// Identity Provider returned a non-success application response
	#[error("Identity Provider error ({status}): {detail}")]
	Remote {
		/// HTTP status returned by the Identity Provider
		status: u16,
		/// Remote error detail, or a description of an unusable response body
		detail: String,
	},

	/// The Identity Provider rejected the request signature
	///
	/// Indicates a misconfigured key pair. Must not be retried: the same
	/// keys will be rejected again.
	#[error("Request signature rejected by Identity Provider: {0}")]
	AuthRejected(String),

	/// Access-token signature does not match
	#[error("Bad token signature")]
	BadSignature,

	/// Access token is older than the allowed max age
	#[error("Token expired")]
	Expired,

	/// Token or payload is structurally invalid
	#[error("Malformed token: {0}")]
	Malformed(String),

	/// Invalid client configuration
	#[error("Configuration error: {0}")]
	Configuration(String),

	/// User storage error
	#[error("User storage error: {0}")]
	Storage(String),
}

impl SsoError {
	/// Whether this error means the access token was rejected locally.
	///
	/// HTTP layers must map every token rejection to the same
	/// "unauthenticated, restart login" outcome. Telling signature
	/// failures apart from expiry in user-visible responses gives an
	/// attacker an oracle.
	pub fn is_token_rejection(&self) -> bool {
		matches!(
			self,
			SsoError::BadSignature | SsoError::Expired | SsoError::Malformed(_)
		)
	}
}

impl From<reqwest::Error> for SsoError {
	fn from(error: reqwest::Error) -> Self {
		SsoError::Network(error.to_string())
	}
}

impl From<serde_json::Error> for SsoError {
	fn from(error: serde_json::Error) -> Self {
		SsoError::Malformed(error.to_string())
	}
}

impl From<url::ParseError> for SsoError {
	fn from(error: url::ParseError) -> Self {
		SsoError::Configuration(error.to_string())
	}
}
