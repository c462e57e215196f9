//! Signed access-token codec
//!
//! Serializes a payload into a URL-safe string bound to its creation
//! timestamp and an HMAC-SHA256 signature, and verifies both on decode.
//! Any alteration of the payload or the timestamp invalidates the
//! signature. The token carries no max-age itself; the acceptable
//! lifetime is supplied by the caller at decode time.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::Serialize;
use serde::de::DeserializeOwned;
use sha2::Sha256;

use crate::error::SsoError;

type HmacSha256 = Hmac<Sha256>;

/// Tokens stamped further in the future than this are rejected as
/// expired, so a skewed Identity Provider clock cannot extend a token's
/// lifetime indefinitely.
const CLOCK_SKEW_SECS: i64 = 10;

/// Default domain-separation salt mixed into every signature
const DEFAULT_SALT: &str = "simple-sso";

/// Signs and verifies timestamped tokens with a shared secret
///
/// Wire format: `b64(payload_json) "." b64(unix_seconds_be) "." b64(hmac)`
/// where the HMAC covers the salt and the first two fields exactly as they
/// appear on the wire.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use simple_sso::TokenSigner;
///
/// let signer = TokenSigner::new("secret");
/// let token = signer.encode(&"session-42".to_string()).unwrap();
/// let value: String = signer.decode(&token, Duration::from_secs(60)).unwrap();
/// assert_eq!(value, "session-42");
/// ```
pub struct TokenSigner {
	secret: Vec<u8>,
	salt: String,
}

impl TokenSigner {
	/// Creates a signer with the default salt
	pub fn new(secret: impl AsRef<[u8]>) -> Self {
		Self::with_salt(secret, DEFAULT_SALT)
	}

	/// Creates a signer with a custom domain-separation salt
	///
	/// Tokens signed under one salt never verify under another, even with
	/// the same secret.
	pub fn with_salt(secret: impl AsRef<[u8]>, salt: impl Into<String>) -> Self {
		Self {
			secret: secret.as_ref().to_vec(),
			salt: salt.into(),
		}
	}

	fn mac(&self) -> HmacSha256 {
		HmacSha256::new_from_slice(&self.secret).expect("HMAC accepts keys of any length")
	}

	fn signature(&self, body_b64: &str, ts_b64: &str) -> Vec<u8> {
		let mut mac = self.mac();
		mac.update(self.salt.as_bytes());
		mac.update(b".");
		mac.update(body_b64.as_bytes());
		mac.update(b".");
		mac.update(ts_b64.as_bytes());
		mac.finalize().into_bytes().to_vec()
	}

	/// Encodes and signs `payload` with the current timestamp
	pub fn encode<T: Serialize>(&self, payload: &T) -> Result<String, SsoError> {
		self.encode_at(payload, Utc::now().timestamp())
	}

	fn encode_at<T: Serialize>(&self, payload: &T, issued_at: i64) -> Result<String, SsoError> {
		let body_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(payload)?);
		let ts_b64 = URL_SAFE_NO_PAD.encode(issued_at.to_be_bytes());
		let sig_b64 = URL_SAFE_NO_PAD.encode(self.signature(&body_b64, &ts_b64));
		Ok(format!("{body_b64}.{ts_b64}.{sig_b64}"))
	}

	/// Verifies and decodes a token
	///
	/// Fails with [`SsoError::BadSignature`] on any signature mismatch,
	/// [`SsoError::Expired`] when `now - issued_at > max_age`, and
	/// [`SsoError::Malformed`] on structural problems. The signature is
	/// checked (in constant time) before the timestamp or payload are
	/// trusted in any way.
	pub fn decode<T: DeserializeOwned>(
		&self,
		token: &str,
		max_age: Duration,
	) -> Result<T, SsoError> {
		let mut parts = token.splitn(3, '.');
		let (body_b64, ts_b64, sig_b64) = match (parts.next(), parts.next(), parts.next()) {
			(Some(body), Some(ts), Some(sig))
				if !body.is_empty() && !ts.is_empty() && !sig.is_empty() =>
			{
				(body, ts, sig)
			}
			_ => {
				return Err(SsoError::Malformed(
					"expected three dot-separated fields".to_string(),
				));
			}
		};

		let claimed_sig = URL_SAFE_NO_PAD
			.decode(sig_b64)
			.map_err(|_| SsoError::BadSignature)?;
		let mut mac = self.mac();
		mac.update(self.salt.as_bytes());
		mac.update(b".");
		mac.update(body_b64.as_bytes());
		mac.update(b".");
		mac.update(ts_b64.as_bytes());
		mac.verify_slice(&claimed_sig)
			.map_err(|_| SsoError::BadSignature)?;

		// Signature holds; the timestamp and payload are now the signer's
		// own bytes, so structural problems past this point are Malformed
		// rather than forgery.
		let ts_bytes = URL_SAFE_NO_PAD
			.decode(ts_b64)
			.map_err(|e| SsoError::Malformed(e.to_string()))?;
		let ts_bytes: [u8; 8] = ts_bytes
			.try_into()
			.map_err(|_| SsoError::Malformed("timestamp must be eight bytes".to_string()))?;
		let issued_at = i64::from_be_bytes(ts_bytes);

		let age = Utc::now().timestamp() - issued_at;
		let max_age_secs = i64::try_from(max_age.as_secs()).unwrap_or(i64::MAX);
		if age > max_age_secs || age < -CLOCK_SKEW_SECS {
			return Err(SsoError::Expired);
		}

		let body = URL_SAFE_NO_PAD
			.decode(body_b64)
			.map_err(|e| SsoError::Malformed(e.to_string()))?;
		Ok(serde_json::from_slice(&body)?)
	}
}
