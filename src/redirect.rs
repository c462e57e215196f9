//! Post-login redirect validation
//!
//! Prevents open-redirect abuse: a crafted login link must not be able to
//! send the user to an attacker-controlled host after authentication.

use url::Url;

const DEFAULT_REDIRECT: &str = "/";

/// Returns a redirect target that is safe for the current host
///
/// The caller-supplied `next` (typically a query parameter) is returned
/// unchanged only when it is a relative path or an absolute URL whose
/// host and explicit port exactly match `current_host`. Everything else,
/// including protocol-relative forms like `//evil.example/x`, falls back
/// to `/`. Total: always produces some safe target.
///
/// # Examples
///
/// ```
/// use simple_sso::safe_redirect_target;
///
/// assert_eq!(safe_redirect_target(Some("/dashboard"), "app.example"), "/dashboard");
/// assert_eq!(safe_redirect_target(Some("https://evil.example/x"), "app.example"), "/");
/// ```
pub fn safe_redirect_target(next: Option<&str>, current_host: &str) -> String {
	let Some(next) = next.filter(|n| !n.is_empty()) else {
		return DEFAULT_REDIRECT.to_string();
	};

	// Resolve against a synthetic base on the current host: relative
	// forms inherit its authority, absolute and protocol-relative forms
	// carry their own.
	let Ok(base) = Url::parse(&format!("http://{current_host}/")) else {
		return DEFAULT_REDIRECT.to_string();
	};
	let Ok(resolved) = base.join(next) else {
		return DEFAULT_REDIRECT.to_string();
	};

	if resolved.host_str() == base.host_str() && resolved.port() == base.port() {
		next.to_string()
	} else {
		tracing::warn!(
			next = %next,
			current_host = %current_host,
			"Rejected redirect target outside the current host"
		);
		DEFAULT_REDIRECT.to_string()
	}
}
