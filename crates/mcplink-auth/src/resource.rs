//! RFC 8707 resource indicators.
//!
//! Resource indicators bind access tokens to a specific resource server.
//! Every authorization and token request this crate issues carries a
//! `resource` parameter in the canonical form produced here.
//!
//! Canonical form per RFC 8707 Section 2:
//! - absolute http/https URI, lowercase scheme and host
//! - no fragment, no query
//! - default ports omitted
//! - no trailing slash unless the path is exactly `/`

use url::Url;

use crate::error::{AuthError, AuthResult};

/// Validate and normalize a resource URI per RFC 8707.
///
/// The result is idempotent: canonicalizing a canonical URI returns it
/// unchanged.
///
/// # Errors
///
/// Returns [`AuthError::InvalidResourceUri`] when the input is not an
/// absolute http/https URI, has no host, or carries a fragment.
pub fn canonical_resource_uri(uri: &str) -> AuthResult<String> {
    let url = Url::parse(uri)
        .map_err(|e| AuthError::InvalidResourceUri(format!("{uri}: {e}")))?;

    let scheme = url.scheme().to_lowercase();
    if scheme != "http" && scheme != "https" {
        return Err(AuthError::InvalidResourceUri(format!(
            "{uri}: scheme must be http or https, got {scheme}"
        )));
    }

    let host = url.host_str().ok_or_else(|| {
        AuthError::InvalidResourceUri(format!("{uri}: missing host"))
    })?;

    if url.fragment().is_some() {
        return Err(AuthError::InvalidResourceUri(format!(
            "{uri}: fragments are forbidden"
        )));
    }

    let host = host.to_lowercase();

    let port = match url.port() {
        Some(443) if scheme == "https" => String::new(),
        Some(80) if scheme == "http" => String::new(),
        Some(port) => format!(":{port}"),
        None => String::new(),
    };

    let path = url.path();
    let path = if path == "/" {
        path.to_string()
    } else {
        path.trim_end_matches('/').to_string()
    };

    Ok(format!("{scheme}://{host}{port}{path}"))
}
