//! OAuth token state.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Leeway subtracted from the expiry instant when deciding whether to
/// refresh: a token is treated as expired 30 seconds early.
pub const EXPIRY_LEEWAY_SECS: i64 = 30;

/// The wire shape of a token endpoint response (RFC 6749 §5.1).
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    /// The access token
    pub access_token: String,
    /// Token type, typically `Bearer`
    #[serde(default = "default_token_type")]
    pub token_type: String,
    /// Lifetime in seconds
    #[serde(default)]
    pub expires_in: Option<i64>,
    /// Optional refresh token
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Granted scope
    #[serde(default)]
    pub scope: Option<String>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

/// OAuth tokens plus their computed expiry instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthTokens {
    /// The access token
    pub access_token: String,
    /// Optional refresh token
    pub refresh_token: Option<String>,
    /// Token type, typically `Bearer`
    pub token_type: String,
    /// Instant at which the access token expires, when known
    pub expires_at: Option<DateTime<Utc>>,
    /// Granted scope
    pub scope: Option<String>,
}

impl OAuthTokens {
    /// Convert a token endpoint response received at `now`.
    ///
    /// When the response carries no refresh token (common on refresh
    /// responses), `previous_refresh` is retained so the grant survives.
    pub fn from_response(
        response: TokenResponse,
        now: DateTime<Utc>,
        previous_refresh: Option<String>,
    ) -> Self {
        Self {
            access_token: response.access_token,
            refresh_token: response.refresh_token.or(previous_refresh),
            token_type: response.token_type,
            expires_at: response.expires_in.map(|secs| now + Duration::seconds(secs)),
            scope: response.scope,
        }
    }

    /// Whether the access token should be refreshed at `now`.
    ///
    /// True once `now >= expires_at - 30s`. Tokens without an expiry never
    /// report expired.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires_at) => now >= expires_at - Duration::seconds(EXPIRY_LEEWAY_SECS),
            None => false,
        }
    }

    /// The `Authorization` header value for this token.
    pub fn authorization_value(&self) -> String {
        format!("Bearer {}", self.access_token)
    }
}
