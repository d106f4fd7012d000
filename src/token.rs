//! Cached bearer token obtained from a token endpoint.

use chrono::{DateTime, Duration, Utc};
use secrecy::SecretString;
use serde_json::Value as JsonValue;

use crate::ClientError;

/// Lifetime assumed when the token endpoint omits `expires_in`.
pub const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;
/// Safety margin subtracted from the advertised lifetime.
pub const EXPIRY_MARGIN_SECS: i64 = 60;

/// Refreshed access token with its effective expiry.
#[derive(Clone, Debug)]
pub struct AuthToken {
    pub value: SecretString,
    /// Instant from which the token is treated as expired.
    pub expires_at: DateTime<Utc>,
}

impl AuthToken {
    /// Builds a token from a token-endpoint JSON response.
    ///
    /// `expires_at` is `issued_at + expires_in - 60s`.
    pub fn from_response(
        body: &JsonValue,
        token_field: &str,
        issued_at: DateTime<Utc>,
    ) -> Result<Self, ClientError> {
        let value = body
            .get(token_field)
            .and_then(JsonValue::as_str)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| ClientError::TokenMissing {
                field: token_field.to_owned(),
            })?;

        let expires_in = body
            .get("expires_in")
            .and_then(|raw| raw.as_i64().or_else(|| raw.as_str()?.parse().ok()))
            .unwrap_or(DEFAULT_EXPIRES_IN_SECS);

        Ok(Self {
            value: SecretString::new(value.to_owned()),
            expires_at: issued_at + Duration::seconds(expires_in - EXPIRY_MARGIN_SECS),
        })
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}
