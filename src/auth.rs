//! Authentication modes attached to every outgoing request.

use std::fmt;

use reqwest::RequestBuilder;
use secrecy::{ExposeSecret, SecretString};

use crate::AuthToken;

/// Header used by [`Auth::ApiKey`] when none is given.
pub const DEFAULT_API_KEY_HEADER: &str = "X-API-Key";
/// Response field holding the token when none is given.
pub const DEFAULT_TOKEN_FIELD: &str = "access_token";

/// Token endpoint exchanged against Basic credentials.
#[derive(Clone)]
pub struct TokenEndpoint {
    /// Relative to the client's base URL, or absolute.
    pub url: String,
    pub username: String,
    pub password: SecretString,
    /// JSON field holding the token in the endpoint's response.
    pub token_field: String,
    /// Extra form parameters sent with the token request.
    pub params: Vec<(String, String)>,
}

impl TokenEndpoint {
    pub fn new(
        url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            username: username.into(),
            password: SecretString::new(password.into()),
            token_field: DEFAULT_TOKEN_FIELD.to_owned(),
            params: Vec::new(),
        }
    }

    pub fn with_token_field(mut self, field: impl Into<String>) -> Self {
        self.token_field = field.into();
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }
}

impl fmt::Debug for TokenEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenEndpoint")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("token_field", &self.token_field)
            .finish()
    }
}

/// Authentication mode, selected once at construction.
#[derive(Clone, Default)]
pub enum Auth {
    #[default]
    None,
    /// Static `Authorization: Bearer <token>`.
    Bearer(SecretString),
    /// Bearer token obtained from, and refreshed against, a token endpoint.
    TokenRefresh(TokenEndpoint),
    /// HTTP Basic credentials sent with every request.
    Basic {
        username: String,
        password: SecretString,
    },
    /// Static value in a custom header.
    ApiKey { header: String, value: SecretString },
}

impl Auth {
    pub fn bearer(token: impl Into<String>) -> Self {
        Auth::Bearer(SecretString::new(token.into()))
    }

    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Auth::Basic {
            username: username.into(),
            password: SecretString::new(password.into()),
        }
    }

    /// API key in the default `X-API-Key` header.
    pub fn api_key(value: impl Into<String>) -> Self {
        Self::api_key_in(DEFAULT_API_KEY_HEADER, value)
    }

    pub fn api_key_in(header: impl Into<String>, value: impl Into<String>) -> Self {
        Auth::ApiKey {
            header: header.into(),
            value: SecretString::new(value.into()),
        }
    }

    pub fn token_endpoint(&self) -> Option<&TokenEndpoint> {
        match self {
            Auth::TokenRefresh(endpoint) => Some(endpoint),
            _ => None,
        }
    }

    /// Attaches credentials to a request.
    ///
    /// For [`Auth::TokenRefresh`] the cached token is used; without one the
    /// request goes out unauthenticated and the 401 path refreshes it.
    pub(crate) fn apply(&self, request: RequestBuilder, token: Option<&AuthToken>) -> RequestBuilder {
        match self {
            Auth::None => request,
            Auth::Bearer(token) => request.bearer_auth(token.expose_secret()),
            Auth::TokenRefresh(_) => match token {
                Some(token) => request.bearer_auth(token.value.expose_secret()),
                None => request,
            },
            Auth::Basic { username, password } => {
                request.basic_auth(username, Some(password.expose_secret()))
            }
            Auth::ApiKey { header, value } => request.header(header.as_str(), value.expose_secret()),
        }
    }

    fn mode(&self) -> &'static str {
        match self {
            Auth::None => "none",
            Auth::Bearer(_) => "bearer",
            Auth::TokenRefresh(_) => "token_refresh",
            Auth::Basic { .. } => "basic",
            Auth::ApiKey { .. } => "api_key",
        }
    }
}

impl fmt::Debug for Auth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Auth::TokenRefresh(endpoint) => f.debug_tuple("TokenRefresh").field(endpoint).finish(),
            Auth::ApiKey { header, .. } => f
                .debug_struct("ApiKey")
                .field("header", header)
                .field("value", &"<redacted>")
                .finish(),
            Auth::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
            other => write!(f, "{}", other.mode()),
        }
    }
}
