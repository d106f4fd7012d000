use std::fmt;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Error type returned by this crate.
///
/// Every variant maps onto one stable category string (see [`ErrorCode`]),
/// so callers can branch on `err.code()` without matching variants.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Connect or read timeout exceeded.
    #[error("request timed out: {0}")]
    Timeout(#[source] reqwest::Error),
    /// Transport-level connection failure.
    #[error("connection error: {0}")]
    Connection(#[source] reqwest::Error),
    /// Non-success HTTP status after retries were exhausted.
    #[error("http error {status}: {body}")]
    Http { status: u16, body: String },
    /// Token refresh failed.
    #[error("authentication failed: {message}")]
    Auth {
        message: String,
        #[source]
        source: Option<BoxError>,
    },
    /// Token endpoint answered without the expected token field.
    #[error("token missing from response field '{field}'")]
    TokenMissing { field: String },
    /// Configuration could not be resolved or is invalid.
    #[error("configuration error: {0}")]
    Config(String),
    /// Anything else, with the original cause attached when there is one.
    #[error("unexpected error: {message}")]
    Unknown {
        message: String,
        #[source]
        source: Option<BoxError>,
    },
}

/// Stable category of a [`ClientError`].
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ErrorCode {
    Timeout,
    ConnectionError,
    HttpError,
    AuthError,
    TokenMissing,
    ConfigError,
    UnknownError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Timeout => "timeout",
            ErrorCode::ConnectionError => "connection_error",
            ErrorCode::HttpError => "http_error",
            ErrorCode::AuthError => "auth_error",
            ErrorCode::TokenMissing => "token_missing",
            ErrorCode::ConfigError => "config_error",
            ErrorCode::UnknownError => "unknown_error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ClientError {
    /// Returns the category of this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            ClientError::Timeout(_) => ErrorCode::Timeout,
            ClientError::Connection(_) => ErrorCode::ConnectionError,
            ClientError::Http { .. } => ErrorCode::HttpError,
            ClientError::Auth { .. } => ErrorCode::AuthError,
            ClientError::TokenMissing { .. } => ErrorCode::TokenMissing,
            ClientError::Config(_) => ErrorCode::ConfigError,
            ClientError::Unknown { .. } => ErrorCode::UnknownError,
        }
    }

    /// HTTP status code carried by [`ClientError::Http`].
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub(crate) fn auth(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        ClientError::Auth {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub(crate) fn unknown(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        ClientError::Unknown {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Categorizes a `reqwest` failure that escaped the retry layer.
    pub(crate) fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ClientError::Timeout(err)
        } else if err.is_connect() || err.is_request() {
            ClientError::Connection(err)
        } else {
            ClientError::unknown("transport failure", err)
        }
    }
}

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        ClientError::unknown("i/o failure", err)
    }
}
