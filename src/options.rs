use std::path::PathBuf;
use std::time::Duration;

use crate::RetryPolicy;

/// TLS certificate verification mode.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub enum TlsVerify {
    /// Verify against the built-in root store.
    #[default]
    Enabled,
    /// Accept any certificate.
    Disabled,
    /// Verify against the PEM bundle at this path (added to the root store).
    CaBundle(PathBuf),
}

/// Connection, timeout and retry settings for an [`ApiClient`](crate::ApiClient).
#[derive(Clone, Debug, PartialEq)]
pub struct ClientOptions {
    /// Base URL that relative endpoints are joined onto.
    pub base_url: String,
    /// TCP/TLS connect timeout.
    pub connect_timeout: Duration,
    /// Idle timeout while reading the response.
    pub read_timeout: Duration,
    pub verify: TlsVerify,
    pub retry: RetryPolicy,
    pub user_agent: String,
}

impl ClientOptions {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(10),
            verify: TlsVerify::Enabled,
            retry: RetryPolicy::default(),
            user_agent: format!("sas-client/{}", env!("CARGO_PKG_VERSION")),
        }
    }

    pub fn with_timeouts(mut self, connect: Duration, read: Duration) -> Self {
        self.connect_timeout = connect;
        self.read_timeout = read;
        self
    }

    pub fn with_verify(mut self, verify: TlsVerify) -> Self {
        self.verify = verify;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}
