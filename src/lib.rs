//! `sas-client` is an async HTTP transport for enterprise infrastructure
//! REST APIs, plus the layered configuration every integration shares.
//!
//! - [`ApiClient`]: auth (bearer, refreshed bearer, basic, API key),
//!   retry with backoff, `Retry-After` handling and categorized errors
//! - [`config`]: defaults → user document → per-call overrides
//! - [`secrets`]: credential fallback from a Vault-style KV store
//! - [`poll`]: fixed-interval status polling with a timeout

mod auth;
mod client;
mod error;
mod options;
mod request;
mod retry;
mod token;

pub mod config;
pub mod poll;
pub mod secrets;

pub use auth::{Auth, TokenEndpoint, DEFAULT_API_KEY_HEADER, DEFAULT_TOKEN_FIELD};
pub use client::{ApiClient, REQUEST_ID_HEADER};
pub use error::{ClientError, ErrorCode};
pub use options::{ClientOptions, TlsVerify};
pub use request::{find_by_id, find_by_name, Body, LastResponse, Payload, Request};
pub use retry::{parse_retry_after, RetryPolicy};
pub use token::AuthToken;

pub use reqwest::Method;

pub type Result<T> = std::result::Result<T, ClientError>;
