use std::time::Duration;

use reqwest::header::HeaderMap;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::{ClientError, Result};

/// Request body, kept in a replayable form so retries can resend it.
#[derive(Clone, Debug, PartialEq)]
pub enum Body {
    Json(JsonValue),
    Form(Vec<(String, String)>),
    Text(String),
    /// Single file part of a multipart form.
    Multipart {
        field: String,
        file_name: String,
        bytes: Vec<u8>,
    },
}

/// One call against an endpoint.
#[derive(Clone, Debug, PartialEq)]
pub struct Request {
    pub method: Method,
    /// Path relative to the base URL, or an absolute URL.
    pub endpoint: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: Option<Body>,
    /// Total timeout overriding the client's read timeout.
    pub timeout: Option<Duration>,
    /// Re-run the request once when a 2xx body is not valid JSON.
    pub retry_on_json_error: bool,
}

impl Request {
    pub fn new(method: Method, endpoint: impl Into<String>) -> Self {
        Self {
            method,
            endpoint: endpoint.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: None,
            timeout: None,
            retry_on_json_error: false,
        }
    }

    pub fn get(endpoint: impl Into<String>) -> Self {
        Self::new(Method::GET, endpoint)
    }

    pub fn post(endpoint: impl Into<String>) -> Self {
        Self::new(Method::POST, endpoint)
    }

    pub fn put(endpoint: impl Into<String>) -> Self {
        Self::new(Method::PUT, endpoint)
    }

    pub fn patch(endpoint: impl Into<String>) -> Self {
        Self::new(Method::PATCH, endpoint)
    }

    pub fn delete(endpoint: impl Into<String>) -> Self {
        Self::new(Method::DELETE, endpoint)
    }

    /// Serializes `body` as the JSON payload.
    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self> {
        let value = serde_json::to_value(body)
            .map_err(|err| ClientError::unknown("request body is not serializable", err))?;
        self.body = Some(Body::Json(value));
        Ok(self)
    }

    pub fn json_value(mut self, body: JsonValue) -> Self {
        self.body = Some(Body::Json(body));
        self
    }

    pub fn form<I, K, V>(mut self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.body = Some(Body::Form(
            pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        ));
        self
    }

    pub fn text(mut self, body: impl Into<String>) -> Self {
        self.body = Some(Body::Text(body.into()));
        self
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn retry_on_json_error(mut self, retry: bool) -> Self {
        self.retry_on_json_error = retry;
        self
    }
}

/// Decoded body of a successful response.
#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    /// 204 No Content.
    Empty,
    Json(JsonValue),
    /// Body that did not decode as JSON.
    Text(String),
}

impl Payload {
    pub fn as_json(&self) -> Option<&JsonValue> {
        match self {
            Payload::Json(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Payload::Empty)
    }

    /// Deserializes a JSON payload into `T`.
    pub fn into_json<T: DeserializeOwned>(self) -> Result<T> {
        match self {
            Payload::Json(value) => serde_json::from_value(value)
                .map_err(|err| ClientError::unknown("response does not match expected shape", err)),
            Payload::Empty => Err(ClientError::Unknown {
                message: "expected JSON body, got 204 No Content".to_owned(),
                source: None,
            }),
            Payload::Text(text) => Err(ClientError::Unknown {
                message: format!("expected JSON body, got text: {text}"),
                source: None,
            }),
        }
    }
}

/// Raw view of the last response a client received.
#[derive(Clone, Debug)]
pub struct LastResponse {
    pub url: String,
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
    /// Wall-clock time of the whole call, refresh and resends included.
    pub elapsed: Duration,
}

impl LastResponse {
    pub fn json(&self) -> Option<JsonValue> {
        serde_json::from_str(&self.body).ok()
    }
}

/// Entries of a JSON array whose `name` equals `name`.
pub fn find_by_name<'a>(results: &'a [JsonValue], name: &str) -> Vec<&'a JsonValue> {
    results
        .iter()
        .filter(|item| item.get("name").and_then(JsonValue::as_str) == Some(name))
        .collect()
}

/// Entries of a JSON array whose `id` equals `id`.
pub fn find_by_id<'a>(results: &'a [JsonValue], id: i64) -> Vec<&'a JsonValue> {
    results
        .iter()
        .filter(|item| item.get("id").and_then(JsonValue::as_i64) == Some(id))
        .collect()
}
