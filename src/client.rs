use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Instant;

use bytes::Bytes;
use chrono::Utc;
use futures_util::stream::{BoxStream, StreamExt, TryStreamExt};
use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use reqwest::multipart;
use reqwest::{Method, RequestBuilder, StatusCode};
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value as JsonValue;
use tokio::io::AsyncWriteExt;
use tokio::time::sleep;
use url::Url;
use uuid::Uuid;

use crate::{
    retry::parse_retry_after, Auth, AuthToken, Body, ClientError, ClientOptions, LastResponse,
    Payload, Request, Result, TlsVerify,
};

/// Header carrying the per-call correlation id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// HTTP client with uniform authentication, timeout, retry and error
/// categorization.
///
/// Calls take `&mut self`: the cached token, default headers and last
/// response belong to a single owner and are never shared across tasks.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    options: ClientOptions,
    auth: Auth,
    default_headers: HeaderMap,
    token: Option<AuthToken>,
    last_response: Option<LastResponse>,
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .field("auth", &self.auth)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("options", &self.options)
            .finish()
    }
}

impl ApiClient {
    /// Builds a client without contacting the server.
    ///
    /// With [`Auth::TokenRefresh`] the first token is fetched lazily by the
    /// first request; use [`ApiClient::connect`] to fetch it up front.
    pub fn new(options: ClientOptions, auth: Auth) -> Result<Self> {
        Url::parse(&options.base_url).map_err(|err| {
            ClientError::Config(format!("invalid base_url '{}': {err}", options.base_url))
        })?;

        if let Auth::TokenRefresh(endpoint) = &auth {
            if endpoint.username.is_empty() || endpoint.password.expose_secret().is_empty() {
                return Err(ClientError::Config(
                    "username and password are required for token_url".to_owned(),
                ));
            }
        }

        let http = build_http_client(&options)?;

        let mut default_headers = HeaderMap::new();
        default_headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        default_headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));

        Ok(Self {
            http,
            base_url: options.base_url.trim_end_matches('/').to_owned(),
            options,
            auth,
            default_headers,
            token: None,
            last_response: None,
        })
    }

    /// Builds a client and, for token-refresh auth, fetches the first token.
    pub async fn connect(options: ClientOptions, auth: Auth) -> Result<Self> {
        let mut client = Self::new(options, auth)?;
        if client.auth.token_endpoint().is_some() {
            client.refresh_token().await?;
        }
        Ok(client)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    pub fn auth(&self) -> &Auth {
        &self.auth
    }

    /// Currently cached refreshed token, if any.
    pub fn token(&self) -> Option<&AuthToken> {
        self.token.as_ref()
    }

    /// Last response received, kept whether or not the call succeeded.
    pub fn last_response(&self) -> Option<&LastResponse> {
        self.last_response.as_ref()
    }

    /// Resolves an endpoint against the base URL.
    ///
    /// `http://` and `https://` endpoints pass through unchanged; anything
    /// else is appended to the base URL with exactly one `/` between them.
    pub fn resolve_url(&self, endpoint: &str) -> String {
        if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            endpoint.to_owned()
        } else {
            format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'))
        }
    }

    /// Sets or overwrites a header sent with every request.
    pub fn set_header(&mut self, key: &str, value: &str) -> Result<()> {
        let (name, value) = parse_header(key, value)?;
        self.default_headers.insert(name, value);
        Ok(())
    }

    /// Removes a default header if present.
    pub fn remove_header(&mut self, key: &str) {
        self.default_headers.remove(key);
    }

    /// Exchanges the configured Basic credentials for a fresh bearer token.
    ///
    /// Fails with [`ClientError::TokenMissing`] when the response lacks the
    /// token field and with [`ClientError::Auth`] for every other failure.
    pub async fn refresh_token(&mut self) -> Result<()> {
        let endpoint = self.auth.token_endpoint().cloned().ok_or_else(|| {
            ClientError::Config("client is not configured for token refresh".to_owned())
        })?;
        let url = self.resolve_url(&endpoint.url);

        let response = self
            .send_with_retry(&Method::POST, || {
                self.http
                    .post(&url)
                    .basic_auth(&endpoint.username, Some(endpoint.password.expose_secret()))
                    .header(header::ACCEPT, "application/json")
                    .form(&endpoint.params)
            })
            .await
            .map_err(|err| ClientError::auth("token request failed", err))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| ClientError::auth("token response could not be read", err))?;
        if !status.is_success() {
            return Err(ClientError::auth(
                format!("token endpoint returned {status}"),
                ClientError::Http {
                    status: status.as_u16(),
                    body,
                },
            ));
        }

        let json: JsonValue = serde_json::from_str(&body)
            .map_err(|err| ClientError::auth("token response is not JSON", err))?;
        let token = AuthToken::from_response(&json, &endpoint.token_field, Utc::now())?;

        #[cfg(feature = "tracing")]
        tracing::debug!(expires_at = %token.expires_at, "refreshed access token");

        self.token = Some(token);
        Ok(())
    }

    /// Performs a request and decodes the body.
    ///
    /// 204 yields [`Payload::Empty`]; other 2xx bodies are parsed as JSON and
    /// fall back to [`Payload::Text`]. With
    /// [`Request::retry_on_json_error`] the request is sent once more before
    /// falling back.
    pub async fn execute(&mut self, request: Request) -> Result<Payload> {
        let response = self.execute_raw(&request).await?;
        if response.status == StatusCode::NO_CONTENT {
            return Ok(Payload::Empty);
        }

        match serde_json::from_str(&response.body) {
            Ok(json) => Ok(Payload::Json(json)),
            Err(_) if request.retry_on_json_error => {
                #[cfg(feature = "tracing")]
                tracing::warn!("JSON decode error, retrying once");

                let retried = self.execute_raw(&request).await?;
                if retried.status == StatusCode::NO_CONTENT {
                    return Ok(Payload::Empty);
                }
                Ok(serde_json::from_str(&retried.body)
                    .map(Payload::Json)
                    .unwrap_or(Payload::Text(retried.body)))
            }
            Err(_) => Ok(Payload::Text(response.body)),
        }
    }

    /// Performs a request and returns the raw response.
    ///
    /// Handles proactive token refresh, one refresh-and-resend on 401, and
    /// one resend after the `Retry-After` delay on 429. Any final non-2xx
    /// status becomes [`ClientError::Http`].
    pub async fn execute_raw(&mut self, request: &Request) -> Result<LastResponse> {
        let started = Instant::now();
        let response = self.send(request).await?;

        let url = response.url().to_string();
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.text().await.map_err(ClientError::from_transport)?;
        let last = LastResponse {
            url,
            status,
            headers,
            body,
            elapsed: started.elapsed(),
        };
        self.last_response = Some(last.clone());

        #[cfg(feature = "tracing")]
        tracing::debug!(
            method = %request.method,
            url = %last.url,
            status = last.status.as_u16(),
            "completed in {:.3}s",
            last.elapsed.as_secs_f64()
        );

        if !last.status.is_success() {
            return Err(ClientError::Http {
                status: last.status.as_u16(),
                body: last.body,
            });
        }
        Ok(last)
    }

    pub async fn get(&mut self, endpoint: &str) -> Result<Payload> {
        self.execute(Request::get(endpoint)).await
    }

    /// GET deserialized into `T`.
    pub async fn get_json<T: DeserializeOwned>(&mut self, endpoint: &str) -> Result<T> {
        self.get(endpoint).await?.into_json()
    }

    pub async fn post<T: Serialize + ?Sized>(&mut self, endpoint: &str, body: &T) -> Result<Payload> {
        self.execute(Request::post(endpoint).json(body)?).await
    }

    pub async fn put<T: Serialize + ?Sized>(&mut self, endpoint: &str, body: &T) -> Result<Payload> {
        self.execute(Request::put(endpoint).json(body)?).await
    }

    pub async fn patch<T: Serialize + ?Sized>(&mut self, endpoint: &str, body: &T) -> Result<Payload> {
        self.execute(Request::patch(endpoint).json(body)?).await
    }

    pub async fn delete(&mut self, endpoint: &str) -> Result<Payload> {
        self.execute(Request::delete(endpoint)).await
    }

    /// Streams a GET response body into `dest` and returns the path.
    ///
    /// The body is not kept in [`ApiClient::last_response`]. A download that
    /// fails midway removes the partial file.
    pub async fn download(&mut self, endpoint: &str, dest: impl AsRef<Path>) -> Result<PathBuf> {
        let dest = dest.as_ref().to_path_buf();
        let started = Instant::now();
        let response = self.send(&Request::get(endpoint)).await?;
        let mut response = self.check_streamed(response, started).await?;

        let mut file = tokio::fs::File::create(&dest).await?;
        if let Err(err) = write_body(&mut response, &mut file).await {
            drop(file);
            if let Err(_cleanup) = tokio::fs::remove_file(&dest).await {
                #[cfg(feature = "tracing")]
                tracing::warn!("could not remove partial download {}: {_cleanup}", dest.display());
            }
            return Err(err);
        }
        Ok(dest)
    }

    /// Streams a GET response body chunk by chunk.
    ///
    /// Status and headers are kept in [`ApiClient::last_response`]; the body
    /// is not.
    pub async fn stream(&mut self, endpoint: &str) -> Result<BoxStream<'static, Result<Bytes>>> {
        let started = Instant::now();
        let response = self.send(&Request::get(endpoint)).await?;
        let response = self.check_streamed(response, started).await?;
        Ok(response
            .bytes_stream()
            .map_err(ClientError::from_transport)
            .boxed())
    }

    /// Uploads a file as a single multipart field.
    pub async fn upload(
        &mut self,
        endpoint: &str,
        file_path: impl AsRef<Path>,
        field_name: &str,
    ) -> Result<Payload> {
        let path = file_path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_owned());

        let mut request = Request::post(endpoint);
        request.body = Some(Body::Multipart {
            field: field_name.to_owned(),
            file_name,
            bytes,
        });
        self.execute(request).await
    }

    fn token_refresh_due(&self) -> bool {
        self.auth.token_endpoint().is_some()
            && self.token.as_ref().map_or(true, AuthToken::is_expired)
    }

    /// Sends `request` with token refresh, the 401 resend and the 429
    /// `Retry-After` resend applied. The body is left unread.
    async fn send(&mut self, request: &Request) -> Result<reqwest::Response> {
        let url = self.resolve_url(&request.endpoint);
        let headers = self.request_headers(request)?;

        if self.token_refresh_due() {
            self.refresh_token().await?;
        }

        let mut response = self.send_once(&url, request, &headers).await?;

        if response.status() == StatusCode::UNAUTHORIZED && self.auth.token_endpoint().is_some() {
            #[cfg(feature = "tracing")]
            tracing::warn!("401 Unauthorized: refreshing token");

            self.refresh_token().await?;
            response = self.send_once(&url, request, &headers).await?;
        }

        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            let delay = response
                .headers()
                .get(header::RETRY_AFTER)
                .and_then(|value| value.to_str().ok())
                .and_then(parse_retry_after);
            if let Some(delay) = delay {
                #[cfg(feature = "tracing")]
                tracing::warn!("429 Too Many Requests: retrying after {:?}", delay);

                sleep(delay).await;
                response = self.send_once(&url, request, &headers).await?;
            }
        }
        Ok(response)
    }

    async fn send_once(
        &self,
        url: &str,
        request: &Request,
        headers: &HeaderMap,
    ) -> Result<reqwest::Response> {
        self.send_with_retry(&request.method, || self.build_request(url, request, headers))
            .await
            .map_err(ClientError::from_transport)
    }

    /// Records a response whose body will be streamed. Non-2xx responses are
    /// read in full and returned as [`ClientError::Http`].
    async fn check_streamed(
        &mut self,
        response: reqwest::Response,
        started: Instant,
    ) -> Result<reqwest::Response> {
        let status = response.status();
        self.last_response = Some(LastResponse {
            url: response.url().to_string(),
            status,
            headers: response.headers().clone(),
            body: String::new(),
            elapsed: started.elapsed(),
        });
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.map_err(ClientError::from_transport)?;
        if let Some(last) = self.last_response.as_mut() {
            last.body.clone_from(&body);
        }
        Err(ClientError::Http {
            status: status.as_u16(),
            body,
        })
    }

    /// Transport-level retry: connection failures, timeouts and retryable
    /// statuses are retried with backoff for methods the policy allows.
    ///
    /// A 429 carrying `Retry-After` is returned as-is for the caller to honor.
    async fn send_with_retry<F>(
        &self,
        method: &Method,
        build: F,
    ) -> std::result::Result<reqwest::Response, reqwest::Error>
    where
        F: Fn() -> RequestBuilder,
    {
        let policy = &self.options.retry;
        let method_retryable = policy.allows_method(method);
        let mut retries = 0u32;

        loop {
            match build().send().await {
                Ok(response) => {
                    let status = response.status();
                    let deferred = status == StatusCode::TOO_MANY_REQUESTS
                        && response.headers().contains_key(header::RETRY_AFTER);

                    if method_retryable
                        && !deferred
                        && policy.is_retryable_status(status)
                        && retries < policy.max_retries
                    {
                        retries += 1;
                        self.wait_before_retry(method, retries).await;
                        continue;
                    }
                    return Ok(response);
                }
                Err(err) => {
                    if method_retryable && should_retry_transport(&err) && retries < policy.max_retries
                    {
                        retries += 1;
                        self.wait_before_retry(method, retries).await;
                        continue;
                    }
                    return Err(err);
                }
            }
        }
    }

    async fn wait_before_retry(&self, method: &Method, retry: u32) {
        let delay = self.options.retry.backoff(retry);

        #[cfg(feature = "tracing")]
        {
            if !method.is_idempotent() {
                tracing::debug!(%method, "retrying non-idempotent request");
            }
            tracing::debug!("retry {} after {} ms", retry, delay.as_millis());
        }
        #[cfg(not(feature = "tracing"))]
        let _ = method;

        if !delay.is_zero() {
            sleep(delay).await;
        }
    }

    fn request_headers(&self, request: &Request) -> Result<HeaderMap> {
        let mut headers = self.default_headers.clone();
        if !matches!(request.body, None | Some(Body::Json(_))) {
            headers.remove(header::CONTENT_TYPE);
        }
        for (key, value) in &request.headers {
            let (name, value) = parse_header(key, value)?;
            headers.insert(name, value);
        }
        let request_id = HeaderValue::from_str(&Uuid::new_v4().to_string())
            .map_err(|err| ClientError::unknown("invalid request id", err))?;
        headers.insert(HeaderName::from_static(REQUEST_ID_HEADER), request_id);
        Ok(headers)
    }

    fn build_request(&self, url: &str, request: &Request, headers: &HeaderMap) -> RequestBuilder {
        let mut builder = self
            .http
            .request(request.method.clone(), url)
            .headers(headers.clone());
        builder = self.auth.apply(builder, self.token.as_ref());

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        match &request.body {
            None => builder,
            Some(Body::Json(json)) => builder.json(json),
            Some(Body::Form(pairs)) => builder.form(pairs),
            Some(Body::Text(text)) => builder.body(text.clone()),
            Some(Body::Multipart {
                field,
                file_name,
                bytes,
            }) => {
                let part = multipart::Part::bytes(bytes.clone()).file_name(file_name.clone());
                builder.multipart(multipart::Form::new().part(field.clone(), part))
            }
        }
    }
}

fn build_http_client(options: &ClientOptions) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .connect_timeout(options.connect_timeout)
        .read_timeout(options.read_timeout)
        .user_agent(options.user_agent.as_str());

    builder = match &options.verify {
        TlsVerify::Enabled => builder,
        TlsVerify::Disabled => builder.danger_accept_invalid_certs(true),
        TlsVerify::CaBundle(path) => {
            let pem = std::fs::read(path).map_err(|err| {
                ClientError::Config(format!("cannot read CA bundle {}: {err}", path.display()))
            })?;
            let certs = reqwest::Certificate::from_pem_bundle(&pem).map_err(|err| {
                ClientError::Config(format!("invalid CA bundle {}: {err}", path.display()))
            })?;
            certs
                .into_iter()
                .fold(builder, |builder, cert| builder.add_root_certificate(cert))
        }
    };

    builder
        .build()
        .map_err(|err| ClientError::Config(format!("cannot build HTTP client: {err}")))
}

async fn write_body(response: &mut reqwest::Response, file: &mut tokio::fs::File) -> Result<()> {
    while let Some(chunk) = response.chunk().await.map_err(ClientError::from_transport)? {
        file.write_all(&chunk).await?;
    }
    file.flush().await?;
    Ok(())
}

fn parse_header(key: &str, value: &str) -> Result<(HeaderName, HeaderValue)> {
    let name = HeaderName::from_bytes(key.as_bytes())
        .map_err(|err| ClientError::Config(format!("invalid header name '{key}': {err}")))?;
    let value = HeaderValue::from_str(value)
        .map_err(|err| ClientError::Config(format!("invalid value for header '{key}': {err}")))?;
    Ok((name, value))
}

fn should_retry_transport(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request() || err.is_body()
}
