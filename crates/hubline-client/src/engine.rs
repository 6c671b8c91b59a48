//! # Request Engine
//!
//! The single network entry point. Every outbound call goes through
//! [`RequestEngine::request_with_retries`].
//!
//! ## Request Pipeline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        One Logical Request                              │
//! │                                                                         │
//! │  endpoint + options                                                     │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  ┌──────────────┐  fail                                                │
//! │  │  Validate    │ ───────► RequestResult { ValidationError }  (no I/O) │
//! │  │  + sanitize  │                                                      │
//! │  └──────┬───────┘                                                      │
//! │         ▼                                                               │
//! │  ┌──────────────┐  fresh hit                                           │
//! │  │ Cache (GET)  │ ───────► RequestResult { data, from_cache }          │
//! │  └──────┬───────┘                                                      │
//! │         ▼                                                               │
//! │  ┌──────────────┐  wait > bound                                        │
//! │  │ Rate limiter │ ───────► RequestResult { RateLimited }               │
//! │  └──────┬───────┘                                                      │
//! │         ▼                                                               │
//! │  ┌──────────────┐  timeout / network / 5xx / 429                       │
//! │  │  Dispatch    │ ───────► backoff, back to rate limiter               │
//! │  │ (timeout)    │          while retry budget remains                  │
//! │  └──────┬───────┘                                                      │
//! │         ▼                                                               │
//! │   2xx: cache (GET) + success      other: failure with status           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Ordinary failures never surface as `Err` from `request*`; they come back
//! inside [`RequestResult`].

use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use hubline_core::validation::{sanitize_json, validate_endpoint, validate_token};
use hubline_core::Credential;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, RETRY_AFTER};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info_span, warn, Instrument};
use uuid::Uuid;

use crate::cache::{CacheKey, CacheStats, ResponseCache};
use crate::config::{ClientConfig, RateLimitSettings, RequestSettings};
use crate::error::{ClientError, ClientResult};
use crate::rate_limit::{RateLimitStatus, RateLimiter};

// =============================================================================
// Request Options
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CachePolicy {
    /// GETs read and populate the cache.
    #[default]
    Default,
    /// Always hit the network and do not store the response.
    Bypass,
}

/// Which credential, if any, is attached.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CredentialMode {
    /// The engine's current session credential.
    #[default]
    Session,
    /// No credential.
    Anonymous,
    /// A specific credential (identity confirmation during sign-in).
    Explicit(Credential),
}

#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub method: Method,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
    pub cache: CachePolicy,
    pub credential: CredentialMode,
    /// Overrides the configured per-attempt timeout.
    pub timeout: Option<Duration>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        RequestOptions {
            method: Method::GET,
            headers: Vec::new(),
            body: None,
            cache: CachePolicy::Default,
            credential: CredentialMode::Session,
            timeout: None,
        }
    }
}

impl RequestOptions {
    pub fn get() -> Self {
        Self::default()
    }

    pub fn post(body: Value) -> Self {
        Self::with_method(Method::POST).body(body)
    }

    pub fn put(body: Value) -> Self {
        Self::with_method(Method::PUT).body(body)
    }

    pub fn delete() -> Self {
        Self::with_method(Method::DELETE)
    }

    pub fn with_method(method: Method) -> Self {
        RequestOptions {
            method,
            ..Self::default()
        }
    }

    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn no_cache(mut self) -> Self {
        self.cache = CachePolicy::Bypass;
        self
    }

    pub fn anonymous(mut self) -> Self {
        self.credential = CredentialMode::Anonymous;
        self
    }

    pub fn with_credential(mut self, credential: Credential) -> Self {
        self.credential = CredentialMode::Explicit(credential);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn is_cacheable(&self) -> bool {
        self.method == Method::GET && self.cache == CachePolicy::Default
    }
}

// =============================================================================
// Request Result
// =============================================================================

/// Uniform outcome of one logical request.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestResult<T = Value> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<ClientError>,
    pub status: Option<u16>,
    pub from_cache: bool,
}

impl<T> RequestResult<T> {
    fn ok(data: T, status: Option<u16>, from_cache: bool) -> Self {
        RequestResult {
            success: true,
            data: Some(data),
            error: None,
            status,
            from_cache,
        }
    }

    fn failure(error: ClientError) -> Self {
        RequestResult {
            success: false,
            data: None,
            status: error.status(),
            error: Some(error),
            from_cache: false,
        }
    }

    /// Converts into a plain `Result`.
    pub fn into_result(self) -> ClientResult<T> {
        match (self.data, self.error) {
            (Some(data), None) if self.success => Ok(data),
            (_, Some(error)) => Err(error),
            _ => Err(ClientError::Unknown("request produced no data".into())),
        }
    }
}

impl RequestResult<Value> {
    /// Decodes the payload into `U`.
    pub fn decode<U: DeserializeOwned>(self) -> ClientResult<U> {
        let data = self.into_result()?;
        Ok(serde_json::from_value(data)?)
    }
}

// =============================================================================
// Request Engine
// =============================================================================

pub struct RequestEngine {
    http: reqwest::Client,
    base_url: String,
    settings: RequestSettings,
    rate_limit: RateLimitSettings,
    credential_header: String,
    credential: RwLock<Option<Credential>>,
    cache: ResponseCache,
    limiter: RateLimiter,
}

impl RequestEngine {
    pub fn new(config: &ClientConfig) -> ClientResult<Self> {
        url::Url::parse(&config.server.base_url)?;

        let http = reqwest::Client::builder()
            .timeout(config.request.timeout())
            .user_agent(config.server.user_agent.as_str())
            .build()
            .map_err(|e| ClientError::InvalidConfig(format!("failed to create HTTP client: {}", e)))?;

        Ok(RequestEngine {
            http,
            base_url: config.server.base_url.trim_end_matches('/').to_string(),
            settings: config.request.clone(),
            rate_limit: config.rate_limit.clone(),
            credential_header: config.auth.credential_header.clone(),
            credential: RwLock::new(None),
            cache: ResponseCache::new(config.cache_ttl()),
            limiter: RateLimiter::new(config.rate_limit.per_minute, config.rate_limit.per_hour),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // =========================================================================
    // Requests
    // =========================================================================

    /// Runs one logical request with the configured retry budget.
    pub async fn request(&self, endpoint: &str, options: RequestOptions) -> RequestResult {
        self.request_with_retries(endpoint, options, self.settings.max_retries)
            .await
    }

    /// Runs one logical request; at most `max_retries + 1` network attempts.
    pub async fn request_with_retries(
        &self,
        endpoint: &str,
        options: RequestOptions,
        max_retries: u32,
    ) -> RequestResult {
        let request_id = Uuid::new_v4();
        let span = info_span!(
            "request",
            %request_id,
            method = %options.method,
            endpoint = %endpoint
        );

        self.execute(endpoint, options, max_retries)
            .instrument(span)
            .await
    }

    /// GET and decode.
    pub async fn get_json<T: DeserializeOwned>(&self, endpoint: &str) -> ClientResult<T> {
        self.request(endpoint, RequestOptions::get()).await.decode()
    }

    /// Any method, decoded.
    pub async fn send_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        options: RequestOptions,
    ) -> ClientResult<T> {
        self.request(endpoint, options).await.decode()
    }

    async fn execute(
        &self,
        endpoint: &str,
        options: RequestOptions,
        max_retries: u32,
    ) -> RequestResult {
        // Validation: nothing below this block runs for bad input.
        let prepared = match self.prepare(endpoint, &options).await {
            Ok(prepared) => prepared,
            Err(e) => {
                warn!(error = %e, "Request rejected before dispatch");
                return RequestResult::failure(e);
            }
        };

        let cacheable = options.is_cacheable();
        let key = CacheKey::new(
            options.method.as_str(),
            endpoint,
            prepared.body.as_ref(),
            prepared.credential.as_ref(),
        );

        if cacheable {
            if let Some(payload) = self.cache.get(&key).await {
                debug!(key = %key, "Cache hit");
                return RequestResult::ok(payload, None, true);
            }
        }

        let timeout = options.timeout.unwrap_or_else(|| self.settings.timeout());
        let mut backoff = self.create_backoff();
        let mut attempt: u32 = 0;

        loop {
            if let Err(e) = self.limiter.acquire(self.rate_limit.max_wait()).await {
                return RequestResult::failure(e);
            }

            match self
                .dispatch(endpoint, &options.method, &prepared, timeout)
                .await
            {
                Ok((status, data)) => {
                    if cacheable {
                        self.cache.insert(key, data.clone()).await;
                    }
                    debug!(status, attempts = attempt + 1, "Request succeeded");
                    return RequestResult::ok(data, Some(status), false);
                }
                Err(e) if e.is_retryable() && attempt < max_retries => {
                    attempt += 1;
                    let delay = match &e {
                        ClientError::TooManyRequests {
                            retry_after_secs: Some(secs),
                        } => Duration::from_secs(*secs),
                        _ => backoff
                            .next_backoff()
                            .unwrap_or_else(|| self.settings.max_backoff()),
                    }
                    .min(self.settings.max_backoff());

                    warn!(
                        error = %e,
                        retry = attempt,
                        max_retries,
                        backoff_ms = delay.as_millis() as u64,
                        "Retrying request"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    warn!(error = %e, attempts = attempt + 1, "Request failed");
                    return RequestResult::failure(e);
                }
            }
        }
    }

    async fn prepare(&self, endpoint: &str, options: &RequestOptions) -> ClientResult<Prepared> {
        validate_endpoint(endpoint)?;

        let credential = match &options.credential {
            CredentialMode::Session => self.credential.read().await.clone(),
            CredentialMode::Anonymous => None,
            CredentialMode::Explicit(credential) => {
                validate_token(credential.expose())?;
                Some(credential.clone())
            }
        };

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        for (name, value) in &options.headers {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| {
                hubline_core::ValidationError::InvalidFormat {
                    field: "header".into(),
                    reason: format!("invalid header name '{}'", name),
                }
            })?;
            let value = HeaderValue::from_str(value).map_err(|_| {
                hubline_core::ValidationError::InvalidFormat {
                    field: "header".into(),
                    reason: format!("invalid value for header '{}'", name),
                }
            })?;
            headers.insert(name, value);
        }

        if let Some(credential) = &credential {
            let name = HeaderName::from_bytes(self.credential_header.as_bytes())
                .map_err(|e| ClientError::InvalidConfig(format!("credential header: {}", e)))?;
            let mut value = HeaderValue::from_str(credential.expose()).map_err(|_| {
                hubline_core::ValidationError::InvalidFormat {
                    field: "token".into(),
                    reason: "not a valid header value".into(),
                }
            })?;
            value.set_sensitive(true);
            headers.insert(name, value);
        }

        Ok(Prepared {
            headers,
            body: options.body.as_ref().map(sanitize_json),
            credential,
        })
    }

    /// One network attempt. Non-2xx statuses come back as typed errors.
    async fn dispatch(
        &self,
        endpoint: &str,
        method: &Method,
        prepared: &Prepared,
        timeout: Duration,
    ) -> ClientResult<(u16, Value)> {
        let url = format!("{}{}", self.base_url, endpoint);
        let transport_error = |e: reqwest::Error| match ClientError::from(e) {
            ClientError::Timeout { .. } => ClientError::Timeout {
                after_ms: timeout.as_millis() as u64,
            },
            other => other,
        };

        let mut request = self
            .http
            .request(method.clone(), &url)
            .timeout(timeout)
            .headers(prepared.headers.clone());
        if let Some(body) = &prepared.body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());

        let bytes = response.bytes().await.map_err(transport_error)?;
        let data = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };

        if status.is_success() {
            Ok((status.as_u16(), data))
        } else {
            Err(ClientError::from_status(
                status.as_u16(),
                endpoint,
                Some(&data),
                retry_after,
            ))
        }
    }

    fn create_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.settings.initial_backoff())
            .with_max_interval(self.settings.max_backoff())
            .with_multiplier(2.0)
            .with_randomization_factor(0.2)
            .with_max_elapsed_time(None)
            .build()
    }

    // =========================================================================
    // Session Credential
    // =========================================================================

    /// Attaches `credential` to subsequent session requests.
    pub async fn set_credential(&self, credential: Credential) {
        *self.credential.write().await = Some(credential);
    }

    pub async fn clear_credential(&self) {
        *self.credential.write().await = None;
    }

    pub async fn credential(&self) -> Option<Credential> {
        self.credential.read().await.clone()
    }

    pub async fn is_authenticated(&self) -> bool {
        self.credential.read().await.is_some()
    }

    // =========================================================================
    // Cache Management
    // =========================================================================

    /// Drops every cached response for `endpoint` (query ignored).
    pub async fn invalidate(&self, endpoint: &str) -> usize {
        self.cache.invalidate_endpoint(endpoint).await
    }

    pub async fn invalidate_key(&self, key: &CacheKey) -> bool {
        self.cache.invalidate_key(key).await
    }

    pub async fn clear_cache(&self) {
        self.cache.clear().await
    }

    pub async fn cache_stats(&self) -> CacheStats {
        self.cache.stats().await
    }

    pub async fn rate_limit_status(&self) -> RateLimitStatus {
        self.limiter.status().await
    }
}

/// Validated, sanitized request parts reused across attempts.
struct Prepared {
    headers: HeaderMap,
    body: Option<Value>,
    credential: Option<Credential>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_options_cacheability() {
        assert!(RequestOptions::get().is_cacheable());
        assert!(!RequestOptions::get().no_cache().is_cacheable());
        assert!(!RequestOptions::post(json!({})).is_cacheable());
        assert!(!RequestOptions::delete().is_cacheable());
    }

    #[test]
    fn test_result_into_result() {
        let ok: RequestResult = RequestResult::ok(json!(1), Some(200), false);
        assert_eq!(ok.into_result().unwrap(), json!(1));

        let failed: RequestResult = RequestResult::failure(ClientError::Unauthorized("x".into()));
        assert_eq!(failed.status, Some(401));
        assert!(!failed.success);
        assert!(failed.into_result().unwrap_err().is_credential_rejected());
    }

    #[test]
    fn test_decode_typed_payload() {
        #[derive(serde::Deserialize)]
        struct Payload {
            n: u32,
        }
        let result: RequestResult = RequestResult::ok(json!({"n": 4}), Some(200), false);
        let payload: Payload = result.decode().unwrap();
        assert_eq!(payload.n, 4);
    }

    #[tokio::test]
    async fn test_invalid_endpoint_short_circuits() {
        let engine = RequestEngine::new(&ClientConfig::for_base_url("http://127.0.0.1:9")).unwrap();
        let result = engine
            .request("https://evil.example/", RequestOptions::get())
            .await;

        assert!(!result.success);
        assert!(matches!(result.error, Some(ClientError::Validation(_))));
        assert_eq!(engine.rate_limit_status().await.minute_used, 0);
    }

    #[tokio::test]
    async fn test_invalid_explicit_credential_short_circuits() {
        let engine = RequestEngine::new(&ClientConfig::for_base_url("http://127.0.0.1:9")).unwrap();
        let options = RequestOptions::get().with_credential(Credential::new("bad token"));
        let result = engine.request("/session/current.json", options).await;
        assert!(matches!(result.error, Some(ClientError::Validation(_))));
    }

    #[tokio::test]
    async fn test_credential_lifecycle() {
        let engine = RequestEngine::new(&ClientConfig::default()).unwrap();
        assert!(!engine.is_authenticated().await);

        engine.set_credential(Credential::new("k".repeat(32))).await;
        assert!(engine.is_authenticated().await);

        engine.clear_credential().await;
        assert!(engine.credential().await.is_none());
    }
}
