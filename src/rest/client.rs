//! Request execution under rate-limit supervision.

use std::time::SystemTime;

use reqwest::header::{HeaderValue, AUTHORIZATION, CONNECTION, USER_AGENT};
use reqwest::{Request, Response, StatusCode};
use tracing::{debug, instrument, warn};

use super::error::{ApiError, RateLimitResponse};
use super::limits::{LimitKey, LimitTable};
use crate::config::ClientConfig;
use crate::constants;
use crate::error::{Error, Result};
use crate::token::Token;

/// Rate-limit-aware REST client.
///
/// Every request goes through the [`LimitTable`]: the client waits out
/// any window the table already knows is exhausted, executes, then feeds
/// the response headers back so the next request sees fresh state.
pub struct Client {
    token: Token,
    http: reqwest::Client,
    limits: LimitTable,
    max_attempts: u32,
}

impl Client {
    /// Create a client with the default configuration.
    #[must_use]
    pub fn new(token: Token) -> Self {
        Self::with_config(token, ClientConfig::default())
    }

    /// Create a client with explicit configuration.
    #[must_use]
    pub fn with_config(token: Token, config: ClientConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .expect("failed to build reqwest client");
        Self {
            token,
            http,
            limits: LimitTable::new(),
            max_attempts: config.max_attempts,
        }
    }

    /// The table backing this client, exposed for inspection.
    #[must_use]
    pub fn limits(&self) -> &LimitTable {
        &self.limits
    }

    /// Execute `request` under the supervision of `key`'s bucket.
    ///
    /// 429 and 502 responses are retried with the body rewound, up to
    /// the configured attempt cap. Other non-success statuses surface as
    /// [`Error::Api`] carrying the parsed error body.
    #[instrument(skip(self, request))]
    pub async fn send(&self, mut request: Request, key: &LimitKey) -> Result<Response> {
        let trace = format!("{:08x}", rand::random::<u32>());
        self.inject_headers(&mut request)?;

        let mut attempts = 0_u32;
        loop {
            attempts += 1;
            self.throttle(&LimitKey::GLOBAL, &trace).await?;
            self.throttle(key, &trace).await?;

            let attempt = request.try_clone().ok_or(Error::UnrewindableBody)?;
            debug!(
                trace = %trace,
                attempt = attempts,
                key = %key,
                method = %attempt.method(),
                url = %attempt.url(),
                "sending request"
            );
            let response = self.http.execute(attempt).await?;
            let status = response.status();
            self.limits.update(key, response.headers())?;

            if status.is_success() {
                debug!(trace = %trace, status = status.as_u16(), "request succeeded");
                return Ok(response);
            }

            if status == StatusCode::TOO_MANY_REQUESTS {
                let headers = response.headers().clone();
                let body: Option<RateLimitResponse> = response.json().await.ok();
                let global = body.as_ref().is_some_and(|body| body.global);
                if global {
                    // Account-wide limit: park it on the global key so
                    // unrelated routes wait too.
                    self.limits.update(&LimitKey::GLOBAL, &headers)?;
                }
                warn!(
                    trace = %trace,
                    attempt = attempts,
                    key = %key,
                    global,
                    "rate limited by the API"
                );
                if attempts < self.max_attempts {
                    continue;
                }
                return Err(Error::MaxAttemptsExceeded(self.max_attempts));
            }

            if status == StatusCode::BAD_GATEWAY {
                warn!(trace = %trace, attempt = attempts, key = %key, "bad gateway");
                if attempts < self.max_attempts {
                    continue;
                }
                return Err(Error::MaxAttemptsExceeded(self.max_attempts));
            }

            // Anything else carries a Discord error body; surface it
            // without retrying.
            let status = status.as_u16();
            let bytes = response.bytes().await?;
            let error = serde_json::from_slice(&bytes).unwrap_or_else(|_| ApiError {
                code: i64::from(status),
                message: String::from_utf8_lossy(&bytes).into_owned(),
                errors: None,
            });
            warn!(trace = %trace, status, error = %error, "request rejected");
            return Err(Error::Api { status, error });
        }
    }

    /// Wait out `key`'s bucket if the table knows it is exhausted.
    async fn throttle(&self, key: &LimitKey, trace: &str) -> Result<()> {
        let Some(bucket) = self.limits.lookup(key) else {
            return Ok(());
        };
        if let Some(waited) = bucket.wait().await {
            debug!(
                trace = %trace,
                key = %key,
                waited_ms = waited.as_millis() as u64,
                "waited out another task's cooldown"
            );
        }
        let now = SystemTime::now();
        if bucket.next_will_limit(now) {
            debug!(trace = %trace, key = %key, "window exhausted, cooling down");
            bucket.cooldown(now).await?;
        }
        Ok(())
    }

    fn inject_headers(&self, request: &mut Request) -> Result<()> {
        let headers = request.headers_mut();
        if !self.token.is_empty() {
            let value = HeaderValue::from_str(self.token.header_value())
                .map_err(|_| Error::MalformedToken)?;
            headers.insert(AUTHORIZATION, value);
        }
        headers.insert(USER_AGENT, HeaderValue::from_static(constants::USER_AGENT));
        headers.insert(CONNECTION, HeaderValue::from_static("Keep-Alive"));
        Ok(())
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("token", &self.token)
            .field("max_attempts", &self.max_attempts)
            .finish_non_exhaustive()
    }
}
