//! Plain GET with bounded concurrency and retry on transient failures.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use reqwest::StatusCode;
use thiserror::Error;
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, info_span, warn, Instrument};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDisposition {
    Retryable,
    NonRetryable,
}

pub fn classify_status(status: StatusCode) -> RetryDisposition {
    if status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
    {
        RetryDisposition::Retryable
    } else {
        RetryDisposition::NonRetryable
    }
}

pub fn classify_reqwest_error(err: &reqwest::Error) -> RetryDisposition {
    if err.is_timeout() || err.is_connect() {
        RetryDisposition::Retryable
    } else {
        RetryDisposition::NonRetryable
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub max_retries: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl BackoffPolicy {
    /// Doubling delay, capped at `max_delay`.
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        let factor = u32::try_from(attempt)
            .ok()
            .and_then(|shift| 1u32.checked_shl(shift))
            .unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    pub user_agent: Option<String>,
    pub max_in_flight: usize,
    pub per_host_in_flight: usize,
    pub backoff: BackoffPolicy,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(20),
            user_agent: None,
            max_in_flight: 8,
            per_host_in_flight: 2,
            backoff: BackoffPolicy::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchedResponse {
    pub status: StatusCode,
    pub final_url: String,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("http status {status} for {url}")]
    HttpStatus { status: u16, url: String },
    #[error("fetcher is shutting down")]
    Closed,
}

enum Attempt {
    Done(FetchedResponse),
    Retry(FetchError),
    Fail(FetchError),
}

/// Shared client for feed downloads. Limits requests in flight overall and
/// per host.
#[derive(Debug)]
pub struct HttpFetcher {
    client: reqwest::Client,
    in_flight: Arc<Semaphore>,
    per_host_limit: usize,
    per_host: Mutex<HashMap<String, Arc<Semaphore>>>,
    backoff: BackoffPolicy,
}

impl HttpFetcher {
    pub fn new(config: HttpClientConfig) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout);
        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }
        let client = builder.build().context("building http client")?;

        Ok(Self {
            client,
            in_flight: Arc::new(Semaphore::new(config.max_in_flight.max(1))),
            per_host_limit: config.per_host_in_flight.max(1),
            per_host: Mutex::new(HashMap::new()),
            backoff: config.backoff,
        })
    }

    async fn host_semaphore(&self, url: &str) -> Arc<Semaphore> {
        let host = reqwest::Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_owned))
            .unwrap_or_default();
        let mut hosts = self.per_host.lock().await;
        hosts
            .entry(host)
            .or_insert_with(|| Arc::new(Semaphore::new(self.per_host_limit)))
            .clone()
    }

    pub async fn get(&self, run_id: Uuid, feed: &str, url: &str) -> Result<FetchedResponse, FetchError> {
        let _slot = self
            .in_flight
            .acquire()
            .await
            .map_err(|_| FetchError::Closed)?;
        let host = self.host_semaphore(url).await;
        let _host_slot = host.acquire().await.map_err(|_| FetchError::Closed)?;

        let span = info_span!("http_fetch", %run_id, feed, url);
        async {
            let mut attempt = 0;
            loop {
                match self.attempt(url).await {
                    Attempt::Done(response) => {
                        debug!(bytes = response.body.len(), "fetched");
                        return Ok(response);
                    }
                    Attempt::Retry(err) if attempt < self.backoff.max_retries => {
                        let delay = self.backoff.delay_for_attempt(attempt);
                        warn!(error = %err, attempt, ?delay, "transient fetch failure, retrying");
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                    Attempt::Retry(err) | Attempt::Fail(err) => return Err(err),
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn attempt(&self, url: &str) -> Attempt {
        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(source) => {
                let retryable = classify_reqwest_error(&source) == RetryDisposition::Retryable;
                let err = FetchError::Request {
                    url: url.to_string(),
                    source,
                };
                return if retryable { Attempt::Retry(err) } else { Attempt::Fail(err) };
            }
        };

        let status = response.status();
        let final_url = response.url().to_string();
        if !status.is_success() {
            let err = FetchError::HttpStatus {
                status: status.as_u16(),
                url: final_url,
            };
            return match classify_status(status) {
                RetryDisposition::Retryable => Attempt::Retry(err),
                RetryDisposition::NonRetryable => Attempt::Fail(err),
            };
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        match response.bytes().await {
            Ok(body) => Attempt::Done(FetchedResponse {
                status,
                final_url,
                content_type,
                body: body.to_vec(),
            }),
            Err(source) => Attempt::Retry(FetchError::Request {
                url: url.to_string(),
                source,
            }),
        }
    }
}
