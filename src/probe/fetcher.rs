use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

use crate::config::FetchConfig;
use crate::probe::result::{HttpResponse, ProbeResult, ProbeStatus};
use crate::probe::throttle::RateLimiter;
use crate::target::Target;

/// Upper bound for a single backoff sleep.
pub const BACKOFF_CEILING: Duration = Duration::from_secs(30);

/// Pause applied to the shared limiter when a 429 arrives without `Retry-After`.
const DEFAULT_COOL_DOWN: Duration = Duration::from_secs(5);

/// One request as handed to the HTTP capability.
#[derive(Debug, Clone)]
pub struct FetchRequest<'a> {
    pub url: &'a str,
    pub headers: &'a [(String, String)],
    pub timeout: Duration,
    pub verify_tls: bool,
}

/// Typed failure from the HTTP capability.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("TLS verification failed: {0}")]
    Tls(String),
    /// The server answered, but its redirect chain could not be followed. Never retried.
    #[error("redirect not followed: {0}")]
    Redirect(String),
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: FetchRequest<'_>) -> Result<HttpResponse, TransportError>;
}

/// `backoff_base * 2^attempt`, capped at [`BACKOFF_CEILING`].
pub fn backoff_delay(base_seconds: f64, attempt: u32) -> Duration {
    if !base_seconds.is_finite() || base_seconds <= 0.0 {
        return Duration::ZERO;
    }
    let exp = attempt.min(62) as i32;
    let secs = base_seconds * 2f64.powi(exp);
    if !secs.is_finite() || secs >= BACKOFF_CEILING.as_secs_f64() {
        BACKOFF_CEILING
    } else {
        Duration::from_secs_f64(secs)
    }
}

/// HTTP fetch with pacing, retry/backoff and a single flagged TLS fallback.
pub struct Fetcher {
    transport: Arc<dyn Transport>,
    limiter: Arc<RateLimiter>,
    config: FetchConfig,
    headers: Vec<(String, String)>,
}

impl Fetcher {
    pub fn new(transport: Arc<dyn Transport>, limiter: Arc<RateLimiter>, config: FetchConfig) -> Self {
        let headers = vec![("user-agent".to_string(), config.user_agent.clone())];
        Self { transport, limiter, config, headers }
    }

    /// Fetch `target`. Every failure mode comes back as a [`ProbeResult`] status.
    pub async fn fetch(&self, target: &Target) -> ProbeResult {
        let start = Instant::now();
        let timeout = Duration::from_secs(self.config.timeout_seconds.max(1));
        let mut verify_tls = self.config.verify_tls;
        let mut tls_downgraded = false;
        let mut retries = 0u32;
        let mut attempts = 0u32;

        loop {
            self.limiter.acquire().await;
            attempts += 1;

            let request = FetchRequest {
                url: target.as_str(),
                headers: &self.headers,
                timeout,
                verify_tls,
            };
            tracing::debug!(url = %target, attempt = attempts, verify_tls, "fetching");

            let outcome = self.transport.execute(request).await;
            let mut definitive = false;
            let (status, response, error) = match outcome {
                Ok(resp) => {
                    let status = if resp.status >= 400 {
                        ProbeStatus::HttpError { code: resp.status }
                    } else {
                        ProbeStatus::Success
                    };
                    if resp.status == 429 {
                        self.limiter.cool_down(retry_after(&resp)).await;
                    }
                    (status, Some(resp), None)
                }
                Err(TransportError::Tls(msg)) if verify_tls => {
                    tracing::warn!(url = %target, error = %msg, "TLS verification failed, retrying once without verification");
                    verify_tls = false;
                    tls_downgraded = true;
                    continue;
                }
                Err(TransportError::Tls(msg)) => (ProbeStatus::TlsError, None, Some(msg)),
                Err(TransportError::Timeout) => (ProbeStatus::Timeout, None, Some(TransportError::Timeout.to_string())),
                Err(TransportError::Connection(msg)) => (ProbeStatus::ConnectionError, None, Some(msg)),
                Err(e @ TransportError::Redirect(_)) => {
                    definitive = true;
                    (ProbeStatus::ConnectionError, None, Some(e.to_string()))
                }
            };

            if !definitive && status.is_transient() && retries < self.config.max_retries {
                let wait = backoff_delay(self.config.backoff_base_seconds, retries);
                tracing::debug!(url = %target, retry = retries + 1, wait_ms = wait.as_millis() as u64, "transient failure, backing off");
                tokio::time::sleep(wait).await;
                retries += 1;
                continue;
            }

            if tls_downgraded {
                tracing::warn!(url = %target, "result obtained with TLS verification disabled");
            }

            return ProbeResult {
                target: target.clone(),
                status,
                response,
                elapsed: start.elapsed(),
                attempts,
                tls_downgraded,
                error,
            };
        }
    }
}

fn retry_after(resp: &HttpResponse) -> Duration {
    resp.header("retry-after")
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_COOL_DOWN)
        .min(BACKOFF_CEILING)
}
