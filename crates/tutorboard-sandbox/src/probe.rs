//! Health probing for freshly launched or reattached sandboxes.

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{self, Instant};
use tracing::{debug, info, warn};

/// Total time budget for a sandbox to become healthy.
pub const DEFAULT_PROBE_DEADLINE_SECS: u64 = 90;

/// Pause between two health requests.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 1;

/// Upper bound for a single health request.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 4;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("Sandbox at {url} not healthy after {elapsed:?}")]
    DeadlineElapsed { url: String, elapsed: Duration },
    #[error("Health request failed: {0}")]
    Request(#[from] reqwest::Error),
}

/// Probe timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeConfig {
    pub deadline: Duration,
    pub poll_interval: Duration,
    pub request_timeout: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            deadline: Duration::from_secs(DEFAULT_PROBE_DEADLINE_SECS),
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

impl ProbeConfig {
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// A single readiness check against a sandbox.
pub trait HealthCheck: Send + Sync {
    /// `Ok(true)` when the sandbox reports itself ready.
    fn check<'a>(&'a self, base_url: &'a str) -> BoxFuture<'a, Result<bool, ProbeError>>;
}

#[derive(Debug, Deserialize)]
struct HealthResponse {
    #[serde(default)]
    ok: bool,
}

/// `GET <base>/api/health`, ready iff 2xx with `{ "ok": true }`.
#[derive(Debug, Clone, Default)]
pub struct HttpHealthCheck {
    client: reqwest::Client,
}

impl HttpHealthCheck {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

pub(crate) fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}{}", base_url.trim_end_matches('/'), path)
}

impl HealthCheck for HttpHealthCheck {
    fn check<'a>(&'a self, base_url: &'a str) -> BoxFuture<'a, Result<bool, ProbeError>> {
        async move {
            let response = self.client.get(endpoint(base_url, "/api/health")).send().await?;
            if !response.status().is_success() {
                debug!("Health endpoint answered {}", response.status());
                return Ok(false);
            }
            let body = response.json::<HealthResponse>().await?;
            Ok(body.ok)
        }
        .boxed()
    }
}

/// Polls a sandbox until it is healthy or the deadline passes.
#[derive(Debug, Clone)]
pub struct HealthProber<C> {
    check: C,
    config: ProbeConfig,
}

impl HealthProber<HttpHealthCheck> {
    pub fn http() -> Self {
        Self::new(HttpHealthCheck::new())
    }
}

impl<C: HealthCheck> HealthProber<C> {
    pub fn new(check: C) -> Self {
        Self {
            check,
            config: ProbeConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ProbeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    /// Wait until `base_url` reports ready.
    ///
    /// Request errors and timeouts count as "not ready yet". The only
    /// failure is the deadline, reported at most one request timeout late.
    pub async fn wait_until_ready(&self, base_url: &str) -> Result<(), ProbeError> {
        let started = Instant::now();
        let deadline = started + self.config.deadline;
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            match time::timeout(self.config.request_timeout, self.check.check(base_url)).await {
                Ok(Ok(true)) => {
                    info!(
                        "Sandbox {} healthy after {} attempt(s) in {:?}",
                        base_url,
                        attempts,
                        started.elapsed()
                    );
                    return Ok(());
                }
                Ok(Ok(false)) => debug!("Sandbox {} not ready yet", base_url),
                Ok(Err(e)) => debug!("Health check for {} failed: {}", base_url, e),
                Err(_) => debug!("Health check for {} timed out", base_url),
            }

            let now = Instant::now();
            if now >= deadline {
                break;
            }
            time::sleep_until((now + self.config.poll_interval).min(deadline)).await;
            if Instant::now() >= deadline {
                break;
            }
        }

        let elapsed = started.elapsed();
        warn!("Sandbox {} not healthy after {} attempt(s)", base_url, attempts);
        Err(ProbeError::DeadlineElapsed {
            url: base_url.to_string(),
            elapsed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Ready from the `ready_at`-th call on.
    #[derive(Clone)]
    struct ScriptedCheck {
        calls: Arc<AtomicU32>,
        ready_at: Option<u32>,
        hang: bool,
    }

    impl ScriptedCheck {
        fn ready_at(n: u32) -> Self {
            Self {
                calls: Arc::new(AtomicU32::new(0)),
                ready_at: Some(n),
                hang: false,
            }
        }

        fn never() -> Self {
            Self {
                calls: Arc::new(AtomicU32::new(0)),
                ready_at: None,
                hang: false,
            }
        }

        fn hanging() -> Self {
            Self {
                hang: true,
                ..Self::never()
            }
        }
    }

    impl HealthCheck for ScriptedCheck {
        fn check<'a>(&'a self, _base_url: &'a str) -> BoxFuture<'a, Result<bool, ProbeError>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            let hang = self.hang;
            let ready = self.ready_at.is_some_and(|n| call >= n);
            async move {
                if hang {
                    std::future::pending::<()>().await;
                }
                Ok(ready)
            }
            .boxed()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_on_first_healthy_poll() {
        let check = ScriptedCheck::ready_at(3);
        let prober = HealthProber::new(check.clone());
        let started = Instant::now();

        prober.wait_until_ready("http://sbx.test").await.unwrap();
        assert_eq!(check.calls.load(Ordering::SeqCst), 3);
        assert_eq!(started.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_elapsed() {
        let check = ScriptedCheck::never();
        let prober = HealthProber::new(check.clone());
        let started = Instant::now();

        let err = prober.wait_until_ready("http://sbx.test").await.unwrap_err();
        assert!(matches!(err, ProbeError::DeadlineElapsed { .. }));
        assert!(started.elapsed() >= Duration::from_secs(90));
        assert!(started.elapsed() <= Duration::from_secs(94));
        assert!(check.calls.load(Ordering::SeqCst) >= 90);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_requests_are_bounded() {
        let prober = HealthProber::new(ScriptedCheck::hanging());
        let started = Instant::now();

        let err = prober.wait_until_ready("http://sbx.test").await.unwrap_err();
        assert!(matches!(err, ProbeError::DeadlineElapsed { .. }));
        assert!(started.elapsed() <= Duration::from_secs(90 + 4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_config() {
        let config = ProbeConfig::default()
            .with_deadline(Duration::from_secs(10))
            .with_poll_interval(Duration::from_secs(2));
        let check = ScriptedCheck::never();
        let prober = HealthProber::new(check.clone()).with_config(config);
        let started = Instant::now();

        assert!(prober.wait_until_ready("http://sbx.test").await.is_err());
        assert_eq!(started.elapsed(), Duration::from_secs(10));
        assert_eq!(check.calls.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_endpoint_joins_paths() {
        assert_eq!(endpoint("http://a.test/", "/api/health"), "http://a.test/api/health");
        assert_eq!(endpoint("http://a.test", "/api/health"), "http://a.test/api/health");
    }

    #[tokio::test]
    async fn test_http_health_check() {
        use axum::{Json, Router, http::StatusCode, routing::get};
        use serde_json::json;

        let app = Router::new()
            .route("/up/api/health", get(|| async { Json(json!({ "ok": true })) }))
            .route("/warming/api/health", get(|| async { Json(json!({ "ok": false })) }))
            .route("/broken/api/health", get(|| async { StatusCode::INTERNAL_SERVER_ERROR }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        let check = HttpHealthCheck::new();
        assert!(check.check(&format!("http://{addr}/up")).await.unwrap());
        assert!(!check.check(&format!("http://{addr}/warming")).await.unwrap());
        assert!(!check.check(&format!("http://{addr}/broken")).await.unwrap());
    }
}
