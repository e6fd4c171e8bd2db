//! Dependency health cache
//!
//! Some dispatch paths hang on an out-of-process relay (the sidecar that
//! holds provider sessions). Probing it on every message would double
//! request latency, so probes are memoized per URL: successes are served
//! from cache for a short TTL, failures are never cached, and concurrent
//! callers for the same URL share a single in-flight probe.
//!
//! This is the only component in the crate that suspends the caller; its
//! internal locks are synchronous and never held across an await.

use crate::config::HealthConfig;
use crate::error::{DispatchError, DispatchResult};
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Outcome of one health probe. Probes never error and never panic; a
/// refused connection and a timeout both land here as `ok = false` with
/// distinct report text.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    /// Whether the dependency answered 2xx
    pub ok: bool,
    /// HTTP status, when a response arrived at all
    pub status: Option<u16>,
    /// Probe round-trip time
    pub latency_ms: u64,
    /// Failure detail; `None` on success
    pub error: Option<String>,
}

struct CachedReport {
    report: HealthReport,
    expires_at: Instant,
}

type SharedProbe = Shared<BoxFuture<'static, HealthReport>>;

/// Memoizing health prober for out-of-process dependencies
pub struct HealthCache {
    client: reqwest::Client,
    config: HealthConfig,
    cache: Mutex<HashMap<String, CachedReport>>,
    inflight: Mutex<HashMap<String, SharedProbe>>,
}

impl HealthCache {
    /// Create a cache with its own HTTP client
    pub fn new(config: HealthConfig) -> DispatchResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|err| {
                DispatchError::config_with_context(
                    format!("failed to build health probe HTTP client: {err}"),
                    "health cache initialization",
                )
            })?;
        Ok(Self::with_client(client, config))
    }

    /// Create a cache over an existing HTTP client
    pub fn with_client(client: reqwest::Client, config: HealthConfig) -> Self {
        Self {
            client,
            config,
            cache: Mutex::new(HashMap::new()),
            inflight: Mutex::new(HashMap::new()),
        }
    }

    /// Probe `GET {base_url}/health`, memoized.
    ///
    /// A fresh cached success is returned without touching the network.
    /// Otherwise the caller either starts a probe or joins one already in
    /// flight for the same URL. Only successes enter the cache (TTL measured
    /// from probe completion); the next check after any failure probes again.
    pub async fn check(&self, base_url: &str, timeout: Duration) -> HealthReport {
        if let Some(report) = self.cached(base_url) {
            tracing::debug!(url = %base_url, "Health probe served from cache");
            return report;
        }

        let probe = {
            let mut inflight = self.inflight.lock();
            match inflight.get(base_url) {
                Some(existing) => existing.clone(),
                None => {
                    let future =
                        Self::probe(self.client.clone(), base_url.to_string(), timeout)
                            .boxed()
                            .shared();
                    inflight.insert(base_url.to_string(), future.clone());
                    future
                }
            }
        };

        let report = probe.await;

        // Whoever clears the in-flight slot first also records the outcome;
        // the other awaiters just use the shared result.
        let cleared = self.inflight.lock().remove(base_url).is_some();
        if cleared && report.ok {
            self.cache.lock().insert(
                base_url.to_string(),
                CachedReport {
                    report: report.clone(),
                    expires_at: Instant::now() + self.config.cache_ttl(),
                },
            );
        }
        report
    }

    /// [`check`](Self::check), escalated: a failed probe becomes a
    /// [`DispatchError::RelayUnreachable`] whose message names the fix.
    /// Callers must treat it as fatal for the whole fallback chain, because
    /// every tier dispatches through the same relay.
    pub async fn ensure_healthy(
        &self,
        base_url: &str,
        timeout: Duration,
    ) -> DispatchResult<HealthReport> {
        let report = self.check(base_url, timeout).await;
        if report.ok {
            return Ok(report);
        }
        let detail = report
            .error
            .clone()
            .unwrap_or_else(|| "probe failed".to_string());
        Err(DispatchError::relay_unreachable(
            base_url,
            format!(
                "{base_url} is not responding ({detail}). Start or restart the relay process \
                 serving {base_url}, then retry. Falling back to another model tier will not \
                 help; every tier dispatches through this relay."
            ),
        ))
    }

    /// Drop every cached report, forcing the next check of each URL to probe
    pub fn clear(&self) {
        self.cache.lock().clear();
    }

    fn cached(&self, base_url: &str) -> Option<HealthReport> {
        let mut cache = self.cache.lock();
        match cache.get(base_url) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.report.clone()),
            Some(_) => {
                cache.remove(base_url);
                None
            }
            None => None,
        }
    }

    async fn probe(client: reqwest::Client, base_url: String, timeout: Duration) -> HealthReport {
        let endpoint = format!("{}/health", base_url.trim_end_matches('/'));
        let started = Instant::now();
        let result = client.get(&endpoint).timeout(timeout).send().await;
        let latency_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    tracing::debug!(
                        url = %base_url,
                        status = status.as_u16(),
                        latency_ms,
                        "Health probe ok"
                    );
                    HealthReport {
                        ok: true,
                        status: Some(status.as_u16()),
                        latency_ms,
                        error: None,
                    }
                } else {
                    tracing::warn!(
                        url = %base_url,
                        status = status.as_u16(),
                        "Health probe got unexpected status"
                    );
                    HealthReport {
                        ok: false,
                        status: Some(status.as_u16()),
                        latency_ms,
                        error: Some(format!("unexpected status {status}")),
                    }
                }
            }
            Err(err) if err.is_timeout() => {
                tracing::warn!(url = %base_url, timeout_ms = timeout.as_millis() as u64, "Health probe timed out");
                HealthReport {
                    ok: false,
                    status: None,
                    latency_ms,
                    error: Some(format!("timed out after {}ms", timeout.as_millis())),
                }
            }
            Err(err) => {
                tracing::warn!(url = %base_url, error = %err, "Health probe failed");
                HealthReport {
                    ok: false,
                    status: None,
                    latency_ms,
                    error: Some(format!("request failed: {err}")),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fresh_cache() -> HealthCache {
        HealthCache::new(HealthConfig::new()).unwrap()
    }

    fn short_ttl_cache(ttl_ms: u64) -> HealthCache {
        HealthCache::new(HealthConfig::new().with_cache_ttl_ms(ttl_ms)).unwrap()
    }

    #[tokio::test]
    async fn healthy_endpoint_reports_ok() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200).set_body_string("body is ignored"))
            .mount(&server)
            .await;

        let report = fresh_cache()
            .check(&server.uri(), Duration::from_millis(500))
            .await;
        assert!(report.ok);
        assert_eq!(report.status, Some(200));
        assert!(report.error.is_none());
    }

    #[tokio::test]
    async fn non_success_status_reports_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let report = fresh_cache()
            .check(&server.uri(), Duration::from_millis(500))
            .await;
        assert!(!report.ok);
        assert_eq!(report.status, Some(503));
        assert!(report.error.unwrap().contains("503"));
    }

    #[tokio::test]
    async fn successful_probes_are_served_from_cache() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let cache = fresh_cache();
        let first = cache.check(&server.uri(), Duration::from_millis(500)).await;
        let second = cache.check(&server.uri(), Duration::from_millis(500)).await;
        assert!(first.ok);
        assert!(second.ok);
        // expect(1) verifies the second check never reached the server.
    }

    #[tokio::test]
    async fn failed_probes_are_not_cached() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let cache = fresh_cache();
        let first = cache.check(&server.uri(), Duration::from_millis(500)).await;
        assert!(!first.ok);

        let second = cache.check(&server.uri(), Duration::from_millis(500)).await;
        assert!(second.ok);
    }

    #[tokio::test]
    async fn concurrent_checks_share_one_probe() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(100)))
            .expect(1)
            .mount(&server)
            .await;

        let cache = fresh_cache();
        let uri = server.uri();
        let (first, second, third) = tokio::join!(
            cache.check(&uri, Duration::from_millis(500)),
            cache.check(&uri, Duration::from_millis(500)),
            cache.check(&uri, Duration::from_millis(500)),
        );
        assert!(first.ok);
        assert!(second.ok);
        assert!(third.ok);
        // expect(1) verifies all three callers shared a single request.
    }

    #[tokio::test]
    async fn cache_expiry_triggers_a_fresh_probe() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200))
            .expect(2)
            .mount(&server)
            .await;

        let cache = short_ttl_cache(50);
        cache.check(&server.uri(), Duration::from_millis(500)).await;
        tokio::time::sleep(Duration::from_millis(60)).await;
        cache.check(&server.uri(), Duration::from_millis(500)).await;
    }

    #[tokio::test]
    async fn clear_forces_a_reprobe() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200))
            .expect(2)
            .mount(&server)
            .await;

        let cache = fresh_cache();
        cache.check(&server.uri(), Duration::from_millis(500)).await;
        cache.clear();
        cache.check(&server.uri(), Duration::from_millis(500)).await;
    }

    #[tokio::test]
    async fn timeout_text_differs_from_connection_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(300)))
            .mount(&server)
            .await;

        let cache = fresh_cache();
        let timed_out = cache.check(&server.uri(), Duration::from_millis(50)).await;
        assert!(!timed_out.ok);
        assert!(timed_out.error.unwrap().contains("timed out after 50ms"));

        let refused = cache
            .check("http://127.0.0.1:1", Duration::from_millis(500))
            .await;
        assert!(!refused.ok);
        assert!(refused.error.unwrap().contains("request failed"));
    }

    #[tokio::test]
    async fn ensure_healthy_passes_through_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let report = fresh_cache()
            .ensure_healthy(&server.uri(), Duration::from_millis(500))
            .await
            .unwrap();
        assert!(report.ok);
    }

    #[tokio::test]
    async fn ensure_healthy_failure_names_the_fix_and_aborts_fallback() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let err = fresh_cache()
            .ensure_healthy(&server.uri(), Duration::from_millis(500))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::RelayUnreachable { .. }));
        assert!(!err.is_retryable());
        let message = err.to_string();
        assert!(message.contains("Start or restart the relay process"));
        assert!(message.contains(&server.uri()));
    }
}
