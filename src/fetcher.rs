use std::sync::Mutex;
use std::time::{Duration, Instant};

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, AUTHORIZATION, CACHE_CONTROL};
use tracing::{debug, info};

use crate::config::{Config, USER_AGENT};
use crate::error::{AppError, Result};
use crate::latency::LatencyStats;

/// Sequential HTTP fetcher shared by every source. Requests never overlap;
/// consecutive requests are spaced by the configured delay.
pub struct Fetcher {
    client: reqwest::Client,
    delay: Duration,
    last_request: Mutex<Option<Instant>>,
    latency: LatencyStats,
}

impl Fetcher {
    pub fn new(cfg: &Config) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml,application/json;q=0.9,*/*;q=0.8"),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));

        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .timeout(Duration::from_secs(cfg.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            delay: Duration::from_millis(cfg.request_delay_ms),
            last_request: Mutex::new(None),
            latency: LatencyStats::new(),
        })
    }

    /// The underlying client, for callers that build their own requests (Sheets).
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    pub async fn fetch_html(&self, url: &str) -> Result<String> {
        let resp = self.send(self.client.get(url), url).await?;
        Ok(resp.text().await?)
    }

    /// GET a JSON document. `api_key` goes out verbatim as the Authorization header.
    pub async fn fetch_json(&self, url: &str, api_key: Option<&str>) -> Result<serde_json::Value> {
        let mut req = self.client.get(url).header(ACCEPT, "application/json");
        if let Some(key) = api_key {
            req = req.header(AUTHORIZATION, key);
        }
        let resp = self.send(req, url).await?;
        Ok(resp.json().await?)
    }

    async fn send(&self, req: reqwest::RequestBuilder, url: &str) -> Result<reqwest::Response> {
        self.pace().await;

        let started = Instant::now();
        let result = req.send().await;
        let elapsed = started.elapsed();
        self.latency.record(elapsed);

        let resp = result?;
        let status = resp.status();
        debug!(url, status = status.as_u16(), elapsed_ms = elapsed.as_millis() as u64, "GET");
        if !status.is_success() {
            return Err(AppError::HttpStatus { status, url: url.to_string() });
        }
        Ok(resp)
    }

    /// Sleep until `delay` has passed since the previous request.
    async fn pace(&self) {
        let wait = {
            let Ok(mut last) = self.last_request.lock() else {
                return;
            };
            let wait = last
                .map(|t| self.delay.saturating_sub(t.elapsed()))
                .unwrap_or_default();
            *last = Some(Instant::now() + wait);
            wait
        };
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
    }

    /// Requests issued so far, failed ones included.
    #[cfg(test)]
    pub fn request_count(&self) -> u64 {
        self.latency.summary().map(|s| s.count).unwrap_or(0)
    }

    pub fn log_latency(&self) {
        match self.latency.summary() {
            Some(s) => info!(
                requests = s.count,
                p50_ms = s.p50_ms,
                p95_ms = s.p95_ms,
                p99_ms = s.p99_ms,
                max_ms = s.max_ms,
                "Request latency | n: {} | p50: {}ms | p95: {}ms | p99: {}ms | max: {}ms",
                s.count, s.p50_ms, s.p95_ms, s.p99_ms, s.max_ms,
            ),
            None => info!("No requests issued"),
        }
    }
}
